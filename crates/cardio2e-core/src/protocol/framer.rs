//! Stream framing
//!
//! Turns the unbounded serial byte stream into discrete bus messages.
//!
//! The controller is inconsistent about terminators: `\r` is canonical but
//! `\n` and `\r\n` also show up, some serial stacks double-encode the
//! carriage return as the literal text `#015`, and bursts may concatenate
//! several `@` messages on one line.

use super::{BusMessage, ESCAPED_TERMINATOR, TERMINATOR};

/// Incremental line framer
#[derive(Debug, Default)]
pub struct Framer {
    /// Bytes received but not yet terminated
    buffer: Vec<u8>,
}

impl Framer {
    /// Create an empty framer
    pub fn new() -> Self {
        Self::default()
    }

    /// Append bytes and return every message completed by them
    ///
    /// Partial lines stay buffered until their terminator arrives.
    pub fn feed(&mut self, bytes: &[u8]) -> Vec<BusMessage> {
        self.buffer.extend_from_slice(bytes);

        let mut messages = Vec::new();
        while let Some(pos) = self.buffer.iter().position(|b| is_terminator(*b)) {
            let mut consumed = pos + 1;
            // Swallow the second half of a "\r\n" pair
            if self.buffer.get(consumed).copied().is_some_and(is_terminator) {
                consumed += 1;
            }

            let line: Vec<u8> = self.buffer.drain(..consumed).take(pos).collect();
            messages.extend(split_line(&String::from_utf8_lossy(&line)));
        }
        messages
    }

    /// Number of bytes waiting for a terminator
    pub fn pending(&self) -> usize {
        self.buffer.len()
    }
}

fn is_terminator(byte: u8) -> bool {
    byte == b'\r' || byte == b'\n'
}

/// Split one raw line into its `@`-prefixed messages
pub(crate) fn split_line(line: &str) -> Vec<BusMessage> {
    let line = line.trim();
    if line.is_empty() {
        return Vec::new();
    }

    let unescaped = line.replace(ESCAPED_TERMINATOR, &TERMINATOR.to_string());
    unescaped
        .split(['@', TERMINATOR])
        .map(str::trim)
        .filter(|fragment| !fragment.is_empty())
        .map(|fragment| BusMessage::parse(&format!("@{}", fragment)))
        .collect()
}
