//! Scripted transport for exercising the protocol engine without hardware
//!
//! [`MockTransport`] is a cheap cloneable handle: one clone is moved into a
//! [`Connection`](super::Connection) while the test keeps another to script
//! the bus and inspect what was written.
//!
//! ```ignore
//! use cardio2e_core::protocol::mock::MockTransport;
//!
//! let mock = MockTransport::new();
//! // Answer a light query with its state.
//! mock.respond("@G L 3", "@I L 3 100\r");
//! // Something the controller says on its own.
//! mock.push_incoming("@I R 5 O\r");
//! ```

use std::collections::VecDeque;
use std::io::{self, Read, Write};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use super::Transport;

#[derive(Debug, Clone)]
struct Responder {
    /// Text that must appear in a single write
    request: String,
    response: Vec<u8>,
    delay: Duration,
}

#[derive(Debug)]
struct Inner {
    /// Bytes that become readable at the given instant
    incoming: VecDeque<(Instant, Vec<u8>)>,
    responders: Vec<Responder>,
    sent: Vec<u8>,
    open: bool,
    fail_writes: bool,
}

/// Scripted in-memory [`Transport`]
#[derive(Debug, Clone)]
pub struct MockTransport {
    inner: Arc<Mutex<Inner>>,
}

impl MockTransport {
    /// Create an open transport with nothing scripted
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner {
                incoming: VecDeque::new(),
                responders: Vec::new(),
                sent: Vec::new(),
                open: true,
                fail_writes: false,
            })),
        }
    }

    fn inner(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Make bytes readable immediately
    pub fn push_incoming(&self, data: impl AsRef<[u8]>) {
        self.push_incoming_after(Duration::ZERO, data);
    }

    /// Make bytes readable once `delay` has passed
    pub fn push_incoming_after(&self, delay: Duration, data: impl AsRef<[u8]>) {
        let at = Instant::now() + delay;
        self.inner().incoming.push_back((at, data.as_ref().to_vec()));
    }

    /// Queue `response` every time a write contains `request`
    pub fn respond(&self, request: &str, response: impl AsRef<[u8]>) {
        self.respond_after(request, Duration::ZERO, response);
    }

    /// Like [`respond`](Self::respond), with the answer delayed by `delay`
    pub fn respond_after(&self, request: &str, delay: Duration, response: impl AsRef<[u8]>) {
        self.inner().responders.push(Responder {
            request: request.to_string(),
            response: response.as_ref().to_vec(),
            delay,
        });
    }

    /// Everything written so far
    pub fn sent(&self) -> Vec<u8> {
        self.inner().sent.clone()
    }

    /// Written commands split on the terminator
    pub fn sent_lines(&self) -> Vec<String> {
        String::from_utf8_lossy(&self.sent())
            .split('\r')
            .filter(|line| !line.is_empty())
            .map(str::to_string)
            .collect()
    }

    /// Simulate the device going away
    pub fn disconnect(&self) {
        self.inner().open = false;
    }

    /// Make every following write fail with a transient error
    pub fn fail_writes(&self, fail: bool) {
        self.inner().fail_writes = fail;
    }
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}

fn closed() -> io::Error {
    io::Error::new(io::ErrorKind::NotConnected, "mock transport closed")
}

impl Inner {
    fn ready(&self) -> usize {
        let now = Instant::now();
        self.incoming
            .iter()
            .take_while(|(at, _)| *at <= now)
            .map(|(_, d)| d.len())
            .sum()
    }
}

impl Read for MockTransport {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let mut inner = self.inner();
        if !inner.open {
            return Err(closed());
        }

        let now = Instant::now();
        let mut filled = 0;
        while filled < buf.len() {
            let Some((at, chunk)) = inner.incoming.front_mut() else {
                break;
            };
            if *at > now {
                break;
            }
            let n = chunk.len().min(buf.len() - filled);
            buf[filled..filled + n].copy_from_slice(&chunk[..n]);
            chunk.drain(..n);
            filled += n;
            if chunk.is_empty() {
                inner.incoming.pop_front();
            }
        }

        if filled == 0 {
            return Err(io::Error::new(io::ErrorKind::TimedOut, "no data"));
        }
        Ok(filled)
    }
}

impl Write for MockTransport {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut inner = self.inner();
        if !inner.open {
            return Err(closed());
        }
        if inner.fail_writes {
            return Err(io::Error::new(io::ErrorKind::Other, "scripted write failure"));
        }

        inner.sent.extend_from_slice(buf);
        let text = String::from_utf8_lossy(buf).into_owned();
        let now = Instant::now();
        let answers: Vec<(Instant, Vec<u8>)> = inner
            .responders
            .iter()
            .filter(|r| text.contains(&r.request))
            .map(|r| (now + r.delay, r.response.clone()))
            .collect();
        for answer in answers {
            // Keep the queue ordered by availability
            let pos = inner
                .incoming
                .iter()
                .position(|(at, _)| *at > answer.0)
                .unwrap_or(inner.incoming.len());
            inner.incoming.insert(pos, answer);
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        if self.inner().open {
            Ok(())
        } else {
            Err(closed())
        }
    }
}

impl Transport for MockTransport {
    fn bytes_to_read(&mut self) -> io::Result<u32> {
        let inner = self.inner();
        if !inner.open {
            return Err(closed());
        }
        Ok(inner.ready() as u32)
    }

    fn is_open(&self) -> bool {
        self.inner().open
    }

    fn close(&mut self) {
        self.inner().open = false;
    }

    fn clear_input_buffer(&mut self) -> io::Result<()> {
        let mut inner = self.inner();
        let now = Instant::now();
        inner.incoming.retain(|(at, _)| *at > now);
        Ok(())
    }
}
