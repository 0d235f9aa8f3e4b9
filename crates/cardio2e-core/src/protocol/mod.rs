//! Serial Protocol Communication
//!
//! Implements the Cardio2e RS-232 line protocol: `@`-prefixed, whitespace
//! separated messages terminated by a carriage return.

pub mod commands;
mod connection;
mod error;
mod framer;
pub mod listener;
mod message;
#[cfg(any(test, feature = "test-util"))]
pub mod mock;
pub mod retry;
pub mod serial;
pub mod stream;

pub use commands::Command;
pub use connection::{Connection, ConnectionConfig, LoginResponse, SessionState};
pub use error::ProtocolError;
pub use framer::Framer;
pub use listener::{BusHandler, Listener, ListenerConfig};
pub use message::{
    classify, nack_description, BusMessage, Event, MessageClass, Nack, TemperatureReading,
};
pub use retry::RetryPolicy;
pub use serial::{configure_port, open_port};
pub use stream::{SerialChannel, Transport};

/// Default baud rate of the Cardio2e RS-232 port
pub const DEFAULT_BAUD_RATE: u32 = 9600;

/// Message terminator
pub const TERMINATOR: char = '\r';

/// Literal escape some serial stacks emit in place of a carriage return
pub const ESCAPED_TERMINATOR: &str = "#015";

/// Default timeout for a state query attempt in milliseconds
pub const DEFAULT_QUERY_TIMEOUT_MS: u64 = 500;

/// Default number of state query attempts
pub const DEFAULT_QUERY_RETRIES: u32 = 5;

/// Default timeout for a name query attempt in milliseconds
///
/// Names are only fetched at startup, and the controller answers them slowly.
pub const DEFAULT_NAME_TIMEOUT_MS: u64 = 3000;

/// Default number of name query attempts
pub const DEFAULT_NAME_RETRIES: u32 = 3;
