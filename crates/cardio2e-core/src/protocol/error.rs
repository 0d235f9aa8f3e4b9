//! Protocol errors

use thiserror::Error;

/// Errors that can occur during protocol communication
#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("Serial port error: {0}")]
    SerialError(String),

    #[error("Transport is closed")]
    NotConnected,

    #[error("{operation} failed after {attempts} attempts")]
    RetriesExhausted { operation: String, attempts: u32 },

    #[error("Login not acknowledged after {attempts} attempts")]
    LoginFailed { attempts: u32 },

    #[error("HVAC command is missing the {0} field")]
    MissingHvacField(&'static str),

    #[error("Invalid command: {0}")]
    InvalidCommand(String),

    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

impl ProtocolError {
    /// Whether the transport can no longer be used and must be reopened
    pub fn is_fatal(&self) -> bool {
        matches!(self, ProtocolError::NotConnected)
    }
}
