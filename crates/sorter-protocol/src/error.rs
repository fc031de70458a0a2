//! Protocol Error Types

use thiserror::Error;

/// Errors that can occur while parsing or transporting protocol lines
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// Serial port or stream I/O error
    #[error("Serial port error: {0}")]
    SerialError(String),

    /// Line does not match any known message shape
    #[error("Malformed message: {0:?}")]
    Malformed(String),

    /// A field could not be parsed
    #[error("Invalid {field} in {line:?}")]
    InvalidField { field: &'static str, line: String },

    /// State name not part of the fruit state set
    #[error("Unknown fruit state: {0:?}")]
    UnknownState(String),

    /// Inbound line longer than the configured limit
    #[error("Line exceeds {max} bytes")]
    LineTooLong { max: usize },
}

impl From<std::io::Error> for ProtocolError {
    fn from(err: std::io::Error) -> Self {
        ProtocolError::SerialError(err.to_string())
    }
}

impl From<tokio_serial::Error> for ProtocolError {
    fn from(err: tokio_serial::Error) -> Self {
        ProtocolError::SerialError(err.to_string())
    }
}
