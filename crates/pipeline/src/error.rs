//! Pipeline Error Types

use sorter_protocol::ProtocolError;
use thiserror::Error;

/// Errors that end the host link task or prevent startup
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Settings could not be loaded
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    /// Settings loaded but unusable
    #[error("Invalid settings: {0}")]
    InvalidSettings(String),

    /// Host link transport failure
    #[error("Host link error: {0}")]
    Link(#[from] ProtocolError),
}
