//! Error types for subscriber installation

use thiserror::Error;

/// Errors raised while building or installing the subscriber
#[derive(Debug, Error)]
pub enum LoggingError {
    /// A level or target directive could not be parsed
    #[error("Invalid filter directive: {0}")]
    Filter(String),

    /// The log directory or file could not be created
    #[error("Log file error: {0}")]
    Io(String),

    /// A global subscriber is already installed
    #[error("Subscriber already installed: {0}")]
    AlreadyInstalled(String),
}

impl From<std::io::Error> for LoggingError {
    fn from(err: std::io::Error) -> Self {
        LoggingError::Io(err.to_string())
    }
}
