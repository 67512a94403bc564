//! Error types for spool-core

use thiserror::Error;

/// Errors raised by a [`Codec`](crate::Codec)
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CodecError {
    /// The domain object could not be turned into a payload
    #[error("Encode error: {0}")]
    Encode(String),

    /// The payload could not be turned back into a domain object
    #[error("Decode error: {0}")]
    Decode(String),
}

impl CodecError {
    /// Create a new Encode error
    pub fn encode(message: impl Into<String>) -> Self {
        Self::Encode(message.into())
    }

    /// Create a new Decode error
    pub fn decode(message: impl Into<String>) -> Self {
        Self::Decode(message.into())
    }
}

/// Reasons a group name is rejected
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum GroupNameError {
    #[error("group name is empty")]
    Empty,

    #[error("group name contains a NUL byte")]
    ContainsNul,
}
