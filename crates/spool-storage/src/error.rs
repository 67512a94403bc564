//! Error types for spool-storage
//!
//! This module defines the error types used throughout the storage crate.

use spool_core::{CodecError, GroupNameError};
use thiserror::Error;

/// Errors that can occur in storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    /// I/O error during storage operations
    #[error("I/O error: {0}")]
    Io(String),

    /// The backing database failed or is unreadable
    #[error("Database error: {0}")]
    Database(String),

    /// A stored envelope could not be written
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// A stored envelope could not be read back
    #[error("Deserialization error: {0}")]
    Deserialization(String),

    /// The caller's codec could not encode the item; nothing was stored
    #[error("Encode error: {0}")]
    Encode(String),

    /// The group name cannot be used as a partition key
    #[error("Invalid group {group:?}: {reason}")]
    InvalidGroup {
        group: String,
        reason: GroupNameError,
    },

    /// Configuration could not be loaded or is invalid
    #[error("Configuration error: {0}")]
    Config(String),
}

impl From<std::io::Error> for StorageError {
    fn from(err: std::io::Error) -> Self {
        StorageError::Io(err.to_string())
    }
}

impl From<postcard::Error> for StorageError {
    fn from(err: postcard::Error) -> Self {
        StorageError::Deserialization(err.to_string())
    }
}

impl From<CodecError> for StorageError {
    fn from(err: CodecError) -> Self {
        match err {
            CodecError::Encode(message) => StorageError::Encode(message),
            CodecError::Decode(message) => StorageError::Deserialization(message),
        }
    }
}

impl StorageError {
    /// Create a new I/O error
    pub fn io(message: impl Into<String>) -> Self {
        Self::Io(message.into())
    }

    /// Create a new Database error
    pub fn database(message: impl Into<String>) -> Self {
        Self::Database(message.into())
    }

    /// Create a new Serialization error
    pub fn serialization(message: impl Into<String>) -> Self {
        Self::Serialization(message.into())
    }

    /// Create a new Deserialization error
    pub fn deserialization(message: impl Into<String>) -> Self {
        Self::Deserialization(message.into())
    }

    /// Create a new Config error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Create a new InvalidGroup error
    pub fn invalid_group(group: &str, reason: GroupNameError) -> Self {
        Self::InvalidGroup {
            group: group.to_string(),
            reason,
        }
    }

    /// Whether the backing store itself failed (as opposed to bad input)
    pub fn is_persistence_failure(&self) -> bool {
        matches!(
            self,
            StorageError::Io(_)
                | StorageError::Database(_)
                | StorageError::Serialization(_)
                | StorageError::Deserialization(_)
        )
    }
}

/// Map any redb error into a [`StorageError::Database`]
pub(crate) fn db_err(err: impl Into<redb::Error>) -> StorageError {
    let err: redb::Error = err.into();
    StorageError::Database(err.to_string())
}
