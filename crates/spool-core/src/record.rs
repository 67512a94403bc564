//! Record and batch identifiers

use std::fmt::Display;

use bytes::Bytes;
use serde::{Deserialize, Serialize};

/// Identifier of a stored record
///
/// Allocated from a single counter per store, so ids are unique across
/// groups and ascending id order is insertion order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RecordId(pub u64);

impl RecordId {
    /// Create a record id from its raw value
    pub fn new(value: u64) -> Self {
        Self(value)
    }

    /// Get the raw value
    pub fn value(&self) -> u64 {
        self.0
    }
}

impl Display for RecordId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

impl From<u64> for RecordId {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

/// A persisted payload tagged with its group
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    /// Record identifier
    pub id: RecordId,
    /// Group (partition) the record belongs to
    pub group: String,
    /// Opaque payload produced by a codec
    pub payload: Bytes,
    /// Append time (Unix millis, UTC)
    pub created_at_millis: i64,
}

impl Record {
    /// Create a new record
    pub fn new(
        id: RecordId,
        group: impl Into<String>,
        payload: impl Into<Bytes>,
        created_at_millis: i64,
    ) -> Self {
        Self {
            id,
            group: group.into(),
            payload: payload.into(),
            created_at_millis,
        }
    }
}

/// Opaque token naming one checkout
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct BatchId(String);

impl BatchId {
    /// Generate a fresh random batch id (32 hex chars)
    pub fn generate() -> Self {
        let bytes: [u8; 16] = rand::random();
        Self(hex::encode(bytes))
    }

    /// Get the id as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for BatchId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for BatchId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for BatchId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// A batch of items handed to a consumer
///
/// `items` are raw [`Record`]s for plain checkouts, or decoded values when
/// the checkout ran a codec.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Checkout<T> {
    /// Token to pass back when acknowledging the batch
    pub batch_id: BatchId,
    /// Group the batch was taken from
    pub group: String,
    /// Items in ascending record id order
    pub items: Vec<T>,
}

impl<T> Checkout<T> {
    /// Number of items in the batch
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Whether the batch holds no items
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}
