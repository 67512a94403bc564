//! Persistence backends
//!
//! - [`RedbBackend`]: single-file redb database for production
//! - [`MemoryBackend`]: in-memory maps for tests and simulation

mod memory;
mod redb;

pub use memory::MemoryBackend;
pub use redb::{RedbBackend, RedbBackendConfig};

use bytes::Bytes;
use serde::{Deserialize, Serialize};

/// Stored form of a record, keyed externally by (group, id)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct StoredRecord {
    /// Opaque codec output
    pub payload: Bytes,
    /// Append time (Unix millis)
    pub created_at_millis: i64,
}
