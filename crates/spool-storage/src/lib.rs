//! # Spool Storage
//!
//! Durable, on-device queue for telemetry records awaiting upload.
//!
//! Producers append opaque payloads tagged with a group; consumers check
//! out bounded batches, upload them, and acknowledge them to delete the
//! records. Batches that are never acknowledged keep their records out of
//! later checkouts until [`LogStore::release_all`] is called or the process
//! restarts.
//!
//! ## Features
//!
//! - **LogBackend trait**: Primitives a persistence backend must provide
//! - **RedbBackend**: Single-file redb database for production
//! - **MemoryBackend**: In-memory implementation for testing/simulation
//! - **CapacityPolicy**: Per-group ceilings enforced by oldest-first eviction
//! - **BatchTracker**: In-flight batch bookkeeping
//! - **LogPersistence**: Typed facade running a [`Codec`](spool_core::Codec)
//!
//! ## Example
//!
//! ```rust,ignore
//! use spool_storage::{CapacityPolicy, LogStore, StoreConfig};
//!
//! let config = StoreConfig::with_path("./data/spool.redb")
//!     .with_capacity(CapacityPolicy::new(300));
//! let store = LogStore::open(config)?;
//!
//! store.append("analytics", br#"{"event":"launch"}"#)?;
//!
//! if let Some(batch) = store.checkout("analytics", 50)? {
//!     // upload batch.items ...
//!     store.acknowledge("analytics", &batch.batch_id)?;
//! }
//! ```

pub mod backend;
pub mod capacity;
pub mod config;
mod corruption;
pub mod error;
pub mod persistence;
pub mod scanner;
pub mod store;
pub mod tracker;

// Re-exports
pub use backend::{MemoryBackend, RedbBackend, RedbBackendConfig};
pub use capacity::{CapacityPolicy, CapacityPolicyBuilder};
pub use config::StoreConfig;
pub use error::StorageError;
pub use persistence::LogPersistence;
pub use scanner::Scanner;
pub use store::{GroupStats, LogStore, StoreStats};
pub use tracker::{Batch, BatchTracker};

// Re-export core types for convenience
pub use spool_core::{BatchId, Checkout, Codec, CodecError, JsonCodec, Record, RecordId};

use std::collections::{BTreeMap, BTreeSet};

/// Storage primitives the log store is built on
///
/// Implementations keep records grouped and ordered by id. Every method is
/// a single bounded local operation; the store serializes calls, so
/// implementations need no locking of their own.
pub trait LogBackend: Send {
    /// Persist a payload under the next id of the store-wide counter
    fn insert(
        &mut self,
        group: &str,
        payload: &[u8],
        created_at_millis: i64,
    ) -> Result<RecordId, StorageError>;

    /// Up to `limit` records of `group` with id greater than `after`, in id order
    fn scan_group(
        &self,
        group: &str,
        after: Option<RecordId>,
        limit: usize,
    ) -> Result<Vec<Record>, StorageError>;

    /// Delete the given ids, ignoring unknown ones; returns how many existed
    fn delete_ids(&mut self, ids: &BTreeSet<RecordId>) -> Result<usize, StorageError>;

    /// Delete every record of a group
    fn delete_group(&mut self, group: &str) -> Result<usize, StorageError>;

    /// Delete every record of every group
    fn delete_all(&mut self) -> Result<usize, StorageError>;

    /// Number of records in a group
    fn count_group(&self, group: &str) -> Result<usize, StorageError>;

    /// Number of records across all groups
    fn count_total(&self) -> Result<usize, StorageError>;

    /// Record count of every non-empty group
    fn group_counts(&self) -> Result<BTreeMap<String, usize>, StorageError>;

    /// Make all previous writes durable
    fn flush(&mut self) -> Result<(), StorageError> {
        Ok(())
    }
}
