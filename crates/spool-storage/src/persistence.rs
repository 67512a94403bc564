//! Typed persistence facade
//!
//! [`LogPersistence`] pairs a [`LogStore`] with a [`Codec`] so producers
//! hand over domain objects and consumers get decoded batches back.
//! Encoding happens before anything is written; decoding happens at
//! checkout, where undecodable records are purged.

use std::collections::{BTreeMap, BTreeSet};

use spool_core::{BatchId, Checkout, Codec, RecordId};
use tracing::warn;

use crate::LogBackend;
use crate::backend::RedbBackend;
use crate::config::StoreConfig;
use crate::error::StorageError;
use crate::store::LogStore;

/// Codec-aware wrapper around a [`LogStore`]
pub struct LogPersistence<C: Codec, B: LogBackend = RedbBackend> {
    store: LogStore<B>,
    codec: C,
}

impl<C: Codec> LogPersistence<C, RedbBackend> {
    /// Open a redb-backed store and attach `codec`
    pub fn open(config: StoreConfig, codec: C) -> Result<Self, StorageError> {
        Ok(Self::new(LogStore::open(config)?, codec))
    }
}

impl<C: Codec, B: LogBackend> LogPersistence<C, B> {
    /// Wrap an existing store
    pub fn new(store: LogStore<B>, codec: C) -> Self {
        Self { store, codec }
    }

    /// Get the underlying store
    pub fn store(&self) -> &LogStore<B> {
        &self.store
    }

    /// Get the codec
    pub fn codec(&self) -> &C {
        &self.codec
    }

    /// Encode and persist an item
    ///
    /// Fails with [`StorageError::Encode`] without writing anything when the
    /// codec rejects the item.
    pub fn put_log(&self, group: &str, item: &C::Item) -> Result<RecordId, StorageError> {
        let payload = self.codec.encode(item).map_err(|e| {
            warn!(group, error = %e, "Refusing to store item that failed to encode");
            StorageError::from(e)
        })?;
        self.store.append(group, &payload)
    }

    /// Check out and decode up to `max_count` items of a group
    pub fn get_logs(
        &self,
        group: &str,
        max_count: usize,
    ) -> Result<Option<Checkout<C::Item>>, StorageError> {
        self.store
            .checkout_decoded(group, max_count, |record| self.codec.decode(&record.payload))
    }

    /// Delete the records of a delivered batch
    pub fn delete_logs(&self, group: &str, batch_id: &BatchId) -> Result<usize, StorageError> {
        self.store.acknowledge(group, batch_id)
    }

    /// Delete every record of a group
    pub fn delete_group_logs(&self, group: &str) -> Result<usize, StorageError> {
        self.store.delete_group(group)
    }

    /// Number of records stored for a group
    pub fn count_logs(&self, group: &str) -> Result<usize, StorageError> {
        self.store.count(group)
    }

    /// Make every checked-out record available again
    pub fn clear_pending_log_state(&self) -> usize {
        self.store.release_all()
    }

    /// Delete everything
    pub fn clear(&self) -> Result<usize, StorageError> {
        self.store.clear_all()
    }

    /// Pending record ids per group
    pub fn pending_groups(&self) -> BTreeMap<String, BTreeSet<RecordId>> {
        self.store.pending_snapshot()
    }

    /// Flush and release the store
    pub fn close(self) -> Result<(), StorageError> {
        self.store.close()
    }
}
