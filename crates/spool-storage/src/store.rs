//! The log store
//!
//! [`LogStore`] ties a [`LogBackend`] to the batch tracker and the capacity
//! policy. Every mutation runs under one mutex so that append + eviction and
//! checkout's select + mark-pending are each atomic with respect to other
//! mutations. Scans take the lock one page at a time.

use std::collections::{BTreeMap, BTreeSet};

use parking_lot::Mutex;
use spool_core::{BatchId, Checkout, CodecError, Record, RecordId, validate_group};
use tracing::{debug, info, instrument, trace, warn};

use crate::LogBackend;
use crate::backend::{MemoryBackend, RedbBackend};
use crate::capacity::{CapacityPolicy, evict_overflow};
use crate::config::StoreConfig;
use crate::corruption;
use crate::error::StorageError;
use crate::scanner::Scanner;
use crate::tracker::BatchTracker;

const DEFAULT_PAGE_SIZE: usize = 64;

/// Per-group figures reported by [`LogStore::stats`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GroupStats {
    /// Records currently stored
    pub records: usize,
    /// Records on loan to an outstanding batch
    pub pending: usize,
}

/// Snapshot of the store for diagnostics
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StoreStats {
    /// Records across all groups
    pub total_records: usize,
    /// Batches checked out and not yet acknowledged or released
    pub outstanding_batches: usize,
    /// Figures per non-empty group
    pub groups: BTreeMap<String, GroupStats>,
}

/// Reject names that could alias another group's keys
fn check_group(group: &str) -> Result<(), StorageError> {
    validate_group(group).map_err(|reason| StorageError::invalid_group(group, reason))
}

/// State guarded by the store lock
pub(crate) struct StoreInner<B> {
    pub(crate) backend: B,
    pub(crate) tracker: BatchTracker,
}

impl<B: LogBackend> StoreInner<B> {
    /// Up to `max` records of `group` that are not pending, oldest first
    pub(crate) fn select_unclaimed(
        &self,
        group: &str,
        max: usize,
        page_size: usize,
    ) -> Result<Vec<Record>, StorageError> {
        let pending = self.tracker.pending_for(group);
        let mut selected = Vec::new();
        let mut after = None;

        while selected.len() < max {
            let page = self.backend.scan_group(group, after, page_size)?;
            let Some(last) = page.last() else {
                break;
            };
            after = Some(last.id);

            let wanted = max - selected.len();
            selected.extend(
                page.into_iter()
                    .filter(|r| pending.is_none_or(|p| !p.contains(&r.id)))
                    .take(wanted),
            );
        }

        Ok(selected)
    }

    /// Delete ids from the backend and from any batch holding them
    pub(crate) fn purge(&mut self, ids: &BTreeSet<RecordId>) -> Result<usize, StorageError> {
        let removed = self.backend.delete_ids(ids)?;
        self.tracker.forget_ids(ids);
        Ok(removed)
    }
}

/// Durable grouped queue with batch checkout
pub struct LogStore<B: LogBackend> {
    inner: Mutex<StoreInner<B>>,
    policy: CapacityPolicy,
    page_size: usize,
}

impl LogStore<RedbBackend> {
    /// Open or create the store described by `config`
    ///
    /// The returned store has no outstanding batches: anything checked out
    /// by a previous process is checkoutable again.
    #[instrument(skip(config), fields(path = %config.path.display()))]
    pub fn open(config: StoreConfig) -> Result<Self, StorageError> {
        config.validate()?;

        let backend = RedbBackend::open(config.backend())?;
        let store = Self::with_backend(backend, config.capacity)?
            .with_page_size(config.scan_page_size);

        info!(
            total_records = store.total_count()?,
            "Spool store ready, no batches outstanding"
        );
        Ok(store)
    }

    /// Compact the database file
    pub fn compact(&self) -> Result<bool, StorageError> {
        self.inner.lock().backend.compact()
    }
}

impl LogStore<MemoryBackend> {
    /// Create a store over a fresh in-memory backend
    pub fn in_memory(policy: CapacityPolicy) -> Result<Self, StorageError> {
        Self::with_backend(MemoryBackend::new(), policy)
    }
}

impl<B: LogBackend> LogStore<B> {
    /// Create a store over any backend
    pub fn with_backend(backend: B, policy: CapacityPolicy) -> Result<Self, StorageError> {
        policy.validate()?;

        Ok(Self {
            inner: Mutex::new(StoreInner {
                backend,
                tracker: BatchTracker::new(),
            }),
            policy,
            page_size: DEFAULT_PAGE_SIZE,
        })
    }

    /// Set the number of records read per backend call
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    /// Get the capacity policy
    pub fn capacity(&self) -> &CapacityPolicy {
        &self.policy
    }

    /// Get the page size used by scans and selections
    pub fn page_size(&self) -> usize {
        self.page_size
    }

    /// Persist a payload and enforce the group's ceiling
    ///
    /// Eviction runs before this returns and never touches pending records.
    /// Once the record is committed the append succeeds: an eviction
    /// failure is logged and the surplus is evicted by a later append.
    pub fn append(&self, group: &str, payload: &[u8]) -> Result<RecordId, StorageError> {
        check_group(group)?;
        let created_at_millis = chrono::Utc::now().timestamp_millis();

        let mut guard = self.inner.lock();
        let StoreInner { backend, tracker } = &mut *guard;

        let id = backend.insert(group, payload, created_at_millis)?;
        match evict_overflow(
            backend,
            &self.policy,
            group,
            tracker.pending_for(group),
            self.page_size,
        ) {
            Ok(evicted) => {
                trace!(group, id = %id, evicted = evicted.len(), "Appended record");
            }
            Err(e) => {
                warn!(group, id = %id, error = %e, "Appended record but eviction failed");
            }
        }
        Ok(id)
    }

    /// Forward cursor over the records of a group
    ///
    /// An invalid group name yields a single `InvalidGroup` error.
    pub fn scan(&self, group: &str) -> Scanner<'_, B> {
        Scanner::new(self, group)
    }

    /// One page of a group, used by [`Scanner`]
    pub(crate) fn page(
        &self,
        group: &str,
        after: Option<RecordId>,
    ) -> Result<Vec<Record>, StorageError> {
        self.inner
            .lock()
            .backend
            .scan_group(group, after, self.page_size)
    }

    /// Delete exactly the listed ids that exist
    pub fn delete_by_ids(&self, ids: &BTreeSet<RecordId>) -> Result<usize, StorageError> {
        let removed = self.inner.lock().purge(ids)?;
        trace!(requested = ids.len(), removed, "Deleted records by id");
        Ok(removed)
    }

    /// Delete every record of a group, pending or not
    ///
    /// Outstanding batches of the group become unknown.
    pub fn delete_group(&self, group: &str) -> Result<usize, StorageError> {
        check_group(group)?;
        let mut inner = self.inner.lock();
        let removed = inner.backend.delete_group(group)?;
        let stale = inner.tracker.forget_group(group);

        debug!(group, removed, stale_batches = stale, "Deleted group");
        Ok(removed)
    }

    /// Delete everything and invalidate every outstanding batch
    pub fn clear_all(&self) -> Result<usize, StorageError> {
        let mut inner = self.inner.lock();
        let removed = inner.backend.delete_all()?;
        let stale = inner.tracker.release_all();

        info!(removed, stale_batches = stale, "Cleared spool store");
        Ok(removed)
    }

    /// Number of records in a group
    pub fn count(&self, group: &str) -> Result<usize, StorageError> {
        check_group(group)?;
        self.inner.lock().backend.count_group(group)
    }

    /// Number of records across all groups
    pub fn total_count(&self) -> Result<usize, StorageError> {
        self.inner.lock().backend.count_total()
    }

    /// Claim up to `max_count` unclaimed records of a group
    ///
    /// Returns `None` when the group has nothing unclaimed (or `max_count`
    /// is zero). Records are returned undecoded, oldest first.
    pub fn checkout(
        &self,
        group: &str,
        max_count: usize,
    ) -> Result<Option<Checkout<Record>>, StorageError> {
        check_group(group)?;
        if max_count == 0 {
            return Ok(None);
        }

        let mut inner = self.inner.lock();
        let records = inner.select_unclaimed(group, max_count, self.page_size)?;
        if records.is_empty() {
            trace!(group, "Nothing to check out");
            return Ok(None);
        }

        let batch_id = inner.tracker.begin(group, records.iter().map(|r| r.id));
        Ok(Some(Checkout {
            batch_id,
            group: group.to_string(),
            items: records,
        }))
    }

    /// Claim and decode up to `max_count` records of a group
    ///
    /// Records that fail to decode are deleted and left out of the batch, so
    /// the batch may hold fewer items than were available. `None` means the
    /// group has no unclaimed records left.
    pub fn checkout_decoded<T, F>(
        &self,
        group: &str,
        max_count: usize,
        decode: F,
    ) -> Result<Option<Checkout<T>>, StorageError>
    where
        F: FnMut(&Record) -> Result<T, CodecError>,
    {
        check_group(group)?;
        if max_count == 0 {
            return Ok(None);
        }

        let mut inner = self.inner.lock();
        corruption::checkout_decoded(&mut *inner, group, max_count, self.page_size, decode)
    }

    /// Delete the records of a delivered batch
    ///
    /// Unknown batch ids, batch ids of another group, and invalid group
    /// names are ignored. Returns how many records were deleted.
    pub fn acknowledge(&self, group: &str, batch_id: &BatchId) -> Result<usize, StorageError> {
        if validate_group(group).is_err() {
            trace!(group, batch = %batch_id, "Acknowledge with invalid group ignored");
            return Ok(0);
        }
        let mut inner = self.inner.lock();

        let ids = match inner.tracker.batch(batch_id) {
            Some(batch) if batch.group == group => batch.record_ids.clone(),
            _ => {
                trace!(group, batch = %batch_id, "Acknowledge of unknown batch ignored");
                return Ok(0);
            }
        };

        // On failure the batch stays outstanding so the caller can retry
        let removed = inner.backend.delete_ids(&ids)?;
        inner.tracker.complete(group, batch_id);

        debug!(group, batch = %batch_id, removed, "Batch acknowledged");
        Ok(removed)
    }

    /// Forget every outstanding batch without deleting records
    ///
    /// Returns how many batches were released.
    pub fn release_all(&self) -> usize {
        let released = self.inner.lock().tracker.release_all();
        if released > 0 {
            debug!(released, "Released all outstanding batches");
        }
        released
    }

    /// Pending record ids per group
    pub fn pending_snapshot(&self) -> BTreeMap<String, BTreeSet<RecordId>> {
        self.inner.lock().tracker.snapshot()
    }

    /// Counts per group plus batch figures
    pub fn stats(&self) -> Result<StoreStats, StorageError> {
        let inner = self.inner.lock();
        let counts = inner.backend.group_counts()?;

        let groups: BTreeMap<String, GroupStats> = counts
            .into_iter()
            .map(|(group, records)| {
                let pending = inner.tracker.pending_for(&group).map_or(0, BTreeSet::len);
                (group, GroupStats { records, pending })
            })
            .collect();

        Ok(StoreStats {
            total_records: groups.values().map(|g| g.records).sum(),
            outstanding_batches: inner.tracker.outstanding(),
            groups,
        })
    }

    /// Flush and release the backend
    pub fn close(self) -> Result<(), StorageError> {
        let mut inner = self.inner.into_inner();
        inner.backend.flush()?;
        let released = inner.tracker.release_all();

        info!(released_batches = released, "Closed spool store");
        Ok(())
    }
}
