//! Batch tracking
//!
//! Remembers which record ids are on loan to a consumer and under which
//! batch. The state is volatile by contract: a fresh store starts with no
//! outstanding batches, which is equivalent to releasing everything at
//! process start.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use spool_core::{BatchId, RecordId};
use tracing::{debug, trace};

/// An outstanding checkout
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Batch {
    /// Group the records were taken from
    pub group: String,
    /// Record ids in ascending order
    pub record_ids: BTreeSet<RecordId>,
}

/// Tracks outstanding batches and the derived pending set
#[derive(Debug, Default)]
pub struct BatchTracker {
    /// Outstanding batches by id
    batches: HashMap<BatchId, Batch>,
    /// Pending ids per group (union of that group's batches)
    pending: HashMap<String, BTreeSet<RecordId>>,
    /// Reverse index: record id -> owning batch
    owners: HashMap<RecordId, BatchId>,
}

impl BatchTracker {
    /// Create an empty tracker
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new batch for `record_ids` and return its id
    ///
    /// Callers must only pass ids that are not already pending.
    pub fn begin(&mut self, group: &str, record_ids: impl IntoIterator<Item = RecordId>) -> BatchId {
        let batch_id = loop {
            let candidate = BatchId::generate();
            if !self.batches.contains_key(&candidate) {
                break candidate;
            }
        };

        let record_ids: BTreeSet<RecordId> = record_ids.into_iter().collect();
        debug_assert!(record_ids.iter().all(|id| !self.owners.contains_key(id)));

        let pending = self.pending.entry(group.to_string()).or_default();
        for id in &record_ids {
            pending.insert(*id);
            self.owners.insert(*id, batch_id.clone());
        }

        debug!(group, batch = %batch_id, records = record_ids.len(), "Batch checked out");
        self.batches.insert(
            batch_id.clone(),
            Batch {
                group: group.to_string(),
                record_ids,
            },
        );

        batch_id
    }

    /// Pending ids of a group, if any
    pub fn pending_for(&self, group: &str) -> Option<&BTreeSet<RecordId>> {
        self.pending.get(group)
    }

    /// Look up an outstanding batch
    pub fn batch(&self, batch_id: &BatchId) -> Option<&Batch> {
        self.batches.get(batch_id)
    }

    /// Close a batch, returning its record ids
    ///
    /// Returns `None` when the batch is unknown or belongs to another group.
    pub fn complete(&mut self, group: &str, batch_id: &BatchId) -> Option<BTreeSet<RecordId>> {
        match self.batches.get(batch_id) {
            Some(batch) if batch.group == group => {}
            _ => {
                trace!(group, batch = %batch_id, "Ignoring unknown batch");
                return None;
            }
        }

        let batch = self.batches.remove(batch_id)?;
        self.unlink(&batch);
        debug!(group, batch = %batch_id, records = batch.record_ids.len(), "Batch completed");
        Some(batch.record_ids)
    }

    /// Drop the given ids from whatever batches hold them
    ///
    /// Batches left without records are discarded.
    pub fn forget_ids(&mut self, ids: &BTreeSet<RecordId>) {
        for id in ids {
            let Some(batch_id) = self.owners.remove(id) else {
                continue;
            };
            let Some(batch) = self.batches.get_mut(&batch_id) else {
                continue;
            };

            batch.record_ids.remove(id);
            if let Some(pending) = self.pending.get_mut(&batch.group) {
                pending.remove(id);
                if pending.is_empty() {
                    self.pending.remove(&batch.group);
                }
            }
            if batch.record_ids.is_empty() {
                trace!(batch = %batch_id, "Discarding emptied batch");
                self.batches.remove(&batch_id);
            }
        }
    }

    /// Discard every batch of a group
    pub fn forget_group(&mut self, group: &str) -> usize {
        let stale: Vec<BatchId> = self
            .batches
            .iter()
            .filter(|(_, batch)| batch.group == group)
            .map(|(id, _)| id.clone())
            .collect();

        for batch_id in &stale {
            if let Some(batch) = self.batches.remove(batch_id) {
                self.unlink(&batch);
            }
        }
        stale.len()
    }

    /// Discard all tracking state, returning how many batches were outstanding
    pub fn release_all(&mut self) -> usize {
        let released = self.batches.len();
        self.batches.clear();
        self.pending.clear();
        self.owners.clear();
        released
    }

    /// Number of outstanding batches
    pub fn outstanding(&self) -> usize {
        self.batches.len()
    }

    /// Copy of the pending sets, keyed by group
    pub fn snapshot(&self) -> BTreeMap<String, BTreeSet<RecordId>> {
        self.pending
            .iter()
            .map(|(group, ids)| (group.clone(), ids.clone()))
            .collect()
    }

    /// Remove a batch's ids from the pending and owner indexes
    fn unlink(&mut self, batch: &Batch) {
        for id in &batch.record_ids {
            self.owners.remove(id);
        }
        if let Some(pending) = self.pending.get_mut(&batch.group) {
            for id in &batch.record_ids {
                pending.remove(id);
            }
            if pending.is_empty() {
                self.pending.remove(&batch.group);
            }
        }
    }
}
