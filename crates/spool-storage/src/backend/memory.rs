//! In-memory backend
//!
//! This backend keeps everything in ordered maps, suitable for testing and
//! simulation environments. Nothing survives a drop.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::ops::Bound;

use spool_core::{Record, RecordId};
use tracing::trace;

use super::StoredRecord;
use crate::LogBackend;
use crate::error::StorageError;

/// In-memory implementation of LogBackend
#[derive(Debug, Default)]
pub struct MemoryBackend {
    /// Records per group, ordered by id
    groups: BTreeMap<String, BTreeMap<RecordId, StoredRecord>>,
    /// Reverse index: id -> group
    owners: HashMap<RecordId, String>,
    /// Last allocated id
    last_id: u64,
}

impl MemoryBackend {
    /// Create an empty backend
    pub fn new() -> Self {
        Self::default()
    }
}

impl LogBackend for MemoryBackend {
    fn insert(
        &mut self,
        group: &str,
        payload: &[u8],
        created_at_millis: i64,
    ) -> Result<RecordId, StorageError> {
        self.last_id += 1;
        let id = RecordId::new(self.last_id);

        self.groups.entry(group.to_string()).or_default().insert(
            id,
            StoredRecord {
                payload: payload.to_vec().into(),
                created_at_millis,
            },
        );
        self.owners.insert(id, group.to_string());

        trace!(group, id = %id, "Inserted record (memory)");
        Ok(id)
    }

    fn scan_group(
        &self,
        group: &str,
        after: Option<RecordId>,
        limit: usize,
    ) -> Result<Vec<Record>, StorageError> {
        let Some(records) = self.groups.get(group) else {
            return Ok(Vec::new());
        };

        let lower = after.map_or(Bound::Unbounded, Bound::Excluded);

        Ok(records
            .range((lower, Bound::Unbounded))
            .take(limit)
            .map(|(id, stored)| {
                Record::new(*id, group, stored.payload.clone(), stored.created_at_millis)
            })
            .collect())
    }

    fn delete_ids(&mut self, ids: &BTreeSet<RecordId>) -> Result<usize, StorageError> {
        let mut removed = 0;
        for id in ids {
            let Some(group) = self.owners.remove(id) else {
                continue;
            };
            if let Some(records) = self.groups.get_mut(&group) {
                if records.remove(id).is_some() {
                    removed += 1;
                }
                if records.is_empty() {
                    self.groups.remove(&group);
                }
            }
        }
        Ok(removed)
    }

    fn delete_group(&mut self, group: &str) -> Result<usize, StorageError> {
        let Some(records) = self.groups.remove(group) else {
            return Ok(0);
        };
        for id in records.keys() {
            self.owners.remove(id);
        }
        Ok(records.len())
    }

    fn delete_all(&mut self) -> Result<usize, StorageError> {
        let removed = self.owners.len();
        self.groups.clear();
        self.owners.clear();
        Ok(removed)
    }

    fn count_group(&self, group: &str) -> Result<usize, StorageError> {
        Ok(self.groups.get(group).map_or(0, BTreeMap::len))
    }

    fn count_total(&self) -> Result<usize, StorageError> {
        Ok(self.owners.len())
    }

    fn group_counts(&self) -> Result<BTreeMap<String, usize>, StorageError> {
        Ok(self
            .groups
            .iter()
            .map(|(group, records)| (group.clone(), records.len()))
            .collect())
    }
}
