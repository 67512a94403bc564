//! Capacity management for groups
//!
//! This module provides per-group record ceilings and the evictor that
//! enforces them after every append.
//!
//! Eviction removes the oldest records of the group (lowest ids) that are
//! not part of an outstanding batch. When every surplus record is on loan
//! the group is allowed to stay over its ceiling until the batch is
//! acknowledged or released.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use spool_core::RecordId;
use tracing::debug;

use crate::LogBackend;
use crate::error::StorageError;

/// Per-group record ceilings
///
/// A group without an explicit ceiling falls back to `default_max_records`;
/// when that is unset too, the group is unbounded.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CapacityPolicy {
    /// Ceiling for groups without an override
    default_max_records: Option<usize>,
    /// Per-group overrides
    groups: BTreeMap<String, usize>,
}

impl CapacityPolicy {
    /// Create a policy with no ceilings at all
    pub fn unbounded() -> Self {
        Self::default()
    }

    /// Create a policy applying `max_records` to every group
    pub fn new(max_records: usize) -> Self {
        Self {
            default_max_records: Some(max_records),
            groups: BTreeMap::new(),
        }
    }

    /// Override the ceiling of a single group
    pub fn with_group_capacity(mut self, group: impl Into<String>, max_records: usize) -> Self {
        self.groups.insert(group.into(), max_records);
        self
    }

    /// Get the default ceiling
    pub fn default_max_records(&self) -> Option<usize> {
        self.default_max_records
    }

    /// Get the ceiling that applies to `group`
    pub fn capacity_for(&self, group: &str) -> Option<usize> {
        self.groups
            .get(group)
            .copied()
            .or(self.default_max_records)
    }

    /// Number of records over the ceiling for a group holding `current_count`
    pub fn excess(&self, group: &str, current_count: usize) -> usize {
        match self.capacity_for(group) {
            Some(max) => current_count.saturating_sub(max),
            None => 0,
        }
    }

    /// Pick up to `count` records to evict, oldest first, skipping pending ones
    ///
    /// `candidates` must be in ascending id order.
    pub fn select_for_eviction(
        &self,
        candidates: impl IntoIterator<Item = RecordId>,
        pending: Option<&BTreeSet<RecordId>>,
        count: usize,
    ) -> Vec<RecordId> {
        if count == 0 {
            return Vec::new();
        }

        candidates
            .into_iter()
            .filter(|id| pending.is_none_or(|p| !p.contains(id)))
            .take(count)
            .collect()
    }

    /// Reject ceilings of zero
    pub fn validate(&self) -> Result<(), StorageError> {
        if self.default_max_records == Some(0) {
            return Err(StorageError::config("default_max_records must be at least 1"));
        }
        if let Some((group, _)) = self.groups.iter().find(|(_, max)| **max == 0) {
            return Err(StorageError::config(format!(
                "capacity for group {group:?} must be at least 1"
            )));
        }
        Ok(())
    }
}

/// Builder for CapacityPolicy
#[derive(Debug, Default)]
pub struct CapacityPolicyBuilder {
    default_max_records: Option<usize>,
    groups: BTreeMap<String, usize>,
}

impl CapacityPolicyBuilder {
    /// Create a new builder
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the ceiling for groups without an override
    pub fn default_max_records(mut self, max: usize) -> Self {
        self.default_max_records = Some(max);
        self
    }

    /// Set the ceiling of one group
    pub fn group(mut self, group: impl Into<String>, max: usize) -> Self {
        self.groups.insert(group.into(), max);
        self
    }

    /// Build the CapacityPolicy
    pub fn build(self) -> CapacityPolicy {
        CapacityPolicy {
            default_max_records: self.default_max_records,
            groups: self.groups,
        }
    }
}

/// Bring `group` back under its ceiling, returning the evicted ids
///
/// Walks the group oldest first in pages of `page_size`, collecting
/// non-pending ids until the surplus is covered or the group is exhausted.
pub(crate) fn evict_overflow<B: LogBackend + ?Sized>(
    backend: &mut B,
    policy: &CapacityPolicy,
    group: &str,
    pending: Option<&BTreeSet<RecordId>>,
    page_size: usize,
) -> Result<Vec<RecordId>, StorageError> {
    if policy.capacity_for(group).is_none() {
        return Ok(Vec::new());
    }

    let excess = policy.excess(group, backend.count_group(group)?);
    if excess == 0 {
        return Ok(Vec::new());
    }

    let mut victims = Vec::with_capacity(excess);
    let mut after = None;
    while victims.len() < excess {
        let page = backend.scan_group(group, after, page_size)?;
        let Some(last) = page.last() else {
            break;
        };
        after = Some(last.id);

        let wanted = excess - victims.len();
        victims.extend(policy.select_for_eviction(page.iter().map(|r| r.id), pending, wanted));
    }

    if victims.is_empty() {
        debug!(group, excess, "Group over capacity but every surplus record is pending");
        return Ok(victims);
    }

    let ids: BTreeSet<RecordId> = victims.iter().copied().collect();
    backend.delete_ids(&ids)?;

    if victims.len() < excess {
        debug!(
            group,
            evicted = victims.len(),
            still_over = excess - victims.len(),
            "Evicted all unclaimed surplus records, remaining overflow is pending"
        );
    } else {
        debug!(group, evicted = victims.len(), "Evicted oldest records due to group capacity");
    }

    Ok(victims)
}
