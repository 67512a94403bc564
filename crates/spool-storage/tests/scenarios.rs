//! Behavioral scenarios for spool-storage
//!
//! Each test drives the public API the way a producer/uploader pair would
//! and checks one queue property: ordering, batch exclusivity, eviction,
//! corruption recovery, group isolation, and clearing.

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicUsize, Ordering};

use serde::{Deserialize, Serialize};
use spool_storage::{
    BatchId, CapacityPolicy, CapacityPolicyBuilder, Codec, CodecError, JsonCodec, LogPersistence,
    LogStore, MemoryBackend, RecordId, StorageError, StoreConfig,
};
use tempfile::TempDir;

// ============================================================================
// Helpers
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Event {
    name: String,
    seq: u32,
}

fn event(seq: u32) -> Event {
    Event {
        name: format!("event-{seq}"),
        seq,
    }
}

fn memory_store(policy: CapacityPolicy) -> LogStore<MemoryBackend> {
    LogStore::in_memory(policy).unwrap()
}

fn payloads(store: &LogStore<MemoryBackend>, group: &str) -> Vec<Vec<u8>> {
    store
        .scan(group)
        .map(|r| r.unwrap().payload.to_vec())
        .collect()
}

/// JSON codec whose decode fails on chosen call numbers (1-based)
struct FlakyCodec {
    inner: JsonCodec<Event>,
    fail_on: BTreeSet<usize>,
    calls: AtomicUsize,
}

impl FlakyCodec {
    fn failing_on(calls: impl IntoIterator<Item = usize>) -> Self {
        Self {
            inner: JsonCodec::new(),
            fail_on: calls.into_iter().collect(),
            calls: AtomicUsize::new(0),
        }
    }
}

impl Codec for FlakyCodec {
    type Item = Event;

    fn encode(&self, item: &Event) -> Result<Vec<u8>, CodecError> {
        self.inner.encode(item)
    }

    fn decode(&self, payload: &[u8]) -> Result<Event, CodecError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if self.fail_on.contains(&call) {
            return Err(CodecError::decode(format!("injected failure on call {call}")));
        }
        self.inner.decode(payload)
    }
}

/// Codec that refuses to encode events with an odd sequence number
struct PickyCodec;

impl Codec for PickyCodec {
    type Item = Event;

    fn encode(&self, item: &Event) -> Result<Vec<u8>, CodecError> {
        if item.seq % 2 == 1 {
            return Err(CodecError::encode("odd events are not serializable"));
        }
        JsonCodec::<Event>::new().encode(item)
    }

    fn decode(&self, payload: &[u8]) -> Result<Event, CodecError> {
        JsonCodec::<Event>::new().decode(payload)
    }
}

// ============================================================================
// Ordering
// ============================================================================

#[test]
fn test_checkout_returns_oldest_first() {
    let store = memory_store(CapacityPolicy::unbounded());
    for i in 0..10u8 {
        store.append("g", &[i]).unwrap();
    }

    let batch = store.checkout("g", 4).unwrap().unwrap();
    let got: Vec<u8> = batch.items.iter().map(|r| r.payload[0]).collect();
    assert_eq!(got, vec![0, 1, 2, 3]);

    let ids: Vec<RecordId> = batch.items.iter().map(|r| r.id).collect();
    let mut sorted = ids.clone();
    sorted.sort();
    assert_eq!(ids, sorted);
}

#[test]
fn test_ids_increase_across_groups() {
    let store = memory_store(CapacityPolicy::unbounded());
    let a = store.append("a", b"1").unwrap();
    let b = store.append("b", b"2").unwrap();
    let c = store.append("a", b"3").unwrap();

    assert!(a < b);
    assert!(b < c);
}

// ============================================================================
// Batch exclusivity
// ============================================================================

#[test]
fn test_record_in_at_most_one_outstanding_batch() {
    let store = memory_store(CapacityPolicy::unbounded());
    for i in 0..7u8 {
        store.append("g", &[i]).unwrap();
    }

    let mut seen = BTreeSet::new();
    while let Some(batch) = store.checkout("g", 3).unwrap() {
        for record in &batch.items {
            assert!(seen.insert(record.id), "{} handed out twice", record.id);
        }
    }

    assert_eq!(seen.len(), 7);
    assert_eq!(store.stats().unwrap().outstanding_batches, 3);
}

#[test]
fn test_acknowledge_deletes_exactly_the_batch() {
    let store = memory_store(CapacityPolicy::unbounded());
    for i in 0..5u8 {
        store.append("g", &[i]).unwrap();
    }

    let batch = store.checkout("g", 2).unwrap().unwrap();
    assert_eq!(store.acknowledge("g", &batch.batch_id).unwrap(), 2);
    assert_eq!(payloads(&store, "g"), vec![vec![2], vec![3], vec![4]]);

    // Second acknowledge is a no-op
    assert_eq!(store.acknowledge("g", &batch.batch_id).unwrap(), 0);
    assert_eq!(store.count("g").unwrap(), 3);
}

#[test]
fn test_acknowledge_with_wrong_group_is_ignored() {
    let store = memory_store(CapacityPolicy::unbounded());
    store.append("g", b"x").unwrap();

    let batch = store.checkout("g", 5).unwrap().unwrap();
    assert_eq!(store.acknowledge("", &batch.batch_id).unwrap(), 0);
    assert_eq!(store.acknowledge("other", &batch.batch_id).unwrap(), 0);
    assert_eq!(store.count("g").unwrap(), 1);

    // The batch is still outstanding and can be acknowledged properly
    assert_eq!(store.acknowledge("g", &batch.batch_id).unwrap(), 1);
}

#[test]
fn test_acknowledge_unknown_batch_is_ignored() {
    let store = memory_store(CapacityPolicy::unbounded());
    store.append("g", b"x").unwrap();

    let bogus = BatchId::from("00000000000000000000000000000000");
    assert_eq!(store.acknowledge("g", &bogus).unwrap(), 0);
    assert_eq!(store.count("g").unwrap(), 1);
}

#[test]
fn test_release_all_is_idempotent() {
    let store = memory_store(CapacityPolicy::unbounded());
    for i in 0..4u8 {
        store.append("g", &[i]).unwrap();
    }

    let first = store.checkout("g", 4).unwrap().unwrap();
    assert!(store.checkout("g", 4).unwrap().is_none());

    assert_eq!(store.release_all(), 1);
    assert_eq!(store.release_all(), 0);

    let again = store.checkout("g", 4).unwrap().unwrap();
    let first_ids: Vec<_> = first.items.iter().map(|r| r.id).collect();
    let again_ids: Vec<_> = again.items.iter().map(|r| r.id).collect();
    assert_eq!(first_ids, again_ids);
    assert_ne!(first.batch_id, again.batch_id);

    // The released batch id is dead
    assert_eq!(store.acknowledge("g", &first.batch_id).unwrap(), 0);
    assert_eq!(store.acknowledge("g", &again.batch_id).unwrap(), 4);
}

#[test]
fn test_zero_max_count_returns_none() {
    let store = memory_store(CapacityPolicy::unbounded());
    store.append("g", b"x").unwrap();

    assert!(store.checkout("g", 0).unwrap().is_none());
    assert!(store.pending_snapshot().is_empty());
}

// ============================================================================
// Capacity eviction
// ============================================================================

#[test]
fn test_eviction_drops_oldest_first() {
    let store = memory_store(CapacityPolicy::new(3));
    for i in 0..6u8 {
        store.append("g", &[i]).unwrap();
    }

    assert_eq!(store.count("g").unwrap(), 3);
    assert_eq!(payloads(&store, "g"), vec![vec![3], vec![4], vec![5]]);
}

#[test]
fn test_eviction_skips_pending_records() {
    let store = memory_store(CapacityPolicy::new(3));
    for i in 0..3u8 {
        store.append("g", &[i]).unwrap();
    }
    let batch = store.checkout("g", 2).unwrap().unwrap();

    store.append("g", &[3]).unwrap();
    store.append("g", &[4]).unwrap();

    // 0 and 1 are pending; 2 and 3 were the oldest unclaimed records
    assert_eq!(payloads(&store, "g"), vec![vec![0], vec![1], vec![4]]);
    assert_eq!(store.acknowledge("g", &batch.batch_id).unwrap(), 2);
    assert_eq!(payloads(&store, "g"), vec![vec![4]]);
}

#[test]
fn test_group_may_exceed_capacity_while_pending() {
    let store = memory_store(CapacityPolicy::new(2));
    store.append("g", b"a").unwrap();
    store.append("g", b"b").unwrap();
    let _batch = store.checkout("g", 2).unwrap().unwrap();

    store.append("g", b"c").unwrap();

    // The pending pair fills the ceiling, so the new record is the one evicted
    assert_eq!(store.count("g").unwrap(), 2);
    assert_eq!(payloads(&store, "g"), vec![b"a".to_vec(), b"b".to_vec()]);
}

#[test]
fn test_per_group_capacity_overrides() {
    let policy = CapacityPolicyBuilder::new()
        .default_max_records(5)
        .group("crashes", 1)
        .build();
    let store = memory_store(policy);

    for i in 0..4u8 {
        store.append("crashes", &[i]).unwrap();
        store.append("analytics", &[i]).unwrap();
    }

    assert_eq!(store.count("crashes").unwrap(), 1);
    assert_eq!(store.count("analytics").unwrap(), 4);
}

#[test]
fn test_zero_capacity_is_rejected() {
    let result = LogStore::in_memory(CapacityPolicy::new(0));
    assert!(matches!(result, Err(StorageError::Config(_))));
}

// ============================================================================
// Corruption handling
// ============================================================================

#[test]
fn test_corrupt_records_are_purged_on_checkout() {
    let persistence = LogPersistence::new(
        memory_store(CapacityPolicy::unbounded()),
        FlakyCodec::failing_on([1, 3]),
    );
    for seq in 1..=4 {
        persistence.put_log("g", &event(seq)).unwrap();
    }

    let batch = persistence.get_logs("g", 4).unwrap().unwrap();
    assert_eq!(batch.items, vec![event(2), event(4)]);
    assert_eq!(persistence.count_logs("g").unwrap(), 2);

    assert_eq!(persistence.delete_logs("g", &batch.batch_id).unwrap(), 2);
    assert_eq!(persistence.count_logs("g").unwrap(), 0);
}

#[test]
fn test_fully_corrupt_selection_moves_on() {
    let persistence = LogPersistence::new(
        memory_store(CapacityPolicy::unbounded()),
        FlakyCodec::failing_on([1, 2]),
    );
    for seq in 1..=3 {
        persistence.put_log("g", &event(seq)).unwrap();
    }

    let batch = persistence.get_logs("g", 2).unwrap().unwrap();
    assert_eq!(batch.items, vec![event(3)]);
    assert_eq!(persistence.count_logs("g").unwrap(), 1);
}

#[test]
fn test_only_corrupt_records_yields_none() {
    let store = memory_store(CapacityPolicy::unbounded());
    store.append("g", b"not json").unwrap();
    store.append("g", b"{still not json").unwrap();

    let persistence = LogPersistence::new(store, JsonCodec::<Event>::new());
    assert!(persistence.get_logs("g", 10).unwrap().is_none());
    assert_eq!(persistence.count_logs("g").unwrap(), 0);
    assert!(persistence.pending_groups().is_empty());
}

#[test]
fn test_encode_failure_stores_nothing() {
    let persistence = LogPersistence::new(memory_store(CapacityPolicy::unbounded()), PickyCodec);

    let result = persistence.put_log("g", &event(1));
    assert!(matches!(result, Err(StorageError::Encode(_))));
    assert_eq!(persistence.count_logs("g").unwrap(), 0);

    persistence.put_log("g", &event(2)).unwrap();
    assert_eq!(persistence.count_logs("g").unwrap(), 1);
}

// ============================================================================
// Groups and clearing
// ============================================================================

#[test]
fn test_groups_are_isolated() {
    let store = memory_store(CapacityPolicy::new(2));
    for i in 0..3u8 {
        store.append("a", &[i]).unwrap();
    }
    store.append("b", b"only").unwrap();

    let batch = store.checkout("b", 10).unwrap().unwrap();
    assert_eq!(batch.items.len(), 1);
    assert_eq!(batch.items[0].group, "b");

    store.delete_group("a").unwrap();
    assert_eq!(store.count("a").unwrap(), 0);
    assert_eq!(store.count("b").unwrap(), 1);
    assert_eq!(store.acknowledge("b", &batch.batch_id).unwrap(), 1);
}

#[test]
fn test_similar_group_names_do_not_collide() {
    let store = memory_store(CapacityPolicy::unbounded());
    store.append("ab", b"1").unwrap();
    store.append("a", b"2").unwrap();
    store.append("a-b", b"3").unwrap();

    assert_eq!(payloads(&store, "a"), vec![b"2".to_vec()]);
    store.delete_group("a").unwrap();
    assert_eq!(store.total_count().unwrap(), 2);
}

#[test]
fn test_invalid_group_names_are_rejected() {
    let store = memory_store(CapacityPolicy::unbounded());

    assert!(matches!(
        store.append("", b"x"),
        Err(StorageError::InvalidGroup { .. })
    ));
    assert!(matches!(
        store.append("bad\0group", b"x"),
        Err(StorageError::InvalidGroup { .. })
    ));
    assert_eq!(store.total_count().unwrap(), 0);
}

#[test]
fn test_aliasing_group_name_cannot_reach_another_group() {
    let temp_dir = TempDir::new().unwrap();
    let config = StoreConfig::with_path(temp_dir.path().join("spool.redb"))
        .with_capacity(CapacityPolicy::new(2));
    let store = LogStore::open(config).unwrap();
    store.append("a", b"1").unwrap();
    store.append("a", b"2").unwrap();
    let batch = store.checkout("a", 1).unwrap().unwrap();

    // "a\0" sorts inside the key range of "a"
    let alias = "a\0";
    assert!(matches!(store.count(alias), Err(StorageError::InvalidGroup { .. })));
    assert!(matches!(store.checkout(alias, 5), Err(StorageError::InvalidGroup { .. })));
    assert!(matches!(
        store.checkout_decoded(alias, 5, |r| Ok(r.id)),
        Err(StorageError::InvalidGroup { .. })
    ));
    assert!(matches!(store.delete_group(alias), Err(StorageError::InvalidGroup { .. })));
    assert_eq!(store.acknowledge(alias, &batch.batch_id).unwrap(), 0);

    let scanned: Vec<_> = store.scan(alias).collect();
    assert_eq!(scanned.len(), 1);
    assert!(matches!(scanned[0], Err(StorageError::InvalidGroup { .. })));

    // Group "a" is untouched and its batch is still the only one
    assert_eq!(store.count("a").unwrap(), 2);
    let pending = store.pending_snapshot();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending["a"].len(), 1);
    assert_eq!(store.acknowledge("a", &batch.batch_id).unwrap(), 1);

    let persistence = LogPersistence::new(store, JsonCodec::<Event>::new());
    assert!(persistence.get_logs(alias, 5).is_err());
    assert!(persistence.count_logs(alias).is_err());
    assert_eq!(persistence.count_logs("a").unwrap(), 1);
}

#[test]
fn test_delete_group_invalidates_its_batches() {
    let store = memory_store(CapacityPolicy::unbounded());
    store.append("g", b"1").unwrap();
    let stale = store.checkout("g", 5).unwrap().unwrap();

    store.delete_group("g").unwrap();
    store.append("g", b"2").unwrap();

    assert_eq!(store.acknowledge("g", &stale.batch_id).unwrap(), 0);
    assert_eq!(store.count("g").unwrap(), 1);
    assert!(store.checkout("g", 5).unwrap().is_some());
}

#[test]
fn test_clear_all_removes_records_and_batches() {
    let store = memory_store(CapacityPolicy::unbounded());
    store.append("a", b"1").unwrap();
    store.append("b", b"2").unwrap();
    let batch = store.checkout("a", 5).unwrap().unwrap();

    assert_eq!(store.clear_all().unwrap(), 2);
    assert_eq!(store.total_count().unwrap(), 0);
    assert!(store.pending_snapshot().is_empty());
    assert_eq!(store.acknowledge("a", &batch.batch_id).unwrap(), 0);

    // Ids keep increasing after a clear
    let next = store.append("a", b"3").unwrap();
    assert!(next > batch.items[0].id);
}

#[test]
fn test_stats_report_pending_per_group() {
    let store = memory_store(CapacityPolicy::unbounded());
    for i in 0..3u8 {
        store.append("a", &[i]).unwrap();
    }
    store.append("b", b"x").unwrap();
    store.checkout("a", 2).unwrap().unwrap();

    let stats = store.stats().unwrap();
    assert_eq!(stats.total_records, 4);
    assert_eq!(stats.outstanding_batches, 1);
    assert_eq!(stats.groups["a"].records, 3);
    assert_eq!(stats.groups["a"].pending, 2);
    assert_eq!(stats.groups["b"].pending, 0);
}

// ============================================================================
// End to end
// ============================================================================

#[test]
fn test_overflow_then_drain() {
    let store = memory_store(CapacityPolicy::new(2));
    let ids: Vec<RecordId> = [b"R1", b"R2", b"R3", b"R4"]
        .iter()
        .map(|payload| store.append("g", *payload).unwrap())
        .collect();

    let batch = store.checkout("g", 5).unwrap().unwrap();
    let got: Vec<RecordId> = batch.items.iter().map(|r| r.id).collect();
    assert_eq!(got, ids[2..].to_vec());
    assert_eq!(batch.items[0].payload.as_ref(), b"R3");
    assert_eq!(batch.items[1].payload.as_ref(), b"R4");

    assert_eq!(store.acknowledge("g", &batch.batch_id).unwrap(), 2);
    assert_eq!(store.count("g").unwrap(), 0);
    assert!(store.checkout("g", 5).unwrap().is_none());
}

#[test]
fn test_upload_cycle_with_capacity_two() {
    let persistence = LogPersistence::new(
        memory_store(CapacityPolicy::new(2)),
        JsonCodec::<Event>::new(),
    );

    for seq in 1..=3 {
        persistence.put_log("analytics", &event(seq)).unwrap();
    }
    assert_eq!(persistence.count_logs("analytics").unwrap(), 2);

    let first = persistence.get_logs("analytics", 1).unwrap().unwrap();
    assert_eq!(first.items, vec![event(2)]);

    let second = persistence.get_logs("analytics", 5).unwrap().unwrap();
    assert_eq!(second.items, vec![event(3)]);
    assert!(persistence.get_logs("analytics", 5).unwrap().is_none());

    // Upload of the first batch failed: release and try again
    persistence.clear_pending_log_state();
    let retry = persistence.get_logs("analytics", 5).unwrap().unwrap();
    assert_eq!(retry.items, vec![event(2), event(3)]);

    assert_eq!(persistence.delete_logs("analytics", &retry.batch_id).unwrap(), 2);
    assert_eq!(persistence.count_logs("analytics").unwrap(), 0);
}

#[test]
fn test_redb_restart_releases_outstanding_batches() {
    let temp_dir = TempDir::new().unwrap();
    let config = StoreConfig::with_path(temp_dir.path().join("spool.redb"))
        .with_capacity(CapacityPolicy::new(10))
        .with_scan_page_size(2);

    let stale = {
        let store = LogStore::open(config.clone()).unwrap();
        for i in 0..5u8 {
            store.append("g", &[i]).unwrap();
        }
        let batch = store.checkout("g", 3).unwrap().unwrap();
        store.close().unwrap();
        batch
    };

    let store = LogStore::open(config).unwrap();
    assert_eq!(store.count("g").unwrap(), 5);
    assert_eq!(store.acknowledge("g", &stale.batch_id).unwrap(), 0);

    let batch = store.checkout("g", 10).unwrap().unwrap();
    assert_eq!(batch.items.len(), 5);
    let next = store.append("g", b"late").unwrap();
    assert!(next > batch.items[4].id);
}

#[test]
fn test_redb_eviction_and_corruption() {
    let temp_dir = TempDir::new().unwrap();
    let config = StoreConfig::with_path(temp_dir.path().join("spool.redb"))
        .with_capacity(CapacityPolicy::new(3))
        .with_durable_writes(false);

    let store = LogStore::open(config).unwrap();
    store.append("g", b"garbage").unwrap();
    let persistence = LogPersistence::new(store, JsonCodec::<Event>::new());
    for seq in 1..=2 {
        persistence.put_log("g", &event(seq)).unwrap();
    }
    persistence.put_log("other", &event(9)).unwrap();

    let batch = persistence.get_logs("g", 10).unwrap().unwrap();
    assert_eq!(batch.items, vec![event(1), event(2)]);
    assert_eq!(persistence.count_logs("g").unwrap(), 2);

    for seq in 3..=6 {
        persistence.put_log("g", &event(seq)).unwrap();
    }
    // Pending 1 and 2 survive; only the newest unclaimed record fits
    assert_eq!(persistence.count_logs("g").unwrap(), 3);

    persistence.delete_logs("g", &batch.batch_id).unwrap();
    let rest = persistence.get_logs("g", 10).unwrap().unwrap();
    assert_eq!(rest.items, vec![event(6)]);
    assert_eq!(persistence.count_logs("other").unwrap(), 1);
    persistence.close().unwrap();
}
