//! redb table definitions and backend
//!
//! Records live in one table keyed by `group ++ 0x00 ++ id (big-endian)`, so a
//! forward range over a group's key prefix yields its records in id order.
//! A second table maps ids back to their group for delete-by-id, and a small
//! metadata table holds the schema version and the id counter.

use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;

use bytes::Bytes;
use redb::{
    Database, Durability, ReadableTable, ReadableTableMetadata, TableDefinition, WriteTransaction,
};
use spool_core::{Record, RecordId};
use tracing::{debug, info, instrument, trace, warn};

use super::StoredRecord;
use crate::LogBackend;
use crate::error::{StorageError, db_err};

// Key: group bytes ++ 0x00 ++ id (u64 BE), Value: postcard StoredRecord
const RECORDS: TableDefinition<&[u8], &[u8]> = TableDefinition::new("records");

// Key: record id, Value: group name
const RECORD_GROUPS: TableDefinition<u64, &str> = TableDefinition::new("record_groups");

// Key: metadata name, Value: number
const META: TableDefinition<&str, u64> = TableDefinition::new("meta");

const SCHEMA_VERSION_KEY: &str = "schema_version";
const LAST_ID_KEY: &str = "last_id";

/// Configuration for the redb backend
#[derive(Debug, Clone)]
pub struct RedbBackendConfig {
    /// Path to the database file
    pub db_path: PathBuf,
    /// Layout version; a mismatch with the file drops all stored records
    pub schema_version: u64,
    /// Commit with `Durability::Immediate` instead of `Durability::Eventual`
    pub durable_writes: bool,
}

impl Default for RedbBackendConfig {
    fn default() -> Self {
        Self {
            db_path: PathBuf::from("./data/spool.redb"),
            schema_version: 1,
            durable_writes: true,
        }
    }
}

/// redb implementation of LogBackend
pub struct RedbBackend {
    db: Database,
    config: RedbBackendConfig,
}

impl std::fmt::Debug for RedbBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedbBackend")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl RedbBackend {
    /// Open or create the database
    #[instrument(skip(config), fields(path = %config.db_path.display()))]
    pub fn open(config: RedbBackendConfig) -> Result<Self, StorageError> {
        // Ensure parent directory exists
        if let Some(parent) = config.db_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let db = Database::create(&config.db_path).map_err(db_err)?;

        info!("Opened spool database");

        let backend = Self { db, config };
        backend.init_tables()?;

        Ok(backend)
    }

    /// Create tables and reconcile the schema version
    fn init_tables(&self) -> Result<(), StorageError> {
        let write_txn = self.begin_write()?;
        let wanted = self.config.schema_version;

        let stored = {
            let meta = write_txn.open_table(META).map_err(db_err)?;
            let version = meta
                .get(SCHEMA_VERSION_KEY)
                .map_err(db_err)?
                .map(|v| v.value());
            version
        };

        if let Some(stored) = stored {
            if stored != wanted {
                warn!(
                    stored,
                    wanted, "Schema version changed, dropping all stored records"
                );
                write_txn.delete_table(RECORDS).map_err(db_err)?;
                write_txn.delete_table(RECORD_GROUPS).map_err(db_err)?;
            }
        }

        write_txn.open_table(RECORDS).map_err(db_err)?;
        write_txn.open_table(RECORD_GROUPS).map_err(db_err)?;
        {
            let mut meta = write_txn.open_table(META).map_err(db_err)?;
            meta.insert(SCHEMA_VERSION_KEY, wanted).map_err(db_err)?;
        }

        write_txn.commit().map_err(db_err)?;

        debug!(schema_version = wanted, "Initialized redb tables");
        Ok(())
    }

    fn begin_write(&self) -> Result<WriteTransaction, StorageError> {
        let mut txn = self.db.begin_write().map_err(db_err)?;
        txn.set_durability(if self.config.durable_writes {
            Durability::Immediate
        } else {
            Durability::Eventual
        });
        Ok(txn)
    }

    /// Compact the database file
    ///
    /// Requires exclusive access, which the store guarantees by holding its
    /// lock for the duration. Returns whether any space was reclaimed.
    pub fn compact(&mut self) -> Result<bool, StorageError> {
        let compacted = self.db.compact().map_err(db_err)?;
        debug!(compacted, "Database compaction finished");
        Ok(compacted)
    }
}

/// Build the ordered key of a record
fn record_key(group: &str, id: RecordId) -> Vec<u8> {
    let mut key = Vec::with_capacity(group.len() + 9);
    key.extend_from_slice(group.as_bytes());
    key.push(0);
    key.extend_from_slice(&id.value().to_be_bytes());
    key
}

/// Exclusive upper bound of a group's key range
fn group_end(group: &str) -> Vec<u8> {
    let mut key = Vec::with_capacity(group.len() + 1);
    key.extend_from_slice(group.as_bytes());
    key.push(1);
    key
}

/// Recover the record id from the tail of a key
fn id_from_key(key: &[u8]) -> Result<RecordId, StorageError> {
    let tail: [u8; 8] = key
        .get(key.len().saturating_sub(8)..)
        .and_then(|tail| tail.try_into().ok())
        .ok_or_else(|| StorageError::deserialization("record key too short"))?;
    Ok(RecordId::new(u64::from_be_bytes(tail)))
}

impl LogBackend for RedbBackend {
    fn insert(
        &mut self,
        group: &str,
        payload: &[u8],
        created_at_millis: i64,
    ) -> Result<RecordId, StorageError> {
        let value = postcard::to_allocvec(&StoredRecord {
            payload: Bytes::copy_from_slice(payload),
            created_at_millis,
        })
        .map_err(|e| StorageError::serialization(e.to_string()))?;

        let write_txn = self.begin_write()?;
        let id = {
            let mut meta = write_txn.open_table(META).map_err(db_err)?;
            let last = meta
                .get(LAST_ID_KEY)
                .map_err(db_err)?
                .map(|v| v.value())
                .unwrap_or(0);
            let id = RecordId::new(last + 1);
            meta.insert(LAST_ID_KEY, id.value()).map_err(db_err)?;

            let mut records = write_txn.open_table(RECORDS).map_err(db_err)?;
            records
                .insert(record_key(group, id).as_slice(), value.as_slice())
                .map_err(db_err)?;

            let mut groups = write_txn.open_table(RECORD_GROUPS).map_err(db_err)?;
            groups.insert(id.value(), group).map_err(db_err)?;
            id
        };
        write_txn.commit().map_err(db_err)?;

        trace!(group, id = %id, "Inserted record");
        Ok(id)
    }

    fn scan_group(
        &self,
        group: &str,
        after: Option<RecordId>,
        limit: usize,
    ) -> Result<Vec<Record>, StorageError> {
        let start = match after {
            Some(after) if after.value() == u64::MAX => return Ok(Vec::new()),
            Some(after) => record_key(group, RecordId::new(after.value() + 1)),
            None => record_key(group, RecordId::new(0)),
        };
        let end = group_end(group);

        let read_txn = self.db.begin_read().map_err(db_err)?;
        let table = read_txn.open_table(RECORDS).map_err(db_err)?;
        let range = table
            .range(start.as_slice()..end.as_slice())
            .map_err(db_err)?;

        let mut records = Vec::new();
        for entry in range.take(limit) {
            let (key, value) = entry.map_err(db_err)?;
            let id = id_from_key(key.value())?;
            let stored: StoredRecord = postcard::from_bytes(value.value())?;
            records.push(Record::new(
                id,
                group,
                stored.payload,
                stored.created_at_millis,
            ));
        }

        Ok(records)
    }

    fn delete_ids(&mut self, ids: &BTreeSet<RecordId>) -> Result<usize, StorageError> {
        if ids.is_empty() {
            return Ok(0);
        }

        let write_txn = self.begin_write()?;
        let removed = {
            let mut groups = write_txn.open_table(RECORD_GROUPS).map_err(db_err)?;
            let mut records = write_txn.open_table(RECORDS).map_err(db_err)?;
            let mut removed = 0;

            for id in ids {
                let group = groups
                    .remove(id.value())
                    .map_err(db_err)?
                    .map(|g| g.value().to_string());
                let Some(group) = group else {
                    continue;
                };
                if records
                    .remove(record_key(&group, *id).as_slice())
                    .map_err(db_err)?
                    .is_some()
                {
                    removed += 1;
                }
            }
            removed
        };
        write_txn.commit().map_err(db_err)?;

        Ok(removed)
    }

    fn delete_group(&mut self, group: &str) -> Result<usize, StorageError> {
        let start = record_key(group, RecordId::new(0));
        let end = group_end(group);

        let write_txn = self.begin_write()?;
        let removed = {
            let mut records = write_txn.open_table(RECORDS).map_err(db_err)?;
            let mut groups = write_txn.open_table(RECORD_GROUPS).map_err(db_err)?;

            let mut keys = Vec::new();
            for entry in records
                .range(start.as_slice()..end.as_slice())
                .map_err(db_err)?
            {
                let (key, _) = entry.map_err(db_err)?;
                keys.push(key.value().to_vec());
            }

            for key in &keys {
                records.remove(key.as_slice()).map_err(db_err)?;
                groups.remove(id_from_key(key)?.value()).map_err(db_err)?;
            }
            keys.len()
        };
        write_txn.commit().map_err(db_err)?;

        Ok(removed)
    }

    fn delete_all(&mut self) -> Result<usize, StorageError> {
        let write_txn = self.begin_write()?;
        let removed = {
            let groups = write_txn.open_table(RECORD_GROUPS).map_err(db_err)?;
            groups.len().map_err(db_err)? as usize
        };

        // The id counter in META survives so ids are never reused
        write_txn.delete_table(RECORDS).map_err(db_err)?;
        write_txn.delete_table(RECORD_GROUPS).map_err(db_err)?;
        write_txn.open_table(RECORDS).map_err(db_err)?;
        write_txn.open_table(RECORD_GROUPS).map_err(db_err)?;
        write_txn.commit().map_err(db_err)?;

        Ok(removed)
    }

    fn count_group(&self, group: &str) -> Result<usize, StorageError> {
        let start = record_key(group, RecordId::new(0));
        let end = group_end(group);

        let read_txn = self.db.begin_read().map_err(db_err)?;
        let table = read_txn.open_table(RECORDS).map_err(db_err)?;
        let range = table
            .range(start.as_slice()..end.as_slice())
            .map_err(db_err)?;

        let mut count = 0;
        for entry in range {
            entry.map_err(db_err)?;
            count += 1;
        }
        Ok(count)
    }

    fn count_total(&self) -> Result<usize, StorageError> {
        let read_txn = self.db.begin_read().map_err(db_err)?;
        let table = read_txn.open_table(RECORD_GROUPS).map_err(db_err)?;
        Ok(table.len().map_err(db_err)? as usize)
    }

    fn group_counts(&self) -> Result<BTreeMap<String, usize>, StorageError> {
        let read_txn = self.db.begin_read().map_err(db_err)?;
        let table = read_txn.open_table(RECORD_GROUPS).map_err(db_err)?;

        let mut counts = BTreeMap::new();
        for entry in table.iter().map_err(db_err)? {
            let (_, group) = entry.map_err(db_err)?;
            *counts.entry(group.value().to_string()).or_insert(0) += 1;
        }
        Ok(counts)
    }

    fn flush(&mut self) -> Result<(), StorageError> {
        // An empty immediate commit makes earlier eventual commits durable
        let mut write_txn = self.db.begin_write().map_err(db_err)?;
        write_txn.set_durability(Durability::Immediate);
        write_txn.commit().map_err(db_err)?;
        Ok(())
    }
}
