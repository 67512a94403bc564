//! Store configuration
//!
//! Loadable from TOML or assembled in code:
//!
//! ```toml
//! path = "./data/spool.redb"
//! schema_version = 1
//! scan_page_size = 64
//! durable_writes = true
//!
//! [capacity]
//! default_max_records = 300
//!
//! [capacity.groups]
//! crashes = 50
//! ```

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::backend::RedbBackendConfig;
use crate::capacity::CapacityPolicy;
use crate::error::StorageError;

/// Configuration for a [`LogStore`](crate::LogStore)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Path to the database file
    pub path: PathBuf,
    /// Layout version; changing it discards previously stored records
    pub schema_version: u64,
    /// Records fetched per backend read while scanning or selecting
    pub scan_page_size: usize,
    /// Whether every commit is fsynced before returning
    pub durable_writes: bool,
    /// Per-group record ceilings
    pub capacity: CapacityPolicy,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("./data/spool.redb"),
            schema_version: 1,
            scan_page_size: 64,
            durable_writes: true,
            capacity: CapacityPolicy::default(),
        }
    }
}

impl StoreConfig {
    /// Create a configuration for a database file
    pub fn with_path(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            ..Default::default()
        }
    }

    /// Set the schema version
    pub fn with_schema_version(mut self, version: u64) -> Self {
        self.schema_version = version;
        self
    }

    /// Set the capacity policy
    pub fn with_capacity(mut self, capacity: CapacityPolicy) -> Self {
        self.capacity = capacity;
        self
    }

    /// Set the scan page size
    pub fn with_scan_page_size(mut self, size: usize) -> Self {
        self.scan_page_size = size;
        self
    }

    /// Enable or disable durable commits
    pub fn with_durable_writes(mut self, durable: bool) -> Self {
        self.durable_writes = durable;
        self
    }

    /// Parse a TOML document
    pub fn from_toml_str(input: &str) -> Result<Self, StorageError> {
        let config: Self = toml::from_str(input).map_err(|e| StorageError::config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a TOML file
    pub fn load(path: impl AsRef<Path>) -> Result<Self, StorageError> {
        let input = std::fs::read_to_string(path.as_ref())?;
        Self::from_toml_str(&input)
    }

    /// Check invariants the store relies on
    pub fn validate(&self) -> Result<(), StorageError> {
        if self.scan_page_size == 0 {
            return Err(StorageError::config("scan_page_size must be at least 1"));
        }
        self.capacity.validate()
    }

    /// Backend settings derived from this configuration
    pub fn backend(&self) -> RedbBackendConfig {
        RedbBackendConfig {
            db_path: self.path.clone(),
            schema_version: self.schema_version,
            durable_writes: self.durable_writes,
        }
    }
}
