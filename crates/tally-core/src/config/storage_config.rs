//! Storage backend configuration.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::constants::{DEFAULT_READ_POOL_SIZE, DEFAULT_STORE_FILE, DEFAULT_STORE_INTERVAL_SECS};
use crate::errors::StorageError;

/// Configuration for backend selection and persistence.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct StorageConfig {
    /// SQLite database path (or ":memory:"). Set and non-empty selects the SQL backend.
    pub database_dsn: Option<String>,
    /// Snapshot file for the file-backed store. Default: /tmp/metrics-db.json.
    pub store_file: Option<PathBuf>,
    /// Load the snapshot at construction. Default: true.
    pub restore: Option<bool>,
    /// Seconds between snapshot dumps. 0 = dump after every write. Default: 300.
    pub store_interval_secs: Option<u64>,
    /// Milliseconds between coalesced flushes. 0 = coalescing disabled. Default: 0.
    pub cache_interval_ms: Option<u64>,
    /// Read connections kept by the SQL backend. Default: 4.
    pub read_pool_size: Option<usize>,
}

impl StorageConfig {
    /// Returns the DSN when one is configured and non-blank.
    pub fn effective_database_dsn(&self) -> Option<&str> {
        self.database_dsn
            .as_deref()
            .map(str::trim)
            .filter(|dsn| !dsn.is_empty())
    }

    pub fn effective_store_file(&self) -> PathBuf {
        self.store_file
            .clone()
            .unwrap_or_else(|| PathBuf::from(DEFAULT_STORE_FILE))
    }

    pub fn effective_restore(&self) -> bool {
        self.restore.unwrap_or(true)
    }

    pub fn effective_store_interval(&self) -> Duration {
        Duration::from_secs(self.store_interval_secs.unwrap_or(DEFAULT_STORE_INTERVAL_SECS))
    }

    /// `None` when coalescing is disabled.
    pub fn effective_cache_interval(&self) -> Option<Duration> {
        match self.cache_interval_ms.unwrap_or(0) {
            0 => None,
            ms => Some(Duration::from_millis(ms)),
        }
    }

    pub fn effective_read_pool_size(&self) -> usize {
        self.read_pool_size.unwrap_or(DEFAULT_READ_POOL_SIZE)
    }

    pub fn validate(&self) -> Result<(), StorageError> {
        if self.effective_read_pool_size() == 0 {
            return Err(StorageError::Config {
                message: "read_pool_size must be at least 1".to_string(),
            });
        }
        if self.effective_database_dsn().is_none()
            && self.effective_store_file().as_os_str().is_empty()
        {
            return Err(StorageError::Config {
                message: "store_file must not be empty when no database_dsn is set".to_string(),
            });
        }
        Ok(())
    }
}
