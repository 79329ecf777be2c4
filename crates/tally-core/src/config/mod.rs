//! Configuration for the Tally storage engine.
//!
//! Only the typed shape and TOML decoding live here; layering CLI flags
//! and environment variables on top is the server binary's concern.

pub mod storage_config;

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::errors::StorageError;

pub use storage_config::StorageConfig;

/// Top-level configuration aggregating all subsystem configs.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct TallyConfig {
    pub storage: StorageConfig,
}

impl TallyConfig {
    /// Load config from a TOML string, falling back to defaults for missing fields.
    pub fn from_toml(toml_str: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(toml_str)
    }

    /// Read and decode a TOML config file, then validate it.
    pub fn from_file(path: &Path) -> Result<Self, StorageError> {
        let raw = std::fs::read_to_string(path)?;
        let config = Self::from_toml(&raw).map_err(|e| StorageError::Config {
            message: format!("{}: {e}", path.display()),
        })?;
        config.validate()?;
        ::tracing::debug!(path = %path.display(), "config loaded");
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), StorageError> {
        self.storage.validate()
    }
}
