//! Lock table configuration with precedence and validation
//!
//! Precedence, lowest first: built-in defaults, an optional JSON config file,
//! environment variables, then whatever the caller sets through the builder.

use crate::constants::{
    DEFAULT_SLOTS, DEFAULT_TABLE_FILENAME, MAX_SLOTS, SHMCACHE_SLOTS_VAR,
    SHMCACHE_TABLE_PATH_VAR,
};
use crate::errors::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Configuration for a shared lock table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LockTableConfig {
    /// Backing file mapped by every worker
    pub path: PathBuf,
    /// Number of lock slots in the table
    pub slots: u32,
}

impl Default for LockTableConfig {
    fn default() -> Self {
        Self {
            path: std::env::temp_dir().join(DEFAULT_TABLE_FILENAME),
            slots: DEFAULT_SLOTS,
        }
    }
}

impl LockTableConfig {
    /// Load defaults overridden by the environment
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();
        config.apply_env()?;
        Ok(config)
    }

    /// Load a JSON config file; missing fields keep their defaults
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::io(path, "read config file", e))?;
        let config: Self = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Override fields from `SHMCACHE_TABLE_PATH` and `SHMCACHE_SLOTS`
    pub fn apply_env(&mut self) -> Result<()> {
        if let Ok(path) = std::env::var(SHMCACHE_TABLE_PATH_VAR) {
            if !path.is_empty() {
                self.path = PathBuf::from(path);
            }
        }

        if let Ok(slots) = std::env::var(SHMCACHE_SLOTS_VAR) {
            self.slots = slots.trim().parse().map_err(|_| {
                Error::configuration(format!(
                    "{SHMCACHE_SLOTS_VAR} must be a positive integer, got '{slots}'"
                ))
            })?;
        }

        self.validate()
    }

    /// Check that the configuration describes a usable table
    pub fn validate(&self) -> Result<()> {
        if self.slots == 0 || self.slots > MAX_SLOTS {
            return Err(Error::configuration(format!(
                "slot count must be between 1 and {MAX_SLOTS}, got {}",
                self.slots
            )));
        }
        if self.path.as_os_str().is_empty() {
            return Err(Error::configuration("lock table path must not be empty"));
        }
        Ok(())
    }
}

/// Builder for creating lock table configurations
pub struct LockTableConfigBuilder {
    config: LockTableConfig,
}

impl LockTableConfigBuilder {
    /// Create a new builder with default configuration
    pub fn new() -> Self {
        Self {
            config: LockTableConfig::default(),
        }
    }

    /// Start from an existing configuration
    pub fn from_config(config: LockTableConfig) -> Self {
        Self { config }
    }

    /// Set the backing file path
    pub fn with_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.path = path.into();
        self
    }

    /// Set the number of slots
    pub fn with_slots(mut self, slots: u32) -> Self {
        self.config.slots = slots;
        self
    }

    /// Build and validate the configuration
    pub fn build(self) -> Result<LockTableConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

impl Default for LockTableConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}
