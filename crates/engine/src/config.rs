//! Runtime configuration via `ordb.toml`.
//!
//! On first open, a default `ordb.toml` is written into the database's
//! base directory; to change settings, edit the file and reopen.

use ordb_core::error::{Error, Result};
use ordb_core::options::CacheType;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Config file name placed in the database's base directory.
pub const CONFIG_FILE_NAME: &str = "ordb.toml";

fn default_partitions() -> u32 {
    16
}

fn default_lease_secs() -> u64 {
    30
}

fn default_max_time_secs() -> u64 {
    30
}

/// Top-level runtime configuration, persisted as `ordb.toml` in the
/// database's base directory.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RuntimeConfig {
    /// Number of registry segment files per table (`hash(id) mod P`).
    #[serde(default = "default_partitions")]
    pub registry_partitions: u32,
    /// Which L2 cache implementation to use.
    #[serde(default)]
    pub cache_type: CacheType,
    /// Seconds a transaction's work-in-progress lease lasts before an
    /// idle sweep treats it as orphaned.
    #[serde(default = "default_lease_secs")]
    pub transaction_lease_secs: u64,
    /// Default `MaxTime` for a transaction, in seconds.
    #[serde(default = "default_max_time_secs")]
    pub max_time_secs: u64,
    /// Use the L2 cache's lock primitive for per-sector registry locks
    /// instead of in-process locking.
    #[serde(default)]
    pub use_cache_for_file_region_locks: bool,
    /// Enable structured logging of transaction lifecycle events.
    #[serde(default)]
    pub logging: bool,
    /// Optional passive folder root for replication; `None` runs
    /// standalone with no mirroring.
    #[serde(default)]
    pub passive_folder: Option<PathBuf>,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        RuntimeConfig {
            registry_partitions: default_partitions(),
            cache_type: CacheType::default(),
            transaction_lease_secs: default_lease_secs(),
            max_time_secs: default_max_time_secs(),
            use_cache_for_file_region_locks: false,
            logging: false,
            passive_folder: None,
        }
    }
}

impl RuntimeConfig {
    /// Transaction lease as a [`Duration`].
    pub fn transaction_lease(&self) -> Duration {
        Duration::from_secs(self.transaction_lease_secs)
    }

    /// Default `MaxTime` as a [`Duration`].
    pub fn max_time(&self) -> Duration {
        Duration::from_secs(self.max_time_secs)
    }

    fn config_path(base_dir: &Path) -> PathBuf {
        base_dir.join(CONFIG_FILE_NAME)
    }

    /// Load `ordb.toml` from `base_dir`, writing a fresh default one if
    /// this is a brand-new database directory.
    pub fn load_or_init(base_dir: &Path) -> Result<Self> {
        let path = Self::config_path(base_dir);
        match std::fs::read_to_string(&path) {
            Ok(contents) => toml::from_str(&contents).map_err(|e| Error::Serialization(e.to_string())),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                let config = RuntimeConfig::default();
                config.save(base_dir)?;
                Ok(config)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Persist this configuration as `ordb.toml` under `base_dir`.
    pub fn save(&self, base_dir: &Path) -> Result<()> {
        std::fs::create_dir_all(base_dir)?;
        let contents = toml::to_string_pretty(self).map_err(|e| Error::Serialization(e.to_string()))?;
        std::fs::write(Self::config_path(base_dir), contents)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_or_init_writes_a_default_config_on_first_open() {
        let dir = tempfile::tempdir().unwrap();
        let config = RuntimeConfig::load_or_init(dir.path()).unwrap();
        assert_eq!(config, RuntimeConfig::default());
        assert!(dir.path().join(CONFIG_FILE_NAME).exists());
    }

    #[test]
    fn load_or_init_reads_back_an_edited_config() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = RuntimeConfig::default();
        config.registry_partitions = 64;
        config.logging = true;
        config.save(dir.path()).unwrap();

        let loaded = RuntimeConfig::load_or_init(dir.path()).unwrap();
        assert_eq!(loaded.registry_partitions, 64);
        assert!(loaded.logging);
    }
}
