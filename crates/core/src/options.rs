//! Transaction-scoped construction options.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

/// Whether a transaction may write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Read-only: `Commit` validates the read set but writes nothing.
    ForReading,
    /// Read-write: `Commit` runs the full two-phase protocol.
    ForWriting,
}

/// Which L2 cache implementation a transaction's stores should use.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum CacheType {
    /// No L2 cache; every miss goes straight to the registry/blob store.
    #[default]
    NoCache,
    /// A process-local in-memory L2, for tests and standalone mode.
    InMemory,
    /// A networked/clustered L2 cache.
    Networked,
}

/// Erasure-coding parameters for one blob table (or the database
/// default).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErasureConfig {
    /// Number of data shards (`D`).
    pub data_shards: usize,
    /// Number of parity shards (`P`); up to this many shards may be
    /// missing or corrupt on read.
    pub parity_shards: usize,
    /// One base folder per `D + P` drive.
    pub drive_paths: Vec<PathBuf>,
    /// Attempt to rewrite missing shards after a successful repair read.
    pub repair_on_read: bool,
}

impl ErasureConfig {
    /// Total shard count `D + P`.
    pub fn total_shards(&self) -> usize {
        self.data_shards + self.parity_shards
    }

    /// Validate that shard counts are non-zero and match the configured
    /// drive paths.
    pub fn validate(&self) -> Result<(), String> {
        if self.data_shards == 0 {
            return Err("erasure config requires at least 1 data shard".into());
        }
        if self.drive_paths.len() != self.total_shards() {
            return Err(format!(
                "erasure config expects {} drive paths (data {} + parity {}), got {}",
                self.total_shards(),
                self.data_shards,
                self.parity_shards,
                self.drive_paths.len()
            ));
        }
        Ok(())
    }
}

/// Construction-time options for a transaction.
#[derive(Debug, Clone)]
pub struct TransactionOptions {
    pub mode: Mode,
    /// Upper bound on total commit duration; exceeding it forces
    /// rollback.
    pub max_time: Duration,
    /// Base folders backing this transaction's stores (primary first,
    /// optional passive second for replication).
    pub stores_folders: Vec<PathBuf>,
    pub cache_type: CacheType,
    /// Per-table erasure config, keyed by blob table name, plus an
    /// optional `"default"` entry.
    pub erasure_config: HashMap<String, ErasureConfig>,
    /// Number of registry segment files (`hash(logical_id) mod P`).
    pub registry_hash_mod_value: u32,
    pub logging: bool,
    /// Use the L2 cache's lock primitive for per-sector registry locks
    /// instead of OS file-range locking.
    pub use_cache_for_file_region_locks: bool,
}

impl Default for TransactionOptions {
    fn default() -> Self {
        TransactionOptions {
            mode: Mode::ForWriting,
            max_time: Duration::from_secs(30),
            stores_folders: Vec::new(),
            cache_type: CacheType::NoCache,
            erasure_config: HashMap::new(),
            registry_hash_mod_value: 1,
            logging: false,
            use_cache_for_file_region_locks: false,
        }
    }
}

impl TransactionOptions {
    /// Look up the erasure config for a table, falling back to the
    /// `"default"` entry.
    pub fn erasure_config_for(&self, table: &str) -> Option<&ErasureConfig> {
        self.erasure_config
            .get(table)
            .or_else(|| self.erasure_config.get("default"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn erasure_config_total_shards() {
        let cfg = ErasureConfig {
            data_shards: 2,
            parity_shards: 2,
            drive_paths: vec!["a".into(), "b".into(), "c".into(), "d".into()],
            repair_on_read: true,
        };
        assert_eq!(cfg.total_shards(), 4);
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn erasure_config_rejects_drive_path_mismatch() {
        let cfg = ErasureConfig {
            data_shards: 2,
            parity_shards: 2,
            drive_paths: vec!["a".into()],
            repair_on_read: false,
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn falls_back_to_default_erasure_entry() {
        let mut opts = TransactionOptions::default();
        let cfg = ErasureConfig {
            data_shards: 2,
            parity_shards: 1,
            drive_paths: vec!["a".into(), "b".into(), "c".into()],
            repair_on_read: false,
        };
        opts.erasure_config.insert("default".into(), cfg.clone());
        assert_eq!(opts.erasure_config_for("anything"), Some(&cfg));
    }
}
