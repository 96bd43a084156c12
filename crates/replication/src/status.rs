//! `ReplicationStatus`: the toggler and failure flags persisted as
//! `replstat.txt` on every configured folder root.

use ordb_core::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Which folder root is currently active; the other is passive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Toggler {
    /// Folder 0 is active.
    A,
    /// Folder 1 is active.
    B,
}

impl Toggler {
    /// Flip to the other folder.
    pub fn flipped(self) -> Self {
        match self {
            Toggler::A => Toggler::B,
            Toggler::B => Toggler::A,
        }
    }
}

/// Replication state for one database: which folder is active, whether
/// the passive side has fallen behind, and where to find the
/// fast-forward log if so.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReplicationStatus {
    pub active_folder_toggler: Toggler,
    pub failed_to_replicate: bool,
    pub log_commit_changes: bool,
    pub last_fail_time: i64,
    pub last_delta_log_file: Option<String>,
}

impl Default for ReplicationStatus {
    fn default() -> Self {
        ReplicationStatus {
            active_folder_toggler: Toggler::A,
            failed_to_replicate: false,
            log_commit_changes: false,
            last_fail_time: 0,
            last_delta_log_file: None,
        }
    }
}

fn status_path(root: &Path) -> PathBuf {
    root.join("replstat.txt")
}

impl ReplicationStatus {
    /// Load the status file under `root`, or a fresh default if it
    /// doesn't exist yet (a brand-new database).
    pub fn load(root: &Path) -> Result<Self> {
        match fs::read(status_path(root)) {
            Ok(bytes) => {
                serde_json::from_slice(&bytes).map_err(|e| Error::Serialization(e.to_string()))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(ReplicationStatus::default()),
            Err(e) => Err(e.into()),
        }
    }

    /// Persist the status file under `root`.
    pub fn save(&self, root: &Path) -> Result<()> {
        fs::create_dir_all(root)?;
        let bytes = serde_json::to_vec_pretty(self).map_err(|e| Error::Serialization(e.to_string()))?;
        fs::write(status_path(root), bytes)?;
        Ok(())
    }
}
