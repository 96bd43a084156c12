//! `ReplicationTracker`: decides which folder root is active, logs
//! commit deltas while the passive side is behind, and fast-forwards
//! it back into sync.

use crate::status::{ReplicationStatus, Toggler};
use ordb_core::error::{Error, Result};
use ordb_core::ids::TxnId;
use ordb_durability::encoding::{append_record, decode_records};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::fs::{self, OpenOptions};
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{info, warn};

fn now_epoch() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

fn hour_bucket(time: SystemTime) -> String {
    let datetime: chrono::DateTime<chrono::Utc> = time.into();
    datetime.format("%Y%m%d%H").to_string()
}

fn copy_dir_recursive(from: &Path, to: &Path, skip: &[&str]) -> Result<()> {
    fs::create_dir_all(to)?;
    for entry in fs::read_dir(from)? {
        let entry = entry?;
        let name = entry.file_name();
        if skip.iter().any(|s| name.to_str() == Some(*s)) {
            continue;
        }
        let src = entry.path();
        let dst = to.join(&name);
        if entry.file_type()?.is_dir() {
            copy_dir_recursive(&src, &dst, skip)?;
        } else {
            fs::copy(&src, &dst)?;
        }
    }
    Ok(())
}

/// Tracks active/passive placement for one database's folder roots and
/// mediates the failure/fast-forward cycle described for
/// `ReplicationStatus`.
pub struct ReplicationTracker {
    active_root: PathBuf,
    passive_root: PathBuf,
    status: Mutex<ReplicationStatus>,
    commit_seq: Mutex<HashMap<TxnId, u64>>,
}

impl ReplicationTracker {
    /// Load (or initialize) replication status from `active_root`.
    pub fn new(active_root: impl Into<PathBuf>, passive_root: impl Into<PathBuf>) -> Result<Self> {
        let active_root = active_root.into();
        let status = ReplicationStatus::load(&active_root)?;
        Ok(ReplicationTracker {
            active_root,
            passive_root: passive_root.into(),
            status: Mutex::new(status),
            commit_seq: Mutex::new(HashMap::new()),
        })
    }

    /// Current status snapshot.
    pub fn status(&self) -> ReplicationStatus {
        self.status.lock().clone()
    }

    fn commit_logs_dir(&self) -> PathBuf {
        self.active_root.join("commitlogs")
    }

    /// Record that a passive-side mirror write failed. Sets
    /// `failed_to_replicate` and enables commit-change logging so the
    /// gap can be fast-forwarded later.
    pub fn record_replicate_failure(&self) -> Result<()> {
        let mut status = self.status.lock();
        status.failed_to_replicate = true;
        status.log_commit_changes = true;
        status.last_fail_time = now_epoch();
        status.save(&self.active_root)?;
        warn!("passive replica write failed, commit-change logging enabled");
        Ok(())
    }

    /// True while the passive side has fallen behind and every commit
    /// must also append a fast-forward record.
    pub fn should_log_commit_changes(&self) -> bool {
        self.status.lock().log_commit_changes
    }

    /// Append one commit-change record for `tid`, if logging is
    /// currently enabled. A no-op (not an error) when replication is
    /// healthy, since most commits never need this.
    pub fn log_commit_change(&self, tid: TxnId, payload: &[u8]) -> Result<()> {
        if !self.should_log_commit_changes() {
            return Ok(());
        }
        let step = {
            let mut seq = self.commit_seq.lock();
            let entry = seq.entry(tid).or_insert(0);
            let step = *entry;
            *entry += 1;
            step
        };

        let hour = hour_bucket(SystemTime::now());
        let dir = self.commit_logs_dir().join(&hour);
        fs::create_dir_all(&dir)?;
        let path = dir.join(format!("{}.log", tid.as_uuid()));
        let mut file = OpenOptions::new().create(true).append(true).open(&path)?;
        append_record(&mut file, step, payload)?;

        let mut status = self.status.lock();
        status.last_delta_log_file = Some(path.display().to_string());
        status.save(&self.active_root)?;
        Ok(())
    }

    /// Flip the active/passive toggler if `error` is the specific
    /// class that justifies failover (never for blob-store or B-tree
    /// errors).
    pub fn on_possible_failover(&self, error: &Error) -> Result<()> {
        if !error.is_failover_qualified() {
            return Ok(());
        }
        let mut status = self.status.lock();
        status.active_folder_toggler = status.active_folder_toggler.flipped();
        status.save(&self.active_root)?;
        warn!("registry write unrecoverable, flipped active folder toggler");
        Ok(())
    }

    /// Re-copy the active stores to the passive root, then replay
    /// every commit-change record accumulated since the failure
    /// through `apply`, in file order, before clearing both flags.
    ///
    /// `apply` receives each record's raw payload (the same bytes
    /// passed to `log_commit_change`); the caller decides how to
    /// re-apply a delta to the passive registry/store repository.
    pub fn reinstate_failed_drives<F>(&self, mut apply: F) -> Result<()>
    where
        F: FnMut(&[u8]) -> Result<()>,
    {
        copy_dir_recursive(&self.active_root, &self.passive_root, &["commitlogs"])?;

        let commit_dir = self.commit_logs_dir();
        let mut hours = match fs::read_dir(&commit_dir) {
            Ok(entries) => entries
                .flatten()
                .filter(|e| e.file_type().map(|t| t.is_dir()).unwrap_or(false))
                .map(|e| e.path())
                .collect::<Vec<_>>(),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Vec::new(),
            Err(e) => return Err(e.into()),
        };
        hours.sort();

        for hour_dir in &hours {
            let mut files = fs::read_dir(hour_dir)?
                .flatten()
                .map(|e| e.path())
                .collect::<Vec<_>>();
            files.sort();
            for file in files {
                let bytes = fs::read(&file)?;
                for record in decode_records(&bytes) {
                    apply(&record.payload)?;
                }
            }
        }

        if commit_dir.exists() {
            fs::remove_dir_all(&commit_dir)?;
        }

        let mut status = self.status.lock();
        status.failed_to_replicate = false;
        status.log_commit_changes = false;
        status.last_delta_log_file = None;
        status.save(&self.active_root)?;
        self.commit_seq.lock().clear();
        info!("passive replica reinstated from fast-forward log");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failure_then_commit_logs_until_reinstated() {
        let active = tempfile::tempdir().unwrap();
        let passive = tempfile::tempdir().unwrap();
        fs::write(active.path().join("marker.txt"), b"store data").unwrap();

        let tracker = ReplicationTracker::new(active.path(), passive.path()).unwrap();
        assert!(!tracker.should_log_commit_changes());

        tracker.record_replicate_failure().unwrap();
        assert!(tracker.should_log_commit_changes());

        let tid = TxnId::new();
        tracker.log_commit_change(tid, b"delta-1").unwrap();
        tracker.log_commit_change(tid, b"delta-2").unwrap();

        let mut applied = Vec::new();
        tracker
            .reinstate_failed_drives(|payload| {
                applied.push(payload.to_vec());
                Ok(())
            })
            .unwrap();

        assert_eq!(applied, vec![b"delta-1".to_vec(), b"delta-2".to_vec()]);
        assert!(!tracker.should_log_commit_changes());
        assert!(!tracker.status().failed_to_replicate);
        assert!(passive.path().join("marker.txt").exists());
    }

    #[test]
    fn healthy_replication_never_writes_a_commit_log() {
        let active = tempfile::tempdir().unwrap();
        let passive = tempfile::tempdir().unwrap();
        let tracker = ReplicationTracker::new(active.path(), passive.path()).unwrap();
        tracker.log_commit_change(TxnId::new(), b"x").unwrap();
        assert!(!tracker.commit_logs_dir().exists());
    }

    #[test]
    fn failover_qualified_error_flips_the_toggler() {
        let active = tempfile::tempdir().unwrap();
        let passive = tempfile::tempdir().unwrap();
        let tracker = ReplicationTracker::new(active.path(), passive.path()).unwrap();
        assert_eq!(tracker.status().active_folder_toggler, Toggler::A);

        tracker
            .on_possible_failover(&Error::FailoverQualified("registry sector write failed".into()))
            .unwrap();
        assert_eq!(tracker.status().active_folder_toggler, Toggler::B);
    }

    #[test]
    fn plain_conflict_error_never_flips_the_toggler() {
        let active = tempfile::tempdir().unwrap();
        let passive = tempfile::tempdir().unwrap();
        let tracker = ReplicationTracker::new(active.path(), passive.path()).unwrap();
        tracker
            .on_possible_failover(&Error::Conflict("handle version mismatch".into()))
            .unwrap();
        assert_eq!(tracker.status().active_folder_toggler, Toggler::A);
    }
}
