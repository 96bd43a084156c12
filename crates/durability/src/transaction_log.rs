//! Hour-bucketed, per-transaction log files for crash recovery.
//!
//! Every in-flight transaction writes its `AddedBlob`/`UpdatedHandle`/
//! `Committed` steps to `<base>/translogs/<hour>/<txid>.log`, hour
//! being `now.format("%Y%m%d%H")` at the time the file was first
//! created. Bucketing by hour keeps `get_one`/`get_one_of_hour` from
//! having to scan every transaction ever logged: a sweep only has to
//! look inside buckets old enough that every file in them could
//! plausibly have expired.

use dashmap::DashMap;
use ordb_core::error::{Error, Result};
use ordb_core::ids::TxnId;
use ordb_core::traits::{PriorityLog, TransactionLog};
use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::{Duration, SystemTime};
use tracing::{debug, warn};

use crate::encoding::append_record;

fn hour_bucket(time: SystemTime) -> String {
    let datetime: chrono::DateTime<chrono::Utc> = time.into();
    datetime.format("%Y%m%d%H").to_string()
}

fn file_name(tid: TxnId) -> String {
    format!("{}.log", tid.as_uuid())
}

/// File-backed [`TransactionLog`]: one append-only file per
/// transaction, filed under an hour-bucket directory.
///
/// `DashMap<TxnId, PathBuf>` caches the bucket a live transaction's
/// file lives in so `add`/`remove` don't need to scan the directory
/// tree on the common path; the sweep methods (`get_one`,
/// `get_one_of_hour`) fall back to scanning buckets directly since
/// they have no transaction ID to look up by until they find one.
pub struct FileTransactionLog {
    base_dir: PathBuf,
    lease: Duration,
    locations: DashMap<TxnId, PathBuf>,
    priority: Mutex<Vec<TxnId>>,
}

impl FileTransactionLog {
    pub fn new(base_dir: impl Into<PathBuf>, lease: Duration) -> Self {
        FileTransactionLog {
            base_dir: base_dir.into(),
            lease,
            locations: DashMap::new(),
            priority: Mutex::new(Vec::new()),
        }
    }

    fn translogs_dir(&self) -> PathBuf {
        self.base_dir.join("translogs")
    }

    fn bucket_dir(&self, hour: &str) -> PathBuf {
        self.translogs_dir().join(hour)
    }

    fn path_for(&self, tid: TxnId) -> PathBuf {
        if let Some(path) = self.locations.get(&tid) {
            return path.clone();
        }
        self.bucket_dir(&hour_bucket(SystemTime::now()))
            .join(file_name(tid))
    }

    /// Read back every record written for `tid`, in step order, for
    /// replay during recovery. `Ok(Vec::new())` if the transaction has
    /// no log (already finalized, or never started).
    pub fn read_back(&self, tid: TxnId) -> Result<Vec<crate::encoding::Record>> {
        let path = self.path_for(tid);
        match fs::read(&path) {
            Ok(bytes) => Ok(crate::encoding::decode_records(&bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new()),
            Err(e) => Err(e.into()),
        }
    }

    fn open_for_append(&self, tid: TxnId) -> Result<(File, PathBuf)> {
        if let Some(path) = self.locations.get(&tid).map(|p| p.clone()) {
            let file = OpenOptions::new().create(true).append(true).open(&path)?;
            return Ok((file, path));
        }
        let hour = hour_bucket(SystemTime::now());
        let dir = self.bucket_dir(&hour);
        fs::create_dir_all(&dir)?;
        let path = dir.join(file_name(tid));
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        self.locations.insert(tid, path.clone());
        Ok((file, path))
    }

    /// Oldest file (by modified time) under `dir`, parsed back to a
    /// `TxnId` from its file stem.
    fn oldest_expired_in(&self, dir: &Path) -> Result<Option<TxnId>> {
        let entries = match fs::read_dir(dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let mut oldest: Option<(SystemTime, TxnId)> = None;
        for entry in entries {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            let stem = match entry.path().file_stem().and_then(|s| s.to_str()) {
                Some(stem) => stem.to_string(),
                None => continue,
            };
            let tid = match uuid::Uuid::parse_str(&stem) {
                Ok(uuid) => TxnId::from_uuid(uuid),
                Err(_) => continue,
            };
            let modified = entry.metadata()?.modified()?;
            if modified.elapsed().unwrap_or(Duration::ZERO) < self.lease {
                continue;
            }
            if oldest.as_ref().map_or(true, |(t, _)| modified < *t) {
                oldest = Some((modified, tid));
            }
        }

        Ok(oldest.map(|(_, tid)| tid))
    }
}

impl TransactionLog for FileTransactionLog {
    fn add(&self, tid: TxnId, step: u64, payload: &[u8]) -> Result<()> {
        let (mut file, path) = self.open_for_append(tid)?;
        append_record(&mut file, step, payload)?;
        debug!(%tid, step, path = %path.display(), "appended transaction log record");
        Ok(())
    }

    fn remove(&self, tid: TxnId) -> Result<()> {
        let path = if let Some((_, path)) = self.locations.remove(&tid) {
            path
        } else {
            // Not in the in-memory cache (process restarted after a
            // crash); fall back to scanning hour buckets for the file.
            let dir = self.translogs_dir();
            let mut found = None;
            if let Ok(hours) = fs::read_dir(&dir) {
                for hour in hours.flatten() {
                    let candidate = hour.path().join(file_name(tid));
                    if candidate.exists() {
                        found = Some(candidate);
                        break;
                    }
                }
            }
            match found {
                Some(path) => path,
                None => return Ok(()),
            }
        };

        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    fn get_one(&self) -> Result<Option<TxnId>> {
        {
            let mut priority = self.priority.lock().unwrap();
            if let Some(tid) = priority.pop() {
                return Ok(Some(tid));
            }
        }

        let dir = self.translogs_dir();
        let mut hours = match fs::read_dir(&dir) {
            Ok(entries) => entries
                .flatten()
                .filter(|e| e.file_type().map(|t| t.is_dir()).unwrap_or(false))
                .map(|e| e.file_name().to_string_lossy().into_owned())
                .collect::<Vec<_>>(),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        hours.sort();

        for hour in hours {
            if let Some(tid) = self.oldest_expired_in(&self.bucket_dir(&hour))? {
                return Ok(Some(tid));
            }
        }
        Ok(None)
    }

    fn get_one_of_hour(&self, hour: &str) -> Result<Option<TxnId>> {
        self.oldest_expired_in(&self.bucket_dir(hour))
    }

    fn new_uuid(&self) -> TxnId {
        TxnId::new()
    }
}

impl PriorityLog for FileTransactionLog {
    fn prioritize(&self, tid: TxnId) -> Result<()> {
        if !self.locations.contains_key(&tid) {
            return Err(Error::NotFound(format!("transaction {tid}")));
        }
        self.priority.lock().unwrap().push(tid);
        warn!(%tid, "transaction prioritized for next sweep");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ordb_core::ids::TxnId;
    use std::thread::sleep;

    fn log(dir: &Path) -> FileTransactionLog {
        FileTransactionLog::new(dir, Duration::from_millis(50))
    }

    #[test]
    fn add_then_read_back_returns_records_in_step_order() {
        let dir = tempfile::tempdir().unwrap();
        let log = log(dir.path());
        let tid = log.new_uuid();
        log.add(tid, 0, b"begin").unwrap();
        log.add(tid, 1, b"write").unwrap();
        log.add(tid, 2, b"commit").unwrap();

        let records = log.read_back(tid).unwrap();
        assert_eq!(records.len(), 3);
        assert_eq!(records[0].payload, b"begin");
        assert_eq!(records[2].step, 2);
    }

    #[test]
    fn remove_deletes_the_file_and_clears_the_cache() {
        let dir = tempfile::tempdir().unwrap();
        let log = log(dir.path());
        let tid = log.new_uuid();
        log.add(tid, 0, b"x").unwrap();
        log.remove(tid).unwrap();
        assert!(log.read_back(tid).unwrap().is_empty());
    }

    #[test]
    fn remove_after_cache_eviction_still_finds_the_file_by_scanning() {
        let dir = tempfile::tempdir().unwrap();
        let log = log(dir.path());
        let tid = log.new_uuid();
        log.add(tid, 0, b"x").unwrap();
        log.locations.remove(&tid);
        log.remove(tid).unwrap();

        let dir2 = log.translogs_dir();
        let any_left = fs::read_dir(&dir2)
            .into_iter()
            .flatten()
            .flatten()
            .any(|hour| hour.path().join(file_name(tid)).exists());
        assert!(!any_left);
    }

    #[test]
    fn get_one_ignores_fresh_logs_and_returns_expired_ones() {
        let dir = tempfile::tempdir().unwrap();
        let log = log(dir.path());
        let fresh = log.new_uuid();
        log.add(fresh, 0, b"x").unwrap();
        assert_eq!(log.get_one().unwrap(), None);

        sleep(Duration::from_millis(80));
        assert_eq!(log.get_one().unwrap(), Some(fresh));
    }

    #[test]
    fn get_one_of_hour_is_scoped_to_a_single_bucket() {
        let dir = tempfile::tempdir().unwrap();
        let log = log(dir.path());
        let tid = log.new_uuid();
        log.add(tid, 0, b"x").unwrap();
        sleep(Duration::from_millis(80));

        let hour = hour_bucket(SystemTime::now());
        assert_eq!(log.get_one_of_hour(&hour).unwrap(), Some(tid));
        assert_eq!(log.get_one_of_hour("19990101000").unwrap(), None);
    }

    #[test]
    fn prioritize_unknown_transaction_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let log = log(dir.path());
        assert!(log.prioritize(TxnId::new()).is_err());
    }

    #[test]
    fn prioritized_transaction_is_returned_before_the_age_based_sweep() {
        let dir = tempfile::tempdir().unwrap();
        let log = log(dir.path());
        let tid = log.new_uuid();
        log.add(tid, 0, b"x").unwrap();
        log.prioritize(tid).unwrap();
        assert_eq!(log.get_one().unwrap(), Some(tid));
    }
}
