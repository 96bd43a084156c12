//! Idle sweep: reclaims an abandoned transaction's phase-1 leftovers.
//!
//! A transaction that logged `AddedBlob` records and then crashed
//! before phase-2 flipped anything leaves behind staged (never made
//! active) blobs and an orphaned log file -- the registry's active
//! slots were never touched, so nothing observable through the B-tree
//! needs rolling back. `sweep_once` finds the oldest log whose lease
//! has expired, deletes the blobs it staged, and removes the log file.

use ordb_concurrency::LogEntryKind;
use ordb_core::error::{Error, Result};
use ordb_core::traits::BlobStore;
use ordb_durability::FileTransactionLog;
use std::sync::Arc;
use tracing::{info, warn};

/// Run one sweep pass: reclaim at most one abandoned transaction's
/// leftovers. Returns `true` if a transaction was found and cleaned
/// up, `false` if nothing was due.
pub fn sweep_once(translog: &FileTransactionLog, blob_store: &Arc<dyn BlobStore>) -> Result<bool> {
    let tid = match translog.get_one()? {
        Some(tid) => tid,
        None => return Ok(false),
    };

    let records = translog.read_back(tid)?;
    for record in &records {
        match bincode::deserialize::<LogEntryKind>(&record.payload) {
            Ok(LogEntryKind::AddedBlob { table, physical }) => {
                if let Err(e) = blob_store.remove(&table, &[physical]) {
                    warn!(%tid, %table, %physical, error = %e, "failed to reclaim staged blob during sweep");
                }
            }
            Ok(LogEntryKind::RemovedBlob { table, physical }) => {
                if let Err(e) = blob_store.remove(&table, &[physical]) {
                    warn!(%tid, %table, %physical, error = %e, "failed to reclaim removed-blob leftover during sweep");
                }
            }
            Ok(LogEntryKind::UpdatedHandle { .. }) => {}
            Err(e) => return Err(Error::Serialization(e.to_string())),
        }
    }

    translog.remove(tid)?;
    info!(%tid, records = records.len(), "swept abandoned transaction");
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ordb_core::ids::PhysicalId;
    use ordb_storage::blob::PlainBlobStore;
    use std::thread::sleep;
    use std::time::Duration;

    #[test]
    fn sweep_reclaims_an_expired_transactions_staged_blob() {
        let dir = tempfile::tempdir().unwrap();
        let translog = FileTransactionLog::new(dir.path().join("translogs"), Duration::from_millis(20));
        let blob_store: Arc<dyn BlobStore> = Arc::new(PlainBlobStore::new(dir.path().join("blobs")));

        let tid = translog.new_uuid();
        let physical = PhysicalId::new();
        blob_store.add("people", &[(physical, b"staged".to_vec())]).unwrap();
        let payload = bincode::serialize(&LogEntryKind::AddedBlob {
            table: "people".to_string(),
            physical,
        })
        .unwrap();
        translog.add(tid, 0, &payload).unwrap();

        sleep(Duration::from_millis(40));
        assert!(sweep_once(&translog, &blob_store).unwrap());

        assert!(blob_store.get_one("people", physical).unwrap().is_none());
        assert!(translog.read_back(tid).unwrap().is_empty());
    }

    #[test]
    fn sweep_is_a_no_op_when_nothing_has_expired() {
        let dir = tempfile::tempdir().unwrap();
        let translog = FileTransactionLog::new(dir.path().join("translogs"), Duration::from_secs(30));
        let blob_store: Arc<dyn BlobStore> = Arc::new(PlainBlobStore::new(dir.path().join("blobs")));
        assert!(!sweep_once(&translog, &blob_store).unwrap());
    }
}
