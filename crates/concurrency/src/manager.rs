//! Two-phase optimistic commit.
//!
//! Phase 1: re-validate every version the transaction's read set
//! observed, stage a fresh blob for every written node into its
//! handle's inactive slot, and append log entries recording what
//! happened. Phase 2: set a work-in-progress lease on every touched
//! handle, re-check versions once more (closing the window another
//! committer could have slipped through during phase-1 I/O), flip the
//! staged slot to active, and remove the log entries.
//!
//! Phase 1's stage and phase 2's WIP lease both go through
//! [`Registry::update`]'s built-in per-record version guard (version
//! unchanged, `work_in_progress_expiry` set); a mismatch there surfaces
//! as `Error::Conflict` and the transaction aborts without touching
//! anything further. The final flip, after [`Handle::flip`] has bumped
//! the version past what the registry holds, is written with
//! [`Registry::update_no_locks`] instead -- the WIP write immediately
//! prior already performed the live re-check, so the flip itself is no
//! longer guarded.
//!
//! A written node whose handle version no longer matches what the
//! transaction read is not an automatic conflict: [`ItemActionTracker::reconcile`]
//! decides whether the items this transaction actually touched overlap
//! with what the other committer touched, so two transactions editing
//! different items of the same shared leaf can both commit.

use crate::tracker::ItemActionTracker;
use crate::transaction::{Transaction, TransactionState};
use ordb_btree::{Node, NodeRepository};
use ordb_core::comparator::Comparator;
use ordb_core::error::{Error, Result};
use ordb_core::handle::Handle;
use ordb_core::ids::{PhysicalId, TxnId};
use ordb_core::traits::{BlobStore, Registry, TransactionLog};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{debug, info, warn};

/// What a transaction log entry records, serialized as its payload.
///
/// An abandoned transaction's sweep reads these back to find which
/// table/physical blobs phase-1 staged but never got to flip, so it
/// can garbage-collect them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum LogEntryKind {
    AddedBlob { table: String, physical: PhysicalId },
    UpdatedHandle { handle: Handle },
    RemovedBlob { table: String, physical: PhysicalId },
}

/// Orchestrates commit for transactions against one table's registry,
/// blob store and transaction log.
pub struct TransactionManager {
    registry: Arc<dyn Registry>,
    blob_store: Arc<dyn BlobStore>,
    log: Arc<dyn TransactionLog>,
    table: String,
}

fn now_epoch() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system clock before 1970")
        .as_secs() as i64
}

impl TransactionManager {
    pub fn new(
        registry: Arc<dyn Registry>,
        blob_store: Arc<dyn BlobStore>,
        log: Arc<dyn TransactionLog>,
        table: impl Into<String>,
    ) -> Self {
        TransactionManager {
            registry,
            blob_store,
            log,
            table: table.into(),
        }
    }

    /// Run the full two-phase commit for `txn` against what `tracker`
    /// recorded. On success every staged write is visible; on
    /// conflict the transaction is left in `Failed` state (nothing
    /// was flipped) and the caller should roll back and retry.
    pub fn commit<K, V, R, C>(&self, txn: &mut Transaction, tracker: &ItemActionTracker<K, V, R, C>) -> Result<()>
    where
        K: Serialize + DeserializeOwned + Clone + Send + Sync,
        V: Serialize + DeserializeOwned + Clone + Send + Sync,
        R: NodeRepository<K, V>,
        C: Comparator<K>,
    {
        if txn.state() != TransactionState::Begun {
            return Err(Error::CorruptedStore(format!(
                "commit called on transaction {} in state {:?}",
                txn.id,
                txn.state()
            )));
        }

        if let Err(e) = self.phase_one(txn.id, tracker) {
            txn.mark_failed();
            return Err(e);
        }
        txn.mark_phase1_done()?;

        if let Err(e) = self.phase_two(txn.id, tracker) {
            txn.mark_failed();
            return Err(e);
        }
        txn.mark_committed()?;
        info!(txn_id = %txn.id, "transaction committed");
        Ok(())
    }

    fn phase_one<K, V, R, C>(&self, txn_id: TxnId, tracker: &ItemActionTracker<K, V, R, C>) -> Result<()>
    where
        K: Serialize + DeserializeOwned + Clone + Send + Sync,
        V: Serialize + DeserializeOwned + Clone + Send + Sync,
        R: NodeRepository<K, V>,
        C: Comparator<K>,
    {
        for (id, expected_version) in tracker.read_set() {
            let current = self.registry.get(&self.table, &[id])?.remove(0);
            let current_version = current.map(|h| h.version);
            if current_version != expected_version {
                return Err(Error::Conflict(format!(
                    "handle {id} changed from {expected_version:?} to {current_version:?} since it was read"
                )));
            }
        }

        let mut step = 0u64;
        for (mut node, expected_version) in tracker.pending_writes() {
            let existing = self.registry.get(&self.table, &[node.id])?.remove(0);
            if let Some(h) = &existing {
                if Some(h.version) != expected_version {
                    // Another committer touched this node since we read
                    // it. Pull what they made visible and see whether
                    // the items we actually changed collide with theirs.
                    // Anything short of a readable current blob can't be
                    // proven conflict-free, so it's treated as one.
                    let current_node: Node<K, V> = h
                        .active_physical()
                        .and_then(|p| self.blob_store.get_one(&self.table, p).ok().flatten())
                        .and_then(|bytes| bincode::deserialize(&bytes).ok())
                        .ok_or_else(|| {
                            Error::Conflict(format!("node {} changed since it was read", node.id))
                        })?;
                    node = tracker.reconcile(node, current_node)?;
                }
            }
            let mut handle = existing.unwrap_or_else(|| Handle::new(node.id));
            let bytes = bincode::serialize(&node).map_err(|e| Error::Serialization(e.to_string()))?;
            let physical = PhysicalId::new();
            self.blob_store.add(&self.table, &[(physical, bytes)])?;
            handle.stage(physical);

            let payload = bincode::serialize(&LogEntryKind::AddedBlob {
                table: self.table.clone(),
                physical,
            })
            .map_err(|e| Error::Serialization(e.to_string()))?;
            self.log.add(txn_id, step, &payload)?;
            step += 1;

            self.registry.update(&self.table, &[handle])?;
        }

        for id in tracker.pending_removals() {
            if let Some(mut handle) = self.registry.get(&self.table, &[id])?.remove(0) {
                handle.deleted = true;
                self.registry.update(&self.table, &[handle])?;
            }
        }

        debug!(txn_id = %txn_id, steps = step, "phase 1 complete");
        Ok(())
    }

    fn phase_two<K, V, R, C>(&self, txn_id: TxnId, tracker: &ItemActionTracker<K, V, R, C>) -> Result<()>
    where
        K: Serialize + DeserializeOwned + Clone + Send + Sync,
        V: Serialize + DeserializeOwned + Clone + Send + Sync,
        R: NodeRepository<K, V>,
        C: Comparator<K>,
    {
        let ids: Vec<_> = tracker
            .pending_writes()
            .into_iter()
            .map(|(n, _)| n.id)
            .chain(tracker.pending_removals())
            .collect();

        let lease = now_epoch() + 30;
        let mut flipped = Vec::with_capacity(ids.len());
        for id in &ids {
            let mut handle = self
                .registry
                .get(&self.table, &[*id])?
                .remove(0)
                .ok_or_else(|| Error::NotFound(format!("handle {id} vanished before phase 2")))?;
            handle.work_in_progress_expiry = Some(lease);
            self.registry.update(&self.table, &[handle.clone()])?;
            handle.flip();
            handle.work_in_progress_expiry = None;
            flipped.push(handle);
        }

        // The WIP write just above already ran the optimistic re-check for
        // every id in `flipped`; `flip()` then bumped each handle's version
        // past what the registry still holds, so a second guarded `update`
        // here would always reject its own commit. Persist the flip
        // unconditionally.
        self.registry.update_no_locks(&self.table, &flipped)?;
        if let Err(e) = self.registry.replicate(&self.table, &flipped) {
            warn!(txn_id = %txn_id, error = %e, "replication of committed handles failed");
        }
        self.log.remove(txn_id)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ordb_core::comparator::NaturalOrder;
    use ordb_core::ids::LogicalId;
    use ordb_core::options::TransactionOptions;
    use parking_lot::Mutex;
    use std::collections::HashMap;

    #[derive(Default)]
    struct MemNodeRepo {
        nodes: Mutex<HashMap<LogicalId, Node<i32, i32>>>,
    }

    impl NodeRepository<i32, i32> for MemNodeRepo {
        fn get(&self, id: LogicalId) -> Result<Node<i32, i32>> {
            self.nodes
                .lock()
                .get(&id)
                .cloned()
                .ok_or_else(|| Error::NotFound(format!("{id}")))
        }
        fn new_id(&self) -> LogicalId {
            LogicalId::new()
        }
        fn add(&self, node: &Node<i32, i32>) -> Result<()> {
            self.nodes.lock().insert(node.id, node.clone());
            Ok(())
        }
        fn update(&self, node: &Node<i32, i32>) -> Result<()> {
            self.nodes.lock().insert(node.id, node.clone());
            Ok(())
        }
        fn remove(&self, id: LogicalId) -> Result<()> {
            self.nodes.lock().remove(&id);
            Ok(())
        }
    }

    #[derive(Default)]
    struct MemRegistry {
        handles: Mutex<HashMap<LogicalId, Handle>>,
    }

    impl Registry for MemRegistry {
        fn add(&self, _table: &str, handles: &[Handle]) -> Result<()> {
            let mut map = self.handles.lock();
            for h in handles {
                map.insert(h.logical_id, h.clone());
            }
            Ok(())
        }
        fn update(&self, _table: &str, handles: &[Handle]) -> Result<()> {
            let mut map = self.handles.lock();
            for h in handles {
                if let Some(current) = map.get(&h.logical_id) {
                    if current.version != h.version {
                        return Err(Error::Conflict(format!("{}", h.logical_id)));
                    }
                }
                map.insert(h.logical_id, h.clone());
            }
            Ok(())
        }
        fn update_no_locks(&self, _table: &str, handles: &[Handle]) -> Result<()> {
            let mut map = self.handles.lock();
            for h in handles {
                map.insert(h.logical_id, h.clone());
            }
            Ok(())
        }
        fn get(&self, _table: &str, logical_ids: &[LogicalId]) -> Result<Vec<Option<Handle>>> {
            let map = self.handles.lock();
            Ok(logical_ids.iter().map(|id| map.get(id).cloned()).collect())
        }
        fn remove(&self, _table: &str, logical_ids: &[LogicalId]) -> Result<()> {
            let mut map = self.handles.lock();
            for id in logical_ids {
                map.remove(id);
            }
            Ok(())
        }
        fn replicate(&self, _table: &str, _handles: &[Handle]) -> Result<()> {
            Ok(())
        }
    }

    #[derive(Default)]
    struct MemBlobStore {
        blobs: Mutex<HashMap<PhysicalId, Vec<u8>>>,
    }

    impl BlobStore for MemBlobStore {
        fn add(&self, _table: &str, items: &[(PhysicalId, Vec<u8>)]) -> Result<()> {
            let mut map = self.blobs.lock();
            for (id, bytes) in items {
                map.insert(*id, bytes.clone());
            }
            Ok(())
        }
        fn update(&self, table: &str, items: &[(PhysicalId, Vec<u8>)]) -> Result<()> {
            self.add(table, items)
        }
        fn get_one(&self, _table: &str, id: PhysicalId) -> Result<Option<Vec<u8>>> {
            Ok(self.blobs.lock().get(&id).cloned())
        }
        fn remove(&self, _table: &str, ids: &[PhysicalId]) -> Result<()> {
            let mut map = self.blobs.lock();
            for id in ids {
                map.remove(id);
            }
            Ok(())
        }
    }

    #[derive(Default)]
    struct MemLog {
        entries: Mutex<HashMap<TxnId, Vec<(u64, Vec<u8>)>>>,
    }

    impl TransactionLog for MemLog {
        fn add(&self, tid: TxnId, step: u64, payload: &[u8]) -> Result<()> {
            self.entries.lock().entry(tid).or_default().push((step, payload.to_vec()));
            Ok(())
        }
        fn remove(&self, tid: TxnId) -> Result<()> {
            self.entries.lock().remove(&tid);
            Ok(())
        }
        fn get_one(&self) -> Result<Option<TxnId>> {
            Ok(None)
        }
        fn get_one_of_hour(&self, _hour: &str) -> Result<Option<TxnId>> {
            Ok(None)
        }
        fn new_uuid(&self) -> TxnId {
            TxnId::new()
        }
    }

    fn no_versions() -> crate::tracker::VersionOracle {
        Arc::new(|_| None)
    }

    #[test]
    fn commit_of_new_nodes_makes_them_visible_via_the_registry() {
        let registry: Arc<dyn Registry> = Arc::new(MemRegistry::default());
        let blobs: Arc<dyn BlobStore> = Arc::new(MemBlobStore::default());
        let log: Arc<dyn TransactionLog> = Arc::new(MemLog::default());
        let manager = TransactionManager::new(registry.clone(), blobs, log, "nodes");

        let tracker = ItemActionTracker::new(MemNodeRepo::default(), no_versions(), NaturalOrder);
        let id = tracker.new_id();
        tracker.add(&Node::new_leaf(id, None)).unwrap();

        let mut txn = Transaction::new(TxnId::new(), TransactionOptions::default());
        txn.begin().unwrap();
        manager.commit(&mut txn, &tracker).unwrap();

        assert_eq!(txn.state(), TransactionState::Committed);
        let handle = registry.get("nodes", &[id]).unwrap().remove(0).unwrap();
        assert!(handle.active_physical().is_some());
    }

    #[test]
    fn commit_fails_when_a_read_node_was_changed_by_another_committer() {
        let registry: Arc<dyn Registry> = Arc::new(MemRegistry::default());
        let blobs: Arc<dyn BlobStore> = Arc::new(MemBlobStore::default());
        let log: Arc<dyn TransactionLog> = Arc::new(MemLog::default());
        let manager = TransactionManager::new(registry.clone(), blobs, log, "nodes");

        let id = LogicalId::new();
        let handle = Handle::new(id);
        registry.add("nodes", &[handle.clone()]).unwrap();

        let repo = MemNodeRepo::default();
        repo.add(&Node::new_leaf(id, None)).unwrap();
        let oracle_version = handle.version;
        let tracker = ItemActionTracker::new(repo, Arc::new(move |_| Some(oracle_version)), NaturalOrder);
        let node = tracker.get(id).unwrap(); // records the read at oracle_version
        tracker.update(&node).unwrap();

        // another committer bumps the handle's version in the meantime
        let mut raced = handle.clone();
        raced.flip();
        registry.update_no_locks("nodes", &[raced]).unwrap();

        let mut txn = Transaction::new(TxnId::new(), TransactionOptions::default());
        txn.begin().unwrap();
        let err = manager.commit(&mut txn, &tracker).unwrap_err();
        assert!(err.is_conflict());
        assert_eq!(txn.state(), TransactionState::Failed);
    }
}
