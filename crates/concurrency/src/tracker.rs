//! `ItemActionTracker`: a [`NodeRepository`] decorator that buffers
//! writes until commit and remembers every node it touched, so a
//! transaction's read/write set can be replayed against the registry
//! at commit time without re-walking the B-tree.
//!
//! Conflict detection against a node this transaction wrote to is item
//! (row) granular, not node granular: the tracker remembers the
//! per-item versions it saw the first time it read a node (its
//! "baseline"), and [`ItemActionTracker::reconcile`] uses that to tell
//! a write to one item in a shared leaf apart from a write to another.
//! Pure reads (a node this transaction only ever navigated through,
//! never wrote to) stay node granular -- see [`ItemActionTracker::read_set`].

use ordb_btree::{ordering, Node, NodeRepository};
use ordb_core::comparator::Comparator;
use ordb_core::error::{Error, Result};
use ordb_core::ids::{ItemId, LogicalId};
use ordb_core::version::Version;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

/// Supplies the version a logical ID is currently at, for recording
/// the first-seen version of every node a transaction reads. Backed
/// by a registry lookup in production; a closure in tests.
pub type VersionOracle = Arc<dyn Fn(LogicalId) -> Option<Version> + Send + Sync>;

/// Wraps an inner [`NodeRepository`], recording every logical ID read
/// (with the version seen at first access) and buffering every
/// add/update/remove so nothing is visible to other transactions
/// until the owning transaction commits.
///
/// A read of an ID already in the write buffer returns the buffered
/// value -- a transaction always sees its own uncommitted writes.
pub struct ItemActionTracker<K, V, R, C> {
    inner: R,
    comparator: C,
    version_oracle: VersionOracle,
    reads: Mutex<HashMap<LogicalId, Option<Version>>>,
    // Item versions observed in a node the first time this transaction
    // saw it, keyed by the node's logical ID. Used only by `reconcile`;
    // a node this transaction never read (a brand-new one it created
    // itself) has no entry here and needs none.
    baselines: Mutex<HashMap<LogicalId, HashMap<ItemId, Version>>>,
    writes: Mutex<HashMap<LogicalId, Node<K, V>>>,
    removed: Mutex<HashSet<LogicalId>>,
}

impl<K, V, R, C> ItemActionTracker<K, V, R, C> {
    pub fn new(inner: R, version_oracle: VersionOracle, comparator: C) -> Self {
        ItemActionTracker {
            inner,
            comparator,
            version_oracle,
            reads: Mutex::new(HashMap::new()),
            baselines: Mutex::new(HashMap::new()),
            writes: Mutex::new(HashMap::new()),
            removed: Mutex::new(HashSet::new()),
        }
    }

    /// Every logical ID read this transaction but never written by it,
    /// paired with the version observed at first access (`None` for a
    /// brand-new ID with no handle yet). A node this transaction also
    /// wrote to is excluded -- its write goes through the item-level
    /// check in `reconcile` instead of this node-level one.
    pub fn read_set(&self) -> HashMap<LogicalId, Option<Version>> {
        let writes = self.writes.lock();
        self.reads
            .lock()
            .iter()
            .filter(|(id, _)| !writes.contains_key(id))
            .map(|(id, v)| (*id, *v))
            .collect()
    }

    /// Every node staged by `add`/`update` this transaction, paired
    /// with the node-level version this transaction last saw for it
    /// (`None` for a node it created itself). Phase 1 uses the paired
    /// version as a fast path: if the registry still agrees, the write
    /// is staged as-is; if not, `reconcile` decides whether the
    /// specific items touched actually collide with another committer.
    pub fn pending_writes(&self) -> Vec<(Node<K, V>, Option<Version>)>
    where
        K: Clone,
        V: Clone,
    {
        let reads = self.reads.lock();
        self.writes
            .lock()
            .values()
            .cloned()
            .map(|node| {
                let baseline_version = reads.get(&node.id).copied().flatten();
                (node, baseline_version)
            })
            .collect()
    }

    /// Every logical ID staged for removal this transaction.
    pub fn pending_removals(&self) -> Vec<LogicalId> {
        self.removed.lock().iter().copied().collect()
    }

    fn record_read(&self, id: LogicalId, node: &Node<K, V>) {
        self.reads
            .lock()
            .entry(id)
            .or_insert_with(|| (self.version_oracle)(id));
        self.baselines
            .lock()
            .entry(id)
            .or_insert_with(|| node.items.iter().map(|i| (i.item_id, i.version)).collect());
    }

    /// Reconcile this transaction's edit of a node (`ours`, built atop
    /// the version it last read) against `current`, the version
    /// another committer has since made visible for the same logical
    /// ID. Succeeds, returning the node to persist, only if none of the
    /// items this transaction actually touched were also touched by
    /// that other committer; otherwise a genuine write-write conflict.
    ///
    /// Only a leaf can be reconciled this way: an interior node's items
    /// double as routing separators tied to specific child pointers, so
    /// splicing one committer's edits onto another's shape risks an
    /// invalid tree. A structural change on either side is always a
    /// conflict.
    pub fn reconcile(&self, ours: Node<K, V>, current: Node<K, V>) -> Result<Node<K, V>>
    where
        K: Clone,
        V: Clone,
        C: Comparator<K>,
    {
        if !ours.is_leaf() || !current.is_leaf() {
            return Err(Error::Conflict(format!(
                "node {} changed structurally since it was read",
                ours.id
            )));
        }

        let baseline = self.baselines.lock().get(&ours.id).cloned().unwrap_or_default();
        let ours_by_id: HashMap<ItemId, Version> = ours.items.iter().map(|i| (i.item_id, i.version)).collect();
        let current_by_id: HashMap<ItemId, Version> =
            current.items.iter().map(|i| (i.item_id, i.version)).collect();

        for (item_id, seen_version) in &baseline {
            let we_touched_it = ours_by_id.get(item_id) != Some(seen_version);
            let still_as_we_saw_it = current_by_id.get(item_id) == Some(seen_version);
            if we_touched_it && !still_as_we_saw_it {
                return Err(Error::Conflict(format!(
                    "item {item_id} in node {} was changed by another committer",
                    ours.id
                )));
            }
        }

        // Start from the other committer's current items and splice our
        // own edits on top: drop what we removed, overwrite what we
        // updated, and insert what we added in sorted position.
        let mut merged = current;
        merged.items.retain(|i| !baseline.contains_key(&i.item_id) || ours_by_id.contains_key(&i.item_id));
        for item in ours.items {
            if baseline.contains_key(&item.item_id) {
                if let Some(slot) = merged.items.iter_mut().find(|i| i.item_id == item.item_id) {
                    *slot = item;
                }
            } else {
                let pos = match ordering::search(&merged.items, &item.key, item.item_id, &self.comparator) {
                    Ok(i) | Err(i) => i,
                };
                merged.items.insert(pos, item);
            }
        }
        Ok(merged)
    }
}

impl<K, V, R, C> NodeRepository<K, V> for ItemActionTracker<K, V, R, C>
where
    K: Clone + Send + Sync,
    V: Clone + Send + Sync,
    R: NodeRepository<K, V>,
    C: Comparator<K>,
{
    fn get(&self, id: LogicalId) -> Result<Node<K, V>> {
        if let Some(node) = self.writes.lock().get(&id) {
            return Ok(node.clone());
        }
        if self.removed.lock().contains(&id) {
            return Err(Error::NotFound(format!("{id}")));
        }
        let node = self.inner.get(id)?;
        self.record_read(id, &node);
        Ok(node)
    }

    fn new_id(&self) -> LogicalId {
        self.inner.new_id()
    }

    fn add(&self, node: &Node<K, V>) -> Result<()> {
        self.removed.lock().remove(&node.id);
        self.writes.lock().insert(node.id, node.clone());
        Ok(())
    }

    fn update(&self, node: &Node<K, V>) -> Result<()> {
        self.add(node)
    }

    fn remove(&self, id: LogicalId) -> Result<()> {
        self.writes.lock().remove(&id);
        self.removed.lock().insert(id);
        Ok(())
    }

    fn fetched(&self, id: LogicalId) {
        self.inner.fetched(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ordb_btree::Item;
    use ordb_core::comparator::NaturalOrder;
    use ordb_core::error::Result as CoreResult;
    use ordb_core::ids::ItemId;
    use std::collections::HashMap as Map;

    #[derive(Default)]
    struct MemRepo {
        nodes: Mutex<Map<LogicalId, Node<i32, i32>>>,
    }

    impl NodeRepository<i32, i32> for MemRepo {
        fn get(&self, id: LogicalId) -> CoreResult<Node<i32, i32>> {
            self.nodes
                .lock()
                .get(&id)
                .cloned()
                .ok_or_else(|| Error::NotFound(format!("{id}")))
        }
        fn new_id(&self) -> LogicalId {
            LogicalId::new()
        }
        fn add(&self, node: &Node<i32, i32>) -> CoreResult<()> {
            self.nodes.lock().insert(node.id, node.clone());
            Ok(())
        }
        fn update(&self, node: &Node<i32, i32>) -> CoreResult<()> {
            self.nodes.lock().insert(node.id, node.clone());
            Ok(())
        }
        fn remove(&self, id: LogicalId) -> CoreResult<()> {
            self.nodes.lock().remove(&id);
            Ok(())
        }
    }

    fn no_versions() -> VersionOracle {
        Arc::new(|_| None)
    }

    #[test]
    fn read_of_uncommitted_write_returns_the_buffered_value() {
        let tracker = ItemActionTracker::new(MemRepo::default(), no_versions(), NaturalOrder);
        let id = tracker.new_id();
        let node = Node::new_leaf(id, None);
        tracker.add(&node).unwrap();
        assert_eq!(tracker.get(id).unwrap().id, id);
    }

    #[test]
    fn removed_id_reads_as_not_found_even_if_present_upstream() {
        let repo = MemRepo::default();
        let id = LogicalId::new();
        repo.add(&Node::new_leaf(id, None)).unwrap();
        let tracker = ItemActionTracker::new(repo, no_versions(), NaturalOrder);
        tracker.remove(id).unwrap();
        assert!(tracker.get(id).is_err());
    }

    #[test]
    fn first_read_of_an_upstream_node_is_recorded_once() {
        let repo = MemRepo::default();
        let id = LogicalId::new();
        repo.add(&Node::new_leaf(id, None)).unwrap();
        let tracker = ItemActionTracker::new(repo, no_versions(), NaturalOrder);
        tracker.get(id).unwrap();
        tracker.get(id).unwrap();
        assert_eq!(tracker.read_set().len(), 1);
    }

    #[test]
    fn pending_writes_and_removals_reflect_buffered_state() {
        let tracker = ItemActionTracker::new(MemRepo::default(), no_versions(), NaturalOrder);
        let a = tracker.new_id();
        let b = tracker.new_id();
        tracker.add(&Node::new_leaf(a, None)).unwrap();
        tracker.add(&Node::new_leaf(b, None)).unwrap();
        tracker.remove(a).unwrap();

        assert_eq!(tracker.pending_writes().len(), 1);
        assert_eq!(tracker.pending_removals(), vec![a]);
    }

    /// The core of row-level conflict detection: a transaction that
    /// updated item A in a leaf must be able to reconcile against a
    /// concurrently-committed version of the same leaf where someone
    /// else added item B, and end up with both.
    #[test]
    fn reconcile_merges_disjoint_item_edits_to_the_same_leaf() {
        let repo = MemRepo::default();
        let id = LogicalId::new();
        let a = ItemId::new();
        let mut base = Node::new_leaf(id, None);
        base.items.push(Item::with_id(1, 10, a));
        repo.add(&base).unwrap();

        let tracker = ItemActionTracker::new(repo, no_versions(), NaturalOrder);
        let mut ours = tracker.get(id).unwrap(); // records the baseline
        ours.items[0].value = 99;
        ours.items[0].version = ours.items[0].version.next();

        let b = ItemId::new();
        let mut current = base;
        current.items.push(Item::with_id(2, 20, b));

        let merged = tracker.reconcile(ours, current).unwrap();
        assert_eq!(merged.items.len(), 2);
        assert_eq!(merged.items.iter().find(|i| i.item_id == a).unwrap().value, 99);
        assert!(merged.items.iter().any(|i| i.item_id == b));
    }

    /// Two transactions updating the *same* item in a shared leaf must
    /// still conflict.
    #[test]
    fn reconcile_rejects_overlapping_item_edits() {
        let repo = MemRepo::default();
        let id = LogicalId::new();
        let a = ItemId::new();
        let mut base = Node::new_leaf(id, None);
        base.items.push(Item::with_id(1, 10, a));
        repo.add(&base).unwrap();

        let tracker = ItemActionTracker::new(repo, no_versions(), NaturalOrder);
        let mut ours = tracker.get(id).unwrap();
        ours.items[0].value = 42;
        ours.items[0].version = ours.items[0].version.next();

        let mut current = base;
        current.items[0].value = 7;
        current.items[0].version = current.items[0].version.next();

        let err = tracker.reconcile(ours, current).unwrap_err();
        assert!(err.is_conflict());
    }
}
