//! The storage-side contract a [`crate::tree::BTree`] is generic over.

use crate::node::Node;
use ordb_core::error::Result;
use ordb_core::ids::LogicalId;
use std::sync::Arc;

/// Durable storage for B-tree nodes, implemented by the storage crate
/// over the handle registry and blob store; an in-memory `HashMap`-backed
/// implementation is used in this crate's own tests.
///
/// A tree never assumes nodes are cached: every operation fetches
/// through this trait, and a repository is free to hold its own L1/L2
/// cache behind it.
pub trait NodeRepository<K, V>: Send + Sync {
    /// Fetch a node by its logical ID. Callers only ever ask for IDs
    /// they've previously seen via a child pointer or the tree's root,
    /// so a miss is a corrupted-store condition, not a normal outcome.
    fn get(&self, id: LogicalId) -> Result<Node<K, V>>;

    /// Allocate a fresh logical ID for a brand-new node.
    fn new_id(&self) -> LogicalId;

    /// Persist a newly created node.
    fn add(&self, node: &Node<K, V>) -> Result<()>;

    /// Persist an existing node's new contents.
    fn update(&self, node: &Node<K, V>) -> Result<()>;

    /// Delete a node that has been merged away or emptied.
    fn remove(&self, id: LogicalId) -> Result<()>;

    /// Called once per successful `get`, after the fetch. Gives a
    /// repository a hook to bump an access-order LRU or similar; the
    /// default does nothing.
    fn fetched(&self, _id: LogicalId) {}
}

impl<K, V, T: NodeRepository<K, V>> NodeRepository<K, V> for Arc<T> {
    fn get(&self, id: LogicalId) -> Result<Node<K, V>> {
        T::get(self, id)
    }

    fn new_id(&self) -> LogicalId {
        T::new_id(self)
    }

    fn add(&self, node: &Node<K, V>) -> Result<()> {
        T::add(self, node)
    }

    fn update(&self, node: &Node<K, V>) -> Result<()> {
        T::update(self, node)
    }

    fn remove(&self, id: LogicalId) -> Result<()> {
        T::remove(self, id)
    }

    fn fetched(&self, id: LogicalId) {
        T::fetched(self, id)
    }
}
