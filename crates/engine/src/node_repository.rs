//! Bridges a [`NodeRepository`] onto the registry and blob store.
//!
//! This is the repository a fresh [`crate::runtime::Session`] wraps in
//! an `ItemActionTracker` for every transaction. Used directly (without
//! a tracker) it is also how a brand-new, empty store's root gets its
//! first node written.

use ordb_btree::{Node, NodeRepository};
use ordb_core::codec::{BincodeCodec, Codec};
use ordb_core::error::{Error, Result};
use ordb_core::handle::Handle;
use ordb_core::ids::{LogicalId, PhysicalId};
use ordb_core::traits::{BlobStore, Registry};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::marker::PhantomData;
use std::sync::Arc;

/// Resolves logical IDs to nodes by looking up the active physical
/// blob through a [`Registry`] and reading it back from a
/// [`BlobStore`], both addressed under one blob/registry table name.
pub struct RegistryNodeRepository<K, V> {
    registry: Arc<dyn Registry>,
    blob_store: Arc<dyn BlobStore>,
    table: String,
    codec: BincodeCodec,
    _marker: PhantomData<fn() -> (K, V)>,
}

impl<K, V> RegistryNodeRepository<K, V> {
    pub fn new(registry: Arc<dyn Registry>, blob_store: Arc<dyn BlobStore>, table: impl Into<String>) -> Self {
        RegistryNodeRepository {
            registry,
            blob_store,
            table: table.into(),
            codec: BincodeCodec,
            _marker: PhantomData,
        }
    }

    pub fn table(&self) -> &str {
        &self.table
    }
}

impl<K, V> NodeRepository<K, V> for RegistryNodeRepository<K, V>
where
    K: Serialize + DeserializeOwned + Clone + Send + Sync,
    V: Serialize + DeserializeOwned + Clone + Send + Sync,
{
    fn get(&self, id: LogicalId) -> Result<Node<K, V>> {
        let handle = self
            .registry
            .get(&self.table, &[id])?
            .into_iter()
            .next()
            .flatten()
            .ok_or_else(|| Error::NotFound(format!("node {id}")))?;
        if handle.deleted {
            return Err(Error::NotFound(format!("node {id}")));
        }
        let physical = handle
            .active_physical()
            .ok_or_else(|| Error::CorruptedStore(format!("handle {id} has no active blob")))?;
        let bytes = self
            .blob_store
            .get_one(&self.table, physical)?
            .ok_or_else(|| Error::NotFound(format!("blob {physical} for node {id}")))?;
        self.codec.decode(&bytes)
    }

    fn new_id(&self) -> LogicalId {
        LogicalId::new()
    }

    fn add(&self, node: &Node<K, V>) -> Result<()> {
        self.write(node, false)
    }

    fn update(&self, node: &Node<K, V>) -> Result<()> {
        self.write(node, true)
    }

    fn remove(&self, id: LogicalId) -> Result<()> {
        self.registry.remove(&self.table, &[id])
    }
}

impl<K, V> RegistryNodeRepository<K, V>
where
    K: Serialize + DeserializeOwned + Clone + Send + Sync,
    V: Serialize + DeserializeOwned + Clone + Send + Sync,
{
    /// Serialize `node`, write it as a fresh blob, and flip the
    /// handle's active slot to it directly -- used outside a tracked
    /// transaction (store bootstrap, tests, replica catch-up), never
    /// on the committed-transaction hot path, which goes through
    /// [`crate::runtime::Session`] and `ItemActionTracker` instead.
    fn write(&self, node: &Node<K, V>, update_existing: bool) -> Result<()> {
        let bytes = self.codec.encode(node)?;
        let physical = PhysicalId::new();
        self.blob_store.add(&self.table, &[(physical, bytes)])?;

        let mut handle = if update_existing {
            self.registry
                .get(&self.table, &[node.id])?
                .into_iter()
                .next()
                .flatten()
                .unwrap_or_else(|| Handle::new(node.id))
        } else {
            Handle::new(node.id)
        };
        handle.stage(physical);
        handle.flip();
        self.registry.update(&self.table, &[handle])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ordb_storage::blob::PlainBlobStore;
    use ordb_storage::registry::FileRegistry;

    fn repo(dir: &std::path::Path) -> RegistryNodeRepository<i32, i32> {
        let registry = Arc::new(FileRegistry::new(dir.join("registry"), 4));
        let blobs = Arc::new(PlainBlobStore::new(dir.join("blobs")));
        RegistryNodeRepository::new(registry, blobs, "nodes")
    }

    #[test]
    fn add_then_get_round_trips_a_node() {
        let dir = tempfile::tempdir().unwrap();
        let repo = repo(dir.path());
        let id = repo.new_id();
        let node = Node::new_leaf(id, None);
        repo.add(&node).unwrap();
        assert_eq!(repo.get(id).unwrap().id, id);
    }

    #[test]
    fn update_replaces_the_blob_behind_the_same_handle() {
        let dir = tempfile::tempdir().unwrap();
        let repo = repo(dir.path());
        let id = repo.new_id();
        let mut node = Node::new_leaf(id, None);
        repo.add(&node).unwrap();

        node.items.push(ordb_btree::Item::new(1, 2));
        repo.update(&node).unwrap();
        assert_eq!(repo.get(id).unwrap().items.len(), 1);
    }

    #[test]
    fn removed_node_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let repo = repo(dir.path());
        let id = repo.new_id();
        repo.add(&Node::new_leaf(id, None)).unwrap();
        repo.remove(id).unwrap();
        assert!(repo.get(id).is_err());
    }
}
