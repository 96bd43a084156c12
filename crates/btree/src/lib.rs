//! A generic, cursor-driven B-tree.
//!
//! This crate knows nothing about files, transactions or replication:
//! it operates purely in terms of a [`NodeRepository`] (how nodes are
//! fetched and persisted) and a [`Comparator`](ordb_core::comparator::Comparator)
//! (how keys are ordered). Everything durability- or
//! concurrency-related lives one layer up, in `ordb-storage` and
//! `ordb-concurrency`.

pub mod node;
pub mod ordering;
pub mod repository;
pub mod tree;

pub use node::{Item, Node};
pub use repository::NodeRepository;
pub use tree::BTree;

#[cfg(test)]
mod test_support {
    use crate::node::Node;
    use crate::repository::NodeRepository;
    use ordb_core::error::{Error, Result};
    use ordb_core::ids::LogicalId;
    use parking_lot::Mutex;
    use std::collections::HashMap;

    /// An in-memory node repository, used only by this crate's own
    /// tests. The storage crate provides the real, file-backed one.
    #[derive(Default)]
    pub struct MemRepository<K, V> {
        nodes: Mutex<HashMap<LogicalId, Node<K, V>>>,
    }

    impl<K, V> MemRepository<K, V> {
        pub fn new() -> Self {
            MemRepository {
                nodes: Mutex::new(HashMap::new()),
            }
        }

        pub fn node_count(&self) -> usize {
            self.nodes.lock().len()
        }
    }

    impl<K: Clone + Send + Sync, V: Clone + Send + Sync> NodeRepository<K, V> for MemRepository<K, V> {
        fn get(&self, id: LogicalId) -> Result<Node<K, V>> {
            self.nodes
                .lock()
                .get(&id)
                .cloned()
                .ok_or_else(|| Error::NotFound(format!("node {id} not in repository")))
        }

        fn new_id(&self) -> LogicalId {
            LogicalId::new()
        }

        fn add(&self, node: &Node<K, V>) -> Result<()> {
            self.nodes.lock().insert(node.id, node.clone());
            Ok(())
        }

        fn update(&self, node: &Node<K, V>) -> Result<()> {
            self.nodes.lock().insert(node.id, node.clone());
            Ok(())
        }

        fn remove(&self, id: LogicalId) -> Result<()> {
            self.nodes.lock().remove(&id);
            Ok(())
        }
    }
}
