//! The on-disk/in-repository shape of one B-tree node.

use ordb_core::ids::{ItemId, LogicalId};
use ordb_core::version::Version;
use serde::{Deserialize, Serialize};

/// One key/value pair stored in a node, tagged with the UUID that
/// breaks ties between equal keys in a non-unique store.
///
/// `version` is local to the item's *current* node: it bumps on every
/// in-place value change (`update_current_item`) and starts over at
/// `Version::INITIAL` whenever the item moves to a different node (a
/// key change, or a split/merge carrying it across a node boundary).
/// It is never used for OCC at the handle layer -- that is the node
/// version in the registry -- only for the finer-grained write-write
/// check a transaction manager runs when two committers touch the same
/// node but, per this field, different items in it. There is no
/// deletion tombstone: a removed item is spliced out of `items`
/// outright, since a B-tree delete is a structural operation rather
/// than a soft-delete (see DESIGN.md).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Item<K, V> {
    pub key: K,
    pub value: V,
    pub item_id: ItemId,
    pub version: Version,
}

impl<K, V> Item<K, V> {
    pub fn new(key: K, value: V) -> Self {
        Item {
            key,
            value,
            item_id: ItemId::new(),
            version: Version::INITIAL,
        }
    }

    pub fn with_id(key: K, value: V, item_id: ItemId) -> Self {
        Item {
            key,
            value,
            item_id,
            version: Version::INITIAL,
        }
    }
}

/// A B-tree node: an ordered run of items plus, for interior nodes, one
/// more child pointer than item.
///
/// `children` is empty for a leaf. A live (non-transient) interior node
/// never carries a `None` child slot; a `None` only appears mid-removal,
/// before the owning `remove` call has finished rebalancing, and is
/// never written back through a [`crate::repository::NodeRepository`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Node<K, V> {
    pub id: LogicalId,
    pub parent_id: Option<LogicalId>,
    pub items: Vec<Item<K, V>>,
    pub children: Vec<Option<LogicalId>>,
}

impl<K, V> Node<K, V> {
    pub fn new_leaf(id: LogicalId, parent_id: Option<LogicalId>) -> Self {
        Node {
            id,
            parent_id,
            items: Vec::new(),
            children: Vec::new(),
        }
    }

    pub fn new_interior(
        id: LogicalId,
        parent_id: Option<LogicalId>,
        items: Vec<Item<K, V>>,
        children: Vec<Option<LogicalId>>,
    ) -> Self {
        Node {
            id,
            parent_id,
            items,
            children,
        }
    }

    pub fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }

    /// Number of live items, the quantity slot-length bounds are checked
    /// against.
    pub fn occupancy(&self) -> usize {
        self.items.len()
    }
}
