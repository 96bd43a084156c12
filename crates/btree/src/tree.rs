//! The cursor-driven B-tree: insertion, deletion, search and in-order
//! traversal over a pluggable [`NodeRepository`].

use crate::node::{Item, Node};
use crate::ordering;
use crate::repository::NodeRepository;
use ordb_core::comparator::Comparator;
use ordb_core::error::{Error, Result};
use ordb_core::ids::{ItemId, LogicalId};
use std::cmp::Ordering as CmpOrdering;

fn not_positioned() -> Error {
    Error::NotFound("cursor is not positioned on an item".into())
}

fn nil_child() -> Error {
    Error::CorruptedStore("interior node has a nil child slot at rest".into())
}

/// One step of the path from the root to the cursor's current item.
///
/// For every frame but the last, `index` is the child index that was
/// descended into to reach the next frame; climbing back to that frame
/// (because the subtree below it is exhausted) means `items[index]` is
/// the next in-order item. For the last frame, `index` is simply the
/// item position within that node. The two meanings coincide by
/// construction: see [`BTree::next`]/[`BTree::previous`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct PathEntry {
    node: LogicalId,
    index: usize,
}

/// A generic B-tree: items ordered by `(comparator(key), item-UUID)`,
/// split/merge driven by a per-store slot length, backed by any
/// [`NodeRepository`] implementation.
pub struct BTree<K, V, R, C> {
    repo: R,
    comparator: C,
    slot_length: usize,
    is_unique: bool,
    leaf_load_balancing: bool,
    root: Option<LogicalId>,
    count: i64,
    cursor: Option<Vec<PathEntry>>,
}

impl<K, V, R, C> BTree<K, V, R, C>
where
    R: NodeRepository<K, V>,
    C: Comparator<K>,
{
    /// Attach a tree to a (possibly non-empty) node repository. `root`
    /// and `count` come from the store's persisted metadata.
    pub fn new(
        repo: R,
        comparator: C,
        slot_length: usize,
        is_unique: bool,
        leaf_load_balancing: bool,
        root: Option<LogicalId>,
        count: i64,
    ) -> Self {
        BTree {
            repo,
            comparator,
            slot_length,
            is_unique,
            leaf_load_balancing,
            root,
            count,
            cursor: None,
        }
    }

    pub fn count(&self) -> i64 {
        self.count
    }

    pub fn is_unique(&self) -> bool {
        self.is_unique
    }

    pub fn root_logical_id(&self) -> Option<LogicalId> {
        self.root
    }

    fn min_occupancy(&self) -> usize {
        (self.slot_length + 1) / 2
    }

    // ---- search plumbing --------------------------------------------

    /// Generalized lower-bound descent: find the first item whose
    /// composite key is `>= (key, tie_break)`, visiting interior items
    /// as well as leaf items (a classic B-tree stores items at every
    /// level, not just leaves). Returns the path taken and whether the
    /// landing item matches the composite key exactly.
    fn search_path(&self, key: &K, tie_break: ItemId) -> Result<(Vec<PathEntry>, bool)> {
        let mut path = Vec::new();
        let Some(mut node_id) = self.root else {
            return Ok((path, false));
        };
        loop {
            let node = self.repo.get(node_id)?;
            self.repo.fetched(node_id);
            match ordering::search(&node.items, key, tie_break, &self.comparator) {
                Ok(idx) => {
                    path.push(PathEntry { node: node.id, index: idx });
                    return Ok((path, true));
                }
                Err(pos) => {
                    if node.is_leaf() {
                        path.push(PathEntry { node: node.id, index: pos });
                        return Ok((path, false));
                    }
                    path.push(PathEntry { node: node.id, index: pos });
                    node_id = node.children[pos].ok_or_else(nil_child)?;
                }
            }
        }
    }

    /// If the path's last frame doesn't land on a real item (the
    /// search ran off the end of a leaf), climb toward the root until
    /// the nearest ancestor's pending separator is a valid next item.
    /// Shared by `Find`/`FindInDescendingOrder` and by `Next`'s climb.
    fn climb_to_valid(&self, path: &mut Vec<PathEntry>) -> Result<bool> {
        loop {
            let Some(top) = path.last().copied() else {
                return Ok(false);
            };
            let node = self.repo.get(top.node)?;
            if top.index < node.items.len() {
                return Ok(true);
            }
            path.pop();
        }
    }

    fn climb_to_valid_previous(&self, path: &mut Vec<PathEntry>) -> Result<bool> {
        loop {
            let Some(top) = path.last().copied() else {
                return Ok(false);
            };
            if top.index > 0 {
                path.last_mut().unwrap().index -= 1;
                return Ok(true);
            }
            path.pop();
        }
    }

    fn push_leftmost(&self, path: &mut Vec<PathEntry>, start: LogicalId) -> Result<()> {
        let mut node_id = start;
        loop {
            let node = self.repo.get(node_id)?;
            path.push(PathEntry { node: node.id, index: 0 });
            if node.is_leaf() {
                return Ok(());
            }
            node_id = node.children[0].ok_or_else(nil_child)?;
        }
    }

    fn push_rightmost(&self, path: &mut Vec<PathEntry>, start: LogicalId) -> Result<()> {
        let mut node_id = start;
        loop {
            let node = self.repo.get(node_id)?;
            if node.is_leaf() {
                let idx = node.items.len().saturating_sub(1);
                path.push(PathEntry { node: node.id, index: idx });
                return Ok(());
            }
            let child_idx = node.children.len() - 1;
            path.push(PathEntry { node: node.id, index: child_idx });
            node_id = node.children[child_idx].ok_or_else(nil_child)?;
        }
    }

    // ---- positioning --------------------------------------------------

    pub fn first(&mut self) -> Result<bool> {
        self.cursor = None;
        let Some(root) = self.root else { return Ok(false) };
        let mut path = Vec::new();
        self.push_leftmost(&mut path, root)?;
        self.cursor = Some(path);
        Ok(true)
    }

    pub fn last(&mut self) -> Result<bool> {
        self.cursor = None;
        let Some(root) = self.root else { return Ok(false) };
        let mut path = Vec::new();
        self.push_rightmost(&mut path, root)?;
        self.cursor = Some(path);
        Ok(true)
    }

    pub fn next(&mut self) -> Result<bool> {
        let Some(mut path) = self.cursor.take() else {
            return Ok(false);
        };
        let advanced = self.advance_next(&mut path)?;
        self.cursor = if advanced { Some(path) } else { None };
        Ok(advanced)
    }

    fn advance_next(&self, path: &mut Vec<PathEntry>) -> Result<bool> {
        let Some(top) = path.last().copied() else {
            return Ok(false);
        };
        let node = self.repo.get(top.node)?;
        if !node.is_leaf() {
            let child_idx = top.index + 1;
            path.last_mut().unwrap().index = child_idx;
            let child_id = node.children[child_idx].ok_or_else(nil_child)?;
            self.push_leftmost(path, child_id)?;
            return Ok(true);
        }
        if top.index + 1 < node.items.len() {
            path.last_mut().unwrap().index += 1;
            return Ok(true);
        }
        path.pop();
        self.climb_to_valid(path)
    }

    pub fn previous(&mut self) -> Result<bool> {
        let Some(mut path) = self.cursor.take() else {
            return Ok(false);
        };
        let advanced = self.advance_previous(&mut path)?;
        self.cursor = if advanced { Some(path) } else { None };
        Ok(advanced)
    }

    fn advance_previous(&self, path: &mut Vec<PathEntry>) -> Result<bool> {
        let Some(top) = path.last().copied() else {
            return Ok(false);
        };
        let node = self.repo.get(top.node)?;
        if !node.is_leaf() {
            let child_id = node.children[top.index].ok_or_else(nil_child)?;
            self.push_rightmost(path, child_id)?;
            return Ok(true);
        }
        if top.index > 0 {
            path.last_mut().unwrap().index -= 1;
            return Ok(true);
        }
        path.pop();
        self.climb_to_valid_previous(path)
    }

    /// Position on the first (leftmost) item whose key equals `key`.
    pub fn find(&mut self, key: &K) -> Result<bool> {
        self.cursor = None;
        let (mut path, _) = self.search_path(key, ItemId::nil())?;
        if path.is_empty() || !self.climb_to_valid(&mut path)? {
            return Ok(false);
        }
        let top = path.last().copied().unwrap();
        let node = self.repo.get(top.node)?;
        let found = self.comparator.compare(&node.items[top.index].key, key) == CmpOrdering::Equal;
        self.cursor = if found { Some(path) } else { None };
        Ok(found)
    }

    /// Position on the exact item identified by `(key, item_id)`.
    pub fn find_with_id(&mut self, key: &K, item_id: ItemId) -> Result<bool> {
        self.cursor = None;
        let (path, exact) = self.search_path(key, item_id)?;
        if exact {
            self.cursor = Some(path);
        }
        Ok(exact)
    }

    /// Position on the smallest key `>= key`. If none exists, position
    /// on the last item in the tree instead and return `false`.
    pub fn find_in_descending_order(&mut self, key: &K) -> Result<bool> {
        self.cursor = None;
        let (mut path, _) = self.search_path(key, ItemId::nil())?;
        if !path.is_empty() && self.climb_to_valid(&mut path)? {
            let top = path.last().copied().unwrap();
            let node = self.repo.get(top.node)?;
            let found =
                self.comparator.compare(&node.items[top.index].key, key) == CmpOrdering::Equal;
            self.cursor = Some(path);
            return Ok(found);
        }
        self.last()?;
        Ok(false)
    }

    // ---- cursor-relative item access -----------------------------------

    fn current_path(&self) -> Result<&[PathEntry]> {
        self.cursor.as_deref().ok_or_else(not_positioned)
    }

    pub fn get_current_item(&self) -> Result<Item<K, V>>
    where
        K: Clone,
        V: Clone,
    {
        let top = *self.current_path()?.last().unwrap();
        let node = self.repo.get(top.node)?;
        node.items
            .get(top.index)
            .cloned()
            .ok_or_else(|| Error::CorruptedStore("cursor position out of range".into()))
    }

    pub fn get_current_key(&self) -> Result<K>
    where
        K: Clone,
        V: Clone,
    {
        self.get_current_item().map(|i| i.key)
    }

    pub fn get_current_value(&self) -> Result<V>
    where
        K: Clone,
        V: Clone,
    {
        self.get_current_item().map(|i| i.value)
    }

    pub fn update_current_item(&mut self, value: V) -> Result<()> {
        let top = *self.current_path()?.last().unwrap();
        let mut node = self.repo.get(top.node)?;
        node.items[top.index].value = value;
        node.items[top.index].version = node.items[top.index].version.next();
        self.repo.update(&node)?;
        Ok(())
    }

    /// Remove the item the cursor is positioned on.
    pub fn remove_current_item(&mut self) -> Result<()>
    where
        K: Clone,
        V: Clone,
    {
        let path = self.cursor.take().ok_or_else(not_positioned)?;
        self.remove_at(path)
    }

    /// Move the current item to a new key, preserving its value and
    /// item ID, and reposition the cursor onto it at its new location.
    pub fn update_current_key(&mut self, new_key: K) -> Result<()>
    where
        K: Clone,
        V: Clone,
    {
        let path = self.cursor.take().ok_or_else(not_positioned)?;
        let top = *path.last().unwrap();
        let node = self.repo.get(top.node)?;
        let old_item = node.items[top.index].clone();
        if self.is_unique && self.comparator.compare(&old_item.key, &new_key) != CmpOrdering::Equal && self.key_exists(&new_key)? {
            return Err(Error::AlreadyExists(
                "duplicate key in a unique store".into(),
            ));
        }
        self.remove_at(path)?;
        self.insert(old_item.item_id, new_key.clone(), old_item.value)?;
        self.find_with_id(&new_key, old_item.item_id)?;
        Ok(())
    }

    // ---- insertion ------------------------------------------------------

    pub fn add(&mut self, key: K, value: V) -> Result<ItemId>
    where
        K: Clone,
        V: Clone,
    {
        if self.is_unique && self.key_exists(&key)? {
            return Err(Error::AlreadyExists(
                "duplicate key in a unique store".into(),
            ));
        }
        self.insert(ItemId::new(), key, value)
    }

    pub fn add_if_not_exists(&mut self, key: K, value: V) -> Result<Option<ItemId>>
    where
        K: Clone,
        V: Clone,
    {
        if self.key_exists(&key)? {
            return Ok(None);
        }
        self.insert(ItemId::new(), key, value).map(Some)
    }

    pub fn upsert(&mut self, key: K, value: V) -> Result<ItemId>
    where
        K: Clone,
        V: Clone,
    {
        if self.find(&key)? {
            let item_id = self.get_current_item()?.item_id;
            self.update_current_item(value)?;
            Ok(item_id)
        } else {
            self.insert(ItemId::new(), key, value)
        }
    }

    fn key_exists(&self, key: &K) -> Result<bool> {
        let (path, _) = self.search_path(key, ItemId::nil())?;
        let Some(top) = path.last().copied() else {
            return Ok(false);
        };
        let node = self.repo.get(top.node)?;
        Ok(top.index < node.items.len()
            && self.comparator.compare(&node.items[top.index].key, key) == CmpOrdering::Equal)
    }

    fn insert(&mut self, item_id: ItemId, key: K, value: V) -> Result<ItemId>
    where
        K: Clone,
        V: Clone,
    {
        let (path, _) = self.search_path(&key, item_id)?;
        let item = Item::with_id(key, value, item_id);

        if path.is_empty() {
            let root_id = self.repo.new_id();
            let mut root = Node::new_leaf(root_id, None);
            root.items.push(item);
            self.repo.add(&root)?;
            self.root = Some(root_id);
            self.count += 1;
            return Ok(item_id);
        }

        let leaf_entry = *path.last().unwrap();
        let mut leaf = self.repo.get(leaf_entry.node)?;
        leaf.items.insert(leaf_entry.index, item);
        self.count += 1;
        self.insert_fixup(leaf, path)?;
        Ok(item_id)
    }

    /// Resolve an overflowing node: for a leaf, try shifting an item
    /// into a sibling through the parent first (if enabled); otherwise
    /// split and promote the median, cascading up as far as needed.
    fn insert_fixup(&mut self, mut node: Node<K, V>, mut path: Vec<PathEntry>) -> Result<()>
    where
        K: Clone,
        V: Clone,
    {
        loop {
            if node.occupancy() <= self.slot_length {
                self.repo.update(&node)?;
                return Ok(());
            }

            path.pop();

            if node.is_leaf() && self.leaf_load_balancing {
                if self.try_balance_leaf(&mut node, &path)? {
                    self.repo.update(&node)?;
                    return Ok(());
                }
            }

            let (median, right) = self.split_node(&mut node)?;
            self.repo.update(&node)?;
            self.repo.add(&right)?;

            match path.last().copied() {
                Some(parent_entry) => {
                    let mut parent = self.repo.get(parent_entry.node)?;
                    parent.items.insert(parent_entry.index, median);
                    parent
                        .children
                        .insert(parent_entry.index + 1, Some(right.id));
                    node = parent;
                    path.pop();
                }
                None => {
                    let new_root_id = self.repo.new_id();
                    let new_root = Node::new_interior(
                        new_root_id,
                        None,
                        vec![median],
                        vec![Some(node.id), Some(right.id)],
                    );
                    self.reparent_one(node.id, new_root_id)?;
                    self.reparent_one(right.id, new_root_id)?;
                    self.repo.add(&new_root)?;
                    self.root = Some(new_root_id);
                    return Ok(());
                }
            }
        }
    }

    /// Shift one item from an overflowing leaf through the parent into
    /// a sibling with spare room, avoiding a split. Tried right sibling
    /// first, then left.
    fn try_balance_leaf(&self, node: &mut Node<K, V>, path: &[PathEntry]) -> Result<bool>
    where
        K: Clone,
        V: Clone,
    {
        let Some(parent_entry) = path.last().copied() else {
            return Ok(false);
        };
        let mut parent = self.repo.get(parent_entry.node)?;
        let child_idx = parent_entry.index;

        if child_idx + 1 < parent.children.len() {
            let right_id = parent.children[child_idx + 1].ok_or_else(nil_child)?;
            let mut right = self.repo.get(right_id)?;
            if right.occupancy() < self.slot_length {
                let moved_up = node.items.pop().unwrap();
                let old_sep = std::mem::replace(&mut parent.items[child_idx], moved_up);
                right.items.insert(0, old_sep);
                self.repo.update(&right)?;
                self.repo.update(&parent)?;
                return Ok(true);
            }
        }
        if child_idx > 0 {
            let left_id = parent.children[child_idx - 1].ok_or_else(nil_child)?;
            let mut left = self.repo.get(left_id)?;
            if left.occupancy() < self.slot_length {
                let moved_up = node.items.remove(0);
                let old_sep = std::mem::replace(&mut parent.items[child_idx - 1], moved_up);
                left.items.push(old_sep);
                self.repo.update(&left)?;
                self.repo.update(&parent)?;
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Split an overflowing node in half, returning the promoted median
    /// item and the freshly-allocated right half. `node` keeps its ID
    /// and becomes the left half.
    fn split_node(&self, node: &mut Node<K, V>) -> Result<(Item<K, V>, Node<K, V>)> {
        let mid = node.items.len() / 2;
        let right_items = node.items.split_off(mid + 1);
        let median = node.items.pop().unwrap();
        let right_children = if node.is_leaf() {
            Vec::new()
        } else {
            node.children.split_off(mid + 1)
        };
        let right_id = self.repo.new_id();
        let right = Node::new_interior(right_id, node.parent_id, right_items, right_children);
        self.reparent(&right.children, right_id)?;
        Ok((median, right))
    }

    fn reparent(&self, children: &[Option<LogicalId>], new_parent: LogicalId) -> Result<()> {
        for child in children.iter().flatten() {
            self.reparent_one(*child, new_parent)?;
        }
        Ok(())
    }

    fn reparent_one(&self, child_id: LogicalId, new_parent: LogicalId) -> Result<()> {
        let mut child = self.repo.get(child_id)?;
        child.parent_id = Some(new_parent);
        self.repo.update(&child)?;
        Ok(())
    }

    // ---- removal ----------------------------------------------------

    /// Remove the first item with this key, if any.
    pub fn remove(&mut self, key: &K) -> Result<bool>
    where
        K: Clone,
        V: Clone,
    {
        let (mut path, _) = self.search_path(key, ItemId::nil())?;
        if path.is_empty() || !self.climb_to_valid(&mut path)? {
            return Ok(false);
        }
        let top = *path.last().unwrap();
        let node = self.repo.get(top.node)?;
        if self.comparator.compare(&node.items[top.index].key, key) != CmpOrdering::Equal {
            return Ok(false);
        }
        self.remove_at(path)?;
        Ok(true)
    }

    fn remove_at(&mut self, path: Vec<PathEntry>) -> Result<()>
    where
        K: Clone,
        V: Clone,
    {
        self.cursor = None;
        let top = *path.last().unwrap();
        let mut node = self.repo.get(top.node)?;

        if node.is_leaf() {
            node.items.remove(top.index);
            self.count -= 1;
            self.fix_underflow(node, path)
        } else {
            let mut succ_path = path.clone();
            succ_path.last_mut().unwrap().index = top.index + 1;
            let child_id = node.children[top.index + 1].ok_or_else(nil_child)?;
            self.push_leftmost(&mut succ_path, child_id)?;
            let succ_entry = *succ_path.last().unwrap();
            let mut succ_leaf = self.repo.get(succ_entry.node)?;
            let succ_item = succ_leaf.items.remove(succ_entry.index);
            self.count -= 1;

            node.items[top.index] = succ_item;
            self.repo.update(&node)?;
            self.fix_underflow(succ_leaf, succ_path)
        }
    }

    /// After removing an item from `node` (at the bottom of `path`),
    /// restore the minimum-occupancy invariant: borrow from a sibling
    /// with room to spare, or merge with one, cascading toward the root.
    fn fix_underflow(&mut self, mut node: Node<K, V>, mut path: Vec<PathEntry>) -> Result<()>
    where
        K: Clone,
        V: Clone,
    {
        loop {
            if path.len() <= 1 {
                if node.items.is_empty() {
                    if node.is_leaf() {
                        self.repo.remove(node.id)?;
                        self.root = None;
                    } else {
                        match node.children.first().copied().flatten() {
                            Some(child_id) => {
                                let mut child = self.repo.get(child_id)?;
                                child.parent_id = None;
                                self.repo.update(&child)?;
                                self.repo.remove(node.id)?;
                                self.root = Some(child_id);
                            }
                            None => {
                                self.repo.remove(node.id)?;
                                self.root = None;
                            }
                        }
                    }
                } else {
                    self.repo.update(&node)?;
                }
                return Ok(());
            }

            if node.occupancy() >= self.min_occupancy() {
                self.repo.update(&node)?;
                return Ok(());
            }

            path.pop();
            let parent_entry = *path.last().unwrap();
            let mut parent = self.repo.get(parent_entry.node)?;
            let child_idx = parent_entry.index;
            let min_occ = self.min_occupancy();

            if child_idx + 1 < parent.children.len() {
                let right_id = parent.children[child_idx + 1].ok_or_else(nil_child)?;
                let mut right = self.repo.get(right_id)?;
                if right.occupancy() > min_occ {
                    self.borrow_from_right(&mut node, &mut parent, child_idx, &mut right)?;
                    self.repo.update(&node)?;
                    self.repo.update(&right)?;
                    self.repo.update(&parent)?;
                    return Ok(());
                }
            }
            if child_idx > 0 {
                let left_id = parent.children[child_idx - 1].ok_or_else(nil_child)?;
                let mut left = self.repo.get(left_id)?;
                if left.occupancy() > min_occ {
                    self.borrow_from_left(&mut node, &mut parent, child_idx, &mut left)?;
                    self.repo.update(&node)?;
                    self.repo.update(&left)?;
                    self.repo.update(&parent)?;
                    return Ok(());
                }
            }

            if child_idx + 1 < parent.children.len() {
                let right_id = parent.children[child_idx + 1].ok_or_else(nil_child)?;
                let right = self.repo.get(right_id)?;
                self.merge_nodes(&mut node, &mut parent, child_idx, right)?;
                self.repo.update(&node)?;
                self.repo.remove(right_id)?;
            } else {
                let left_id = parent.children[child_idx - 1].ok_or_else(nil_child)?;
                let mut left = self.repo.get(left_id)?;
                let removed_id = node.id;
                self.merge_nodes(&mut left, &mut parent, child_idx - 1, node)?;
                self.repo.update(&left)?;
                self.repo.remove(removed_id)?;
            }
            node = parent;
        }
    }

    fn borrow_from_right(
        &self,
        node: &mut Node<K, V>,
        parent: &mut Node<K, V>,
        child_idx: usize,
        right: &mut Node<K, V>,
    ) -> Result<()>
    where
        K: Clone,
        V: Clone,
    {
        let sep = parent.items[child_idx].clone();
        node.items.push(sep);
        let moved = right.items.remove(0);
        parent.items[child_idx] = moved;
        if !right.children.is_empty() {
            let moved_child = right.children.remove(0);
            node.children.push(moved_child);
            if let Some(cid) = moved_child {
                self.reparent_one(cid, node.id)?;
            }
        }
        Ok(())
    }

    fn borrow_from_left(
        &self,
        node: &mut Node<K, V>,
        parent: &mut Node<K, V>,
        child_idx: usize,
        left: &mut Node<K, V>,
    ) -> Result<()>
    where
        K: Clone,
        V: Clone,
    {
        let sep = parent.items[child_idx - 1].clone();
        node.items.insert(0, sep);
        let moved = left.items.pop().unwrap();
        parent.items[child_idx - 1] = moved;
        if !left.children.is_empty() {
            let moved_child = left.children.pop().unwrap();
            node.children.insert(0, moved_child);
            if let Some(cid) = moved_child {
                self.reparent_one(cid, node.id)?;
            }
        }
        Ok(())
    }

    /// Fold `right` (and the separator at `parent.items[sep_idx]`) into
    /// `left`, removing both from `parent`. `left` survives; the caller
    /// is responsible for removing `right`'s node record.
    fn merge_nodes(
        &self,
        left: &mut Node<K, V>,
        parent: &mut Node<K, V>,
        sep_idx: usize,
        right: Node<K, V>,
    ) -> Result<()> {
        let sep = parent.items.remove(sep_idx);
        parent.children.remove(sep_idx + 1);
        left.items.push(sep);
        left.items.extend(right.items);
        if !right.children.is_empty() {
            self.reparent(&right.children, left.id)?;
            left.children.extend(right.children);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::MemRepository;
    use ordb_core::comparator::NaturalOrder;
    use std::sync::Arc;

    fn small_tree() -> BTree<i64, String, Arc<MemRepository<i64, String>>, NaturalOrder> {
        BTree::new(
            Arc::new(MemRepository::new()),
            NaturalOrder,
            4,
            true,
            false,
            None,
            0,
        )
    }

    #[test]
    fn add_then_find_round_trips() {
        let mut t = small_tree();
        t.add(5000, "a".to_string()).unwrap();
        assert!(t.find(&5000).unwrap());
        assert_eq!(t.get_current_value().unwrap(), "a");
        assert_eq!(t.count(), 1);
    }

    #[test]
    fn duplicate_key_rejected_when_unique() {
        let mut t = small_tree();
        t.add(1, "a".to_string()).unwrap();
        let err = t.add(1, "b".to_string()).unwrap_err();
        assert!(matches!(err, Error::AlreadyExists(_)));
    }

    #[test]
    fn add_if_not_exists_is_idempotent() {
        let mut t = small_tree();
        assert!(t.add_if_not_exists(1, "a".to_string()).unwrap().is_some());
        assert!(t.add_if_not_exists(1, "b".to_string()).unwrap().is_none());
        assert_eq!(t.count(), 1);
    }

    #[test]
    fn split_keeps_order_over_many_inserts() {
        let mut t = small_tree();
        let mut keys: Vec<i64> = (0..200).collect();
        // insertion order shouldn't matter for the final sorted order
        keys.reverse();
        for k in &keys {
            t.add(*k, k.to_string()).unwrap();
        }
        assert_eq!(t.count(), 200);

        assert!(t.first().unwrap());
        let mut seen = Vec::new();
        loop {
            seen.push(t.get_current_key().unwrap());
            if !t.next().unwrap() {
                break;
            }
        }
        let mut expected: Vec<i64> = (0..200).collect();
        expected.sort();
        assert_eq!(seen, expected);
    }

    #[test]
    fn previous_mirrors_next() {
        let mut t = small_tree();
        for k in 0..50 {
            t.add(k, k.to_string()).unwrap();
        }
        assert!(t.last().unwrap());
        let mut seen = Vec::new();
        loop {
            seen.push(t.get_current_key().unwrap());
            if !t.previous().unwrap() {
                break;
            }
        }
        let mut expected: Vec<i64> = (0..50).collect();
        expected.reverse();
        assert_eq!(seen, expected);
    }

    #[test]
    fn remove_keeps_remaining_items_sorted_and_reachable() {
        let mut t = small_tree();
        for k in 0..100 {
            t.add(k, k.to_string()).unwrap();
        }
        for k in (0..100).step_by(2) {
            assert!(t.remove(&k).unwrap());
        }
        assert_eq!(t.count(), 50);
        assert!(t.first().unwrap());
        let mut seen = Vec::new();
        loop {
            seen.push(t.get_current_key().unwrap());
            if !t.next().unwrap() {
                break;
            }
        }
        let expected: Vec<i64> = (0..100).filter(|k| k % 2 == 1).collect();
        assert_eq!(seen, expected);
    }

    #[test]
    fn remove_missing_key_is_a_no_op() {
        let mut t = small_tree();
        t.add(1, "a".to_string()).unwrap();
        assert!(!t.remove(&999).unwrap());
        assert_eq!(t.count(), 1);
    }

    #[test]
    fn duplicates_are_ordered_by_item_id_and_all_reachable() {
        let mut t: BTree<i64, String, Arc<MemRepository<i64, String>>, NaturalOrder> = BTree::new(
            Arc::new(MemRepository::new()),
            NaturalOrder,
            4,
            false,
            false,
            None,
            0,
        );
        let ids = [
            t.add(7, "a".to_string()).unwrap(),
            t.add(7, "b".to_string()).unwrap(),
            t.add(7, "c".to_string()).unwrap(),
        ];
        assert_eq!(t.count(), 3);
        for id in ids {
            assert!(t.find_with_id(&7, id).unwrap());
        }
        assert!(t.find(&7).unwrap());
        let mut count_with_key = 0;
        loop {
            if t.get_current_key().unwrap() != 7 {
                break;
            }
            count_with_key += 1;
            if !t.next().unwrap() {
                break;
            }
        }
        assert_eq!(count_with_key, 3);
    }

    #[test]
    fn find_in_descending_order_finds_smallest_key_above() {
        let mut t = small_tree();
        for k in [1, 3, 5, 7, 9] {
            t.add(k, k.to_string()).unwrap();
        }
        assert!(!t.find_in_descending_order(&4).unwrap());
        assert_eq!(t.get_current_key().unwrap(), 5);
        assert!(t.find_in_descending_order(&5).unwrap());
        assert_eq!(t.get_current_key().unwrap(), 5);
    }

    #[test]
    fn find_in_descending_order_past_the_end_lands_on_last() {
        let mut t = small_tree();
        for k in [1, 3, 5] {
            t.add(k, k.to_string()).unwrap();
        }
        assert!(!t.find_in_descending_order(&100).unwrap());
        assert_eq!(t.get_current_key().unwrap(), 5);
    }

    #[test]
    fn update_current_key_moves_item_and_repositions_cursor() {
        let mut t = small_tree();
        t.add(1, "a".to_string()).unwrap();
        assert!(t.find(&1).unwrap());
        t.update_current_key(500).unwrap();
        assert_eq!(t.get_current_key().unwrap(), 500);
        assert_eq!(t.get_current_value().unwrap(), "a");
        assert!(!t.find(&1).unwrap());
        assert!(t.find(&500).unwrap());
    }

    #[test]
    fn upsert_adds_then_overwrites() {
        let mut t = small_tree();
        let id1 = t.upsert(1, "a".to_string()).unwrap();
        let id2 = t.upsert(1, "b".to_string()).unwrap();
        assert_eq!(id1, id2);
        assert_eq!(t.count(), 1);
        t.find(&1).unwrap();
        assert_eq!(t.get_current_value().unwrap(), "b");
    }

    #[test]
    fn root_collapses_after_draining_the_tree() {
        let repo = Arc::new(MemRepository::new());
        let mut t: BTree<i64, String, Arc<MemRepository<i64, String>>, NaturalOrder> = BTree::new(
            repo.clone(),
            NaturalOrder,
            4,
            true,
            false,
            None,
            0,
        );
        for k in 0..60 {
            t.add(k, k.to_string()).unwrap();
        }
        for k in 0..60 {
            assert!(t.remove(&k).unwrap());
        }
        assert_eq!(t.count(), 0);
        assert!(t.root_logical_id().is_none());
        assert_eq!(repo.node_count(), 0);
    }
}
