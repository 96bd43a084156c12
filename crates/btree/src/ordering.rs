//! Composite `(key, item-UUID)` ordering shared by every search and
//! insertion path.
//!
//! Items in a node are always sorted by `(comparator(key), item_id)`,
//! even in a unique store -- uniqueness just means two items never tie
//! on the key half. Searching with a tie-break of [`ItemId::nil`] lands
//! on the leftmost item with a given key; searching with a real item's
//! ID finds that exact item.

use crate::node::Item;
use ordb_core::comparator::Comparator;
use ordb_core::ids::ItemId;
use std::cmp::Ordering;

/// Binary search `items` for `(key, tie_break)` under `comparator`.
///
/// `Ok(i)` means `items[i]` compares exactly equal on both key and item
/// ID. `Err(i)` means no such item exists and `i` is the index it (or
/// the first item with a strictly greater composite key) would occupy.
pub fn search<K, V, C: Comparator<K>>(
    items: &[Item<K, V>],
    key: &K,
    tie_break: ItemId,
    comparator: &C,
) -> Result<usize, usize> {
    items.binary_search_by(|item| {
        match comparator.compare(&item.key, key) {
            Ordering::Equal => item.item_id.cmp(&tie_break),
            other => other,
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use ordb_core::comparator::NaturalOrder;

    #[test]
    fn finds_exact_tie_break() {
        let a = ItemId::new();
        let b = ItemId::new();
        let (lo, hi) = if a < b { (a, b) } else { (b, a) };
        let items = vec![
            Item::with_id(5, "a", lo),
            Item::with_id(5, "b", hi),
            Item::with_id(9, "c", ItemId::new()),
        ];
        let cmp = NaturalOrder;
        assert_eq!(search(&items, &5, lo, &cmp), Ok(0));
        assert_eq!(search(&items, &5, hi, &cmp), Ok(1));
    }

    #[test]
    fn nil_tie_break_lands_on_leftmost_match() {
        let a = ItemId::new();
        let b = ItemId::new();
        let (lo, hi) = if a < b { (a, b) } else { (b, a) };
        let items = vec![Item::with_id(5, "a", lo), Item::with_id(5, "b", hi)];
        let cmp = NaturalOrder;
        assert_eq!(search(&items, &5, ItemId::nil(), &cmp), Err(0));
    }
}
