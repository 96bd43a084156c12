//! Key ordering
//!
//! The B-tree is generic over a total-order capability on keys rather
//! than requiring `K: Ord` directly, so a store can plug in a composite
//! or index-expression comparator without the engine knowing about it.
//! A comparator is a pure function: given two
//! keys it returns an ordering and never panics in well-formed use;
//! a panic is surfaced by the engine as [`crate::Error::BadComparator`].

use std::cmp::Ordering;
use std::sync::Arc;

/// A total-order comparator over keys of type `K`.
///
/// Implementations must be consistent (irreflexive, transitive,
/// antisymmetric) for the B-tree's ordering invariant to hold; the
/// engine does not itself verify this.
pub trait Comparator<K>: Send + Sync {
    /// Compare two keys.
    fn compare(&self, a: &K, b: &K) -> Ordering;
}

/// The natural-order comparator for any `K: Ord`.
#[derive(Debug, Default, Clone, Copy)]
pub struct NaturalOrder;

impl<K: Ord> Comparator<K> for NaturalOrder {
    fn compare(&self, a: &K, b: &K) -> Ordering {
        a.cmp(b)
    }
}

/// A comparator built from a plain closure, for composite or derived
/// keys (e.g. an index expression over a struct's fields).
pub struct FnComparator<K> {
    f: Arc<dyn Fn(&K, &K) -> Ordering + Send + Sync>,
}

impl<K> FnComparator<K> {
    /// Build a comparator from a closure.
    pub fn new(f: impl Fn(&K, &K) -> Ordering + Send + Sync + 'static) -> Self {
        FnComparator { f: Arc::new(f) }
    }
}

impl<K> Comparator<K> for FnComparator<K> {
    fn compare(&self, a: &K, b: &K) -> Ordering {
        (self.f)(a, b)
    }
}

impl<K> Clone for FnComparator<K> {
    fn clone(&self) -> Self {
        FnComparator { f: self.f.clone() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn natural_order_matches_ord() {
        let cmp = NaturalOrder;
        assert_eq!(cmp.compare(&1, &2), Ordering::Less);
        assert_eq!(cmp.compare(&2, &2), Ordering::Equal);
    }

    #[test]
    fn fn_comparator_can_reverse_order() {
        let cmp = FnComparator::new(|a: &i32, b: &i32| b.cmp(a));
        assert_eq!(cmp.compare(&1, &2), Ordering::Greater);
    }

    #[test]
    fn fn_comparator_supports_composite_keys() {
        #[derive(Clone)]
        struct Composite {
            last: String,
            first: String,
        }
        let cmp = FnComparator::new(|a: &Composite, b: &Composite| {
            a.last.cmp(&b.last).then_with(|| a.first.cmp(&b.first))
        });
        let joe_zoey = Composite {
            last: "zoey".into(),
            first: "joe".into(),
        };
        let ann_adams = Composite {
            last: "adams".into(),
            first: "ann".into(),
        };
        assert_eq!(cmp.compare(&ann_adams, &joe_zoey), Ordering::Less);
    }
}
