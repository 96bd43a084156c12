//! Identifier newtypes
//!
//! The engine distinguishes three kinds of identifier that must never be
//! confused: a node's stable **logical** identity (used in parent/child
//! links so the tree shape survives a version switch), its **physical**
//! identity (the content-addressed blob currently behind it), and an
//! **item** identity (per-entry UUID used to order duplicate keys and to
//! address an exact item with `FindWithID`).

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

macro_rules! uuid_newtype {
    ($name:ident, $doc:expr) => {
        #[doc = $doc]
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        pub struct $name(Uuid);

        impl $name {
            /// Generate a fresh random identifier.
            pub fn new() -> Self {
                $name(Uuid::new_v4())
            }

            /// Wrap an existing UUID (used when reading identifiers back
            /// from disk).
            pub fn from_uuid(id: Uuid) -> Self {
                $name(id)
            }

            /// The underlying UUID.
            pub fn as_uuid(&self) -> Uuid {
                self.0
            }

            /// Nil identifier, used as the "no child" marker for an
            /// emptied interior slot awaiting merge.
            pub fn nil() -> Self {
                $name(Uuid::nil())
            }

            /// True if this is the nil marker.
            pub fn is_nil(&self) -> bool {
                self.0.is_nil()
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

uuid_newtype!(
    LogicalId,
    "Stable logical identifier of a B-tree node, resolved through the \
     handle registry to a physical blob. Parent/child links are always \
     stored as `LogicalId`, never as a direct pointer, so the tree graph \
     has no cycles through physical storage and a commit can rewrite a \
     node's physical blob without touching its neighbors."
);

uuid_newtype!(
    PhysicalId,
    "Content-addressed identifier of a blob (a serialized node or a \
     value) in the blob store. A handle holds two of these — the active \
     and inactive physical slot — so commit can stage a new blob without \
     disturbing the currently-visible one."
);

uuid_newtype!(
    ItemId,
    "Per-item identifier used to order duplicate keys deterministically \
     (equal keys are ordered by `(key, ItemId)`) and to address an exact \
     duplicate with `FindWithID`."
);

uuid_newtype!(TxnId, "Identifier of a transaction, used in log file names and as the key for advisory locks held by that transaction.");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_ids_are_distinct() {
        assert_ne!(LogicalId::new(), LogicalId::new());
        assert_ne!(PhysicalId::new(), PhysicalId::new());
    }

    #[test]
    fn nil_logical_id_is_nil() {
        assert!(LogicalId::nil().is_nil());
        assert!(!LogicalId::new().is_nil());
    }

    #[test]
    fn round_trips_through_uuid() {
        let id = ItemId::new();
        let again = ItemId::from_uuid(id.as_uuid());
        assert_eq!(id, again);
    }

    #[test]
    fn ids_are_totally_ordered_for_item_id_tie_break() {
        // Duplicate-key ordering relies on ItemId being Ord.
        let a = ItemId::new();
        let b = ItemId::new();
        assert!(a < b || b < a || a == b);
    }
}
