//! Two-phase optimistic transaction concurrency control.
//!
//! Built on two pieces: [`ItemActionTracker`], a `NodeRepository`
//! decorator that buffers a transaction's reads and writes, and
//! [`TransactionManager`], which validates the tracked read set and
//! drives commit through a [`Registry`](ordb_core::traits::Registry),
//! a [`BlobStore`](ordb_core::traits::BlobStore) and a
//! [`TransactionLog`](ordb_core::traits::TransactionLog) -- all held
//! as trait objects, so this crate depends only on `ordb-core` and
//! `ordb-btree`, never on a concrete storage backend.

#![warn(missing_docs)]

pub mod manager;
pub mod tracker;
pub mod transaction;

pub use manager::{LogEntryKind, TransactionManager};
pub use tracker::{ItemActionTracker, VersionOracle};
pub use transaction::{Transaction, TransactionState};
