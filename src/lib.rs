//! # ordb
//!
//! A transactional, ordered key-value storage engine built on a
//! B-tree, with optimistic two-phase commit, active/passive
//! replication and optional erasure-coded blob storage.
//!
//! # Quick Start
//!
//! ```no_run
//! use ordb::{Runtime, StoreOptions, NaturalOrder, Mode};
//!
//! fn main() -> ordb::Result<()> {
//!     let runtime = Runtime::open("./my-data")?;
//!     runtime.create_store(StoreOptions::new("people"))?;
//!
//!     let session = runtime.session::<i64, String, _>("people", NaturalOrder)?;
//!     let (mut txn, tracker, mut tree) = session.begin(Mode::ForWriting)?;
//!     let count_before = tree.count();
//!     tree.add(5000, "alice".to_string())?;
//!     session.commit(&mut txn, &tracker, &tree, count_before)?;
//!     Ok(())
//! }
//! ```
//!
//! # Architecture
//!
//! [`Runtime`] is the main entry point: it opens one base directory
//! and owns the registry, blob store, cache, store-metadata
//! repository, transaction log and (optional) replication tracker
//! shared by every store inside it. [`Session`] is a typed handle over
//! one named store, building a fresh tracked B-tree for every
//! transaction and driving commit through the shared backend.
//!
//! Internal crates (`ordb-btree`, `ordb-storage`, `ordb-concurrency`,
//! `ordb-durability`, `ordb-replication`, `ordb-cache`) are implementation
//! detail; this crate re-exports the surface needed to open a database,
//! define stores and run transactions.

#![warn(missing_docs)]

pub use ordb_btree::{BTree, Item, Node, NodeRepository};
pub use ordb_concurrency::{ItemActionTracker, Transaction, TransactionState};
pub use ordb_core::comparator::{Comparator, FnComparator, NaturalOrder};
pub use ordb_core::error::{Error, Result};
pub use ordb_core::ids::{ItemId, LogicalId, PhysicalId, TxnId};
pub use ordb_core::options::{CacheType, ErasureConfig, Mode, TransactionOptions};
pub use ordb_core::store::{CacheConfig, Store, StoreOptions};
pub use ordb_engine::{RegistryNodeRepository, Runtime, RuntimeConfig, Session, TrackedRepo};
pub use ordb_replication::{ReplicationStatus, Toggler};
