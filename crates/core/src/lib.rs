//! Shared types, errors and cross-crate contracts for the ordb storage
//! engine.
//!
//! `ordb-core` has no knowledge of B-trees, transactions, or files on
//! disk; it only defines the vocabulary every other crate in the
//! workspace shares: identifiers, the unified error type, the handle
//! record, store metadata, and the capability traits (`Cache`,
//! `Registry`, `BlobStore`, `TransactionLog`) that let the storage
//! substrate, the transaction manager and the replication tracker be
//! built independently of any one backend.

pub mod codec;
pub mod comparator;
pub mod error;
pub mod handle;
pub mod ids;
pub mod limits;
pub mod options;
pub mod store;
pub mod time;
pub mod traits;
pub mod version;

pub use codec::{BincodeCodec, Codec};
pub use comparator::{Comparator, FnComparator, NaturalOrder};
pub use error::{Error, Result};
pub use handle::{ActiveSlot, Handle};
pub use ids::{ItemId, LogicalId, PhysicalId, TxnId};
pub use options::{CacheType, ErasureConfig, Mode, TransactionOptions};
pub use store::{CacheConfig, Store, StoreOptions};
pub use traits::{BlobStore, Cache, PriorityLog, Registry, TransactionLog};
pub use version::Version;
