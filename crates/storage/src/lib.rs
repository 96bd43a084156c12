//! File-backed storage substrate: the handle registry, the blob store
//! (plain and erasure-coded), and the store metadata repository.
//!
//! Every public type here implements a capability trait from
//! `ordb_core::traits` (or, for the store repository, exposes the
//! operation set directly -- there is no generic `StoreRepository`
//! trait since it has exactly one backend shape). Higher layers never
//! depend on the concrete file layout, only on the trait.

pub mod blob;
pub mod erasure;
pub mod registry;
pub mod segment;
pub mod store_repo;

pub use blob::{ErasureBlobStore, PlainBlobStore};
pub use registry::FileRegistry;
pub use store_repo::FileStoreRepository;
