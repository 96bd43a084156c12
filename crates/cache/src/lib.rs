//! Two-tier caching: a per-transaction L1 map and a shared,
//! TTL-backed L2 implementing [`ordb_core::traits::Cache`].

mod l1;
mod l2;

pub use l1::L1Cache;
pub use l2::InMemoryCache;
