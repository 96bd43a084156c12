//! Capability contracts shared by every backend implementation.
//!
//! Every subsystem that has more than one backend (an in-memory cache
//! for tests vs. a networked one, a plain blob store vs. an
//! erasure-coded one) is expressed as a fixed capability trait here.
//! Callers are generic over the trait, so swapping a backend is a
//! constructor-time type parameter, never a `dyn` dispatch on the hot
//! path.

use crate::error::Result;
use crate::handle::Handle;
use crate::ids::{PhysicalId, TxnId};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::time::Duration;

/// The L2 / advisory-lock cache contract.
///
/// Every lock primitive carries a TTL: a crashed holder can never block
/// progress beyond the lease.
pub trait Cache: Send + Sync {
    /// Store raw bytes under `key` with an optional TTL.
    fn set(&self, key: &str, value: Vec<u8>, ttl: Option<Duration>) -> Result<()>;

    /// Fetch raw bytes for `key`.
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;

    /// Fetch raw bytes and refresh the entry's TTL in one call.
    fn get_ex(&self, key: &str, ttl: Option<Duration>) -> Result<Option<Vec<u8>>>;

    /// Remove `key`.
    fn delete(&self, key: &str) -> Result<()>;

    /// Store a serializable value under `key`.
    ///
    /// `where Self: Sized` keeps this generic method from disqualifying
    /// the trait from `dyn Cache` use -- callers needing dynamic
    /// dispatch serialize to bytes themselves and call [`Cache::set`].
    fn set_struct<T: Serialize>(&self, key: &str, value: &T, ttl: Option<Duration>) -> Result<()>
    where
        Self: Sized;

    /// Fetch and deserialize a value stored under `key`.
    fn get_struct<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>>
    where
        Self: Sized;

    /// Attempt to acquire an advisory lock on `key` for `ttl`. Returns
    /// `true` if acquired, `false` if already held.
    fn lock(&self, key: &str, ttl: Duration) -> Result<bool>;

    /// True if `key` is currently locked by anyone (including a lock
    /// whose TTL has not yet elapsed).
    fn is_locked(&self, key: &str) -> Result<bool>;

    /// Release a lock this caller holds. A no-op if not held or already
    /// expired.
    fn unlock(&self, key: &str) -> Result<()>;

    /// Build a lock key from its component parts, e.g. `(table,
    /// logical_id)` for a registry sector lock.
    fn format_lock_key(&self, parts: &[&str]) -> String {
        parts.join(":")
    }

    /// Drop everything the cache is holding.
    fn clear(&self) -> Result<()>;

    /// True if the backing cache is reachable.
    fn ping(&self) -> Result<bool>;
}

/// The handle registry contract, batched per table.
pub trait Registry: Send + Sync {
    /// Insert new handles.
    fn add(&self, table: &str, handles: &[Handle]) -> Result<()>;

    /// Update existing handles with a per-record version check: a
    /// handle whose on-disk version no longer matches the caller's
    /// expectation fails with [`crate::Error::Conflict`].
    fn update(&self, table: &str, handles: &[Handle]) -> Result<()>;

    /// Update existing handles without taking per-sector locks or
    /// version-checking (used by the replica side of `replicate`, which
    /// trusts the primary's ordering).
    fn update_no_locks(&self, table: &str, handles: &[Handle]) -> Result<()>;

    /// Fetch handles by logical ID; `None` in the result for IDs that
    /// don't exist.
    fn get(&self, table: &str, logical_ids: &[crate::ids::LogicalId]) -> Result<Vec<Option<Handle>>>;

    /// Remove handles by logical ID.
    fn remove(&self, table: &str, logical_ids: &[crate::ids::LogicalId]) -> Result<()>;

    /// Mirror a successful local update to the passive replica. Called
    /// after a local write succeeds; a failure here is handled by the
    /// replication tracker, not surfaced as a commit failure.
    fn replicate(&self, table: &str, handles: &[Handle]) -> Result<()>;
}

/// The blob store contract, batched per table.
pub trait BlobStore: Send + Sync {
    /// Write new blobs.
    fn add(&self, table: &str, items: &[(PhysicalId, Vec<u8>)]) -> Result<()>;

    /// Overwrite blobs (used when a blob's content needs to be replaced
    /// in place rather than through a fresh physical ID, e.g. replica
    /// catch-up).
    fn update(&self, table: &str, items: &[(PhysicalId, Vec<u8>)]) -> Result<()>;

    /// Fetch one blob's bytes.
    fn get_one(&self, table: &str, id: PhysicalId) -> Result<Option<Vec<u8>>>;

    /// Delete blobs by ID.
    fn remove(&self, table: &str, ids: &[PhysicalId]) -> Result<()>;
}

/// The transaction log contract.
pub trait TransactionLog: Send + Sync {
    /// Append one entry. `step` is monotone within a transaction.
    fn add(&self, tid: TxnId, step: u64, payload: &[u8]) -> Result<()>;

    /// Remove all entries for a transaction (terminal step, or a sweep
    /// finalizing a dead one).
    fn remove(&self, tid: TxnId) -> Result<()>;

    /// The oldest transaction whose log has exceeded the lease,
    /// regardless of which hour bucket it's filed under, or `None` if
    /// none has expired.
    fn get_one(&self) -> Result<Option<TxnId>>;

    /// The oldest expired transaction filed under a specific
    /// hour-bucket directory (`YYYYMMDDHH`), or `None`.
    fn get_one_of_hour(&self, hour: &str) -> Result<Option<TxnId>>;

    /// Allocate a fresh transaction ID.
    fn new_uuid(&self) -> TxnId;
}

/// Optional priority sub-interface: a transaction log implementation may
/// support jumping a specific transaction ahead of the normal
/// oldest-first sweep order (e.g. to finalize a known-`Committed`
/// transaction before ordinary expired ones).
pub trait PriorityLog: TransactionLog {
    /// Mark `tid` for priority pickup by the next idle sweep.
    fn prioritize(&self, tid: TxnId) -> Result<()>;
}
