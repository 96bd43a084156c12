//! Unified error type for the ordb storage engine
//!
//! [`Error`] is the error type returned by every public operation across
//! the B-tree, transaction manager, storage substrate and replication
//! tracker. Every variant maps to one of the error kinds from the design
//! (`NotFound`, `ConflictError`, `FailoverQualifiedError`, ...); there is
//! intentionally no generic catch-all variant so callers can match
//! exhaustively on failure mode.

use std::io;
use thiserror::Error;

/// Result type alias used throughout the crate family.
pub type Result<T> = std::result::Result<T, Error>;

/// Unified error type for ordb operations.
#[derive(Debug, Error)]
pub enum Error {
    /// The requested key, handle, store or blob does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// An entity that must be unique already exists.
    #[error("already exists: {0}")]
    AlreadyExists(String),

    /// Optimistic concurrency control detected an overlapping write.
    /// Retryable: the caller should reopen a transaction and retry.
    #[error("conflict: {0}")]
    Conflict(String),

    /// An advisory lock could not be acquired before its TTL expired.
    /// Retryable.
    #[error("lock timeout on {0}")]
    LockTimeout(String),

    /// Low-level file I/O failure (registry, blob, or log files).
    /// Never failover-qualified on its own; callers must route through
    /// [`is_failover_qualified`] to decide if a flip is warranted.
    #[error("I/O error: {0}")]
    FileIo(String),

    /// A registry or store-repository write failed in a way that
    /// justifies flipping the active/passive toggler.
    #[error("failover-qualified error: {0}")]
    FailoverQualified(String),

    /// A B-tree or registry structural invariant was violated. Fatal to
    /// the transaction; not retryable.
    #[error("corrupted store: {0}")]
    CorruptedStore(String),

    /// A user-supplied comparator panicked or returned an inconsistent
    /// ordering.
    #[error("bad comparator: {0}")]
    BadComparator(String),

    /// The calling cancellation context was canceled.
    #[error("operation canceled")]
    Canceled,

    /// The calling cancellation context's deadline elapsed.
    #[error("deadline exceeded")]
    Deadline,

    /// A feature was used without the configuration it requires (for
    /// example, erasure coding without drive paths).
    #[error("unconfigured: {0}")]
    Unconfigured(String),

    /// Serialization/deserialization failure.
    #[error("serialization error: {0}")]
    Serialization(String),
}

impl From<io::Error> for Error {
    fn from(e: io::Error) -> Self {
        Error::FileIo(e.to_string())
    }
}

impl Error {
    /// True for errors the caller should retry (after reopening a
    /// transaction, for `Conflict`/`LockTimeout`).
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::Conflict(_) | Error::LockTimeout(_))
    }

    /// True if this error is a version/write conflict from optimistic
    /// concurrency control.
    pub fn is_conflict(&self) -> bool {
        matches!(self, Error::Conflict(_))
    }

    /// True for corruption/comparator errors: bugs or on-disk damage,
    /// never safe to retry automatically.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Error::CorruptedStore(_) | Error::BadComparator(_))
    }

    /// The single predicate that decides whether an I/O error from the
    /// registry or store repository justifies flipping the replication
    /// toggler.
    ///
    /// Only [`Error::FailoverQualified`] qualifies. Blob-store and
    /// B-tree-algorithm errors are routed through this same predicate by
    /// callers and always return `false` here: erasure shard loss and
    /// structural corruption trigger rollback, never a flip.
    pub fn is_failover_qualified(&self) -> bool {
        matches!(self, Error::FailoverQualified(_))
    }
}
