//! Monotonic version counters
//!
//! Every handle carries a `Version` that increments exactly once per
//! successful commit touching it. Phase-1 and phase-2 of commit each
//! compare a transaction's
//! first-seen version against the current one; a mismatch is the
//! optimistic-concurrency conflict signal.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A monotonically increasing version number attached to a handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Version(u64);

impl Version {
    /// The version assigned to a handle at node birth.
    pub const INITIAL: Version = Version(0);

    /// Wrap a raw counter value (used when reading a handle record back
    /// from a registry segment file).
    pub const fn from_raw(raw: u64) -> Self {
        Version(raw)
    }

    /// The raw counter value.
    pub const fn raw(self) -> u64 {
        self.0
    }

    /// The version after one more commit.
    #[must_use]
    pub fn next(self) -> Version {
        Version(self.0 + 1)
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}", self.0)
    }
}
