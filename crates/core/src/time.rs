//! Wall-clock helpers
//!
//! Timestamps are stored as milliseconds since the Unix epoch throughout
//! the engine (handle WIP leases, replication failure times, lock TTLs),
//! so they serialize compactly and compare with plain integer ops.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Current wall-clock time in milliseconds since the Unix epoch.
pub fn now_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::ZERO)
        .as_millis() as i64
}

/// `now_millis() + lease.as_millis()`, used to set a handle's
/// work-in-progress expiry during phase-2 of commit.
pub fn lease_expiry(lease: Duration) -> i64 {
    now_millis() + lease.as_millis() as i64
}

/// True if `expiry` (milliseconds since epoch) has passed.
pub fn has_expired(expiry: i64) -> bool {
    now_millis() >= expiry
}
