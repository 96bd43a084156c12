//! Active/passive replication: which folder root is authoritative,
//! commit-change logging while the passive side lags, and
//! fast-forward reinstatement.

#![warn(missing_docs)]

pub mod status;
pub mod tracker;

pub use status::{ReplicationStatus, Toggler};
pub use tracker::ReplicationTracker;
