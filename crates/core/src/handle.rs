//! Registry handle records
//!
//! A [`Handle`] is the unit of the optimistic commit's "version switch"
//! trick: a logical ID is indirected through two physical slots, only
//! one of which is active at rest, so phase-2 of commit can make a new
//! blob visible with a single field flip instead of rewriting every
//! node that points at it.

use crate::ids::{LogicalId, PhysicalId};
use crate::version::Version;
use serde::{Deserialize, Serialize};

/// Which physical slot of a [`Handle`] is currently active.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ActiveSlot {
    /// Physical slot A is visible; B (if present) is the staging slot.
    A,
    /// Physical slot B is visible; A (if present) is the staging slot.
    B,
}

impl ActiveSlot {
    /// The slot a commit should stage a new blob into: the one that is
    /// *not* currently active.
    pub fn inactive(self) -> ActiveSlot {
        match self {
            ActiveSlot::A => ActiveSlot::B,
            ActiveSlot::B => ActiveSlot::A,
        }
    }
}

/// A handle registry record: logical ID -> {physical A, physical B,
/// active selector, version, deleted flag, WIP expiry}.
///
/// Invariants: exactly one of A/B is active at rest; version is
/// monotonic per handle; the WIP expiry is set only while phase-2 of a
/// commit is in flight, enabling a later sweep to detect and finalize
/// an orphaned commit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Handle {
    /// Stable logical identity resolved by every parent/child link.
    pub logical_id: LogicalId,
    /// Physical slot A, if one has ever been written.
    pub physical_a: Option<PhysicalId>,
    /// Physical slot B, if one has ever been written.
    pub physical_b: Option<PhysicalId>,
    /// Which of A/B is currently visible.
    pub active: ActiveSlot,
    /// Monotonic per-handle version, bumped on every commit that
    /// flips this handle.
    pub version: Version,
    /// Tombstone: the node this handle addresses was removed.
    pub deleted: bool,
    /// Set to `now + lease` at the start of phase-2; cleared on
    /// successful flip. A live transaction's idle sweep treats a handle
    /// whose `work_in_progress_expiry` is in the past as an orphaned
    /// commit to finalize or roll back.
    pub work_in_progress_expiry: Option<i64>,
}

impl Handle {
    /// A brand-new handle for a node born in phase-1 of a commit: no
    /// physical blob yet, active slot A by convention, version 0.
    pub fn new(logical_id: LogicalId) -> Self {
        Handle {
            logical_id,
            physical_a: None,
            physical_b: None,
            active: ActiveSlot::A,
            version: Version::INITIAL,
            deleted: false,
            work_in_progress_expiry: None,
        }
    }

    /// The physical ID currently visible to readers.
    pub fn active_physical(&self) -> Option<PhysicalId> {
        match self.active {
            ActiveSlot::A => self.physical_a,
            ActiveSlot::B => self.physical_b,
        }
    }

    /// The physical ID a commit should treat as the staging slot
    /// (written first, then promoted by [`Handle::flip`]).
    pub fn inactive_physical(&self) -> Option<PhysicalId> {
        match self.active.inactive() {
            ActiveSlot::A => self.physical_a,
            ActiveSlot::B => self.physical_b,
        }
    }

    /// Write a fresh physical ID into the inactive slot (phase-1).
    pub fn stage(&mut self, physical: PhysicalId) {
        match self.active.inactive() {
            ActiveSlot::A => self.physical_a = Some(physical),
            ActiveSlot::B => self.physical_b = Some(physical),
        }
    }

    /// Atomically promote the staged slot to active and bump the
    /// version (phase-2's "version switch").
    pub fn flip(&mut self) {
        self.active = self.active.inactive();
        self.version = self.version.next();
        self.work_in_progress_expiry = None;
    }
}
