//! Transaction state machine: `New -> Begun -> Phase1Done ->
//! Committed | RolledBack | Failed`.
//!
//! The manager drives these transitions; a `Transaction` only refuses
//! illegal ones (committing one that never began, beginning one
//! twice).

use ordb_core::error::{Error, Result};
use ordb_core::ids::TxnId;
use ordb_core::options::TransactionOptions;

/// Where a transaction is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionState {
    /// Constructed, no reads or writes yet.
    New,
    /// Active: reads and writes are being tracked.
    Begun,
    /// Phase-1 of commit (validate, stage blobs, log) has finished;
    /// phase-2 (flip, replicate, log removal) is next.
    Phase1Done,
    /// Phase-2 finished; writes are now visible.
    Committed,
    /// Rolled back, explicitly or after a validation conflict.
    RolledBack,
    /// Commit failed after phase-1 started -- recovery must inspect
    /// the transaction log to decide whether phase-2 completed.
    Failed,
}

/// One transaction's identity, options and lifecycle state. Holds no
/// data itself -- reads/writes are tracked by the
/// [`crate::tracker::ItemActionTracker`] the caller pairs it with.
#[derive(Debug, Clone)]
pub struct Transaction {
    pub id: TxnId,
    pub options: TransactionOptions,
    state: TransactionState,
}

impl Transaction {
    pub fn new(id: TxnId, options: TransactionOptions) -> Self {
        Transaction {
            id,
            options,
            state: TransactionState::New,
        }
    }

    pub fn state(&self) -> TransactionState {
        self.state
    }

    pub fn begin(&mut self) -> Result<()> {
        self.transition(TransactionState::New, TransactionState::Begun)
    }

    pub fn mark_phase1_done(&mut self) -> Result<()> {
        self.transition(TransactionState::Begun, TransactionState::Phase1Done)
    }

    pub fn mark_committed(&mut self) -> Result<()> {
        self.transition(TransactionState::Phase1Done, TransactionState::Committed)
    }

    /// Rollback is legal from `Begun` (nothing staged yet) or
    /// `Phase1Done` (phase-1 staged blobs and log entries get
    /// abandoned, cleaned up by the expired-log sweep).
    pub fn mark_rolled_back(&mut self) -> Result<()> {
        match self.state {
            TransactionState::Begun | TransactionState::Phase1Done => {
                self.state = TransactionState::RolledBack;
                Ok(())
            }
            other => Err(Error::CorruptedStore(format!(
                "cannot roll back transaction {} from state {other:?}",
                self.id
            ))),
        }
    }

    pub fn mark_failed(&mut self) {
        self.state = TransactionState::Failed;
    }

    fn transition(&mut self, from: TransactionState, to: TransactionState) -> Result<()> {
        if self.state != from {
            return Err(Error::CorruptedStore(format!(
                "transaction {} expected state {from:?}, found {:?}",
                self.id, self.state
            )));
        }
        self.state = to;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn happy_path_transitions_in_order() {
        let mut txn = Transaction::new(TxnId::new(), TransactionOptions::default());
        txn.begin().unwrap();
        assert_eq!(txn.state(), TransactionState::Begun);
        txn.mark_phase1_done().unwrap();
        assert_eq!(txn.state(), TransactionState::Phase1Done);
        txn.mark_committed().unwrap();
        assert_eq!(txn.state(), TransactionState::Committed);
    }

    #[test]
    fn cannot_begin_twice() {
        let mut txn = Transaction::new(TxnId::new(), TransactionOptions::default());
        txn.begin().unwrap();
        assert!(txn.begin().is_err());
    }

    #[test]
    fn cannot_commit_before_phase1() {
        let mut txn = Transaction::new(TxnId::new(), TransactionOptions::default());
        txn.begin().unwrap();
        assert!(txn.mark_committed().is_err());
    }

    #[test]
    fn rollback_allowed_after_phase1_but_not_after_commit() {
        let mut txn = Transaction::new(TxnId::new(), TransactionOptions::default());
        txn.begin().unwrap();
        txn.mark_phase1_done().unwrap();
        txn.mark_rolled_back().unwrap();
        assert_eq!(txn.state(), TransactionState::RolledBack);

        let mut committed = Transaction::new(TxnId::new(), TransactionOptions::default());
        committed.begin().unwrap();
        committed.mark_phase1_done().unwrap();
        committed.mark_committed().unwrap();
        assert!(committed.mark_rolled_back().is_err());
    }
}
