//! Transaction log persistence: the crash-recovery substrate a
//! transaction manager appends to during two-phase commit.
//!
//! [`FileTransactionLog`] is the on-disk [`TransactionLog`] used in
//! production; [`encoding`] is the record framing it builds on.

#![warn(missing_docs)]

pub mod encoding;
pub mod transaction_log;

pub use encoding::Record;
pub use ordb_core::traits::{PriorityLog, TransactionLog};
pub use transaction_log::FileTransactionLog;
