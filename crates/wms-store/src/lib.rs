//! # wms-store
//!
//! Shared transactional store for the warehouse scheduler.
//!
//! Features:
//! - Snapshot reads (repeatable read) over versioned rows
//! - First-committer-wins write validation
//! - Non-blocking row locks: `try_lock` / `lock_first` skip rows held elsewhere
//! - Typed records through the [`Record`] trait

#![warn(missing_docs)]
#![warn(clippy::all)]

mod error;
mod locks;
mod record;
mod store;
mod transaction;

pub use error::{StoreError, StoreResult};
pub use locks::{LockTable, TxnId};
pub use record::{Record, RowKey, TableName};
pub use store::{Store, StoreStats};
pub use transaction::Transaction;
