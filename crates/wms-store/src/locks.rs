//! Lock Table - tracks which transaction holds the row lock on each key

use crate::record::RowKey;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::fmt;

/// Transaction identifier
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TxnId(pub u64);

impl TxnId {
    /// Create a new transaction ID
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    /// Get the raw ID value
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for TxnId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "txn-{}", self.0)
    }
}

/// Row lock table
///
/// Each row can be locked by at most one transaction at a time. Acquisition
/// never waits: a held row is reported with its holder so that callers can
/// skip it.
pub struct LockTable {
    holders: DashMap<RowKey, TxnId>,
}

impl LockTable {
    /// Create a new empty lock table
    pub fn new() -> Self {
        Self {
            holders: DashMap::new(),
        }
    }

    /// Try to lock a row
    ///
    /// Returns `Ok(())` if the lock was acquired or already held by `txn`.
    /// Returns `Err(holder)` if another transaction holds it.
    pub fn try_acquire(&self, key: RowKey, txn: TxnId) -> Result<(), TxnId> {
        match self.holders.entry(key) {
            Entry::Occupied(entry) => {
                let holder = *entry.get();
                if holder == txn {
                    Ok(())
                } else {
                    Err(holder)
                }
            }
            Entry::Vacant(entry) => {
                entry.insert(txn);
                Ok(())
            }
        }
    }

    /// Release one row lock, only if `txn` holds it
    pub fn release(&self, key: &RowKey, txn: TxnId) -> bool {
        self.holders
            .remove_if(key, |_, holder| *holder == txn)
            .is_some()
    }

    /// Current holder of a row lock
    pub fn holder(&self, key: &RowKey) -> Option<TxnId> {
        self.holders.get(key).map(|entry| *entry)
    }

    /// Number of rows currently locked
    pub fn len(&self) -> usize {
        self.holders.len()
    }

    /// Whether no row is locked
    pub fn is_empty(&self) -> bool {
        self.holders.is_empty()
    }
}

impl Default for LockTable {
    fn default() -> Self {
        Self::new()
    }
}
