//! Versioned row storage shared by all workers

use crate::error::{StoreError, StoreResult};
use crate::locks::{LockTable, TxnId};
use crate::record::{RowKey, RowValue, TableName};
use crate::transaction::Transaction;
use dashmap::DashMap;
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// One committed version of a row (`None` = deleted)
#[derive(Clone)]
pub(crate) struct Version {
    pub(crate) commit_seq: u64,
    pub(crate) value: Option<RowValue>,
}

/// Counters describing store activity
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct StoreStats {
    /// Successful commits carrying at least one write
    pub commits: u64,
    /// Commits rejected by first-committer-wins validation
    pub commit_conflicts: u64,
    /// Explicit or implicit rollbacks
    pub rollbacks: u64,
}

struct Inner {
    /// Version chains, oldest first
    // TODO: prune versions older than the oldest live snapshot
    rows: RwLock<BTreeMap<RowKey, Vec<Version>>>,
    /// Sequence number of the latest commit; snapshots are taken from it
    last_commit: AtomicU64,
    /// Id sequences per table; allocation is not transactional
    sequences: DashMap<TableName, u64>,
    locks: LockTable,
    next_txn: AtomicU64,
    commits: AtomicU64,
    commit_conflicts: AtomicU64,
    rollbacks: AtomicU64,
}

/// Handle on the shared store
///
/// Cloning is cheap; all clones see the same data.
#[derive(Clone)]
pub struct Store {
    inner: Arc<Inner>,
}

impl Store {
    /// Create an empty store
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                rows: RwLock::new(BTreeMap::new()),
                last_commit: AtomicU64::new(0),
                sequences: DashMap::new(),
                locks: LockTable::new(),
                next_txn: AtomicU64::new(1),
                commits: AtomicU64::new(0),
                commit_conflicts: AtomicU64::new(0),
                rollbacks: AtomicU64::new(0),
            }),
        }
    }

    /// Begin a transaction on a fresh snapshot
    pub fn begin(&self) -> Transaction {
        let id = TxnId::new(self.inner.next_txn.fetch_add(1, Ordering::Relaxed));
        let snapshot = self.inner.last_commit.load(Ordering::SeqCst);
        tracing::trace!(%id, snapshot, "begin transaction");
        Transaction::new(self.clone(), id, snapshot)
    }

    /// Sequence number of the latest commit
    pub fn last_commit(&self) -> u64 {
        self.inner.last_commit.load(Ordering::SeqCst)
    }

    /// Activity counters
    pub fn stats(&self) -> StoreStats {
        StoreStats {
            commits: self.inner.commits.load(Ordering::Relaxed),
            commit_conflicts: self.inner.commit_conflicts.load(Ordering::Relaxed),
            rollbacks: self.inner.rollbacks.load(Ordering::Relaxed),
        }
    }

    /// Holder of a row lock, if any
    pub fn lock_holder(&self, key: &RowKey) -> Option<TxnId> {
        self.inner.locks.holder(key)
    }

    /// Number of rows currently locked
    pub fn locked_rows(&self) -> usize {
        self.inner.locks.len()
    }

    pub(crate) fn locks(&self) -> &LockTable {
        &self.inner.locks
    }

    pub(crate) fn allocate_id(&self, table: TableName) -> u64 {
        let mut next = self.inner.sequences.entry(table).or_insert(0);
        *next += 1;
        *next
    }

    /// Value of a row as seen by `snapshot` (`None` if absent or deleted)
    pub(crate) fn read_visible(&self, key: &RowKey, snapshot: u64) -> Option<RowValue> {
        let rows = self.inner.rows.read();
        rows.get(key)
            .and_then(|chain| chain.iter().rev().find(|v| v.commit_seq <= snapshot))
            .and_then(|v| v.value.clone())
    }

    /// Commit sequence of the newest version of a row
    pub(crate) fn latest_commit_of(&self, key: &RowKey) -> Option<u64> {
        let rows = self.inner.rows.read();
        rows.get(key).and_then(|chain| chain.last()).map(|v| v.commit_seq)
    }

    /// All rows of a table visible to `snapshot`, ordered by id
    pub(crate) fn scan_visible(&self, table: TableName, snapshot: u64) -> BTreeMap<u64, RowValue> {
        let rows = self.inner.rows.read();
        rows.range(RowKey::table_start(table)..=RowKey::table_end(table))
            .filter_map(|(key, chain)| {
                chain
                    .iter()
                    .rev()
                    .find(|v| v.commit_seq <= snapshot)
                    .and_then(|v| v.value.clone())
                    .map(|value| (key.id, value))
            })
            .collect()
    }

    /// Validate and apply a write set atomically
    pub(crate) fn apply(
        &self,
        snapshot: u64,
        writes: BTreeMap<RowKey, Option<RowValue>>,
    ) -> StoreResult<u64> {
        if writes.is_empty() {
            return Ok(self.last_commit());
        }

        let mut rows = self.inner.rows.write();

        // Writers hold row locks, so this only trips for rows that changed
        // between the snapshot and the lock acquisition.
        for key in writes.keys() {
            if let Some(newest) = rows.get(key).and_then(|chain| chain.last()) {
                if newest.commit_seq > snapshot {
                    self.inner.commit_conflicts.fetch_add(1, Ordering::Relaxed);
                    return Err(StoreError::SerializationConflict(*key));
                }
            }
        }

        let seq = self.inner.last_commit.load(Ordering::SeqCst) + 1;
        for (key, value) in writes {
            rows.entry(key).or_default().push(Version {
                commit_seq: seq,
                value,
            });
        }
        self.inner.last_commit.store(seq, Ordering::SeqCst);
        self.inner.commits.fetch_add(1, Ordering::Relaxed);
        Ok(seq)
    }

    pub(crate) fn note_rollback(&self) {
        self.inner.rollbacks.fetch_add(1, Ordering::Relaxed);
    }
}

impl Default for Store {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Store")
            .field("last_commit", &self.last_commit())
            .field("locked_rows", &self.locked_rows())
            .finish()
    }
}
