//! Transactions: snapshot reads, buffered writes, non-blocking row locks

use crate::error::{StoreError, StoreResult};
use crate::locks::TxnId;
use crate::record::{Record, RowKey, RowValue};
use crate::store::Store;
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

/// A unit of work against the [`Store`]
///
/// Reads see the snapshot taken at [`Store::begin`] plus this transaction's
/// own writes. Writes are buffered until [`commit`](Self::commit). Row locks
/// are never waited on: a row held elsewhere is either skipped
/// ([`try_lock`](Self::try_lock), [`lock_first`](Self::lock_first)) or turned
/// into a [`StoreError::SerializationConflict`] (writes).
///
/// Dropping an open transaction rolls it back.
pub struct Transaction {
    store: Store,
    id: TxnId,
    snapshot: u64,
    writes: BTreeMap<RowKey, Option<RowValue>>,
    held: HashSet<RowKey>,
    open: bool,
}

impl Transaction {
    pub(crate) fn new(store: Store, id: TxnId, snapshot: u64) -> Self {
        Self {
            store,
            id,
            snapshot,
            writes: BTreeMap::new(),
            held: HashSet::new(),
            open: true,
        }
    }

    /// Transaction id
    pub fn id(&self) -> TxnId {
        self.id
    }

    /// Commit sequence this transaction reads from
    pub fn snapshot(&self) -> u64 {
        self.snapshot
    }

    /// Store this transaction runs against
    pub fn store(&self) -> &Store {
        &self.store
    }

    /// Whether the transaction has buffered writes
    pub fn has_writes(&self) -> bool {
        !self.writes.is_empty()
    }

    /// Whether this transaction holds the lock on a row
    pub fn holds_lock(&self, key: &RowKey) -> bool {
        self.held.contains(key)
    }

    fn ensure_open(&self) -> StoreResult<()> {
        if self.open {
            Ok(())
        } else {
            Err(StoreError::TransactionClosed(self.id))
        }
    }

    // ==================== Reads ====================

    /// Read a record, `None` if absent from the snapshot
    pub fn get<R: Record>(&self, id: R::Id) -> StoreResult<Option<R>> {
        self.ensure_open()?;
        let key = RowKey::of::<R>(id);
        let value = match self.writes.get(&key) {
            Some(pending) => pending.clone(),
            None => self.store.read_visible(&key, self.snapshot),
        };
        Ok(value.and_then(|v| v.downcast_ref::<R>().cloned()))
    }

    /// Read a record that must exist
    pub fn fetch<R: Record>(&self, id: R::Id) -> StoreResult<R> {
        self.get::<R>(id)?
            .ok_or_else(|| StoreError::NotFound(RowKey::of::<R>(id)))
    }

    /// All records of a table, ordered by id
    pub fn scan<R: Record>(&self) -> StoreResult<Vec<R>> {
        self.ensure_open()?;
        let mut visible = self.store.scan_visible(R::TABLE, self.snapshot);
        let own = self
            .writes
            .range(RowKey::table_start(R::TABLE)..=RowKey::table_end(R::TABLE));
        for (key, pending) in own {
            match pending {
                Some(value) => {
                    visible.insert(key.id, Arc::clone(value));
                }
                None => {
                    visible.remove(&key.id);
                }
            }
        }
        Ok(visible
            .values()
            .filter_map(|v| v.downcast_ref::<R>().cloned())
            .collect())
    }

    /// Records of a table matching a predicate, ordered by id
    pub fn select<R: Record>(&self, predicate: impl Fn(&R) -> bool) -> StoreResult<Vec<R>> {
        Ok(self.scan::<R>()?.into_iter().filter(|r| predicate(r)).collect())
    }

    // ==================== Writes ====================

    /// Allocate a fresh id for a new record
    ///
    /// Ids come from a per-table sequence and are not reused after rollback.
    pub fn allocate<R: Record>(&self) -> R::Id {
        R::Id::from(self.store.allocate_id(R::TABLE))
    }

    /// Insert a new record (its id must come from [`allocate`](Self::allocate))
    pub fn insert<R: Record>(&mut self, record: R) -> StoreResult<()> {
        self.ensure_open()?;
        let key = RowKey::of::<R>(record.id());
        self.writes.insert(key, Some(Arc::new(record)));
        Ok(())
    }

    /// Replace an existing record, locking its row
    pub fn update<R: Record>(&mut self, record: &R) -> StoreResult<()> {
        self.ensure_open()?;
        let key = RowKey::of::<R>(record.id());
        self.lock_for_write(key)?;
        self.writes.insert(key, Some(Arc::new(record.clone())));
        Ok(())
    }

    /// Delete a record, locking its row
    pub fn delete<R: Record>(&mut self, id: R::Id) -> StoreResult<()> {
        self.ensure_open()?;
        let key = RowKey::of::<R>(id);
        self.lock_for_write(key)?;
        self.writes.insert(key, None);
        Ok(())
    }

    fn lock_for_write(&mut self, key: RowKey) -> StoreResult<()> {
        if self.writes.get(&key).is_some() && !self.is_committed_row(&key) {
            // Row created by this transaction, invisible to everyone else
            return Ok(());
        }
        if self.lock_key(key)? {
            Ok(())
        } else {
            Err(StoreError::SerializationConflict(key))
        }
    }

    fn is_committed_row(&self, key: &RowKey) -> bool {
        self.store.latest_commit_of(key).is_some()
    }

    // ==================== Locks ====================

    /// Try to lock a row without waiting
    ///
    /// `Ok(false)` when another transaction holds the lock. Fails with
    /// [`StoreError::SerializationConflict`] when the row was committed by
    /// someone else after this snapshot was taken.
    pub fn try_lock<R: Record>(&mut self, id: R::Id) -> StoreResult<bool> {
        self.ensure_open()?;
        self.lock_key(RowKey::of::<R>(id))
    }

    /// Lock the first candidate not held by another transaction
    ///
    /// Candidates are tried in iteration order; contended rows are skipped,
    /// never waited on. `Ok(None)` means every candidate was contended (or
    /// there were none).
    pub fn lock_first<R, I>(&mut self, candidates: I) -> StoreResult<Option<R>>
    where
        R: Record,
        I: IntoIterator<Item = R>,
    {
        self.ensure_open()?;
        for candidate in candidates {
            if self.lock_key(RowKey::of::<R>(candidate.id()))? {
                return Ok(Some(candidate));
            }
        }
        Ok(None)
    }

    fn lock_key(&mut self, key: RowKey) -> StoreResult<bool> {
        if self.held.contains(&key) {
            return Ok(true);
        }
        if self.store.locks().try_acquire(key, self.id).is_err() {
            return Ok(false);
        }
        self.held.insert(key);

        // Nobody can commit this row while we hold its lock, so a newer
        // version can only predate the acquisition.
        match self.store.latest_commit_of(&key) {
            Some(seq) if seq > self.snapshot => Err(StoreError::SerializationConflict(key)),
            _ => Ok(true),
        }
    }

    fn release_locks(&mut self) {
        for key in self.held.drain() {
            self.store.locks().release(&key, self.id);
        }
    }

    // ==================== Completion ====================

    /// Validate and apply buffered writes, then release all locks
    ///
    /// Returns the commit sequence number.
    pub fn commit(mut self) -> StoreResult<u64> {
        self.ensure_open()?;
        self.open = false;
        let writes = std::mem::take(&mut self.writes);
        let result = self.store.apply(self.snapshot, writes);
        if result.is_err() {
            self.store.note_rollback();
        }
        self.release_locks();
        tracing::trace!(id = %self.id, ok = result.is_ok(), "commit");
        result
    }

    /// Discard buffered writes and release all locks
    pub fn rollback(mut self) {
        self.abort();
    }

    fn abort(&mut self) {
        if !self.open {
            return;
        }
        self.open = false;
        self.writes.clear();
        self.release_locks();
        self.store.note_rollback();
        tracing::trace!(id = %self.id, "rollback");
    }
}

impl Drop for Transaction {
    fn drop(&mut self) {
        self.abort();
    }
}

impl std::fmt::Debug for Transaction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transaction")
            .field("id", &self.id)
            .field("snapshot", &self.snapshot)
            .field("writes", &self.writes.len())
            .field("locks", &self.held.len())
            .finish()
    }
}
