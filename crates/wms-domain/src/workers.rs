//! Worker records
//!
//! Regular worker records track timeslice progress and double as the
//! liveness registry continuous workers poll. Continuous worker records are
//! ephemeral and only identify the running background workers.

use crate::error::DomainResult;
use crate::ids::{ContinuousWorkerId, WorkerId};
use std::fmt;
use wms_store::{Record, TableName, Transaction};

/// Progress of one timeslice-driven worker
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RegularWorkerRecord {
    /// Record id
    pub id: WorkerId,
    /// OS process id of the launcher
    pub pid: u32,
    /// Last completed timeslice
    pub done_timeslice: u32,
    /// Last timeslice this worker will run
    pub max_timeslice: u32,
    /// False once the worker finished or was cancelled; never set back
    pub active: bool,
}

impl RegularWorkerRecord {
    /// Timeslice the worker is about to run, or running
    pub fn current_timeslice(&self) -> u32 {
        self.done_timeslice + 1
    }

    /// Whether every timeslice up to `max_timeslice` is done
    pub fn is_complete(&self) -> bool {
        self.done_timeslice >= self.max_timeslice
    }
}

impl Record for RegularWorkerRecord {
    const TABLE: TableName = "regular_worker";
    type Id = WorkerId;

    fn id(&self) -> WorkerId {
        self.id
    }
}

/// Background worker role
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ContinuousKind {
    /// Turns reserved requests into operations
    Planner,
    /// Binds goods to pending requests
    Reserver,
}

impl fmt::Display for ContinuousKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ContinuousKind::Planner => write!(f, "planner"),
            ContinuousKind::Reserver => write!(f, "reserver"),
        }
    }
}

/// A running background worker
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ContinuousWorkerRecord {
    /// Record id
    pub id: ContinuousWorkerId,
    /// OS process id of the launcher
    pub pid: u32,
    /// Role
    pub kind: ContinuousKind,
}

impl Record for ContinuousWorkerRecord {
    const TABLE: TableName = "continuous_worker";
    type Id = ContinuousWorkerId;

    fn id(&self) -> ContinuousWorkerId {
        self.id
    }
}

/// Register a regular worker for `timeslices` more timeslices
///
/// Numbering continues after the furthest timeslice any earlier run reached.
pub fn register_regular(
    txn: &mut Transaction,
    pid: u32,
    timeslices: u32,
) -> DomainResult<RegularWorkerRecord> {
    let previous = txn
        .scan::<RegularWorkerRecord>()?
        .iter()
        .map(|r| r.done_timeslice)
        .max()
        .unwrap_or(0);
    let record = RegularWorkerRecord {
        id: txn.allocate::<RegularWorkerRecord>(),
        pid,
        done_timeslice: previous,
        max_timeslice: previous + timeslices,
        active: timeslices > 0,
    };
    txn.insert(record.clone())?;
    Ok(record)
}

/// Record the current timeslice as done, deactivating on the last one
pub fn finish_timeslice(txn: &mut Transaction, id: WorkerId) -> DomainResult<RegularWorkerRecord> {
    let mut record = txn.fetch::<RegularWorkerRecord>(id)?;
    record.done_timeslice += 1;
    if record.is_complete() {
        record.active = false;
    }
    txn.update(&record)?;
    Ok(record)
}

/// Mark a regular worker inactive for good
pub fn deactivate(txn: &mut Transaction, id: WorkerId) -> DomainResult<RegularWorkerRecord> {
    let mut record = txn.fetch::<RegularWorkerRecord>(id)?;
    if record.active {
        record.active = false;
        txn.update(&record)?;
    }
    Ok(record)
}

/// Whether any regular worker is still active
pub fn any_regular_active(txn: &Transaction) -> DomainResult<bool> {
    Ok(txn
        .scan::<RegularWorkerRecord>()?
        .iter()
        .any(|r| r.active))
}

/// Register a background worker
pub fn register_continuous(
    txn: &mut Transaction,
    pid: u32,
    kind: ContinuousKind,
) -> DomainResult<ContinuousWorkerRecord> {
    let record = ContinuousWorkerRecord {
        id: txn.allocate::<ContinuousWorkerRecord>(),
        pid,
        kind,
    };
    txn.insert(record.clone())?;
    Ok(record)
}

/// Delete leftover records of `kind` from earlier runs, returning how many
pub fn cleanup_continuous(txn: &mut Transaction, kind: ContinuousKind) -> DomainResult<usize> {
    let stale = txn.select::<ContinuousWorkerRecord>(|r| r.kind == kind)?;
    for record in &stale {
        txn.delete::<ContinuousWorkerRecord>(record.id)?;
    }
    Ok(stale.len())
}

/// Remove a background worker's record
pub fn unregister_continuous(txn: &mut Transaction, id: ContinuousWorkerId) -> DomainResult<()> {
    txn.delete::<ContinuousWorkerRecord>(id)?;
    Ok(())
}
