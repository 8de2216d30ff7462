//! Worker error types

use thiserror::Error;
use wms_domain::DomainError;
use wms_scheduler::SchedulerError;
use wms_store::StoreError;

/// Worker errors
#[derive(Debug, Error)]
pub enum WorkerError {
    /// Shutdown requested while the worker was running
    #[error("worker cancelled")]
    Cancelled,

    /// Barrier coordinator went away
    #[error("barrier closed: {0}")]
    BarrierClosed(String),

    /// Own record could not be updated
    #[error("bookkeeping failed: {0}")]
    Bookkeeping(String),

    /// Scheduler failure
    #[error("scheduler error: {0}")]
    Scheduler(SchedulerError),

    /// Domain failure
    #[error("domain error: {0}")]
    Domain(#[from] DomainError),

    /// Store failure
    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

impl From<SchedulerError> for WorkerError {
    fn from(err: SchedulerError) -> Self {
        match err {
            SchedulerError::Cancelled => WorkerError::Cancelled,
            other => WorkerError::Scheduler(other),
        }
    }
}

impl WorkerError {
    /// Whether the worker stopped because of shutdown
    pub fn is_cancelled(&self) -> bool {
        matches!(self, WorkerError::Cancelled)
    }
}

/// Result type for worker operations
pub type WorkerResult<T> = Result<T, WorkerError>;
