//! Error types for the scheduler
//!
//! Failures are classified by how the retry loop reacts to them: conflicts
//! are retried silently, cancellation stops the worker, everything else is
//! logged and skipped.

use thiserror::Error;
use wms_domain::{DomainError, OperationId};
use wms_store::{RowKey, StoreError};

/// Scheduler errors
#[derive(Debug, Error)]
pub enum SchedulerError {
    /// Concurrent transaction got there first; retry with a fresh snapshot
    #[error("serialization conflict on {0}")]
    SerializationConflict(RowKey),

    /// Operation inputs not in place; the operation stays planned
    #[error("operation {op} not executable: {reason}")]
    PreconditionNotMet {
        /// Operation that was attempted
        op: OperationId,
        /// What was wrong
        reason: String,
    },

    /// Shutdown requested
    #[error("cancelled")]
    Cancelled,

    /// Anything else
    #[error("{0}")]
    Unclassified(String),
}

impl SchedulerError {
    /// Whether retrying with a fresh snapshot may succeed
    pub fn is_conflict(&self) -> bool {
        matches!(self, SchedulerError::SerializationConflict(_))
    }
}

impl From<StoreError> for SchedulerError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::SerializationConflict(key) => SchedulerError::SerializationConflict(key),
            other => SchedulerError::Unclassified(other.to_string()),
        }
    }
}

impl From<DomainError> for SchedulerError {
    fn from(err: DomainError) -> Self {
        match err {
            DomainError::Store(store) => store.into(),
            DomainError::PreconditionNotMet { op, avatar, reason } => {
                SchedulerError::PreconditionNotMet {
                    op,
                    reason: format!("input avatar {} is {}", avatar, reason),
                }
            }
            other => SchedulerError::Unclassified(other.to_string()),
        }
    }
}

/// Result type for scheduler operations
pub type SchedulerResult<T> = Result<T, SchedulerError>;
