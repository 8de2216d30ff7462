//! Domain error types

use crate::ids::{AvatarId, OperationId};
use thiserror::Error;
use wms_store::StoreError;

/// Domain errors
#[derive(Debug, Error)]
pub enum DomainError {
    /// An operation input is not in the state execution requires
    #[error("operation {op} cannot run: input avatar {avatar} is {reason}")]
    PreconditionNotMet {
        /// Operation being executed
        op: OperationId,
        /// Offending input
        avatar: AvatarId,
        /// What is wrong with it
        reason: String,
    },

    /// Planning request that cannot be turned into operations
    #[error("invalid plan: {0}")]
    InvalidPlan(String),

    /// Unknown goods type code
    #[error("unknown goods type code: {0}")]
    UnknownGoodsType(String),

    /// Unknown location code
    #[error("unknown location code: {0}")]
    UnknownLocation(String),

    /// Store failure
    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

impl DomainError {
    /// Whether the error is a transient store conflict
    pub fn is_transient(&self) -> bool {
        matches!(self, DomainError::Store(e) if e.is_transient())
    }
}

/// Result type for domain operations
pub type DomainResult<T> = Result<T, DomainError>;
