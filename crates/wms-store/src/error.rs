//! Store error types

use crate::locks::TxnId;
use crate::record::RowKey;
use thiserror::Error;

/// Store errors
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// A concurrent transaction committed a newer version of a row this
    /// transaction wants to lock or write, or holds its lock.
    #[error("serialization conflict on {0}")]
    SerializationConflict(RowKey),

    /// Row not visible in the transaction snapshot
    #[error("row {0} not found")]
    NotFound(RowKey),

    /// Transaction was already committed or rolled back
    #[error("transaction {0} is closed")]
    TransactionClosed(TxnId),
}

impl StoreError {
    /// Whether retrying the whole unit of work may succeed
    pub fn is_transient(&self) -> bool {
        matches!(self, StoreError::SerializationConflict(_))
    }
}

/// Result type for store operations
pub type StoreResult<T> = Result<T, StoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = StoreError::SerializationConflict(RowKey::new("operation", 7));
        assert!(err.to_string().contains("operation#7"));
        assert!(err.is_transient());

        let err = StoreError::NotFound(RowKey::new("avatar", 3));
        assert!(err.to_string().contains("not found"));
        assert!(!err.is_transient());

        let err = StoreError::TransactionClosed(TxnId::new(9));
        assert!(err.to_string().contains("closed"));
    }
}
