//! Typed records and row keys

use std::any::Any;
use std::fmt;
use std::hash::Hash;
use std::sync::Arc;

/// Name of a table
pub type TableName = &'static str;

/// Type-erased stored row value
pub(crate) type RowValue = Arc<dyn Any + Send + Sync>;

/// A record type stored in one table of the [`Store`](crate::Store).
///
/// Records are immutable values inside the store: readers get clones, writers
/// hand a whole new value to the transaction.
pub trait Record: Clone + fmt::Debug + Send + Sync + 'static {
    /// Table holding records of this type
    const TABLE: TableName;

    /// Strongly typed identifier
    type Id: Copy + Eq + Hash + fmt::Debug + From<u64> + Into<u64> + Send + Sync;

    /// Identifier of this record
    fn id(&self) -> Self::Id;
}

/// Address of one row: table and numeric id
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RowKey {
    /// Table name
    pub table: TableName,
    /// Row id within the table
    pub id: u64,
}

impl RowKey {
    /// Create a row key
    pub fn new(table: TableName, id: u64) -> Self {
        Self { table, id }
    }

    /// Row key of a typed record id
    pub fn of<R: Record>(id: R::Id) -> Self {
        Self {
            table: R::TABLE,
            id: id.into(),
        }
    }

    /// First possible key of a table, for range scans
    pub(crate) fn table_start(table: TableName) -> Self {
        Self { table, id: 0 }
    }

    /// Last possible key of a table, for range scans
    pub(crate) fn table_end(table: TableName) -> Self {
        Self { table, id: u64::MAX }
    }
}

impl fmt::Display for RowKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.table, self.id)
    }
}

/// Declare a `u64` newtype usable as a [`Record::Id`].
#[macro_export]
macro_rules! define_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(pub u64);

        impl $name {
            /// Create from a raw id
            pub fn new(id: u64) -> Self {
                Self(id)
            }

            /// Raw id value
            pub fn as_u64(&self) -> u64 {
                self.0
            }
        }

        impl From<u64> for $name {
            fn from(id: u64) -> Self {
                Self(id)
            }
        }

        impl From<$name> for u64 {
            fn from(id: $name) -> u64 {
                id.0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}
