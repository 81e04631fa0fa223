//! Error types for table configuration and growth.

use core::fmt;

/// Error returned by table construction and [`reserve`](crate::Hash::reserve).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TableError {
    /// The table's bucket count was fixed at construction and cannot grow.
    StaticTable {
        /// Bucket count the table was built with.
        buckets: usize,
    },
    /// A bucket count of zero was requested.
    ZeroBuckets,
    /// The requested element count needs more buckets than `usize` can index.
    CapacityOverflow {
        /// Element count that was requested.
        requested: usize,
    },
}

impl fmt::Display for TableError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TableError::StaticTable { buckets } => {
                write!(f, "cannot reserve on a static table ({buckets} buckets)")
            }
            TableError::ZeroBuckets => write!(f, "bucket count cannot be zero"),
            TableError::CapacityOverflow { requested } => {
                write!(f, "bucket count for {requested} elements overflows usize")
            }
        }
    }
}

impl std::error::Error for TableError {}
