//! Container error types.

use std::{error::Error, fmt};

/// Errors raised by container operations.
///
/// Every error is a terminal, synchronous signal to the immediate caller;
/// the container's prior state remains valid. Recovery, such as rebuilding
/// into a larger region, belongs to the owning system.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TableError {
    /// An insert found no free slot or physical entry left.
    CapacityExhausted {
        /// The container's fixed bucket count.
        capacity: u32,
    },
    /// A positional accessor was handed an index outside the live range.
    OutOfBounds {
        /// The requested index.
        index: u32,
        /// The number of live entries.
        len: u32,
    },
    /// A value-returning lookup did not find the requested key.
    KeyNotFound,
}

impl fmt::Display for TableError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            TableError::CapacityExhausted { capacity } => {
                write!(f, "fixed capacity of {capacity} entries exhausted")
            }
            TableError::OutOfBounds { index, len } => {
                write!(f, "index {index} is out of bounds for {len} entries")
            }
            TableError::KeyNotFound => {
                write!(f, "key not found")
            }
        }
    }
}

impl Error for TableError {}
