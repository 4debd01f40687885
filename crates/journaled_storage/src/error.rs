//! Errors raised by byte stores and journal providers.

use std::io;
use thiserror::Error;

/// Result type for byte store and provider calls.
pub type StorageResult<T> = Result<T, StorageError>;

/// A failure of an origin or journal store.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Underlying I/O failure.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// An exact read ran past the end of the store.
    #[error("short read: wanted {len} bytes at {offset}, store holds {size}")]
    ReadPastEnd {
        /// Offset of the read.
        offset: u64,
        /// Bytes wanted.
        len: usize,
        /// Store size at the time of the read.
        size: u64,
    },

    /// A named store could not be opened.
    #[error("journal store not found: {id:?}")]
    NotFound {
        /// Identifier of the missing store.
        id: String,
    },
}
