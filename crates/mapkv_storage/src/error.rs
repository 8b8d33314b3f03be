//! Error types for storage operations.

use std::io;
use thiserror::Error;

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Errors that can occur during storage operations.
#[derive(Debug, Error)]
pub enum StorageError {
    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Attempted to access bytes outside the mapped region.
    #[error("access out of bounds: offset {offset}, len {len}, size {size}")]
    OutOfBounds {
        /// The requested offset.
        offset: usize,
        /// The requested length.
        len: usize,
        /// The current region size.
        size: usize,
    },

    /// The region cannot be resized to the requested length.
    #[error("region size {requested} exceeds limit {limit}")]
    TooLarge {
        /// The requested size.
        requested: usize,
        /// The maximum allowed size.
        limit: usize,
    },

    /// A non-blocking lock attempt found the lock held elsewhere.
    #[error("file is locked by another handle")]
    Locked,
}
