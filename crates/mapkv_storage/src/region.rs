//! Mapped region trait definition.

use crate::error::{StorageError, StorageResult};

/// Maximum size of a single region (256 MiB).
pub const MAX_REGION_SIZE: usize = 1 << 28;

/// A contiguous, randomly writable byte region backing one store.
///
/// Regions are **opaque byte buffers**. The engine owns every byte of
/// interpretation; a region only guarantees that bytes written with
/// [`write_at`](Self::write_at) are returned by [`as_slice`](Self::as_slice)
/// and that [`flush`](Self::flush) makes them durable.
///
/// # Invariants
///
/// - `len()` is the size of the region, not the amount of meaningful data
/// - `resize` preserves every byte below `min(old_len, new_len)`
/// - bytes exposed by growth are zero
/// - Regions must be `Send + Sync`; callers provide the locking
///
/// # Implementors
///
/// - [`super::MmapRegion`] - For persistent stores
/// - [`super::InMemoryRegion`] - For testing
pub trait MappedRegion: Send + Sync {
    /// Returns the size of the region in bytes.
    fn len(&self) -> usize;

    /// Returns `true` if the region has zero length.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns the whole region.
    fn as_slice(&self) -> &[u8];

    /// Returns `len` bytes starting at `offset`.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::OutOfBounds`] if the range exceeds the region.
    fn read_at(&self, offset: usize, len: usize) -> StorageResult<&[u8]> {
        let size = self.len();
        match offset.checked_add(len) {
            Some(end) if end <= size => Ok(&self.as_slice()[offset..end]),
            _ => Err(StorageError::OutOfBounds { offset, len, size }),
        }
    }

    /// Overwrites bytes starting at `offset`.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::OutOfBounds`] if the write would not fit.
    fn write_at(&mut self, offset: usize, data: &[u8]) -> StorageResult<()>;

    /// Changes the size of the region.
    ///
    /// # Errors
    ///
    /// Returns an error if `new_len` exceeds [`MAX_REGION_SIZE`] or the
    /// underlying file cannot be resized and remapped.
    fn resize(&mut self, new_len: usize) -> StorageResult<()>;

    /// Picks up a size change made to the backing file by another handle.
    ///
    /// Returns `true` if the region was remapped.
    ///
    /// # Errors
    ///
    /// Returns an error if the file metadata cannot be read or the remap fails.
    fn reload(&mut self) -> StorageResult<bool>;

    /// Synchronously writes all modified bytes to durable storage.
    ///
    /// # Errors
    ///
    /// Returns an error if the flush fails.
    fn flush(&self) -> StorageResult<()>;

    /// Schedules modified bytes to be written without waiting.
    ///
    /// # Errors
    ///
    /// Returns an error if the flush cannot be scheduled.
    fn flush_async(&self) -> StorageResult<()>;
}

pub(crate) fn check_resize(new_len: usize) -> StorageResult<()> {
    if new_len > MAX_REGION_SIZE {
        return Err(StorageError::TooLarge {
            requested: new_len,
            limit: MAX_REGION_SIZE,
        });
    }
    Ok(())
}

pub(crate) fn check_write(offset: usize, len: usize, size: usize) -> StorageResult<usize> {
    match offset.checked_add(len) {
        Some(end) if end <= size => Ok(end),
        _ => Err(StorageError::OutOfBounds { offset, len, size }),
    }
}
