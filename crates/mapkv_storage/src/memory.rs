//! In-memory region for testing.

use crate::error::StorageResult;
use crate::region::{check_resize, check_write, MappedRegion};

/// An in-memory region.
///
/// This region keeps all bytes in a `Vec<u8>` and is suitable for:
/// - Unit tests of record and index logic
/// - Ephemeral stores that don't need persistence
///
/// # Example
///
/// ```rust
/// use mapkv_storage::{InMemoryRegion, MappedRegion};
///
/// let mut region = InMemoryRegion::with_len(16);
/// region.write_at(0, b"test data").unwrap();
/// assert_eq!(region.len(), 16);
/// ```
#[derive(Debug, Default, Clone)]
pub struct InMemoryRegion {
    data: Vec<u8>,
}

impl InMemoryRegion {
    /// Creates a zero-filled region of `len` bytes.
    #[must_use]
    pub fn with_len(len: usize) -> Self {
        Self { data: vec![0; len] }
    }

    /// Creates a region holding pre-existing bytes.
    ///
    /// Useful for testing recovery scenarios.
    #[must_use]
    pub fn with_data(data: Vec<u8>) -> Self {
        Self { data }
    }

    /// Returns a copy of all bytes in the region.
    #[must_use]
    pub fn data(&self) -> Vec<u8> {
        self.data.clone()
    }
}

impl MappedRegion for InMemoryRegion {
    fn len(&self) -> usize {
        self.data.len()
    }

    fn as_slice(&self) -> &[u8] {
        &self.data
    }

    fn write_at(&mut self, offset: usize, bytes: &[u8]) -> StorageResult<()> {
        let end = check_write(offset, bytes.len(), self.data.len())?;
        self.data[offset..end].copy_from_slice(bytes);
        Ok(())
    }

    fn resize(&mut self, new_len: usize) -> StorageResult<()> {
        check_resize(new_len)?;
        self.data.resize(new_len, 0);
        Ok(())
    }

    fn reload(&mut self) -> StorageResult<bool> {
        // Nothing outside this handle can change the buffer
        Ok(false)
    }

    fn flush(&self) -> StorageResult<()> {
        Ok(())
    }

    fn flush_async(&self) -> StorageResult<()> {
        Ok(())
    }
}
