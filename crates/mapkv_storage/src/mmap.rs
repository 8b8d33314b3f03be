//! File-backed region mapped with `memmap2`.

use crate::error::StorageResult;
use crate::region::{check_resize, check_write, MappedRegion};
use memmap2::MmapMut;
use std::fs::{File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};

/// A file mapped read-write into memory.
///
/// Reads are zero-copy slices of the mapping and writes land directly in
/// the page cache, where every other process mapping the same file sees
/// them immediately.
///
/// # Durability
///
/// - `flush()` calls `msync` and waits for completion
/// - `flush_async()` schedules the write-back and returns
///
/// # Example
///
/// ```no_run
/// use mapkv_storage::{MappedRegion, MmapRegion};
/// use std::path::Path;
///
/// let mut region = MmapRegion::open(Path::new("data.kv"), 4096).unwrap();
/// region.write_at(0, b"persistent").unwrap();
/// region.flush().unwrap();
/// ```
#[derive(Debug)]
pub struct MmapRegion {
    path: PathBuf,
    file: File,
    map: MmapMut,
}

impl MmapRegion {
    /// Opens or creates the file at `path` and maps it.
    ///
    /// A file shorter than `min_len` is extended with zeros first. An
    /// existing longer file is mapped at its full length.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened, extended or mapped.
    pub fn open(path: &Path, min_len: usize) -> StorageResult<Self> {
        check_resize(min_len)?;
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)?;

        let len = file.metadata()?.len();
        if len < min_len as u64 {
            file.set_len(min_len as u64)?;
        }
        let map = map_file(&file)?;

        Ok(Self {
            path: path.to_path_buf(),
            file,
            map,
        })
    }

    /// Opens the file, creating parent directories if needed.
    ///
    /// # Errors
    ///
    /// Returns an error if directories cannot be created or the file cannot be mapped.
    pub fn open_with_create_dirs(path: &Path, min_len: usize) -> StorageResult<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        Self::open(path, min_len)
    }

    /// Returns the path of the mapped file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn remap(&mut self) -> StorageResult<()> {
        self.map = map_file(&self.file)?;
        Ok(())
    }
}

/// Maps `file` read-write.
#[allow(unsafe_code)]
fn map_file(file: &File) -> io::Result<MmapMut> {
    // SAFETY: the engine only shrinks a file while holding the store's write
    // lock in single-process mode, where no other mapping of it exists, and
    // every shrink is immediately followed by a remap. Concurrent writers in
    // other processes are serialised by the store's file lock and only ever
    // grow the file.
    unsafe { MmapMut::map_mut(file) }
}

impl MappedRegion for MmapRegion {
    fn len(&self) -> usize {
        self.map.len()
    }

    fn as_slice(&self) -> &[u8] {
        &self.map
    }

    fn write_at(&mut self, offset: usize, data: &[u8]) -> StorageResult<()> {
        let end = check_write(offset, data.len(), self.map.len())?;
        self.map[offset..end].copy_from_slice(data);
        Ok(())
    }

    fn resize(&mut self, new_len: usize) -> StorageResult<()> {
        check_resize(new_len)?;
        if new_len == self.map.len() {
            return Ok(());
        }
        self.map.flush()?;
        self.file.set_len(new_len as u64)?;
        self.remap()
    }

    fn reload(&mut self) -> StorageResult<bool> {
        let on_disk = self.file.metadata()?.len() as usize;
        if on_disk == self.map.len() || on_disk == 0 {
            return Ok(false);
        }
        check_resize(on_disk)?;
        self.remap()?;
        Ok(true)
    }

    fn flush(&self) -> StorageResult<()> {
        self.map.flush()?;
        Ok(())
    }

    fn flush_async(&self) -> StorageResult<()> {
        self.map.flush_async()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::StorageError;
    use tempfile::tempdir;

    #[test]
    fn mmap_create_new() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.kv");

        let region = MmapRegion::open(&path, 4096).unwrap();
        assert_eq!(region.len(), 4096);
        assert!(region.as_slice().iter().all(|b| *b == 0));
        assert_eq!(std::fs::metadata(&path).unwrap().len(), 4096);
    }

    #[test]
    fn mmap_write_and_read() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.kv");

        let mut region = MmapRegion::open(&path, 4096).unwrap();
        region.write_at(100, b"hello world").unwrap();

        assert_eq!(region.read_at(100, 11).unwrap(), b"hello world");
        assert_eq!(region.read_at(106, 5).unwrap(), b"world");
    }

    #[test]
    fn mmap_write_past_end_fails() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.kv");

        let mut region = MmapRegion::open(&path, 4096).unwrap();
        let result = region.write_at(4090, b"too long");
        assert!(matches!(result, Err(StorageError::OutOfBounds { .. })));
    }

    #[test]
    fn mmap_persistence() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.kv");

        {
            let mut region = MmapRegion::open(&path, 4096).unwrap();
            region.write_at(0, b"persistent data").unwrap();
            region.flush().unwrap();
        }

        let region = MmapRegion::open(&path, 4096).unwrap();
        assert_eq!(region.read_at(0, 15).unwrap(), b"persistent data");
    }

    #[test]
    fn mmap_grow_preserves_bytes() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.kv");

        let mut region = MmapRegion::open(&path, 4096).unwrap();
        region.write_at(4000, b"tail").unwrap();
        region.resize(8192).unwrap();

        assert_eq!(region.len(), 8192);
        assert_eq!(region.read_at(4000, 4).unwrap(), b"tail");
        assert!(region.read_at(4096, 4096).unwrap().iter().all(|b| *b == 0));
    }

    #[test]
    fn mmap_shrink() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.kv");

        let mut region = MmapRegion::open(&path, 16384).unwrap();
        region.write_at(0, b"head").unwrap();
        region.resize(4096).unwrap();

        assert_eq!(region.len(), 4096);
        assert_eq!(region.read_at(0, 4).unwrap(), b"head");
        assert_eq!(std::fs::metadata(&path).unwrap().len(), 4096);
    }

    #[test]
    fn mmap_reload_sees_growth_from_other_handle() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.kv");

        let mut a = MmapRegion::open(&path, 4096).unwrap();
        let mut b = MmapRegion::open(&path, 4096).unwrap();

        b.resize(8192).unwrap();
        b.write_at(5000, b"from b").unwrap();

        assert!(a.reload().unwrap());
        assert_eq!(a.len(), 8192);
        assert_eq!(a.read_at(5000, 6).unwrap(), b"from b");
        assert!(!a.reload().unwrap());
    }

    #[test]
    fn mmap_open_keeps_longer_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.kv");

        {
            let mut region = MmapRegion::open(&path, 4096).unwrap();
            region.resize(16384).unwrap();
        }

        let region = MmapRegion::open(&path, 4096).unwrap();
        assert_eq!(region.len(), 16384);
    }

    #[test]
    fn mmap_create_with_dirs() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("path").join("test.kv");

        let region = MmapRegion::open_with_create_dirs(&path, 4096).unwrap();
        assert_eq!(region.len(), 4096);
        assert_eq!(region.path(), path);
    }

    #[test]
    fn mmap_resize_over_limit_fails() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.kv");

        let mut region = MmapRegion::open(&path, 4096).unwrap();
        let result = region.resize(crate::MAX_REGION_SIZE + 1);
        assert!(matches!(result, Err(StorageError::TooLarge { .. })));
        assert_eq!(region.len(), 4096);
    }

    #[test]
    fn mmap_flush_variants() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.kv");

        let mut region = MmapRegion::open(&path, 4096).unwrap();
        region.write_at(0, b"data").unwrap();

        assert!(region.flush().is_ok());
        assert!(region.flush_async().is_ok());
    }
}
