//! Advisory file locks shared between processes.

use crate::error::{StorageError, StorageResult};
use fs2::FileExt;
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};

/// An advisory lock on a dedicated lock file.
///
/// Locks are taken through the OS (`flock` on Unix, `LockFileEx` on
/// Windows) and are released automatically if the process dies. Every
/// `FileLock` owns its own file handle, so two `FileLock`s on the same path
/// exclude each other even within one process.
///
/// There are two ways to hold the lock:
/// - [`exclusive`](Self::exclusive) / [`shared`](Self::shared) return a
///   [`LockGuard`] that releases the lock when dropped
/// - [`try_hold_exclusive`](Self::try_hold_exclusive) keeps the lock until
///   the `FileLock` itself is dropped
#[derive(Debug)]
pub struct FileLock {
    path: PathBuf,
    file: File,
    held: AtomicBool,
}

impl FileLock {
    /// Opens or creates the lock file at `path`.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be created.
    pub fn open(path: &Path) -> StorageResult<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)?;
        Ok(Self {
            path: path.to_path_buf(),
            file,
            held: AtomicBool::new(false),
        })
    }

    /// Returns the path of the lock file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Blocks until the exclusive lock is acquired.
    ///
    /// # Errors
    ///
    /// Returns an error if the OS lock call fails.
    pub fn exclusive(&self) -> StorageResult<LockGuard<'_>> {
        FileExt::lock_exclusive(&self.file)?;
        Ok(LockGuard { lock: self })
    }

    /// Blocks until a shared lock is acquired.
    ///
    /// # Errors
    ///
    /// Returns an error if the OS lock call fails.
    pub fn shared(&self) -> StorageResult<LockGuard<'_>> {
        FileExt::lock_shared(&self.file)?;
        Ok(LockGuard { lock: self })
    }

    /// Attempts the exclusive lock without blocking.
    ///
    /// Returns `Ok(None)` if another handle holds the lock.
    ///
    /// # Errors
    ///
    /// Returns an error for failures other than contention.
    pub fn try_exclusive(&self) -> StorageResult<Option<LockGuard<'_>>> {
        match FileExt::try_lock_exclusive(&self.file) {
            Ok(()) => Ok(Some(LockGuard { lock: self })),
            Err(e) if is_contended(&e) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Takes the exclusive lock without blocking and keeps it until drop.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Locked`] if another handle holds the lock.
    pub fn try_hold_exclusive(&self) -> StorageResult<()> {
        if self.held.load(Ordering::Acquire) {
            return Ok(());
        }
        match FileExt::try_lock_exclusive(&self.file) {
            Ok(()) => {
                self.held.store(true, Ordering::Release);
                Ok(())
            }
            Err(e) if is_contended(&e) => Err(StorageError::Locked),
            Err(e) => Err(e.into()),
        }
    }

    /// Returns `true` if this handle holds the lock for its whole lifetime.
    #[must_use]
    pub fn is_held(&self) -> bool {
        self.held.load(Ordering::Acquire)
    }

    fn release(&self) {
        let _ = FileExt::unlock(&self.file);
    }
}

impl Drop for FileLock {
    fn drop(&mut self) {
        if self.held.swap(false, Ordering::AcqRel) {
            self.release();
        }
    }
}

fn is_contended(e: &std::io::Error) -> bool {
    e.kind() == fs2::lock_contended_error().kind()
}

/// Releases a [`FileLock`] when dropped.
#[derive(Debug)]
#[must_use = "the lock is released as soon as the guard is dropped"]
pub struct LockGuard<'a> {
    lock: &'a FileLock,
}

impl Drop for LockGuard<'_> {
    fn drop(&mut self) {
        self.lock.release();
    }
}
