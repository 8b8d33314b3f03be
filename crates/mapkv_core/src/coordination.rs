//! Coordination between processes sharing one store file.
//!
//! A store is opened in one of two modes, and every opener of a file must
//! use the same one:
//!
//! - **single-process** (default): the opener holds an exclusive lock on
//!   `<name>.kv.lock` for its whole lifetime. A second opener fails with
//!   [`CoreError::StoreLocked`].
//! - **multi-process**: each mutation takes the exclusive lock and first
//!   catches up with whatever other processes wrote; reads take the shared
//!   lock when the header shows a change.
//!
//! In-process locks are always taken before the file lock.

use crate::error::{CoreError, CoreResult};
use crate::layout::StorePaths;
use mapkv_storage::{FileLock, LockGuard, StorageError};
use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::thread;
use std::time::Duration;
use tracing::debug;

/// The file lock of one store handle.
#[derive(Debug)]
pub(crate) enum ProcessLock {
    /// Held exclusively until the store is closed.
    Held(FileLock),
    /// Taken around each operation.
    Coordinated(FileLock),
}

impl ProcessLock {
    /// Opens the lock file and, in single-process mode, takes the lock.
    pub(crate) fn acquire(paths: &StorePaths, multi_process: bool) -> CoreResult<Self> {
        let lock = FileLock::open(&paths.lock())?;
        if multi_process {
            return Ok(Self::Coordinated(lock));
        }
        lock.try_hold_exclusive().map_err(|e| match e {
            StorageError::Locked => CoreError::StoreLocked,
            other => other.into(),
        })?;
        Ok(Self::Held(lock))
    }

    pub(crate) fn is_multi_process(&self) -> bool {
        matches!(self, Self::Coordinated(_))
    }

    /// Exclusive guard for a mutation; `None` when the lock is already held.
    pub(crate) fn write_guard(&self) -> CoreResult<Option<LockGuard<'_>>> {
        match self {
            Self::Held(_) => Ok(None),
            Self::Coordinated(lock) => Ok(Some(lock.exclusive()?)),
        }
    }

    /// Shared guard for catching up on reads.
    pub(crate) fn read_guard(&self) -> CoreResult<Option<LockGuard<'_>>> {
        match self {
            Self::Held(_) => Ok(None),
            Self::Coordinated(lock) => Ok(Some(lock.shared()?)),
        }
    }
}

/// Callback run by a watcher. Returns `false` once the store is gone.
pub type PollFn = Box<dyn Fn() -> bool + Send + Sync>;

/// Drives background detection of changes made by other processes.
///
/// The store hands the watcher a poll function when it opens in
/// multi-process mode; each call catches up with the file and notifies
/// listeners of changed keys.
pub trait ChangeWatcher: Send {
    /// Starts calling `poll` until it returns `false` or [`stop`](Self::stop)
    /// is called.
    ///
    /// # Errors
    ///
    /// Returns an error if the watcher cannot start.
    fn start(&mut self, poll: PollFn) -> CoreResult<()>;

    /// Stops polling.
    fn stop(&mut self);
}

/// A [`ChangeWatcher`] polling on a background thread at a fixed interval.
#[derive(Debug)]
pub struct PollingWatcher {
    interval: Duration,
    stop: Option<Sender<()>>,
}

impl PollingWatcher {
    /// Creates a watcher polling every `interval`.
    #[must_use]
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            stop: None,
        }
    }

    /// Polling interval.
    #[must_use]
    pub fn interval(&self) -> Duration {
        self.interval
    }
}

impl ChangeWatcher for PollingWatcher {
    fn start(&mut self, poll: PollFn) -> CoreResult<()> {
        self.stop();
        let (tx, rx) = mpsc::channel::<()>();
        let interval = self.interval;
        thread::Builder::new()
            .name("mapkv-watch".to_string())
            .spawn(move || loop {
                match rx.recv_timeout(interval) {
                    Err(RecvTimeoutError::Timeout) => {
                        if !poll() {
                            break;
                        }
                    }
                    _ => break,
                }
            })?;
        self.stop = Some(tx);
        Ok(())
    }

    fn stop(&mut self) {
        if self.stop.take().is_some() {
            debug!("stopped change watcher");
        }
    }
}

impl Drop for PollingWatcher {
    fn drop(&mut self) {
        self.stop();
    }
}
