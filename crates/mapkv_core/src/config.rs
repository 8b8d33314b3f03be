//! Store configuration.

use crate::types::PAGE_SIZE;
use std::time::Duration;

/// When writes are flushed to durable storage.
///
/// A mapped write is visible to every process mapping the file as soon as
/// it is made; these modes only decide when it survives power loss.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CommitMode {
    /// Every mutation waits for `msync` before returning.
    #[default]
    Sync,
    /// Every mutation schedules a write-back and returns immediately.
    Async,
    /// Nothing is flushed until [`Store::commit`](crate::Store::commit) or
    /// [`Store::apply`](crate::Store::apply) is called.
    Manual,
}

/// Configuration for opening a store.
#[derive(Debug, Clone)]
pub struct Config {
    /// Flush policy for mutations.
    pub commit_mode: CommitMode,

    /// Size of a newly created store file.
    pub initial_capacity: usize,

    /// Garbage share of the record stream that triggers compaction.
    pub gc_garbage_ratio: f64,

    /// Minimum garbage bytes before compaction is considered.
    pub gc_min_bytes: usize,

    /// Whether fixed-width values are encrypted when a cipher is set.
    pub encrypt_primitives: bool,

    /// Whether several processes may open the file at once.
    pub multi_process: bool,

    /// Polling interval of the default watcher in multi-process mode.
    ///
    /// `None` disables background polling; external changes are then only
    /// picked up by the check made before each read.
    pub watch_interval: Option<Duration>,

    /// Whether `build()` waits for the initial load.
    pub blocking: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            commit_mode: CommitMode::Sync,
            initial_capacity: PAGE_SIZE,
            gc_garbage_ratio: 0.5,
            gc_min_bytes: 8192,
            encrypt_primitives: false,
            multi_process: false,
            watch_interval: Some(Duration::from_millis(50)),
            blocking: false,
        }
    }
}

impl Config {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the flush policy.
    #[must_use]
    pub const fn commit_mode(mut self, mode: CommitMode) -> Self {
        self.commit_mode = mode;
        self
    }

    /// Sets the size of a newly created store file.
    #[must_use]
    pub const fn initial_capacity(mut self, bytes: usize) -> Self {
        self.initial_capacity = bytes;
        self
    }

    /// Sets the garbage ratio that triggers compaction.
    #[must_use]
    pub const fn gc_garbage_ratio(mut self, ratio: f64) -> Self {
        self.gc_garbage_ratio = ratio;
        self
    }

    /// Sets the minimum garbage before compaction is considered.
    #[must_use]
    pub const fn gc_min_bytes(mut self, bytes: usize) -> Self {
        self.gc_min_bytes = bytes;
        self
    }

    /// Sets whether fixed-width values are encrypted.
    #[must_use]
    pub const fn encrypt_primitives(mut self, value: bool) -> Self {
        self.encrypt_primitives = value;
        self
    }

    /// Sets multi-process mode.
    #[must_use]
    pub const fn multi_process(mut self, value: bool) -> Self {
        self.multi_process = value;
        self
    }

    /// Sets the background polling interval for multi-process mode.
    #[must_use]
    pub const fn watch_interval(mut self, interval: Option<Duration>) -> Self {
        self.watch_interval = interval;
        self
    }

    /// Sets whether `build()` waits for the initial load.
    #[must_use]
    pub const fn blocking(mut self, value: bool) -> Self {
        self.blocking = value;
        self
    }

    pub(crate) fn validate(&self) -> Result<(), String> {
        if self.initial_capacity < PAGE_SIZE {
            return Err(format!(
                "initial capacity {} is below one page ({PAGE_SIZE})",
                self.initial_capacity
            ));
        }
        if self.initial_capacity > crate::types::MAX_FILE_SIZE {
            return Err(format!(
                "initial capacity {} exceeds the file size limit",
                self.initial_capacity
            ));
        }
        if !(self.gc_garbage_ratio > 0.0 && self.gc_garbage_ratio <= 1.0) {
            return Err(format!(
                "gc garbage ratio {} must be in (0, 1]",
                self.gc_garbage_ratio
            ));
        }
        if matches!(self.watch_interval, Some(d) if d.is_zero()) {
            return Err("watch interval must be non-zero".to_string());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let config = Config::default();
        assert_eq!(config.commit_mode, CommitMode::Sync);
        assert_eq!(config.initial_capacity, PAGE_SIZE);
        assert!(!config.multi_process);
        assert!(!config.encrypt_primitives);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn builder_pattern() {
        let config = Config::new()
            .commit_mode(CommitMode::Manual)
            .multi_process(true)
            .gc_min_bytes(1024)
            .blocking(true);

        assert_eq!(config.commit_mode, CommitMode::Manual);
        assert!(config.multi_process);
        assert!(config.blocking);
        assert_eq!(config.gc_min_bytes, 1024);
    }

    #[test]
    fn rejects_tiny_capacity() {
        let config = Config::new().initial_capacity(100);
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_bad_ratio() {
        assert!(Config::new().gc_garbage_ratio(0.0).validate().is_err());
        assert!(Config::new().gc_garbage_ratio(1.5).validate().is_err());
        assert!(Config::new().gc_garbage_ratio(f64::NAN).validate().is_err());
        assert!(Config::new().gc_garbage_ratio(1.0).validate().is_ok());
    }

    #[test]
    fn rejects_zero_interval() {
        let config = Config::new().watch_interval(Some(Duration::ZERO));
        assert!(config.validate().is_err());
        assert!(Config::new().watch_interval(None).validate().is_ok());
    }
}
