//! Store statistics.
//!
//! Counters are atomic and can be read while operations are in progress.
//!
//! ```rust,ignore
//! let stats = store.stats();
//! println!("appends: {} in-place: {}", stats.appends, stats.in_place_updates);
//! ```

use std::sync::atomic::{AtomicU64, Ordering};

/// Live counters of one store.
#[derive(Debug, Default)]
pub struct StoreStats {
    reads: AtomicU64,
    writes: AtomicU64,
    removes: AtomicU64,
    in_place_updates: AtomicU64,
    appends: AtomicU64,
    compactions: AtomicU64,
    grows: AtomicU64,
    bytes_written: AtomicU64,
    recovered_truncations: AtomicU64,
    soft_read_failures: AtomicU64,
    external_syncs: AtomicU64,
}

impl StoreStats {
    /// Creates zeroed counters.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record_read(&self) {
        self.reads.fetch_add(1, Ordering::Relaxed);
    }

    /// Records a put that rewrote an existing record.
    pub(crate) fn record_in_place(&self, bytes: u64) {
        self.writes.fetch_add(1, Ordering::Relaxed);
        self.in_place_updates.fetch_add(1, Ordering::Relaxed);
        self.bytes_written.fetch_add(bytes, Ordering::Relaxed);
    }

    /// Records a put that appended a new record.
    pub(crate) fn record_append(&self, bytes: u64) {
        self.writes.fetch_add(1, Ordering::Relaxed);
        self.appends.fetch_add(1, Ordering::Relaxed);
        self.bytes_written.fetch_add(bytes, Ordering::Relaxed);
    }

    /// Records a tombstone append.
    pub(crate) fn record_remove(&self, bytes: u64) {
        self.removes.fetch_add(1, Ordering::Relaxed);
        self.appends.fetch_add(1, Ordering::Relaxed);
        self.bytes_written.fetch_add(bytes, Ordering::Relaxed);
    }

    pub(crate) fn record_compaction(&self, bytes: u64) {
        self.compactions.fetch_add(1, Ordering::Relaxed);
        self.bytes_written.fetch_add(bytes, Ordering::Relaxed);
    }

    pub(crate) fn record_grow(&self) {
        self.grows.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_truncation(&self) {
        self.recovered_truncations.fetch_add(1, Ordering::Relaxed);
    }

    /// Records a read that fell back to the default value.
    pub(crate) fn record_soft_failure(&self) {
        self.soft_read_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_external_sync(&self) {
        self.external_syncs.fetch_add(1, Ordering::Relaxed);
    }

    /// Returns a snapshot of all counters.
    #[must_use]
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            reads: self.reads.load(Ordering::Relaxed),
            writes: self.writes.load(Ordering::Relaxed),
            removes: self.removes.load(Ordering::Relaxed),
            in_place_updates: self.in_place_updates.load(Ordering::Relaxed),
            appends: self.appends.load(Ordering::Relaxed),
            compactions: self.compactions.load(Ordering::Relaxed),
            grows: self.grows.load(Ordering::Relaxed),
            bytes_written: self.bytes_written.load(Ordering::Relaxed),
            recovered_truncations: self.recovered_truncations.load(Ordering::Relaxed),
            soft_read_failures: self.soft_read_failures.load(Ordering::Relaxed),
            external_syncs: self.external_syncs.load(Ordering::Relaxed),
        }
    }
}

/// A point-in-time copy of [`StoreStats`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StatsSnapshot {
    /// Getter calls.
    pub reads: u64,
    /// Successful puts.
    pub writes: u64,
    /// Successful removes of live keys.
    pub removes: u64,
    /// Puts that overwrote a record in place.
    pub in_place_updates: u64,
    /// Records appended, tombstones included.
    pub appends: u64,
    /// Compactions run, `clear` included.
    pub compactions: u64,
    /// Times the file was grown.
    pub grows: u64,
    /// Bytes written to the log.
    pub bytes_written: u64,
    /// Torn tails cut off while loading.
    pub recovered_truncations: u64,
    /// Reads that returned a default because a value was unreadable.
    pub soft_read_failures: u64,
    /// Times changes from another process were picked up.
    pub external_syncs: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_stats_are_zero() {
        assert_eq!(StoreStats::new().snapshot(), StatsSnapshot::default());
    }

    #[test]
    fn record_operations() {
        let stats = StoreStats::new();
        stats.record_read();
        stats.record_append(20);
        stats.record_in_place(4);
        stats.record_remove(12);
        stats.record_compaction(100);

        let snap = stats.snapshot();
        assert_eq!(snap.reads, 1);
        assert_eq!(snap.writes, 2);
        assert_eq!(snap.appends, 2);
        assert_eq!(snap.in_place_updates, 1);
        assert_eq!(snap.removes, 1);
        assert_eq!(snap.compactions, 1);
        assert_eq!(snap.bytes_written, 136);
    }

    #[test]
    fn concurrent_updates() {
        use std::sync::Arc;
        use std::thread;

        let stats = Arc::new(StoreStats::new());
        let handles: Vec<_> = (0..10)
            .map(|_| {
                let s = Arc::clone(&stats);
                thread::spawn(move || {
                    for _ in 0..100 {
                        s.record_read();
                        s.record_append(1);
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        let snap = stats.snapshot();
        assert_eq!(snap.reads, 1000);
        assert_eq!(snap.writes, 1000);
    }
}
