//! Stress tests for MapKV.
//!
//! These tests verify behavior under heavy load and concurrent access.
//! Every function takes an open [`Store`]; clones of it share one engine,
//! so the concurrent variants hand a clone to each thread.

use mapkv_core::Store;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

/// Result of a stress test run.
#[derive(Debug, Clone)]
pub struct StressTestResult {
    /// Total operations performed.
    pub total_ops: usize,
    /// Successful operations.
    pub successful_ops: usize,
    /// Failed operations.
    pub failed_ops: usize,
    /// Total duration.
    pub duration: Duration,
    /// Operations per second.
    pub ops_per_second: f64,
}

impl StressTestResult {
    /// Creates a new result.
    #[allow(clippy::cast_precision_loss)]
    pub fn new(successful: usize, failed: usize, duration: Duration) -> Self {
        let total = successful + failed;
        let ops_per_second = if duration.as_secs_f64() > 0.0 {
            total as f64 / duration.as_secs_f64()
        } else {
            0.0
        };

        Self {
            total_ops: total,
            successful_ops: successful,
            failed_ops: failed,
            duration,
            ops_per_second,
        }
    }

    /// Prints a summary of the test.
    pub fn print_summary(&self, name: &str) {
        println!("\n=== {} ===", name);
        println!("Total operations: {}", self.total_ops);
        println!("Successful: {}", self.successful_ops);
        println!("Failed: {}", self.failed_ops);
        println!("Duration: {:?}", self.duration);
        println!("Throughput: {:.2} ops/sec", self.ops_per_second);
    }
}

/// Configuration for stress tests.
#[derive(Debug, Clone)]
pub struct StressConfig {
    /// Number of operations to perform.
    pub operations: usize,
    /// Number of concurrent threads (for concurrent tests).
    pub threads: usize,
    /// Size of string values in bytes.
    pub value_size: usize,
    /// Number of distinct keys.
    pub key_count: usize,
}

impl Default for StressConfig {
    fn default() -> Self {
        Self {
            operations: 10_000,
            threads: 4,
            value_size: 256,
            key_count: 1_000,
        }
    }
}

fn key(i: usize, config: &StressConfig) -> String {
    format!("key-{}", i % config.key_count.max(1))
}

fn tally(result: mapkv_core::CoreResult<()>, successful: &mut usize, failed: &mut usize) {
    match result {
        Ok(()) => *successful += 1,
        Err(_) => *failed += 1,
    }
}

/// Writes every key once so that reads have something to find.
pub fn populate(store: &Store, config: &StressConfig) -> mapkv_core::CoreResult<()> {
    let value = "v".repeat(config.value_size);
    let mut batch = store.edit();
    for i in 0..config.key_count {
        batch = batch.put_string(&key(i, config), &value);
    }
    batch.commit()
}

/// Run a sequential write stress test.
///
/// Values alternate between two lengths, so half the writes append and
/// half are patched in place.
pub fn stress_sequential_writes(store: &Store, config: &StressConfig) -> StressTestResult {
    let short = "a".repeat(config.value_size);
    let long = "b".repeat(config.value_size + 1);

    let start = Instant::now();
    let mut successful = 0usize;
    let mut failed = 0usize;

    for i in 0..config.operations {
        let value = if (i / config.key_count.max(1)) % 2 == 0 { &short } else { &long };
        tally(store.put_string(&key(i, config), value), &mut successful, &mut failed);
    }

    StressTestResult::new(successful, failed, start.elapsed())
}

/// Run a sequential read stress test.
pub fn stress_sequential_reads(store: &Store, config: &StressConfig) -> StressTestResult {
    if populate(store, config).is_err() {
        return StressTestResult::new(0, config.operations, Duration::ZERO);
    }

    let start = Instant::now();
    let mut successful = 0usize;
    let mut failed = 0usize;

    for i in 0..config.operations {
        match store.get_string(&key(i, config)) {
            Some(v) if v.len() == config.value_size => successful += 1,
            _ => failed += 1,
        }
    }

    StressTestResult::new(successful, failed, start.elapsed())
}

/// Run a mixed read/write/remove stress test.
pub fn stress_mixed_operations(store: &Store, config: &StressConfig) -> StressTestResult {
    let value = "m".repeat(config.value_size);

    let start = Instant::now();
    let mut successful = 0usize;
    let mut failed = 0usize;

    for i in 0..config.operations {
        let key = key(i, config);
        let result = match i % 3 {
            0 => store.put_string(&key, &value),
            1 => {
                // A read never fails; a missing key is a valid answer
                let _ = store.get_string(&key);
                Ok(())
            }
            _ => store.remove(&key).map(|_| ()),
        };
        tally(result, &mut successful, &mut failed);
    }

    StressTestResult::new(successful, failed, start.elapsed())
}

/// Run a concurrent read stress test.
pub fn stress_concurrent_reads(store: &Store, config: &StressConfig) -> StressTestResult {
    if populate(store, config).is_err() {
        return StressTestResult::new(0, config.operations, Duration::ZERO);
    }

    let successful = Arc::new(AtomicUsize::new(0));
    let failed = Arc::new(AtomicUsize::new(0));
    let ops_per_thread = config.operations / config.threads.max(1);

    let start = Instant::now();

    let handles: Vec<_> = (0..config.threads)
        .map(|t| {
            let store = store.clone();
            let successful = Arc::clone(&successful);
            let failed = Arc::clone(&failed);
            let config = config.clone();

            thread::spawn(move || {
                for i in 0..ops_per_thread {
                    let key = key(t * ops_per_thread + i, &config);
                    if store.get_string(&key).map(|v| v.len()) == Some(config.value_size) {
                        successful.fetch_add(1, Ordering::Relaxed);
                    } else {
                        failed.fetch_add(1, Ordering::Relaxed);
                    }
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().expect("Thread panicked");
    }

    StressTestResult::new(
        successful.load(Ordering::Relaxed),
        failed.load(Ordering::Relaxed),
        start.elapsed(),
    )
}

/// Run a concurrent write stress test.
///
/// Each thread owns a disjoint key range; afterwards every thread's last
/// value must be readable.
pub fn stress_concurrent_writes(store: &Store, config: &StressConfig) -> StressTestResult {
    let ops_per_thread = config.operations / config.threads.max(1);
    let successful = Arc::new(AtomicUsize::new(0));
    let failed = Arc::new(AtomicUsize::new(0));

    let start = Instant::now();

    let handles: Vec<_> = (0..config.threads)
        .map(|t| {
            let store = store.clone();
            let successful = Arc::clone(&successful);
            let failed = Arc::clone(&failed);

            thread::spawn(move || {
                for i in 0..ops_per_thread {
                    let key = format!("t{t}-{}", i % 50);
                    let value = i32::try_from(i).unwrap_or(i32::MAX);
                    match store.put_int(&key, value) {
                        Ok(()) => successful.fetch_add(1, Ordering::Relaxed),
                        Err(_) => failed.fetch_add(1, Ordering::Relaxed),
                    };
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().expect("Thread panicked");
    }
    let duration = start.elapsed();

    let mut failed = failed.load(Ordering::Relaxed);
    for t in 0..config.threads {
        for slot in 0..ops_per_thread.min(50) {
            let last = (slot..ops_per_thread).step_by(50).last().unwrap_or(slot);
            let expected = i32::try_from(last).unwrap_or(i32::MAX);
            if store.get_int(&format!("t{t}-{slot}"), -1) != expected {
                failed += 1;
            }
        }
    }

    StressTestResult::new(successful.load(Ordering::Relaxed), failed, duration)
}

/// Run readers against a writer that keeps compacting.
///
/// Readers check a set of keys the writer never touches; any miss while a
/// compaction swaps the mapping is a failure.
pub fn stress_reads_during_compaction(store: &Store, config: &StressConfig) -> StressTestResult {
    let stable = config.key_count.clamp(1, 100);
    let mut batch = store.edit();
    for i in 0..stable {
        batch = batch.put_long(&format!("stable-{i}"), i as i64);
    }
    if batch.commit().is_err() {
        return StressTestResult::new(0, config.operations, Duration::ZERO);
    }

    let done = Arc::new(AtomicBool::new(false));
    let successful = Arc::new(AtomicUsize::new(0));
    let failed = Arc::new(AtomicUsize::new(0));

    let start = Instant::now();

    let readers: Vec<_> = (0..config.threads.max(1))
        .map(|t| {
            let store = store.clone();
            let done = Arc::clone(&done);
            let successful = Arc::clone(&successful);
            let failed = Arc::clone(&failed);

            thread::spawn(move || {
                let mut i = t;
                while !done.load(Ordering::Acquire) {
                    let slot = i % stable;
                    if store.get_long(&format!("stable-{slot}"), -1) == slot as i64 {
                        successful.fetch_add(1, Ordering::Relaxed);
                    } else {
                        failed.fetch_add(1, Ordering::Relaxed);
                    }
                    i += 1;
                }
            })
        })
        .collect();

    let churn = "c".repeat(config.value_size);
    for i in 0..config.operations {
        let written = store.put_string(&format!("churn-{}", i % 10), &churn[..i % churn.len().max(1)]);
        let compacted = if i % 100 == 99 {
            store.force_compact().map(|_| ())
        } else {
            Ok(())
        };
        if written.and(compacted).is_err() {
            failed.fetch_add(1, Ordering::Relaxed);
        }
    }
    done.store(true, Ordering::Release);

    for handle in readers {
        handle.join().expect("Thread panicked");
    }

    StressTestResult::new(
        successful.load(Ordering::Relaxed),
        failed.load(Ordering::Relaxed),
        start.elapsed(),
    )
}

/// Run a batched write stress test.
pub fn stress_large_batches(store: &Store, config: &StressConfig) -> StressTestResult {
    let value = "x".repeat(config.value_size);
    let batch_size = 100;

    let start = Instant::now();
    let mut successful = 0usize;
    let mut failed = 0usize;

    for batch in 0..(config.operations / batch_size) {
        let mut editor = store.edit();
        for i in 0..batch_size {
            editor = editor.put_string(&key(batch * batch_size + i, config), &value);
        }
        match editor.commit() {
            Ok(()) => successful += batch_size,
            Err(_) => failed += batch_size,
        }
    }

    StressTestResult::new(successful, failed, start.elapsed())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::TestStore;

    #[test]
    fn test_sequential_writes() {
        let fixture = TestStore::new();
        let config = StressConfig {
            operations: 1_000,
            key_count: 100,
            value_size: 64,
            ..Default::default()
        };

        let result = stress_sequential_writes(&fixture, &config);
        assert_eq!(result.failed_ops, 0);
        assert_eq!(result.successful_ops, 1_000);
        assert_eq!(fixture.len(), 100);
    }

    #[test]
    fn test_sequential_reads() {
        let fixture = TestStore::new();
        let config = StressConfig {
            operations: 1_000,
            key_count: 100,
            value_size: 64,
            ..Default::default()
        };

        let result = stress_sequential_reads(&fixture, &config);
        assert_eq!(result.failed_ops, 0);
    }

    #[test]
    fn test_mixed_operations() {
        let fixture = TestStore::new();
        let config = StressConfig {
            operations: 1_000,
            key_count: 100,
            value_size: 64,
            ..Default::default()
        };

        let result = stress_mixed_operations(&fixture, &config);
        assert_eq!(result.failed_ops, 0);
    }

    #[test]
    fn test_concurrent_reads() {
        let fixture = TestStore::new();
        let config = StressConfig {
            operations: 1_000,
            threads: 4,
            key_count: 100,
            value_size: 64,
        };

        let result = stress_concurrent_reads(&fixture, &config);
        assert_eq!(result.failed_ops, 0);
        assert_eq!(result.successful_ops, 1_000);
    }

    #[test]
    fn test_concurrent_writes() {
        let fixture = TestStore::new();
        let config = StressConfig {
            operations: 2_000,
            threads: 4,
            ..Default::default()
        };

        let result = stress_concurrent_writes(&fixture, &config);
        assert_eq!(result.failed_ops, 0);
        assert_eq!(fixture.len(), 200);
    }

    #[test]
    fn test_reads_during_compaction() {
        let fixture = TestStore::new();
        let config = StressConfig {
            operations: 500,
            threads: 2,
            key_count: 50,
            value_size: 32,
        };

        let result = stress_reads_during_compaction(&fixture, &config);
        assert_eq!(result.failed_ops, 0);
        assert!(fixture.stats().compactions >= 5);
    }

    #[test]
    fn test_large_batches() {
        let fixture = TestStore::new();
        let config = StressConfig {
            operations: 1_000,
            value_size: 64,
            ..Default::default()
        };

        let result = stress_large_batches(&fixture, &config);
        assert_eq!(result.failed_ops, 0);
        assert_eq!(fixture.len(), 1_000);
    }
}
