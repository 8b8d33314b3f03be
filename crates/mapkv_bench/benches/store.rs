//! Store operation benchmarks.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use mapkv_bench::{generate_keys, open_store, populated_store, random_string};
use mapkv_core::{Builder, CommitMode};
use std::sync::atomic::{AtomicUsize, Ordering};

/// Benchmark overwrites that keep the value length, patched in place.
fn bench_in_place_update(c: &mut Criterion) {
    let mut group = c.benchmark_group("in_place_update");

    for mode in [CommitMode::Async, CommitMode::Sync] {
        group.bench_function(format!("{mode:?}"), |b| {
            let (_dir, store) = open_store(mode);
            store.put_int("counter", 0).unwrap();
            let mut i = 0;
            b.iter(|| {
                i += 1;
                store.put_int("counter", black_box(i)).unwrap();
            });
        });
    }
    group.finish();
}

/// Benchmark appends of new keys.
fn bench_append(c: &mut Criterion) {
    let mut group = c.benchmark_group("append");

    for size in [16, 256, 4096].iter() {
        group.throughput(Throughput::Bytes(*size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, &size| {
            let (_dir, store) = open_store(CommitMode::Async);
            let value = random_string(size);
            let mut i = 0u64;
            b.iter(|| {
                i += 1;
                store.put_string(&format!("k{i}"), black_box(&value)).unwrap();
            });
        });
    }
    group.finish();
}

/// Benchmark batched writes through the editor.
fn bench_batch_write(c: &mut Criterion) {
    let mut group = c.benchmark_group("batch_write");

    for batch_size in [10, 100, 1000].iter() {
        group.throughput(Throughput::Elements(*batch_size as u64));
        group.bench_with_input(
            BenchmarkId::from_parameter(batch_size),
            batch_size,
            |b, &batch_size| {
                let (_dir, store) = open_store(CommitMode::Sync);
                let keys = generate_keys(batch_size);
                let mut round = 0i64;

                b.iter(|| {
                    round += 1;
                    let mut batch = store.edit();
                    for key in &keys {
                        batch = batch.put_long(key, round);
                    }
                    batch.commit().unwrap();
                });
            },
        );
    }
    group.finish();
}

/// Benchmark typed reads.
fn bench_get(c: &mut Criterion) {
    let mut group = c.benchmark_group("get");

    for count in [100, 10_000].iter() {
        group.bench_with_input(BenchmarkId::new("string", count), count, |b, &count| {
            let (_dir, store) = populated_store(count, 64);
            let keys = generate_keys(count);
            let mut idx = 0;
            b.iter(|| {
                let result = store.get_string(black_box(&keys[(idx * 7) % count]));
                idx += 1;
                black_box(result);
            });
        });
    }

    group.bench_function("missing", |b| {
        let (_dir, store) = populated_store(100, 64);
        b.iter(|| black_box(store.get_int(black_box("absent"), -1)));
    });

    group.finish();
}

/// Benchmark forced compaction of a log that is mostly garbage.
fn bench_compaction(c: &mut Criterion) {
    let mut group = c.benchmark_group("compaction");
    group.sample_size(20);

    for count in [1_000, 10_000].iter() {
        group.bench_with_input(BenchmarkId::from_parameter(count), count, |b, &count| {
            b.iter_batched(
                || {
                    let (dir, store) = populated_store(count, 32);
                    let mut batch = store.edit();
                    for key in generate_keys(count).iter().step_by(10) {
                        batch = batch.put_string(key, "a longer replacement value");
                    }
                    batch.commit().unwrap();
                    (dir, store)
                },
                |(_dir, store)| black_box(store.force_compact().unwrap()),
                criterion::BatchSize::PerIteration,
            );
        });
    }
    group.finish();
}

/// Benchmark opening an existing store, which replays the whole log.
fn bench_open(c: &mut Criterion) {
    let mut group = c.benchmark_group("open");
    group.sample_size(20);

    for count in [1_000, 10_000].iter() {
        group.throughput(Throughput::Elements(*count as u64));
        group.bench_with_input(BenchmarkId::from_parameter(count), count, |b, &count| {
            let (dir, store) = populated_store(count, 64);
            store.close().unwrap();

            b.iter(|| {
                let store = Builder::new(dir.path(), "bench").blocking().build().unwrap();
                black_box(store.len());
                store.close().unwrap();
            });
        });
    }
    group.finish();
}

/// Benchmark a write with listeners attached.
fn bench_notify(c: &mut Criterion) {
    let mut group = c.benchmark_group("notify");

    group.bench_function("one_listener", |b| {
        let (_dir, store) = open_store(CommitMode::Async);
        let seen = std::sync::Arc::new(AtomicUsize::new(0));
        let counter = std::sync::Arc::clone(&seen);
        let listener: std::sync::Arc<dyn mapkv_core::ChangeListener> =
            std::sync::Arc::new(move |_: &mapkv_core::Store, _: Option<&str>| {
                counter.fetch_add(1, Ordering::Relaxed);
            });
        store.register_listener(listener);
        let mut i = 0;
        b.iter(|| {
            i += 1;
            store.put_int("watched", black_box(i)).unwrap();
        });
        black_box(seen.load(Ordering::Relaxed));
    });

    group.finish();
}

criterion_group!(
    benches,
    bench_in_place_update,
    bench_append,
    bench_batch_write,
    bench_get,
    bench_compaction,
    bench_open,
    bench_notify,
);

criterion_main!(benches);
