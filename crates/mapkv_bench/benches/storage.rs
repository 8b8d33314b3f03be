//! Mapped region benchmarks.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use mapkv_bench::random_data;
use mapkv_storage::{InMemoryRegion, MappedRegion, MmapRegion};
use tempfile::TempDir;

const REGION_SIZE: usize = 1 << 20;

/// Benchmark writes into a region.
fn bench_write(c: &mut Criterion) {
    let mut group = c.benchmark_group("region_write");

    for size in [64, 1024, 4096].iter() {
        group.throughput(Throughput::Bytes(*size as u64));
        let data = random_data(*size);

        group.bench_with_input(BenchmarkId::new("inmemory", size), size, |b, &size| {
            let mut region = InMemoryRegion::with_len(REGION_SIZE);
            let mut offset = 0;
            b.iter(|| {
                region.write_at(black_box(offset), black_box(&data)).unwrap();
                offset = (offset + size) % (REGION_SIZE - size);
            });
        });

        group.bench_with_input(BenchmarkId::new("mmap", size), size, |b, &size| {
            let temp_dir = TempDir::new().unwrap();
            let mut region = MmapRegion::open(&temp_dir.path().join("bench.kv"), REGION_SIZE).unwrap();
            let mut offset = 0;
            b.iter(|| {
                region.write_at(black_box(offset), black_box(&data)).unwrap();
                offset = (offset + size) % (REGION_SIZE - size);
            });
        });
    }

    group.finish();
}

/// Benchmark reads from a mapped region.
fn bench_read(c: &mut Criterion) {
    let mut group = c.benchmark_group("region_read");
    let temp_dir = TempDir::new().unwrap();
    let mut region = MmapRegion::open(&temp_dir.path().join("bench.kv"), REGION_SIZE).unwrap();
    region.write_at(0, &random_data(REGION_SIZE)).unwrap();

    for size in [64, 4096].iter() {
        group.throughput(Throughput::Bytes(*size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, &size| {
            let mut idx = 0;
            b.iter(|| {
                let offset = (idx * 7919) % (REGION_SIZE - size);
                idx += 1;
                black_box(region.read_at(black_box(offset), size).unwrap());
            });
        });
    }

    group.finish();
}

/// Benchmark flushing a dirty page.
fn bench_flush(c: &mut Criterion) {
    let mut group = c.benchmark_group("region_flush");
    group.sample_size(20); // Flush is slow

    let temp_dir = TempDir::new().unwrap();
    let mut region = MmapRegion::open(&temp_dir.path().join("bench.kv"), REGION_SIZE).unwrap();
    let data = random_data(1024);

    group.bench_function("sync_after_1kb_write", |b| {
        b.iter(|| {
            region.write_at(0, &data).unwrap();
            region.flush().unwrap();
        });
    });
    group.bench_function("async_after_1kb_write", |b| {
        b.iter(|| {
            region.write_at(0, &data).unwrap();
            region.flush_async().unwrap();
        });
    });

    group.finish();
}

/// Benchmark growing a mapped file.
fn bench_resize(c: &mut Criterion) {
    let mut group = c.benchmark_group("region_resize");
    group.sample_size(20);

    group.bench_function("double_to_1mb", |b| {
        b.iter_batched(
            || {
                let temp_dir = TempDir::new().unwrap();
                let region = MmapRegion::open(&temp_dir.path().join("bench.kv"), 4096).unwrap();
                (temp_dir, region)
            },
            |(_dir, mut region)| {
                let mut len = region.len();
                while len < REGION_SIZE {
                    len *= 2;
                    region.resize(len).unwrap();
                }
                black_box(region.len())
            },
            criterion::BatchSize::PerIteration,
        );
    });

    group.finish();
}

criterion_group!(benches, bench_write, bench_read, bench_flush, bench_resize);

criterion_main!(benches);
