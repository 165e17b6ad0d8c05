//! Storage backend benchmarks for the log's access pattern.

use bitempo_bench::random_data;
use bitempo_storage::{FileBackend, InMemoryBackend, StorageBackend};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use tempfile::TempDir;

fn temp_file_backend() -> (TempDir, FileBackend) {
    let temp_dir = TempDir::new().unwrap();
    let backend = FileBackend::open_with_create_dirs(&temp_dir.path().join("bench.log")).unwrap();
    (temp_dir, backend)
}

/// Benchmark appends by record size, in memory and on disk.
fn bench_append(c: &mut Criterion) {
    let mut group = c.benchmark_group("append");

    for size in [64, 256, 1024, 4096].iter() {
        group.throughput(Throughput::Bytes(*size as u64));
        let data = random_data(*size);

        group.bench_with_input(BenchmarkId::new("inmemory", size), &data, |b, data| {
            let mut backend = InMemoryBackend::new();
            b.iter(|| black_box(backend.append(black_box(data)).unwrap()));
        });

        group.bench_with_input(BenchmarkId::new("file", size), &data, |b, data| {
            let (_temp_dir, mut backend) = temp_file_backend();
            b.iter(|| black_box(backend.append(black_box(data)).unwrap()));
        });
    }

    group.finish();
}

/// Benchmark a durable append: write, flush, then sync.
fn bench_durable_append(c: &mut Criterion) {
    let mut group = c.benchmark_group("durable_append");
    group.sample_size(20);

    let data = random_data(256);
    group.bench_function("file_flush", |b| {
        let (_temp_dir, mut backend) = temp_file_backend();
        b.iter(|| {
            backend.append(&data).unwrap();
            backend.flush().unwrap();
        });
    });
    group.bench_function("file_sync", |b| {
        let (_temp_dir, mut backend) = temp_file_backend();
        b.iter(|| {
            backend.append(&data).unwrap();
            backend.sync().unwrap();
        });
    });

    group.finish();
}

/// Benchmark reading records back by offset, as recovery and `open_tx_log` do.
fn bench_read_back(c: &mut Criterion) {
    let mut group = c.benchmark_group("read_back");
    let record_size = 256;
    let record_count = 1000;
    let data = random_data(record_size);

    group.bench_function("inmemory_1000_records", |b| {
        let mut backend = InMemoryBackend::new();
        let offsets: Vec<_> = (0..record_count)
            .map(|_| backend.append(&data).unwrap())
            .collect();

        let mut idx = 0;
        b.iter(|| {
            let offset = offsets[(idx * 7) % record_count];
            idx = (idx + 1) % record_count;
            black_box(backend.read_at(black_box(offset), record_size).unwrap())
        });
    });

    group.bench_function("file_1000_records", |b| {
        let (_temp_dir, mut backend) = temp_file_backend();
        let offsets: Vec<_> = (0..record_count)
            .map(|_| backend.append(&data).unwrap())
            .collect();
        backend.flush().unwrap();

        let mut idx = 0;
        b.iter(|| {
            let offset = offsets[(idx * 7) % record_count];
            idx = (idx + 1) % record_count;
            black_box(backend.read_at(black_box(offset), record_size).unwrap())
        });
    });

    group.finish();
}

/// Benchmark cutting a torn tail off a file.
fn bench_truncate_tail(c: &mut Criterion) {
    let mut group = c.benchmark_group("truncate_tail");
    group.sample_size(20);

    let data = random_data(1024);
    group.bench_function("file_1kb", |b| {
        let (_temp_dir, mut backend) = temp_file_backend();
        b.iter(|| {
            let offset = backend.append(&data).unwrap();
            backend.truncate(black_box(offset + 512)).unwrap();
            backend.truncate(offset).unwrap();
        });
    });

    group.finish();
}

criterion_group!(
    benches,
    bench_append,
    bench_durable_append,
    bench_read_back,
    bench_truncate_tail,
);

criterion_main!(benches);
