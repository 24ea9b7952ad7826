//! Performance benchmarks for gfxq
//!
//! Run with: cargo bench --package gfxq-core

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use gfxq_core::{
    BlobCache, BufferQueue, BufferRequestConfig, CacheConfig, FlushConfig, PixelFormat,
    QueueConfig, SyncFence,
};
use std::time::SystemTime;

fn unique_name() -> String {
    let ts = SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap()
        .as_nanos();
    format!("gfxq_bench_{}", ts)
}

fn bench_queue_create(c: &mut Criterion) {
    let cfg = BufferRequestConfig::new(64, 64, PixelFormat::Rgba8888);
    c.bench_function("queue_create", |b| {
        b.iter(|| {
            let queue =
                BufferQueue::new(&unique_name(), QueueConfig::new(3, cfg)).unwrap();
            black_box(queue);
        });
    });
}

fn bench_frame_cycle(c: &mut Criterion) {
    let mut group = c.benchmark_group("frame_cycle");
    group.sample_size(50);

    for dim in [64u32, 256, 1024].iter() {
        let bytes = (*dim as u64) * (*dim as u64) * 4;
        group.throughput(Throughput::Bytes(bytes));
        group.bench_with_input(BenchmarkId::from_parameter(dim), dim, |b, &dim| {
            let cfg = BufferRequestConfig::new(dim, dim, PixelFormat::Rgba8888);
            let queue = BufferQueue::new(&unique_name(), QueueConfig::new(3, cfg)).unwrap();
            // Warm the slots so the steady state has no reallocation.
            let r = queue.request_buffer(&cfg).unwrap();
            queue.cancel_buffer(r.buffer.seq_num()).unwrap();

            b.iter(|| {
                let r = queue.request_buffer(&cfg).unwrap();
                let seq = r.buffer.seq_num();
                queue
                    .flush_buffer(seq, FlushConfig::default(), SyncFence::signaled())
                    .unwrap();
                let acquired = queue.acquire_buffer().unwrap();
                queue
                    .release_buffer(acquired.buffer.seq_num(), SyncFence::signaled())
                    .unwrap();
                black_box(seq);
            });
        });
    }
    group.finish();
}

fn bench_buffer_write_read(c: &mut Criterion) {
    let mut group = c.benchmark_group("buffer_write_read");
    group.sample_size(50);

    for dim in [64u32, 256].iter() {
        let bytes = (*dim as u64) * (*dim as u64) * 4;
        group.throughput(Throughput::Bytes(bytes));
        group.bench_with_input(BenchmarkId::from_parameter(dim), dim, |b, &dim| {
            let cfg = BufferRequestConfig::new(dim, dim, PixelFormat::Rgba8888);
            let queue = BufferQueue::new(&unique_name(), QueueConfig::new(2, cfg)).unwrap();
            let r = queue.request_buffer(&cfg).unwrap();
            let data = vec![42u8; r.buffer.size()];

            b.iter(|| {
                r.buffer.write_at(0, &data).unwrap();
                let sum: u64 = r.buffer.as_slice().iter().map(|&x| x as u64).sum();
                black_box(sum);
            });
        });
    }
    group.finish();
}

fn bench_cache_ops(c: &mut Criterion) {
    let dir = std::env::temp_dir().join(unique_name());
    std::fs::create_dir_all(&dir).unwrap();
    let cache = BlobCache::new(CacheConfig::new(dir.join("blobs.bin")));
    let value = vec![7u8; 4096];

    let mut group = c.benchmark_group("blob_cache");
    group.throughput(Throughput::Bytes(4096));

    group.bench_function("set", |b| {
        let mut i = 0u64;
        b.iter(|| {
            cache.set(&i.to_le_bytes(), &value);
            i = (i + 1) % 256;
        });
    });

    cache.set(b"hot-key", &value);
    group.bench_function("get", |b| {
        let mut out = vec![0u8; 4096];
        b.iter(|| {
            let n = cache.get(b"hot-key", &mut out);
            black_box(n);
        });
    });

    group.finish();
}

criterion_group!(
    benches,
    bench_queue_create,
    bench_frame_cycle,
    bench_buffer_write_read,
    bench_cache_ops
);
criterion_main!(benches);
