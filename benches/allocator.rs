//! Benchmarks for classpool.
//!
//! Run with: cargo bench

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use classpool::{PoolAllocator, PoolConfig};
use std::alloc::{alloc, dealloc, Layout};

fn quiet(config: PoolConfig) -> PoolAllocator {
    PoolAllocator::new(config.with_maintenance(false)).unwrap()
}

fn bench_alloc_free(c: &mut Criterion) {
    let mut group = c.benchmark_group("alloc_free_64B");
    group.throughput(Throughput::Bytes(64));

    let cached = quiet(PoolConfig::default());
    group.bench_function("classpool_tls", |b| {
        b.iter(|| {
            let ptr = cached.allocate(black_box(64));
            unsafe { cached.deallocate(black_box(ptr)) };
        })
    });

    let pooled = quiet(PoolConfig::default().with_tls(false));
    group.bench_function("classpool_pool", |b| {
        b.iter(|| {
            let ptr = pooled.allocate(black_box(64));
            unsafe { pooled.deallocate(black_box(ptr)) };
        })
    });

    group.bench_function("system", |b| {
        let layout = Layout::from_size_align(64, 8).unwrap();
        b.iter(|| unsafe {
            let ptr = alloc(layout);
            dealloc(black_box(ptr), layout);
        })
    });

    group.finish();
}

fn bench_size_classes(c: &mut Criterion) {
    let alloc = quiet(PoolConfig::default());
    let mut group = c.benchmark_group("size_classes");

    for size in [8usize, 64, 512, 1024, 4096] {
        group.throughput(Throughput::Bytes(size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, &size| {
            b.iter(|| {
                let ptr = alloc.allocate(size);
                unsafe { alloc.deallocate(black_box(ptr)) };
            })
        });
    }

    group.finish();
}

fn bench_batch(c: &mut Criterion) {
    let alloc = quiet(PoolConfig::default());
    let mut group = c.benchmark_group("batch");

    group.bench_function("alloc_1000_then_free", |b| {
        let mut ptrs = Vec::with_capacity(1000);
        b.iter(|| {
            for i in 0..1000 {
                ptrs.push(alloc.allocate(16 + i % 256));
            }
            for ptr in ptrs.drain(..) {
                unsafe { alloc.deallocate(ptr) };
            }
        })
    });

    group.finish();
}

fn bench_reallocate(c: &mut Criterion) {
    let alloc = quiet(PoolConfig::default());
    let mut group = c.benchmark_group("reallocate");

    group.bench_function("in_place", |b| {
        let ptr = alloc.allocate(256);
        b.iter(|| unsafe { black_box(alloc.reallocate(ptr, black_box(200))) });
        unsafe { alloc.deallocate(ptr) };
    });

    group.bench_function("grow_64_to_512", |b| {
        b.iter(|| unsafe {
            let small = alloc.allocate(64);
            let grown = alloc.reallocate(small, 512);
            alloc.deallocate(black_box(grown));
        })
    });

    group.finish();
}

fn bench_scoped(c: &mut Criterion) {
    let alloc = quiet(PoolConfig::default());
    c.bench_function("scoped_128B", |b| {
        b.iter(|| {
            let buf = alloc.scoped(128).unwrap();
            black_box(buf.len());
        })
    });
}

criterion_group!(
    benches,
    bench_alloc_free,
    bench_size_classes,
    bench_batch,
    bench_reallocate,
    bench_scoped,
);
criterion_main!(benches);
