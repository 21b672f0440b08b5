//! Pool throughput benchmarks
//!
//! Single-thread hot paths against the system allocator, plus a contended
//! multi-thread alloc/free loop.

use std::alloc::{Layout, alloc, dealloc};
use std::hint::black_box;
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::{Duration, Instant};

use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use segpool::{PoolConfig, SegregatedPool, SizeClasses};

fn bench_pool(arena_size: usize) -> SegregatedPool {
    let classes = SizeClasses::new(vec![64, 256, 1024, 4096]).unwrap();
    let config = PoolConfig::production()
        .with_size_classes(classes)
        .with_arena_size(arena_size);
    SegregatedPool::new(config).unwrap()
}

/// Allocate then immediately free one chunk
fn bench_alloc_free(c: &mut Criterion) {
    let mut group = c.benchmark_group("alloc_free");
    group.throughput(Throughput::Elements(1));

    for size in [48usize, 200, 1000, 4000] {
        group.bench_with_input(BenchmarkId::new("segpool", size), &size, |b, &size| {
            let pool = bench_pool(1024 * 1024);
            b.iter(|| unsafe {
                let ptr = pool.allocate(black_box(size)).unwrap();
                pool.deallocate(ptr, size).unwrap();
            });
        });

        group.bench_with_input(BenchmarkId::new("system", size), &size, |b, &size| {
            let layout = Layout::from_size_align(size, 8).unwrap();
            b.iter(|| unsafe {
                let ptr = alloc(black_box(layout));
                dealloc(ptr, layout);
            });
        });
    }

    group.finish();
}

/// Hold a batch of small chunks, then return them all
fn bench_batch(c: &mut Criterion) {
    let mut group = c.benchmark_group("batch_64");
    group.throughput(Throughput::Elements(256));

    group.bench_function("segpool", |b| {
        let pool = bench_pool(1024 * 1024);
        let mut held = Vec::with_capacity(256);
        b.iter(|| unsafe {
            for _ in 0..256 {
                held.push(pool.allocate(64).unwrap());
            }
            for ptr in held.drain(..) {
                pool.deallocate(ptr, 64).unwrap();
            }
        });
    });

    group.finish();
}

/// Many threads cycling through one pool
fn bench_contended(c: &mut Criterion) {
    let mut group = c.benchmark_group("contended");

    for threads in [2usize, 4, 8] {
        group.throughput(Throughput::Elements(threads as u64));
        group.bench_with_input(BenchmarkId::from_parameter(threads), &threads, |b, &threads| {
            b.iter_custom(|iters| {
                let pool = Arc::new(bench_pool(4 * 1024 * 1024));
                let barrier = Arc::new(Barrier::new(threads + 1));

                let handles: Vec<_> = (0..threads)
                    .map(|t| {
                        let pool = Arc::clone(&pool);
                        let barrier = Arc::clone(&barrier);
                        let size = [64, 256, 1024][t % 3];
                        thread::spawn(move || {
                            barrier.wait();
                            for _ in 0..iters {
                                let ptr = pool.allocate(size).unwrap();
                                unsafe { pool.deallocate(ptr, size).unwrap() };
                            }
                        })
                    })
                    .collect();

                barrier.wait();
                let start = Instant::now();
                for handle in handles {
                    handle.join().unwrap();
                }
                start.elapsed().max(Duration::from_nanos(1))
            });
        });
    }

    group.finish();
}

criterion_group!(benches, bench_alloc_free, bench_batch, bench_contended);
criterion_main!(benches);
