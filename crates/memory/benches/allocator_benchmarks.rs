//! Allocator benchmarks
//!
//! Compares the region allocators against the system allocator across the
//! workloads the engine actually runs: single alloc/free cycles, batched
//! frame allocations, and compaction.

use criterion::{Criterion, Throughput, criterion_group, criterion_main};
use kestrel_memory::allocator::{
    Allocator, CompactingAllocator, FreeListAllocator, PoolAllocator, StackAllocator,
    SystemAllocator,
};
use std::alloc::Layout;
use std::hint::black_box;

/// Benchmark single allocation/deallocation cycle
fn bench_single_allocation(c: &mut Criterion) {
    let mut group = c.benchmark_group("single_allocation");
    let layout = Layout::from_size_align(64, 8).unwrap();

    group.bench_function("pool_64b", |b| {
        let allocator = PoolAllocator::new(64, 8, 1024, SystemAllocator::global()).unwrap();

        b.iter(|| unsafe {
            let ptr = allocator.allocate(layout).unwrap();
            allocator.deallocate(ptr.cast(), layout);
            black_box(ptr);
        });
    });

    group.bench_function("freelist_64b", |b| {
        let allocator = FreeListAllocator::new(1024 * 1024, SystemAllocator::global()).unwrap();

        b.iter(|| unsafe {
            let ptr = allocator.allocate(layout).unwrap();
            allocator.deallocate(ptr.cast(), layout);
            black_box(ptr);
        });
    });

    group.bench_function("stack_64b", |b| {
        let allocator = StackAllocator::new(1024 * 1024, SystemAllocator::global()).unwrap();

        b.iter(|| unsafe {
            let ptr = allocator.allocate(layout).unwrap();
            black_box(ptr);
            allocator.clear();
        });
    });

    // System allocator (baseline)
    group.bench_function("system_64b", |b| {
        b.iter(|| unsafe {
            let ptr = std::alloc::alloc(layout);
            std::alloc::dealloc(ptr, layout);
            black_box(ptr);
        });
    });

    group.finish();
}

/// Benchmark batch allocations in a frame-like pattern
fn bench_batch_allocations(c: &mut Criterion) {
    let mut group = c.benchmark_group("batch_allocations");
    group.throughput(Throughput::Elements(100));
    let layout = Layout::from_size_align(64, 8).unwrap();

    group.bench_function("pool_100x64b", |b| {
        let allocator = PoolAllocator::new(64, 8, 1024, SystemAllocator::global()).unwrap();

        b.iter(|| unsafe {
            let mut ptrs = Vec::with_capacity(100);
            for _ in 0..100 {
                ptrs.push(allocator.allocate(layout).unwrap());
            }
            for ptr in ptrs {
                allocator.deallocate(ptr.cast(), layout);
            }
        });
    });

    group.bench_function("stack_100x64b_marker", |b| {
        let allocator = StackAllocator::new(1024 * 1024, SystemAllocator::global()).unwrap();

        b.iter(|| unsafe {
            let frame = allocator.marker();
            for _ in 0..100 {
                black_box(allocator.allocate(layout).unwrap());
            }
            allocator.clear_to_marker(frame);
        });
    });

    group.bench_function("freelist_100x64b", |b| {
        let allocator = FreeListAllocator::new(1024 * 1024, SystemAllocator::global()).unwrap();

        b.iter(|| unsafe {
            let mut ptrs = Vec::with_capacity(100);
            for _ in 0..100 {
                ptrs.push(allocator.allocate(layout).unwrap());
            }
            for ptr in ptrs {
                allocator.deallocate(ptr.cast(), layout);
            }
        });
    });

    group.finish();
}

/// Benchmark defragmentation of a checkerboard-fragmented arena
fn bench_compaction(c: &mut Criterion) {
    let mut group = c.benchmark_group("compaction");
    group.sample_size(50);

    group.bench_function("defragment_32_gaps", |b| {
        b.iter(|| {
            let arena = CompactingAllocator::new(64 * 1024, 128, SystemAllocator::global()).unwrap();

            let mut ptrs: Vec<_> = (0..64)
                .map(|i| arena.alloc_value([i as u8; 48]).unwrap())
                .collect();
            for ptr in ptrs.iter_mut().step_by(2) {
                arena.deallocate(ptr);
            }

            black_box(arena.defragment());

            for ptr in ptrs.iter_mut().skip(1).step_by(2) {
                arena.deallocate(ptr);
            }
        });
    });

    group.finish();
}

criterion_group!(
    benches,
    bench_single_allocation,
    bench_batch_allocations,
    bench_compaction
);

criterion_main!(benches);
