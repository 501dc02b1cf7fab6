//! Benchmarks for the segregated free-list allocator.

use criterion::{black_box, criterion_group, criterion_main, Criterion};

use corekernel::collector::null_collector;
use corekernel::memory::MemoryManager;
use corekernel::process::Pid;

fn small_allocations(c: &mut Criterion) {
    let manager = MemoryManager::new(64 * 1024 * 1024, null_collector());
    let pid = Pid(1);

    c.bench_function("allocate_64b", |b| {
        b.iter(|| {
            let address = manager.allocate(pid, black_box(64)).unwrap();
            manager.deallocate(pid, address).unwrap();
        })
    });
}

fn medium_allocations(c: &mut Criterion) {
    let manager = MemoryManager::new(64 * 1024 * 1024, null_collector());
    let pid = Pid(1);

    c.bench_function("allocate_8kb", |b| {
        b.iter(|| {
            let address = manager.allocate(pid, black_box(8 * 1024)).unwrap();
            manager.deallocate(pid, address).unwrap();
        })
    });
}

fn fragmented_allocate_and_coalesce(c: &mut Criterion) {
    let manager = MemoryManager::new(64 * 1024 * 1024, null_collector());
    let pid = Pid(1);

    c.bench_function("interleaved_alloc_dealloc", |b| {
        b.iter(|| {
            let mut addrs = Vec::with_capacity(32);
            for i in 0..32 {
                addrs.push(manager.allocate(pid, black_box(256 + i * 16)).unwrap());
            }
            for address in addrs {
                manager.deallocate(pid, address).unwrap();
            }
        })
    });
}

criterion_group!(benches, small_allocations, medium_allocations, fragmented_allocate_and_coalesce);
criterion_main!(benches);
