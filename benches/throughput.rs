// Throughput benchmarks for the pool and ring buffer.
//
// Measures raw allocate/deallocate and enqueue/dequeue overhead in
// isolation, uncontended and single-threaded.

use std::hint::black_box;

use criterion::{criterion_group, criterion_main, Criterion};
use nebula_lockfree::{MemoryPool, RingBuffer};

fn bench_pool_allocate_deallocate(c: &mut Criterion) {
    let pool: MemoryPool<u64> = MemoryPool::new(1024).unwrap();
    c.bench_function("pool_allocate_deallocate", |b| {
        b.iter(|| {
            let idx = pool.allocate(black_box(42)).unwrap();
            black_box(pool.deallocate(idx));
        });
    });
}

fn bench_ring_buffer_enqueue_dequeue(c: &mut Criterion) {
    let ring: RingBuffer<u64> = RingBuffer::new(1024).unwrap();
    c.bench_function("ring_buffer_enqueue_dequeue", |b| {
        b.iter(|| {
            ring.enqueue(black_box(42));
            black_box(ring.dequeue());
        });
    });
}

criterion_group!(benches, bench_pool_allocate_deallocate, bench_ring_buffer_enqueue_dequeue);
criterion_main!(benches);
