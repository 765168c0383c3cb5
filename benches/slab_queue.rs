//! Benchmarks for the slab pool's alloc/free hot path and the FIFO
//! queue's enqueue/dequeue hot path.

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use slabweave::{Queue, SlabPool};

fn bench_slab_alloc_free(c: &mut Criterion) {
    let pool: SlabPool<u64> = SlabPool::create(1024).unwrap();

    c.bench_function("slab_alloc_free_roundtrip", |b| {
        b.iter(|| {
            let ptr = pool.alloc().unwrap();
            unsafe {
                pool.free(black_box(ptr));
            }
        })
    });
}

fn bench_queue_enqueue_dequeue(c: &mut Criterion) {
    let queue: Queue<u64> = Queue::create(1024).unwrap();

    c.bench_function("queue_enqueue_dequeue_roundtrip", |b| {
        b.iter(|| {
            queue.enqueue(black_box(42)).unwrap();
            black_box(queue.dequeue().unwrap());
        })
    });
}

fn bench_queue_enqueue_full(c: &mut Criterion) {
    c.bench_function("queue_fill_to_capacity", |b| {
        b.iter(|| {
            let queue: Queue<u64> = Queue::create(256).unwrap();
            for i in 0..256 {
                queue.enqueue(black_box(i)).unwrap();
            }
            black_box(&queue);
        })
    });
}

criterion_group!(
    benches,
    bench_slab_alloc_free,
    bench_queue_enqueue_dequeue,
    bench_queue_enqueue_full
);
criterion_main!(benches);
