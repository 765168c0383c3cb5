//! Benchmarks for the lock-free ordered list's insert/search/delete
//! hot paths.

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use slabweave::List;

fn bench_list_insert(c: &mut Criterion) {
    c.bench_function("list_insert_ascending", |b| {
        b.iter(|| {
            let list: List<u64> = List::create(512).unwrap();
            for i in 0..512 {
                list.insert(black_box(i as i64), i).unwrap();
            }
            black_box(&list);
        })
    });
}

fn bench_list_search(c: &mut Criterion) {
    let list: List<u64> = List::create(1024).unwrap();
    for i in 0..1024 {
        list.insert(i as i64, i).unwrap();
    }

    c.bench_function("list_search_hit", |b| {
        b.iter(|| black_box(list.search(black_box(512)).unwrap()))
    });
}

fn bench_list_insert_delete_roundtrip(c: &mut Criterion) {
    let list: List<u64> = List::create(64).unwrap();

    c.bench_function("list_insert_delete_roundtrip", |b| {
        b.iter(|| {
            list.insert(black_box(1), 1).unwrap();
            black_box(list.delete(black_box(1)).unwrap());
        })
    });
}

criterion_group!(
    benches,
    bench_list_insert,
    bench_list_search,
    bench_list_insert_delete_roundtrip
);
criterion_main!(benches);
