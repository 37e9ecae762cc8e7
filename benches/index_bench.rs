//! Spatial index benchmarks.

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use std::hint::black_box;
use urbis::{IndexConfig, Mbr, SpatialIndex};

fn populated(size: u64) -> SpatialIndex {
    let mut index = SpatialIndex::create(IndexConfig::default());
    for i in 0..size {
        let x = (i % 1000) as f64;
        let y = (i / 1000) as f64;
        index.insert_point(x, y).unwrap();
    }
    index.build().unwrap();
    index
}

fn bench_insert(c: &mut Criterion) {
    let mut group = c.benchmark_group("insert");
    for size in [100, 1_000, 10_000].iter() {
        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, &size| {
            b.iter_with_setup(
                || SpatialIndex::create(IndexConfig::default()),
                |mut index| {
                    for i in 0..size {
                        let x = (i % 1000) as f64;
                        let y = (i / 1000) as f64;
                        index.insert_point(x, y).unwrap();
                    }
                    black_box(index.count())
                },
            );
        });
    }
    group.finish();
}

fn bench_range_query(c: &mut Criterion) {
    let mut index = populated(10_000);
    c.bench_function("range_query_10k", |b| {
        b.iter(|| black_box(index.query_range(&Mbr::new(250.0, 2.0, 750.0, 7.0))));
    });
}

fn bench_knn(c: &mut Criterion) {
    let mut index = populated(10_000);
    c.bench_function("knn_10k", |b| {
        b.iter(|| black_box(index.query_knn(500.0, 5.0, 10)));
    });
}

criterion_group!(benches, bench_insert, bench_range_query, bench_knn);
criterion_main!(benches);
