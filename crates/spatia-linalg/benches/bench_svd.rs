use std::hint::black_box;

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use glam::{DMat3, DVec3};
use spatia_linalg::svd3;

fn bench_svd3(c: &mut Criterion) {
    let mut group = c.benchmark_group("svd3");

    let diagonal = DMat3::from_diagonal(DVec3::new(1.0, 2.0, 3.0));
    let rank2 = DMat3::from_cols(
        DVec3::new(1.0, 2.0, 3.0),
        DVec3::new(4.0, 5.0, 6.0),
        DVec3::new(5.0, 7.0, 9.0),
    );

    group.bench_function(BenchmarkId::new("svd3", "diagonal"), |b| {
        b.iter(|| black_box(svd3(black_box(&diagonal))))
    });

    group.bench_function(BenchmarkId::new("svd3", "rank2"), |b| {
        b.iter(|| black_box(svd3(black_box(&rank2))))
    });

    group.finish();
}

criterion_group!(benches, bench_svd3);
criterion_main!(benches);
