use std::hint::black_box;
use std::sync::Arc;

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use glam::Vec3;
use spatia_3d::CpuVertexBuffer;
use spatia_bvh::{Bvh, Points};

fn random_points(num_points: usize) -> Points {
    let positions = (0..num_points)
        .map(|_| {
            [
                rand::random::<f32>() * 100.0,
                rand::random::<f32>() * 100.0,
                rand::random::<f32>() * 100.0,
            ]
        })
        .collect();
    Points::new(Arc::new(CpuVertexBuffer::new(positions)))
}

fn bench_build(c: &mut Criterion) {
    let mut group = c.benchmark_group("bvh_build");

    for num_points in [1_000, 100_000] {
        let points = random_points(num_points);
        group.bench_with_input(
            BenchmarkId::new("points", num_points),
            &num_points,
            |b, _| {
                b.iter(|| {
                    let bvh = Bvh::new(points.clone()).unwrap();
                    bvh.wait();
                    black_box(bvh.is_ready())
                })
            },
        );
    }

    group.finish();
}

fn bench_intersect(c: &mut Criterion) {
    let mut group = c.benchmark_group("bvh_intersect");

    for num_points in [1_000, 100_000] {
        let bvh = Bvh::new(random_points(num_points)).unwrap();
        bvh.wait();
        group.bench_with_input(
            BenchmarkId::new("points", num_points),
            &num_points,
            |b, _| {
                b.iter(|| {
                    let origin = Vec3::new(
                        rand::random::<f32>() * 100.0,
                        rand::random::<f32>() * 100.0,
                        200.0,
                    );
                    black_box(bvh.intersect(origin, Vec3::NEG_Z))
                })
            },
        );
    }

    group.finish();
}

criterion_group!(benches, bench_build, bench_intersect);
criterion_main!(benches);
