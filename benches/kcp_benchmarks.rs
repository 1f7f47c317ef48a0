//! Benchmarks for the KCP pipeline stages
//!
//! Keypoint extraction on a synthetic multi-beam scan, and correspondence
//! generation with exact and approximate descriptor search.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use kcp::features::{CorrespondenceFinder, FlannParams};
use kcp::keypoint::{CurvatureConfig, MultiScaleCurvature, RangeImageConfig};
use kcp::PointCloud;
use nalgebra::{DMatrix, MatrixXx3, Point3};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::f64::consts::PI;
use std::time::Duration;

/// Synthetic 32-beam scan of a box-shaped room with random clutter
fn create_scan(columns: usize, rng: &mut StdRng) -> PointCloud<f64> {
    let mut points = Vec::with_capacity(32 * columns);
    for beam in 0..32 {
        let elevation = (-30.0 + beam as f64 * 1.25 + 0.6).to_radians();
        for col in 0..columns {
            let azimuth = -PI + (col as f64 + 0.5) * 2.0 * PI / columns as f64;
            // Distance to the walls of a 30 x 20 m room
            let wall = (15.0 / azimuth.cos().abs()).min(10.0 / azimuth.sin().abs());
            let range = if rng.gen_bool(0.05) {
                rng.gen_range(1.0..wall)
            } else {
                wall
            };
            points.push(Point3::new(
                range * elevation.cos() * azimuth.cos(),
                range * elevation.cos() * azimuth.sin(),
                range * elevation.sin(),
            ));
        }
    }
    PointCloud::new(points)
}

fn benchmark_keypoint_extraction(c: &mut Criterion) {
    let mut group = c.benchmark_group("keypoint_extraction");
    group.measurement_time(Duration::from_secs(5));
    group.sample_size(20);

    let mut rng = StdRng::seed_from_u64(0);
    for columns in [450usize, 900, 1800] {
        let cloud = create_scan(columns, &mut rng);

        group.bench_with_input(BenchmarkId::new("cpu", cloud.len()), &cloud, |b, cloud| {
            b.iter(|| {
                MultiScaleCurvature::from_cloud(
                    black_box(cloud),
                    RangeImageConfig::default(),
                    CurvatureConfig::default(),
                )
            });
        });
    }

    group.finish();
}

fn benchmark_correspondences(c: &mut Criterion) {
    let mut group = c.benchmark_group("kcp_correspondences");
    group.measurement_time(Duration::from_secs(5));
    group.sample_size(20);

    let mut rng = StdRng::seed_from_u64(1);
    for size in [500usize, 2000, 8000] {
        let src = MatrixXx3::from_fn(size, |_, _| rng.gen_range(-50.0..50.0));
        let dst = MatrixXx3::from_fn(size, |_, _| rng.gen_range(-50.0..50.0));
        let src_feature = DMatrix::from_fn(size, 3, |r, c| src[(r, c)]);
        let dst_feature = DMatrix::from_fn(size, 3, |r, c| dst[(r, c)]);

        let exact = CorrespondenceFinder::new(2);
        group.bench_with_input(BenchmarkId::new("exact", size), &size, |b, _| {
            b.iter(|| exact.find(black_box(&src), black_box(&dst), &src_feature, &dst_feature));
        });

        let approximate = CorrespondenceFinder::new(2).with_flann(FlannParams::default().with_trees(4).with_checks(32));
        group.bench_with_input(BenchmarkId::new("approximate", size), &size, |b, _| {
            b.iter(|| approximate.find(black_box(&src), black_box(&dst), &src_feature, &dst_feature));
        });
    }

    group.finish();
}

criterion_group!(benches, benchmark_keypoint_extraction, benchmark_correspondences);
criterion_main!(benches);
