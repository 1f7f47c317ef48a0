use kcp_core::PointCloud;
use kcp_keypoint::curvature::sub_segments;
use kcp_keypoint::{CurvatureConfig, Label, MultiScaleCurvature, RangeImage, RangeImageConfig};
use nalgebra::Point3;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::f64::consts::PI;

/// Ring of `n` points at height `z`, one per column of a 1800-column image.
fn ring(n: usize, z: f64, radius: impl Fn(usize) -> f64) -> Vec<Point3<f64>> {
    (0..n)
        .map(|i| {
            let theta = -PI + (i as f64 + 0.5) * 2.0 * PI / n as f64;
            let r = radius(i);
            Point3::new(r * theta.cos(), r * theta.sin(), z)
        })
        .collect()
}

fn single_channel() -> RangeImageConfig {
    RangeImageConfig::new(1, -1.0, 1.0, 1800)
}

/// Noisy multi-beam scan with random ranges and some dropped returns.
fn random_scan(seed: u64) -> PointCloud<f64> {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut points = Vec::new();
    for beam in 0..16 {
        let elevation = (-14.0 + beam as f64 * 1.9).to_radians();
        for col in 0..900 {
            if rng.gen_bool(0.1) {
                continue;
            }
            let azimuth = -PI + (col as f64 + rng.gen_range(0.0..1.0)) * 2.0 * PI / 900.0;
            let range = if (col / 40) % 2 == 0 {
                10.0 + rng.gen_range(-0.005..0.005)
            } else {
                rng.gen_range(3.0..40.0)
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

#[test]
fn test_projection_totality() {
    let mut rng = StdRng::seed_from_u64(7);
    let config = RangeImageConfig::default();

    for _ in 0..1000 {
        let p = Point3::new(
            rng.gen_range(-50.0..50.0),
            rng.gen_range(-50.0..50.0),
            rng.gen_range(-50.0..50.0),
        );
        let (channel, column) = config.project(&p).expect("non-degenerate config projects every point");
        assert!(channel < config.n_channels, "channel {} out of range", channel);
        assert!(column < config.hfov_resolution, "column {} out of range", column);
    }
}

#[test]
fn test_sequence_consistency() {
    let cloud = random_scan(11);
    let image = RangeImage::new(&cloud, RangeImageConfig::default());

    let populated = image.image_indices().iter().filter(|c| c.is_some()).count();
    assert_eq!(image.sequence_len(), populated);
    assert_eq!(image.depth_sequence().len(), populated);
    assert_eq!(image.point_indices_sequence().len(), populated);
    assert_eq!(image.col_indices_sequence().len(), populated);

    let ranges = image.channel_ranges();
    assert_eq!(ranges.len(), 32);
    assert_eq!(ranges[0].start, 0);
    assert_eq!(ranges[31].end, populated);
    for pair in ranges.windows(2) {
        assert_eq!(pair[0].end, pair[1].start, "channel ranges must be contiguous");
    }

    for (channel, range) in ranges.iter().enumerate() {
        for i in range.clone() {
            let column = image.col_indices_sequence()[i];
            let idx = image.point_indices_sequence()[i];
            assert_eq!(image.cell(channel, column), Some(idx));

            let expected = cloud.points[idx].coords.norm() as f32;
            assert!((image.depth_sequence()[i] - expected).abs() < 1e-4);
        }
    }
}

#[test]
fn test_empty_cloud() {
    let cloud = PointCloud::<f64>::default();
    let extractor = MultiScaleCurvature::from_cloud(&cloud, RangeImageConfig::default(), CurvatureConfig::default());

    assert_eq!(extractor.range_image().sequence_len(), 0);
    assert!(extractor.labels().is_empty());
    assert_eq!(extractor.corner_points().nrows(), 0);
    assert_eq!(extractor.plane_points().nrows(), 0);
}

#[test]
fn test_flat_ring_is_all_plane() {
    let cloud = PointCloud::new(ring(400, 0.0, |_| 10.0));
    let extractor = MultiScaleCurvature::from_cloud(&cloud, single_channel(), CurvatureConfig::default());

    assert_eq!(extractor.range_image().sequence_len(), 400);
    assert!(extractor.curvature().iter().all(|c| c.kappa < 1e-3));
    assert_eq!(extractor.corner_points().nrows(), 0);
    assert!(extractor.plane_points().nrows() > 0);
    assert!(extractor
        .labels()
        .iter()
        .all(|l| matches!(l, Label::Plane | Label::Ambiguous)));
}

#[test]
fn test_zigzag_ring_caps_corners_per_segment() {
    let cloud = PointCloud::new(ring(1800, 0.0, |i| if i % 2 == 0 { 5.0 } else { 20.0 }));
    let extractor = MultiScaleCurvature::from_cloud(&cloud, single_channel(), CurvatureConfig::default());
    let image = extractor.range_image();
    assert_eq!(image.sequence_len(), 1800);

    let channel = image.channel_range(0).unwrap();
    for segment in sub_segments(&channel) {
        let corners = extractor.labels()[segment]
            .iter()
            .filter(|&&l| l == Label::Corner)
            .count();
        assert_eq!(corners, 12);
    }
    assert_eq!(extractor.corner_points().nrows(), 72);
    assert_eq!(extractor.plane_points().nrows(), 0);
}

#[test]
fn test_short_channel_contributes_nothing() {
    let mut points = ring(400, -1.0, |_| 10.0);
    points.extend(ring(10, 1.0, |_| 10.0));
    let cloud = PointCloud::new(points);

    let config = RangeImageConfig::new(2, -10.0, 10.0, 1800);
    let extractor = MultiScaleCurvature::from_cloud(&cloud, config, CurvatureConfig::default());
    let image = extractor.range_image();

    assert_eq!(image.channel_range(0).map(|r| r.len()), Some(400));
    assert_eq!(image.channel_range(2), None);
    let short = image.channel_range(1).unwrap();
    assert_eq!(short.len(), 10);

    for i in short {
        assert_eq!(extractor.labels()[i], Label::Undefined);
        assert_eq!(extractor.curvature()[i].kappa, f32::MAX);
    }
    assert!(extractor.plane_point_indices().iter().all(|&idx| idx < 400));
    assert!(extractor.corner_point_indices().iter().all(|&idx| idx < 400));
}

#[test]
fn test_keypoints_on_random_scan() {
    let cloud = random_scan(3);
    let extractor = MultiScaleCurvature::from_cloud(&cloud, RangeImageConfig::default(), CurvatureConfig::default());
    let image = extractor.range_image();

    assert!(extractor.corner_points().nrows() > 0, "expected corners on a scan with range jumps");
    assert!(extractor.plane_points().nrows() > 0, "expected planes on the smooth wall sections");

    // Corner and plane sets never share a point
    for idx in extractor.corner_point_indices() {
        assert!(!extractor.plane_point_indices().contains(idx));
    }

    // Per-segment corner cap
    for range in image.channel_ranges() {
        if range.len() < 21 {
            continue;
        }
        for segment in sub_segments(range) {
            let corners = extractor.labels()[segment]
                .iter()
                .filter(|&&l| l == Label::Corner)
                .count();
            assert!(corners <= 12, "{} corners in one segment", corners);
        }
    }

    // Points are materialized in index order from the original cloud
    for (row, &idx) in extractor.corner_point_indices().iter().enumerate() {
        let p = cloud.points[idx];
        assert_eq!(extractor.corner_points()[(row, 0)], p.x);
        assert_eq!(extractor.corner_points()[(row, 1)], p.y);
        assert_eq!(extractor.corner_points()[(row, 2)], p.z);
    }

    // Keypoints pass their thresholds
    let config = extractor.config();
    for entry in extractor.curvature() {
        match extractor.labels()[entry.index] {
            Label::Corner => assert!(entry.kappa > config.corner_threshold),
            Label::Plane => assert!(entry.kappa < config.plane_threshold),
            _ => {}
        }
    }
}

#[test]
fn test_config_serde_round_trip() {
    let config = RangeImageConfig::new(64, -25.0, 15.0, 2048);
    let json = serde_json::to_string(&config).unwrap();
    let back: RangeImageConfig = serde_json::from_str(&json).unwrap();
    assert_eq!(back, config);

    // Missing fields fall back to defaults
    let partial: CurvatureConfig = serde_json::from_str(r#"{"corner_threshold": 12.5}"#).unwrap();
    assert_eq!(partial.corner_threshold, 12.5);
    assert_eq!(partial.plane_threshold, CurvatureConfig::default().plane_threshold);
}
