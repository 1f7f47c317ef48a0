//! Adaptive voting for scalar truncated least squares
//!
//! Each measurement `x_i` casts an interval `[x_i − c, x_i + c]`. Every
//! maximal overlap of intervals proposes the mean of its members, and the
//! proposal with the lowest truncated cost `Σ min((x_i − x)², c²)` wins.

use nalgebra::{Matrix3, Matrix3xX, Vector3};

/// Robust scalar estimate of `values` with inlier bound `bound`.
///
/// Returns `None` for an empty input.
pub fn adaptive_voting(values: &[f64], bound: f64) -> Option<f64> {
    if values.is_empty() {
        return None;
    }

    // (position, entering, measurement)
    let mut events: Vec<(f64, bool, usize)> = Vec::with_capacity(2 * values.len());
    for (i, &x) in values.iter().enumerate() {
        events.push((x - bound, true, i));
        events.push((x + bound, false, i));
    }
    // Entering events come first at equal positions so touching intervals overlap
    events.sort_by(|a, b| a.0.total_cmp(&b.0).then(b.1.cmp(&a.1)));

    let bound_sq = bound * bound;
    let mut active = vec![false; values.len()];
    let mut best: Option<(f64, f64)> = None;

    for &(_, entering, i) in &events {
        active[i] = entering;
        if !entering {
            continue;
        }

        let (sum, count) = values
            .iter()
            .zip(active.iter())
            .filter(|&(_, &a)| a)
            .fold((0.0, 0usize), |(s, c), (&x, _)| (s + x, c + 1));
        let estimate = sum / count as f64;

        let cost: f64 = values
            .iter()
            .map(|&x| ((x - estimate) * (x - estimate)).min(bound_sq))
            .sum();

        if best.map_or(true, |(_, best_cost)| cost < best_cost) {
            best = Some((estimate, cost));
        }
    }

    best.map(|(estimate, _)| estimate)
}

/// Translation `t` such that `dst_i ≈ R · src_i + t`, voted per axis.
pub fn estimate_translation(
    src: &Matrix3xX<f64>,
    dst: &Matrix3xX<f64>,
    rotation: &Matrix3<f64>,
    bound: f64,
) -> Vector3<f64> {
    let residuals = dst - rotation * src;
    Vector3::from_fn(|axis, _| {
        let values: Vec<f64> = residuals.row(axis).iter().copied().collect();
        adaptive_voting(&values, bound).unwrap_or(0.0)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_voting_ignores_outliers() {
        let values = [1.0, 1.01, 0.99, 1.02, 5.0, -3.0, 12.0];
        let estimate = adaptive_voting(&values, 0.05).unwrap();
        assert!((estimate - 1.005).abs() < 1e-9, "estimate {}", estimate);
    }

    #[test]
    fn test_voting_single_value() {
        assert_eq!(adaptive_voting(&[2.5], 0.1), Some(2.5));
        assert_eq!(adaptive_voting(&[], 0.1), None);
    }

    #[test]
    fn test_voting_prefers_larger_consensus() {
        // Two clusters, the second one is larger
        let values = [0.0, 0.01, 10.0, 10.01, 10.02];
        let estimate = adaptive_voting(&values, 0.1).unwrap();
        assert!((estimate - 10.01).abs() < 1e-9);
    }

    #[test]
    fn test_translation_per_axis() {
        let src = Matrix3xX::from_column_slice(&[0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0, 0.0, 4.0, 4.0, 4.0]);
        let mut dst = src.clone();
        for mut col in dst.column_iter_mut() {
            col += Vector3::new(0.5, -1.0, 2.0);
        }
        // One outlier
        dst.set_column(3, &Vector3::new(-9.0, 9.0, -9.0));

        let t = estimate_translation(&src, &dst, &Matrix3::identity(), 0.05);
        assert!((t - Vector3::new(0.5, -1.0, 2.0)).norm() < 1e-9);
    }
}
