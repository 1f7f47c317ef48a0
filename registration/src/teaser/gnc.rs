//! Graduated Non-Convexity (GNC) rotation estimation
//!
//! Rotation is solved from translation-invariant measurements (differences of
//! point pairs), alternating a weighted SVD solve with closed-form weight
//! updates while the surrogate loss is annealed towards the robust loss.
//!
//! Based on "Graduated Non-Convexity for Robust Spatial Perception" by Yang et al.

use kcp_core::RobustLoss;
use nalgebra::{Matrix3, Matrix3xX};

/// GNC optimizer for robust rotation estimation
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GNCRotationSolver {
    pub loss: RobustLoss,
    pub gnc_factor: f64,
    pub max_iterations: usize,
    pub cost_threshold: f64,
}

/// Result from GNC optimization
#[derive(Debug, Clone)]
pub struct GNCRotationResult {
    pub rotation: Matrix3<f64>,
    pub weights: Vec<f64>,
    pub iterations: usize,
    /// Robust loss of the returned rotation, `Σ ρ(‖dst_i − R · src_i‖)`.
    pub cost: f64,
}

impl GNCRotationSolver {
    /// Create new GNC optimizer with Truncated Least Squares (best for outlier rejection)
    pub fn new_tls(noise_bound: f64) -> Self {
        Self {
            loss: RobustLoss::TruncatedLeastSquares { c: noise_bound },
            gnc_factor: 1.4,
            max_iterations: 100,
            cost_threshold: 1e-6,
        }
    }

    /// Create new GNC optimizer with Geman-McClure loss
    pub fn new_geman_mcclure(noise_bound: f64) -> Self {
        Self {
            loss: RobustLoss::GemanMcClure { c: noise_bound },
            ..Self::new_tls(noise_bound)
        }
    }

    /// Estimate `R` minimizing the robust cost of `dst_i − R · src_i`.
    ///
    /// Both inputs are 3×N with matching columns. If every weight vanishes
    /// the last rotation solved is kept.
    pub fn solve(&self, src: &Matrix3xX<f64>, dst: &Matrix3xX<f64>) -> GNCRotationResult {
        let n = src.ncols();
        let mut weights = vec![1.0; n];
        let mut rotation = Matrix3::identity();
        let mut control = 0.0;
        let mut prev_cost = f64::INFINITY;
        let mut iterations = 0;

        for iteration in 0..self.max_iterations {
            iterations = iteration + 1;

            // Fix weights, solve for rotation
            match weighted_svd_rotation(src, dst, &weights) {
                Some(r) => rotation = r,
                None => break,
            }

            // Fix rotation, solve for weights
            let residuals_sq: Vec<f64> = (0..n)
                .map(|i| (dst.column(i) - rotation * src.column(i)).norm_squared())
                .collect();

            if iteration == 0 {
                let max_residual_sq = residuals_sq.iter().copied().fold(0.0, f64::max);
                match self.loss.gnc_initial_control(max_residual_sq) {
                    Some(mu) => control = mu,
                    // Every measurement already fits within the bound
                    None => break,
                }
            }

            let mut cost = 0.0;
            for (w, &r2) in weights.iter_mut().zip(residuals_sq.iter()) {
                *w = self.loss.gnc_weight(r2, control);
                cost += self.loss.gnc_cost(r2, *w, control);
            }

            let cost_diff = (cost - prev_cost).abs();
            if cost_diff < self.cost_threshold || self.loss.gnc_finished(control) {
                break;
            }
            control = self.loss.gnc_step(control, self.gnc_factor);
            prev_cost = cost;
        }

        if let Some(r) = weighted_svd_rotation(src, dst, &weights) {
            rotation = r;
        }

        let cost: f64 = (0..n)
            .map(|i| self.loss.evaluate((dst.column(i) - rotation * src.column(i)).norm()))
            .sum();

        tracing::debug!(iterations, cost, "GNC rotation estimated");

        GNCRotationResult {
            rotation,
            weights,
            iterations,
            cost,
        }
    }
}

/// Rotation best aligning weighted `src` columns onto `dst` columns (no
/// translation), or `None` when the weights carry no information.
pub fn weighted_svd_rotation(src: &Matrix3xX<f64>, dst: &Matrix3xX<f64>, weights: &[f64]) -> Option<Matrix3<f64>> {
    let total_weight: f64 = weights.iter().sum();
    if total_weight < 1e-12 {
        return None;
    }

    // Compute weighted covariance
    let mut covariance = Matrix3::<f64>::zeros();
    for (i, &w) in weights.iter().enumerate() {
        if w > 0.0 {
            covariance += dst.column(i) * src.column(i).transpose() * w;
        }
    }

    // SVD to find rotation
    let svd = covariance.svd(true, true);
    let u = svd.u?;
    let vt = svd.v_t?;

    let mut rotation = u * vt;

    // Ensure proper rotation (det = 1)
    if rotation.determinant() < 0.0 {
        let mut u_corrected = u;
        u_corrected.set_column(2, &(u.column(2) * -1.0));
        rotation = u_corrected * vt;
    }

    Some(rotation)
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::{Rotation3, Vector3};

    fn measurements(n: usize) -> Matrix3xX<f64> {
        Matrix3xX::from_fn(n, |r, c| {
            let t = c as f64;
            match r {
                0 => (t * 0.7).sin() * 3.0,
                1 => (t * 1.3).cos() * 2.0,
                _ => t * 0.1 - 1.0,
            }
        })
    }

    #[test]
    fn test_weighted_svd_recovers_rotation() {
        let src = measurements(20);
        let rotation = Rotation3::from_axis_angle(&Vector3::z_axis(), 0.6).into_inner();
        let dst = rotation * &src;

        let estimate = weighted_svd_rotation(&src, &dst, &vec![1.0; 20]).unwrap();
        assert!((estimate - rotation).norm() < 1e-9);
        assert!((estimate.determinant() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_zero_weights_give_none() {
        let src = measurements(5);
        assert!(weighted_svd_rotation(&src, &src, &[0.0; 5]).is_none());
    }

    #[test]
    fn test_gnc_tls_rejects_outliers() {
        let src = measurements(60);
        let rotation = Rotation3::from_euler_angles(0.2, -0.4, 1.1).into_inner();
        let mut dst = rotation * &src;

        // Corrupt a third of the measurements
        for c in (0..60).step_by(3) {
            dst.set_column(c, &Vector3::new(5.0, -4.0, 3.0 + c as f64));
        }

        let result = GNCRotationSolver::new_tls(0.01).solve(&src, &dst);
        assert!((result.rotation - rotation).norm() < 1e-6, "rotation error too large");
        // Each of the 20 outliers saturates at c², inliers cost nothing
        assert!((result.cost - 20.0 * 1e-4).abs() < 1e-9, "cost {}", result.cost);
        for c in 0..60 {
            if c % 3 == 0 {
                assert!(result.weights[c] < 0.5, "outlier {} kept weight {}", c, result.weights[c]);
            } else {
                assert!(result.weights[c] > 0.5, "inlier {} lost weight {}", c, result.weights[c]);
            }
        }
    }

    #[test]
    fn test_gnc_geman_mcclure_converges() {
        let src = measurements(40);
        let rotation = Rotation3::from_euler_angles(-0.3, 0.1, 0.5).into_inner();
        let mut dst = rotation * &src;
        for c in (0..40).step_by(8) {
            dst.set_column(c, &Vector3::new(-6.0, 2.0, 4.0));
        }

        let result = GNCRotationSolver::new_geman_mcclure(0.02).solve(&src, &dst);
        assert!((result.rotation - rotation).norm() < 1e-3);
    }

    #[test]
    fn test_clean_data_stops_after_first_solve() {
        let src = measurements(10);
        let dst = src.clone();
        let result = GNCRotationSolver::new_tls(0.1).solve(&src, &dst);

        assert_eq!(result.iterations, 1);
        assert!((result.rotation - Matrix3::identity()).norm() < 1e-9);
        assert!(result.cost < 1e-18);
    }
}
