//! TEASER-style robust registration
//!
//! The solver decouples the rigid transform estimation:
//! 1. prune correspondences to the maximum clique of the pairwise
//!    consistency graph,
//! 2. estimate rotation from translation-invariant measurements of the
//!    clique with GNC,
//! 3. vote the translation per axis.
//!
//! Based on "TEASER: Fast and Certifiable Point Cloud Registration" by Yang et al.

pub mod gnc;
pub mod max_clique;
pub mod voting;

pub use gnc::{weighted_svd_rotation, GNCRotationResult, GNCRotationSolver};
pub use max_clique::{find_max_clique, ConsistencyGraph, MaxCliqueOptions};
pub use voting::{adaptive_voting, estimate_translation};

use crate::solver::{RegistrationSolution, RobustRegistration};
use kcp_core::{Correspondences, Error, Result};
use nalgebra::Matrix3xX;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Fewest correspondences that constrain a rigid transform.
const MIN_CORRESPONDENCES: usize = 3;

/// Robust loss used by the rotation stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RotationEstimationAlgorithm {
    /// GNC with truncated least squares
    GncTls,
    /// GNC with Geman-McClure, as in Fast Global Registration
    Fgr,
}

/// Configuration of [`TeaserSolver`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TeaserParams {
    /// Bound on the distance noise of inlier correspondences.
    pub noise_bound: f64,
    /// Square of the ratio between the inlier threshold and `noise_bound`.
    pub cbar2: f64,
    pub rotation_gnc_factor: f64,
    pub rotation_estimation_algorithm: RotationEstimationAlgorithm,
    pub rotation_max_iterations: usize,
    pub rotation_cost_threshold: f64,
    pub kcore_heuristic_threshold: f64,
    /// Prune to the maximum clique before estimating the transform.
    pub use_max_clique: bool,
    pub max_clique_exact_solution: bool,
    /// Wall-clock budget of the exact max clique search, in seconds.
    pub max_clique_time_limit: f64,
}

impl Default for TeaserParams {
    fn default() -> Self {
        Self {
            noise_bound: 0.06,
            cbar2: 1.0,
            rotation_gnc_factor: 1.4,
            rotation_estimation_algorithm: RotationEstimationAlgorithm::GncTls,
            rotation_max_iterations: 100,
            rotation_cost_threshold: 1e-6,
            kcore_heuristic_threshold: 0.5,
            use_max_clique: true,
            max_clique_exact_solution: true,
            max_clique_time_limit: 3600.0,
        }
    }
}

impl TeaserParams {
    fn max_clique_options(&self) -> MaxCliqueOptions {
        let time_limit = if self.max_clique_time_limit > 0.0 {
            Duration::try_from_secs_f64(self.max_clique_time_limit).unwrap_or(Duration::MAX)
        } else {
            Duration::ZERO
        };

        MaxCliqueOptions {
            exact: self.max_clique_exact_solution,
            kcore_heuristic_threshold: self.kcore_heuristic_threshold,
            time_limit,
        }
    }

    fn rotation_solver(&self) -> GNCRotationSolver {
        // Measurements are differences of two points, each carrying noise
        let bound = 2.0 * self.noise_bound * self.cbar2.sqrt();
        let base = match self.rotation_estimation_algorithm {
            RotationEstimationAlgorithm::GncTls => GNCRotationSolver::new_tls(bound),
            RotationEstimationAlgorithm::Fgr => GNCRotationSolver::new_geman_mcclure(bound),
        };

        GNCRotationSolver {
            gnc_factor: self.rotation_gnc_factor,
            max_iterations: self.rotation_max_iterations,
            cost_threshold: self.rotation_cost_threshold,
            ..base
        }
    }
}

/// Max-clique pruned, GNC rotation and voted translation registration.
#[derive(Debug, Clone, Default)]
pub struct TeaserSolver {
    pub params: TeaserParams,
}

impl TeaserSolver {
    pub fn new(params: TeaserParams) -> Self {
        Self { params }
    }

    /// Indices of the correspondences kept by the pruning stage, ascending.
    pub fn prune(&self, correspondences: &Correspondences) -> Vec<usize> {
        if !self.params.use_max_clique {
            return (0..correspondences.len()).collect();
        }
        let graph = ConsistencyGraph::from_correspondences(correspondences, self.params.noise_bound);
        find_max_clique(&graph, &self.params.max_clique_options())
    }
}

impl RobustRegistration for TeaserSolver {
    fn solve(&self, correspondences: &Correspondences) -> Result<RegistrationSolution> {
        if correspondences.source_points.ncols() != correspondences.target_points.ncols() {
            return Err(Error::DimensionMismatch(format!(
                "{} source points vs {} target points",
                correspondences.source_points.ncols(),
                correspondences.target_points.ncols()
            )));
        }
        if correspondences.len() < MIN_CORRESPONDENCES {
            return Err(Error::InsufficientCorrespondences {
                required: MIN_CORRESPONDENCES,
                found: correspondences.len(),
            });
        }

        let inliers = self.prune(correspondences);
        if inliers.len() < MIN_CORRESPONDENCES {
            return Err(Error::InsufficientCorrespondences {
                required: MIN_CORRESPONDENCES,
                found: inliers.len(),
            });
        }

        let pruned = correspondences.select(&inliers);
        let (src_tims, dst_tims) = translation_invariant_measurements(&pruned);

        let rotation = self.params.rotation_solver().solve(&src_tims, &dst_tims).rotation;
        let translation = estimate_translation(
            &pruned.source_points,
            &pruned.target_points,
            &rotation,
            self.params.noise_bound * self.params.cbar2.sqrt(),
        );

        tracing::debug!(
            correspondences = correspondences.len(),
            inliers = inliers.len(),
            measurements = src_tims.ncols(),
            "TEASER registration solved"
        );

        Ok(RegistrationSolution {
            rotation,
            translation,
            inlier_indices: inliers,
        })
    }
}

/// Pairwise differences `p_j − p_i` for all `i < j`, on both sides.
fn translation_invariant_measurements(correspondences: &Correspondences) -> (Matrix3xX<f64>, Matrix3xX<f64>) {
    let n = correspondences.len();
    let pairs: Vec<(usize, usize)> = (0..n)
        .flat_map(|i| ((i + 1)..n).map(move |j| (i, j)))
        .collect();

    let src = &correspondences.source_points;
    let dst = &correspondences.target_points;
    let src_tims = Matrix3xX::from_fn(pairs.len(), |r, c| src[(r, pairs[c].1)] - src[(r, pairs[c].0)]);
    let dst_tims = Matrix3xX::from_fn(pairs.len(), |r, c| dst[(r, pairs[c].1)] - dst[(r, pairs[c].0)]);
    (src_tims, dst_tims)
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::{MatrixXx3, Rotation3, Vector3};

    fn cube_correspondences() -> Correspondences {
        let src = MatrixXx3::from_row_slice(&[
            0.0, 0.0, 0.0, //
            1.0, 0.0, 0.0, //
            0.0, 2.0, 0.0, //
            0.0, 0.0, 3.0, //
            1.0, 2.0, 3.0, //
        ]);
        let rotation = Rotation3::from_euler_angles(0.3, 0.0, -0.2);
        let t = Vector3::new(0.5, 0.0, -1.0);
        let dst = MatrixXx3::from_fn(5, |r, c| {
            let p = Vector3::new(src[(r, 0)], src[(r, 1)], src[(r, 2)]);
            (rotation * p + t)[c]
        });
        let pairs: Vec<(usize, usize)> = (0..5).map(|i| (i, i)).collect();
        Correspondences::from_index_pairs(&src, &dst, &pairs)
    }

    #[test]
    fn test_too_few_correspondences() {
        let corr = cube_correspondences().select(&[0, 1]);
        let result = TeaserSolver::default().solve(&corr);
        assert!(matches!(
            result,
            Err(Error::InsufficientCorrespondences { required: 3, found: 2 })
        ));
    }

    #[test]
    fn test_translation_invariant_measurements() {
        let corr = cube_correspondences();
        let (src, dst) = translation_invariant_measurements(&corr);
        assert_eq!(src.ncols(), 10);
        assert_eq!(dst.ncols(), 10);
        // Second pair is (0, 2)
        assert_eq!(src.column(1).as_slice(), &[0.0, 2.0, 0.0]);
    }

    #[test]
    fn test_noise_free_solution() {
        let corr = cube_correspondences();
        let solution = TeaserSolver::default().solve(&corr).unwrap();

        let expected = Rotation3::from_euler_angles(0.3, 0.0, -0.2).into_inner();
        assert!((solution.rotation - expected).norm() < 1e-6);
        assert!((solution.translation - Vector3::new(0.5, 0.0, -1.0)).norm() < 1e-6);
        assert_eq!(solution.inlier_indices, vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn test_params_serde_defaults() {
        let params: TeaserParams =
            serde_json::from_str(r#"{"noise_bound": 0.1, "rotation_estimation_algorithm": "Fgr"}"#).unwrap();
        assert_eq!(params.noise_bound, 0.1);
        assert_eq!(params.rotation_estimation_algorithm, RotationEstimationAlgorithm::Fgr);
        assert_eq!(params.rotation_max_iterations, 100);
        assert!(params.use_max_clique);
    }
}
