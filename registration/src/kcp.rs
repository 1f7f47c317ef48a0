//! k-closest-points registration
//!
//! Keypoints of both clouds are paired with their `k` closest neighbors in
//! descriptor space and the putative correspondences go to a robust
//! registration backend, which rejects the outliers.

use crate::solver::RobustRegistration;
use crate::teaser::{TeaserParams, TeaserSolver};
use kcp_core::{Correspondences, Result};
use kcp_features::{CorrespondenceFinder, FlannParams};
use nalgebra::{DMatrix, Matrix4, MatrixXx3};
use serde::{Deserialize, Serialize};

/// Configuration of the default [`Kcp`] pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct KcpParams {
    /// Closest points considered per source point.
    pub k: usize,
    pub teaser: TeaserParams,
    pub flann: FlannParams,
}

impl Default for KcpParams {
    fn default() -> Self {
        Self {
            k: 2,
            teaser: TeaserParams::default(),
            flann: FlannParams::default(),
        }
    }
}

/// Outcome of [`Kcp::solve`].
#[derive(Debug, Clone)]
pub struct KcpResult {
    /// Source-to-target rigid transform.
    pub transformation: Matrix4<f64>,
    /// Putative correspondences handed to the solver.
    pub initial_correspondences: Correspondences,
    /// Indices into `initial_correspondences` the solver kept as inliers.
    pub inlier_correspondence_indices: Vec<usize>,
}

impl KcpResult {
    /// The inlier subset of the initial correspondences.
    pub fn inlier_correspondences(&self) -> Correspondences {
        self.initial_correspondences
            .select(&self.inlier_correspondence_indices)
    }
}

/// Registration orchestrator: k-closest-points correspondences followed by
/// a robust registration backend.
#[derive(Debug, Clone)]
pub struct Kcp<S: RobustRegistration = TeaserSolver> {
    finder: CorrespondenceFinder,
    solver: S,
}

impl Kcp<TeaserSolver> {
    pub fn new(params: KcpParams) -> Self {
        Self {
            finder: CorrespondenceFinder::new(params.k).with_flann(params.flann),
            solver: TeaserSolver::new(params.teaser),
        }
    }
}

impl Default for Kcp<TeaserSolver> {
    fn default() -> Self {
        Self::new(KcpParams::default())
    }
}

impl<S: RobustRegistration> Kcp<S> {
    /// Pipeline with a custom registration backend.
    pub fn with_solver(finder: CorrespondenceFinder, solver: S) -> Self {
        Self { finder, solver }
    }

    pub fn finder(&self) -> &CorrespondenceFinder {
        &self.finder
    }

    pub fn solver(&self) -> &S {
        &self.solver
    }

    /// Estimate the rigid transform aligning `src` onto `dst`.
    ///
    /// `src_feature` and `dst_feature` hold one descriptor row per point.
    /// Descriptor shape errors and backend failures are returned unchanged.
    pub fn solve(
        &self,
        src: &MatrixXx3<f64>,
        dst: &MatrixXx3<f64>,
        src_feature: &DMatrix<f64>,
        dst_feature: &DMatrix<f64>,
    ) -> Result<KcpResult> {
        let initial_correspondences = self.finder.find(src, dst, src_feature, dst_feature)?;
        let solution = self.solver.solve(&initial_correspondences)?;

        tracing::debug!(
            correspondences = initial_correspondences.len(),
            inliers = solution.inlier_indices.len(),
            "KCP registration finished"
        );

        Ok(KcpResult {
            transformation: solution.transformation(),
            inlier_correspondence_indices: solution.inlier_indices,
            initial_correspondences,
        })
    }
}
