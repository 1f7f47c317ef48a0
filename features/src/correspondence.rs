//! k-closest-points correspondences
//!
//! Every source point is paired with the target points whose descriptors are
//! closest to its own. When `k` covers the whole target set the pairing is the
//! full cross product.

use crate::flann::{FlannIndex, FlannParams};
use kcp_core::{Correspondences, Error, Result};
use nalgebra::{DMatrix, MatrixXx3};
use serde::{Deserialize, Serialize};

/// Generates k-closest-points correspondences in descriptor space.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CorrespondenceFinder {
    /// Target neighbors per source point.
    pub k: usize,
    pub flann: FlannParams,
}

impl Default for CorrespondenceFinder {
    fn default() -> Self {
        Self {
            k: 2,
            flann: FlannParams::default(),
        }
    }
}

impl CorrespondenceFinder {
    pub fn new(k: usize) -> Self {
        Self {
            k,
            ..Default::default()
        }
    }

    pub fn with_flann(mut self, flann: FlannParams) -> Self {
        self.flann = flann;
        self
    }

    /// Pair each source point with its `k` closest targets in descriptor space.
    ///
    /// Output is source-major. Within one source point, targets follow
    /// ascending descriptor distance (ties by ascending target index), or
    /// ascending target index for the cross product. The output holds
    /// exactly `src.nrows() * min(k, dst.nrows())` pairs.
    pub fn find(
        &self,
        src: &MatrixXx3<f64>,
        dst: &MatrixXx3<f64>,
        src_feature: &DMatrix<f64>,
        dst_feature: &DMatrix<f64>,
    ) -> Result<Correspondences> {
        if src_feature.ncols() != dst_feature.ncols() {
            return Err(Error::DimensionMismatch(format!(
                "Incompatible descriptor dimensions: source {} vs target {}",
                src_feature.ncols(),
                dst_feature.ncols()
            )));
        }
        if src.nrows() != src_feature.nrows() {
            return Err(Error::DimensionMismatch(format!(
                "Source has {} points but {} descriptors",
                src.nrows(),
                src_feature.nrows()
            )));
        }
        if dst.nrows() != dst_feature.nrows() {
            return Err(Error::DimensionMismatch(format!(
                "Target has {} points but {} descriptors",
                dst.nrows(),
                dst_feature.nrows()
            )));
        }

        let n_dst = dst.nrows();
        let pairs: Vec<(usize, usize)> = if self.k >= n_dst {
            (0..src.nrows())
                .flat_map(|s| (0..n_dst).map(move |t| (s, t)))
                .collect()
        } else {
            let index = FlannIndex::build(dst_feature, self.flann);
            index
                .knn_search(src_feature, self.k)
                .into_iter()
                .enumerate()
                .flat_map(|(s, neighbors)| neighbors.into_iter().map(move |(t, _)| (s, t)))
                .collect()
        };

        tracing::debug!(
            source = src.nrows(),
            target = n_dst,
            k = self.k,
            correspondences = pairs.len(),
            "k-closest-points correspondences generated"
        );

        Ok(Correspondences::from_index_pairs(src, dst, &pairs))
    }
}

/// Correspondences between `src` and `dst` from their `k` closest descriptors.
///
/// Uses [`FlannParams::default`], whose `checks` is `None`, so the search is
/// exact. Build a [`CorrespondenceFinder`] with explicit `checks` for an
/// approximate search.
pub fn get_kcp_correspondences(
    src: &MatrixXx3<f64>,
    dst: &MatrixXx3<f64>,
    src_feature: &DMatrix<f64>,
    dst_feature: &DMatrix<f64>,
    k: usize,
) -> Result<Correspondences> {
    CorrespondenceFinder::new(k).find(src, dst, src_feature, dst_feature)
}
