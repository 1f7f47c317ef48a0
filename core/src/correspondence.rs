use nalgebra::{Matrix3xX, MatrixXx3};

/// Point-to-point correspondences between a source and a target cloud.
///
/// Column `i` of `source_points` is paired with column `i` of
/// `target_points`; `source_indices[i]` and `target_indices[i]` are the row
/// indices those positions were taken from.
#[derive(Debug, Clone, PartialEq)]
pub struct Correspondences {
    pub source_points: Matrix3xX<f64>,
    pub target_points: Matrix3xX<f64>,
    pub source_indices: Vec<usize>,
    pub target_indices: Vec<usize>,
}

impl Correspondences {
    pub fn empty() -> Self {
        Self {
            source_points: Matrix3xX::zeros(0),
            target_points: Matrix3xX::zeros(0),
            source_indices: Vec::new(),
            target_indices: Vec::new(),
        }
    }

    /// Materialize correspondences from `(source_row, target_row)` pairs.
    ///
    /// Pair order is preserved. Every index must be a valid row of its
    /// matrix.
    pub fn from_index_pairs(
        source: &MatrixXx3<f64>,
        target: &MatrixXx3<f64>,
        pairs: &[(usize, usize)],
    ) -> Self {
        let source_points = Matrix3xX::from_fn(pairs.len(), |r, c| source[(pairs[c].0, r)]);
        let target_points = Matrix3xX::from_fn(pairs.len(), |r, c| target[(pairs[c].1, r)]);
        let (source_indices, target_indices) = pairs.iter().copied().unzip();

        Self {
            source_points,
            target_points,
            source_indices,
            target_indices,
        }
    }

    /// Keep only the correspondences at `indices`, in the given order.
    pub fn select(&self, indices: &[usize]) -> Self {
        Self {
            source_points: self.source_points.select_columns(indices),
            target_points: self.target_points.select_columns(indices),
            source_indices: indices.iter().map(|&i| self.source_indices[i]).collect(),
            target_indices: indices.iter().map(|&i| self.target_indices[i]).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.source_indices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.source_indices.is_empty()
    }
}

impl Default for Correspondences {
    fn default() -> Self {
        Self::empty()
    }
}
