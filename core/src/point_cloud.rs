use nalgebra::{MatrixXx3, Point3, Scalar};

/// An ordered set of 3D points with optional per-point intensity.
///
/// Point order is significant: downstream stages report features by their
/// index into `points`.
#[derive(Debug, Clone, Default)]
pub struct PointCloud<T: Scalar = f64> {
    pub points: Vec<Point3<T>>,
    pub intensities: Option<Vec<T>>,
}

impl<T: Scalar> PointCloud<T> {
    pub fn new(points: Vec<Point3<T>>) -> Self {
        Self {
            points,
            intensities: None,
        }
    }

    /// Build a cloud from a dense row-major `[x0, y0, z0, x1, ...]` buffer.
    pub fn from_row_major(buffer: &[T]) -> crate::Result<Self> {
        if buffer.len() % 3 != 0 {
            return Err(crate::Error::InvalidInput(format!(
                "Row-major buffer length {} is not a multiple of 3",
                buffer.len()
            )));
        }

        let points = buffer
            .chunks_exact(3)
            .map(|xyz| Point3::new(xyz[0].clone(), xyz[1].clone(), xyz[2].clone()))
            .collect();
        Ok(Self::new(points))
    }

    /// Build a cloud from an N×3 position matrix.
    pub fn from_matrix(matrix: &MatrixXx3<T>) -> Self {
        let points = matrix
            .row_iter()
            .map(|row| Point3::new(row[0].clone(), row[1].clone(), row[2].clone()))
            .collect();
        Self::new(points)
    }

    pub fn with_intensities(mut self, intensities: Vec<T>) -> crate::Result<Self> {
        if intensities.len() == self.points.len() {
            self.intensities = Some(intensities);
            Ok(self)
        } else {
            Err(crate::Error::InvalidInput(format!(
                "Intensity count {} does not match point count {}",
                intensities.len(),
                self.points.len()
            )))
        }
    }

    /// Copy the positions into an N×3 matrix, one row per point.
    pub fn to_matrix(&self) -> MatrixXx3<T> {
        MatrixXx3::from_fn(self.points.len(), |r, c| self.points[r][c].clone())
    }

    /// Gather the rows for `indices` into an N×3 matrix, in the given order.
    pub fn select(&self, indices: &[usize]) -> MatrixXx3<T> {
        MatrixXx3::from_fn(indices.len(), |r, c| self.points[indices[r]][c].clone())
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}
