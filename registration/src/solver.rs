use kcp_core::{Correspondences, Result};
use nalgebra::{Matrix3, Matrix4, Vector3};

/// Rigid transform estimated from correspondences, plus the correspondences
/// the estimator trusted.
#[derive(Debug, Clone, PartialEq)]
pub struct RegistrationSolution {
    pub rotation: Matrix3<f64>,
    pub translation: Vector3<f64>,
    /// Indices into the correspondence set, ascending.
    pub inlier_indices: Vec<usize>,
}

impl RegistrationSolution {
    /// Homogeneous 4×4 form of the rigid transform.
    pub fn transformation(&self) -> Matrix4<f64> {
        let mut transformation = Matrix4::identity();
        transformation
            .fixed_view_mut::<3, 3>(0, 0)
            .copy_from(&self.rotation);
        transformation
            .fixed_view_mut::<3, 1>(0, 3)
            .copy_from(&self.translation);
        transformation
    }
}

/// Outlier-robust rigid registration from putative correspondences.
pub trait RobustRegistration {
    fn solve(&self, correspondences: &Correspondences) -> Result<RegistrationSolution>;
}
