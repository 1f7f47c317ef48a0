//! Core types shared by the KCP crates.
//!
//! - [`PointCloud`]: caller-owned input cloud
//! - [`Correspondences`]: paired source/target positions and indices
//! - [`RobustLoss`]: loss kernels with graduated non-convexity schedules
//! - [`Error`] / [`Result`]: the error type used across the workspace

pub mod correspondence;
pub mod error;
pub mod point_cloud;
pub mod robust_loss;
pub mod runtime;

pub use correspondence::*;
pub use error::*;
pub use point_cloud::*;
pub use robust_loss::*;
pub use runtime::*;
