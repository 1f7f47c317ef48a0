//! Point cloud registration from k-closest-points correspondences
//!
//! This crate provides:
//! - [`RobustRegistration`]: capability trait for outlier-robust rigid registration
//! - [`TeaserSolver`]: max clique pruning, GNC rotation and voted translation
//! - [`Kcp`]: the orchestrator pairing keypoints and calling a backend

pub mod kcp;
pub mod solver;
pub mod teaser;

pub use kcp::{Kcp, KcpParams, KcpResult};
pub use solver::{RegistrationSolution, RobustRegistration};
pub use teaser::{RotationEstimationAlgorithm, TeaserParams, TeaserSolver};

pub use kcp_core::{Error, Result};
