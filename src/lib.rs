//! KCP: k-closest-points LiDAR keypoint registration
//!
//! Re-exports the workspace crates:
//! - [`core`]: point clouds, correspondences, errors
//! - [`keypoint`]: range image projection and curvature keypoints
//! - [`features`]: descriptor index and correspondence generation
//! - [`registration`]: robust registration backends and the [`Kcp`] orchestrator

pub use kcp_core as core;
pub use kcp_features as features;
pub use kcp_keypoint as keypoint;
pub use kcp_registration as registration;

pub use kcp_core::{Correspondences, Error, PointCloud, Result};
pub use kcp_features::{get_kcp_correspondences, CorrespondenceFinder};
pub use kcp_keypoint::{MultiScaleCurvature, RangeImage};
pub use kcp_registration::{Kcp, KcpParams, KcpResult, RobustRegistration, TeaserSolver};

/// Initialize a single global Rayon thread pool for all CPU-parallel routines.
///
/// Call this once at application startup before registering clouds.
/// Repeated calls are idempotent and return the first initialization result.
///
/// Priority order:
/// 1. explicit `num_threads`
/// 2. `KCP_CPU_THREADS` env var
/// 3. Rayon default
pub fn init_thread_pool(num_threads: Option<usize>) -> Result<()> {
    kcp_core::init_global_thread_pool(num_threads)
}
