//! Descriptor matching for the KCP pipeline
//!
//! - [`FlannIndex`]: randomized kd-forest over real-valued descriptors
//! - [`CorrespondenceFinder`]: k-closest-points correspondences between two clouds

pub mod correspondence;
pub mod flann;

pub use correspondence::*;
pub use flann::{FlannIndex, FlannParams};
pub use kcp_core::{Error, Result};
