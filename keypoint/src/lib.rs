//! LiDAR keypoint extraction
//!
//! This crate turns an unordered point cloud into scan-line keypoints:
//! - [`RangeImage`]: spherical projection into channel-ordered sequences
//! - [`MultiScaleCurvature`]: curvature per entry and corner/plane selection

pub mod curvature;
pub mod range_image;

pub use curvature::{CurvatureConfig, CurvatureEntry, Direction, Label, MultiScaleCurvature};
pub use range_image::{RangeImage, RangeImageConfig};
