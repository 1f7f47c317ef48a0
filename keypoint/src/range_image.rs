//! Spherical range image of a LiDAR point cloud
//!
//! Each point is assigned to a (channel, column) cell from its vertical and
//! horizontal angles. The first point that lands in a cell keeps it. Populated
//! cells are then flattened channel by channel, in increasing column order,
//! into three parallel sequences (depth, original point index, column).

use kcp_core::PointCloud;
use nalgebra::Point3;
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;
use std::ops::Range;

/// Projection parameters of a [`RangeImage`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RangeImageConfig {
    /// Number of channels (image height), usually the number of LiDAR beams.
    pub n_channels: usize,
    /// Lower edge of the vertical field of view, in degrees.
    pub min_vfov_deg: f64,
    /// Upper edge of the vertical field of view, in degrees.
    pub max_vfov_deg: f64,
    /// Number of columns covering the 360° horizontal field of view.
    pub hfov_resolution: usize,
}

impl Default for RangeImageConfig {
    fn default() -> Self {
        Self {
            n_channels: 32,
            min_vfov_deg: -30.0,
            max_vfov_deg: 10.0,
            hfov_resolution: 1800,
        }
    }
}

impl RangeImageConfig {
    pub fn new(n_channels: usize, min_vfov_deg: f64, max_vfov_deg: f64, hfov_resolution: usize) -> Self {
        Self {
            n_channels,
            min_vfov_deg,
            max_vfov_deg,
            hfov_resolution,
        }
    }

    /// Channel (row) of a point. Points outside the vertical field of view
    /// are clamped into the nearest edge channel.
    ///
    /// Returns `None` only when the image has no channels.
    pub fn channel_of(&self, point: &Point3<f64>) -> Option<usize> {
        if self.n_channels == 0 {
            return None;
        }

        let delta = (self.max_vfov_deg - self.min_vfov_deg).to_radians() / self.n_channels as f64;
        let base = self.min_vfov_deg.to_radians();
        let phi = point.z.atan2(point.x.hypot(point.y));

        let raw = ((phi - base) / delta).floor();
        let last = (self.n_channels - 1) as f64;
        // NaN (degenerate field of view) falls into channel 0
        let channel = if raw.is_nan() { 0.0 } else { raw.max(0.0).min(last) };
        Some(channel as usize)
    }

    /// Column of a point within the 360° horizontal field of view.
    ///
    /// Returns `None` only when the horizontal resolution is zero.
    pub fn column_of(&self, point: &Point3<f64>) -> Option<usize> {
        if self.hfov_resolution == 0 {
            return None;
        }

        let theta = (point.y.atan2(point.x) + PI).max(0.0);
        let column = (theta * self.hfov_resolution as f64 / (2.0 * PI)).floor() as usize;
        Some(column % self.hfov_resolution)
    }

    /// (channel, column) cell of a point.
    pub fn project(&self, point: &Point3<f64>) -> Option<(usize, usize)> {
        Some((self.channel_of(point)?, self.column_of(point)?))
    }
}

/// A range image of a point cloud based on the spherical projection.
///
/// The image owns a copy of the cloud, so it stays valid independently of
/// the caller's buffer.
#[derive(Debug, Clone)]
pub struct RangeImage {
    cloud: PointCloud<f64>,
    config: RangeImageConfig,
    /// Row-major `n_channels × hfov_resolution` grid of raw point indices.
    image_indices: Vec<Option<usize>>,
    depth_sequence: Vec<f32>,
    point_indices_sequence: Vec<usize>,
    col_indices_sequence: Vec<usize>,
    channel_ranges: Vec<Range<usize>>,
}

impl RangeImage {
    /// Project `cloud` into a range image.
    ///
    /// Never fails: an empty cloud or a zero-sized image yields empty
    /// sequences.
    pub fn new(cloud: &PointCloud<f64>, config: RangeImageConfig) -> Self {
        let width = config.hfov_resolution;
        let mut image_indices = vec![None; config.n_channels * width];

        for (idx, point) in cloud.points.iter().enumerate() {
            if let Some((channel, column)) = config.project(point) {
                let cell = &mut image_indices[channel * width + column];
                if cell.is_none() {
                    *cell = Some(idx);
                }
            }
        }

        let populated = image_indices.iter().filter(|cell| cell.is_some()).count();
        let mut depth_sequence = Vec::with_capacity(populated);
        let mut point_indices_sequence = Vec::with_capacity(populated);
        let mut col_indices_sequence = Vec::with_capacity(populated);
        let mut channel_ranges = Vec::with_capacity(config.n_channels);

        for channel in 0..config.n_channels {
            let start = point_indices_sequence.len();
            let row = &image_indices[channel * width..(channel + 1) * width];

            for (column, cell) in row.iter().enumerate() {
                if let Some(idx) = *cell {
                    point_indices_sequence.push(idx);
                    depth_sequence.push(cloud.points[idx].coords.norm() as f32);
                    col_indices_sequence.push(column);
                }
            }

            channel_ranges.push(start..point_indices_sequence.len());
        }

        tracing::debug!(
            points = cloud.len(),
            populated,
            channels = config.n_channels,
            "range image projected"
        );

        Self {
            cloud: cloud.clone(),
            config,
            image_indices,
            depth_sequence,
            point_indices_sequence,
            col_indices_sequence,
            channel_ranges,
        }
    }

    pub fn cloud(&self) -> &PointCloud<f64> {
        &self.cloud
    }

    pub fn config(&self) -> &RangeImageConfig {
        &self.config
    }

    pub fn n_channels(&self) -> usize {
        self.config.n_channels
    }

    /// Number of populated cells, i.e. the length of every sequence.
    pub fn sequence_len(&self) -> usize {
        self.depth_sequence.len()
    }

    /// Raw point index stored at a cell, if the cell is populated.
    pub fn cell(&self, channel: usize, column: usize) -> Option<usize> {
        if channel >= self.config.n_channels || column >= self.config.hfov_resolution {
            return None;
        }
        self.image_indices[channel * self.config.hfov_resolution + column]
    }

    /// The whole index grid, row-major by channel.
    pub fn image_indices(&self) -> &[Option<usize>] {
        &self.image_indices
    }

    /// Depths of populated cells ordered by channel, then column.
    pub fn depth_sequence(&self) -> &[f32] {
        &self.depth_sequence
    }

    /// Raw point indices of populated cells ordered by channel, then column.
    pub fn point_indices_sequence(&self) -> &[usize] {
        &self.point_indices_sequence
    }

    /// Column indices of populated cells ordered by channel, then column.
    pub fn col_indices_sequence(&self) -> &[usize] {
        &self.col_indices_sequence
    }

    /// Sequence range occupied by `channel`, or `None` past the last channel.
    /// Empty channels yield an empty range positioned where the channel would
    /// start.
    pub fn channel_range(&self, channel: usize) -> Option<Range<usize>> {
        self.channel_ranges.get(channel).cloned()
    }

    pub fn channel_ranges(&self) -> &[Range<usize>] {
        &self.channel_ranges
    }
}
