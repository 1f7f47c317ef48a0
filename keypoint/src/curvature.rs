//! Multi-scale curvature keypoints
//!
//! A symmetric finite difference over ±5 neighbours of the depth sequence is
//! evaluated per scan line, treating every channel as a closed ring. Each
//! usable channel is cut into six sub-segments; within a sub-segment the
//! sharpest entries become corners (at most 12) and the flattest become
//! planes, and every accepted keypoint suppresses its close neighbours.

use crate::range_image::{RangeImage, RangeImageConfig};
use kcp_core::PointCloud;
use nalgebra::MatrixXx3;
use serde::{Deserialize, Serialize};
use std::ops::Range;

/// Neighbours considered on each side of an entry.
const CURVATURE_RADIUS: usize = 5;
/// Minimum populated span for a channel to get curvature values.
const MIN_CURVATURE_SPAN: usize = 16;
/// Minimum populated span for a channel to contribute keypoints.
const MIN_FEATURE_SPAN: usize = 21;
const N_SEGMENTS: usize = 6;
const MAX_CORNERS_PER_SEGMENT: usize = 12;
/// Column jump treated as a discontinuity by the suppression walk.
const MAX_COLUMN_GAP: usize = 10;

/// Classification thresholds of [`MultiScaleCurvature`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CurvatureConfig {
    /// Entries whose curvature exceeds this become corner candidates.
    pub corner_threshold: f32,
    /// Entries whose curvature is below this become plane candidates.
    pub plane_threshold: f32,
}

impl Default for CurvatureConfig {
    fn default() -> Self {
        Self {
            corner_threshold: 30.0,
            plane_threshold: 0.1,
        }
    }
}

/// Role of a range-image entry.
///
/// `Occluded` and `Parallel` are part of the vocabulary but the curvature
/// pass never assigns them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Label {
    Undefined,
    Normal,
    Occluded,
    Parallel,
    Corner,
    Plane,
    Ambiguous,
}

impl Label {
    /// Label after a neighbouring keypoint was accepted. Only entries still
    /// open for selection are suppressed.
    pub fn suppressed(self) -> Label {
        match self {
            Label::Normal => Label::Ambiguous,
            Label::Undefined
            | Label::Occluded
            | Label::Parallel
            | Label::Corner
            | Label::Plane
            | Label::Ambiguous => self,
        }
    }
}

/// Curvature magnitude of one sequence entry.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CurvatureEntry {
    pub kappa: f32,
    /// Position of the entry in the range-image sequences.
    pub index: usize,
}

/// Direction of the suppression walk along the sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Left,
    Right,
}

#[derive(Debug, Clone)]
pub struct MultiScaleCurvature {
    range_image: RangeImage,
    config: CurvatureConfig,
    curvature: Vec<CurvatureEntry>,
    labels: Vec<Label>,
    corner_point_indices: Vec<usize>,
    plane_point_indices: Vec<usize>,
    corner_points: MatrixXx3<f64>,
    plane_points: MatrixXx3<f64>,
}

impl MultiScaleCurvature {
    pub fn new(range_image: RangeImage, config: CurvatureConfig) -> Self {
        let len = range_image.sequence_len();
        let mut curvature: Vec<CurvatureEntry> = (0..len)
            .map(|index| CurvatureEntry {
                kappa: f32::MAX,
                index,
            })
            .collect();
        let mut labels = vec![Label::Undefined; len];

        let depth = range_image.depth_sequence();
        for range in range_image.channel_ranges() {
            if range.len() < MIN_CURVATURE_SPAN {
                continue;
            }
            for i in range.clone() {
                curvature[i].kappa = channel_curvature(depth, range, i).abs();
                labels[i] = Label::Normal;
            }
        }

        let columns = range_image.col_indices_sequence();
        let mut corner_sequence = Vec::new();
        let mut plane_sequence = Vec::new();

        for range in range_image.channel_ranges() {
            if range.len() < MIN_FEATURE_SPAN {
                continue;
            }

            for segment in sub_segments(range) {
                let entries = &mut curvature[segment];
                entries.sort_by(|a, b| a.kappa.total_cmp(&b.kappa).then(a.index.cmp(&b.index)));

                let mut accepted = 0;
                for entry in entries.iter().rev() {
                    if labels[entry.index] != Label::Normal || entry.kappa <= config.corner_threshold {
                        continue;
                    }
                    labels[entry.index] = Label::Corner;
                    corner_sequence.push(entry.index);
                    suppress_neighbors(&mut labels, columns, entry.index);

                    accepted += 1;
                    if accepted >= MAX_CORNERS_PER_SEGMENT {
                        break;
                    }
                }

                for entry in entries.iter().rev() {
                    if labels[entry.index] != Label::Normal || entry.kappa >= config.plane_threshold {
                        continue;
                    }
                    labels[entry.index] = Label::Plane;
                    plane_sequence.push(entry.index);
                    suppress_neighbors(&mut labels, columns, entry.index);
                }
            }
        }

        let point_indices = range_image.point_indices_sequence();
        let corner_point_indices: Vec<usize> = corner_sequence.iter().map(|&i| point_indices[i]).collect();
        let plane_point_indices: Vec<usize> = plane_sequence.iter().map(|&i| point_indices[i]).collect();

        let cloud = range_image.cloud();
        let corner_points = cloud.select(&corner_point_indices);
        let plane_points = cloud.select(&plane_point_indices);

        tracing::debug!(
            entries = len,
            corners = corner_point_indices.len(),
            planes = plane_point_indices.len(),
            "multi-scale curvature keypoints extracted"
        );

        Self {
            range_image,
            config,
            curvature,
            labels,
            corner_point_indices,
            plane_point_indices,
            corner_points,
            plane_points,
        }
    }

    /// Project `cloud` and extract keypoints in one go.
    pub fn from_cloud(cloud: &PointCloud<f64>, range_config: RangeImageConfig, config: CurvatureConfig) -> Self {
        Self::new(RangeImage::new(cloud, range_config), config)
    }

    pub fn range_image(&self) -> &RangeImage {
        &self.range_image
    }

    pub fn config(&self) -> &CurvatureConfig {
        &self.config
    }

    /// Curvature working array. Entries of feature channels are sorted by
    /// magnitude within their sub-segment; use [`CurvatureEntry::index`] to
    /// map back to the sequence.
    pub fn curvature(&self) -> &[CurvatureEntry] {
        &self.curvature
    }

    /// Labels indexed by sequence position.
    pub fn labels(&self) -> &[Label] {
        &self.labels
    }

    pub fn corner_points(&self) -> &MatrixXx3<f64> {
        &self.corner_points
    }

    pub fn plane_points(&self) -> &MatrixXx3<f64> {
        &self.plane_points
    }

    /// Indices into the original cloud, row-aligned with [`Self::corner_points`].
    pub fn corner_point_indices(&self) -> &[usize] {
        &self.corner_point_indices
    }

    /// Indices into the original cloud, row-aligned with [`Self::plane_points`].
    pub fn plane_point_indices(&self) -> &[usize] {
        &self.plane_point_indices
    }
}

/// Split a channel range into six contiguous, non-overlapping sub-segments
/// of near-equal size that together cover the whole range.
pub fn sub_segments(range: &Range<usize>) -> [Range<usize>; N_SEGMENTS] {
    let start = range.start;
    let last = range.end.saturating_sub(1).max(start);
    let boundary = |j: usize| {
        if j == N_SEGMENTS {
            range.end.max(start)
        } else {
            (start * (N_SEGMENTS - j) + last * j) / N_SEGMENTS
        }
    };
    std::array::from_fn(|j| boundary(j)..boundary(j + 1))
}

/// Weighted symmetric difference of depth around `i`, wrapping within the
/// channel's own range.
fn channel_curvature(depth: &[f32], range: &Range<usize>, i: usize) -> f32 {
    let len = range.len();
    let local = i - range.start;
    let mut sum = 0.0f32;
    let mut weight = 0.0f32;

    for offset in 1..=CURVATURE_RADIUS {
        let w = 1.0 / offset as f32;
        let left = range.start + (local + len - offset) % len;
        let right = range.start + (local + offset) % len;
        sum += w * (depth[left] + depth[right]);
        weight += w;
    }

    sum - 2.0 * weight * depth[i]
}

/// Mark up to five neighbours on both sides of `center` as ambiguous.
fn suppress_neighbors(labels: &mut [Label], columns: &[usize], center: usize) {
    walk_neighbors(labels, columns, center, Direction::Left);
    walk_neighbors(labels, columns, center, Direction::Right);
}

/// Walk outward from `center` one entry at a time, suppressing each visited
/// entry. The walk stops at the sequence bounds or at the first column jump
/// larger than [`MAX_COLUMN_GAP`].
pub fn walk_neighbors(labels: &mut [Label], columns: &[usize], center: usize, direction: Direction) {
    let mut prev = center;
    for _ in 0..CURVATURE_RADIUS {
        let next = match direction {
            Direction::Left => match prev.checked_sub(1) {
                Some(next) => next,
                None => break,
            },
            Direction::Right => {
                if prev + 1 >= labels.len() {
                    break;
                }
                prev + 1
            }
        };

        if columns[next].abs_diff(columns[prev]) > MAX_COLUMN_GAP {
            break;
        }

        labels[next] = labels[next].suppressed();
        prev = next;
    }
}
