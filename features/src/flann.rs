//! FLANN-style nearest neighbor search over real-valued descriptors
//!
//! The index is a forest of randomized kd-trees. With `checks` unset a single
//! tree is built and searched exhaustively with branch-and-bound, which gives
//! exact k-nearest neighbors. With `checks` set, every tree is searched
//! best-bin-first until that many descriptors have been compared.

use nalgebra::DMatrix;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashSet};

/// Number of highest-spread dimensions a randomized tree picks its split from.
const RANDOM_DIM_CANDIDATES: usize = 5;

/// Construction and search parameters of a [`FlannIndex`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FlannParams {
    /// Number of randomized trees (only used by approximate search).
    pub num_trees: usize,
    /// Maximum number of descriptors stored in a leaf.
    pub leaf_size: usize,
    /// Descriptor comparisons per query. `None` searches exactly.
    pub checks: Option<usize>,
}

impl Default for FlannParams {
    fn default() -> Self {
        Self {
            num_trees: 1,
            leaf_size: 10,
            checks: None,
        }
    }
}

impl FlannParams {
    /// Set the number of checks during search (trade-off between speed and accuracy)
    pub fn with_checks(mut self, checks: usize) -> Self {
        self.checks = Some(checks);
        self
    }

    pub fn with_trees(mut self, num_trees: usize) -> Self {
        self.num_trees = num_trees;
        self
    }
}

/// Nearest neighbor index over the rows of a descriptor matrix
#[derive(Debug, Clone)]
pub struct FlannIndex {
    params: FlannParams,
    trees: Vec<KdTreeNode>,
    /// Row-major copy of the indexed descriptors.
    points: Vec<f64>,
    n: usize,
    dim: usize,
}

/// KD-Tree node for spatial partitioning
#[derive(Debug, Clone)]
enum KdTreeNode {
    Leaf(Vec<usize>),
    Internal {
        dimension: usize,
        threshold: f64,
        left: Box<KdTreeNode>,
        right: Box<KdTreeNode>,
    },
}

/// Candidate neighbor, ordered by distance then index
#[derive(Debug, Clone, Copy)]
struct SearchResult {
    index: usize,
    distance: f64,
}

impl Ord for SearchResult {
    fn cmp(&self, other: &Self) -> Ordering {
        self.distance
            .total_cmp(&other.distance)
            .then(self.index.cmp(&other.index))
    }
}

impl PartialOrd for SearchResult {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for SearchResult {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for SearchResult {}

/// Unexplored subtree with a lower bound on its distance, popped closest first
struct Branch<'a> {
    node: &'a KdTreeNode,
    bound: f64,
}

impl Ord for Branch<'_> {
    fn cmp(&self, other: &Self) -> Ordering {
        other.bound.total_cmp(&self.bound) // Reverse for min-heap
    }
}

impl PartialOrd for Branch<'_> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for Branch<'_> {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Branch<'_> {}

/// Bounded max-heap of the best `k` candidates seen so far
struct KnnResults {
    k: usize,
    heap: BinaryHeap<SearchResult>,
}

impl KnnResults {
    fn new(k: usize) -> Self {
        Self {
            k,
            heap: BinaryHeap::with_capacity(k + 1),
        }
    }

    fn is_full(&self) -> bool {
        self.heap.len() >= self.k
    }

    /// Whether a subtree at `bound` may still hold a better (or tied) candidate.
    fn admits(&self, bound: f64) -> bool {
        !self.is_full() || self.heap.peek().map_or(true, |worst| bound <= worst.distance)
    }

    fn push(&mut self, candidate: SearchResult) {
        if !self.is_full() {
            self.heap.push(candidate);
        } else if self.heap.peek().map_or(false, |worst| candidate < *worst) {
            self.heap.pop();
            self.heap.push(candidate);
        }
    }

    fn into_sorted(self) -> Vec<(usize, f64)> {
        self.heap
            .into_sorted_vec()
            .into_iter()
            .map(|sr| (sr.index, sr.distance))
            .collect()
    }
}

impl FlannIndex {
    /// Build the index over the rows of `descriptors`
    pub fn build(descriptors: &DMatrix<f64>, params: FlannParams) -> Self {
        let dim = descriptors.ncols();
        let n = descriptors.nrows();
        let mut points = Vec::with_capacity(n * dim);
        for row in descriptors.row_iter() {
            points.extend(row.iter().copied());
        }

        let num_trees = match params.checks {
            None => 1,
            Some(_) => params.num_trees.max(1),
        };

        let mut index = Self {
            params,
            trees: Vec::with_capacity(num_trees),
            points,
            n,
            dim,
        };

        let indices: Vec<usize> = (0..n).collect();
        for tree_id in 0..num_trees {
            let mut rng = StdRng::seed_from_u64(tree_id as u64);
            let root = index.build_recursive(&indices, tree_id, &mut rng);
            index.trees.push(root);
        }

        tracing::debug!(points = n, dim, trees = num_trees, "descriptor index built");
        index
    }

    pub fn params(&self) -> &FlannParams {
        &self.params
    }

    /// Number of indexed descriptors. Zero-length descriptors still count.
    pub fn len(&self) -> usize {
        self.n
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn point(&self, index: usize) -> &[f64] {
        &self.points[index * self.dim..(index + 1) * self.dim]
    }

    fn build_recursive(&self, indices: &[usize], tree_id: usize, rng: &mut StdRng) -> KdTreeNode {
        let leaf_size = self.params.leaf_size.max(1);
        if indices.len() <= leaf_size || self.dim == 0 {
            return KdTreeNode::Leaf(indices.to_vec());
        }

        // Per-dimension (spread, min, max) over this subset
        let mut extents: Vec<(f64, f64, f64, usize)> = (0..self.dim)
            .map(|d| {
                let (min, max) = indices.iter().fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &i| {
                    let v = self.point(i)[d];
                    (lo.min(v), hi.max(v))
                });
                (max - min, min, max, d)
            })
            .collect();
        extents.sort_by(|a, b| b.0.total_cmp(&a.0).then(a.3.cmp(&b.3)));

        // Tree 0 always splits on the widest dimension, the others randomize
        let splittable = extents.iter().take_while(|e| e.0 > 0.0).count();
        let candidates = splittable.clamp(1, RANDOM_DIM_CANDIDATES);
        let (spread, min, max, dimension) = if tree_id == 0 {
            extents[0]
        } else {
            *extents[..candidates].choose(rng).unwrap_or(&extents[0])
        };

        if !(spread > 0.0) {
            return KdTreeNode::Leaf(indices.to_vec());
        }

        // Median split, falling back to the midpoint when the median equals the minimum
        let mut values: Vec<f64> = indices.iter().map(|&i| self.point(i)[dimension]).collect();
        values.sort_by(f64::total_cmp);
        let mut threshold = values[values.len() / 2];
        if !(threshold > min) {
            threshold = min + 0.5 * (max - min);
        }

        let (left_indices, right_indices): (Vec<usize>, Vec<usize>) = indices
            .iter()
            .partition(|&&i| self.point(i)[dimension] < threshold);

        // Handle edge case where the split could not separate the subset
        if left_indices.is_empty() || right_indices.is_empty() {
            return KdTreeNode::Leaf(indices.to_vec());
        }

        KdTreeNode::Internal {
            dimension,
            threshold,
            left: Box::new(self.build_recursive(&left_indices, tree_id, rng)),
            right: Box::new(self.build_recursive(&right_indices, tree_id, rng)),
        }
    }

    /// Search for the k nearest neighbors of `query`.
    ///
    /// Returns `(index, squared distance)` pairs, closest first, ties broken
    /// by ascending index.
    pub fn search_knn(&self, query: &[f64], k: usize) -> Vec<(usize, f64)> {
        let mut results = KnnResults::new(k);
        if k == 0 || self.is_empty() || query.len() != self.dim {
            return Vec::new();
        }

        match self.params.checks {
            None => {
                if let Some(root) = self.trees.first() {
                    self.search_exact(root, query, &mut results);
                }
            }
            Some(checks) => self.search_approximate(query, checks, &mut results),
        }

        results.into_sorted()
    }

    /// Find nearest neighbors for every row of `queries`, in row order.
    pub fn knn_search(&self, queries: &DMatrix<f64>, k: usize) -> Vec<Vec<(usize, f64)>> {
        (0..queries.nrows())
            .into_par_iter()
            .map(|r| {
                let query: Vec<f64> = queries.row(r).iter().copied().collect();
                self.search_knn(&query, k)
            })
            .collect()
    }

    fn scan_leaf(&self, indices: &[usize], query: &[f64], results: &mut KnnResults) {
        for &idx in indices {
            results.push(SearchResult {
                index: idx,
                distance: squared_distance(query, self.point(idx)),
            });
        }
    }

    fn search_exact(&self, node: &KdTreeNode, query: &[f64], results: &mut KnnResults) {
        match node {
            KdTreeNode::Leaf(indices) => self.scan_leaf(indices, query, results),
            KdTreeNode::Internal {
                dimension,
                threshold,
                left,
                right,
            } => {
                let diff = query[*dimension] - *threshold;
                let (first, second) = if diff < 0.0 { (left, right) } else { (right, left) };

                self.search_exact(first, query, results);
                if results.admits(diff * diff) {
                    self.search_exact(second, query, results);
                }
            }
        }
    }

    fn search_approximate(&self, query: &[f64], checks: usize, results: &mut KnnResults) {
        let mut branches = BinaryHeap::new();
        let mut seen = HashSet::new();
        let mut checked = 0usize;

        for root in &self.trees {
            branches.push(Branch { node: root, bound: 0.0 });
        }

        while let Some(Branch { mut node, bound }) = branches.pop() {
            if (checked >= checks && results.is_full()) || !results.admits(bound) {
                break;
            }

            // Descend to a leaf, queueing the far sides
            loop {
                match node {
                    KdTreeNode::Leaf(indices) => {
                        for &idx in indices {
                            if seen.insert(idx) {
                                checked += 1;
                                results.push(SearchResult {
                                    index: idx,
                                    distance: squared_distance(query, self.point(idx)),
                                });
                            }
                        }
                        break;
                    }
                    KdTreeNode::Internal {
                        dimension,
                        threshold,
                        left,
                        right,
                    } => {
                        let diff = query[*dimension] - *threshold;
                        let (near, far) = if diff < 0.0 { (left, right) } else { (right, left) };
                        branches.push(Branch {
                            node: far.as_ref(),
                            bound: bound.max(diff * diff),
                        });
                        node = near.as_ref();
                    }
                }
            }
        }
    }
}

/// Squared Euclidean distance between two descriptors
fn squared_distance(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b.iter()).map(|(x, y)| (x - y) * (x - y)).sum()
}
