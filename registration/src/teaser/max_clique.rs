//! Maximum clique pruning of correspondences
//!
//! Two correspondences are consistent when they preserve the distance between
//! their endpoints up to the noise bound. Inliers of a rigid motion are all
//! pairwise consistent, so they form a clique in the consistency graph and the
//! maximum clique is a strong inlier estimate.

use kcp_core::Correspondences;
use rayon::prelude::*;
use std::time::{Duration, Instant};

/// Undirected graph with bitset adjacency rows.
#[derive(Debug, Clone)]
pub struct ConsistencyGraph {
    n: usize,
    words: usize,
    adjacency: Vec<u64>,
}

impl ConsistencyGraph {
    /// Graph with `n` vertices and no edges.
    pub fn new(n: usize) -> Self {
        let words = n.div_ceil(64);
        Self {
            n,
            words,
            adjacency: vec![0; n * words],
        }
    }

    /// Build the pairwise consistency graph: `i` and `j` are connected when
    /// `| ‖t_i − t_j‖ − ‖s_i − s_j‖ | ≤ 2 · noise_bound`.
    pub fn from_correspondences(correspondences: &Correspondences, noise_bound: f64) -> Self {
        let n = correspondences.len();
        let mut graph = Self::new(n);
        let threshold = 2.0 * noise_bound;
        let src = &correspondences.source_points;
        let dst = &correspondences.target_points;

        let words = graph.words;
        graph
            .adjacency
            .par_chunks_mut(words.max(1))
            .take(n)
            .enumerate()
            .for_each(|(i, row)| {
                for j in 0..n {
                    if i == j {
                        continue;
                    }
                    let src_dist = (src.column(i) - src.column(j)).norm();
                    let dst_dist = (dst.column(i) - dst.column(j)).norm();
                    if (dst_dist - src_dist).abs() <= threshold {
                        row[j / 64] |= 1u64 << (j % 64);
                    }
                }
            });

        graph
    }

    pub fn num_vertices(&self) -> usize {
        self.n
    }

    pub fn num_edges(&self) -> usize {
        let ones: usize = self.adjacency.iter().map(|w| w.count_ones() as usize).sum();
        ones / 2
    }

    pub fn add_edge(&mut self, i: usize, j: usize) {
        if i == j {
            return;
        }
        self.adjacency[i * self.words + j / 64] |= 1u64 << (j % 64);
        self.adjacency[j * self.words + i / 64] |= 1u64 << (i % 64);
    }

    pub fn has_edge(&self, i: usize, j: usize) -> bool {
        self.adjacency[i * self.words + j / 64] >> (j % 64) & 1 == 1
    }

    pub fn degree(&self, i: usize) -> usize {
        self.row(i).iter().map(|w| w.count_ones() as usize).sum()
    }

    pub fn neighbors(&self, i: usize) -> impl Iterator<Item = usize> + '_ {
        (0..self.n).filter(move |&j| self.has_edge(i, j))
    }

    fn row(&self, i: usize) -> &[u64] {
        &self.adjacency[i * self.words..(i + 1) * self.words]
    }

    /// Core number of every vertex (Batagelj–Zaversnik peeling).
    pub fn core_numbers(&self) -> Vec<usize> {
        let n = self.n;
        let mut degree: Vec<usize> = (0..n).map(|i| self.degree(i)).collect();
        let max_degree = degree.iter().copied().max().unwrap_or(0);

        // Bucket sort vertices by degree
        let mut bin = vec![0usize; max_degree + 1];
        for &d in &degree {
            bin[d] += 1;
        }
        let mut start = 0;
        for count in bin.iter_mut() {
            let c = *count;
            *count = start;
            start += c;
        }
        let mut position = vec![0usize; n];
        let mut order = vec![0usize; n];
        for v in 0..n {
            position[v] = bin[degree[v]];
            order[position[v]] = v;
            bin[degree[v]] += 1;
        }
        for d in (1..=max_degree).rev() {
            bin[d] = bin[d - 1];
        }
        if let Some(first) = bin.first_mut() {
            *first = 0;
        }

        for i in 0..n {
            let v = order[i];
            for u in self.neighbors(v) {
                if degree[u] > degree[v] {
                    let du = degree[u];
                    let pu = position[u];
                    let pw = bin[du];
                    let w = order[pw];
                    if u != w {
                        order.swap(pu, pw);
                        position[u] = pw;
                        position[w] = pu;
                    }
                    bin[du] += 1;
                    degree[u] -= 1;
                }
            }
        }

        degree
    }
}

/// Options of [`find_max_clique`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MaxCliqueOptions {
    /// Branch-and-bound search when set, greedy heuristic otherwise.
    pub exact: bool,
    /// Return the max-core vertices directly when the max core number exceeds
    /// this fraction of the vertex count. A value of 1 disables the shortcut.
    pub kcore_heuristic_threshold: f64,
    /// Wall-clock budget of the exact search.
    pub time_limit: Duration,
}

impl Default for MaxCliqueOptions {
    fn default() -> Self {
        Self {
            exact: true,
            kcore_heuristic_threshold: 0.5,
            time_limit: Duration::from_secs(3600),
        }
    }
}

/// Maximum clique of `graph`, as sorted vertex indices.
///
/// When the exact search runs out of time the best clique found so far is
/// returned.
pub fn find_max_clique(graph: &ConsistencyGraph, options: &MaxCliqueOptions) -> Vec<usize> {
    let n = graph.num_vertices();
    if n == 0 {
        return Vec::new();
    }

    let core = graph.core_numbers();
    let max_core = core.iter().copied().max().unwrap_or(0);

    if options.kcore_heuristic_threshold != 1.0
        && max_core as f64 > (n as f64 * options.kcore_heuristic_threshold).round()
    {
        let clique: Vec<usize> = (0..n).filter(|&v| core[v] >= max_core).collect();
        tracing::debug!(size = clique.len(), max_core, "max clique taken from the densest k-core");
        return clique;
    }

    let mut best = greedy_clique(graph, &core);

    if options.exact {
        let mut search = CliqueSearch {
            graph,
            deadline: Instant::now().checked_add(options.time_limit),
            timed_out: false,
        };

        // Vertices whose core number cannot beat the heuristic are dropped
        let mut candidates: Vec<usize> = (0..n).filter(|&v| core[v] + 1 > best.len()).collect();
        candidates.sort_by_key(|&v| std::cmp::Reverse(graph.degree(v)));

        let mut clique = Vec::new();
        search.expand(&mut clique, candidates, &mut best);

        if search.timed_out {
            tracing::warn!(
                limit_s = options.time_limit.as_secs_f64(),
                size = best.len(),
                "max clique search hit its time limit, using best clique so far"
            );
        }
    }

    best.sort_unstable();
    tracing::debug!(vertices = n, edges = graph.num_edges(), size = best.len(), "max clique found");
    best
}

/// Greedy clique grown from every vertex in decreasing core order.
fn greedy_clique(graph: &ConsistencyGraph, core: &[usize]) -> Vec<usize> {
    let mut order: Vec<usize> = (0..graph.num_vertices()).collect();
    order.sort_by_key(|&v| (std::cmp::Reverse(core[v]), v));

    let mut best: Vec<usize> = Vec::new();
    for &v in &order {
        if core[v] + 1 <= best.len() {
            continue;
        }

        let mut candidates: Vec<usize> = graph.neighbors(v).filter(|&u| core[u] >= best.len()).collect();
        candidates.sort_by_key(|&u| (std::cmp::Reverse(core[u]), u));

        let mut clique = vec![v];
        for u in candidates {
            if clique.iter().all(|&w| graph.has_edge(u, w)) {
                clique.push(u);
            }
        }

        if clique.len() > best.len() {
            best = clique;
        }
    }

    best
}

/// Branch-and-bound with greedy coloring bounds (MCQ).
struct CliqueSearch<'a> {
    graph: &'a ConsistencyGraph,
    deadline: Option<Instant>,
    timed_out: bool,
}

impl CliqueSearch<'_> {
    fn expand(&mut self, clique: &mut Vec<usize>, candidates: Vec<usize>, best: &mut Vec<usize>) {
        let (order, colors) = self.color_sort(&candidates);

        for i in (0..order.len()).rev() {
            if self.timed_out || clique.len() + colors[i] <= best.len() {
                return;
            }
            if self.deadline.is_some_and(|d| Instant::now() >= d) {
                self.timed_out = true;
                return;
            }

            let v = order[i];
            clique.push(v);

            let next: Vec<usize> = order[..i]
                .iter()
                .copied()
                .filter(|&u| self.graph.has_edge(v, u))
                .collect();

            if next.is_empty() {
                if clique.len() > best.len() {
                    *best = clique.clone();
                }
            } else {
                self.expand(clique, next, best);
            }

            clique.pop();
        }
    }

    /// Greedy sequential coloring. Returns vertices ordered by color and the
    /// 1-based color of each, which bounds the clique size within any prefix.
    fn color_sort(&self, candidates: &[usize]) -> (Vec<usize>, Vec<usize>) {
        let mut classes: Vec<Vec<usize>> = Vec::new();
        for &v in candidates {
            match classes
                .iter_mut()
                .find(|class| class.iter().all(|&u| !self.graph.has_edge(u, v)))
            {
                Some(class) => class.push(v),
                None => classes.push(vec![v]),
            }
        }

        let mut order = Vec::with_capacity(candidates.len());
        let mut colors = Vec::with_capacity(candidates.len());
        for (color, class) in classes.into_iter().enumerate() {
            for v in class {
                order.push(v);
                colors.push(color + 1);
            }
        }
        (order, colors)
    }
}
