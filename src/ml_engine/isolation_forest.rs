//! Isolation forest
//!
//! Each tree is grown on a random subsample (without replacement) by picking a
//! random non-constant feature and a uniform split between that feature's min
//! and max, until a node holds one sample, all remaining samples are
//! identical, or the depth limit ⌈log2(max_samples)⌉ is reached.
//!
//! The anomaly score of a sample is `-2^(-E[h(x)] / c(max_samples))`, where
//! `h(x)` is the path length to the leaf plus `c(leaf size)`. Lower means more
//! anomalous; the range is [-1, 0].
//!
//! Trees are stored as flat node arenas so a fitted forest serializes as
//! plain data.

use rand::rngs::StdRng;
use rand::seq::index;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

const EULER_GAMMA: f64 = 0.577_215_664_9;

/// Average path length of an unsuccessful BST search among `n` points.
pub fn average_path_length(n: usize) -> f64 {
    match n {
        0 | 1 => 0.0,
        2 => 1.0,
        _ => {
            let n = n as f64;
            2.0 * ((n - 1.0).ln() + EULER_GAMMA) - 2.0 * (n - 1.0) / n
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ForestParams {
    pub n_estimators: usize,
    /// Upper bound on the per-tree subsample; capped at the training size.
    pub max_samples: usize,
    pub seed: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
enum Node {
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
    },
    Leaf {
        size: usize,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IsolationTree {
    nodes: Vec<Node>,
}

impl IsolationTree {
    fn fit(data: &[&[f64]], max_depth: usize, rng: &mut StdRng) -> Self {
        let mut tree = Self { nodes: Vec::new() };
        let indices: Vec<usize> = (0..data.len()).collect();
        tree.grow(data, indices, 0, max_depth, rng);
        tree
    }

    fn grow(
        &mut self,
        data: &[&[f64]],
        indices: Vec<usize>,
        depth: usize,
        max_depth: usize,
        rng: &mut StdRng,
    ) -> usize {
        let node_index = self.nodes.len();

        if depth >= max_depth || indices.len() <= 1 {
            self.nodes.push(Node::Leaf { size: indices.len() });
            return node_index;
        }

        // features that still vary within this node
        let n_features = data[indices[0]].len();
        let ranges: Vec<(usize, f64, f64)> = (0..n_features)
            .filter_map(|f| {
                let (lo, hi) = indices.iter().fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &i| {
                    (lo.min(data[i][f]), hi.max(data[i][f]))
                });
                (hi > lo).then_some((f, lo, hi))
            })
            .collect();

        if ranges.is_empty() {
            self.nodes.push(Node::Leaf { size: indices.len() });
            return node_index;
        }

        let (feature, lo, hi) = ranges[rng.gen_range(0..ranges.len())];
        let threshold = split_point(lo, hi, rng.gen::<f64>());
        let (left, right): (Vec<usize>, Vec<usize>) =
            indices.into_iter().partition(|&i| data[i][feature] <= threshold);

        // placeholder, patched once both children exist
        self.nodes.push(Node::Leaf { size: 0 });
        let left = self.grow(data, left, depth + 1, max_depth, rng);
        let right = self.grow(data, right, depth + 1, max_depth, rng);
        self.nodes[node_index] = Node::Split {
            feature,
            threshold,
            left,
            right,
        };
        node_index
    }

    /// Path length of `sample`, including the leaf-size correction.
    pub fn path_length(&self, sample: &[f64]) -> f64 {
        let mut index = 0;
        let mut depth = 0usize;
        loop {
            match self.nodes.get(index) {
                Some(Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                }) => {
                    let value = sample.get(*feature).copied().unwrap_or(0.0);
                    index = if value <= *threshold { *left } else { *right };
                    depth += 1;
                }
                Some(Node::Leaf { size }) => {
                    return depth as f64 + average_path_length(*size);
                }
                None => return depth as f64,
            }
        }
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }
}

/// Point at fraction `u` in [0, 1) of `[lo, hi)`.
///
/// Interpolates without forming `hi - lo`, which overflows for ranges wider
/// than `f64::MAX`. Falls back to `lo` if rounding lands on `hi`.
fn split_point(lo: f64, hi: f64, u: f64) -> f64 {
    let t = lo * (1.0 - u) + hi * u;
    if t.is_finite() && t >= lo && t < hi {
        t
    } else {
        lo
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IsolationForest {
    trees: Vec<IsolationTree>,
    /// Subsample size actually used per tree
    max_samples: usize,
    n_features: usize,
}

impl IsolationForest {
    /// Fit on row-major data. Returns `None` when there is nothing to fit.
    pub fn fit(data: &[Vec<f64>], params: ForestParams) -> Option<Self> {
        let n_features = data.first()?.len();
        if n_features == 0 || params.n_estimators == 0 {
            return None;
        }

        let max_samples = params.max_samples.clamp(1, data.len());
        let max_depth = (max_samples as f64).log2().ceil().max(1.0) as usize;

        // per-tree seeds drawn up front so parallel fitting stays deterministic
        let mut master = StdRng::seed_from_u64(params.seed);
        let seeds: Vec<u64> = (0..params.n_estimators).map(|_| master.gen()).collect();

        let trees = seeds
            .into_par_iter()
            .map(|seed| {
                let mut rng = StdRng::seed_from_u64(seed);
                let sample: Vec<&[f64]> = index::sample(&mut rng, data.len(), max_samples)
                    .into_iter()
                    .map(|i| data[i].as_slice())
                    .collect();
                IsolationTree::fit(&sample, max_depth, &mut rng)
            })
            .collect();

        Some(Self {
            trees,
            max_samples,
            n_features,
        })
    }

    pub fn n_features(&self) -> usize {
        self.n_features
    }

    pub fn n_estimators(&self) -> usize {
        self.trees.len()
    }

    pub fn max_samples(&self) -> usize {
        self.max_samples
    }

    /// Score one sample in [-1, 0]; lower is more anomalous.
    pub fn score_sample(&self, sample: &[f64]) -> f64 {
        if self.trees.is_empty() {
            return 0.0;
        }
        let mean_path = self.trees.iter().map(|t| t.path_length(sample)).sum::<f64>()
            / self.trees.len() as f64;
        let norm = average_path_length(self.max_samples);
        if norm <= 0.0 {
            return -1.0;
        }
        -(2f64.powf(-mean_path / norm))
    }

    pub fn score_samples(&self, data: &[Vec<f64>]) -> Vec<f64> {
        data.par_iter().map(|row| self.score_sample(row)).collect()
    }
}

/// Linearly interpolated percentile (`q` in [0, 100]) of `values`.
pub fn percentile(values: &[f64], q: f64) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);

    let rank = (q / 100.0).clamp(0.0, 1.0) * (sorted.len() - 1) as f64;
    let lo = rank.floor() as usize;
    let hi = rank.ceil() as usize;
    let frac = rank - lo as f64;
    Some(sorted[lo] + (sorted[hi] - sorted[lo]) * frac)
}
