use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::features::FeatureVector;
use crate::types::NUM_FEATURES;

/// A node in a decision tree, stored in a flat arena.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum TreeNode {
    /// Internal split node. Samples with `x[feature] <= threshold` go left.
    Split {
        feature: u8,
        threshold: f64,
        left: u32,
        right: u32,
    },
    /// Leaf node. Holds class proportions for classification trees or a
    /// single raw score for boosting trees.
    Leaf { value: Vec<f64> },
}

/// A single decision tree.
///
/// Node 0 is the root; split nodes refer to their children by arena index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionTree {
    pub nodes: Vec<TreeNode>,
}

impl DecisionTree {
    pub fn new(nodes: Vec<TreeNode>) -> Self {
        Self { nodes }
    }

    /// Traverse the tree and return the reached leaf's value.
    pub fn predict(&self, x: &FeatureVector) -> &[f64] {
        let mut node_idx = 0usize;

        loop {
            match &self.nodes[node_idx] {
                TreeNode::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    node_idx = if x[*feature as usize] <= *threshold {
                        *left as usize
                    } else {
                        *right as usize
                    };
                }
                TreeNode::Leaf { value } => return value,
            }
        }
    }

    pub fn num_nodes(&self) -> usize {
        self.nodes.len()
    }

    pub fn depth(&self) -> usize {
        self.depth_from(0)
    }

    fn depth_from(&self, node_idx: usize) -> usize {
        match &self.nodes[node_idx] {
            TreeNode::Split { left, right, .. } => {
                1 + self
                    .depth_from(*left as usize)
                    .max(self.depth_from(*right as usize))
            }
            TreeNode::Leaf { .. } => 1,
        }
    }

    /// Whether every split index points inside the arena and leaves have
    /// `leaf_width` values. Used to vet deserialized models.
    pub(crate) fn is_well_formed(&self, leaf_width: usize) -> bool {
        let n = self.nodes.len();
        n > 0
            && self.nodes.iter().enumerate().all(|(i, node)| match node {
                TreeNode::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    (*feature as usize) < NUM_FEATURES
                        && !threshold.is_nan()
                        && (*left as usize) > i
                        && (*left as usize) < n
                        && (*right as usize) > i
                        && (*right as usize) < n
                }
                TreeNode::Leaf { value } => value.len() == leaf_width,
            })
    }
}

/// Growth limits for a single tree.
#[derive(Debug, Clone, Copy)]
pub(crate) struct TreeParams {
    pub max_depth: usize,
    pub min_samples_split: usize,
    pub min_samples_leaf: usize,
    /// Features considered per split; `None` means all of them.
    pub max_features: Option<usize>,
}

/// Split quality measure plus the leaf value it produces.
///
/// `Stats` is an incrementally updatable summary of a set of samples, so a
/// split search is a single sweep over sorted samples.
pub(crate) trait Criterion {
    type Stats: Clone;

    fn empty(&self) -> Self::Stats;
    fn add(&self, stats: &mut Self::Stats, sample: usize);
    fn remove(&self, stats: &mut Self::Stats, sample: usize);
    /// Impurity per sample of the summarized set.
    fn impurity(&self, stats: &Self::Stats, count: usize) -> f64;
    fn leaf_value(&self, samples: &[usize]) -> Vec<f64>;
}

/// Gini impurity over class labels; leaves store class proportions.
pub(crate) struct Gini<'a> {
    pub labels: &'a [usize],
    pub n_classes: usize,
}

impl Criterion for Gini<'_> {
    type Stats = Vec<f64>;

    fn empty(&self) -> Self::Stats {
        vec![0.0; self.n_classes]
    }

    fn add(&self, stats: &mut Self::Stats, sample: usize) {
        stats[self.labels[sample]] += 1.0;
    }

    fn remove(&self, stats: &mut Self::Stats, sample: usize) {
        stats[self.labels[sample]] -= 1.0;
    }

    fn impurity(&self, stats: &Self::Stats, count: usize) -> f64 {
        if count == 0 {
            return 0.0;
        }
        let n = count as f64;
        1.0 - stats.iter().map(|c| (c / n) * (c / n)).sum::<f64>()
    }

    fn leaf_value(&self, samples: &[usize]) -> Vec<f64> {
        let mut counts = self.empty();
        for &s in samples {
            self.add(&mut counts, s);
        }
        let n = samples.len().max(1) as f64;
        counts.iter_mut().for_each(|c| *c /= n);
        counts
    }
}

/// Squared error on softmax residuals; leaves store a one-step Newton
/// update for the multinomial deviance.
pub(crate) struct Residuals<'a> {
    pub residuals: &'a [f64],
    pub n_classes: usize,
}

impl Criterion for Residuals<'_> {
    /// (sum, sum of squares)
    type Stats = (f64, f64);

    fn empty(&self) -> Self::Stats {
        (0.0, 0.0)
    }

    fn add(&self, stats: &mut Self::Stats, sample: usize) {
        let r = self.residuals[sample];
        stats.0 += r;
        stats.1 += r * r;
    }

    fn remove(&self, stats: &mut Self::Stats, sample: usize) {
        let r = self.residuals[sample];
        stats.0 -= r;
        stats.1 -= r * r;
    }

    fn impurity(&self, stats: &Self::Stats, count: usize) -> f64 {
        if count == 0 {
            return 0.0;
        }
        let n = count as f64;
        let mean = stats.0 / n;
        (stats.1 / n - mean * mean).max(0.0)
    }

    fn leaf_value(&self, samples: &[usize]) -> Vec<f64> {
        let mut numerator = 0.0;
        let mut denominator = 0.0;
        for &s in samples {
            let r = self.residuals[s];
            numerator += r;
            denominator += r.abs() * (1.0 - r.abs());
        }

        let k = self.n_classes as f64;
        let value = if denominator.abs() < 1e-150 {
            0.0
        } else {
            (k - 1.0) / k * numerator / denominator
        };
        vec![value]
    }
}

struct BestSplit {
    feature: usize,
    threshold: f64,
    gain: f64,
}

/// Grows one tree and tracks the impurity decrease credited to each feature.
pub(crate) struct TreeGrower<'a, C: Criterion, R: Rng> {
    x: &'a [FeatureVector],
    criterion: &'a C,
    params: TreeParams,
    rng: &'a mut R,
    nodes: Vec<TreeNode>,
    importances: [f64; NUM_FEATURES],
}

impl<'a, C: Criterion, R: Rng> TreeGrower<'a, C, R> {
    pub fn new(x: &'a [FeatureVector], criterion: &'a C, params: TreeParams, rng: &'a mut R) -> Self {
        Self {
            x,
            criterion,
            params,
            rng,
            nodes: Vec::new(),
            importances: [0.0; NUM_FEATURES],
        }
    }

    /// Grow a tree over `samples` (indices into `x`, duplicates allowed).
    ///
    /// Returns the tree and the unnormalized, sample-weighted impurity
    /// decrease per feature.
    pub fn grow(mut self, mut samples: Vec<usize>) -> (DecisionTree, [f64; NUM_FEATURES]) {
        self.grow_node(&mut samples, 0);
        (DecisionTree::new(self.nodes), self.importances)
    }

    fn grow_node(&mut self, samples: &mut [usize], depth: usize) -> u32 {
        let idx = self.nodes.len() as u32;
        self.nodes.push(TreeNode::Leaf { value: Vec::new() });

        let count = samples.len();
        let mut stats = self.criterion.empty();
        for &s in samples.iter() {
            self.criterion.add(&mut stats, s);
        }
        let impurity = self.criterion.impurity(&stats, count);

        let splittable = depth < self.params.max_depth
            && count >= self.params.min_samples_split
            && count >= 2 * self.params.min_samples_leaf
            && impurity > 1e-12;

        if splittable {
            if let Some(best) = self.best_split(samples, &stats, impurity) {
                let (feature, threshold) = (best.feature, best.threshold);
                let mid = partition(samples, |s| self.x[s][feature] <= threshold);
                self.importances[feature] += best.gain;

                let (left_samples, right_samples) = samples.split_at_mut(mid);
                let left = self.grow_node(left_samples, depth + 1);
                let right = self.grow_node(right_samples, depth + 1);

                self.nodes[idx as usize] = TreeNode::Split {
                    feature: feature as u8,
                    threshold,
                    left,
                    right,
                };
                return idx;
            }
        }

        self.nodes[idx as usize] = TreeNode::Leaf {
            value: self.criterion.leaf_value(samples),
        };
        idx
    }

    /// Features in the order they are searched, and how many must be searched.
    ///
    /// With `max_features` set the order is shuffled; the search keeps going
    /// past the budget until some valid split turns up.
    fn feature_order(&mut self) -> (Vec<usize>, usize) {
        let mut order: Vec<usize> = (0..NUM_FEATURES).collect();
        match self.params.max_features {
            Some(k) if k < NUM_FEATURES => {
                order.shuffle(&mut *self.rng);
                (order, k.max(1))
            }
            _ => (order, NUM_FEATURES),
        }
    }

    fn best_split(&mut self, samples: &[usize], parent: &C::Stats, parent_impurity: f64) -> Option<BestSplit> {
        let count = samples.len();
        let parent_weighted = parent_impurity * count as f64;
        let min_leaf = self.params.min_samples_leaf.max(1);
        let mut best: Option<BestSplit> = None;

        let (features, budget) = self.feature_order();
        let mut order = samples.to_vec();
        for (visited, feature) in features.into_iter().enumerate() {
            if visited >= budget && best.is_some() {
                break;
            }
            let x = self.x;
            order.sort_by(|&a, &b| x[a][feature].total_cmp(&x[b][feature]));

            let mut left = self.criterion.empty();
            let mut right = parent.clone();

            for i in 0..count - 1 {
                let s = order[i];
                self.criterion.add(&mut left, s);
                self.criterion.remove(&mut right, s);

                let n_left = i + 1;
                let n_right = count - n_left;
                if n_left < min_leaf || n_right < min_leaf {
                    continue;
                }

                let here = x[s][feature];
                let next = x[order[i + 1]][feature];
                if next <= here {
                    continue;
                }

                let children = self.criterion.impurity(&left, n_left) * n_left as f64
                    + self.criterion.impurity(&right, n_right) * n_right as f64;
                let gain = parent_weighted - children;

                if gain > 1e-12 && best.as_ref().map_or(true, |b| gain > b.gain) {
                    let mut threshold = here + (next - here) / 2.0;
                    if threshold >= next {
                        threshold = here;
                    }
                    best = Some(BestSplit {
                        feature,
                        threshold,
                        gain,
                    });
                }
            }
        }

        best
    }
}

/// Stable in-place partition; returns the number of samples satisfying `pred`.
fn partition<F: Fn(usize) -> bool>(samples: &mut [usize], pred: F) -> usize {
    let (mut left, right): (Vec<usize>, Vec<usize>) = samples.iter().partition(|&&s| pred(s));
    let mid = left.len();
    left.extend(right);
    samples.copy_from_slice(&left);
    mid
}
