//! Random forest classifier: bagged Gini trees with per-split feature
//! subsampling.

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::features::FeatureVector;
use crate::tree::{DecisionTree, Gini, TreeGrower, TreeParams};
use crate::types::NUM_FEATURES;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RandomForestParams {
    pub n_estimators: usize,
    pub max_depth: usize,
    pub seed: u64,
}

impl Default for RandomForestParams {
    fn default() -> Self {
        Self {
            n_estimators: 100,
            max_depth: 10,
            seed: 42,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RandomForest {
    trees: Vec<DecisionTree>,
    n_classes: usize,
    feature_importances: [f64; NUM_FEATURES],
}

impl RandomForest {
    /// Fit on `x` with class labels `y` in `0..n_classes`.
    pub fn fit(x: &[FeatureVector], y: &[usize], n_classes: usize, params: &RandomForestParams) -> Result<Self> {
        validate_training_set(x, y, n_classes)?;
        if params.n_estimators == 0 {
            return Err(Error::InvalidData("random forest needs at least one tree".into()));
        }

        let gini = Gini { labels: y, n_classes };
        let tree_params = TreeParams {
            max_depth: params.max_depth,
            min_samples_split: 2,
            min_samples_leaf: 1,
            max_features: Some(((NUM_FEATURES as f64).sqrt() as usize).max(1)),
        };

        let mut rng = ChaCha8Rng::seed_from_u64(params.seed);
        let n = x.len();
        let mut trees = Vec::with_capacity(params.n_estimators);
        let mut importances = [0.0; NUM_FEATURES];

        for _ in 0..params.n_estimators {
            let bootstrap: Vec<usize> = (0..n).map(|_| rng.gen_range(0..n)).collect();
            let (tree, tree_importances) = TreeGrower::new(x, &gini, tree_params, &mut rng).grow(bootstrap);

            for (total, v) in importances.iter_mut().zip(normalized(tree_importances)) {
                *total += v;
            }
            trees.push(tree);
        }

        Ok(Self {
            trees,
            n_classes,
            feature_importances: normalized(importances),
        })
    }

    /// Mean of the per-tree leaf class distributions.
    pub fn predict_proba(&self, x: &FeatureVector) -> Vec<f64> {
        let mut probabilities = vec![0.0; self.n_classes];
        for tree in &self.trees {
            for (p, v) in probabilities.iter_mut().zip(tree.predict(x)) {
                *p += v;
            }
        }

        let n = self.trees.len().max(1) as f64;
        probabilities.iter_mut().for_each(|p| *p /= n);
        probabilities
    }

    pub fn predict(&self, x: &FeatureVector) -> usize {
        argmax(&self.predict_proba(x))
    }

    pub fn n_classes(&self) -> usize {
        self.n_classes
    }

    pub fn num_trees(&self) -> usize {
        self.trees.len()
    }

    /// Mean decrease in impurity per feature, summing to 1 unless no tree
    /// ever split.
    pub fn feature_importances(&self) -> [f64; NUM_FEATURES] {
        self.feature_importances
    }

    pub(crate) fn is_well_formed(&self) -> bool {
        !self.trees.is_empty() && self.trees.iter().all(|t| t.is_well_formed(self.n_classes))
    }
}

pub(crate) fn validate_training_set(x: &[FeatureVector], y: &[usize], n_classes: usize) -> Result<()> {
    if x.is_empty() {
        return Err(Error::InvalidData("cannot fit with 0 samples".into()));
    }
    if x.len() != y.len() {
        return Err(Error::InvalidData(format!(
            "{} feature rows but {} labels",
            x.len(),
            y.len()
        )));
    }
    if let Some(bad) = y.iter().find(|&&label| label >= n_classes) {
        return Err(Error::InvalidData(format!(
            "label {bad} out of range for {n_classes} classes"
        )));
    }
    Ok(())
}

pub(crate) fn normalized(values: [f64; NUM_FEATURES]) -> [f64; NUM_FEATURES] {
    let total: f64 = values.iter().sum();
    if total <= 0.0 {
        return [0.0; NUM_FEATURES];
    }
    values.map(|v| v / total)
}

/// Index of the first maximum.
pub(crate) fn argmax(values: &[f64]) -> usize {
    let mut best = 0;
    for (i, v) in values.iter().enumerate() {
        if *v > values[best] {
            best = i;
        }
    }
    best
}
