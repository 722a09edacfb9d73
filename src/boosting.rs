//! Gradient-boosted trees for multi-class classification.
//!
//! Each boosting round fits one regression tree per class to the softmax
//! residuals `y_k - p_k` and adds its Newton-step leaf values, shrunk by the
//! learning rate, to that class's raw score.

use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::features::FeatureVector;
use crate::forest::{argmax, normalized, validate_training_set};
use crate::tree::{DecisionTree, Residuals, TreeGrower, TreeParams};
use crate::types::NUM_FEATURES;

/// Floor for class priors so an absent class gets a finite initial score.
const MIN_PRIOR: f64 = 1e-8;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GradientBoostingParams {
    pub n_estimators: usize,
    pub max_depth: usize,
    pub learning_rate: f64,
    pub seed: u64,
}

impl Default for GradientBoostingParams {
    fn default() -> Self {
        Self {
            n_estimators: 100,
            max_depth: 6,
            learning_rate: 0.1,
            seed: 42,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GradientBoosting {
    n_classes: usize,
    learning_rate: f64,
    /// Log class priors, the raw scores before any tree is added.
    init_scores: Vec<f64>,
    /// One tree per class for every boosting round.
    stages: Vec<Vec<DecisionTree>>,
    feature_importances: [f64; NUM_FEATURES],
}

impl GradientBoosting {
    pub fn fit(x: &[FeatureVector], y: &[usize], n_classes: usize, params: &GradientBoostingParams) -> Result<Self> {
        validate_training_set(x, y, n_classes)?;
        if n_classes < 2 {
            return Err(Error::InvalidData(
                "gradient boosting needs at least two classes".into(),
            ));
        }
        if !(params.learning_rate > 0.0) {
            return Err(Error::InvalidData(format!(
                "learning rate must be positive, got {}",
                params.learning_rate
            )));
        }

        let n = x.len();
        let mut counts = vec![0usize; n_classes];
        for &label in y {
            counts[label] += 1;
        }
        let init_scores: Vec<f64> = counts
            .iter()
            .map(|&c| (c as f64 / n as f64).max(MIN_PRIOR).ln())
            .collect();

        let tree_params = TreeParams {
            max_depth: params.max_depth,
            min_samples_split: 2,
            min_samples_leaf: 1,
            max_features: None,
        };
        let mut rng = ChaCha8Rng::seed_from_u64(params.seed);

        let mut raw: Vec<Vec<f64>> = vec![init_scores.clone(); n];
        let mut stages = Vec::with_capacity(params.n_estimators);
        let mut importances = [0.0; NUM_FEATURES];
        let mut residuals = vec![0.0; n];

        for _ in 0..params.n_estimators {
            let probabilities: Vec<Vec<f64>> = raw.iter().map(|r| softmax(r)).collect();
            let mut stage = Vec::with_capacity(n_classes);

            for k in 0..n_classes {
                for (i, r) in residuals.iter_mut().enumerate() {
                    let target = if y[i] == k { 1.0 } else { 0.0 };
                    *r = target - probabilities[i][k];
                }

                let criterion = Residuals {
                    residuals: &residuals,
                    n_classes,
                };
                let (tree, tree_importances) =
                    TreeGrower::new(x, &criterion, tree_params, &mut rng).grow((0..n).collect());

                for (i, scores) in raw.iter_mut().enumerate() {
                    scores[k] += params.learning_rate * tree.predict(&x[i])[0];
                }
                for (total, v) in importances.iter_mut().zip(tree_importances) {
                    *total += v;
                }
                stage.push(tree);
            }

            stages.push(stage);
        }

        Ok(Self {
            n_classes,
            learning_rate: params.learning_rate,
            init_scores,
            stages,
            feature_importances: normalized(importances),
        })
    }

    /// Raw per-class scores before the softmax.
    pub fn decision_function(&self, x: &FeatureVector) -> Vec<f64> {
        let mut scores = self.init_scores.clone();
        for stage in &self.stages {
            for (score, tree) in scores.iter_mut().zip(stage) {
                *score += self.learning_rate * tree.predict(x)[0];
            }
        }
        scores
    }

    pub fn predict_proba(&self, x: &FeatureVector) -> Vec<f64> {
        softmax(&self.decision_function(x))
    }

    pub fn predict(&self, x: &FeatureVector) -> usize {
        argmax(&self.decision_function(x))
    }

    pub fn n_classes(&self) -> usize {
        self.n_classes
    }

    pub fn num_rounds(&self) -> usize {
        self.stages.len()
    }

    /// Total impurity decrease per feature across all trees, summing to 1.
    pub fn feature_importances(&self) -> [f64; NUM_FEATURES] {
        self.feature_importances
    }

    pub(crate) fn is_well_formed(&self) -> bool {
        self.n_classes >= 2
            && self.init_scores.len() == self.n_classes
            && self.learning_rate.is_finite()
            && self.stages.iter().all(|stage| {
                stage.len() == self.n_classes && stage.iter().all(|t| t.is_well_formed(1))
            })
    }
}

fn softmax(scores: &[f64]) -> Vec<f64> {
    let max = scores.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let exp: Vec<f64> = scores.iter().map(|s| (s - max).exp()).collect();
    let sum: f64 = exp.iter().sum();
    exp.into_iter().map(|e| e / sum).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Three classes laid out along the first feature.
    fn bands() -> (Vec<FeatureVector>, Vec<usize>) {
        let mut x = Vec::new();
        let mut y = Vec::new();
        for class in 0..3 {
            for i in 0..15 {
                let v = class as f64 * 10.0 + i as f64 * 0.3;
                x.push(FeatureVector::new([v, (i % 4) as f64, 0.0, 0.0, 0.0, 0.0]));
                y.push(class);
            }
        }
        (x, y)
    }

    fn small_params() -> GradientBoostingParams {
        GradientBoostingParams {
            n_estimators: 20,
            max_depth: 3,
            learning_rate: 0.1,
            seed: 42,
        }
    }

    #[test]
    fn softmax_is_a_distribution() {
        let p = softmax(&[1000.0, 1000.0, 0.0]);
        assert!((p.iter().sum::<f64>() - 1.0).abs() < 1e-12);
        assert!((p[0] - 0.5).abs() < 1e-12);
        assert!(p[2] < 1e-100);
    }

    #[test]
    fn learns_bands() {
        let (x, y) = bands();
        let model = GradientBoosting::fit(&x, &y, 3, &small_params()).unwrap();

        assert_eq!(model.num_rounds(), 20);
        assert!(model.is_well_formed());

        let correct = x.iter().zip(&y).filter(|(xi, yi)| model.predict(xi) == **yi).count();
        assert_eq!(correct, x.len());

        let p = model.predict_proba(&FeatureVector::new([21.0, 0.0, 0.0, 0.0, 0.0, 0.0]));
        assert_eq!(p.len(), 3);
        assert_eq!(argmax(&p), 2);
        assert!(p[2] > 0.5);
    }

    #[test]
    fn zero_rounds_predicts_the_prior() {
        let x = vec![FeatureVector::zeros(); 4];
        let y = vec![0, 0, 0, 1];
        let params = GradientBoostingParams {
            n_estimators: 0,
            ..small_params()
        };
        let model = GradientBoosting::fit(&x, &y, 2, &params).unwrap();

        let p = model.predict_proba(&FeatureVector::zeros());
        assert!((p[0] - 0.75).abs() < 1e-9);
        assert!((p[1] - 0.25).abs() < 1e-9);
    }

    #[test]
    fn absent_class_stays_finite() {
        let (x, y) = bands();
        let model = GradientBoosting::fit(&x, &y, 6, &small_params()).unwrap();
        let p = model.predict_proba(&x[0]);
        assert_eq!(p.len(), 6);
        assert!(p.iter().all(|v| v.is_finite()));
        assert!(p[5] < 0.01);
    }

    #[test]
    fn importances_follow_the_signal() {
        let (x, y) = bands();
        let model = GradientBoosting::fit(&x, &y, 3, &small_params()).unwrap();
        let imp = model.feature_importances();
        assert!((imp.iter().sum::<f64>() - 1.0).abs() < 1e-9);
        assert!(imp[0] > imp[1]);
    }

    #[test]
    fn rejects_single_class_and_bad_rate() {
        let x = vec![FeatureVector::zeros(); 3];
        assert!(GradientBoosting::fit(&x, &[0, 0, 0], 1, &small_params()).is_err());

        let params = GradientBoostingParams {
            learning_rate: 0.0,
            ..small_params()
        };
        assert!(GradientBoosting::fit(&x, &[0, 1, 0], 2, &params).is_err());
    }
}
