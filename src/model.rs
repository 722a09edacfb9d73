use std::fmt;
use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::artifact::{self, ArtifactKind};
use crate::boosting::GradientBoosting;
use crate::error::{Error, Result};
use crate::features::FeatureVector;
use crate::forest::RandomForest;
use crate::types::{NUM_FEATURES, NUM_SIZES};

/// A classifier that scores every size class.
pub trait ProbabilisticClassifier: Send + Sync {
    /// One probability per size class, in class-index order.
    fn predict_proba(&self, features: &FeatureVector) -> Result<Vec<f64>>;
}

/// A classifier that only reports the winning class index.
pub trait LabelClassifier: Send + Sync {
    fn predict(&self, features: &FeatureVector) -> Result<usize>;
}

/// A loaded classifier, tagged by what it can report.
///
/// The variant is fixed when the model is loaded; the predictor never probes
/// capabilities per call.
pub enum Classifier {
    Probabilistic(Box<dyn ProbabilisticClassifier>),
    HardLabel(Box<dyn LabelClassifier>),
}

impl Classifier {
    pub fn probabilistic<C: ProbabilisticClassifier + 'static>(classifier: C) -> Self {
        Classifier::Probabilistic(Box::new(classifier))
    }

    pub fn hard_label<C: LabelClassifier + 'static>(classifier: C) -> Self {
        Classifier::HardLabel(Box::new(classifier))
    }

    pub fn reports_probabilities(&self) -> bool {
        matches!(self, Classifier::Probabilistic(_))
    }
}

impl fmt::Debug for Classifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Classifier::Probabilistic(_) => f.write_str("Classifier::Probabilistic"),
            Classifier::HardLabel(_) => f.write_str("Classifier::HardLabel"),
        }
    }
}

impl From<SizeModel> for Classifier {
    fn from(model: SizeModel) -> Self {
        Classifier::probabilistic(model)
    }
}

/// Which tree ensemble to train.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelType {
    #[serde(alias = "xgboost")]
    GradientBoosting,
    RandomForest,
}

impl ModelType {
    pub const fn as_str(self) -> &'static str {
        match self {
            ModelType::GradientBoosting => "gradient_boosting",
            ModelType::RandomForest => "random_forest",
        }
    }
}

impl fmt::Display for ModelType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ModelType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "xgboost" | "gradient_boosting" | "gbt" => Ok(ModelType::GradientBoosting),
            "random_forest" | "rf" => Ok(ModelType::RandomForest),
            _ => Err(Error::UnsupportedModelType(s.to_string())),
        }
    }
}

/// A trained size classifier as stored on disk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SizeModel {
    GradientBoosting(GradientBoosting),
    RandomForest(RandomForest),
}

impl SizeModel {
    /// Load a model from a binary file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let model: Self = artifact::load(path, ArtifactKind::Classifier)?;
        model.validate()?;
        Ok(model)
    }

    /// Save the model to a binary file.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        artifact::save(path, ArtifactKind::Classifier, self)
    }

    pub fn model_type(&self) -> ModelType {
        match self {
            SizeModel::GradientBoosting(_) => ModelType::GradientBoosting,
            SizeModel::RandomForest(_) => ModelType::RandomForest,
        }
    }

    pub fn n_classes(&self) -> usize {
        match self {
            SizeModel::GradientBoosting(m) => m.n_classes(),
            SizeModel::RandomForest(m) => m.n_classes(),
        }
    }

    pub fn probabilities(&self, features: &FeatureVector) -> Vec<f64> {
        match self {
            SizeModel::GradientBoosting(m) => m.predict_proba(features),
            SizeModel::RandomForest(m) => m.predict_proba(features),
        }
    }

    pub fn classify(&self, features: &FeatureVector) -> usize {
        match self {
            SizeModel::GradientBoosting(m) => m.predict(features),
            SizeModel::RandomForest(m) => m.predict(features),
        }
    }

    pub fn feature_importances(&self) -> [f64; NUM_FEATURES] {
        match self {
            SizeModel::GradientBoosting(m) => m.feature_importances(),
            SizeModel::RandomForest(m) => m.feature_importances(),
        }
    }

    fn validate(&self) -> Result<()> {
        if self.n_classes() != NUM_SIZES {
            return Err(Error::InvalidModel(format!(
                "model has {} classes, expected {}",
                self.n_classes(),
                NUM_SIZES
            )));
        }

        let well_formed = match self {
            SizeModel::GradientBoosting(m) => m.is_well_formed(),
            SizeModel::RandomForest(m) => m.is_well_formed(),
        };
        if !well_formed {
            return Err(Error::InvalidModel("corrupt tree structure".into()));
        }
        Ok(())
    }
}

impl ProbabilisticClassifier for SizeModel {
    fn predict_proba(&self, features: &FeatureVector) -> Result<Vec<f64>> {
        if features.values().iter().any(|v| !v.is_finite()) {
            return Err(Error::Inference("non-finite feature value".into()));
        }
        Ok(self.probabilities(features))
    }
}
