use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::artifact::{self, ArtifactKind};
use crate::error::{Error, Result};
use crate::features::FeatureVector;
use crate::types::NUM_FEATURES;

/// Standardizes features to zero mean and unit variance.
///
/// Fitted once on the training split and stored next to the classifier so
/// that serving applies exactly the transform the model was trained with.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StandardScaler {
    mean: [f64; NUM_FEATURES],
    scale: [f64; NUM_FEATURES],
}

impl StandardScaler {
    /// Compute per-feature mean and population standard deviation.
    ///
    /// Constant features get a scale of 1.0 so they map to zero instead of NaN.
    pub fn fit(samples: &[FeatureVector]) -> Result<Self> {
        if samples.is_empty() {
            return Err(Error::InvalidData("cannot fit scaler on zero samples".into()));
        }

        let n = samples.len() as f64;
        let mut mean = [0.0; NUM_FEATURES];
        for sample in samples {
            for (m, v) in mean.iter_mut().zip(sample.values()) {
                *m += v;
            }
        }
        for m in &mut mean {
            *m /= n;
        }

        let mut scale = [0.0; NUM_FEATURES];
        for sample in samples {
            for ((s, m), v) in scale.iter_mut().zip(&mean).zip(sample.values()) {
                *s += (v - m) * (v - m);
            }
        }
        for s in &mut scale {
            let std = (*s / n).sqrt();
            *s = if std > f64::EPSILON { std } else { 1.0 };
        }

        Ok(Self { mean, scale })
    }

    pub fn mean(&self) -> &[f64; NUM_FEATURES] {
        &self.mean
    }

    pub fn scale(&self) -> &[f64; NUM_FEATURES] {
        &self.scale
    }

    pub fn transform(&self, sample: &FeatureVector) -> FeatureVector {
        let mut out = [0.0; NUM_FEATURES];
        for (i, o) in out.iter_mut().enumerate() {
            *o = (sample[i] - self.mean[i]) / self.scale[i];
        }
        FeatureVector::new(out)
    }

    pub fn transform_all(&self, samples: &[FeatureVector]) -> Vec<FeatureVector> {
        samples.iter().map(|s| self.transform(s)).collect()
    }

    /// Load a scaler from a binary file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        artifact::load(path, ArtifactKind::Scaler)
    }

    /// Save the scaler to a binary file.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        artifact::save(path, ArtifactKind::Scaler, self)
    }
}
