use serde::{Deserialize, Serialize};

use crate::types::{
    Measurements, CHEST_WIDTH, FEATURE_NAMES, NUM_FEATURES, SHOULDER_WIDTH, WAIST_WIDTH,
};

/// Chest width as a multiple of shoulder width, used when chest is missing.
const CHEST_TO_SHOULDER: f64 = 1.1;

/// Waist width as a multiple of shoulder width, used when waist is missing.
const WAIST_TO_SHOULDER: f64 = 0.75;

/// One classifier input sample, laid out in [`FEATURE_NAMES`] order.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FeatureVector(pub [f64; NUM_FEATURES]);

impl FeatureVector {
    pub const fn new(values: [f64; NUM_FEATURES]) -> Self {
        Self(values)
    }

    pub const fn zeros() -> Self {
        Self([0.0; NUM_FEATURES])
    }

    pub fn values(&self) -> &[f64; NUM_FEATURES] {
        &self.0
    }

    /// Look up a feature by its canonical name.
    pub fn get(&self, name: &str) -> Option<f64> {
        FEATURE_NAMES
            .iter()
            .position(|n| *n == name)
            .map(|i| self.0[i])
    }
}

impl std::ops::Index<usize> for FeatureVector {
    type Output = f64;

    fn index(&self, idx: usize) -> &Self::Output {
        &self.0[idx]
    }
}

/// Build the fixed 6-element feature vector from a measurement set.
///
/// Missing chest and waist widths are estimated from the shoulder width;
/// anything else that is missing (or non-numeric) becomes 0.0. The result is
/// always finite.
pub fn extract_features(measurements: &Measurements) -> FeatureVector {
    let shoulder = measurements.get_f64(SHOULDER_WIDTH);
    let mut values = [0.0; NUM_FEATURES];

    for (slot, name) in values.iter_mut().zip(FEATURE_NAMES) {
        let value = measurements
            .get_f64(name)
            .unwrap_or_else(|| impute(name, shoulder));
        *slot = if value.is_finite() { value } else { 0.0 };
    }

    FeatureVector(values)
}

fn impute(name: &str, shoulder: Option<f64>) -> f64 {
    let shoulder = shoulder.unwrap_or(0.0);
    match name {
        CHEST_WIDTH => shoulder * CHEST_TO_SHOULDER,
        WAIST_WIDTH => shoulder * WAIST_TO_SHOULDER,
        _ => 0.0,
    }
}
