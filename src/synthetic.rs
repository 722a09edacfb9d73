//! Synthetic labeled measurements for bootstrapping a model without real data.

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

use crate::features::FeatureVector;
use crate::training::{TrainingData, TrainingSample};
use crate::types::SizeLabel;

/// Uniform sampling ranges (cm) for one size.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SizeRange {
    pub shoulder: (f64, f64),
    pub chest: (f64, f64),
    pub waist: (f64, f64),
    pub hip: (f64, f64),
}

/// Torso length as a multiple of shoulder width.
const TORSO_RATIO: (f64, f64) = (1.8, 2.2);

/// Arm length as a multiple of shoulder width.
const ARM_RATIO: (f64, f64) = (1.4, 1.8);

/// Measurement ranges the generator draws from for `size`.
///
/// These do not have to agree with the rule-based thresholds; the shoulder
/// ranges happen to, the others are independent.
pub fn size_range(size: SizeLabel) -> SizeRange {
    let step = size.index() as f64;
    let shoulder_lo = 30.0 + 5.0 * step;
    let waist_lo = 24.0 + 4.0 * step;
    let hip_lo = 34.0 + 4.0 * step;
    SizeRange {
        shoulder: (shoulder_lo, shoulder_lo + 5.0),
        chest: (shoulder_lo + 2.0, shoulder_lo + 7.0),
        waist: (waist_lo, waist_lo + 4.0),
        hip: (hip_lo, hip_lo + 4.0),
    }
}

/// Draw one feature vector for `size`.
pub fn sample_features<R: Rng + ?Sized>(size: SizeLabel, rng: &mut R) -> FeatureVector {
    let range = size_range(size);
    let shoulder = rng.gen_range(range.shoulder.0..range.shoulder.1);
    let chest = rng.gen_range(range.chest.0..range.chest.1);
    let waist = rng.gen_range(range.waist.0..range.waist.1);
    let hip = rng.gen_range(range.hip.0..range.hip.1);
    let torso = shoulder * rng.gen_range(TORSO_RATIO.0..TORSO_RATIO.1);
    let arm = shoulder * rng.gen_range(ARM_RATIO.0..ARM_RATIO.1);

    FeatureVector::new([shoulder, chest, waist, hip, torso, arm])
}

/// Generate `n_samples` labeled rows with sizes drawn uniformly.
pub fn generate_synthetic_data(n_samples: usize, seed: u64) -> TrainingData {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    (0..n_samples)
        .map(|_| {
            let size = SizeLabel::ALL[rng.gen_range(0..SizeLabel::ALL.len())];
            TrainingSample {
                features: sample_features(size, &mut rng),
                size,
            }
        })
        .collect()
}
