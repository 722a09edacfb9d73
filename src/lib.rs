//! # tryon-size
//!
//! Clothing size estimation from body measurements.
//!
//! This crate provides:
//! - **Normalization**: scale raw pose measurements to a reference height
//! - **Features**: a fixed six-value feature vector with imputation of
//!   missing chest and waist widths
//! - **Prediction**: a trained tree-ensemble classifier (random forest or
//!   gradient boosting) with a shoulder-width rule as fallback
//! - **Training**: offline fitting on labeled or synthetic data, with a
//!   held-out classification report
//! - **Pose Measurement**: pixel measurements from 33-point pose landmarks
//!
//! ## Pipeline
//!
//! 1. Measure widths and lengths from pose landmarks
//! 2. Normalize them by the torso-derived body height
//! 3. Build the feature vector and standardize it
//! 4. Classify into XS..XXL, or fall back to the shoulder-width rule when no
//!    model is available or inference fails
//!
//! ## Quick Start
//!
//! ```rust
//! use tryon_size::{Measurements, PredictionMethod, SizeEstimator, SizeLabel};
//!
//! // Load a trained model if present
//! // let estimator = SizeEstimator::from_config(&EstimatorConfig::load(None)?);
//!
//! // Without a model every prediction uses the shoulder-width rule
//! let estimator = SizeEstimator::rule_based();
//!
//! let mut measurements = Measurements::new();
//! measurements.insert("shoulder_width", 44.0);
//!
//! let prediction = estimator.predict(&measurements);
//! assert_eq!(prediction.predicted_size, SizeLabel::M);
//! assert_eq!(prediction.method, PredictionMethod::RuleBased);
//! ```
//!
//! ## Training
//!
//! ```rust
//! use tryon_size::{generate_synthetic_data, FeatureVector, ModelType, SizeLabel, Trainer};
//!
//! let data = generate_synthetic_data(300, 42);
//! let trained = Trainer::new(ModelType::RandomForest)
//!     .with_n_estimators(10)
//!     .train(&data)
//!     .unwrap();
//!
//! println!("held-out accuracy: {:.2}", trained.report.accuracy);
//! let estimator = trained.into_estimator();
//! assert!(estimator.has_model());
//! ```

mod artifact;
mod boosting;
mod config;
mod error;
mod features;
mod forest;
mod landmarks;
mod metrics;
mod model;
mod normalize;
mod predictor;
mod scaler;
mod synthetic;
mod training;
mod tree;
mod types;

pub use boosting::{GradientBoosting, GradientBoostingParams};
pub use config::{EstimatorConfig, DEFAULT_MODEL_PATH, DEFAULT_SCALER_PATH};
pub use error::{Error, Result};
pub use features::{extract_features, FeatureVector};
pub use forest::{RandomForest, RandomForestParams};
pub use landmarks::{
    calculate_body_measurements, extract_key_points, is_pose_stable, pose_confidence, KeyLandmark, KeyPoints,
    PoseLandmark, DEFAULT_STABILITY_THRESHOLD, NUM_POSE_LANDMARKS,
};
pub use metrics::{accuracy, ClassMetrics, ClassificationReport};
pub use model::{Classifier, LabelClassifier, ModelType, ProbabilisticClassifier, SizeModel};
pub use normalize::{height_factor, normalize_measurements, DEFAULT_REFERENCE_HEIGHT};
pub use predictor::{
    rule_based_prediction, size_from_shoulder_width, Prediction, PredictionMethod, SizeEstimator,
    DEFAULT_CONFIDENCE_THRESHOLD, RULE_BASED_CONFIDENCE,
};
pub use scaler::StandardScaler;
pub use synthetic::{generate_synthetic_data, sample_features, size_range, SizeRange};
pub use training::{
    stratified_split, train_model, TrainedModel, Trainer, TrainingData, TrainingRecord, TrainingReport,
    TrainingSample,
};
pub use tree::{DecisionTree, TreeNode};
pub use types::{
    Measurements, Point, SizeLabel, ARM_LENGTH, CHEST_WIDTH, FEATURE_NAMES, HIP_WIDTH, NUM_FEATURES, NUM_SIZES,
    SHOULDER_WIDTH, TORSO_LENGTH, WAIST_WIDTH,
};
