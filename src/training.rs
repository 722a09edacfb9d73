//! Offline training of the size classifier.
//!
//! Training is a batch job: it is allowed to fail loudly, unlike the serving
//! path in [`crate::predictor`].

use std::collections::BTreeMap;
use std::path::Path;

use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::boosting::{GradientBoosting, GradientBoostingParams};
use crate::error::{Error, Result};
use crate::features::FeatureVector;
use crate::forest::{RandomForest, RandomForestParams};
use crate::metrics::{accuracy, ClassificationReport};
use crate::model::{Classifier, ModelType, SizeModel};
use crate::predictor::SizeEstimator;
use crate::scaler::StandardScaler;
use crate::types::{SizeLabel, FEATURE_NAMES, NUM_SIZES};

/// Seed for the train/test split and the ensemble.
pub const DEFAULT_SEED: u64 = 42;

/// Fraction of each class held out for evaluation.
pub const DEFAULT_TEST_SIZE: f64 = 0.2;

/// One row of a training table as it appears in CSV.
///
/// Empty cells deserialize to `None` and are treated as 0.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingRecord {
    pub shoulder_width: Option<f64>,
    pub chest_width: Option<f64>,
    pub waist_width: Option<f64>,
    pub hip_width: Option<f64>,
    pub torso_length: Option<f64>,
    pub arm_length: Option<f64>,
    pub size: SizeLabel,
}

/// A labeled measurement sample.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrainingSample {
    pub features: FeatureVector,
    pub size: SizeLabel,
}

impl From<TrainingRecord> for TrainingSample {
    fn from(r: TrainingRecord) -> Self {
        let cells = [
            r.shoulder_width,
            r.chest_width,
            r.waist_width,
            r.hip_width,
            r.torso_length,
            r.arm_length,
        ];
        let features = cells.map(|c| c.filter(|v| v.is_finite()).unwrap_or(0.0));
        Self {
            features: FeatureVector::new(features),
            size: r.size,
        }
    }
}

impl From<&TrainingSample> for TrainingRecord {
    fn from(s: &TrainingSample) -> Self {
        let v = s.features.values();
        Self {
            shoulder_width: Some(v[0]),
            chest_width: Some(v[1]),
            waist_width: Some(v[2]),
            hip_width: Some(v[3]),
            torso_length: Some(v[4]),
            arm_length: Some(v[5]),
            size: s.size,
        }
    }
}

/// A table of labeled samples.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TrainingData {
    samples: Vec<TrainingSample>,
}

impl TrainingData {
    pub fn new(samples: Vec<TrainingSample>) -> Self {
        Self { samples }
    }

    /// Read a CSV table with a header row naming the feature columns and `size`.
    pub fn from_csv<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut reader = csv::Reader::from_path(path)?;
        let samples = reader
            .deserialize::<TrainingRecord>()
            .map(|row| row.map(TrainingSample::from))
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(Self { samples })
    }

    pub fn to_csv<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let mut writer = csv::Writer::from_path(path)?;
        for sample in &self.samples {
            writer.serialize(TrainingRecord::from(sample))?;
        }
        writer.flush()?;
        Ok(())
    }

    pub fn samples(&self) -> &[TrainingSample] {
        &self.samples
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Number of samples per size.
    pub fn class_counts(&self) -> BTreeMap<SizeLabel, usize> {
        let mut counts = BTreeMap::new();
        for s in &self.samples {
            *counts.entry(s.size).or_insert(0) += 1;
        }
        counts
    }
}

impl FromIterator<TrainingSample> for TrainingData {
    fn from_iter<I: IntoIterator<Item = TrainingSample>>(iter: I) -> Self {
        Self::new(iter.into_iter().collect())
    }
}

/// Stratified split: every class contributes `round(test_size * count)`
/// samples to the test set, always leaving at least one in training.
///
/// Returns `(train, test)` indices, each shuffled.
pub fn stratified_split(labels: &[SizeLabel], test_size: f64, seed: u64) -> (Vec<usize>, Vec<usize>) {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let mut train = Vec::new();
    let mut test = Vec::new();

    for label in SizeLabel::ALL {
        let mut members: Vec<usize> = (0..labels.len()).filter(|&i| labels[i] == label).collect();
        if members.is_empty() {
            continue;
        }
        members.shuffle(&mut rng);

        let n_test = ((members.len() as f64 * test_size).round() as usize).min(members.len() - 1);
        test.extend_from_slice(&members[..n_test]);
        train.extend_from_slice(&members[n_test..]);
    }

    train.shuffle(&mut rng);
    test.shuffle(&mut rng);
    (train, test)
}

/// What training produced, and how well it did on held-out data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingReport {
    pub accuracy: f64,
    pub model_type: ModelType,
    pub feature_importance: BTreeMap<String, f64>,
    pub classification_report: ClassificationReport,
    pub train_samples: usize,
    pub test_samples: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TrainedModel {
    pub model: SizeModel,
    pub scaler: StandardScaler,
    pub report: TrainingReport,
}

impl TrainedModel {
    /// Persist the model and, when a path is given, the scaler.
    pub fn save<P: AsRef<Path>>(&self, model_path: P, scaler_path: Option<&Path>) -> Result<()> {
        self.model.save(&model_path)?;
        info!("Model saved to {}", model_path.as_ref().display());

        if let Some(path) = scaler_path {
            self.scaler.save(path)?;
            info!("Scaler saved to {}", path.display());
        }
        Ok(())
    }

    /// Classify a raw (unscaled) feature vector.
    pub fn classify(&self, features: &FeatureVector) -> Result<SizeLabel> {
        size_for_class(self.model.classify(&self.scaler.transform(features)))
    }

    /// Hand the model and scaler to a serving estimator.
    pub fn into_estimator(self) -> SizeEstimator {
        SizeEstimator::new(Some(Classifier::from(self.model)), Some(self.scaler))
    }
}

fn size_for_class(class: usize) -> Result<SizeLabel> {
    SizeLabel::from_index(class)
        .ok_or_else(|| Error::Inference(format!("class index {class} out of range")))
}

/// Train with the default split and seed.
pub fn train_model(data: &TrainingData, model_type: ModelType) -> Result<TrainedModel> {
    Trainer::new(model_type).train(data)
}

#[derive(Debug, Clone, Copy)]
pub struct Trainer {
    model_type: ModelType,
    test_size: f64,
    seed: u64,
    n_estimators: usize,
}

impl Trainer {
    pub fn new(model_type: ModelType) -> Self {
        Self {
            model_type,
            test_size: DEFAULT_TEST_SIZE,
            seed: DEFAULT_SEED,
            n_estimators: 100,
        }
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn with_test_size(mut self, test_size: f64) -> Self {
        self.test_size = test_size;
        self
    }

    pub fn with_n_estimators(mut self, n_estimators: usize) -> Self {
        self.n_estimators = n_estimators;
        self
    }

    pub fn train(&self, data: &TrainingData) -> Result<TrainedModel> {
        if !(self.test_size > 0.0 && self.test_size < 1.0) {
            return Err(Error::InvalidData(format!(
                "test size must be in (0, 1), got {}",
                self.test_size
            )));
        }
        if data.is_empty() {
            return Err(Error::InvalidData("training table is empty".into()));
        }
        if data.class_counts().len() < 2 {
            return Err(Error::InvalidData(
                "training table needs at least two sizes".into(),
            ));
        }

        let labels: Vec<SizeLabel> = data.samples().iter().map(|s| s.size).collect();
        let (train_idx, test_idx) = stratified_split(&labels, self.test_size, self.seed);
        if test_idx.is_empty() {
            return Err(Error::InvalidData(
                "too few samples to hold out a test set".into(),
            ));
        }
        debug!(train = train_idx.len(), test = test_idx.len(), "Split training data");

        let gather = |idx: &[usize]| -> (Vec<FeatureVector>, Vec<usize>) {
            idx.iter()
                .map(|&i| (data.samples()[i].features, labels[i].index()))
                .unzip()
        };
        let (x_train, y_train) = gather(&train_idx);
        let (x_test, _) = gather(&test_idx);

        let scaler = StandardScaler::fit(&x_train)?;
        let x_train = scaler.transform_all(&x_train);
        let x_test = scaler.transform_all(&x_test);

        let model = match self.model_type {
            ModelType::GradientBoosting => {
                let params = GradientBoostingParams {
                    n_estimators: self.n_estimators,
                    seed: self.seed,
                    ..GradientBoostingParams::default()
                };
                SizeModel::GradientBoosting(GradientBoosting::fit(&x_train, &y_train, NUM_SIZES, &params)?)
            }
            ModelType::RandomForest => {
                let params = RandomForestParams {
                    n_estimators: self.n_estimators,
                    seed: self.seed,
                    ..RandomForestParams::default()
                };
                SizeModel::RandomForest(RandomForest::fit(&x_train, &y_train, NUM_SIZES, &params)?)
            }
        };

        let actual: Vec<SizeLabel> = test_idx.iter().map(|&i| labels[i]).collect();
        let predicted = x_test
            .iter()
            .map(|x| size_for_class(model.classify(x)))
            .collect::<Result<Vec<_>>>()?;

        let accuracy = accuracy(&actual, &predicted);
        let feature_importance = FEATURE_NAMES
            .iter()
            .zip(model.feature_importances())
            .map(|(name, v)| (name.to_string(), v))
            .collect();

        info!(model_type = %self.model_type, "Model trained with accuracy: {:.3}", accuracy);

        let report = TrainingReport {
            accuracy,
            model_type: self.model_type,
            feature_importance,
            classification_report: ClassificationReport::new(&actual, &predicted),
            train_samples: x_train.len(),
            test_samples: x_test.len(),
        };

        Ok(TrainedModel { model, scaler, report })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(shoulder: f64, size: SizeLabel) -> TrainingSample {
        TrainingSample {
            features: FeatureVector::new([shoulder, shoulder * 1.1, shoulder * 0.75, shoulder + 4.0, shoulder * 2.0, shoulder * 1.6]),
            size,
        }
    }

    /// Ten clean samples per size, spaced along the shoulder width.
    fn ladder() -> TrainingData {
        SizeLabel::ALL
            .iter()
            .flat_map(|&size| (0..10).map(move |i| sample(30.0 + size.index() as f64 * 5.0 + i as f64 * 0.4, size)))
            .collect()
    }

    #[test]
    fn stratified_split_keeps_proportions() {
        let labels: Vec<SizeLabel> = (0..100)
            .map(|i| if i < 80 { SizeLabel::M } else { SizeLabel::L })
            .collect();
        let (train, test) = stratified_split(&labels, 0.2, 42);

        assert_eq!(train.len() + test.len(), 100);
        assert_eq!(test.iter().filter(|&&i| labels[i] == SizeLabel::M).count(), 16);
        assert_eq!(test.iter().filter(|&&i| labels[i] == SizeLabel::L).count(), 4);

        let mut all: Vec<usize> = train.iter().chain(&test).copied().collect();
        all.sort_unstable();
        assert_eq!(all, (0..100).collect::<Vec<_>>());
    }

    #[test]
    fn stratified_split_is_seeded() {
        let labels = vec![SizeLabel::S; 30];
        assert_eq!(stratified_split(&labels, 0.2, 7), stratified_split(&labels, 0.2, 7));
    }

    #[test]
    fn singleton_class_stays_in_training() {
        let labels = [SizeLabel::XS, SizeLabel::M, SizeLabel::M, SizeLabel::M, SizeLabel::M, SizeLabel::M];
        let (train, test) = stratified_split(&labels, 0.2, 42);
        assert!(train.contains(&0));
        assert_eq!(test.len(), 1);
    }

    #[test]
    fn random_forest_on_clean_ladder() {
        let trained = Trainer::new(ModelType::RandomForest)
            .with_n_estimators(20)
            .train(&ladder())
            .unwrap();

        assert_eq!(trained.report.model_type, ModelType::RandomForest);
        assert_eq!(trained.report.train_samples + trained.report.test_samples, 60);
        assert_eq!(trained.report.test_samples, 12);
        assert!(trained.report.accuracy >= 0.75, "accuracy {}", trained.report.accuracy);
        assert_eq!(trained.report.feature_importance.len(), 6);
        let total: f64 = trained.report.feature_importance.values().sum();
        assert!((total - 1.0).abs() < 1e-9);

        assert_eq!(trained.classify(&sample(42.0, SizeLabel::M).features).unwrap(), SizeLabel::M);
    }

    #[test]
    fn gradient_boosting_on_clean_ladder() {
        let trained = Trainer::new(ModelType::GradientBoosting)
            .with_n_estimators(20)
            .train(&ladder())
            .unwrap();

        assert_eq!(trained.report.model_type, ModelType::GradientBoosting);
        assert!(trained.report.accuracy >= 0.75, "accuracy {}", trained.report.accuracy);
        assert_eq!(trained.classify(&sample(52.0, SizeLabel::XL).features).unwrap(), SizeLabel::XL);
    }

    #[test]
    fn class_index_maps_to_size_or_fails() {
        assert_eq!(size_for_class(0).unwrap(), SizeLabel::XS);
        assert_eq!(size_for_class(NUM_SIZES - 1).unwrap(), SizeLabel::XXL);
        assert!(matches!(size_for_class(NUM_SIZES), Err(Error::Inference(_))));
    }

    #[test]
    fn rejects_degenerate_tables() {
        let empty = TrainingData::default();
        assert!(matches!(train_model(&empty, ModelType::RandomForest), Err(Error::InvalidData(_))));

        let one_size: TrainingData = (0..10).map(|i| sample(40.0 + i as f64, SizeLabel::M)).collect();
        assert!(matches!(train_model(&one_size, ModelType::RandomForest), Err(Error::InvalidData(_))));

        let bad_split = Trainer::new(ModelType::RandomForest).with_test_size(1.5);
        assert!(bad_split.train(&ladder()).is_err());
    }

    #[test]
    fn csv_round_trip_and_missing_cells() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("train.csv");

        let data: TrainingData = vec![sample(40.0, SizeLabel::M), sample(50.5, SizeLabel::XL)].into_iter().collect();
        data.to_csv(&path).unwrap();
        let back = TrainingData::from_csv(&path).unwrap();
        assert_eq!(back, data);

        let sparse = dir.path().join("sparse.csv");
        std::fs::write(
            &sparse,
            "shoulder_width,chest_width,waist_width,hip_width,torso_length,arm_length,size\n\
             41.0,,33.0,,82.0,,M\n",
        )
        .unwrap();
        let loaded = TrainingData::from_csv(&sparse).unwrap();
        assert_eq!(loaded.samples()[0].features.values(), &[41.0, 0.0, 33.0, 0.0, 82.0, 0.0]);
        assert_eq!(loaded.samples()[0].size, SizeLabel::M);
    }

    #[test]
    fn csv_unknown_size_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.csv");
        std::fs::write(
            &path,
            "shoulder_width,chest_width,waist_width,hip_width,torso_length,arm_length,size\n\
             41.0,44,33,44,82,65,XXXL\n",
        )
        .unwrap();
        assert!(matches!(TrainingData::from_csv(&path), Err(Error::Csv(_))));
    }

    #[test]
    fn save_and_reload_into_estimator() {
        let trained = Trainer::new(ModelType::RandomForest)
            .with_n_estimators(5)
            .train(&ladder())
            .unwrap();
        let dir = tempfile::tempdir().unwrap();
        let model_path = dir.path().join("model.bin");
        let scaler_path = dir.path().join("scaler.bin");

        trained.save(&model_path, Some(scaler_path.as_path())).unwrap();
        assert_eq!(SizeModel::load(&model_path).unwrap(), trained.model);
        assert_eq!(StandardScaler::load(&scaler_path).unwrap(), trained.scaler);

        let estimator = trained.into_estimator();
        assert!(estimator.has_model());
        assert!(estimator.has_scaler());
    }
}
