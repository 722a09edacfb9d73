//! Size prediction with a rule-based fallback.
//!
//! [`SizeEstimator`] owns the classifier and scaler loaded at startup and is
//! immutable afterwards, so one instance can be shared by any number of
//! request handlers. Prediction never fails: a missing model, a corrupt
//! artifact or an inference error all end in the shoulder-width rule.

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use crate::config::EstimatorConfig;
use crate::error::{Error, Result};
use crate::features::extract_features;
use crate::model::{Classifier, SizeModel};
use crate::normalize::{normalize_measurements, DEFAULT_REFERENCE_HEIGHT};
use crate::scaler::StandardScaler;
use crate::types::{Measurements, SizeLabel, NUM_SIZES, SHOULDER_WIDTH};

/// Confidence below which a model prediction is logged as uncertain.
pub const DEFAULT_CONFIDENCE_THRESHOLD: f64 = 0.7;

/// Confidence reported for every rule-based prediction.
pub const RULE_BASED_CONFIDENCE: f64 = 0.5;

/// Upper shoulder-width bounds (exclusive) for each size; wider is XXL.
const SHOULDER_BOUNDS: [(f64, SizeLabel); 5] = [
    (35.0, SizeLabel::XS),
    (40.0, SizeLabel::S),
    (45.0, SizeLabel::M),
    (50.0, SizeLabel::L),
    (55.0, SizeLabel::XL),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PredictionMethod {
    Model,
    RuleBased,
}

/// Result of a size prediction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    pub predicted_size: SizeLabel,
    pub confidence: f64,
    /// Per-class probabilities in XS..XXL order, when the classifier has them.
    pub all_probabilities: Option<Vec<f64>>,
    pub method: PredictionMethod,
    /// Normalized measurements for model predictions, the raw input for
    /// rule-based ones.
    pub measurements_used: Measurements,
}

/// Size lookup on shoulder width alone.
pub fn size_from_shoulder_width(shoulder_width: f64) -> SizeLabel {
    SHOULDER_BOUNDS
        .iter()
        .find(|(bound, _)| shoulder_width < *bound)
        .map_or(SizeLabel::XXL, |(_, size)| *size)
}

/// Deterministic fallback prediction. A missing shoulder width counts as 0.
pub fn rule_based_prediction(measurements: &Measurements) -> Prediction {
    let shoulder_width = measurements.get_f64(SHOULDER_WIDTH).unwrap_or(0.0);

    Prediction {
        predicted_size: size_from_shoulder_width(shoulder_width),
        confidence: RULE_BASED_CONFIDENCE,
        all_probabilities: None,
        method: PredictionMethod::RuleBased,
        measurements_used: measurements.clone(),
    }
}

pub struct SizeEstimator {
    classifier: Option<Classifier>,
    scaler: Option<StandardScaler>,
    reference_height: f64,
    confidence_threshold: f64,
}

impl SizeEstimator {
    pub fn new(classifier: Option<Classifier>, scaler: Option<StandardScaler>) -> Self {
        Self {
            classifier,
            scaler,
            reference_height: DEFAULT_REFERENCE_HEIGHT,
            confidence_threshold: DEFAULT_CONFIDENCE_THRESHOLD,
        }
    }

    /// An estimator with no model; every prediction is rule-based.
    pub fn rule_based() -> Self {
        Self::new(None, None)
    }

    pub fn with_reference_height(mut self, reference_height: f64) -> Self {
        self.reference_height = reference_height;
        self
    }

    pub fn with_confidence_threshold(mut self, threshold: f64) -> Self {
        self.confidence_threshold = threshold;
        self
    }

    /// Load whichever artifacts exist.
    ///
    /// Missing files are expected and only downgrade the estimator; files
    /// that exist but fail to load are logged and treated as missing.
    pub fn from_paths(model_path: Option<&Path>, scaler_path: Option<&Path>) -> Self {
        let classifier = model_path
            .and_then(|path| load_optional(path, "model", |p| SizeModel::load(p)))
            .map(Classifier::from);
        let scaler = scaler_path.and_then(|path| load_optional(path, "scaler", |p| StandardScaler::load(p)));

        if classifier.is_none() {
            info!("No size model available, using rule-based estimation");
        }

        Self::new(classifier, scaler)
    }

    pub fn from_config(config: &EstimatorConfig) -> Self {
        Self::from_paths(Some(config.model_path.as_path()), Some(config.scaler_path.as_path()))
            .with_reference_height(config.reference_height)
            .with_confidence_threshold(config.confidence_threshold)
    }

    pub fn has_model(&self) -> bool {
        self.classifier.is_some()
    }

    pub fn has_scaler(&self) -> bool {
        self.scaler.is_some()
    }

    pub fn confidence_threshold(&self) -> f64 {
        self.confidence_threshold
    }

    /// Predict with the estimator's configured confidence threshold.
    pub fn predict(&self, measurements: &Measurements) -> Prediction {
        self.predict_size(measurements, self.confidence_threshold)
    }

    /// Predict a clothing size from body measurements.
    ///
    /// Low-confidence predictions are logged but still returned.
    pub fn predict_size(&self, measurements: &Measurements, confidence_threshold: f64) -> Prediction {
        let Some(classifier) = &self.classifier else {
            warn!("No model loaded. Using rule-based estimation.");
            return rule_based_prediction(measurements);
        };

        match self.predict_with_model(classifier, measurements, confidence_threshold) {
            Ok(prediction) => prediction,
            Err(e) => {
                error!("Error in size prediction: {}", e);
                rule_based_prediction(measurements)
            }
        }
    }

    fn predict_with_model(
        &self,
        classifier: &Classifier,
        measurements: &Measurements,
        confidence_threshold: f64,
    ) -> Result<Prediction> {
        let normalized = normalize_measurements(measurements, self.reference_height);
        let mut features = extract_features(&normalized);
        if let Some(scaler) = &self.scaler {
            features = scaler.transform(&features);
        }

        let (class, confidence, all_probabilities) = match classifier {
            Classifier::Probabilistic(model) => {
                let probabilities = model.predict_proba(&features)?;
                let (class, confidence) = top_class(&probabilities)?;
                (class, confidence, Some(probabilities))
            }
            Classifier::HardLabel(model) => (model.predict(&features)?, 1.0, None),
        };

        let predicted_size = SizeLabel::from_index(class)
            .ok_or_else(|| Error::Inference(format!("class index {class} out of range")))?;

        if confidence < confidence_threshold {
            warn!(size = %predicted_size, "Low confidence prediction: {:.2}", confidence);
        } else {
            debug!(size = %predicted_size, confidence, "Size predicted");
        }

        Ok(Prediction {
            predicted_size,
            confidence,
            all_probabilities,
            method: PredictionMethod::Model,
            measurements_used: normalized,
        })
    }
}

impl std::fmt::Debug for SizeEstimator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SizeEstimator")
            .field("classifier", &self.classifier)
            .field("has_scaler", &self.scaler.is_some())
            .field("reference_height", &self.reference_height)
            .field("confidence_threshold", &self.confidence_threshold)
            .finish()
    }
}

fn load_optional<T, F>(path: &Path, what: &str, load: F) -> Option<T>
where
    F: Fn(&Path) -> Result<T>,
{
    if !path.exists() {
        debug!("No {} found at {}", what, path.display());
        return None;
    }

    match load(path) {
        Ok(value) => {
            info!("{} loaded from {}", capitalize(what), path.display());
            Some(value)
        }
        Err(e) => {
            error!("Error loading {} from {}: {}", what, path.display(), e);
            None
        }
    }
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Arg-max over a full, finite probability vector.
fn top_class(probabilities: &[f64]) -> Result<(usize, f64)> {
    if probabilities.len() != NUM_SIZES {
        return Err(Error::Inference(format!(
            "classifier returned {} probabilities, expected {}",
            probabilities.len(),
            NUM_SIZES
        )));
    }
    if probabilities.iter().any(|p| !p.is_finite()) {
        return Err(Error::Inference("classifier returned a non-finite probability".into()));
    }

    let mut best = 0;
    for (i, p) in probabilities.iter().enumerate() {
        if *p > probabilities[best] {
            best = i;
        }
    }
    Ok((best, probabilities[best]))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::FeatureVector;
    use crate::model::{LabelClassifier, ProbabilisticClassifier};
    use crate::types::{CHEST_WIDTH, TORSO_LENGTH};

    struct Fixed(Vec<f64>);

    impl ProbabilisticClassifier for Fixed {
        fn predict_proba(&self, _: &FeatureVector) -> Result<Vec<f64>> {
            Ok(self.0.clone())
        }
    }

    struct Failing;

    impl ProbabilisticClassifier for Failing {
        fn predict_proba(&self, _: &FeatureVector) -> Result<Vec<f64>> {
            Err(Error::Inference("model exploded".into()))
        }
    }

    impl LabelClassifier for Failing {
        fn predict(&self, _: &FeatureVector) -> Result<usize> {
            Err(Error::Inference("model exploded".into()))
        }
    }

    struct Label(usize);

    impl LabelClassifier for Label {
        fn predict(&self, _: &FeatureVector) -> Result<usize> {
            Ok(self.0)
        }
    }

    /// Records the features it was given, as the first probability.
    struct EchoFirstFeature;

    impl ProbabilisticClassifier for EchoFirstFeature {
        fn predict_proba(&self, features: &FeatureVector) -> Result<Vec<f64>> {
            let mut p = vec![0.0; NUM_SIZES];
            p[0] = features[0];
            Ok(p)
        }
    }

    fn shoulder(width: f64) -> Measurements {
        [(SHOULDER_WIDTH, width)].into_iter().collect()
    }

    #[test]
    fn rule_based_thresholds() {
        let cases = [
            (34.0, SizeLabel::XS),
            (39.0, SizeLabel::S),
            (44.0, SizeLabel::M),
            (49.0, SizeLabel::L),
            (54.0, SizeLabel::XL),
            (60.0, SizeLabel::XXL),
        ];
        for (width, expected) in cases {
            assert_eq!(rule_based_prediction(&shoulder(width)).predicted_size, expected, "width {width}");
        }
    }

    #[test]
    fn rule_based_boundaries_belong_to_the_upper_size() {
        assert_eq!(size_from_shoulder_width(35.0), SizeLabel::S);
        assert_eq!(size_from_shoulder_width(55.0), SizeLabel::XXL);
        assert_eq!(size_from_shoulder_width(-3.0), SizeLabel::XS);
    }

    #[test]
    fn rule_based_is_monotonic() {
        let mut previous = SizeLabel::XS;
        for w in 0..80 {
            let size = size_from_shoulder_width(w as f64);
            assert!(size >= previous);
            previous = size;
        }
    }

    #[test]
    fn no_model_means_rule_based() {
        let estimator = SizeEstimator::rule_based();
        assert!(!estimator.has_model());

        for m in [Measurements::new(), shoulder(47.0)] {
            let p = estimator.predict(&m);
            assert_eq!(p.method, PredictionMethod::RuleBased);
            assert_eq!(p.confidence, 0.5);
            assert_eq!(p.all_probabilities, None);
            assert_eq!(p.measurements_used, m);
        }
    }

    #[test]
    fn missing_shoulder_is_xs() {
        let mut m = Measurements::new();
        m.insert(SHOULDER_WIDTH, "broad");
        assert_eq!(rule_based_prediction(&m).predicted_size, SizeLabel::XS);
    }

    #[test]
    fn probabilistic_model_reports_argmax() {
        let estimator = SizeEstimator::new(
            Some(Classifier::probabilistic(Fixed(vec![0.05, 0.1, 0.6, 0.15, 0.05, 0.05]))),
            None,
        );
        let p = estimator.predict_size(&shoulder(42.0), 0.7);

        assert_eq!(p.method, PredictionMethod::Model);
        assert_eq!(p.predicted_size, SizeLabel::M);
        assert_eq!(p.confidence, 0.6);
        assert_eq!(p.all_probabilities.as_deref().map(<[f64]>::len), Some(NUM_SIZES));
    }

    #[test]
    fn hard_label_model_has_full_confidence() {
        let estimator = SizeEstimator::new(Some(Classifier::hard_label(Label(4))), None);
        let p = estimator.predict(&shoulder(30.0));

        assert_eq!(p.method, PredictionMethod::Model);
        assert_eq!(p.predicted_size, SizeLabel::XL);
        assert_eq!(p.confidence, 1.0);
        assert_eq!(p.all_probabilities, None);
    }

    #[test]
    fn failing_model_falls_back() {
        for classifier in [Classifier::probabilistic(Failing), Classifier::hard_label(Failing)] {
            let estimator = SizeEstimator::new(Some(classifier), None);
            let p = estimator.predict(&shoulder(52.0));
            assert_eq!(p.method, PredictionMethod::RuleBased);
            assert_eq!(p.predicted_size, SizeLabel::XL);
            assert_eq!(p.confidence, 0.5);
        }
    }

    #[test]
    fn malformed_model_output_falls_back() {
        let too_short = SizeEstimator::new(Some(Classifier::probabilistic(Fixed(vec![1.0]))), None);
        assert_eq!(too_short.predict(&shoulder(41.0)).method, PredictionMethod::RuleBased);

        let nan = SizeEstimator::new(
            Some(Classifier::probabilistic(Fixed(vec![f64::NAN; NUM_SIZES]))),
            None,
        );
        assert_eq!(nan.predict(&shoulder(41.0)).method, PredictionMethod::RuleBased);

        let out_of_range = SizeEstimator::new(Some(Classifier::hard_label(Label(6))), None);
        let p = out_of_range.predict(&shoulder(41.0));
        assert_eq!(p.method, PredictionMethod::RuleBased);
        assert_eq!(p.predicted_size, SizeLabel::M);
    }

    #[test]
    fn low_confidence_is_still_returned() {
        let estimator = SizeEstimator::new(
            Some(Classifier::probabilistic(Fixed(vec![0.2, 0.2, 0.2, 0.3, 0.05, 0.05]))),
            None,
        );
        let p = estimator.predict_size(&shoulder(47.0), 0.9);
        assert_eq!(p.method, PredictionMethod::Model);
        assert_eq!(p.predicted_size, SizeLabel::L);
        assert!((p.confidence - 0.3).abs() < 1e-12);
    }

    /// Log output collected by a scoped `tracing` subscriber.
    #[derive(Clone, Default)]
    struct CapturedLogs(std::sync::Arc<std::sync::Mutex<Vec<u8>>>);

    impl std::io::Write for CapturedLogs {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    impl CapturedLogs {
        fn text(&self) -> String {
            String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
        }
    }

    fn with_captured_logs<T>(f: impl FnOnce() -> T) -> (T, String) {
        let logs = CapturedLogs::default();
        let writer = logs.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_max_level(tracing::Level::DEBUG)
            .with_ansi(false)
            .with_writer(move || writer.clone())
            .finish();
        let value = tracing::subscriber::with_default(subscriber, f);
        (value, logs.text())
    }

    #[test]
    fn low_confidence_is_logged_as_warning() {
        let estimator = SizeEstimator::new(
            Some(Classifier::probabilistic(Fixed(vec![0.2, 0.2, 0.2, 0.3, 0.05, 0.05]))),
            None,
        );

        let (p, logs) = with_captured_logs(|| estimator.predict_size(&shoulder(47.0), 0.9));
        assert_eq!(p.predicted_size, SizeLabel::L);
        assert!(logs.contains("WARN"), "{logs}");
        assert!(logs.contains("Low confidence prediction: 0.30"), "{logs}");

        let (_, logs) = with_captured_logs(|| estimator.predict_size(&shoulder(47.0), 0.1));
        assert!(!logs.contains("Low confidence"), "{logs}");
    }

    #[test]
    fn model_path_normalizes_then_scales() {
        let scaler = StandardScaler::fit(&[
            FeatureVector::new([0.0; 6]),
            FeatureVector::new([0.4, 1.0, 1.0, 1.0, 1.0, 1.0]),
        ])
        .unwrap();
        // mean 0.2, std 0.2 on the first feature
        let estimator = SizeEstimator::new(Some(Classifier::probabilistic(EchoFirstFeature)), Some(scaler));

        let mut m = shoulder(0.1);
        m.insert(TORSO_LENGTH, 100.0);
        m.insert(CHEST_WIDTH, "n/a");
        let p = estimator.predict_size(&m, 0.0);

        // shoulder 0.1 * (170 / 35) = 0.4857..., then (x - 0.2) / 0.2
        let normalized = 0.1 * 170.0 / 35.0;
        let expected = (normalized - 0.2) / 0.2;
        assert_eq!(p.method, PredictionMethod::Model);
        assert!((p.all_probabilities.unwrap()[0] - expected).abs() < 1e-9);
        assert!((p.measurements_used.get_f64(SHOULDER_WIDTH).unwrap() - normalized).abs() < 1e-9);
        assert_eq!(p.measurements_used.get(CHEST_WIDTH), m.get(CHEST_WIDTH));
    }

    #[test]
    fn missing_artifacts_are_not_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let estimator = SizeEstimator::from_paths(
            Some(dir.path().join("absent_model.bin").as_path()),
            Some(dir.path().join("absent_scaler.bin").as_path()),
        );
        assert!(!estimator.has_model());
        assert!(!estimator.has_scaler());
        assert_eq!(estimator.predict(&shoulder(44.0)).predicted_size, SizeLabel::M);
    }

    #[test]
    fn corrupt_model_file_downgrades() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("size_estimation_model.bin");
        std::fs::write(&path, b"definitely not a model").unwrap();

        let estimator = SizeEstimator::from_paths(Some(path.as_path()), None);
        assert!(!estimator.has_model());
        assert_eq!(estimator.predict(&shoulder(44.0)).method, PredictionMethod::RuleBased);
    }

    #[test]
    fn prediction_json_shape() {
        let json = serde_json::to_value(rule_based_prediction(&shoulder(38.0))).unwrap();
        assert_eq!(json["predicted_size"], "S");
        assert_eq!(json["confidence"], 0.5);
        assert_eq!(json["method"], "rule_based");
        assert!(json["all_probabilities"].is_null());
        assert_eq!(json["measurements_used"]["shoulder_width"], 38.0);
    }

    #[test]
    fn estimator_is_shareable() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<SizeEstimator>();
    }
}
