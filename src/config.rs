//! Estimator configuration, loaded from TOML with environment overrides.

use std::env;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::normalize::DEFAULT_REFERENCE_HEIGHT;
use crate::predictor::DEFAULT_CONFIDENCE_THRESHOLD;

pub const DEFAULT_MODEL_PATH: &str = "models/trained/size_estimation_model.bin";
pub const DEFAULT_SCALER_PATH: &str = "models/trained/size_scaler.bin";

pub const ENV_MODEL_PATH: &str = "TRYON_MODEL_PATH";
pub const ENV_SCALER_PATH: &str = "TRYON_SCALER_PATH";
pub const ENV_LOG_LEVEL: &str = "TRYON_LOG_LEVEL";

/// Settings for building a [`crate::SizeEstimator`].
///
/// Every field has a default, so a config file only needs the keys it changes:
///
/// ```toml
/// model_path = "/srv/tryon/model.bin"
/// confidence_threshold = 0.6
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EstimatorConfig {
    pub model_path: PathBuf,
    pub scaler_path: PathBuf,
    /// Target height (cm) measurements are normalized to.
    pub reference_height: f64,
    pub confidence_threshold: f64,
    /// Default `tracing` filter directive for the CLI.
    pub log_level: String,
}

impl Default for EstimatorConfig {
    fn default() -> Self {
        Self {
            model_path: PathBuf::from(DEFAULT_MODEL_PATH),
            scaler_path: PathBuf::from(DEFAULT_SCALER_PATH),
            reference_height: DEFAULT_REFERENCE_HEIGHT,
            confidence_threshold: DEFAULT_CONFIDENCE_THRESHOLD,
            log_level: "info".to_string(),
        }
    }
}

impl EstimatorConfig {
    /// Parse a TOML file. The result is validated.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }

    /// File (or defaults) plus environment overrides, validated.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        let config = config.with_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Apply `TRYON_*` environment variables on top of this config.
    pub fn with_env_overrides(self) -> Self {
        self.with_overrides(|key| env::var(key).ok())
    }

    fn with_overrides<F: Fn(&str) -> Option<String>>(mut self, lookup: F) -> Self {
        if let Some(path) = lookup(ENV_MODEL_PATH) {
            self.model_path = PathBuf::from(path);
        }
        if let Some(path) = lookup(ENV_SCALER_PATH) {
            self.scaler_path = PathBuf::from(path);
        }
        if let Some(level) = lookup(ENV_LOG_LEVEL) {
            self.log_level = level;
        }
        self
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.reference_height.is_finite() && self.reference_height > 0.0) {
            return Err(Error::InvalidConfig(format!(
                "reference_height must be positive, got {}",
                self.reference_height
            )));
        }
        if !(0.0..=1.0).contains(&self.confidence_threshold) {
            return Err(Error::InvalidConfig(format!(
                "confidence_threshold must be in [0, 1], got {}",
                self.confidence_threshold
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn defaults() {
        let config = EstimatorConfig::default();
        assert_eq!(config.model_path, Path::new(DEFAULT_MODEL_PATH));
        assert_eq!(config.reference_height, 170.0);
        assert_eq!(config.confidence_threshold, 0.7);
        assert_eq!(config.log_level, "info");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn partial_file_keeps_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tryon.toml");
        std::fs::write(&path, "confidence_threshold = 0.55\nmodel_path = \"m.bin\"\n").unwrap();

        let config = EstimatorConfig::from_file(&path).unwrap();
        assert_eq!(config.confidence_threshold, 0.55);
        assert_eq!(config.model_path, Path::new("m.bin"));
        assert_eq!(config.scaler_path, Path::new(DEFAULT_SCALER_PATH));
    }

    #[test]
    fn invalid_values_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tryon.toml");

        std::fs::write(&path, "reference_height = -1.0\n").unwrap();
        assert!(matches!(EstimatorConfig::from_file(&path), Err(Error::InvalidConfig(_))));

        std::fs::write(&path, "confidence_threshold = 1.5\n").unwrap();
        assert!(matches!(EstimatorConfig::from_file(&path), Err(Error::InvalidConfig(_))));

        std::fs::write(&path, "reference_height = \"tall\"\n").unwrap();
        assert!(matches!(EstimatorConfig::from_file(&path), Err(Error::ConfigParse(_))));
    }

    #[test]
    fn overrides_replace_fields() {
        let env: HashMap<&str, &str> = [(ENV_MODEL_PATH, "/tmp/model.bin"), (ENV_LOG_LEVEL, "debug")]
            .into_iter()
            .collect();
        let config = EstimatorConfig::default().with_overrides(|k| env.get(k).map(|v| v.to_string()));

        assert_eq!(config.model_path, Path::new("/tmp/model.bin"));
        assert_eq!(config.scaler_path, Path::new(DEFAULT_SCALER_PATH));
        assert_eq!(config.log_level, "debug");
    }
}
