use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Model serialization error: {0}")]
    Serialization(#[from] bincode::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Config parse error: {0}")]
    ConfigParse(#[from] toml::de::Error),

    #[error("Invalid config: {0}")]
    InvalidConfig(String),

    #[error("Invalid model: {0}")]
    InvalidModel(String),

    #[error("Unsupported model type: {0} (expected 'xgboost', 'gradient_boosting' or 'random_forest')")]
    UnsupportedModelType(String),

    #[error("Invalid training data: {0}")]
    InvalidData(String),

    #[error("Inference failed: {0}")]
    Inference(String),

    #[error("Unknown size label: {0}")]
    UnknownSize(String),
}

pub type Result<T> = std::result::Result<T, Error>;
