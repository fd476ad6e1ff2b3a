//! Error types for the SLAM engine

use thiserror::Error;

/// Errors reported by the map, the cycle driver and the configuration helpers.
///
/// Numerical degeneracies (zero horizontal range, collapsed weights, singular innovation
/// covariance) are recovered from locally and never surface here.
#[derive(Error, Debug)]
pub enum AslamError {
    #[error("landmark index {index} is not registered ({registered} landmarks known)")]
    InvalidIndex { index: usize, registered: usize },

    #[error("unknown landmark: {0}")]
    UnknownLandmark(String),

    #[error("landmark name already registered: {0}")]
    DuplicateLandmark(String),

    #[error("particle population must contain at least one particle")]
    EmptyPopulation,

    #[error("time step must be finite and positive, got {0}")]
    InvalidTimeStep(f64),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

impl From<serde_json::Error> for AslamError {
    fn from(e: serde_json::Error) -> Self {
        AslamError::Config(e.to_string())
    }
}

impl From<serde_yaml::Error> for AslamError {
    fn from(e: serde_yaml::Error) -> Self {
        AslamError::Config(e.to_string())
    }
}

impl From<toml::de::Error> for AslamError {
    fn from(e: toml::de::Error) -> Self {
        AslamError::Config(e.to_string())
    }
}

impl From<toml::ser::Error> for AslamError {
    fn from(e: toml::ser::Error) -> Self {
        AslamError::Config(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, AslamError>;
