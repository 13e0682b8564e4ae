//! Error types for depth-pro-core.

use std::path::PathBuf;

/// Result type alias using depth-pro-core Error.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised while loading configs or running the image processor.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Failed to read a config file.
    #[error("failed to read config file '{path}': {source}")]
    ReadFile {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Failed to parse YAML.
    #[error("failed to parse YAML: {0}")]
    ParseYaml(#[from] serde_yaml::Error),

    /// Failed to parse or serialize JSON.
    #[error("failed to parse JSON: {0}")]
    ParseJson(#[from] serde_json::Error),

    /// Invalid activation function name.
    #[error("invalid activation function: {0}")]
    InvalidActivation(String),

    /// Invalid resampling filter.
    #[error("invalid resample filter: {0}")]
    InvalidResample(String),

    /// Config invariant violated.
    #[error("validation error: {0}")]
    Validation(String),

    /// Bad argument to `preprocess` or `post_process_depth_estimation`.
    ///
    /// Raised before any per-image work starts.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Tensors could not be reshaped or stacked.
    #[error("shape error: {0}")]
    Shape(#[from] ndarray::ShapeError),
}

impl Error {
    pub(crate) fn invalid_argument(message: impl Into<String>) -> Self {
        Error::InvalidArgument(message.into())
    }
}
