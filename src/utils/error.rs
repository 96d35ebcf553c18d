//! Error Handling Module
//!
//! Defines the error type shared by dataset loading, model persistence and
//! training. The request path has its own narrower `PredictError`
//! (see `inference::service`).

use std::path::PathBuf;

use thiserror::Error;

/// Main error type for region classifier operations
#[derive(Error, Debug)]
pub enum ClassifierError {
    /// Error decoding or processing an image
    #[error("Failed to load image at '{0}': {1}")]
    ImageLoad(PathBuf, String),

    /// Error decoding an in-memory image
    #[error("Image decode error: {0}")]
    ImageDecode(String),

    /// The expected dataset directory is missing
    #[error("Dataset directory not found: {0}")]
    DatasetMissing(PathBuf),

    /// Error with dataset contents
    #[error("Dataset error: {0}")]
    Dataset(String),

    /// Error loading, saving or running a model
    #[error("Model error: {0}")]
    Model(String),

    /// Error with the label list
    #[error("Label list error: {0}")]
    Labels(String),

    /// Error with training
    #[error("Training error: {0}")]
    Training(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for ClassifierError {
    fn from(err: serde_json::Error) -> Self {
        ClassifierError::Serialization(err.to_string())
    }
}

impl From<image::ImageError> for ClassifierError {
    fn from(err: image::ImageError) -> Self {
        ClassifierError::ImageDecode(err.to_string())
    }
}

/// Convenience Result type for region classifier operations
pub type Result<T> = std::result::Result<T, ClassifierError>;
