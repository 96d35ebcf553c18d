//! Inference module
//!
//! - `preprocess`: resize, center-crop and normalize uploaded images
//! - `labels`: newline-delimited class names
//! - `confidence`: static per-label confidence table
//! - `predictor`: model + labels + preprocessing, argmax to label
//! - `service`: request validation and response shaping for the HTTP layer

pub mod confidence;
pub mod labels;
pub mod predictor;
pub mod preprocess;
pub mod service;

pub use confidence::{ConfidenceSource, ConfidenceTable};
pub use labels::LabelList;
pub use predictor::{argmax, Prediction, Predictor};
pub use preprocess::Preprocessor;
pub use service::{
    InferenceService, PredictError, PredictionResponse, ResponseShape, ServiceConfig, Upload,
};
