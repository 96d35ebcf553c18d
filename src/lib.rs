//! # Region Classifier
//!
//! Image classification with the Burn framework: a one-shot fine-tuning
//! program and a single-model inference service.
//!
//! ## Modules
//!
//! - `dataset`: image-folder discovery, augmentation, Burn dataset and batcher
//! - `model`: the classifier architectures (DenseNet-121 and a compact CNN)
//! - `training`: weighted cross-entropy training loop with step-decay scheduling
//! - `inference`: preprocessing, label lists, confidence lookup and the
//!   explicitly constructed inference service
//! - `utils`: logging and error types
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use region_classifier::backend::{default_device, DefaultBackend};
//! use region_classifier::inference::{InferenceService, ServiceConfig};
//!
//! let service = InferenceService::<DefaultBackend>::load(ServiceConfig::classic(), default_device());
//! let response = service.predict_upload(Some(upload))?;
//! println!("{}", response.prediction);
//! ```

pub mod backend;
pub mod dataset;
pub mod inference;
pub mod model;
pub mod training;
pub mod utils;

// Re-export commonly used items for convenience
pub use dataset::{ClassWeights, ImageFolder};
pub use inference::{
    ConfidenceSource, ConfidenceTable, InferenceService, LabelList, PredictError, Prediction,
    PredictionResponse, Predictor, Preprocessor, ResponseShape, ServiceConfig, Upload,
};
pub use model::{Architecture, Classifier, ClassifierConfig};
pub use training::{run_training, TrainingConfig, TrainingOutputs, TrainingSummary};
pub use utils::error::{ClassifierError, Result};

/// ImageNet normalization mean values (RGB), shared by training and inference
pub const IMAGENET_MEAN: [f32; 3] = [0.485, 0.456, 0.406];

/// ImageNet normalization std values (RGB)
pub const IMAGENET_STD: [f32; 3] = [0.229, 0.224, 0.225];

/// Default square input size fed to the network
pub const IMAGE_SIZE: usize = 224;

/// Default shorter-side length images are resized to before center cropping
pub const RESIZE_SHORTER: usize = 256;

/// Default path of the trained weights (CompactRecorder format)
pub const DEFAULT_MODEL_PATH: &str = "model.mpk";

/// Default path of the newline-delimited label list
pub const DEFAULT_LABELS_PATH: &str = "class_names.txt";

/// Version of the library
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
