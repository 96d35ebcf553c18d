//! Model module: classifier architectures and record persistence
//!
//! Weights are stored with Burn's `CompactRecorder` (named MessagePack,
//! half precision), the same format for every architecture.

pub mod cnn;
pub mod config;
pub mod densenet;

use std::path::Path;

use burn::module::Module;
use burn::record::CompactRecorder;
use burn::tensor::{backend::Backend, Tensor};

use crate::utils::error::{ClassifierError, Result};

pub use cnn::{CompactClassifier, CompactClassifierConfig};
pub use config::{Architecture, Classifier, ClassifierConfig};
pub use densenet::{DenseNet, DenseNetConfig};

/// Common interface of the classifier networks
pub trait ImageClassifier<B: Backend> {
    /// `[batch, 3, H, W]` normalized images to `[batch, num_classes]` logits
    fn forward(&self, images: Tensor<B, 4>) -> Tensor<B, 2>;

    /// Width of the output layer
    fn num_classes(&self) -> usize;
}

/// Load a record file into an already constructed module
pub fn load_record<B: Backend, M: Module<B>>(
    model: M,
    path: &Path,
    device: &B::Device,
) -> Result<M> {
    model
        .load_file(path.to_path_buf(), &CompactRecorder::new(), device)
        .map_err(|e| ClassifierError::Model(format!("failed to load {:?}: {}", path, e)))
}

/// Save a module's parameters
///
/// The recorder appends its `.mpk` extension when `path` has none.
pub fn save_record<B: Backend, M: Module<B>>(model: M, path: &Path) -> Result<()> {
    model
        .save_file(path.to_path_buf(), &CompactRecorder::new())
        .map_err(|e| ClassifierError::Model(format!("failed to save {:?}: {}", path, e)))
}
