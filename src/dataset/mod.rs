//! Dataset module: image-folder discovery, augmentation and Burn integration

pub mod augmentation;
pub mod burn_dataset;
pub mod loader;

pub use augmentation::{AugmentationConfig, Augmenter};
pub use burn_dataset::{ImageBatch, ImageBatcher, ImageFolderDataset, ImageItem};
pub use loader::{ClassWeights, DatasetStats, ImageFolder, ImageSample, IMAGE_EXTENSIONS};
