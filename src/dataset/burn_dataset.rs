//! Burn Dataset Integration
//!
//! `ImageFolderDataset` implements Burn's `Dataset` trait over the discovered
//! samples and decodes/augments whole mini-batches in parallel.
//! `ImageBatcher` turns the resulting items into normalized device tensors.

use std::path::Path;

use burn::data::dataloader::batcher::Batcher;
use burn::data::dataset::Dataset;
use burn::prelude::*;
use image::ImageReader;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;

use crate::dataset::augmentation::Augmenter;
use crate::dataset::loader::{ImageFolder, ImageSample};
use crate::utils::error::{ClassifierError, Result};
use crate::{IMAGENET_MEAN, IMAGENET_STD};

/// A single image ready for batching
#[derive(Clone, Debug)]
pub struct ImageItem {
    /// Image data as flattened CHW float array [3 * H * W], scaled to [0, 1]
    pub image: Vec<f32>,
    /// Class label index
    pub label: usize,
    /// Image path (for logging)
    pub path: String,
}

impl ImageItem {
    /// Decode an image file and run it through the augmenter
    ///
    /// With `rng = None` only the resize and tensor conversion are applied.
    pub fn from_path(
        path: &Path,
        label: usize,
        augmenter: &Augmenter,
        rng: Option<&mut ChaCha8Rng>,
    ) -> Result<Self> {
        let img = ImageReader::open(path)
            .map_err(|e| ClassifierError::ImageLoad(path.to_path_buf(), e.to_string()))?
            .with_guessed_format()
            .map_err(|e| ClassifierError::ImageLoad(path.to_path_buf(), e.to_string()))?
            .decode()
            .map_err(|e| ClassifierError::ImageLoad(path.to_path_buf(), e.to_string()))?;

        Ok(Self {
            image: augmenter.preprocess(img, rng),
            label,
            path: path.to_string_lossy().to_string(),
        })
    }
}

/// Lazily loaded image-folder dataset
///
/// Items are decoded on demand; nothing is cached between epochs since every
/// epoch sees a fresh augmentation of each image.
#[derive(Clone, Debug)]
pub struct ImageFolderDataset {
    samples: Vec<ImageSample>,
    augmenter: Augmenter,
}

impl ImageFolderDataset {
    pub fn new(samples: Vec<ImageSample>, augmenter: Augmenter) -> Self {
        Self { samples, augmenter }
    }

    pub fn from_folder(folder: &ImageFolder, augmenter: Augmenter) -> Self {
        Self::new(folder.samples.clone(), augmenter)
    }

    /// Decode and augment the samples at `indices` in parallel
    ///
    /// One seed per item is drawn from `rng` up front, so the result does
    /// not depend on how rayon schedules the work.
    pub fn load_batch(&self, indices: &[usize], rng: &mut ChaCha8Rng) -> Result<Vec<ImageItem>> {
        let jobs: Vec<(&ImageSample, u64)> = indices
            .iter()
            .map(|&idx| {
                self.samples
                    .get(idx)
                    .map(|sample| (sample, rng.gen::<u64>()))
                    .ok_or_else(|| {
                        ClassifierError::Dataset(format!("sample index {} out of range", idx))
                    })
            })
            .collect::<Result<_>>()?;

        jobs.par_iter()
            .map(|(sample, seed)| {
                let mut item_rng = ChaCha8Rng::seed_from_u64(*seed);
                ImageItem::from_path(&sample.path, sample.label, &self.augmenter, Some(&mut item_rng))
            })
            .collect()
    }
}

impl Dataset<ImageItem> for ImageFolderDataset {
    /// Un-augmented item; training goes through `load_batch` instead
    fn get(&self, index: usize) -> Option<ImageItem> {
        let sample = self.samples.get(index)?;
        ImageItem::from_path(&sample.path, sample.label, &self.augmenter, None).ok()
    }

    fn len(&self) -> usize {
        self.samples.len()
    }
}

/// A batch of images for training
#[derive(Clone, Debug)]
pub struct ImageBatch<B: Backend> {
    /// Batch of images with shape [batch_size, 3, height, width]
    pub images: Tensor<B, 4>,
    /// Batch of labels with shape [batch_size]
    pub targets: Tensor<B, 1, Int>,
}

/// Batcher stacking `ImageItem`s and applying ImageNet normalization
#[derive(Clone, Debug)]
pub struct ImageBatcher {
    image_size: usize,
}

impl ImageBatcher {
    pub fn new(image_size: usize) -> Self {
        Self { image_size }
    }
}

impl<B: Backend> Batcher<B, ImageItem, ImageBatch<B>> for ImageBatcher {
    fn batch(&self, items: Vec<ImageItem>, device: &B::Device) -> ImageBatch<B> {
        let batch_size = items.len();
        let channels = 3;
        let height = self.image_size;
        let width = self.image_size;

        let mut images_data = Vec::with_capacity(batch_size * channels * height * width);
        let mut targets_data = Vec::with_capacity(batch_size);
        for item in items {
            images_data.extend(item.image);
            targets_data.push(item.label as i64);
        }

        let images = Tensor::<B, 4>::from_floats(
            TensorData::new(images_data, [batch_size, channels, height, width]),
            device,
        );

        // (x - mean) / std per channel
        let mean = Tensor::<B, 4>::from_floats(
            TensorData::new(IMAGENET_MEAN.to_vec(), [1, 3, 1, 1]),
            device,
        );
        let std = Tensor::<B, 4>::from_floats(
            TensorData::new(IMAGENET_STD.to_vec(), [1, 3, 1, 1]),
            device,
        );
        let images = (images - mean) / std;

        let targets =
            Tensor::<B, 1, Int>::from_data(TensorData::new(targets_data, [batch_size]), device);

        ImageBatch { images, targets }
    }
}
