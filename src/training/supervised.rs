//! Supervised Fine-Tuning
//!
//! A custom training loop over an image folder: shuffled mini-batches,
//! class-weighted cross-entropy, Adam and a step-decay learning rate.
//! There is no validation split and no intermediate checkpointing; the
//! weights and the label list are written once, after the last epoch.

use std::path::{Path, PathBuf};
use std::time::Instant;

use burn::{
    config::Config,
    data::dataloader::batcher::Batcher,
    module::AutodiffModule,
    optim::{AdamConfig, GradientsParams, Optimizer},
    tensor::{backend::AutodiffBackend, ElementConversion, Tensor, TensorData},
};
use chrono::Local;
use indicatif::{ProgressBar, ProgressStyle};
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::loss::weighted_cross_entropy;
use super::scheduler::LrScheduler;
use crate::dataset::{
    Augmenter, ClassWeights, ImageBatch, ImageBatcher, ImageFolder, ImageFolderDataset, ImageItem,
};
use crate::inference::LabelList;
use crate::model::config::load_pretrained_densenet;
use crate::model::{save_record, Architecture, CompactClassifierConfig, DenseNetConfig, ImageClassifier};
use crate::utils::error::{self, ClassifierError};
use crate::utils::logging::TrainingLogger;
use crate::{DEFAULT_LABELS_PATH, DEFAULT_MODEL_PATH};

/// Dataset root used when none is given; images are read from its `train/`
pub const DEFAULT_DATA_ROOT: &str = "/tmp/split_dataset";

/// Training hyperparameters
#[derive(Config, Debug)]
pub struct TrainingConfig {
    #[config(default = "1e-4")]
    pub learning_rate: f64,

    /// Side length of the square training crops
    #[config(default = "224")]
    pub image_size: usize,

    #[config(default = "30")]
    pub num_epochs: usize,

    #[config(default = "16")]
    pub batch_size: usize,

    /// Epochs between learning-rate decays
    #[config(default = "7")]
    pub step_size: usize,

    /// Learning-rate decay factor
    #[config(default = "0.1")]
    pub gamma: f64,

    #[config(default = "42")]
    pub seed: u64,

    #[config(default = "Architecture::DenseNet121")]
    pub architecture: Architecture,

    /// Base filter count of the compact network
    #[config(default = "32")]
    pub base_filters: usize,

    /// ImageNet-pretrained DenseNet-121 to start from: a torchvision
    /// `.pth` state dict or a CompactRecorder record
    pub pretrained: Option<String>,
}

impl TrainingConfig {
    pub fn validate(&self) -> error::Result<()> {
        if self.num_epochs == 0 || self.batch_size == 0 || self.image_size < 16 {
            return Err(ClassifierError::Config(
                "num_epochs and batch_size must be positive and image_size at least 16".to_string(),
            ));
        }
        if self.pretrained.is_some() && self.architecture != Architecture::DenseNet121 {
            return Err(ClassifierError::Config(
                "a pretrained record can only be used with densenet121".to_string(),
            ));
        }
        Ok(())
    }
}

/// Where the trained artifacts are written
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingOutputs {
    pub model_path: PathBuf,
    pub labels_path: PathBuf,
}

impl Default for TrainingOutputs {
    fn default() -> Self {
        Self {
            model_path: PathBuf::from(DEFAULT_MODEL_PATH),
            labels_path: PathBuf::from(DEFAULT_LABELS_PATH),
        }
    }
}

impl TrainingOutputs {
    /// Default file names inside `dir`
    pub fn in_dir(dir: &Path) -> Self {
        Self {
            model_path: dir.join(DEFAULT_MODEL_PATH),
            labels_path: dir.join(DEFAULT_LABELS_PATH),
        }
    }
}

/// What a finished run produced
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainingSummary {
    pub classes: Vec<String>,
    pub num_samples: usize,
    pub class_weights: Vec<f32>,
    /// Average batch loss of every epoch
    pub epoch_losses: Vec<f64>,
    pub model_path: PathBuf,
    pub labels_path: PathBuf,
    pub duration_secs: f64,
    pub finished_at: String,
}

/// Train on `<data_root>/train` and write the weights and label list
///
/// Fails with `ClassifierError::DatasetMissing` when the `train/`
/// directory does not exist, before anything else is touched.
pub fn run_training<B: AutodiffBackend>(
    data_root: &Path,
    config: &TrainingConfig,
    outputs: &TrainingOutputs,
    device: B::Device,
) -> error::Result<TrainingSummary> {
    config.validate()?;
    let start = Instant::now();

    B::seed(&device, config.seed);
    let mut rng = ChaCha8Rng::seed_from_u64(config.seed);

    let train_dir = data_root.join("train");
    if !train_dir.is_dir() {
        return Err(ClassifierError::DatasetMissing(train_dir));
    }

    let folder = ImageFolder::new(&train_dir)?;
    if folder.is_empty() {
        return Err(ClassifierError::Dataset(format!(
            "no images found under {:?}",
            train_dir
        )));
    }
    let class_weights = folder.class_weights()?;
    let labels = LabelList::new(folder.classes.clone())?;
    let num_classes = labels.len();

    info!(
        "Training {} on {} images in {} classes",
        config.architecture,
        folder.len(),
        num_classes
    );
    for (name, weight) in labels.names().iter().zip(class_weights.as_slice()) {
        info!("  class weight {:<20} {:.4}", name, weight);
    }

    let dataset = ImageFolderDataset::from_folder(
        &folder,
        Augmenter::with_defaults(config.image_size as u32),
    );

    let epoch_losses = match config.architecture {
        Architecture::DenseNet121 => {
            let model = match &config.pretrained {
                Some(path) => load_pretrained_densenet::<B>(Path::new(path), num_classes, &device)?,
                None => {
                    warn!(
                        "Training densenet121 from random initialization; \
                         set a pretrained checkpoint to fine-tune instead"
                    );
                    DenseNetConfig::densenet121(num_classes).init::<B>(&device)
                }
            };
            let (model, losses) =
                fit(model, &dataset, &class_weights, config, &device, &mut rng)?;
            write_model::<B::InnerBackend, _>(model.valid(), outputs)?;
            losses
        }
        Architecture::Compact => {
            let model = CompactClassifierConfig::new(num_classes)
                .with_base_filters(config.base_filters)
                .init::<B>(&device);
            let (model, losses) =
                fit(model, &dataset, &class_weights, config, &device, &mut rng)?;
            write_model::<B::InnerBackend, _>(model.valid(), outputs)?;
            losses
        }
    };

    labels.save(&outputs.labels_path)?;
    info!("Class names saved to {:?}", outputs.labels_path);

    Ok(TrainingSummary {
        classes: labels.names().to_vec(),
        num_samples: folder.len(),
        class_weights: class_weights.weights,
        epoch_losses,
        model_path: outputs.model_path.clone(),
        labels_path: outputs.labels_path.clone(),
        duration_secs: start.elapsed().as_secs_f64(),
        finished_at: Local::now().format("%Y-%m-%d %H:%M:%S").to_string(),
    })
}

/// The epoch loop, generic over the network
fn fit<B, M>(
    mut model: M,
    dataset: &ImageFolderDataset,
    class_weights: &ClassWeights,
    config: &TrainingConfig,
    device: &B::Device,
    rng: &mut ChaCha8Rng,
) -> error::Result<(M, Vec<f64>)>
where
    B: AutodiffBackend,
    M: AutodiffModule<B> + ImageClassifier<B>,
{
    use burn::data::dataset::Dataset;

    let mut optimizer = AdamConfig::new().init::<B, M>();
    let scheduler = LrScheduler::step_lr(config.learning_rate, config.step_size, config.gamma);
    let batcher = ImageBatcher::new(config.image_size);
    let weights = Tensor::<B, 1>::from_floats(
        TensorData::new(class_weights.weights.clone(), [class_weights.len()]),
        device,
    );

    let mut logger = TrainingLogger::new(config.num_epochs);
    let mut epoch_losses = Vec::with_capacity(config.num_epochs);

    for epoch in 0..config.num_epochs {
        let lr = scheduler.get_lr(epoch);
        logger.start_epoch(epoch, lr);

        let mut indices: Vec<usize> = (0..dataset.len()).collect();
        indices.shuffle(rng);

        let num_batches_total = indices.len().div_ceil(config.batch_size);
        let pb = ProgressBar::new(num_batches_total as u64);
        pb.set_style(
            ProgressStyle::default_bar()
                .template("  {spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} batches")
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("#>-"),
        );

        let mut loss_sum = 0.0f64;
        let mut num_batches = 0usize;

        for chunk in indices.chunks(config.batch_size) {
            let items = dataset.load_batch(chunk, rng)?;
            let batch: ImageBatch<B> =
                <ImageBatcher as Batcher<B, ImageItem, ImageBatch<B>>>::batch(&batcher, items, device);

            let logits = model.forward(batch.images);
            let loss = weighted_cross_entropy(logits, batch.targets, weights.clone());

            let loss_value: f64 = loss.clone().into_scalar().elem();
            if !loss_value.is_finite() {
                pb.abandon();
                return Err(ClassifierError::Training(format!(
                    "loss became {} in epoch {}",
                    loss_value,
                    epoch + 1
                )));
            }
            loss_sum += loss_value;
            num_batches += 1;

            let grads = GradientsParams::from_grads(loss.backward(), &model);
            model = optimizer.step(lr, model, grads);
            pb.inc(1);
        }
        pb.finish_and_clear();

        let avg_loss = loss_sum / num_batches.max(1) as f64;
        println!("Epoch [{}/{}], Loss: {:.4}", epoch + 1, config.num_epochs, avg_loss);
        logger.end_epoch(avg_loss);
        epoch_losses.push(avg_loss);
    }

    logger.log_complete();
    Ok((model, epoch_losses))
}

fn write_model<B, M>(model: M, outputs: &TrainingOutputs) -> error::Result<()>
where
    B: burn::tensor::backend::Backend,
    M: burn::module::Module<B>,
{
    for path in [&outputs.model_path, &outputs.labels_path] {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
    }
    save_record(model, &outputs.model_path)?;
    info!("Model saved to {:?}", outputs.model_path);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::TrainingBackend;
    use image::{Rgb, RgbImage};

    fn write_image(path: &Path, color: [u8; 3]) {
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        RgbImage::from_pixel(24, 20, Rgb(color)).save(path).unwrap();
    }

    fn tiny_config() -> TrainingConfig {
        TrainingConfig::new()
            .with_architecture(Architecture::Compact)
            .with_base_filters(4)
            .with_image_size(32)
            .with_num_epochs(1)
            .with_batch_size(2)
    }

    #[test]
    fn test_defaults() {
        let config = TrainingConfig::new();
        assert_eq!(config.learning_rate, 1e-4);
        assert_eq!(config.image_size, 224);
        assert_eq!(config.num_epochs, 30);
        assert_eq!(config.batch_size, 16);
        assert_eq!(config.step_size, 7);
        assert_eq!(config.gamma, 0.1);
        assert_eq!(config.seed, 42);
        assert_eq!(config.architecture, Architecture::DenseNet121);
        assert!(config.pretrained.is_none());
    }

    #[test]
    fn test_trains_tiny_dataset_and_writes_outputs() {
        let dir = tempfile::tempdir().unwrap();
        let train = dir.path().join("data/train");
        write_image(&train.join("alpha/a1.png"), [250, 10, 10]);
        write_image(&train.join("alpha/a2.png"), [230, 30, 20]);
        write_image(&train.join("beta/b1.png"), [10, 10, 250]);
        write_image(&train.join("beta/b2.png"), [20, 40, 230]);

        let outputs = TrainingOutputs::in_dir(&dir.path().join("out"));
        let summary = run_training::<TrainingBackend>(
            &dir.path().join("data"),
            &tiny_config(),
            &outputs,
            Default::default(),
        )
        .unwrap();

        assert_eq!(summary.classes, vec!["alpha", "beta"]);
        assert_eq!(summary.num_samples, 4);
        assert_eq!(summary.class_weights, vec![2.0, 2.0]);
        assert_eq!(summary.epoch_losses.len(), 1);
        assert!(summary.epoch_losses[0].is_finite());

        let model_size = std::fs::metadata(&outputs.model_path).unwrap().len();
        assert!(model_size > 0);
        assert_eq!(
            std::fs::read_to_string(&outputs.labels_path).unwrap(),
            "alpha\nbeta\n"
        );
    }

    #[test]
    fn test_missing_train_dir_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let outputs = TrainingOutputs::in_dir(dir.path());

        let err = run_training::<TrainingBackend>(
            &dir.path().join("split_dataset"),
            &tiny_config(),
            &outputs,
            Default::default(),
        )
        .unwrap_err();

        assert!(matches!(err, ClassifierError::DatasetMissing(ref p) if p.ends_with("train")));
        assert!(!outputs.model_path.exists());
        assert!(!outputs.labels_path.exists());
    }

    #[test]
    fn test_empty_class_aborts() {
        let dir = tempfile::tempdir().unwrap();
        let train = dir.path().join("train");
        write_image(&train.join("full/x.png"), [1, 2, 3]);
        std::fs::create_dir_all(train.join("hollow")).unwrap();

        let err = run_training::<TrainingBackend>(
            dir.path(),
            &tiny_config(),
            &TrainingOutputs::in_dir(dir.path()),
            Default::default(),
        )
        .unwrap_err();

        assert!(err.to_string().contains("hollow"));
    }

    #[test]
    fn test_pretrained_requires_densenet() {
        let config = tiny_config().with_pretrained(Some("backbone.mpk".to_string()));
        assert!(config.validate().is_err());
    }
}
