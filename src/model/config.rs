//! Model Configuration
//!
//! `ClassifierConfig` picks an architecture and sizes its output layer;
//! `Classifier` is the runtime value holding whichever network was built.

use std::fmt;
use std::path::Path;
use std::str::FromStr;

use burn::config::Config;
use burn::module::Module;
use burn::record::{FullPrecisionSettings, Recorder};
use burn::tensor::{backend::Backend, Tensor};
use burn_import::pytorch::{LoadArgs, PyTorchFileRecorder};
use serde::{Deserialize, Serialize};
use tracing::info;

use super::cnn::{CompactClassifier, CompactClassifierConfig};
use super::densenet::{DenseNet, DenseNetConfig, DenseNetRecord};
use super::{load_record, save_record, ImageClassifier};
use crate::utils::error::{self, ClassifierError};

/// Output width of ImageNet-pretrained backbones
pub const IMAGENET_CLASSES: usize = 1000;

/// Supported network architectures
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Architecture {
    /// DenseNet-121 with a linear head
    #[default]
    DenseNet121,
    /// Four-block CNN, see [`CompactClassifier`]
    Compact,
}

impl FromStr for Architecture {
    type Err = ClassifierError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().replace(['-', '_'], "").as_str() {
            "densenet121" | "densenet" => Ok(Architecture::DenseNet121),
            "compact" | "cnn" => Ok(Architecture::Compact),
            other => Err(ClassifierError::Config(format!(
                "unknown architecture '{}' (expected densenet121 or compact)",
                other
            ))),
        }
    }
}

impl fmt::Display for Architecture {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Architecture::DenseNet121 => write!(f, "densenet121"),
            Architecture::Compact => write!(f, "compact"),
        }
    }
}

/// Configuration of the classifier network
#[derive(Config, Debug)]
pub struct ClassifierConfig {
    /// Number of output classes (the label count)
    pub num_classes: usize,

    #[config(default = "Architecture::DenseNet121")]
    pub architecture: Architecture,

    /// Dropout rate of the compact head (DenseNet-121 uses none)
    #[config(default = "0.3")]
    pub dropout_rate: f64,

    /// Base filter count of the compact network
    #[config(default = "32")]
    pub base_filters: usize,
}

impl ClassifierConfig {
    /// Build a randomly initialized network
    pub fn init<B: Backend>(&self, device: &B::Device) -> Classifier<B> {
        match self.architecture {
            Architecture::DenseNet121 => {
                Classifier::DenseNet(DenseNetConfig::densenet121(self.num_classes).init(device))
            }
            Architecture::Compact => Classifier::Compact(self.compact_config().init(device)),
        }
    }

    pub fn compact_config(&self) -> CompactClassifierConfig {
        CompactClassifierConfig::new(self.num_classes)
            .with_dropout_rate(self.dropout_rate)
            .with_base_filters(self.base_filters)
    }

    /// Build the network and load trained weights into it
    ///
    /// Fails when the record does not match the configured architecture or
    /// class count.
    pub fn load<B: Backend>(&self, path: &Path, device: &B::Device) -> error::Result<Classifier<B>> {
        let model = match self.init(device) {
            Classifier::DenseNet(m) => Classifier::DenseNet(load_record(m, path, device)?),
            Classifier::Compact(m) => Classifier::Compact(load_record(m, path, device)?),
        };

        let width = model.output_width();
        if width != self.num_classes {
            return Err(ClassifierError::Model(format!(
                "{:?} has {} outputs but {} classes are configured",
                path, width, self.num_classes
            )));
        }

        info!(
            "Loaded {} weights from {:?} ({} classes)",
            self.architecture, path, self.num_classes
        );
        Ok(model)
    }
}

/// Load an ImageNet-pretrained DenseNet-121 and swap its head
///
/// `.pth`/`.pt` files are read as torchvision `densenet121` state dicts,
/// anything else as a `CompactRecorder` record of a 1000-class
/// [`DenseNet`]. The classification layer is replaced by a freshly
/// initialized one with `num_classes` outputs.
pub fn load_pretrained_densenet<B: Backend>(
    path: &Path,
    num_classes: usize,
    device: &B::Device,
) -> error::Result<DenseNet<B>> {
    let config = DenseNetConfig::densenet121(IMAGENET_CLASSES);
    let backbone = config.init(device);
    let backbone = if is_torch_checkpoint(path) {
        let mut args = LoadArgs::new(path.to_path_buf());
        for (pattern, replacement) in torchvision_key_remaps(&config.block_config) {
            args = args.with_key_remap(&pattern, &replacement);
        }
        let record: DenseNetRecord<B> = PyTorchFileRecorder::<FullPrecisionSettings>::default()
            .load(args, device)
            .map_err(|e| ClassifierError::Model(format!("failed to load {:?}: {}", path, e)))?;
        backbone.load_record(record)
    } else {
        load_record(backbone, path, device)?
    };
    info!("Loaded pretrained backbone from {:?}", path);
    Ok(backbone.with_new_classifier(num_classes, device))
}

fn is_torch_checkpoint(path: &Path) -> bool {
    matches!(
        path.extension().and_then(|e| e.to_str()),
        Some("pth") | Some("pt")
    )
}

/// Regex renames from torchvision's `densenet121` keys to [`DenseNet`] fields
///
/// Applied in order. The first rule folds the legacy `norm.1` spelling of
/// older checkpoints into `norm1`. Block and layer numbers are 1-based in
/// torchvision and 0-based here, hence one rule per layer.
pub fn torchvision_key_remaps(block_config: &[usize]) -> Vec<(String, String)> {
    let mut remaps = vec![
        (
            r"(denselayer\d+\.(?:norm|relu|conv))\.([12])\.".to_string(),
            "${1}${2}.".to_string(),
        ),
        (r"^features\.conv0\.".to_string(), "conv0.".to_string()),
        (r"^features\.norm0\.".to_string(), "norm0.".to_string()),
        (r"^features\.norm5\.".to_string(), "norm5.".to_string()),
    ];
    for (block, &num_layers) in block_config.iter().enumerate() {
        for layer in 0..num_layers {
            remaps.push((
                format!(r"^features\.denseblock{}\.denselayer{}\.", block + 1, layer + 1),
                format!("blocks.{}.layers.{}.", block, layer),
            ));
        }
        if block + 1 < block_config.len() {
            remaps.push((
                format!(r"^features\.transition{}\.", block + 1),
                format!("transitions.{}.", block),
            ));
        }
    }
    remaps
}

/// A constructed classifier network of either architecture
#[derive(Debug)]
pub enum Classifier<B: Backend> {
    DenseNet(DenseNet<B>),
    Compact(CompactClassifier<B>),
}

impl<B: Backend> Classifier<B> {
    pub fn architecture(&self) -> Architecture {
        match self {
            Classifier::DenseNet(_) => Architecture::DenseNet121,
            Classifier::Compact(_) => Architecture::Compact,
        }
    }

    fn output_width(&self) -> usize {
        match self {
            Classifier::DenseNet(m) => m.output_width(),
            Classifier::Compact(m) => m.output_width(),
        }
    }

    pub fn save(self, path: &Path) -> error::Result<()> {
        match self {
            Classifier::DenseNet(m) => save_record(m, path),
            Classifier::Compact(m) => save_record(m, path),
        }
    }
}

impl<B: Backend> ImageClassifier<B> for Classifier<B> {
    fn forward(&self, images: Tensor<B, 4>) -> Tensor<B, 2> {
        match self {
            Classifier::DenseNet(m) => m.forward(images),
            Classifier::Compact(m) => m.forward(images),
        }
    }

    fn num_classes(&self) -> usize {
        match self {
            Classifier::DenseNet(m) => m.num_classes(),
            Classifier::Compact(m) => m.num_classes(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::DefaultBackend;

    type TestBackend = DefaultBackend;

    #[test]
    fn test_architecture_parsing() {
        assert_eq!("DenseNet-121".parse::<Architecture>().unwrap(), Architecture::DenseNet121);
        assert_eq!("compact".parse::<Architecture>().unwrap(), Architecture::Compact);
        assert!("resnet".parse::<Architecture>().is_err());
        assert_eq!(Architecture::default(), Architecture::DenseNet121);
    }

    #[test]
    fn test_save_and_load_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("model.mpk");
        let device = Default::default();

        let config = ClassifierConfig::new(3)
            .with_architecture(Architecture::Compact)
            .with_base_filters(4);
        config.init::<TestBackend>(&device).save(&path).unwrap();
        assert!(path.exists());

        let loaded = config.load::<TestBackend>(&path, &device).unwrap();
        assert_eq!(loaded.architecture(), Architecture::Compact);
        assert_eq!(loaded.num_classes(), 3);
    }

    #[test]
    fn test_load_with_wrong_class_count_fails() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("model.mpk");
        let device = Default::default();

        ClassifierConfig::new(3)
            .with_architecture(Architecture::Compact)
            .with_base_filters(4)
            .init::<TestBackend>(&device)
            .save(&path)
            .unwrap();

        let result = ClassifierConfig::new(5)
            .with_architecture(Architecture::Compact)
            .with_base_filters(4)
            .load::<TestBackend>(&path, &device);
        assert!(result.is_err());
    }

    #[test]
    fn test_torchvision_key_remaps() {
        let remaps: Vec<(regex::Regex, String)> = torchvision_key_remaps(&[6, 12, 24, 16])
            .into_iter()
            .map(|(pattern, replacement)| (regex::Regex::new(&pattern).unwrap(), replacement))
            .collect();
        let rename = |key: &str| {
            remaps.iter().fold(key.to_string(), |key, (re, to)| {
                re.replace_all(&key, to.as_str()).into_owned()
            })
        };

        assert_eq!(rename("features.conv0.weight"), "conv0.weight");
        assert_eq!(rename("features.norm0.running_var"), "norm0.running_var");
        assert_eq!(
            rename("features.denseblock1.denselayer1.norm1.weight"),
            "blocks.0.layers.0.norm1.weight"
        );
        assert_eq!(
            rename("features.denseblock3.denselayer24.conv2.weight"),
            "blocks.2.layers.23.conv2.weight"
        );
        assert_eq!(
            rename("features.denseblock2.denselayer10.norm.2.bias"),
            "blocks.1.layers.9.norm2.bias"
        );
        assert_eq!(rename("features.transition3.conv.weight"), "transitions.2.conv.weight");
        assert_eq!(rename("features.norm5.bias"), "norm5.bias");
        assert_eq!(rename("classifier.weight"), "classifier.weight");

        // three blocks without a trailing transition, so no `transition4`
        assert_eq!(remaps.len(), 4 + 6 + 12 + 24 + 16 + 3);
    }

    #[test]
    fn test_torch_checkpoint_detection() {
        assert!(is_torch_checkpoint(Path::new("densenet121-a639ec97.pth")));
        assert!(is_torch_checkpoint(Path::new("weights.pt")));
        assert!(!is_torch_checkpoint(Path::new("backbone.mpk")));
    }

    #[test]
    fn test_missing_pretrained_checkpoint_fails() {
        let device = Default::default();
        let result = load_pretrained_densenet::<TestBackend>(
            Path::new("/nonexistent/densenet121.pth"),
            4,
            &device,
        );
        assert!(matches!(result, Err(ClassifierError::Model(_))));
    }

    #[test]
    fn test_missing_record_fails() {
        let device = Default::default();
        let result = ClassifierConfig::new(2)
            .with_architecture(Architecture::Compact)
            .load::<TestBackend>(Path::new("/nonexistent/model.mpk"), &device);
        assert!(matches!(result, Err(ClassifierError::Model(_))));
    }
}
