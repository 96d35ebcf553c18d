//! Inference Predictor
//!
//! Couples a loaded network with its label list and the evaluation
//! preprocessing, and turns logits into a labeled prediction.

use std::path::Path;
use std::time::{Duration, Instant};

use burn::tensor::activation::softmax;
use burn::tensor::backend::Backend;
use image::DynamicImage;
use serde::{Deserialize, Serialize};

use super::labels::LabelList;
use super::preprocess::Preprocessor;
use crate::model::{Classifier, ClassifierConfig, ImageClassifier};
use crate::utils::error::{ClassifierError, Result};

/// Result of a single prediction
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Prediction {
    /// Predicted class index (argmax, lowest index on ties)
    pub class_index: usize,
    /// Label of the predicted class
    pub label: String,
    /// Softmax probability of the predicted class
    pub probability: f32,
    /// Full probability distribution over all classes
    pub probabilities: Vec<f32>,
    /// Inference time in milliseconds
    pub inference_time_ms: f64,
}

impl Prediction {
    /// The `k` most probable classes, highest first
    pub fn top_k(&self, labels: &LabelList, k: usize) -> Vec<(usize, String, f32)> {
        let mut indexed: Vec<(usize, f32)> = self.probabilities.iter().copied().enumerate().collect();
        indexed.sort_by(|a, b| b.1.total_cmp(&a.1).then(a.0.cmp(&b.0)));

        indexed
            .into_iter()
            .take(k)
            .map(|(idx, prob)| {
                let name = labels.get(idx).unwrap_or("Unknown").to_string();
                (idx, name, prob)
            })
            .collect()
    }
}

/// Index of the largest value; the first one wins ties
pub fn argmax(values: &[f32]) -> Option<usize> {
    values
        .iter()
        .enumerate()
        .fold(None, |best: Option<(usize, f32)>, (idx, &value)| match best {
            Some((_, best_value)) if value <= best_value || value.is_nan() => best,
            _ => Some((idx, value)),
        })
        .map(|(idx, _)| idx)
}

/// Loaded model, labels and preprocessing
pub struct Predictor<B: Backend> {
    model: Classifier<B>,
    labels: LabelList,
    preprocessor: Preprocessor,
    device: B::Device,
}

impl<B: Backend> Predictor<B> {
    /// Wrap an already loaded model
    ///
    /// The model's output width must equal the label count.
    pub fn new(
        model: Classifier<B>,
        labels: LabelList,
        preprocessor: Preprocessor,
        device: B::Device,
    ) -> Result<Self> {
        if model.num_classes() != labels.len() {
            return Err(ClassifierError::Model(format!(
                "model has {} outputs but the label list has {} entries",
                model.num_classes(),
                labels.len()
            )));
        }

        Ok(Self {
            model,
            labels,
            preprocessor,
            device,
        })
    }

    /// Load labels first, then a network sized to them, then its weights
    pub fn load(
        model_path: &Path,
        labels_path: &Path,
        model_config: &ClassifierConfig,
        preprocessor: Preprocessor,
        device: B::Device,
    ) -> Result<Self> {
        let labels = LabelList::load(labels_path)?;
        let mut config = model_config.clone();
        config.num_classes = labels.len();
        let model = config.load::<B>(model_path, &device)?;
        Self::new(model, labels, preprocessor, device)
    }

    pub fn labels(&self) -> &LabelList {
        &self.labels
    }

    pub fn num_classes(&self) -> usize {
        self.labels.len()
    }

    /// Classify raw encoded image bytes
    pub fn predict_bytes(&self, bytes: &[u8]) -> Result<Prediction> {
        let start = Instant::now();
        let data = self.preprocessor.preprocess_bytes(bytes)?;
        self.predict_data(data, start)
    }

    /// Classify a decoded image
    pub fn predict_image(&self, img: &DynamicImage) -> Result<Prediction> {
        let start = Instant::now();
        let data = self.preprocessor.preprocess(img)?;
        self.predict_data(data, start)
    }

    fn predict_data(&self, data: Vec<f32>, start: Instant) -> Result<Prediction> {
        let input = self.preprocessor.to_tensor::<B>(data, &self.device);
        let logits = self.model.forward(input);
        let probabilities = softmax(logits.clone(), 1);

        let logits = tensor_to_vec(logits.into_data())?;
        let probabilities = tensor_to_vec(probabilities.into_data())?;

        let class_index = argmax(&logits)
            .ok_or_else(|| ClassifierError::Model("model produced no outputs".to_string()))?;
        let label = self
            .labels
            .get(class_index)
            .ok_or_else(|| {
                ClassifierError::Labels(format!("no label for class index {}", class_index))
            })?
            .to_string();

        Ok(Prediction {
            class_index,
            label,
            probability: probabilities.get(class_index).copied().unwrap_or(0.0),
            probabilities,
            inference_time_ms: duration_ms(start.elapsed()),
        })
    }
}

fn tensor_to_vec(data: burn::tensor::TensorData) -> Result<Vec<f32>> {
    data.convert::<f32>()
        .to_vec::<f32>()
        .map_err(|e| ClassifierError::Model(format!("cannot read model output: {:?}", e)))
}

fn duration_ms(d: Duration) -> f64 {
    d.as_secs_f64() * 1000.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::DefaultBackend;
    use crate::model::Architecture;
    use image::{Rgb, RgbImage};

    type TestBackend = DefaultBackend;

    #[test]
    fn test_argmax_ties_pick_lowest_index() {
        assert_eq!(argmax(&[0.1, 0.7, 0.7, 0.2]), Some(1));
        assert_eq!(argmax(&[3.0]), Some(0));
        assert_eq!(argmax(&[]), None);
        assert_eq!(argmax(&[f32::NAN, 1.0]), Some(1));
    }

    fn small_predictor(num_classes: usize) -> Predictor<TestBackend> {
        let device = Default::default();
        let model = ClassifierConfig::new(num_classes)
            .with_architecture(Architecture::Compact)
            .with_base_filters(4)
            .init::<TestBackend>(&device);
        let labels = LabelList::new((0..num_classes).map(|i| format!("class_{}", i)).collect()).unwrap();
        Predictor::new(model, labels, Preprocessor::new(36, 32).unwrap(), device).unwrap()
    }

    #[test]
    fn test_prediction_is_consistent() {
        let predictor = small_predictor(4);
        let img = DynamicImage::ImageRgb8(RgbImage::from_pixel(40, 50, Rgb([90, 140, 200])));

        let prediction = predictor.predict_image(&img).unwrap();

        assert_eq!(prediction.probabilities.len(), 4);
        assert!(prediction.class_index < 4);
        assert_eq!(prediction.label, format!("class_{}", prediction.class_index));
        let total: f32 = prediction.probabilities.iter().sum();
        assert!((total - 1.0).abs() < 1e-4);

        let top = prediction.top_k(predictor.labels(), 2);
        assert_eq!(top.len(), 2);
        assert_eq!(top[0].0, prediction.class_index);
    }

    #[test]
    fn test_label_count_mismatch_rejected() {
        let device = Default::default();
        let model = ClassifierConfig::new(3)
            .with_architecture(Architecture::Compact)
            .with_base_filters(4)
            .init::<TestBackend>(&device);
        let labels = LabelList::new(vec!["a".into(), "b".into()]).unwrap();

        assert!(Predictor::new(model, labels, Preprocessor::default(), device).is_err());
    }
}
