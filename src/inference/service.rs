//! Inference Service
//!
//! The explicitly constructed context behind the HTTP endpoint: the service
//! configuration, the (possibly failed) predictor and the confidence table.
//! Loading never aborts startup; a service without a model answers every
//! request with `PredictError::NotReady`.

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use burn::tensor::backend::Backend;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{error, info, warn};

use super::confidence::{ConfidenceSource, ConfidenceTable};
use super::predictor::{Prediction, Predictor};
use super::preprocess::Preprocessor;
use crate::model::{Architecture, ClassifierConfig};
use crate::utils::error::{ClassifierError, Result};
use crate::{DEFAULT_LABELS_PATH, DEFAULT_MODEL_PATH, IMAGE_SIZE, RESIZE_SHORTER};

/// Fields included in a successful response
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseShape {
    /// `{"prediction": ...}`
    PredictionOnly,
    /// `{"prediction": ..., "confidence": ...}`
    WithConfidence,
}

/// Service configuration
///
/// `classic()` and `with_confidence()` are the two stock deployments;
/// every field can be overridden from a JSON file or the command line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    pub host: String,
    pub port: u16,
    /// Multipart field carrying the upload
    pub field_name: String,
    pub model_path: PathBuf,
    pub labels_path: PathBuf,
    pub architecture: Architecture,
    pub response_shape: ResponseShape,
    pub confidence_source: ConfidenceSource,
    /// JSON object mapping label to confidence (used by `ConfidenceSource::Table`)
    pub confidence_table: Option<PathBuf>,
    pub resize_shorter: u32,
    pub crop_size: u32,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self::classic()
    }
}

impl ServiceConfig {
    /// Field `file`, port 5000, prediction only
    pub fn classic() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 5000,
            field_name: "file".to_string(),
            model_path: PathBuf::from(DEFAULT_MODEL_PATH),
            labels_path: PathBuf::from(DEFAULT_LABELS_PATH),
            architecture: Architecture::DenseNet121,
            response_shape: ResponseShape::PredictionOnly,
            confidence_source: ConfidenceSource::Table,
            confidence_table: None,
            resize_shorter: RESIZE_SHORTER as u32,
            crop_size: IMAGE_SIZE as u32,
        }
    }

    /// Field `image`, port 5001, prediction plus confidence
    pub fn with_confidence() -> Self {
        Self {
            port: 5001,
            field_name: "image".to_string(),
            response_shape: ResponseShape::WithConfidence,
            ..Self::classic()
        }
    }

    /// Read a JSON config; missing fields take the `classic()` values
    pub fn load(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&json)?)
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn preprocessor(&self) -> Result<Preprocessor> {
        Preprocessor::new(self.resize_shorter, self.crop_size)
    }

    /// Network config; the class count is filled in from the label list
    pub fn model_config(&self) -> ClassifierConfig {
        ClassifierConfig::new(0).with_architecture(self.architecture)
    }
}

/// Failure of a single prediction request
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PredictError {
    /// Model or labels failed to load at startup
    #[error("Model or class names not loaded")]
    NotReady,

    /// Missing or empty upload
    #[error("{0}")]
    InvalidInput(String),

    /// Decode, preprocessing or inference failure
    #[error("{0}")]
    Processing(String),
}

impl PredictError {
    pub fn no_file_part() -> Self {
        PredictError::InvalidInput("No file part".to_string())
    }

    pub fn no_selected_file() -> Self {
        PredictError::InvalidInput("No selected file".to_string())
    }

    /// HTTP status this error maps to
    pub fn status_code(&self) -> u16 {
        match self {
            PredictError::NotReady => 500,
            PredictError::InvalidInput(_) => 400,
            PredictError::Processing(_) => 500,
        }
    }
}

/// A file part extracted from a request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Upload {
    /// Filename from the part's content disposition; `None` when absent
    pub file_name: Option<String>,
    pub bytes: Vec<u8>,
}

/// Successful response body
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionResponse {
    pub prediction: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
}

/// Model, labels and confidence data shared by all requests
pub struct InferenceService<B: Backend> {
    config: ServiceConfig,
    predictor: Option<Mutex<Predictor<B>>>,
    num_classes: usize,
    confidence_table: ConfidenceTable,
    load_error: Option<String>,
}

impl<B: Backend> InferenceService<B> {
    /// Load labels, model and confidence table from the configured paths
    ///
    /// Failures are logged and leave the service in the not-ready state.
    pub fn load(config: ServiceConfig, device: B::Device) -> Self {
        let predictor = config.preprocessor().and_then(|preprocessor| {
            Predictor::<B>::load(
                &config.model_path,
                &config.labels_path,
                &config.model_config(),
                preprocessor,
                device,
            )
        });

        let (predictor, load_error) = match predictor {
            Ok(p) => {
                info!(
                    "Model loaded from {:?} with {} classes",
                    config.model_path,
                    p.num_classes()
                );
                (Some(p), None)
            }
            Err(e) => {
                error!("Error loading model or class names: {}", e);
                (None, Some(e.to_string()))
            }
        };

        let confidence_table = match Self::load_confidence_table(&config) {
            Ok(table) => table,
            Err(e) => {
                warn!("Confidence table unavailable, all lookups will be 0.0: {}", e);
                ConfidenceTable::default()
            }
        };

        let mut service = Self::from_parts(config, predictor, confidence_table);
        service.load_error = load_error;
        service
    }

    /// Assemble a service from already loaded parts
    pub fn from_parts(
        config: ServiceConfig,
        predictor: Option<Predictor<B>>,
        confidence_table: ConfidenceTable,
    ) -> Self {
        let num_classes = predictor.as_ref().map(|p| p.num_classes()).unwrap_or(0);

        if let Some(p) = &predictor {
            let uses_table = config.response_shape == ResponseShape::WithConfidence
                && config.confidence_source == ConfidenceSource::Table;
            if uses_table {
                let missing = confidence_table.missing_labels(p.labels().names());
                if !missing.is_empty() {
                    warn!("Confidence table has no entry for: {}", missing.join(", "));
                }
            }
        }

        Self {
            config,
            predictor: predictor.map(Mutex::new),
            num_classes,
            confidence_table,
            load_error: None,
        }
    }

    fn load_confidence_table(config: &ServiceConfig) -> Result<ConfidenceTable> {
        match &config.confidence_table {
            Some(path) => {
                let table = ConfidenceTable::load(path).map_err(|e| {
                    ClassifierError::Config(format!("cannot load {:?}: {}", path, e))
                })?;
                info!("Loaded {} confidence entries from {:?}", table.len(), path);
                Ok(table)
            }
            None => Ok(ConfidenceTable::default()),
        }
    }

    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }

    pub fn is_ready(&self) -> bool {
        self.predictor.is_some()
    }

    pub fn num_classes(&self) -> usize {
        self.num_classes
    }

    /// Why loading failed, if it did
    pub fn load_error(&self) -> Option<&str> {
        self.load_error.as_deref()
    }

    /// Validate an upload, classify it and shape the response
    ///
    /// Readiness is checked before the upload is looked at.
    pub fn predict_upload(
        &self,
        upload: Option<Upload>,
    ) -> std::result::Result<PredictionResponse, PredictError> {
        let predictor = self.predictor.as_ref().ok_or(PredictError::NotReady)?;

        let upload = upload.ok_or_else(PredictError::no_file_part)?;
        match upload.file_name.as_deref() {
            None => return Err(PredictError::no_file_part()),
            Some("") => return Err(PredictError::no_selected_file()),
            Some(_) => {}
        }

        let prediction = {
            let predictor = predictor
                .lock()
                .map_err(|_| PredictError::Processing("model lock poisoned".to_string()))?;
            predictor
                .predict_bytes(&upload.bytes)
                .map_err(|e| PredictError::Processing(e.to_string()))?
        };

        Ok(self.respond(&prediction))
    }

    fn respond(&self, prediction: &Prediction) -> PredictionResponse {
        let confidence = match self.config.response_shape {
            ResponseShape::PredictionOnly => None,
            ResponseShape::WithConfidence => Some(match self.config.confidence_source {
                ConfidenceSource::Table => self.confidence_table.lookup(&prediction.label),
                ConfidenceSource::Softmax => prediction.probability as f64,
            }),
        };

        PredictionResponse {
            prediction: prediction.label.clone(),
            confidence,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::io::Cursor;

    use super::*;
    use crate::backend::DefaultBackend;
    use crate::inference::LabelList;
    use image::{DynamicImage, ImageFormat, Rgb, RgbImage};

    type TestBackend = DefaultBackend;

    fn png_bytes() -> Vec<u8> {
        let img = DynamicImage::ImageRgb8(RgbImage::from_pixel(40, 40, Rgb([20, 120, 220])));
        let mut bytes = Vec::new();
        img.write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png).unwrap();
        bytes
    }

    fn upload(name: Option<&str>, bytes: Vec<u8>) -> Option<Upload> {
        Some(Upload {
            file_name: name.map(str::to_string),
            bytes,
        })
    }

    fn test_config(base: ServiceConfig) -> ServiceConfig {
        ServiceConfig {
            architecture: Architecture::Compact,
            resize_shorter: 36,
            crop_size: 32,
            ..base
        }
    }

    fn ready_service(config: ServiceConfig, table: ConfidenceTable) -> InferenceService<TestBackend> {
        let device = Default::default();
        let model = ClassifierConfig::new(2)
            .with_architecture(Architecture::Compact)
            .with_base_filters(4)
            .init::<TestBackend>(&device);
        let labels = LabelList::new(vec!["Asia".into(), "Europe".into()]).unwrap();
        let predictor =
            Predictor::new(model, labels, config.preprocessor().unwrap(), device).unwrap();
        InferenceService::from_parts(config, Some(predictor), table)
    }

    #[test]
    fn test_presets() {
        let classic = ServiceConfig::classic();
        assert_eq!(classic.field_name, "file");
        assert_eq!(classic.port, 5000);
        assert_eq!(classic.response_shape, ResponseShape::PredictionOnly);

        let confidence = ServiceConfig::with_confidence();
        assert_eq!(confidence.field_name, "image");
        assert_eq!(confidence.port, 5001);
        assert_eq!(confidence.bind_address(), "0.0.0.0:5001");
    }

    #[test]
    fn test_config_file_fills_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("service.json");
        std::fs::write(&path, r#"{"port": 8080, "confidence_source": "softmax"}"#).unwrap();

        let config = ServiceConfig::load(&path).unwrap();
        assert_eq!(config.port, 8080);
        assert_eq!(config.confidence_source, ConfidenceSource::Softmax);
        assert_eq!(config.field_name, "file");
    }

    #[test]
    fn test_not_ready_precedes_validation() {
        let service = InferenceService::<TestBackend>::load(
            ServiceConfig {
                model_path: "/nonexistent/model.mpk".into(),
                labels_path: "/nonexistent/class_names.txt".into(),
                ..ServiceConfig::classic()
            },
            Default::default(),
        );

        assert!(!service.is_ready());
        assert!(service.load_error().is_some());
        assert_eq!(service.predict_upload(None), Err(PredictError::NotReady));
        assert_eq!(
            service.predict_upload(upload(Some("a.png"), png_bytes())),
            Err(PredictError::NotReady)
        );
        assert_eq!(PredictError::NotReady.to_string(), "Model or class names not loaded");
    }

    /// Writes a 2-class compact checkpoint and its labels into `dir`
    fn write_artifacts(dir: &std::path::Path) -> ServiceConfig {
        let model_path = dir.join("model.mpk");
        let labels_path = dir.join("class_names.txt");
        ClassifierConfig::new(2)
            .with_architecture(Architecture::Compact)
            .init::<TestBackend>(&Default::default())
            .save(&model_path)
            .unwrap();
        std::fs::write(&labels_path, "Asia\nEurope\n").unwrap();
        ServiceConfig {
            model_path,
            labels_path,
            ..test_config(ServiceConfig::classic())
        }
    }

    #[test]
    fn test_complete_artifacts_load() {
        let dir = tempfile::tempdir().unwrap();
        let service = InferenceService::<TestBackend>::load(write_artifacts(dir.path()), Default::default());

        assert!(service.is_ready());
        assert_eq!(service.num_classes(), 2);
        assert!(service.load_error().is_none());
    }

    #[test]
    fn test_labels_without_usable_checkpoint_is_not_ready() {
        let dir = tempfile::tempdir().unwrap();
        let config = write_artifacts(dir.path());
        std::fs::write(&config.model_path, b"not a checkpoint").unwrap();

        let corrupt = InferenceService::<TestBackend>::load(config.clone(), Default::default());
        assert!(!corrupt.is_ready());
        assert_eq!(
            corrupt.predict_upload(upload(Some("a.png"), png_bytes())),
            Err(PredictError::NotReady)
        );

        std::fs::remove_file(&config.model_path).unwrap();
        let missing = InferenceService::<TestBackend>::load(config, Default::default());
        assert!(!missing.is_ready());
        assert!(missing.load_error().unwrap().contains("model.mpk"));
        assert_eq!(PredictError::NotReady.status_code(), 500);
    }

    #[test]
    fn test_checkpoint_without_labels_is_not_ready() {
        let dir = tempfile::tempdir().unwrap();
        let config = write_artifacts(dir.path());
        std::fs::remove_file(&config.labels_path).unwrap();

        let service = InferenceService::<TestBackend>::load(config, Default::default());
        assert!(!service.is_ready());
        assert_eq!(service.num_classes(), 0);
        assert!(service.load_error().unwrap().contains("class_names.txt"));
        assert_eq!(service.predict_upload(None), Err(PredictError::NotReady));
    }

    #[test]
    fn test_upload_validation() {
        let service = ready_service(test_config(ServiceConfig::classic()), ConfidenceTable::default());

        let missing = service.predict_upload(None).unwrap_err();
        assert_eq!(missing.to_string(), "No file part");
        assert_eq!(missing.status_code(), 400);

        let nameless = service.predict_upload(upload(None, png_bytes())).unwrap_err();
        assert_eq!(nameless, PredictError::no_file_part());

        let empty = service.predict_upload(upload(Some(""), png_bytes())).unwrap_err();
        assert_eq!(empty.to_string(), "No selected file");
    }

    #[test]
    fn test_undecodable_upload_is_processing_error() {
        let service = ready_service(test_config(ServiceConfig::classic()), ConfidenceTable::default());
        let err = service
            .predict_upload(upload(Some("x.jpg"), b"not an image".to_vec()))
            .unwrap_err();
        assert!(matches!(err, PredictError::Processing(_)));
        assert_eq!(err.status_code(), 500);
    }

    #[test]
    fn test_classic_response_has_no_confidence() {
        let service = ready_service(test_config(ServiceConfig::classic()), ConfidenceTable::default());
        let response = service.predict_upload(upload(Some("a.png"), png_bytes())).unwrap();

        assert!(["Asia", "Europe"].contains(&response.prediction.as_str()));
        assert_eq!(response.confidence, None);
        let json = serde_json::to_value(&response).unwrap();
        assert!(json.get("confidence").is_none());
    }

    #[test]
    fn test_table_confidence_and_determinism() {
        let table = ConfidenceTable::new(HashMap::from([("Asia".to_string(), 0.9)]));
        let service = ready_service(test_config(ServiceConfig::with_confidence()), table);

        let first = service.predict_upload(upload(Some("a.png"), png_bytes())).unwrap();
        let second = service.predict_upload(upload(Some("a.png"), png_bytes())).unwrap();
        assert_eq!(first, second);

        let expected = if first.prediction == "Asia" { 0.9 } else { 0.0 };
        assert_eq!(first.confidence, Some(expected));
    }

    #[test]
    fn test_softmax_confidence_is_probability() {
        let config = ServiceConfig {
            confidence_source: ConfidenceSource::Softmax,
            ..test_config(ServiceConfig::with_confidence())
        };
        let service = ready_service(config, ConfidenceTable::default());

        let confidence = service
            .predict_upload(upload(Some("a.png"), png_bytes()))
            .unwrap()
            .confidence
            .unwrap();
        assert!(confidence >= 0.5 && confidence <= 1.0);
    }
}
