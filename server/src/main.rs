//! Region Classifier Inference Server
//!
//! HTTP API serving a single trained classifier: `POST /predict` takes a
//! multipart image upload and answers with the predicted label, optionally
//! with a confidence value. `GET /health` reports whether the model loaded.

mod error;
mod routes;
mod state;

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, ValueEnum};
use tracing::{info, warn};

use region_classifier::backend::{backend_name, default_device, DefaultBackend};
use region_classifier::utils::logging::{init_logging, LogConfig};
use region_classifier::{Architecture, ConfidenceSource, InferenceService, ServiceConfig};

use crate::state::AppState;

/// Stock deployments
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Variant {
    /// Field `file`, port 5000, prediction only
    Classic,
    /// Field `image`, port 5001, prediction and confidence
    Confidence,
}

/// Region Classifier Inference Server
#[derive(Parser, Debug)]
#[command(name = "region_classifier_server")]
#[command(version)]
#[command(about = "HTTP inference server for a trained region classifier")]
struct Cli {
    /// Preset used when no config file is given
    #[arg(long, value_enum, default_value = "classic", env = "REGION_CLASSIFIER_VARIANT")]
    variant: Variant,

    /// JSON service config (replaces the preset)
    #[arg(short, long, env = "REGION_CLASSIFIER_CONFIG")]
    config: Option<PathBuf>,

    /// Host to bind to
    #[arg(long, env = "REGION_CLASSIFIER_HOST")]
    host: Option<String>,

    /// Port to listen on
    #[arg(short, long, env = "REGION_CLASSIFIER_PORT")]
    port: Option<u16>,

    /// Trained weights
    #[arg(short, long, env = "REGION_CLASSIFIER_MODEL")]
    model: Option<PathBuf>,

    /// Class names, one per line
    #[arg(short, long, env = "REGION_CLASSIFIER_LABELS")]
    labels: Option<PathBuf>,

    /// Architecture the weights were trained with
    #[arg(short, long, env = "REGION_CLASSIFIER_ARCHITECTURE")]
    architecture: Option<Architecture>,

    /// Multipart field carrying the image
    #[arg(long)]
    field_name: Option<String>,

    /// Where the confidence value comes from (table or softmax)
    #[arg(long)]
    confidence_source: Option<ConfidenceSource>,

    /// JSON object mapping label to confidence
    #[arg(long, env = "REGION_CLASSIFIER_CONFIDENCE_TABLE")]
    confidence_table: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, default_value = "false")]
    verbose: bool,
}

impl Cli {
    fn service_config(&self) -> anyhow::Result<ServiceConfig> {
        let mut config = match &self.config {
            Some(path) => ServiceConfig::load(path)?,
            None => match self.variant {
                Variant::Classic => ServiceConfig::classic(),
                Variant::Confidence => ServiceConfig::with_confidence(),
            },
        };

        if let Some(host) = &self.host {
            config.host = host.clone();
        }
        if let Some(port) = self.port {
            config.port = port;
        }
        if let Some(model) = &self.model {
            config.model_path = model.clone();
        }
        if let Some(labels) = &self.labels {
            config.labels_path = labels.clone();
        }
        if let Some(architecture) = self.architecture {
            config.architecture = architecture;
        }
        if let Some(field_name) = &self.field_name {
            config.field_name = field_name.clone();
        }
        if let Some(source) = self.confidence_source {
            config.confidence_source = source;
        }
        if let Some(table) = &self.confidence_table {
            config.confidence_table = Some(table.clone());
        }

        Ok(config)
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let _ = init_logging(&LogConfig::from_verbosity(cli.verbose));

    let config = cli.service_config()?;

    info!("Region Classifier Server v{}", env!("CARGO_PKG_VERSION"));
    info!("Configuration:");
    info!("  Model:        {:?}", config.model_path);
    info!("  Labels:       {:?}", config.labels_path);
    info!("  Architecture: {}", config.architecture);
    info!("  Upload field: {}", config.field_name);
    info!("  Response:     {:?}", config.response_shape);
    info!("  Backend:      {}", backend_name());

    let addr: SocketAddr = config.bind_address().parse()?;

    let service = InferenceService::<DefaultBackend>::load(config, default_device());
    if !service.is_ready() {
        warn!("Serving without a model; every prediction will fail until restart");
    }

    let state = Arc::new(AppState::new(service));
    let app = routes::router(state);

    info!("Starting server on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
