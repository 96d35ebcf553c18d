//! Health check endpoint

use axum::{extract::State, Json};
use serde::Serialize;

use crate::state::SharedState;

#[derive(Serialize)]
pub struct HealthResponse {
    /// `ok` when the model is loaded, `degraded` otherwise
    pub status: String,
    pub model_loaded: bool,
    pub num_classes: usize,
    pub uptime_seconds: u64,
    pub version: String,
    /// Why the model or class names failed to load
    #[serde(skip_serializing_if = "Option::is_none")]
    pub load_error: Option<String>,
}

/// GET /health - Health check endpoint
pub async fn health_check(State(state): State<SharedState>) -> Json<HealthResponse> {
    let model_loaded = state.service.is_ready();

    Json(HealthResponse {
        status: if model_loaded { "ok" } else { "degraded" }.to_string(),
        model_loaded,
        num_classes: state.service.num_classes(),
        uptime_seconds: state.uptime_seconds(),
        version: region_classifier::VERSION.to_string(),
        load_error: state.service.load_error().map(str::to_string),
    })
}
