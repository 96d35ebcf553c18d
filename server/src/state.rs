//! Application state for the inference server

use std::sync::Arc;
use std::time::Instant;

use region_classifier::backend::DefaultBackend;
use region_classifier::InferenceService;

/// Shared application state
pub struct AppState {
    /// Loaded model, labels and confidence data
    pub service: InferenceService<DefaultBackend>,
    /// Server start time
    pub started_at: Instant,
}

impl AppState {
    pub fn new(service: InferenceService<DefaultBackend>) -> Self {
        Self {
            service,
            started_at: Instant::now(),
        }
    }

    /// Get uptime in seconds
    pub fn uptime_seconds(&self) -> u64 {
        self.started_at.elapsed().as_secs()
    }
}

pub type SharedState = Arc<AppState>;
