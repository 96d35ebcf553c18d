//! Logging
//!
//! One compact `tracing` subscriber for the CLI and the server, plus the
//! per-epoch timer used by the training loop.

use std::time::{Duration, Instant};

use tracing::Level;
use tracing_subscriber::FmtSubscriber;

use super::format_duration;

/// Environment variable overriding the log level (`trace` .. `error`)
pub const LOG_LEVEL_ENV: &str = "REGION_CLASSIFIER_LOG";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogConfig {
    pub level: Level,
    /// Print the module path of each event
    pub show_target: bool,
    pub ansi: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: Level::INFO,
            show_target: false,
            ansi: true,
        }
    }
}

impl LogConfig {
    pub fn verbose() -> Self {
        Self {
            level: Level::DEBUG,
            show_target: true,
            ..Self::default()
        }
    }

    pub fn quiet() -> Self {
        Self {
            level: Level::ERROR,
            ..Self::default()
        }
    }

    /// `verbose()` for `-v`, otherwise `default()`; `REGION_CLASSIFIER_LOG`
    /// wins over both when it holds a valid level
    pub fn from_verbosity(verbose: bool) -> Self {
        let mut config = if verbose { Self::verbose() } else { Self::default() };
        if let Some(level) = std::env::var(LOG_LEVEL_ENV)
            .ok()
            .and_then(|value| value.parse::<Level>().ok())
        {
            config.level = level;
        }
        config
    }
}

/// Install the global tracing subscriber
///
/// Fails if a global subscriber was already set.
pub fn init_logging(config: &LogConfig) -> Result<(), String> {
    let subscriber = FmtSubscriber::builder()
        .with_max_level(config.level)
        .with_ansi(config.ansi)
        .with_target(config.show_target)
        .compact()
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .map_err(|e| format!("Failed to initialize logging: {}", e))
}

/// Wall-clock bookkeeping for the epoch loop
pub struct TrainingLogger {
    total_epochs: usize,
    completed: usize,
    epoch_start: Instant,
    training_start: Instant,
}

impl TrainingLogger {
    pub fn new(total_epochs: usize) -> Self {
        let now = Instant::now();
        Self {
            total_epochs,
            completed: 0,
            epoch_start: now,
            training_start: now,
        }
    }

    pub fn start_epoch(&mut self, epoch: usize, learning_rate: f64) {
        self.epoch_start = Instant::now();
        tracing::debug!("epoch {}/{} lr={:e}", epoch + 1, self.total_epochs, learning_rate);
    }

    pub fn end_epoch(&mut self, train_loss: f64) {
        self.completed += 1;
        tracing::info!(
            "epoch {}/{} took {} (loss {:.4}, {} remaining)",
            self.completed,
            self.total_epochs,
            format_duration(self.epoch_start.elapsed()),
            train_loss,
            format_duration(self.remaining())
        );
    }

    /// Mean epoch time so far times the epochs left
    pub fn remaining(&self) -> Duration {
        if self.completed == 0 {
            return Duration::ZERO;
        }
        let left = self.total_epochs.saturating_sub(self.completed) as u32;
        self.training_start.elapsed() / self.completed as u32 * left
    }

    pub fn log_complete(&self) {
        tracing::info!(
            "training finished: {} epochs in {}",
            self.completed,
            format_duration(self.training_start.elapsed())
        );
    }
}
