//! Training module
//!
//! - `supervised`: the fine-tuning loop and its configuration
//! - `loss`: class-weighted cross-entropy
//! - `scheduler`: epoch-level learning-rate schedules

pub mod loss;
pub mod scheduler;
pub mod supervised;

pub use loss::weighted_cross_entropy;
pub use scheduler::LrScheduler;
pub use supervised::{
    run_training, TrainingConfig, TrainingOutputs, TrainingSummary, DEFAULT_DATA_ROOT,
};
