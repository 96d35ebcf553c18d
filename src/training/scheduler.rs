//! Learning Rate Scheduler
//!
//! Epoch-level schedules evaluated before each epoch starts.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum LrScheduler {
    /// Constant learning rate (no scheduling)
    Constant { lr: f64 },

    /// Multiply the rate by `gamma` every `step_size` epochs:
    /// `lr = initial_lr * gamma^(epoch / step_size)`
    StepLr {
        initial_lr: f64,
        step_size: usize,
        gamma: f64,
    },
}

impl LrScheduler {
    pub fn constant(lr: f64) -> Self {
        Self::Constant { lr }
    }

    /// A `step_size` of zero never decays
    pub fn step_lr(initial_lr: f64, step_size: usize, gamma: f64) -> Self {
        if step_size == 0 {
            return Self::constant(initial_lr);
        }
        Self::StepLr {
            initial_lr,
            step_size,
            gamma,
        }
    }

    /// Learning rate for a zero-based epoch index
    pub fn get_lr(&self, epoch: usize) -> f64 {
        match self {
            Self::Constant { lr } => *lr,
            Self::StepLr {
                initial_lr,
                step_size,
                gamma,
            } => {
                let steps = (epoch / step_size) as i32;
                initial_lr * gamma.powi(steps)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-12
    }

    #[test]
    fn test_step_lr_decays_every_step_size_epochs() {
        let scheduler = LrScheduler::step_lr(1e-4, 7, 0.1);

        assert!(close(scheduler.get_lr(0), 1e-4));
        assert!(close(scheduler.get_lr(6), 1e-4));
        assert!(close(scheduler.get_lr(7), 1e-5));
        assert!(close(scheduler.get_lr(14), 1e-6));
        assert!(close(scheduler.get_lr(29), 1e-8));
    }

    #[test]
    fn test_zero_step_size_is_constant() {
        let scheduler = LrScheduler::step_lr(0.01, 0, 0.1);
        assert_eq!(scheduler, LrScheduler::constant(0.01));
        assert_eq!(scheduler.get_lr(100), 0.01);
    }
}
