//! Learning rate schedulers, stepped once per epoch.

use serde::{Deserialize, Serialize};

use crate::error::{Result, TrainError};

/// Trait for learning rate schedulers.
pub trait Scheduler: Send + Sync {
    /// Get the learning rate for an epoch (0-indexed).
    fn get_lr(&self, epoch: usize) -> f64;

    /// Get the scheduler name.
    fn name(&self) -> &str;
}

/// Step decay scheduler: `initial_lr * gamma^(epoch / step_size)`.
#[derive(Debug, Clone)]
pub struct StepLR {
    initial_lr: f64,
    step_size: usize,
    gamma: f64,
}

impl StepLR {
    /// Create a new step decay scheduler.
    pub fn new(initial_lr: f64, step_size: usize, gamma: f64) -> Self {
        Self {
            initial_lr,
            step_size: step_size.max(1),
            gamma,
        }
    }
}

impl Scheduler for StepLR {
    fn get_lr(&self, epoch: usize) -> f64 {
        let n_decays = epoch / self.step_size;
        self.initial_lr * self.gamma.powi(n_decays as i32)
    }

    fn name(&self) -> &str {
        "StepLR"
    }
}

/// Constant learning rate (no scheduling).
#[derive(Debug, Clone)]
pub struct ConstantLR {
    lr: f64,
}

impl ConstantLR {
    /// Create a new constant LR scheduler.
    pub fn new(lr: f64) -> Self {
        Self { lr }
    }
}

impl Scheduler for ConstantLR {
    fn get_lr(&self, _epoch: usize) -> f64 {
        self.lr
    }

    fn name(&self) -> &str {
        "ConstantLR"
    }
}

/// Serializable scheduler choice.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SchedulerConfig {
    /// Multiply by `gamma` every `step_size` epochs.
    Step {
        /// Epochs between decays.
        step_size: usize,
        /// Decay factor.
        gamma: f64,
    },
    /// Keep the initial rate.
    Constant,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self::Step {
            step_size: 10,
            gamma: 0.5,
        }
    }
}

impl SchedulerConfig {
    /// Build the scheduler for an initial learning rate.
    ///
    /// # Errors
    ///
    /// Returns an error for a non-positive rate, a zero step size or a
    /// decay factor outside `(0, 1]`.
    pub fn init(&self, initial_lr: f64) -> Result<Box<dyn Scheduler>> {
        if !(initial_lr.is_finite() && initial_lr > 0.0) {
            return Err(TrainError::InvalidLearningRate(format!(
                "learning rate must be positive, got {initial_lr}"
            )));
        }
        match *self {
            Self::Step { step_size, gamma } => {
                if step_size == 0 || !(gamma > 0.0 && gamma <= 1.0) {
                    return Err(TrainError::Config(format!(
                        "step schedule needs step_size > 0 and gamma in (0, 1], got {step_size} and {gamma}"
                    )));
                }
                Ok(Box::new(StepLR::new(initial_lr, step_size, gamma)))
            }
            Self::Constant => Ok(Box::new(ConstantLR::new(initial_lr))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_step_lr() {
        let scheduler = StepLR::new(0.01, 10, 0.5);

        assert!((scheduler.get_lr(0) - 0.01).abs() < 1e-12);
        assert!((scheduler.get_lr(9) - 0.01).abs() < 1e-12);
        assert!((scheduler.get_lr(10) - 0.005).abs() < 1e-12);
        assert!((scheduler.get_lr(25) - 0.0025).abs() < 1e-12);
    }

    #[test]
    fn test_constant_lr() {
        let scheduler = ConstantLR::new(0.1);
        assert_eq!(scheduler.get_lr(0), scheduler.get_lr(100));
    }

    #[test]
    fn test_config() {
        let scheduler = SchedulerConfig::default().init(0.01).unwrap();
        assert_eq!(scheduler.name(), "StepLR");
        assert!((scheduler.get_lr(20) - 0.0025).abs() < 1e-12);

        assert!(SchedulerConfig::Constant.init(0.0).is_err());
        let bad = SchedulerConfig::Step {
            step_size: 0,
            gamma: 0.5,
        };
        assert!(bad.init(0.01).is_err());
    }
}
