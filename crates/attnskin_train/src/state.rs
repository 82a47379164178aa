//! Mutable bookkeeping threaded through the training loop.

use serde::{Deserialize, Serialize};

use crate::metrics::RunningAverage;

/// Progress of a training run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TrainingState {
    /// Current epoch (0-indexed).
    pub epoch: usize,
    /// Optimizer steps taken so far.
    pub step: usize,
    /// Learning rate of the current epoch.
    pub lr: f64,
    /// Smoothed accuracy of the monitored batches.
    pub running_accuracy: RunningAverage,
    /// Loss of the last step.
    pub last_loss: Option<f32>,
}

impl TrainingState {
    /// Create a fresh state.
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether the current step should be monitored.
    pub fn should_log(&self, log_every: usize) -> bool {
        log_every > 0 && self.step % log_every == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_should_log() {
        let mut state = TrainingState::new();
        assert!(state.should_log(10));
        state.step = 5;
        assert!(!state.should_log(10));
        state.step = 20;
        assert!(state.should_log(10));
        assert!(!state.should_log(0));
    }
}
