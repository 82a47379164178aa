//! Batch-level metrics tracked while training.

use burn::prelude::*;
use serde::{Deserialize, Serialize};

/// Fraction of rows whose arg-max matches the target.
pub fn batch_accuracy<B: Backend>(logits: Tensor<B, 2>, targets: Tensor<B, 1, Int>) -> f32 {
    let [n, _] = logits.dims();
    if n == 0 {
        return 0.0;
    }
    let preds = logits.argmax(1).reshape([n]);
    let correct: i64 = preds.equal(targets).int().sum().into_scalar().elem();
    correct as f32 / n as f32
}

/// Exponential moving average `decay * value + (1 - decay) * sample`, starting at 0.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RunningAverage {
    decay: f32,
    value: f32,
}

impl RunningAverage {
    /// Create an average with the given decay.
    pub fn new(decay: f32) -> Self {
        Self { decay, value: 0.0 }
    }

    /// Fold in a new observation and return the updated value.
    pub fn update(&mut self, sample: f32) -> f32 {
        self.value = self.decay * self.value + (1.0 - self.decay) * sample;
        self.value
    }

    /// Current value.
    pub fn value(&self) -> f32 {
        self.value
    }
}

impl Default for RunningAverage {
    fn default() -> Self {
        Self::new(0.98)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn_ndarray::NdArray;

    #[test]
    fn test_batch_accuracy() {
        let device = Default::default();
        let logits =
            Tensor::<NdArray, 2>::from_floats([[0.9, 0.1], [0.2, 0.8], [0.6, 0.4], [0.3, 0.7]], &device);
        let targets = Tensor::<NdArray, 1, Int>::from_ints([0, 1, 1, 1], &device);
        assert!((batch_accuracy(logits, targets) - 0.75).abs() < 1e-6);
    }

    #[test]
    fn test_running_average() {
        let mut avg = RunningAverage::default();
        assert!((avg.update(1.0) - 0.02).abs() < 1e-6);
        assert!((avg.update(1.0) - (0.98 * 0.02 + 0.02)).abs() < 1e-6);
        assert!((avg.value() - 0.0396).abs() < 1e-6);
    }
}
