//! Summary statistics of attention maps.

use std::fmt;

use attnskin_core::{AttentionMap, ClassifierOutput, CoreError, Result, N_ATTENTION_STAGES};
use burn::prelude::*;
use serde::{Deserialize, Serialize};

/// Max, min and mean of one attention map over a whole batch.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AttentionStats {
    /// Largest weight.
    pub max: f32,
    /// Smallest weight.
    pub min: f32,
    /// Mean weight.
    pub mean: f32,
}

impl AttentionStats {
    /// Compute from a batch of maps `(N, H, W)`.
    ///
    /// Any NaN weight makes every statistic NaN.
    pub fn from_weights<B: Backend>(weights: Tensor<B, 3>) -> Result<Self> {
        let values = weights
            .into_data()
            .convert::<f32>()
            .to_vec::<f32>()
            .map_err(|e| CoreError::Other(format!("{e:?}")))?;
        Self::from_values(&values)
    }

    /// Compute from host values.
    pub fn from_values(values: &[f32]) -> Result<Self> {
        if values.is_empty() {
            return Err(CoreError::ShapeMismatch("empty attention map".into()));
        }
        if values.iter().any(|v| v.is_nan()) {
            return Ok(Self {
                max: f32::NAN,
                min: f32::NAN,
                mean: f32::NAN,
            });
        }
        let max = values.iter().copied().fold(f32::NEG_INFINITY, f32::max);
        let min = values.iter().copied().fold(f32::INFINITY, f32::min);
        let mean = values.iter().map(|&v| f64::from(v)).sum::<f64>() / values.len() as f64;
        Ok(Self {
            max,
            min,
            mean: mean as f32,
        })
    }
}

impl fmt::Display for AttentionStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "max {:.4} min {:.4} mean {:.4}", self.max, self.min, self.mean)
    }
}

/// Statistics of every stage; `None` where attention is disabled.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AttentionSummary {
    /// Per-stage statistics, shallowest first.
    pub stages: [Option<AttentionStats>; N_ATTENTION_STAGES],
}

impl AttentionSummary {
    /// Summarize the attention maps of a forward pass.
    pub fn from_maps<B: Backend>(maps: &[AttentionMap<B>; N_ATTENTION_STAGES]) -> Result<Self> {
        let mut stages = [None; N_ATTENTION_STAGES];
        for (slot, map) in stages.iter_mut().zip(maps) {
            if let Some(weights) = map.weights() {
                *slot = Some(AttentionStats::from_weights(weights.clone())?);
            }
        }
        Ok(Self { stages })
    }

    /// Summarize the attention maps of a classifier output.
    pub fn from_output<B: Backend>(output: &ClassifierOutput<B>) -> Result<Self> {
        Self::from_maps(&output.attention)
    }

    /// True if no stage produced a map.
    pub fn is_disabled(&self) -> bool {
        self.stages.iter().all(Option::is_none)
    }

    /// Log every computed stage at info level.
    pub fn log(&self, label: &str) {
        for (i, stats) in self.stages.iter().enumerate() {
            if let Some(stats) = stats {
                tracing::info!("{label} c{}: {stats}", i + 1);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use attnskin_core::AttentionNormalization;
    use burn_ndarray::NdArray;

    type TestBackend = NdArray;

    #[test]
    fn test_stats_from_values() {
        let stats = AttentionStats::from_values(&[0.1, 0.4, 0.25, 0.25]).unwrap();
        assert!((stats.max - 0.4).abs() < 1e-6);
        assert!((stats.min - 0.1).abs() < 1e-6);
        assert!((stats.mean - 0.25).abs() < 1e-6);
        assert!(AttentionStats::from_values(&[]).is_err());
    }

    #[test]
    fn test_nan_is_reported() {
        let stats = AttentionStats::from_values(&[0.1, f32::NAN]).unwrap();
        assert!(stats.max.is_nan() && stats.min.is_nan() && stats.mean.is_nan());
    }

    #[test]
    fn test_summary_skips_disabled_stages() {
        let device = Default::default();
        let weights = Tensor::<TestBackend, 3>::full([2, 2, 2], 0.25, &device);
        let maps = [
            AttentionMap::Computed {
                weights: weights.clone(),
                scores: weights,
                normalization: AttentionNormalization::Softmax,
            },
            AttentionMap::Disabled,
            AttentionMap::Disabled,
        ];
        let summary = AttentionSummary::from_maps(&maps).unwrap();
        assert_eq!(summary.stages[0].map(|s| s.mean), Some(0.25));
        assert!(summary.stages[1].is_none());
        assert!(!summary.is_disabled());

        let none = AttentionSummary::from_maps::<TestBackend>(&[
            AttentionMap::Disabled,
            AttentionMap::Disabled,
            AttentionMap::Disabled,
        ])
        .unwrap();
        assert!(none.is_disabled());
    }
}
