//! Turning compatibility scores into attention weights.
//!
//! Two strategies share the [`Normalize`] capability: [`SoftmaxNormalizer`]
//! makes all locations of an image compete for a unit budget, while
//! [`SigmoidNormalizer`] gates each location independently.

use attnskin_core::AttentionNormalization;
use burn::prelude::*;
use burn::tensor::activation::{sigmoid, softmax};
use serde::{Deserialize, Serialize};

use crate::error::{ModelError, Result};

/// Normalization of flattened scores `(N, H*W)` into attention weights.
pub trait Normalize<B: Backend> {
    /// Map scores `(N, L)` to weights `(N, L)`.
    fn normalize(&self, scores: Tensor<B, 2>) -> Tensor<B, 2>;

    /// Factor applied to the weighted sum over `locations` positions.
    fn pool_scale(&self, locations: usize) -> f32;

    /// Which normalization this is.
    fn kind(&self) -> AttentionNormalization;
}

/// Factor applied to the sigmoid-weighted sum of local features.
///
/// Sigmoid weights do not sum to one, so the pooled vector grows with the
/// number of locations unless rescaled.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case", tag = "kind", content = "value")]
pub enum SigmoidScale {
    /// Divide by `H * W`, i.e. average the gated features.
    #[default]
    SpatialMean,
    /// Plain weighted sum.
    Unscaled,
    /// Multiply by a fixed factor.
    Constant(f32),
}

impl SigmoidScale {
    /// Factor for a map with `locations` positions.
    #[must_use]
    pub fn factor(&self, locations: usize) -> f32 {
        match self {
            Self::SpatialMean => 1.0 / locations.max(1) as f32,
            Self::Unscaled => 1.0,
            Self::Constant(k) => *k,
        }
    }

    /// Reject non-finite or non-positive constants.
    pub fn validate(&self) -> Result<()> {
        match self {
            Self::Constant(k) if !k.is_finite() || *k <= 0.0 => Err(ModelError::Config(format!(
                "sigmoid scale must be a positive finite number, got {k}"
            ))),
            _ => Ok(()),
        }
    }
}

/// Softmax over all spatial locations.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct SoftmaxNormalizer;

impl<B: Backend> Normalize<B> for SoftmaxNormalizer {
    fn normalize(&self, scores: Tensor<B, 2>) -> Tensor<B, 2> {
        softmax(scores, 1)
    }

    fn pool_scale(&self, _locations: usize) -> f32 {
        1.0
    }

    fn kind(&self) -> AttentionNormalization {
        AttentionNormalization::Softmax
    }
}

/// Elementwise sigmoid.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct SigmoidNormalizer {
    /// Scale applied when pooling.
    pub scale: SigmoidScale,
}

impl<B: Backend> Normalize<B> for SigmoidNormalizer {
    fn normalize(&self, scores: Tensor<B, 2>) -> Tensor<B, 2> {
        sigmoid(scores)
    }

    fn pool_scale(&self, locations: usize) -> f32 {
        self.scale.factor(locations)
    }

    fn kind(&self) -> AttentionNormalization {
        AttentionNormalization::Sigmoid
    }
}

/// The normalizer a gate was configured with.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Normalizer {
    /// See [`SoftmaxNormalizer`].
    Softmax(SoftmaxNormalizer),
    /// See [`SigmoidNormalizer`].
    Sigmoid(SigmoidNormalizer),
}

impl Normalizer {
    /// Build the normalizer for `kind`; `scale` only matters for sigmoid.
    pub fn new(kind: AttentionNormalization, scale: SigmoidScale) -> Result<Self> {
        match kind {
            AttentionNormalization::Softmax => Ok(Self::Softmax(SoftmaxNormalizer)),
            AttentionNormalization::Sigmoid => {
                scale.validate()?;
                Ok(Self::Sigmoid(SigmoidNormalizer { scale }))
            }
        }
    }
}

impl Default for Normalizer {
    fn default() -> Self {
        Self::Softmax(SoftmaxNormalizer)
    }
}

impl<B: Backend> Normalize<B> for Normalizer {
    fn normalize(&self, scores: Tensor<B, 2>) -> Tensor<B, 2> {
        match self {
            Self::Softmax(n) => Normalize::<B>::normalize(n, scores),
            Self::Sigmoid(n) => Normalize::<B>::normalize(n, scores),
        }
    }

    fn pool_scale(&self, locations: usize) -> f32 {
        match self {
            Self::Softmax(n) => Normalize::<B>::pool_scale(n, locations),
            Self::Sigmoid(n) => Normalize::<B>::pool_scale(n, locations),
        }
    }

    fn kind(&self) -> AttentionNormalization {
        match self {
            Self::Softmax(_) => AttentionNormalization::Softmax,
            Self::Sigmoid(_) => AttentionNormalization::Sigmoid,
        }
    }
}
