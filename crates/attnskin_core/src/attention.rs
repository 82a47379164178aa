//! Attention map values produced by a classifier.

use std::str::FromStr;

use burn::prelude::*;
use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// How compatibility scores are turned into attention weights.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum AttentionNormalization {
    /// Softmax over all spatial locations; weights sum to 1 per image.
    #[default]
    Softmax,
    /// Independent sigmoid per location; weights in `(0, 1)`.
    Sigmoid,
}

impl FromStr for AttentionNormalization {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "softmax" => Ok(Self::Softmax),
            "sigmoid" => Ok(Self::Sigmoid),
            other => Err(CoreError::ConfigError(format!(
                "unknown attention normalization '{other}' (expected softmax or sigmoid)"
            ))),
        }
    }
}

impl std::fmt::Display for AttentionNormalization {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Softmax => write!(f, "softmax"),
            Self::Sigmoid => write!(f, "sigmoid"),
        }
    }
}

/// The attention output of one backbone stage.
///
/// A model with attention switched off reports [`AttentionMap::Disabled`]
/// for every stage rather than a tensor of zeros.
#[derive(Debug, Clone)]
pub enum AttentionMap<B: Backend> {
    /// Attention computed by a gate.
    Computed {
        /// Normalized weights `(N, H, W)`.
        weights: Tensor<B, 3>,
        /// Compatibility scores before normalization `(N, H, W)`.
        scores: Tensor<B, 3>,
        /// Normalization that produced `weights`.
        normalization: AttentionNormalization,
    },
    /// No gate at this stage.
    Disabled,
}

impl<B: Backend> AttentionMap<B> {
    /// Check whether a map was computed.
    #[must_use]
    pub fn is_computed(&self) -> bool {
        matches!(self, Self::Computed { .. })
    }

    /// Normalized weights, if computed.
    pub fn weights(&self) -> Option<&Tensor<B, 3>> {
        match self {
            Self::Computed { weights, .. } => Some(weights),
            Self::Disabled => None,
        }
    }

    /// Take the normalized weights, if computed.
    pub fn into_weights(self) -> Option<Tensor<B, 3>> {
        match self {
            Self::Computed { weights, .. } => Some(weights),
            Self::Disabled => None,
        }
    }

    /// Normalization used, if computed.
    #[must_use]
    pub fn normalization(&self) -> Option<AttentionNormalization> {
        match self {
            Self::Computed { normalization, .. } => Some(*normalization),
            Self::Disabled => None,
        }
    }

    /// Spatial extent `(H, W)` of the map, if computed.
    #[must_use]
    pub fn spatial_dims(&self) -> Option<(usize, usize)> {
        self.weights().map(|w| {
            let [_, h, w] = w.dims();
            (h, w)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::NdArray;

    type TestBackend = NdArray;

    #[test]
    fn test_normalization_parse() {
        assert_eq!(
            "softmax".parse::<AttentionNormalization>().unwrap(),
            AttentionNormalization::Softmax
        );
        assert_eq!(
            "Sigmoid".parse::<AttentionNormalization>().unwrap(),
            AttentionNormalization::Sigmoid
        );
        assert!("tanh".parse::<AttentionNormalization>().is_err());
        assert_eq!(AttentionNormalization::Sigmoid.to_string(), "sigmoid");
    }

    #[test]
    fn test_disabled_map_has_no_tensor() {
        let map = AttentionMap::<TestBackend>::Disabled;
        assert!(!map.is_computed());
        assert!(map.weights().is_none());
        assert!(map.spatial_dims().is_none());
        assert!(map.normalization().is_none());
    }

    #[test]
    fn test_computed_map_dims() {
        let device = Default::default();
        let weights = Tensor::<TestBackend, 3>::zeros([2, 7, 5], &device);
        let map = AttentionMap::Computed {
            scores: weights.clone(),
            weights,
            normalization: AttentionNormalization::Softmax,
        };
        assert!(map.is_computed());
        assert_eq!(map.spatial_dims(), Some((7, 5)));
        assert_eq!(map.normalization(), Some(AttentionNormalization::Softmax));
    }
}
