//! Attention gates over backbone feature maps.
//!
//! A gate scores every location of a local feature map `L (N, C_l, H, W)`
//! against the global descriptor `g (N, C_g)` of the same image, normalizes
//! the scores into weights and returns the weighted sum of local features.
//!
//! Reference: "Learn to Pay Attention" (Jetley et al., 2018)

use std::str::FromStr;

use attnskin_core::{AttentionMap, AttentionNormalization, CoreError};
use burn::module::Ignored;
use burn::nn::conv::{Conv2d, Conv2dConfig};
use burn::nn::{Linear, LinearConfig};
use burn::prelude::*;
use serde::{Deserialize, Serialize};

use crate::error::{ModelError, Result};
use crate::init::WeightInit;
use crate::normalize::{Normalize, Normalizer, SigmoidScale};

/// How a local feature vector is scored against the global query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum Compatibility {
    /// `<l, g>`; needs `C_l == C_g` after projection.
    DotProduct,
    /// `l^T W g` with a learned `W (C_l x C_g)`.
    Bilinear,
    /// `w^T (l + g)` with a learned 1x1 convolution; needs `C_l == C_g` after projection.
    #[default]
    Additive,
}

impl Compatibility {
    /// Whether scoring requires local and global channels to agree.
    #[must_use]
    pub const fn needs_matching_dims(&self) -> bool {
        !matches!(self, Self::Bilinear)
    }
}

impl FromStr for Compatibility {
    type Err = ModelError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().replace('_', "-").as_str() {
            "dot" | "dot-product" => Ok(Self::DotProduct),
            "bilinear" => Ok(Self::Bilinear),
            "additive" | "linear" => Ok(Self::Additive),
            other => Err(ModelError::Config(format!(
                "unknown compatibility function '{other}'"
            ))),
        }
    }
}

impl std::fmt::Display for Compatibility {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::DotProduct => write!(f, "dot-product"),
            Self::Bilinear => write!(f, "bilinear"),
            Self::Additive => write!(f, "additive"),
        }
    }
}

/// Configuration for an [`AttentionGate`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttentionGateConfig {
    /// Channels of the local feature map.
    pub local_channels: usize,
    /// Channels of the global descriptor.
    pub global_channels: usize,
    /// Compatibility function.
    pub compatibility: Compatibility,
    /// Score normalization.
    pub normalization: AttentionNormalization,
    /// Pooling scale for sigmoid attention.
    pub sigmoid_scale: SigmoidScale,
    /// Learn a 1x1 projection of local features when channel counts differ.
    pub project_local: bool,
    /// Initialization of the gate parameters.
    pub init: WeightInit,
}

impl AttentionGateConfig {
    /// Create a config for the given channel counts.
    pub fn new(local_channels: usize, global_channels: usize) -> Self {
        Self {
            local_channels,
            global_channels,
            compatibility: Compatibility::default(),
            normalization: AttentionNormalization::default(),
            sigmoid_scale: SigmoidScale::default(),
            project_local: true,
            init: WeightInit::default(),
        }
    }

    /// Set compatibility function.
    #[must_use]
    pub fn with_compatibility(mut self, compatibility: Compatibility) -> Self {
        self.compatibility = compatibility;
        self
    }

    /// Set normalization.
    #[must_use]
    pub fn with_normalization(mut self, normalization: AttentionNormalization) -> Self {
        self.normalization = normalization;
        self
    }

    /// Set sigmoid pooling scale.
    #[must_use]
    pub fn with_sigmoid_scale(mut self, scale: SigmoidScale) -> Self {
        self.sigmoid_scale = scale;
        self
    }

    /// Enable or disable the local projection.
    #[must_use]
    pub fn with_project_local(mut self, project_local: bool) -> Self {
        self.project_local = project_local;
        self
    }

    /// Set weight initialization.
    #[must_use]
    pub fn with_init(mut self, init: WeightInit) -> Self {
        self.init = init;
        self
    }

    fn needs_projector(&self) -> bool {
        self.compatibility.needs_matching_dims() && self.local_channels != self.global_channels
    }

    /// Check that a gate can be built from this config.
    pub fn validate(&self) -> Result<()> {
        if self.local_channels == 0 || self.global_channels == 0 {
            return Err(ModelError::Config(format!(
                "attention gate channels must be positive, got local={} global={}",
                self.local_channels, self.global_channels
            )));
        }
        if self.needs_projector() && !self.project_local {
            return Err(ModelError::Config(format!(
                "{} compatibility needs matching channels but local={} global={} and projection is disabled",
                self.compatibility, self.local_channels, self.global_channels
            )));
        }
        Normalizer::new(self.normalization, self.sigmoid_scale).map(|_| ())
    }

    /// Initialize the gate.
    pub fn init<B: Backend>(&self, device: &B::Device) -> Result<AttentionGate<B>> {
        self.validate()?;
        let normalizer = Normalizer::new(self.normalization, self.sigmoid_scale)?;
        let initializer = self.init.initializer();

        let projector = self.needs_projector().then(|| {
            Conv2dConfig::new([self.local_channels, self.global_channels], [1, 1])
                .with_bias(false)
                .with_initializer(initializer.clone())
                .init(device)
        });
        let bilinear = matches!(self.compatibility, Compatibility::Bilinear).then(|| {
            LinearConfig::new(self.global_channels, self.local_channels)
                .with_bias(false)
                .with_initializer(initializer.clone())
                .init(device)
        });
        let score_conv = matches!(self.compatibility, Compatibility::Additive).then(|| {
            Conv2dConfig::new([self.global_channels, 1], [1, 1])
                .with_bias(false)
                .with_initializer(initializer.clone())
                .init(device)
        });

        Ok(AttentionGate {
            projector,
            bilinear,
            score_conv,
            local_channels: self.local_channels,
            global_channels: self.global_channels,
            compatibility: Ignored(self.compatibility),
            normalizer: Ignored(normalizer),
        })
    }
}

/// What one gate returns.
#[derive(Debug, Clone)]
pub struct GateOutput<B: Backend> {
    /// Normalized attention `(N, H, W)`.
    pub weights: Tensor<B, 3>,
    /// Raw compatibility scores `(N, H, W)`.
    pub scores: Tensor<B, 3>,
    /// Attention-pooled local features `(N, C_l)`.
    pub pooled: Tensor<B, 2>,
}

impl<B: Backend> GateOutput<B> {
    /// Split into the reported map and the pooled descriptor.
    pub fn into_parts(self, normalization: AttentionNormalization) -> (AttentionMap<B>, Tensor<B, 2>) {
        let map = AttentionMap::Computed {
            weights: self.weights,
            scores: self.scores,
            normalization,
        };
        (map, self.pooled)
    }
}

/// Attention gate for one backbone stage.
#[derive(Module, Debug)]
pub struct AttentionGate<B: Backend> {
    /// 1x1 projection `C_l -> C_g` used for scoring.
    projector: Option<Conv2d<B>>,
    /// `W` of the bilinear form, applied to the query.
    bilinear: Option<Linear<B>>,
    /// Additive scoring vector.
    score_conv: Option<Conv2d<B>>,
    local_channels: usize,
    global_channels: usize,
    compatibility: Ignored<Compatibility>,
    normalizer: Ignored<Normalizer>,
}

impl<B: Backend> AttentionGate<B> {
    /// Channels of the local map this gate accepts.
    pub fn local_channels(&self) -> usize {
        self.local_channels
    }

    /// Channels of the global query this gate accepts.
    pub fn global_channels(&self) -> usize {
        self.global_channels
    }

    /// Compatibility function in use.
    pub fn compatibility(&self) -> Compatibility {
        self.compatibility.0
    }

    /// Normalization in use.
    pub fn normalization(&self) -> AttentionNormalization {
        Normalize::<B>::kind(&self.normalizer.0)
    }

    /// Whether a learned local projection exists.
    pub fn has_projector(&self) -> bool {
        self.projector.is_some()
    }

    /// Score, normalize and pool.
    ///
    /// # Arguments
    ///
    /// * `local` - Feature map of shape (N, C_l, H, W)
    /// * `global` - Global descriptor of shape (N, C_g)
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::ShapeMismatch`] when either input disagrees with
    /// the configured channel counts or the batch sizes differ.
    pub fn forward(
        &self,
        local: Tensor<B, 4>,
        global: Tensor<B, 2>,
    ) -> attnskin_core::Result<GateOutput<B>> {
        let [n, c, h, w] = local.dims();
        let [n_g, c_g] = global.dims();

        if c != self.local_channels {
            return Err(CoreError::ShapeMismatch(format!(
                "attention gate expects {} local channels, got {}",
                self.local_channels, c
            )));
        }
        if c_g != self.global_channels {
            return Err(CoreError::ShapeMismatch(format!(
                "attention gate expects {} global channels, got {}",
                self.global_channels, c_g
            )));
        }
        if n != n_g {
            return Err(CoreError::ShapeMismatch(format!(
                "local batch size {} != global batch size {}",
                n, n_g
            )));
        }

        let locations = h * w;
        let scores = self.scores(local.clone(), global)?;
        let weights = Normalize::<B>::normalize(&self.normalizer.0, scores.clone());
        let scale = Normalize::<B>::pool_scale(&self.normalizer.0, locations);

        let pooled = local
            .reshape([n, c, locations])
            .mul(weights.clone().reshape([n, 1, locations]))
            .sum_dim(2)
            .reshape([n, c])
            .mul_scalar(scale);

        Ok(GateOutput {
            weights: weights.reshape([n, h, w]),
            scores: scores.reshape([n, h, w]),
            pooled,
        })
    }

    /// Flattened compatibility scores `(N, H*W)`.
    fn scores(&self, local: Tensor<B, 4>, global: Tensor<B, 2>) -> attnskin_core::Result<Tensor<B, 2>> {
        let [n, c, h, w] = local.dims();
        let locations = h * w;
        let c_g = self.global_channels;

        let keys = |local: Tensor<B, 4>| match &self.projector {
            Some(projector) => projector.forward(local),
            None => local,
        };

        let scores = match self.compatibility.0 {
            Compatibility::DotProduct => {
                let keys = keys(local).reshape([n, c_g, locations]);
                global.reshape([n, 1, c_g]).matmul(keys).reshape([n, locations])
            }
            Compatibility::Bilinear => {
                let bilinear = self.bilinear.as_ref().ok_or_else(|| missing("bilinear"))?;
                let query = bilinear.forward(global).reshape([n, 1, c]);
                query
                    .matmul(local.reshape([n, c, locations]))
                    .reshape([n, locations])
            }
            Compatibility::Additive => {
                let score_conv = self.score_conv.as_ref().ok_or_else(|| missing("additive"))?;
                let summed = keys(local) + global.reshape([n, c_g, 1, 1]);
                score_conv.forward(summed).reshape([n, locations])
            }
        };

        Ok(scores)
    }
}

fn missing(what: &str) -> CoreError {
    CoreError::Other(format!("attention gate has no {what} parameters"))
}
