//! Convolutional feature extractors.
//!
//! A backbone turns an image batch into three stage maps at strides 8, 16
//! and 32 plus one pooled global descriptor. The attention gates only see
//! backbones through [`FeatureExtractor`].

mod resnet;
mod vgg;

use std::str::FromStr;

use burn::prelude::*;
use serde::{Deserialize, Serialize};

use crate::error::{ModelError, Result};
use crate::init::WeightInit;

pub use resnet::{BasicBlock, ResNetBackbone};
pub use vgg::{ConvBnRelu, VggBackbone, VggBlock};

/// Overall stride of each attended stage.
pub const STAGE_STRIDES: [usize; 3] = [8, 16, 32];

/// Feature maps produced by a backbone.
#[derive(Debug, Clone)]
pub struct BackboneFeatures<B: Backend> {
    /// Stage maps `(N, C_i, H/s_i, W/s_i)` for `s = 8, 16, 32`.
    pub stages: [Tensor<B, 4>; 3],
    /// Global descriptor `(N, C_g)`.
    pub global: Tensor<B, 2>,
}

/// A network that produces multi-scale feature maps.
pub trait FeatureExtractor<B: Backend> {
    /// Channels of the three stage maps.
    fn stage_channels(&self) -> [usize; 3];

    /// Channels of the global descriptor.
    fn global_channels(&self) -> usize;

    /// Run the network.
    ///
    /// # Arguments
    ///
    /// * `images` - Input tensor of shape (N, 3, H, W)
    fn extract(&self, images: Tensor<B, 4>) -> BackboneFeatures<B>;

    /// Architecture name for logs and checkpoints.
    fn name(&self) -> &'static str;
}

/// Backbone architecture family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum BackboneKind {
    /// VGG-16 style plain convolutions.
    #[default]
    Vgg,
    /// ResNet style residual layers.
    ResNet,
}

impl FromStr for BackboneKind {
    type Err = ModelError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "vgg" | "vggnet" | "vgg16" => Ok(Self::Vgg),
            "resnet" | "resnet18" => Ok(Self::ResNet),
            other => Err(ModelError::Config(format!("invalid base model name '{other}'"))),
        }
    }
}

impl std::fmt::Display for BackboneKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Vgg => write!(f, "vgg"),
            Self::ResNet => write!(f, "resnet"),
        }
    }
}

/// Configuration for a backbone.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackboneConfig {
    /// Architecture family.
    pub kind: BackboneKind,
    /// Input image channels.
    pub in_channels: usize,
    /// Width of the first stage; deeper stages are multiples of it.
    pub base_width: usize,
    /// Residual blocks per ResNet layer.
    pub resnet_layers: [usize; 4],
    /// Weight initialization for convolutions.
    pub init: WeightInit,
}

impl Default for BackboneConfig {
    fn default() -> Self {
        Self {
            kind: BackboneKind::Vgg,
            in_channels: 3,
            base_width: 64,
            resnet_layers: [2, 2, 2, 2],
            init: WeightInit::default(),
        }
    }
}

impl BackboneConfig {
    /// Create a config for `kind` with default widths.
    pub fn new(kind: BackboneKind) -> Self {
        Self {
            kind,
            ..Default::default()
        }
    }

    /// Set the base width.
    #[must_use]
    pub fn with_base_width(mut self, base_width: usize) -> Self {
        self.base_width = base_width;
        self
    }

    /// Set residual blocks per layer.
    #[must_use]
    pub fn with_resnet_layers(mut self, layers: [usize; 4]) -> Self {
        self.resnet_layers = layers;
        self
    }

    /// Set weight initialization.
    #[must_use]
    pub fn with_init(mut self, init: WeightInit) -> Self {
        self.init = init;
        self
    }

    /// Channels of the three stage maps.
    pub fn stage_channels(&self) -> [usize; 3] {
        let w = self.base_width;
        match self.kind {
            BackboneKind::Vgg => vgg::stage_channels(w),
            BackboneKind::ResNet => resnet::stage_channels(w),
        }
    }

    /// Channels of the global descriptor.
    pub fn global_channels(&self) -> usize {
        self.base_width * 8
    }

    /// Check that a backbone can be built from this config.
    pub fn validate(&self) -> Result<()> {
        if self.in_channels == 0 {
            return Err(ModelError::Config("input channels must be positive".into()));
        }
        if self.base_width == 0 {
            return Err(ModelError::Config("base width must be positive".into()));
        }
        if self.kind == BackboneKind::ResNet && self.resnet_layers.contains(&0) {
            return Err(ModelError::Config(format!(
                "every ResNet layer needs at least one block, got {:?}",
                self.resnet_layers
            )));
        }
        Ok(())
    }

    /// Initialize the backbone.
    pub fn init<B: Backend>(&self, device: &B::Device) -> Result<Backbone<B>> {
        self.validate()?;
        Ok(match self.kind {
            BackboneKind::Vgg => Backbone::Vgg(VggBackbone::new(self, device)),
            BackboneKind::ResNet => Backbone::ResNet(ResNetBackbone::new(self, device)),
        })
    }
}

/// Any supported backbone.
#[derive(Module, Debug)]
pub enum Backbone<B: Backend> {
    /// VGG backbone.
    Vgg(VggBackbone<B>),
    /// ResNet backbone.
    ResNet(ResNetBackbone<B>),
}

impl<B: Backend> FeatureExtractor<B> for Backbone<B> {
    fn stage_channels(&self) -> [usize; 3] {
        match self {
            Self::Vgg(net) => net.stage_channels(),
            Self::ResNet(net) => net.stage_channels(),
        }
    }

    fn global_channels(&self) -> usize {
        match self {
            Self::Vgg(net) => net.global_channels(),
            Self::ResNet(net) => net.global_channels(),
        }
    }

    fn extract(&self, images: Tensor<B, 4>) -> BackboneFeatures<B> {
        match self {
            Self::Vgg(net) => net.extract(images),
            Self::ResNet(net) => net.extract(images),
        }
    }

    fn name(&self) -> &'static str {
        match self {
            Self::Vgg(net) => net.name(),
            Self::ResNet(net) => net.name(),
        }
    }
}

/// `(N, C, 1, 1)` pooled map to `(N, C)`.
pub(crate) fn flatten_pooled<B: Backend>(x: Tensor<B, 4>) -> Tensor<B, 2> {
    let [n, c, _, _] = x.dims();
    x.reshape([n, c])
}
