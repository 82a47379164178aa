//! The attention-gated lesion classifier.
//!
//! Image -> backbone -> three stage maps and a global descriptor -> one
//! attention gate per stage (queried by the global descriptor) -> fusion ->
//! linear head.
//!
//! With attention switched off no gates are built; each stage is reduced by
//! a spatial mean and every map is reported as [`AttentionMap::Disabled`].

use attnskin_core::{
    AttentionMap, AttentionNormalization, ClassifierOutput, CoreError, LesionClassifier,
};
use burn::module::Ignored;
use burn::nn::{Linear, LinearConfig};
use burn::prelude::*;
use serde::{Deserialize, Serialize};

use crate::attention::{AttentionGate, AttentionGateConfig, Compatibility};
use crate::backbone::{Backbone, BackboneConfig, BackboneFeatures, BackboneKind, FeatureExtractor};
use crate::error::{ModelError, Result};
use crate::fusion::{FusionConfig, FusionMode, StageFusion};
use crate::init::WeightInit;
use crate::normalize::SigmoidScale;

/// Configuration for [`AttnClassifier`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttnClassifierConfig {
    /// Number of output classes.
    pub n_classes: usize,
    /// Feature extractor.
    pub backbone: BackboneConfig,
    /// Build attention gates.
    pub attention: bool,
    /// Attention normalization.
    pub normalization: AttentionNormalization,
    /// Pooling scale for sigmoid attention.
    pub sigmoid_scale: SigmoidScale,
    /// Compatibility function of every gate.
    pub compatibility: Compatibility,
    /// Project local features when their width differs from the global descriptor.
    pub project_local: bool,
    /// Stage fusion.
    pub fusion: FusionConfig,
    /// Initialization of every convolution and linear layer.
    pub init: WeightInit,
}

impl Default for AttnClassifierConfig {
    fn default() -> Self {
        Self {
            n_classes: 2,
            backbone: BackboneConfig::default(),
            attention: true,
            normalization: AttentionNormalization::Softmax,
            sigmoid_scale: SigmoidScale::SpatialMean,
            compatibility: Compatibility::Additive,
            project_local: true,
            fusion: FusionConfig::default(),
            init: WeightInit::KaimingNormal,
        }
    }
}

impl AttnClassifierConfig {
    /// Create a new config.
    pub fn new(n_classes: usize) -> Self {
        Self {
            n_classes,
            ..Default::default()
        }
    }

    /// Set the backbone family.
    #[must_use]
    pub fn with_backbone(mut self, kind: BackboneKind) -> Self {
        self.backbone.kind = kind;
        self
    }

    /// Set the backbone base width.
    #[must_use]
    pub fn with_base_width(mut self, base_width: usize) -> Self {
        self.backbone.base_width = base_width;
        self
    }

    /// Set residual blocks per ResNet layer.
    #[must_use]
    pub fn with_resnet_layers(mut self, layers: [usize; 4]) -> Self {
        self.backbone.resnet_layers = layers;
        self
    }

    /// Switch attention on or off.
    #[must_use]
    pub fn with_attention(mut self, attention: bool) -> Self {
        self.attention = attention;
        self
    }

    /// Set attention normalization.
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

    /// Set compatibility function.
    #[must_use]
    pub fn with_compatibility(mut self, compatibility: Compatibility) -> Self {
        self.compatibility = compatibility;
        self
    }

    /// Enable or disable local projections.
    #[must_use]
    pub fn with_project_local(mut self, project_local: bool) -> Self {
        self.project_local = project_local;
        self
    }

    /// Set fusion mode.
    #[must_use]
    pub fn with_fusion(mut self, mode: FusionMode) -> Self {
        self.fusion.mode = mode;
        self
    }

    /// Fuse the global descriptor as well.
    #[must_use]
    pub fn with_include_global(mut self, include_global: bool) -> Self {
        self.fusion.include_global = include_global;
        self
    }

    /// Set weight initialization for the whole network.
    #[must_use]
    pub fn with_init(mut self, init: WeightInit) -> Self {
        self.init = init;
        self.backbone.init = init;
        self
    }

    fn gate_configs(&self) -> [AttentionGateConfig; 3] {
        let global = self.backbone.global_channels();
        self.backbone.stage_channels().map(|local| {
            AttentionGateConfig::new(local, global)
                .with_compatibility(self.compatibility)
                .with_normalization(self.normalization)
                .with_sigmoid_scale(self.sigmoid_scale)
                .with_project_local(self.project_local)
                .with_init(self.init)
        })
    }

    /// Width of the classifier input.
    pub fn fused_dim(&self) -> Result<usize> {
        self.fusion
            .output_dim(self.backbone.stage_channels(), self.backbone.global_channels())
    }

    /// Check the whole configuration without allocating parameters.
    pub fn validate(&self) -> Result<()> {
        if self.n_classes < 2 {
            return Err(ModelError::Config(format!(
                "need at least 2 classes, got {}",
                self.n_classes
            )));
        }
        self.backbone.validate()?;
        if self.attention {
            for gate in self.gate_configs() {
                gate.validate()?;
            }
        }
        self.fused_dim().map(|_| ())
    }

    /// Initialize the model.
    ///
    /// # Errors
    ///
    /// Fails on any configuration error; no parameters are allocated then.
    pub fn init<B: Backend>(&self, device: &B::Device) -> Result<AttnClassifier<B>> {
        self.validate()?;

        let backbone = self.backbone.init(device)?;
        let fusion = self
            .fusion
            .init(backbone.stage_channels(), backbone.global_channels())?;

        let [gate1, gate2, gate3] = if self.attention {
            let [c1, c2, c3] = self.gate_configs();
            [
                Some(c1.init(device)?),
                Some(c2.init(device)?),
                Some(c3.init(device)?),
            ]
        } else {
            [None, None, None]
        };

        let classify = LinearConfig::new(fusion.output_dim(), self.n_classes)
            .with_initializer(self.init.initializer())
            .init(device);

        tracing::debug!(
            backbone = backbone.name(),
            attention = self.attention,
            fused_dim = fusion.output_dim(),
            "initialized attention classifier"
        );

        Ok(AttnClassifier {
            backbone,
            gate1,
            gate2,
            gate3,
            classify,
            fusion: Ignored(fusion),
            n_classes: self.n_classes,
            in_channels: self.backbone.in_channels,
        })
    }
}

/// Attention-gated classifier over a VGG or ResNet backbone.
#[derive(Module, Debug)]
pub struct AttnClassifier<B: Backend> {
    backbone: Backbone<B>,
    gate1: Option<AttentionGate<B>>,
    gate2: Option<AttentionGate<B>>,
    gate3: Option<AttentionGate<B>>,
    classify: Linear<B>,
    fusion: Ignored<StageFusion>,
    n_classes: usize,
    in_channels: usize,
}

impl<B: Backend> AttnClassifier<B> {
    /// Whether attention gates are present.
    pub fn attention_enabled(&self) -> bool {
        self.gate1.is_some()
    }

    /// The backbone.
    pub fn backbone(&self) -> &Backbone<B> {
        &self.backbone
    }

    /// The gates, shallowest first.
    pub fn gates(&self) -> [Option<&AttentionGate<B>>; 3] {
        [self.gate1.as_ref(), self.gate2.as_ref(), self.gate3.as_ref()]
    }

    /// Run only the backbone.
    ///
    /// # Errors
    ///
    /// Fails when `images` does not have the configured number of channels
    /// or is smaller than the deepest stride.
    pub fn features(&self, images: Tensor<B, 4>) -> attnskin_core::Result<BackboneFeatures<B>> {
        let [_, c, h, w] = images.dims();
        if c != self.in_channels {
            return Err(CoreError::ShapeMismatch(format!(
                "model expects {} input channels, got {}",
                self.in_channels, c
            )));
        }
        if h < 32 || w < 32 {
            return Err(CoreError::InvalidShape {
                expected: "images of at least 32x32".into(),
                got: format!("{h}x{w}"),
            });
        }
        Ok(self.backbone.extract(images))
    }

    fn attend(
        gate: Option<&AttentionGate<B>>,
        local: Tensor<B, 4>,
        global: Tensor<B, 2>,
    ) -> attnskin_core::Result<(AttentionMap<B>, Tensor<B, 2>)> {
        match gate {
            Some(gate) => {
                let normalization = gate.normalization();
                Ok(gate.forward(local, global)?.into_parts(normalization))
            }
            None => Ok((AttentionMap::Disabled, spatial_mean(local))),
        }
    }
}

impl<B: Backend> LesionClassifier<B> for AttnClassifier<B> {
    fn forward_attention(&self, images: Tensor<B, 4>) -> attnskin_core::Result<ClassifierOutput<B>> {
        let BackboneFeatures { stages, global } = self.features(images)?;
        let [s1, s2, s3] = stages;

        let (a1, p1) = Self::attend(self.gate1.as_ref(), s1, global.clone())?;
        let (a2, p2) = Self::attend(self.gate2.as_ref(), s2, global.clone())?;
        let (a3, p3) = Self::attend(self.gate3.as_ref(), s3, global.clone())?;

        let pooled = [p1, p2, p3];
        let fused = self.fusion.0.fuse(pooled.clone(), global);
        let logits = self.classify.forward(fused);

        Ok(ClassifierOutput {
            logits,
            attention: [a1, a2, a3],
            pooled,
        })
    }

    fn n_classes(&self) -> usize {
        self.n_classes
    }
}

/// Mean over all spatial locations: `(N, C, H, W)` to `(N, C)`.
pub fn spatial_mean<B: Backend>(x: Tensor<B, 4>) -> Tensor<B, 2> {
    let [n, c, h, w] = x.dims();
    x.reshape([n, c, h * w]).mean_dim(2).reshape([n, c])
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::tensor::Distribution;
    use burn_ndarray::NdArray;

    type TestBackend = NdArray;

    fn small(n_classes: usize) -> AttnClassifierConfig {
        AttnClassifierConfig::new(n_classes).with_base_width(4)
    }

    fn images(n: usize, side: usize) -> Tensor<TestBackend, 4> {
        Tensor::random([n, 3, side, side], Distribution::Normal(0.0, 1.0), &Default::default())
    }

    #[test]
    fn test_config_default() {
        let config = AttnClassifierConfig::default();
        assert_eq!(config.n_classes, 2);
        assert!(config.attention);
        assert_eq!(config.backbone.kind, BackboneKind::Vgg);
        assert_eq!(config.fusion.mode, FusionMode::Concat);
        assert_eq!(config.fused_dim().unwrap(), 256 + 512 + 512);
    }

    #[test]
    fn test_forward_shapes_with_attention() {
        let device = Default::default();
        let model = small(3).init::<TestBackend>(&device).unwrap();
        assert!(model.attention_enabled());

        let out = model.forward_attention(images(2, 64)).unwrap();
        assert_eq!(out.logits.dims(), [2, 3]);
        let dims: Vec<_> = out.attention.iter().map(|a| a.spatial_dims()).collect();
        assert_eq!(dims, vec![Some((8, 8)), Some((4, 4)), Some((2, 2))]);
        assert_eq!(out.pooled[0].dims(), [2, 16]);
        assert_eq!(out.pooled[2].dims(), [2, 32]);
    }

    #[test]
    fn test_disabled_attention_pools_spatial_mean() {
        let device = Default::default();
        let model = small(2)
            .with_attention(false)
            .init::<TestBackend>(&device)
            .unwrap();
        assert!(!model.attention_enabled());

        let x = images(2, 64);
        let features = model.features(x.clone()).unwrap();
        let out = model.forward_attention(x).unwrap();

        for (map, (pooled, stage)) in out
            .attention
            .iter()
            .zip(out.pooled.iter().zip(features.stages))
        {
            assert!(matches!(map, AttentionMap::Disabled));
            let expected = spatial_mean(stage).into_data().convert::<f32>().to_vec::<f32>().unwrap();
            let got = pooled.clone().into_data().convert::<f32>().to_vec::<f32>().unwrap();
            for (e, g) in expected.iter().zip(&got) {
                assert!((e - g).abs() < 1e-5);
            }
        }
    }

    #[test]
    fn test_resnet_sigmoid_variant() {
        let device = Default::default();
        let model = small(2)
            .with_backbone(BackboneKind::ResNet)
            .with_resnet_layers([1, 1, 1, 1])
            .with_normalization(AttentionNormalization::Sigmoid)
            .with_fusion(FusionMode::Deepest)
            .init::<TestBackend>(&device)
            .unwrap();

        let out = model.forward_attention(images(1, 64)).unwrap();
        assert_eq!(out.logits.dims(), [1, 2]);
        for map in &out.attention {
            assert_eq!(map.normalization(), Some(AttentionNormalization::Sigmoid));
        }
    }

    #[test]
    fn test_configuration_errors_fail_fast() {
        let device = Default::default();
        assert!(small(1).init::<TestBackend>(&device).is_err());
        assert!(small(2)
            .with_fusion(FusionMode::Sum)
            .init::<TestBackend>(&device)
            .is_err());
        assert!(small(2)
            .with_project_local(false)
            .init::<TestBackend>(&device)
            .is_err());
        // Without gates the projection setting is irrelevant.
        assert!(small(2)
            .with_project_local(false)
            .with_attention(false)
            .init::<TestBackend>(&device)
            .is_ok());
    }

    #[test]
    fn test_wrong_input_channels() {
        let device = Default::default();
        let model = small(2).init::<TestBackend>(&device).unwrap();
        let gray = Tensor::<TestBackend, 4>::zeros([1, 1, 64, 64], &device);
        assert!(matches!(model.forward(gray), Err(CoreError::ShapeMismatch(_))));
        let tiny = Tensor::<TestBackend, 4>::zeros([1, 3, 16, 16], &device);
        assert!(model.forward(tiny).is_err());
    }

    #[test]
    fn test_config_serialization() {
        let config = small(2).with_normalization(AttentionNormalization::Sigmoid);
        let json = serde_json::to_string(&config).unwrap();
        let restored: AttnClassifierConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(restored.normalization, AttentionNormalization::Sigmoid);
        assert_eq!(restored.backbone.base_width, 4);
    }
}
