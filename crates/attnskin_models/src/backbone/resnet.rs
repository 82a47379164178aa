//! ResNet style backbone.

use burn::nn::conv::{Conv2d, Conv2dConfig};
use burn::nn::pool::{AdaptiveAvgPool2d, AdaptiveAvgPool2dConfig, MaxPool2d, MaxPool2dConfig};
use burn::nn::{BatchNorm, BatchNormConfig, Initializer, PaddingConfig2d};
use burn::prelude::*;
use burn::tensor::activation::relu;

use super::{flatten_pooled, BackboneConfig, BackboneFeatures, FeatureExtractor};

/// Width multipliers of the four residual layers.
const LAYER_WIDTHS: [usize; 4] = [1, 2, 4, 8];

pub(super) fn stage_channels(base_width: usize) -> [usize; 3] {
    [
        LAYER_WIDTHS[1] * base_width,
        LAYER_WIDTHS[2] * base_width,
        LAYER_WIDTHS[3] * base_width,
    ]
}

/// Residual block with two 3x3 convolutions and skip connection.
#[derive(Module, Debug)]
pub struct BasicBlock<B: Backend> {
    conv1: Conv2d<B>,
    bn1: BatchNorm<B, 2>,
    conv2: Conv2d<B>,
    bn2: BatchNorm<B, 2>,
    shortcut: Option<Conv2d<B>>,
    shortcut_bn: Option<BatchNorm<B, 2>>,
}

impl<B: Backend> BasicBlock<B> {
    /// Create a new residual block; `stride` 2 halves the spatial size.
    pub fn new(
        in_channels: usize,
        out_channels: usize,
        stride: usize,
        initializer: &Initializer,
        device: &B::Device,
    ) -> Self {
        let conv1 = Conv2dConfig::new([in_channels, out_channels], [3, 3])
            .with_stride([stride, stride])
            .with_padding(PaddingConfig2d::Explicit(1, 1))
            .with_bias(false)
            .with_initializer(initializer.clone())
            .init(device);
        let bn1 = BatchNormConfig::new(out_channels).init(device);

        let conv2 = Conv2dConfig::new([out_channels, out_channels], [3, 3])
            .with_padding(PaddingConfig2d::Explicit(1, 1))
            .with_bias(false)
            .with_initializer(initializer.clone())
            .init(device);
        let bn2 = BatchNormConfig::new(out_channels).init(device);

        // Shortcut connection if shape changes
        let (shortcut, shortcut_bn) = if in_channels != out_channels || stride != 1 {
            let sc = Conv2dConfig::new([in_channels, out_channels], [1, 1])
                .with_stride([stride, stride])
                .with_bias(false)
                .with_initializer(initializer.clone())
                .init(device);
            let sc_bn = BatchNormConfig::new(out_channels).init(device);
            (Some(sc), Some(sc_bn))
        } else {
            (None, None)
        };

        Self {
            conv1,
            bn1,
            conv2,
            bn2,
            shortcut,
            shortcut_bn,
        }
    }

    /// Forward pass.
    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        let out = relu(self.bn1.forward(self.conv1.forward(x.clone())));
        let out = self.bn2.forward(self.conv2.forward(out));

        let shortcut = match (&self.shortcut, &self.shortcut_bn) {
            (Some(sc), Some(sc_bn)) => sc_bn.forward(sc.forward(x)),
            _ => x,
        };

        relu(out + shortcut)
    }
}

fn residual_layer<B: Backend>(
    in_channels: usize,
    out_channels: usize,
    n_blocks: usize,
    stride: usize,
    initializer: &Initializer,
    device: &B::Device,
) -> Vec<BasicBlock<B>> {
    (0..n_blocks)
        .map(|i| {
            if i == 0 {
                BasicBlock::new(in_channels, out_channels, stride, initializer, device)
            } else {
                BasicBlock::new(out_channels, out_channels, 1, initializer, device)
            }
        })
        .collect()
}

fn run_layer<B: Backend>(layer: &[BasicBlock<B>], x: Tensor<B, 4>) -> Tensor<B, 4> {
    layer.iter().fold(x, |x, block| block.forward(x))
}

/// ResNet backbone; layers 2, 3 and 4 are the attended stages.
#[derive(Module, Debug)]
pub struct ResNetBackbone<B: Backend> {
    stem_conv: Conv2d<B>,
    stem_bn: BatchNorm<B, 2>,
    stem_pool: MaxPool2d,
    layer1: Vec<BasicBlock<B>>,
    layer2: Vec<BasicBlock<B>>,
    layer3: Vec<BasicBlock<B>>,
    layer4: Vec<BasicBlock<B>>,
    global_conv: Conv2d<B>,
    gap: AdaptiveAvgPool2d,
    base_width: usize,
}

impl<B: Backend> ResNetBackbone<B> {
    /// Create a new backbone.
    pub fn new(config: &BackboneConfig, device: &B::Device) -> Self {
        let initializer = config.init.initializer();
        let w = config.base_width;
        let [c1, c2, c3, c4] = LAYER_WIDTHS.map(|m| m * w);
        let [n1, n2, n3, n4] = config.resnet_layers;

        let stem_conv = Conv2dConfig::new([config.in_channels, c1], [7, 7])
            .with_stride([2, 2])
            .with_padding(PaddingConfig2d::Explicit(3, 3))
            .with_bias(false)
            .with_initializer(initializer.clone())
            .init(device);
        let stem_bn = BatchNormConfig::new(c1).init(device);
        let stem_pool = MaxPool2dConfig::new([3, 3])
            .with_strides([2, 2])
            .with_padding(PaddingConfig2d::Explicit(1, 1))
            .init();

        let layer1 = residual_layer(c1, c1, n1, 1, &initializer, device);
        let layer2 = residual_layer(c1, c2, n2, 2, &initializer, device);
        let layer3 = residual_layer(c2, c3, n3, 2, &initializer, device);
        let layer4 = residual_layer(c3, c4, n4, 2, &initializer, device);

        let global_conv = Conv2dConfig::new([c4, c4], [1, 1])
            .with_initializer(initializer)
            .init(device);
        let gap = AdaptiveAvgPool2dConfig::new([1, 1]).init();

        Self {
            stem_conv,
            stem_bn,
            stem_pool,
            layer1,
            layer2,
            layer3,
            layer4,
            global_conv,
            gap,
            base_width: w,
        }
    }
}

impl<B: Backend> FeatureExtractor<B> for ResNetBackbone<B> {
    fn stage_channels(&self) -> [usize; 3] {
        stage_channels(self.base_width)
    }

    fn global_channels(&self) -> usize {
        LAYER_WIDTHS[3] * self.base_width
    }

    fn extract(&self, images: Tensor<B, 4>) -> BackboneFeatures<B> {
        let x = relu(self.stem_bn.forward(self.stem_conv.forward(images))); // /2
        let x = self.stem_pool.forward(x); // /4
        let x = run_layer(&self.layer1, x);
        let stage1 = run_layer(&self.layer2, x); // /8
        let stage2 = run_layer(&self.layer3, stage1.clone()); // /16
        let stage3 = run_layer(&self.layer4, stage2.clone()); // /32

        let global = flatten_pooled(self.gap.forward(self.global_conv.forward(stage3.clone())));

        BackboneFeatures {
            stages: [stage1, stage2, stage3],
            global,
        }
    }

    fn name(&self) -> &'static str {
        "resnet"
    }
}
