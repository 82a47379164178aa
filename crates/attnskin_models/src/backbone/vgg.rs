//! VGG-16 style backbone.

use burn::nn::conv::{Conv2d, Conv2dConfig};
use burn::nn::pool::{AdaptiveAvgPool2d, AdaptiveAvgPool2dConfig, MaxPool2d, MaxPool2dConfig};
use burn::nn::{BatchNorm, BatchNormConfig, Initializer, PaddingConfig2d};
use burn::prelude::*;
use burn::tensor::activation::relu;

use super::{flatten_pooled, BackboneConfig, BackboneFeatures, FeatureExtractor};

/// (width multiplier, conv layers) of the five blocks.
const BLOCKS: [(usize, usize); 5] = [(1, 2), (2, 2), (4, 3), (8, 3), (8, 3)];

pub(super) fn stage_channels(base_width: usize) -> [usize; 3] {
    [BLOCKS[2].0 * base_width, BLOCKS[3].0 * base_width, BLOCKS[4].0 * base_width]
}

/// 3x3 convolution, batch norm, ReLU.
#[derive(Module, Debug)]
pub struct ConvBnRelu<B: Backend> {
    conv: Conv2d<B>,
    bn: BatchNorm<B, 2>,
}

impl<B: Backend> ConvBnRelu<B> {
    /// Create a new layer.
    pub fn new(
        in_channels: usize,
        out_channels: usize,
        initializer: Initializer,
        device: &B::Device,
    ) -> Self {
        let conv = Conv2dConfig::new([in_channels, out_channels], [3, 3])
            .with_padding(PaddingConfig2d::Explicit(1, 1))
            .with_bias(false)
            .with_initializer(initializer)
            .init(device);
        let bn = BatchNormConfig::new(out_channels).init(device);
        Self { conv, bn }
    }

    /// Forward pass.
    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        relu(self.bn.forward(self.conv.forward(x)))
    }
}

/// A run of conv layers followed by 2x2 max pooling.
#[derive(Module, Debug)]
pub struct VggBlock<B: Backend> {
    layers: Vec<ConvBnRelu<B>>,
    pool: MaxPool2d,
}

impl<B: Backend> VggBlock<B> {
    /// Create a block of `n_layers` convolutions.
    pub fn new(
        in_channels: usize,
        out_channels: usize,
        n_layers: usize,
        initializer: &Initializer,
        device: &B::Device,
    ) -> Self {
        let layers = (0..n_layers)
            .map(|i| {
                let c_in = if i == 0 { in_channels } else { out_channels };
                ConvBnRelu::new(c_in, out_channels, initializer.clone(), device)
            })
            .collect();
        let pool = MaxPool2dConfig::new([2, 2]).with_strides([2, 2]).init();
        Self { layers, pool }
    }

    /// Forward pass; halves the spatial size.
    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        let x = self.layers.iter().fold(x, |x, layer| layer.forward(x));
        self.pool.forward(x)
    }
}

/// VGG backbone; blocks 3, 4 and 5 are the attended stages.
#[derive(Module, Debug)]
pub struct VggBackbone<B: Backend> {
    block1: VggBlock<B>,
    block2: VggBlock<B>,
    block3: VggBlock<B>,
    block4: VggBlock<B>,
    block5: VggBlock<B>,
    /// 1x1 convolution producing the global descriptor.
    global_conv: Conv2d<B>,
    gap: AdaptiveAvgPool2d,
    base_width: usize,
}

impl<B: Backend> VggBackbone<B> {
    /// Create a new backbone.
    pub fn new(config: &BackboneConfig, device: &B::Device) -> Self {
        let initializer = config.init.initializer();
        let w = config.base_width;
        let widths = BLOCKS.map(|(mult, _)| mult * w);
        let block = |i: usize, in_channels: usize| {
            VggBlock::new(in_channels, widths[i], BLOCKS[i].1, &initializer, device)
        };

        let block1 = block(0, config.in_channels);
        let block2 = block(1, widths[0]);
        let block3 = block(2, widths[1]);
        let block4 = block(3, widths[2]);
        let block5 = block(4, widths[3]);

        let global_conv = Conv2dConfig::new([widths[4], widths[4]], [1, 1])
            .with_initializer(initializer.clone())
            .init(device);
        let gap = AdaptiveAvgPool2dConfig::new([1, 1]).init();

        Self {
            block1,
            block2,
            block3,
            block4,
            block5,
            global_conv,
            gap,
            base_width: w,
        }
    }
}

impl<B: Backend> FeatureExtractor<B> for VggBackbone<B> {
    fn stage_channels(&self) -> [usize; 3] {
        stage_channels(self.base_width)
    }

    fn global_channels(&self) -> usize {
        BLOCKS[4].0 * self.base_width
    }

    fn extract(&self, images: Tensor<B, 4>) -> BackboneFeatures<B> {
        let x = self.block1.forward(images); // /2
        let x = self.block2.forward(x); // /4
        let stage1 = self.block3.forward(x); // /8
        let stage2 = self.block4.forward(stage1.clone()); // /16
        let stage3 = self.block5.forward(stage2.clone()); // /32

        let global = flatten_pooled(self.gap.forward(self.global_conv.forward(stage3.clone())));

        BackboneFeatures {
            stages: [stage1, stage2, stage3],
            global,
        }
    }

    fn name(&self) -> &'static str {
        "vgg"
    }
}
