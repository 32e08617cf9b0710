//! Five-stage VGG feature extractor.
//!
//! The stage boundaries are declared once in [`STAGE_LAYOUT`]; every stage is
//! a run of 3×3 conv + batch norm + ReLU layers followed by a 2×2 max pool,
//! so stage `k` outputs features at `1 / 2^k` of the input resolution.

use attnmel_core::{CoreError, FeatureShape, Result};
use burn::nn::{
    conv::{Conv2d, Conv2dConfig},
    pool::{MaxPool2d, MaxPool2dConfig},
    BatchNorm, BatchNormConfig, PaddingConfig2d, Relu,
};
use burn::prelude::*;
use serde::{Deserialize, Serialize};

use crate::init::init_conv;

/// Number of backbone stages.
pub const N_STAGES: usize = 5;

/// Total downsampling factor of the backbone.
pub const OUTPUT_STRIDE: usize = 1 << N_STAGES;

/// Layout of a single backbone stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageSpec {
    /// Number of conv + BN + ReLU layers.
    pub n_convs: usize,
    /// Output channels of every conv in the stage.
    pub width: usize,
}

impl StageSpec {
    /// Create a stage spec.
    pub const fn new(n_convs: usize, width: usize) -> Self {
        Self { n_convs, width }
    }
}

/// VGG16-BN stage layout.
pub const STAGE_LAYOUT: [StageSpec; N_STAGES] = [
    StageSpec::new(2, 64),
    StageSpec::new(2, 128),
    StageSpec::new(3, 256),
    StageSpec::new(3, 512),
    StageSpec::new(3, 512),
];

/// Configuration for [`VggBackbone`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackboneConfig {
    /// Number of input image channels.
    pub in_channels: usize,
    /// Stage layout, shallowest first.
    pub stages: [StageSpec; N_STAGES],
}

impl Default for BackboneConfig {
    fn default() -> Self {
        Self::vgg16_bn()
    }
}

impl BackboneConfig {
    /// VGG16 with batch normalization on RGB input.
    pub fn vgg16_bn() -> Self {
        Self {
            in_channels: 3,
            stages: STAGE_LAYOUT,
        }
    }

    /// Replace the stage widths, keeping the conv counts.
    #[must_use]
    pub fn with_widths(mut self, widths: [usize; N_STAGES]) -> Self {
        for (stage, width) in self.stages.iter_mut().zip(widths) {
            stage.width = width;
        }
        self
    }

    /// Replace the number of convs per stage, keeping the widths.
    #[must_use]
    pub fn with_convs(mut self, convs: [usize; N_STAGES]) -> Self {
        for (stage, n_convs) in self.stages.iter_mut().zip(convs) {
            stage.n_convs = n_convs;
        }
        self
    }

    /// Output channels of stage `index` (1-based, as in `pool1..pool5`).
    pub fn width(&self, index: usize) -> usize {
        self.stages[index - 1].width
    }

    /// Validate the layout.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidConfig`] for empty stages or zero widths.
    pub fn validate(&self) -> Result<()> {
        if self.in_channels == 0 {
            return Err(CoreError::InvalidConfig("in_channels must be > 0".into()));
        }
        for (i, stage) in self.stages.iter().enumerate() {
            if stage.n_convs == 0 || stage.width == 0 {
                return Err(CoreError::InvalidConfig(format!(
                    "stage {} needs at least one conv and a non-zero width, got {:?}",
                    i + 1,
                    stage
                )));
            }
        }
        Ok(())
    }

    /// Initialize the backbone.
    pub fn init<B: Backend>(&self, device: &B::Device) -> VggBackbone<B> {
        VggBackbone::new(self, device)
    }
}

/// Pooled outputs of the five backbone stages.
///
/// `pool{k}` has `stages[k-1].width` channels at `1 / 2^k` resolution.
#[derive(Debug, Clone)]
pub struct StageFeatures<B: Backend> {
    /// Stage 1 output, 1/2 resolution.
    pub pool1: Tensor<B, 4>,
    /// Stage 2 output, 1/4 resolution.
    pub pool2: Tensor<B, 4>,
    /// Stage 3 output, 1/8 resolution.
    pub pool3: Tensor<B, 4>,
    /// Stage 4 output, 1/16 resolution.
    pub pool4: Tensor<B, 4>,
    /// Stage 5 output, 1/32 resolution.
    pub pool5: Tensor<B, 4>,
}

/// Conv 3×3 + batch norm + ReLU.
#[derive(Module, Debug)]
pub struct ConvBnRelu<B: Backend> {
    conv: Conv2d<B>,
    bn: BatchNorm<B, 2>,
    relu: Relu,
}

impl<B: Backend> ConvBnRelu<B> {
    /// Create a new layer.
    pub fn new(in_channels: usize, out_channels: usize, device: &B::Device) -> Self {
        let conv = init_conv(
            Conv2dConfig::new([in_channels, out_channels], [3, 3])
                .with_padding(PaddingConfig2d::Explicit(1, 1)),
            device,
        );
        let bn = BatchNormConfig::new(out_channels).init(device);

        Self {
            conv,
            bn,
            relu: Relu::new(),
        }
    }

    /// Forward pass.
    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        let out = self.conv.forward(x);
        let out = self.bn.forward(out);
        self.relu.forward(out)
    }
}

/// One backbone stage: conv layers then 2×2 max pooling.
#[derive(Module, Debug)]
pub struct VggStage<B: Backend> {
    layers: Vec<ConvBnRelu<B>>,
    pool: MaxPool2d,
}

impl<B: Backend> VggStage<B> {
    /// Create a stage.
    pub fn new(in_channels: usize, spec: StageSpec, device: &B::Device) -> Self {
        let mut layers = Vec::with_capacity(spec.n_convs);
        let mut channels = in_channels;
        for _ in 0..spec.n_convs {
            layers.push(ConvBnRelu::new(channels, spec.width, device));
            channels = spec.width;
        }
        let pool = MaxPool2dConfig::new([2, 2]).with_strides([2, 2]).init();

        Self { layers, pool }
    }

    /// Forward pass returning the pooled output.
    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        let out = self
            .layers
            .iter()
            .fold(x, |acc, layer| layer.forward(acc));
        self.pool.forward(out)
    }
}

/// VGG feature extractor split into five stages.
#[derive(Module, Debug)]
pub struct VggBackbone<B: Backend> {
    stage1: VggStage<B>,
    stage2: VggStage<B>,
    stage3: VggStage<B>,
    stage4: VggStage<B>,
    stage5: VggStage<B>,
    in_channels: usize,
}

impl<B: Backend> VggBackbone<B> {
    /// Create a new backbone.
    pub fn new(config: &BackboneConfig, device: &B::Device) -> Self {
        let [s1, s2, s3, s4, s5] = config.stages;

        Self {
            stage1: VggStage::new(config.in_channels, s1, device),
            stage2: VggStage::new(s1.width, s2, device),
            stage3: VggStage::new(s2.width, s3, device),
            stage4: VggStage::new(s3.width, s4, device),
            stage5: VggStage::new(s4.width, s5, device),
            in_channels: config.in_channels,
        }
    }

    /// Forward pass through all stages.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidShape`] if the channel count does not
    /// match or the input is smaller than the output stride.
    pub fn forward(&self, x: Tensor<B, 4>) -> Result<StageFeatures<B>> {
        let shape = FeatureShape::from(x.dims());
        if shape.channels() != self.in_channels
            || shape.height() < OUTPUT_STRIDE
            || shape.width() < OUTPUT_STRIDE
        {
            return Err(CoreError::InvalidShape {
                expected: format!(
                    "(B, {}, H >= {}, W >= {})",
                    self.in_channels, OUTPUT_STRIDE, OUTPUT_STRIDE
                ),
                got: shape.to_string(),
            });
        }

        let pool1 = self.stage1.forward(x);
        let pool2 = self.stage2.forward(pool1.clone());
        let pool3 = self.stage3.forward(pool2.clone());
        let pool4 = self.stage4.forward(pool3.clone());
        let pool5 = self.stage5.forward(pool4.clone());

        Ok(StageFeatures {
            pool1,
            pool2,
            pool3,
            pool4,
            pool5,
        })
    }
}
