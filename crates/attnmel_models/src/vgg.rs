//! Plain VGG baseline with the stock dense classifier head.

use attnmel_core::{ClassifierOutput, CoreError, Result};
use burn::nn::{
    pool::{AdaptiveAvgPool2d, AdaptiveAvgPool2dConfig},
    Dropout, DropoutConfig, Linear, LinearConfig, Relu,
};
use burn::prelude::*;
use serde::{Deserialize, Serialize};

use crate::backbone::{BackboneConfig, VggBackbone};
use crate::init::init_linear;

/// Spatial size the last stage is pooled to before the dense head.
pub const HEAD_POOL_SIZE: usize = 7;

/// Configuration for [`Vgg`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VggConfig {
    /// Number of output classes.
    pub n_classes: usize,
    /// Width of the two hidden dense layers.
    pub hidden: usize,
    /// Dropout probability after each hidden layer.
    pub dropout: f64,
    /// Backbone layout.
    pub backbone: BackboneConfig,
}

impl Default for VggConfig {
    fn default() -> Self {
        Self {
            n_classes: 2,
            hidden: 4096,
            dropout: 0.5,
            backbone: BackboneConfig::vgg16_bn(),
        }
    }
}

impl VggConfig {
    /// Create a new config.
    pub fn new(n_classes: usize) -> Self {
        Self {
            n_classes,
            ..Default::default()
        }
    }

    /// Set the hidden width.
    #[must_use]
    pub fn with_hidden(mut self, hidden: usize) -> Self {
        self.hidden = hidden;
        self
    }

    /// Set the backbone layout.
    #[must_use]
    pub fn with_backbone(mut self, backbone: BackboneConfig) -> Self {
        self.backbone = backbone;
        self
    }

    /// Validate the config.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidConfig`] on zero classes or hidden width.
    pub fn validate(&self) -> Result<()> {
        if self.n_classes == 0 || self.hidden == 0 {
            return Err(CoreError::InvalidConfig(
                "n_classes and hidden must be > 0".into(),
            ));
        }
        if !(0.0..1.0).contains(&self.dropout) {
            return Err(CoreError::InvalidConfig(format!(
                "dropout must be in [0, 1), got {}",
                self.dropout
            )));
        }
        self.backbone.validate()
    }

    /// Initialize the model.
    pub fn init<B: Backend>(&self, device: &B::Device) -> Vgg<B> {
        Vgg::new(self.clone(), device)
    }
}

/// VGG classifier without attention.
#[derive(Module, Debug)]
pub struct Vgg<B: Backend> {
    backbone: VggBackbone<B>,
    pool: AdaptiveAvgPool2d,
    fc1: Linear<B>,
    fc2: Linear<B>,
    relu: Relu,
    dropout: Dropout,
    classify: Linear<B>,
    pub(crate) n_classes: usize,
}

impl<B: Backend> Vgg<B> {
    /// Create a new model.
    pub fn new(config: VggConfig, device: &B::Device) -> Self {
        let backbone = config.backbone.init(device);
        let pool = AdaptiveAvgPool2dConfig::new([HEAD_POOL_SIZE, HEAD_POOL_SIZE]).init();
        let flat = config.backbone.width(5) * HEAD_POOL_SIZE * HEAD_POOL_SIZE;
        let fc1 = LinearConfig::new(flat, config.hidden).init(device);
        let fc2 = LinearConfig::new(config.hidden, config.hidden).init(device);
        let dropout = DropoutConfig::new(config.dropout).init();
        let classify = init_linear(config.hidden, config.n_classes, device);

        Self {
            backbone,
            pool,
            fc1,
            fc2,
            relu: Relu::new(),
            dropout,
            classify,
            n_classes: config.n_classes,
        }
    }

    /// The feature extractor.
    pub fn backbone(&self) -> &VggBackbone<B> {
        &self.backbone
    }

    /// Replace the feature extractor, e.g. with pretrained weights.
    #[must_use]
    pub fn with_backbone(mut self, backbone: VggBackbone<B>) -> Self {
        self.backbone = backbone;
        self
    }

    /// Forward pass.
    ///
    /// # Errors
    ///
    /// Fails when the input does not fit the backbone.
    pub fn forward(&self, x: Tensor<B, 4>) -> Result<ClassifierOutput<B>> {
        let features = self.backbone.forward(x)?;

        let pooled = self.pool.forward(features.pool5);
        let [batch, channels, h, w] = pooled.dims();
        let out = pooled.reshape([batch, channels * h * w]);

        let out = self.dropout.forward(self.relu.forward(self.fc1.forward(out)));
        let out = self.dropout.forward(self.relu.forward(self.fc2.forward(out)));

        Ok(ClassifierOutput::logits_only(self.classify.forward(out)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn_ndarray::NdArray;

    type TestBackend = NdArray<f32>;

    #[test]
    fn test_vgg_config_default() {
        let config = VggConfig::default();
        assert_eq!(config.hidden, 4096);
        assert!(config.validate().is_ok());
        assert!(VggConfig::new(2).with_hidden(0).validate().is_err());
    }

    #[test]
    fn test_vgg_forward() {
        let device = Default::default();
        let config = VggConfig::new(2).with_hidden(16).with_backbone(
            BackboneConfig::vgg16_bn()
                .with_widths([4, 4, 8, 8, 8])
                .with_convs([1, 1, 1, 1, 1]),
        );
        let model: Vgg<TestBackend> = config.init(&device);

        let x = Tensor::<TestBackend, 4>::zeros([2, 3, 64, 64], &device);
        let out = model.forward(x).unwrap();
        assert_eq!(out.logits.dims(), [2, 2]);
        assert!(out.attention_maps().is_empty());
    }
}
