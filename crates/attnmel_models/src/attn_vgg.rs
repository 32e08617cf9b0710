//! Attention-gated VGG classifier.
//!
//! The classifier concatenates a global descriptor of the last stage with
//! one descriptor per intermediate stage and feeds the result to a single
//! linear layer. How the per-stage descriptors are obtained is the tail
//! variant: attention-weighted pooling or plain average pooling. Both tails
//! produce the same descriptor length, so the two models differ only in the
//! attention mechanism.

use attnmel_core::{ClassifierOutput, CoreError, Result};
use burn::nn::{
    pool::{AdaptiveAvgPool2d, AdaptiveAvgPool2dConfig},
    Linear,
};
use burn::prelude::*;
use serde::{Deserialize, Serialize};

use crate::attention::{AttentionBlock, AttentionBlockConfig, AttentionNormalization};
use crate::backbone::{BackboneConfig, StageFeatures, VggBackbone};
use crate::init::init_linear;

/// Up factor between stage 3 (1/8) and stage 5 (1/32).
pub const STAGE3_UP_FACTOR: usize = 4;
/// Up factor between stage 4 (1/16) and stage 5 (1/32).
pub const STAGE4_UP_FACTOR: usize = 2;
/// Up factor between stage 2 (1/4) and stage 5 (1/32).
pub const STAGE2_UP_FACTOR: usize = 8;

/// Configuration for [`AttnVgg`].
///
/// The attention normalization has no default: it has to match whatever
/// produced the checkpoint being evaluated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttnVggConfig {
    /// Number of output classes.
    pub n_classes: usize,
    /// Attention-weighted (true) or average-pooled (false) stage descriptors.
    pub attention: bool,
    /// Normalization used by every attention block.
    pub normalization: AttentionNormalization,
    /// Attach a third head on stage 2.
    pub third_head: bool,
    /// Channels of the attention projection space.
    pub attn_features: usize,
    /// Backbone layout.
    pub backbone: BackboneConfig,
}

impl AttnVggConfig {
    /// Create a new config with the VGG16-BN backbone and 256 attention features.
    pub fn new(n_classes: usize, attention: bool, normalization: AttentionNormalization) -> Self {
        Self {
            n_classes,
            attention,
            normalization,
            third_head: false,
            attn_features: 256,
            backbone: BackboneConfig::vgg16_bn(),
        }
    }

    /// Attach or detach the stage-2 head.
    #[must_use]
    pub fn with_third_head(mut self, third_head: bool) -> Self {
        self.third_head = third_head;
        self
    }

    /// Set the attention projection width.
    #[must_use]
    pub fn with_attn_features(mut self, attn_features: usize) -> Self {
        self.attn_features = attn_features;
        self
    }

    /// Set the backbone layout.
    #[must_use]
    pub fn with_backbone(mut self, backbone: BackboneConfig) -> Self {
        self.backbone = backbone;
        self
    }

    /// Length of the concatenated descriptor fed to the classifier.
    ///
    /// Independent of `attention`: each head contributes its stage width
    /// either way.
    pub fn descriptor_len(&self) -> usize {
        let b = &self.backbone;
        let heads = b.width(3) + b.width(4);
        let third = if self.third_head { b.width(2) } else { 0 };
        b.width(5) + heads + third
    }

    /// Validate the config.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidConfig`] on zero classes, zero attention
    /// features or an invalid backbone layout.
    pub fn validate(&self) -> Result<()> {
        if self.n_classes == 0 {
            return Err(CoreError::InvalidConfig("n_classes must be > 0".into()));
        }
        if self.attention && self.attn_features == 0 {
            return Err(CoreError::InvalidConfig("attn_features must be > 0".into()));
        }
        self.backbone.validate()
    }

    /// Initialize the model.
    pub fn init<B: Backend>(&self, device: &B::Device) -> AttnVgg<B> {
        AttnVgg::new(self.clone(), device)
    }
}

/// Attention heads on stages 3 and 4, plus an optional one on stage 2.
#[derive(Module, Debug)]
pub struct AttentionHeads<B: Backend> {
    attn1: AttentionBlock<B>,
    attn2: AttentionBlock<B>,
    attn3: Option<AttentionBlock<B>>,
}

impl<B: Backend> AttentionHeads<B> {
    fn new(config: &AttnVggConfig, device: &B::Device) -> Self {
        let b = &config.backbone;
        let global = b.width(5);
        let head = |stage: usize, up_factor: usize| {
            AttentionBlockConfig::new(
                b.width(stage),
                global,
                config.attn_features,
                up_factor,
                config.normalization,
            )
            .init(device)
        };

        Self {
            attn1: head(3, STAGE3_UP_FACTOR),
            attn2: head(4, STAGE4_UP_FACTOR),
            attn3: config.third_head.then(|| head(2, STAGE2_UP_FACTOR)),
        }
    }
}

/// Average-pooling stand-in for the attention heads.
#[derive(Module, Clone, Debug)]
pub struct PooledHeads {
    pool: AdaptiveAvgPool2d,
    third_head: bool,
}

impl PooledHeads {
    fn new(third_head: bool) -> Self {
        Self {
            pool: AdaptiveAvgPool2dConfig::new([1, 1]).init(),
            third_head,
        }
    }

    fn pool<B: Backend>(&self, x: Tensor<B, 4>) -> Tensor<B, 2> {
        let [batch, channels, _, _] = x.dims();
        self.pool.forward(x).reshape([batch, channels])
    }
}

/// Per-stage descriptors and attention maps produced by a tail.
struct TailOutput<B: Backend> {
    descriptors: Vec<Tensor<B, 2>>,
    attn1: Option<Tensor<B, 4>>,
    attn2: Option<Tensor<B, 4>>,
    attn3: Option<Tensor<B, 4>>,
}

/// How intermediate stages are summarized.
#[derive(Module, Debug)]
pub enum ClassifierTail<B: Backend> {
    /// Attention-weighted descriptors.
    Attention(AttentionHeads<B>),
    /// Average-pooled descriptors.
    Pooled(PooledHeads),
}

impl<B: Backend> ClassifierTail<B> {
    fn forward(&self, features: &StageFeatures<B>) -> Result<TailOutput<B>> {
        match self {
            Self::Attention(heads) => {
                let global = features.pool5.clone();
                let a1 = heads.attn1.forward(features.pool3.clone(), global.clone())?;
                let a2 = heads.attn2.forward(features.pool4.clone(), global.clone())?;
                let a3 = heads
                    .attn3
                    .as_ref()
                    .map(|attn| attn.forward(features.pool2.clone(), global))
                    .transpose()?;

                let mut descriptors = vec![a1.descriptor, a2.descriptor];
                let attn3 = a3.map(|out| {
                    descriptors.push(out.descriptor);
                    out.map
                });

                Ok(TailOutput {
                    descriptors,
                    attn1: Some(a1.map),
                    attn2: Some(a2.map),
                    attn3,
                })
            }
            Self::Pooled(heads) => {
                let mut descriptors = vec![
                    heads.pool(features.pool3.clone()),
                    heads.pool(features.pool4.clone()),
                ];
                if heads.third_head {
                    descriptors.push(heads.pool(features.pool2.clone()));
                }

                Ok(TailOutput {
                    descriptors,
                    attn1: None,
                    attn2: None,
                    attn3: None,
                })
            }
        }
    }

    /// Whether this tail produces attention maps.
    pub fn is_attention(&self) -> bool {
        matches!(self, Self::Attention(_))
    }
}

/// Attention-gated VGG classifier.
///
/// # Example
///
/// ```rust,ignore
/// use attnmel_models::{AttnVggConfig, AttentionNormalization};
///
/// let config = AttnVggConfig::new(2, true, AttentionNormalization::Softmax);
/// let model = config.init::<NdArray>(&device);
///
/// let x = Tensor::random([4, 3, 256, 256], Distribution::Normal(0.0, 1.0), &device);
/// let output = model.forward(x)?;
/// // output.logits: [4, 2], output.attn1: [4, 1, 32, 32], output.attn2: [4, 1, 16, 16]
/// ```
#[derive(Module, Debug)]
pub struct AttnVgg<B: Backend> {
    backbone: VggBackbone<B>,
    global_pool: AdaptiveAvgPool2d,
    tail: ClassifierTail<B>,
    classify: Linear<B>,
    pub(crate) n_classes: usize,
}

impl<B: Backend> AttnVgg<B> {
    /// Create a new model.
    pub fn new(config: AttnVggConfig, device: &B::Device) -> Self {
        let backbone = config.backbone.init(device);
        let global_pool = AdaptiveAvgPool2dConfig::new([1, 1]).init();
        let tail = if config.attention {
            ClassifierTail::Attention(AttentionHeads::new(&config, device))
        } else {
            ClassifierTail::Pooled(PooledHeads::new(config.third_head))
        };
        let classify = init_linear(config.descriptor_len(), config.n_classes, device);

        Self {
            backbone,
            global_pool,
            tail,
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

    /// The classifier tail.
    pub fn tail(&self) -> &ClassifierTail<B> {
        &self.tail
    }

    /// Input width of the linear classifier.
    pub fn descriptor_len(&self) -> usize {
        self.classify.weight.dims()[0]
    }

    /// Forward pass.
    ///
    /// # Arguments
    ///
    /// * `x` - Normalized images of shape (batch, 3, height, width)
    ///
    /// # Errors
    ///
    /// Fails when the input is too small for the backbone or when a head
    /// cannot align its stage with stage 5 (input size not a multiple of 32).
    pub fn forward(&self, x: Tensor<B, 4>) -> Result<ClassifierOutput<B>> {
        let features = self.backbone.forward(x)?;

        let [batch, channels, _, _] = features.pool5.dims();
        let g = self
            .global_pool
            .forward(features.pool5.clone())
            .reshape([batch, channels]);

        let tail = self.tail.forward(&features)?;
        let mut descriptors = Vec::with_capacity(1 + tail.descriptors.len());
        descriptors.push(g);
        descriptors.extend(tail.descriptors);
        let g_hat = Tensor::cat(descriptors, 1);

        Ok(ClassifierOutput {
            logits: self.classify.forward(g_hat),
            attn1: tail.attn1,
            attn2: tail.attn2,
            attn3: tail.attn3,
        })
    }
}
