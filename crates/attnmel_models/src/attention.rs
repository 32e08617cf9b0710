//! Spatial attention gate.
//!
//! Scores every location of an intermediate feature map against a global
//! feature map from the deepest stage, normalizes the scores into an
//! attention map and pools the original local features with it.

use attnmel_core::{FeatureShape, Result};
use burn::module::Ignored;
use burn::nn::conv::{Conv2d, Conv2dConfig};
use burn::prelude::*;
use burn::tensor::activation::{relu, sigmoid, softmax};
use burn::tensor::module::interpolate;
use burn::tensor::ops::{InterpolateMode, InterpolateOptions};
use serde::{Deserialize, Serialize};

use crate::init::init_conv;

/// How raw compatibility scores become an attention map.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttentionNormalization {
    /// Softmax over all spatial locations; each map sums to 1.
    Softmax,
    /// Elementwise sigmoid; each value lies in (0, 1) independently.
    Sigmoid,
}

impl AttentionNormalization {
    /// Name used on the command line and in configs.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Softmax => "softmax",
            Self::Sigmoid => "sigmoid",
        }
    }
}

impl std::str::FromStr for AttentionNormalization {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "softmax" => Ok(Self::Softmax),
            "sigmoid" => Ok(Self::Sigmoid),
            other => Err(format!(
                "unknown attention normalization '{}', expected softmax or sigmoid",
                other
            )),
        }
    }
}

impl std::fmt::Display for AttentionNormalization {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Configuration for [`AttentionBlock`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttentionBlockConfig {
    /// Channels of the local feature map.
    pub local_channels: usize,
    /// Channels of the global feature map.
    pub global_channels: usize,
    /// Channels of the shared projection space.
    pub attn_features: usize,
    /// Spatial factor between the global and local maps.
    pub up_factor: usize,
    /// Score normalization mode.
    pub normalization: AttentionNormalization,
}

impl AttentionBlockConfig {
    /// Create a new config.
    pub fn new(
        local_channels: usize,
        global_channels: usize,
        attn_features: usize,
        up_factor: usize,
        normalization: AttentionNormalization,
    ) -> Self {
        Self {
            local_channels,
            global_channels,
            attn_features,
            up_factor,
            normalization,
        }
    }

    /// Initialize the block.
    pub fn init<B: Backend>(&self, device: &B::Device) -> AttentionBlock<B> {
        AttentionBlock::new(self.clone(), device)
    }
}

/// Output of an attention block.
#[derive(Debug, Clone)]
pub struct AttentionOutput<B: Backend> {
    /// Normalized attention map, shape (batch, 1, H, W).
    pub map: Tensor<B, 4>,
    /// Attention-weighted descriptor, shape (batch, local_channels).
    pub descriptor: Tensor<B, 2>,
}

/// Attention gate between a local and a global feature map.
#[derive(Module, Debug)]
pub struct AttentionBlock<B: Backend> {
    /// Local projection, no bias.
    w_l: Conv2d<B>,
    /// Global projection, no bias.
    w_g: Conv2d<B>,
    /// Collapses the joint projection to one score per location.
    phi: Conv2d<B>,
    up_factor: usize,
    normalization: Ignored<AttentionNormalization>,
}

impl<B: Backend> AttentionBlock<B> {
    /// Create a new attention block.
    pub fn new(config: AttentionBlockConfig, device: &B::Device) -> Self {
        let w_l = init_conv(
            Conv2dConfig::new([config.local_channels, config.attn_features], [1, 1])
                .with_bias(false),
            device,
        );
        let w_g = init_conv(
            Conv2dConfig::new([config.global_channels, config.attn_features], [1, 1])
                .with_bias(false),
            device,
        );
        let phi = init_conv(Conv2dConfig::new([config.attn_features, 1], [1, 1]), device);

        Self {
            w_l,
            w_g,
            phi,
            up_factor: config.up_factor.max(1),
            normalization: Ignored(config.normalization),
        }
    }

    /// Score normalization mode.
    pub fn normalization(&self) -> AttentionNormalization {
        *self.normalization
    }

    /// Spatial factor between the global and local maps.
    pub fn up_factor(&self) -> usize {
        self.up_factor
    }

    /// Forward pass.
    ///
    /// # Arguments
    ///
    /// * `local` - Local features (batch, C_l, H, W)
    /// * `global` - Global features (batch, C_g, H / up_factor, W / up_factor)
    ///
    /// # Errors
    ///
    /// Returns [`attnmel_core::CoreError::ShapeMismatch`] if the aligned
    /// global projection does not match the local projection.
    pub fn forward(&self, local: Tensor<B, 4>, global: Tensor<B, 4>) -> Result<AttentionOutput<B>> {
        let l_proj = self.w_l.forward(local.clone());
        let g_proj = self.w_g.forward(global);

        let g_proj = if self.up_factor > 1 {
            let [_, _, h, w] = g_proj.dims();
            interpolate(
                g_proj,
                [h * self.up_factor, w * self.up_factor],
                InterpolateOptions::new(InterpolateMode::Bilinear),
            )
        } else {
            g_proj
        };

        let l_shape = FeatureShape::from(l_proj.dims());
        l_shape.ensure_aligned(&FeatureShape::from(g_proj.dims()), "attention block")?;

        // (batch, 1, H, W)
        let scores = self.phi.forward(relu(l_proj + g_proj));
        let [batch, _, height, width] = scores.dims();

        let map = match *self.normalization {
            AttentionNormalization::Softmax => {
                let flat = scores.reshape([batch, height * width]);
                softmax(flat, 1).reshape([batch, 1, height, width])
            }
            AttentionNormalization::Sigmoid => sigmoid(scores),
        };

        let [_, channels, _, _] = local.dims();
        let weighted = local * map.clone();
        let pooled = match *self.normalization {
            AttentionNormalization::Softmax => weighted.sum_dim(3).sum_dim(2),
            AttentionNormalization::Sigmoid => weighted.mean_dim(3).mean_dim(2),
        };
        let descriptor = pooled.reshape([batch, channels]);

        Ok(AttentionOutput { map, descriptor })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use attnmel_core::CoreError;
    use burn::tensor::Distribution;
    use burn_ndarray::NdArray;

    type TestBackend = NdArray<f32>;

    fn block(normalization: AttentionNormalization, up_factor: usize) -> AttentionBlock<TestBackend> {
        let device = Default::default();
        AttentionBlockConfig::new(6, 10, 8, up_factor, normalization).init(&device)
    }

    fn inputs(local_hw: usize, global_hw: usize) -> (Tensor<TestBackend, 4>, Tensor<TestBackend, 4>) {
        let device = Default::default();
        let local = Tensor::random(
            [3, 6, local_hw, local_hw],
            Distribution::Normal(0.0, 1.0),
            &device,
        );
        let global = Tensor::random(
            [3, 10, global_hw, global_hw],
            Distribution::Normal(0.0, 1.0),
            &device,
        );
        (local, global)
    }

    #[test]
    fn test_map_matches_local_spatial_size() {
        let (local, global) = inputs(8, 2);
        let out = block(AttentionNormalization::Softmax, 4)
            .forward(local, global)
            .unwrap();

        assert_eq!(out.map.dims(), [3, 1, 8, 8]);
        assert_eq!(out.descriptor.dims(), [3, 6]);
    }

    #[test]
    fn test_softmax_map_sums_to_one() {
        let (local, global) = inputs(8, 4);
        let out = block(AttentionNormalization::Softmax, 2)
            .forward(local, global)
            .unwrap();

        let sums: Vec<f32> = out
            .map
            .sum_dim(3)
            .sum_dim(2)
            .reshape([3])
            .into_data()
            .to_vec()
            .unwrap();
        for sum in sums {
            assert!((sum - 1.0).abs() < 1e-4, "map sums to {}", sum);
        }
    }

    #[test]
    fn test_sigmoid_map_in_open_unit_interval() {
        let (local, global) = inputs(4, 2);
        let out = block(AttentionNormalization::Sigmoid, 2)
            .forward(local, global)
            .unwrap();

        let values: Vec<f32> = out.map.into_data().to_vec().unwrap();
        assert_eq!(values.len(), 3 * 4 * 4);
        assert!(values.iter().all(|&v| v > 0.0 && v < 1.0));
    }

    #[test]
    fn test_up_factor_one_skips_interpolation() {
        let (local, global) = inputs(4, 4);
        let attn = block(AttentionNormalization::Softmax, 1);
        assert_eq!(attn.up_factor(), 1);

        let out = attn.forward(local, global).unwrap();
        assert_eq!(out.map.dims(), [3, 1, 4, 4]);
    }

    #[test]
    fn test_misaligned_inputs_fail() {
        // 3 * 2 = 6 != 8
        let (local, global) = inputs(8, 3);
        let result = block(AttentionNormalization::Softmax, 2).forward(local, global);
        assert!(matches!(result, Err(CoreError::ShapeMismatch(_))));
    }

    #[test]
    fn test_descriptor_is_weighted_sum_of_local_features() {
        // With constant local features every softmax-weighted sum equals the constant.
        let device = Default::default();
        let local = Tensor::<TestBackend, 4>::ones([2, 6, 4, 4], &device) * 3.0;
        let global = Tensor::<TestBackend, 4>::random([2, 10, 2, 2], Distribution::Default, &device);

        let out = block(AttentionNormalization::Softmax, 2)
            .forward(local, global)
            .unwrap();
        let values: Vec<f32> = out.descriptor.into_data().to_vec().unwrap();
        assert!(values.iter().all(|v| (v - 3.0).abs() < 1e-4));
    }

    #[test]
    fn test_normalization_parsing() {
        assert_eq!(
            "Softmax".parse::<AttentionNormalization>().unwrap(),
            AttentionNormalization::Softmax
        );
        assert_eq!(AttentionNormalization::Sigmoid.to_string(), "sigmoid");
        assert!("relu".parse::<AttentionNormalization>().is_err());
    }
}
