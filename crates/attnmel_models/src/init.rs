//! Weight initialization policy.
//!
//! Convolutions use Kaiming-normal (fan-in, ReLU gain) with zero bias,
//! linear layers use N(0, 0.01) with zero bias. Batch normalization already
//! starts at weight 1 / bias 0 in burn, so it needs no treatment here.

use burn::module::Param;
use burn::nn::conv::{Conv2d, Conv2dConfig};
use burn::nn::{Initializer, Linear, LinearConfig};
use burn::prelude::*;

/// Standard deviation of the classifier weight initialization.
pub const LINEAR_INIT_STD: f64 = 0.01;

/// Kaiming-normal initializer for layers followed by a ReLU.
pub fn kaiming_relu() -> Initializer {
    Initializer::KaimingNormal {
        gain: std::f64::consts::SQRT_2,
        fan_out_only: false,
    }
}

/// Build a convolution with the Kaiming policy and a zeroed bias.
pub fn init_conv<B: Backend>(config: Conv2dConfig, device: &B::Device) -> Conv2d<B> {
    let mut conv = config.with_initializer(kaiming_relu()).init(device);
    conv.bias = conv.bias.take().map(zeroed);
    conv
}

/// Build a linear layer with N(0, 0.01) weights and a zeroed bias.
pub fn init_linear<B: Backend>(d_input: usize, d_output: usize, device: &B::Device) -> Linear<B> {
    let mut linear = LinearConfig::new(d_input, d_output)
        .with_initializer(Initializer::Normal {
            mean: 0.0,
            std: LINEAR_INIT_STD,
        })
        .init(device);
    linear.bias = linear.bias.take().map(zeroed);
    linear
}

fn zeroed<B: Backend>(bias: Param<Tensor<B, 1>>) -> Param<Tensor<B, 1>> {
    Param::from_tensor(bias.val().zeros_like())
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn_ndarray::NdArray;

    type TestBackend = NdArray<f32>;

    #[test]
    fn test_conv_bias_is_zero() {
        let device = Default::default();
        let conv: Conv2d<TestBackend> = init_conv(Conv2dConfig::new([4, 8], [1, 1]), &device);
        let bias = conv.bias.as_ref().expect("bias enabled by default").val();
        let sum: f32 = bias.abs().sum().into_scalar();
        assert_eq!(sum, 0.0);
    }

    #[test]
    fn test_linear_init_is_small() {
        let device = Default::default();
        let linear: Linear<TestBackend> = init_linear(256, 16, &device);

        let bias_sum: f32 = linear.bias.as_ref().unwrap().val().abs().sum().into_scalar();
        assert_eq!(bias_sum, 0.0);

        // 4096 samples of N(0, 0.01): the empirical std stays well below 0.05.
        let weight = linear.weight.val();
        let var: f32 = weight.clone().powf_scalar(2.0).mean().into_scalar();
        assert!(var.sqrt() < 0.05, "std too large: {}", var.sqrt());
        assert_eq!(weight.dims(), [256, 16]);
    }
}
