//! [`ImageClassifier`] implementations for the model zoo.

use attnmel_core::{ClassifierOutput, ImageClassifier, Result};
use burn::prelude::*;

use crate::attn_vgg::AttnVgg;
use crate::vgg::Vgg;

impl<B: Backend> ImageClassifier<B> for AttnVgg<B> {
    fn forward_classifier(&self, x: Tensor<B, 4>) -> Result<ClassifierOutput<B>> {
        self.forward(x)
    }

    fn n_classes(&self) -> usize {
        self.n_classes
    }
}

impl<B: Backend> ImageClassifier<B> for Vgg<B> {
    fn forward_classifier(&self, x: Tensor<B, 4>) -> Result<ClassifierOutput<B>> {
        self.forward(x)
    }

    fn n_classes(&self) -> usize {
        self.n_classes
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{AttentionNormalization, AttnVggConfig, BackboneConfig};
    use burn_ndarray::NdArray;

    type TestBackend = NdArray<f32>;

    fn probs_of<M: ImageClassifier<TestBackend>>(model: &M, x: Tensor<TestBackend, 4>) -> Vec<f32> {
        model.forward_probs(x).unwrap().into_data().to_vec().unwrap()
    }

    #[test]
    fn test_forward_probs_rows_sum_to_one() {
        let device = Default::default();
        let model: AttnVgg<TestBackend> =
            AttnVggConfig::new(2, true, AttentionNormalization::Sigmoid)
                .with_attn_features(4)
                .with_backbone(BackboneConfig::vgg16_bn().with_widths([4, 4, 8, 8, 8]))
                .init(&device);
        assert_eq!(model.n_classes(), 2);

        let x = Tensor::<TestBackend, 4>::ones([3, 3, 32, 32], &device);
        let probs = probs_of(&model, x);
        for row in probs.chunks(2) {
            assert!((row.iter().sum::<f32>() - 1.0).abs() < 1e-5);
        }
    }
}
