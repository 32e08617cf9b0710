//! Classifier contract shared by the model zoo.

use burn::module::Module;
use burn::prelude::*;
use burn::tensor::activation::softmax;

use crate::error::Result;

/// Output of a classifier forward pass.
///
/// `attn1` and `attn2` hold the attention maps of the stage-3 and stage-4
/// heads, `attn3` the optional stage-2 head. All maps are `None` for
/// classifiers that pool instead of attending.
#[derive(Debug, Clone)]
pub struct ClassifierOutput<B: Backend> {
    /// Unnormalized class scores of shape (batch, n_classes).
    pub logits: Tensor<B, 2>,
    /// Attention map of the first head, shape (batch, 1, H/8, W/8).
    pub attn1: Option<Tensor<B, 4>>,
    /// Attention map of the second head, shape (batch, 1, H/16, W/16).
    pub attn2: Option<Tensor<B, 4>>,
    /// Attention map of the optional third head, shape (batch, 1, H/4, W/4).
    pub attn3: Option<Tensor<B, 4>>,
}

impl<B: Backend> ClassifierOutput<B> {
    /// Output without attention maps.
    pub fn logits_only(logits: Tensor<B, 2>) -> Self {
        Self {
            logits,
            attn1: None,
            attn2: None,
            attn3: None,
        }
    }

    /// Attention maps in head order, skipping absent ones.
    pub fn attention_maps(&self) -> Vec<&Tensor<B, 4>> {
        [&self.attn1, &self.attn2, &self.attn3]
            .into_iter()
            .flatten()
            .collect()
    }
}

/// Trait for image classification models.
///
/// Implemented by the attention-gated classifier and the plain VGG
/// baseline so evaluation code can stay generic.
pub trait ImageClassifier<B: Backend>: Module<B> + Clone + Send {
    /// Forward pass.
    ///
    /// # Arguments
    ///
    /// * `x` - Input tensor of shape (batch, 3, height, width)
    ///
    /// # Errors
    ///
    /// Returns [`crate::CoreError::ShapeMismatch`] when intermediate feature
    /// maps cannot be aligned (e.g. input size not divisible by 32).
    fn forward_classifier(&self, x: Tensor<B, 4>) -> Result<ClassifierOutput<B>>;

    /// Number of output classes.
    fn n_classes(&self) -> usize;

    /// Forward pass returning class probabilities.
    fn forward_probs(&self, x: Tensor<B, 4>) -> Result<Tensor<B, 2>> {
        let output = self.forward_classifier(x)?;
        Ok(softmax(output.logits, 1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::NdArray;

    type TestBackend = NdArray<f32>;

    #[test]
    fn test_attention_maps_skip_absent_heads() {
        let device = Default::default();
        let logits = Tensor::<TestBackend, 2>::zeros([2, 2], &device);
        let mut output = ClassifierOutput::logits_only(logits);
        assert!(output.attention_maps().is_empty());

        output.attn2 = Some(Tensor::zeros([2, 1, 4, 4], &device));
        let maps = output.attention_maps();
        assert_eq!(maps.len(), 1);
        assert_eq!(maps[0].dims(), [2, 1, 4, 4]);
    }
}
