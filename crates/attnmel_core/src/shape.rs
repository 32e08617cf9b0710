//! Feature map shape metadata.

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, Result};

/// Shape metadata for image tensors and feature maps.
///
/// Follows the convention `(B, C, H, W)`.
///
/// # Example
///
/// ```rust
/// use attnmel_core::FeatureShape;
///
/// let shape = FeatureShape::new(8, 3, 256, 256);
/// assert_eq!(shape.spatial(), [256, 256]);
/// assert_eq!(shape.downsampled(32).spatial(), [8, 8]);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FeatureShape {
    batch: usize,
    channels: usize,
    height: usize,
    width: usize,
}

impl FeatureShape {
    /// Create a new shape.
    #[must_use]
    pub const fn new(batch: usize, channels: usize, height: usize, width: usize) -> Self {
        Self {
            batch,
            channels,
            height,
            width,
        }
    }

    /// Create a shape from a slice of dimensions `[B, C, H, W]`.
    ///
    /// # Errors
    ///
    /// Returns an error if the slice doesn't contain exactly 4 elements.
    pub fn from_dims(dims: &[usize]) -> Result<Self> {
        match dims {
            [b, c, h, w] => Ok(Self::new(*b, *c, *h, *w)),
            _ => Err(CoreError::DimensionError {
                expected: 4,
                got: dims.len(),
            }),
        }
    }

    /// Batch size.
    #[must_use]
    pub const fn batch(&self) -> usize {
        self.batch
    }

    /// Number of channels.
    #[must_use]
    pub const fn channels(&self) -> usize {
        self.channels
    }

    /// Spatial height.
    #[must_use]
    pub const fn height(&self) -> usize {
        self.height
    }

    /// Spatial width.
    #[must_use]
    pub const fn width(&self) -> usize {
        self.width
    }

    /// Spatial size `[H, W]`.
    #[must_use]
    pub const fn spatial(&self) -> [usize; 2] {
        [self.height, self.width]
    }

    /// Number of spatial locations `H * W`.
    #[must_use]
    pub const fn n_locations(&self) -> usize {
        self.height * self.width
    }

    /// Shape after a spatial downsampling by `factor` (floor division, as
    /// max pooling with matching kernel and stride does).
    #[must_use]
    pub const fn downsampled(&self, factor: usize) -> Self {
        Self::new(
            self.batch,
            self.channels,
            self.height / factor,
            self.width / factor,
        )
    }

    /// Shape after a spatial upsampling by `factor`.
    #[must_use]
    pub const fn upsampled(&self, factor: usize) -> Self {
        Self::new(
            self.batch,
            self.channels,
            self.height * factor,
            self.width * factor,
        )
    }

    /// Copy of this shape with a different channel count.
    #[must_use]
    pub const fn with_channels(&self, channels: usize) -> Self {
        Self::new(self.batch, channels, self.height, self.width)
    }

    /// Check that `other` has the same batch size and spatial size.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::ShapeMismatch`] naming `context` otherwise.
    pub fn ensure_aligned(&self, other: &Self, context: &str) -> Result<()> {
        if self.batch != other.batch || self.spatial() != other.spatial() {
            return Err(CoreError::ShapeMismatch(format!(
                "{}: {} vs {}",
                context, self, other
            )));
        }
        Ok(())
    }

    /// Convert to an array.
    #[must_use]
    pub const fn as_array(&self) -> [usize; 4] {
        [self.batch, self.channels, self.height, self.width]
    }
}

impl From<[usize; 4]> for FeatureShape {
    fn from(dims: [usize; 4]) -> Self {
        Self::new(dims[0], dims[1], dims[2], dims[3])
    }
}

impl std::fmt::Display for FeatureShape {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "(B={}, C={}, H={}, W={})",
            self.batch, self.channels, self.height, self.width
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_dims() {
        let shape = FeatureShape::from_dims(&[2, 64, 32, 16]).unwrap();
        assert_eq!(shape.as_array(), [2, 64, 32, 16]);
        assert!(FeatureShape::from_dims(&[2, 64, 32]).is_err());
    }

    #[test]
    fn test_resampling() {
        let shape = FeatureShape::new(4, 512, 8, 8);
        assert_eq!(shape.upsampled(4).spatial(), [32, 32]);
        assert_eq!(FeatureShape::new(1, 3, 90, 90).downsampled(32).spatial(), [2, 2]);
        assert_eq!(shape.n_locations(), 64);
    }

    #[test]
    fn test_ensure_aligned() {
        let local = FeatureShape::new(2, 256, 32, 32);
        let global = FeatureShape::new(2, 256, 8, 8);

        assert!(local.ensure_aligned(&global.upsampled(4), "attention").is_ok());

        let err = local.ensure_aligned(&global, "attention").unwrap_err();
        assert!(matches!(err, CoreError::ShapeMismatch(_)));
        assert!(err.to_string().contains("attention"));
    }
}
