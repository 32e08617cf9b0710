//! Test-time image preprocessing.

use std::path::Path;

use image::imageops::{self, FilterType};
use image::RgbImage;
use ndarray::Array3;

use crate::error::{DataError, Result};

/// Per-channel mean of the ISIC 2016 training images.
pub const ISIC_MEAN: [f32; 3] = [0.7268, 0.5968, 0.5362];

/// Per-channel standard deviation of the ISIC 2016 training images.
pub const ISIC_STD: [f32; 3] = [0.0905, 0.1303, 0.1525];

/// Resize, center crop and normalize an RGB image into a `(3, H, W)` array.
#[derive(Debug, Clone, PartialEq)]
pub struct Preprocess {
    /// Side length after resizing.
    pub resize: u32,
    /// Side length of the center crop.
    pub crop: u32,
    /// Channel means subtracted after scaling to [0, 1].
    pub mean: [f32; 3],
    /// Channel standard deviations.
    pub std: [f32; 3],
}

impl Default for Preprocess {
    fn default() -> Self {
        Self::isic()
    }
}

impl Preprocess {
    /// 300×300 resize, 256×256 crop, ISIC statistics.
    #[must_use]
    pub fn isic() -> Self {
        Self {
            resize: 300,
            crop: 256,
            mean: ISIC_MEAN,
            std: ISIC_STD,
        }
    }

    /// Set resize and crop sizes.
    #[must_use]
    pub fn with_sizes(mut self, resize: u32, crop: u32) -> Self {
        self.resize = resize;
        self.crop = crop;
        self
    }

    /// Set normalization statistics.
    #[must_use]
    pub fn with_stats(mut self, mean: [f32; 3], std: [f32; 3]) -> Self {
        self.mean = mean;
        self.std = std;
        self
    }

    /// Check the parameters.
    ///
    /// # Errors
    ///
    /// Returns [`DataError::InvalidPreprocess`] for a crop larger than the
    /// resized image, a zero size or a non-positive std.
    pub fn validate(&self) -> Result<()> {
        if self.crop == 0 || self.crop > self.resize {
            return Err(DataError::InvalidPreprocess(format!(
                "crop {} must be in 1..={}",
                self.crop, self.resize
            )));
        }
        if self.std.iter().any(|&s| s <= 0.0) {
            return Err(DataError::InvalidPreprocess(format!(
                "std must be positive, got {:?}",
                self.std
            )));
        }
        Ok(())
    }

    /// Load an image file and preprocess it.
    ///
    /// # Errors
    ///
    /// Returns [`DataError::Image`] when the file cannot be decoded.
    pub fn load(&self, path: impl AsRef<Path>) -> Result<Array3<f32>> {
        let path = path.as_ref();
        let image = image::open(path).map_err(|source| DataError::Image {
            path: path.to_path_buf(),
            source,
        })?;
        self.apply(&image.to_rgb8())
    }

    /// Preprocess a decoded image.
    ///
    /// # Errors
    ///
    /// Fails when the parameters are invalid.
    pub fn apply(&self, image: &RgbImage) -> Result<Array3<f32>> {
        self.validate()?;

        let resized = imageops::resize(image, self.resize, self.resize, FilterType::Triangle);
        let offset = crop_offset(self.resize, self.crop);
        let cropped = imageops::crop_imm(&resized, offset, offset, self.crop, self.crop).to_image();

        let side = self.crop as usize;
        let mut out = Array3::<f32>::zeros((3, side, side));
        for (x, y, pixel) in cropped.enumerate_pixels() {
            for c in 0..3 {
                let value = f32::from(pixel[c]) / 255.0;
                out[[c, y as usize, x as usize]] = (value - self.mean[c]) / self.std[c];
            }
        }
        Ok(out)
    }
}

/// Offset of a centered crop, rounded to the nearest pixel.
fn crop_offset(size: u32, crop: u32) -> u32 {
    (f64::from(size - crop) / 2.0).round() as u32
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    #[test]
    fn test_output_shape_and_normalization() {
        let image = RgbImage::from_pixel(40, 30, Rgb([255, 0, 128]));
        let pre = Preprocess::isic().with_sizes(20, 16);
        let out = pre.apply(&image).unwrap();

        assert_eq!(out.shape(), &[3, 16, 16]);
        let expected_r = (1.0 - ISIC_MEAN[0]) / ISIC_STD[0];
        let expected_g = (0.0 - ISIC_MEAN[1]) / ISIC_STD[1];
        assert!((out[[0, 5, 5]] - expected_r).abs() < 1e-4);
        assert!((out[[1, 0, 15]] - expected_g).abs() < 1e-4);
    }

    #[test]
    fn test_crop_offset() {
        assert_eq!(crop_offset(300, 256), 22);
        assert_eq!(crop_offset(10, 10), 0);
    }

    #[test]
    fn test_invalid_parameters() {
        let image = RgbImage::new(8, 8);
        assert!(Preprocess::isic().with_sizes(8, 16).apply(&image).is_err());
        assert!(Preprocess::isic()
            .with_stats([0.0; 3], [1.0, 0.0, 1.0])
            .validate()
            .is_err());
    }

    #[test]
    fn test_load_missing_file() {
        let result = Preprocess::isic().load("does/not/exist.png");
        assert!(matches!(result, Err(DataError::Image { .. })));
    }
}
