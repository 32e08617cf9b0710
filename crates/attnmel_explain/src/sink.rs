//! Destinations for rendered images.

use std::fs;
use std::path::{Path, PathBuf};

use image::{Rgb, RgbImage};
use ndarray::Array3;

use crate::error::{ExplainError, Result};

/// Receives tagged images at a step, e.g. one per evaluated batch.
pub trait ImageSink {
    /// Record `image` under `tag` at `step`.
    ///
    /// # Errors
    ///
    /// Implementations fail when the image cannot be stored.
    fn add_image(&mut self, tag: &str, image: &RgbImage, step: usize) -> Result<()>;
}

/// Convert a (3, H, W) array in [0, 1] to an 8-bit image.
///
/// # Errors
///
/// Fails when the array does not have three channels.
pub fn to_rgb_image(array: &Array3<f32>) -> Result<RgbImage> {
    let (c, h, w) = array.dim();
    if c != 3 {
        return Err(ExplainError::InvalidShape {
            expected: "(3, H, W)".into(),
            got: format!("({}, {}, {})", c, h, w),
        });
    }

    let to_u8 = |v: f32| (v.clamp(0.0, 1.0) * 255.0).round() as u8;
    Ok(RgbImage::from_fn(w as u32, h as u32, |x, y| {
        let (x, y) = (x as usize, y as usize);
        Rgb([
            to_u8(array[[0, y, x]]),
            to_u8(array[[1, y, x]]),
            to_u8(array[[2, y, x]]),
        ])
    }))
}

/// Writes `<root>/<tag>/<step>.png`.
///
/// Tags may contain `/`, which become nested directories.
#[derive(Debug, Clone)]
pub struct PngDirSink {
    root: PathBuf,
}

impl PngDirSink {
    /// Create a sink rooted at `root`, creating the directory.
    ///
    /// # Errors
    ///
    /// Fails when the directory cannot be created.
    pub fn new(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    /// Root directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// File an image with `tag` and `step` is written to.
    pub fn path_for(&self, tag: &str, step: usize) -> PathBuf {
        self.root.join(tag).join(format!("{}.png", step))
    }
}

impl ImageSink for PngDirSink {
    fn add_image(&mut self, tag: &str, image: &RgbImage, step: usize) -> Result<()> {
        let path = self.path_for(tag, step);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        image.save(&path)?;
        tracing::debug!(tag, step, path = %path.display(), "wrote image");
        Ok(())
    }
}
