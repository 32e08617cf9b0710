//! Image dataset backed by a manifest.

use std::path::Path;

use ndarray::Array3;

use crate::error::Result;
use crate::manifest::Manifest;
use crate::preprocess::Preprocess;

/// Lazily decoded image dataset.
///
/// Images are read and preprocessed on access; nothing is cached.
///
/// # Example
///
/// ```rust,ignore
/// use attnmel_data::{ImageDataset, Preprocess};
///
/// let dataset = ImageDataset::open("data/test.csv", Preprocess::isic())?;
/// let (image, label) = dataset.get(0)?;
/// assert_eq!(image.shape(), &[3, 256, 256]);
/// ```
#[derive(Debug, Clone)]
pub struct ImageDataset {
    manifest: Manifest,
    preprocess: Preprocess,
}

impl ImageDataset {
    /// Create a dataset from a parsed manifest.
    ///
    /// # Errors
    ///
    /// Fails when the preprocessing parameters are invalid.
    pub fn new(manifest: Manifest, preprocess: Preprocess) -> Result<Self> {
        preprocess.validate()?;
        Ok(Self {
            manifest,
            preprocess,
        })
    }

    /// Read a manifest and create a dataset from it.
    ///
    /// # Errors
    ///
    /// Fails when the manifest cannot be read or parsed.
    pub fn open(path: impl AsRef<Path>, preprocess: Preprocess) -> Result<Self> {
        Self::new(Manifest::read(path)?, preprocess)
    }

    /// Get the number of samples.
    #[must_use]
    pub fn len(&self) -> usize {
        self.manifest.len()
    }

    /// Check if the dataset is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.manifest.is_empty()
    }

    /// The underlying manifest.
    #[must_use]
    pub fn manifest(&self) -> &Manifest {
        &self.manifest
    }

    /// Preprocessing applied to every image.
    #[must_use]
    pub fn preprocess(&self) -> &Preprocess {
        &self.preprocess
    }

    /// Side length of every preprocessed image.
    #[must_use]
    pub fn image_size(&self) -> usize {
        self.preprocess.crop as usize
    }

    /// Load and preprocess sample `index`.
    ///
    /// # Errors
    ///
    /// Fails for an invalid index or an unreadable image.
    pub fn get(&self, index: usize) -> Result<(Array3<f32>, usize)> {
        let entry = self.manifest.get(index)?;
        let image = self.preprocess.load(&entry.image_path)?;
        Ok((image, entry.label))
    }
}
