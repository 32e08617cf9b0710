//! Dataloader producing batched image tensors.

use burn::prelude::*;
use rand::prelude::*;
use rand_chacha::ChaCha8Rng;

use attnmel_core::Seed;

use crate::dataset::ImageDataset;
use crate::error::{DataError, Result};

/// A batch of preprocessed images and their labels.
#[derive(Debug, Clone)]
pub struct ImageBatch<B: Backend> {
    /// Images of shape (batch, 3, H, W).
    pub images: Tensor<B, 4>,
    /// Class labels, one per image.
    pub labels: Vec<usize>,
    /// Dataset indices of the samples.
    pub indices: Vec<usize>,
}

impl<B: Backend> ImageBatch<B> {
    /// Number of samples in the batch.
    #[must_use]
    pub fn len(&self) -> usize {
        self.labels.len()
    }

    /// Check if the batch is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    /// The first `n` images (fewer when the batch is smaller).
    #[must_use]
    pub fn head(&self, n: usize) -> Tensor<B, 4> {
        let n = n.min(self.len());
        self.images.clone().slice([0..n])
    }
}

/// A dataloader that produces batches from an [`ImageDataset`].
///
/// Iteration is sequential unless shuffling is enabled, so result rows line
/// up with manifest rows.
///
/// # Example
///
/// ```rust,ignore
/// use attnmel_data::{ImageDataset, ImageLoader, Preprocess};
///
/// let dataset = ImageDataset::open("test.csv", Preprocess::isic())?;
/// let loader = ImageLoader::builder(dataset).batch_size(64).build()?;
///
/// for batch in loader.iter::<NdArray>(&device) {
///     let batch = batch?;
/// }
/// ```
pub struct ImageLoader {
    dataset: ImageDataset,
    batch_size: usize,
    shuffle: bool,
    seed: Option<Seed>,
}

impl ImageLoader {
    /// Create a new dataloader builder.
    #[must_use]
    pub fn builder(dataset: ImageDataset) -> ImageLoaderBuilder {
        ImageLoaderBuilder::new(dataset)
    }

    /// Get the dataset.
    #[must_use]
    pub fn dataset(&self) -> &ImageDataset {
        &self.dataset
    }

    /// Get the batch size.
    #[must_use]
    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Get the number of batches, counting a final partial one.
    #[must_use]
    pub fn n_batches(&self) -> usize {
        self.dataset.len().div_ceil(self.batch_size)
    }

    /// Get the total number of samples.
    #[must_use]
    pub fn len(&self) -> usize {
        self.dataset.len()
    }

    /// Check if the loader is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.dataset.is_empty()
    }

    /// Create an iterator over batches on `device`.
    #[must_use]
    pub fn iter<B: Backend>(&self, device: &B::Device) -> ImageLoaderIter<'_, B> {
        ImageLoaderIter::new(self, device.clone())
    }
}

/// Builder for [`ImageLoader`].
pub struct ImageLoaderBuilder {
    dataset: ImageDataset,
    batch_size: usize,
    shuffle: bool,
    seed: Option<Seed>,
}

impl ImageLoaderBuilder {
    /// Create a new builder with batch size 64 and no shuffling.
    #[must_use]
    pub fn new(dataset: ImageDataset) -> Self {
        Self {
            dataset,
            batch_size: 64,
            shuffle: false,
            seed: None,
        }
    }

    /// Set the batch size.
    #[must_use]
    pub fn batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    /// Enable or disable shuffling.
    #[must_use]
    pub fn shuffle(mut self, shuffle: bool) -> Self {
        self.shuffle = shuffle;
        self
    }

    /// Set the random seed for shuffling.
    #[must_use]
    pub fn seed(mut self, seed: Seed) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Build the dataloader.
    ///
    /// # Errors
    ///
    /// Returns an error for a zero batch size or an empty dataset.
    pub fn build(self) -> Result<ImageLoader> {
        if self.batch_size == 0 {
            return Err(DataError::InvalidBatchSize(
                "Batch size must be greater than 0".to_string(),
            ));
        }

        if self.dataset.is_empty() {
            return Err(DataError::EmptyDataset);
        }

        Ok(ImageLoader {
            dataset: self.dataset,
            batch_size: self.batch_size,
            shuffle: self.shuffle,
            seed: self.seed,
        })
    }
}

/// Iterator over batches from an [`ImageLoader`].
pub struct ImageLoaderIter<'a, B: Backend> {
    loader: &'a ImageLoader,
    device: B::Device,
    indices: Vec<usize>,
    current_batch: usize,
    n_batches: usize,
}

impl<'a, B: Backend> ImageLoaderIter<'a, B> {
    fn new(loader: &'a ImageLoader, device: B::Device) -> Self {
        let mut indices: Vec<usize> = (0..loader.dataset.len()).collect();

        if loader.shuffle {
            let mut rng = match loader.seed {
                Some(seed) => seed.to_rng(),
                None => ChaCha8Rng::from_entropy(),
            };
            indices.shuffle(&mut rng);
        }

        Self {
            loader,
            device,
            indices,
            current_batch: 0,
            n_batches: loader.n_batches(),
        }
    }

    fn create_batch(&self, indices: &[usize]) -> Result<ImageBatch<B>> {
        let dataset = &self.loader.dataset;
        let batch_size = indices.len();
        let side = dataset.image_size();

        let mut data = Vec::with_capacity(batch_size * 3 * side * side);
        let mut labels = Vec::with_capacity(batch_size);
        for &idx in indices {
            let (image, label) = dataset.get(idx)?;
            data.extend(image.iter().copied());
            labels.push(label);
        }

        let images = Tensor::<B, 1>::from_floats(data.as_slice(), &self.device)
            .reshape([batch_size, 3, side, side]);

        Ok(ImageBatch {
            images,
            labels,
            indices: indices.to_vec(),
        })
    }
}

impl<'a, B: Backend> Iterator for ImageLoaderIter<'a, B> {
    type Item = Result<ImageBatch<B>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.current_batch >= self.n_batches {
            return None;
        }

        let start = self.current_batch * self.loader.batch_size;
        let end = std::cmp::min(start + self.loader.batch_size, self.indices.len());
        self.current_batch += 1;

        tracing::trace!(start, end, "loading batch");
        Some(self.create_batch(&self.indices[start..end]))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.n_batches - self.current_batch;
        (remaining, Some(remaining))
    }
}

impl<'a, B: Backend> ExactSizeIterator for ImageLoaderIter<'a, B> {}
