//! # attnmel_data
//!
//! Dataset manifests, image preprocessing and batching for attnmel.
//!
//! This crate provides:
//! - [`Manifest`] for `image_path,meta,label` CSV files
//! - [`Preprocess`] for the resize, center crop and normalization pipeline
//! - [`ImageDataset`] and [`ImageLoader`] for batched tensors on any backend
//! - [`ResultWriter`], [`read_results`] and [`read_labels`] for prediction CSVs
//!
//! ## Example
//!
//! ```rust,ignore
//! use attnmel_data::{ImageDataset, ImageLoader, Preprocess};
//!
//! let dataset = ImageDataset::open("data/test.csv", Preprocess::isic())?;
//! let loader = ImageLoader::builder(dataset).batch_size(64).build()?;
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]

mod dataset;
mod error;
mod io;
mod loader;
mod manifest;
mod preprocess;

pub use dataset::ImageDataset;
pub use error::{DataError, Result};
pub use io::{read_labels, read_results, ResultWriter};
pub use loader::{ImageBatch, ImageLoader, ImageLoaderBuilder, ImageLoaderIter};
pub use manifest::{Manifest, ManifestEntry, LABEL_COLUMN};
pub use preprocess::{Preprocess, ISIC_MEAN, ISIC_STD};
