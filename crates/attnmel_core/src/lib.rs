//! # attnmel_core
//!
//! Core types and errors shared by the attnmel crates.
//!
//! This crate provides:
//! - [`Seed`] for deterministic random number generation
//! - [`FeatureShape`] for image feature map shape metadata
//! - [`ImageClassifier`] and [`ClassifierOutput`], the contract every
//!   classifier in the model zoo fulfils
//! - Error types and common utilities
//!
//! ## Shape Convention
//!
//! Image tensors and feature maps follow the convention `(B, C, H, W)`:
//! - `B`: Batch size (number of samples)
//! - `C`: Channels
//! - `H`, `W`: Spatial height and width
//!
//! ## Example
//!
//! ```rust,ignore
//! use attnmel_core::{FeatureShape, Seed};
//!
//! let seed = Seed::new(42);
//! let shape = FeatureShape::new(16, 256, 32, 32);
//! assert_eq!(shape.downsampled(2).height(), 16);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]

mod error;
mod model_trait;
mod seed;
mod shape;

pub use error::{CoreError, Result};
pub use model_trait::{ClassifierOutput, ImageClassifier};
pub use seed::Seed;
pub use shape::FeatureShape;

/// Backend type aliases for convenience
pub mod backend {
    #[cfg(feature = "backend-ndarray")]
    pub use burn_ndarray::NdArray;

    #[cfg(feature = "backend-wgpu")]
    pub use burn_wgpu::Wgpu;

    #[cfg(feature = "backend-tch")]
    pub use burn_tch::LibTorch;
}
