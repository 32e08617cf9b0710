//! # attnmel
//!
//! Attention-gated VGG classification of dermoscopic skin lesion images.
//!
//! - **Models**: VGG16-BN backbone with attention heads on intermediate
//!   stages, plus a plain VGG baseline
//! - **Data**: CSV manifests, test-time preprocessing and batching
//! - **Analysis**: accuracy, mAP, ROC AUC, thresholded precision/recall
//! - **Explainability**: attention heatmaps over image grids
//! - **Evaluation**: the [`eval`] loop tying them together
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use attnmel::prelude::*;
//!
//! let device = Default::default();
//! let config = AttnVggConfig::new(2, true, AttentionNormalization::Softmax);
//! let model = config.init::<NdArray>(&device).load_checkpoint("net.mpk", &device)?;
//!
//! let dataset = ImageDataset::open("test.csv", Preprocess::isic())?;
//! let loader = ImageLoader::builder(dataset).batch_size(64).build()?;
//! let mut sink = PngDirSink::new("log_test")?;
//! let summary = evaluate(&model, &loader, &device, "test_results.csv", Some(&mut sink), EvalOptions::default())?;
//! println!("{}", summary.report.summary());
//! ```
//!
//! ## Feature Flags
//!
//! - `backend-ndarray` (default): CPU backend using ndarray
//! - `backend-wgpu`: GPU backend using WGPU
//! - `backend-tch`: PyTorch backend via tch-rs

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod eval;

// Re-export all crates
pub use attnmel_analysis as analysis;
pub use attnmel_core as core;
pub use attnmel_data as data;
pub use attnmel_explain as explain;
pub use attnmel_models as models;

/// Prelude module for convenient imports.
///
/// ```rust,ignore
/// use attnmel::prelude::*;
/// ```
pub mod prelude {
    // Core types
    pub use attnmel_core::backend::*;
    pub use attnmel_core::{ClassifierOutput, FeatureShape, ImageClassifier, Seed};

    // Data
    pub use attnmel_data::{ImageBatch, ImageDataset, ImageLoader, Manifest, Preprocess};

    // Models
    pub use attnmel_models::{
        AttentionNormalization, AttnVgg, AttnVggConfig, BackboneConfig, CheckpointMetadata,
        ModelArch, ModelCheckpoint, Vgg, VggConfig,
    };

    // Analysis
    pub use attnmel_analysis::{compute_metrics, MetricsReport};

    // Explain
    pub use attnmel_explain::{ImageSink, PngDirSink};

    // Evaluation
    pub use crate::eval::{evaluate, EvalOptions, EvalSummary};
}
