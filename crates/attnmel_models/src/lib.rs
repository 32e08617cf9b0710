//! # attnmel_models
//!
//! Image classifiers for dermoscopic lesion classification.
//!
//! ## Models
//! - [`AttnVgg`] - VGG16-BN with attention-gated descriptors from stages 3, 4
//!   and optionally 2
//! - [`Vgg`] - Plain VGG16-BN baseline with a dense head
//!
//! ## Building blocks
//! - [`VggBackbone`] - Five-stage feature extractor exposing every pooled stage
//! - [`AttentionBlock`] - Spatial attention gate with softmax or sigmoid maps
//!
//! Weights are saved and restored through [`checkpoint`].

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod attention;
pub mod attn_vgg;
pub mod backbone;
pub mod checkpoint;
pub mod init;
mod traits;
pub mod vgg;

pub use attention::{
    AttentionBlock, AttentionBlockConfig, AttentionNormalization, AttentionOutput,
};
pub use attn_vgg::{AttnVgg, AttnVggConfig, ClassifierTail};
pub use backbone::{BackboneConfig, StageFeatures, StageSpec, VggBackbone, STAGE_LAYOUT};
pub use checkpoint::{
    load_record, load_strict, metadata_path, save_model, CheckpointError, CheckpointMetadata,
    ModelArch, ModelCheckpoint,
};
pub use vgg::{Vgg, VggConfig};
