//! Model checkpointing and serialization utilities.
//!
//! Weights are stored with burn's named MessagePack recorder, next to a JSON
//! metadata file holding the architecture and its config, so a checkpoint
//! can be restored without repeating the model flags.
//!
//! # Example
//!
//! ```rust,ignore
//! use attnmel_models::checkpoint::{CheckpointMetadata, ModelCheckpoint};
//!
//! let model = config.init::<NdArray>(&device);
//! model.save_checkpoint("net.mpk")?;
//! CheckpointMetadata::new(ModelArch::AttnVgg(config.clone())).save(metadata_path("net.mpk"))?;
//!
//! let restored = config.init::<NdArray>(&device).load_checkpoint("net.mpk", &device)?;
//! ```

use std::path::{Path, PathBuf};

use burn::module::{Module, ModuleVisitor, ParamId};
use burn::prelude::*;
use burn::record::{FullPrecisionSettings, NamedMpkFileRecorder, Recorder};
use serde::{Deserialize, Serialize};

use crate::attn_vgg::AttnVggConfig;
use crate::vgg::VggConfig;

/// Model architecture stored in checkpoint metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "arch", content = "config")]
pub enum ModelArch {
    /// Attention-gated VGG.
    AttnVgg(AttnVggConfig),
    /// Plain VGG baseline.
    Vgg(VggConfig),
}

impl ModelArch {
    /// Architecture name.
    pub fn name(&self) -> &'static str {
        match self {
            Self::AttnVgg(_) => "AttnVgg",
            Self::Vgg(_) => "Vgg",
        }
    }

    /// Number of output classes.
    pub fn n_classes(&self) -> usize {
        match self {
            Self::AttnVgg(config) => config.n_classes,
            Self::Vgg(config) => config.n_classes,
        }
    }
}

/// Model checkpoint metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckpointMetadata {
    /// Architecture and its config.
    pub model: ModelArch,
    /// Whether the backbone came from a pretrained record.
    pub pretrained_backbone: bool,
    /// Additional metadata.
    pub extra: std::collections::HashMap<String, String>,
}

impl CheckpointMetadata {
    /// Create new metadata for a model.
    pub fn new(model: ModelArch) -> Self {
        Self {
            model,
            pretrained_backbone: false,
            extra: std::collections::HashMap::new(),
        }
    }

    /// Mark the backbone as pretrained.
    #[must_use]
    pub fn with_pretrained_backbone(mut self, pretrained: bool) -> Self {
        self.pretrained_backbone = pretrained;
        self
    }

    /// Add extra metadata.
    #[must_use]
    pub fn with_extra(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.extra.insert(key.into(), value.into());
        self
    }

    /// Save metadata to a JSON file.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let json = serde_json::to_string_pretty(self)
            .map_err(|e| CheckpointError::Save(e.to_string()))?;
        std::fs::write(path, json).map_err(|e| CheckpointError::Save(e.to_string()))?;
        Ok(())
    }

    /// Load metadata from a JSON file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let json =
            std::fs::read_to_string(path).map_err(|e| CheckpointError::Load(e.to_string()))?;
        serde_json::from_str(&json).map_err(|e| CheckpointError::InvalidFormat(e.to_string()))
    }
}

/// Path of the metadata file belonging to a checkpoint (`net.mpk` -> `net.json`).
pub fn metadata_path(checkpoint: impl AsRef<Path>) -> PathBuf {
    checkpoint.as_ref().with_extension("json")
}

/// Save a module to a named MessagePack file.
///
/// burn appends the `.mpk` extension when it is missing.
pub fn save_model<B, M>(model: &M, path: impl AsRef<Path>) -> Result<()>
where
    B: Backend,
    M: Module<B>,
{
    let recorder = NamedMpkFileRecorder::<FullPrecisionSettings>::new();
    recorder
        .record(model.clone().into_record(), path.as_ref().to_path_buf())
        .map_err(|e| CheckpointError::Save(e.to_string()))?;
    tracing::debug!(path = %path.as_ref().display(), "saved checkpoint");
    Ok(())
}

/// Load a module record from a named MessagePack file.
///
/// Missing or mistyped entries fail here, before any inference runs.
pub fn load_record<B, M>(path: impl AsRef<Path>, device: &B::Device) -> Result<M::Record>
where
    B: Backend,
    M: Module<B>,
{
    let recorder = NamedMpkFileRecorder::<FullPrecisionSettings>::new();
    recorder
        .load(path.as_ref().to_path_buf(), device)
        .map_err(|e| CheckpointError::Load(e.to_string()))
}

/// Collects parameter shapes in visiting order.
#[derive(Default)]
struct ShapeCollector {
    shapes: Vec<Vec<usize>>,
}

impl<B: Backend> ModuleVisitor<B> for ShapeCollector {
    fn visit_float<const D: usize>(&mut self, _id: ParamId, tensor: &Tensor<B, D>) {
        self.shapes.push(tensor.dims().to_vec());
    }
}

fn param_shapes<B: Backend, M: Module<B>>(module: &M) -> Vec<Vec<usize>> {
    let mut collector = ShapeCollector::default();
    module.visit(&mut collector);
    collector.shapes
}

/// Load a record into `module`, requiring every parameter shape to match.
///
/// # Errors
///
/// Returns [`CheckpointError::ShapeMismatch`] on the first parameter whose
/// shape differs from the architecture built by the caller.
pub fn load_strict<B, M>(module: M, path: impl AsRef<Path>, device: &B::Device) -> Result<M>
where
    B: Backend,
    M: Module<B>,
{
    let expected = param_shapes::<B, M>(&module);
    let record = load_record::<B, M>(path, device)?;
    let loaded = module.load_record(record);
    let got = param_shapes::<B, M>(&loaded);

    if expected.len() != got.len() {
        return Err(CheckpointError::ShapeMismatch(format!(
            "expected {} parameters, checkpoint has {}",
            expected.len(),
            got.len()
        )));
    }
    if let Some((i, (e, g))) = expected
        .iter()
        .zip(&got)
        .enumerate()
        .find(|(_, (e, g))| e != g)
    {
        return Err(CheckpointError::ShapeMismatch(format!(
            "parameter #{}: expected {:?}, checkpoint has {:?}",
            i, e, g
        )));
    }

    tracing::debug!(n_params = got.len(), "loaded checkpoint");
    Ok(loaded)
}

/// Result type for checkpoint operations.
pub type Result<T> = std::result::Result<T, CheckpointError>;

/// Checkpoint-related errors.
#[derive(Debug, thiserror::Error)]
pub enum CheckpointError {
    /// Error saving checkpoint.
    #[error("Failed to save checkpoint: {0}")]
    Save(String),

    /// Error loading checkpoint.
    #[error("Failed to load checkpoint: {0}")]
    Load(String),

    /// Invalid metadata or record format.
    #[error("Invalid checkpoint format: {0}")]
    InvalidFormat(String),

    /// Checkpoint does not match the architecture.
    #[error("Checkpoint does not match the model: {0}")]
    ShapeMismatch(String),
}

/// Extension trait for models to add checkpoint methods.
pub trait ModelCheckpoint<B: Backend>: Module<B> {
    /// Save the model to a checkpoint file.
    fn save_checkpoint(&self, path: impl AsRef<Path>) -> Result<()> {
        save_model::<B, Self>(self, path)
    }

    /// Load a checkpoint into a model of the same architecture.
    fn load_checkpoint(self, path: impl AsRef<Path>, device: &B::Device) -> Result<Self>
    where
        Self: Sized,
    {
        load_strict::<B, Self>(self, path, device)
    }
}

// Implement for all modules
impl<B: Backend, M: Module<B>> ModelCheckpoint<B> for M {}
