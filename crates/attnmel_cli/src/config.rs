//! Run configuration for the command line.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use attnmel::models::{
    AttentionNormalization, AttnVggConfig, CheckpointMetadata, ModelArch, VggConfig,
};
use clap::{Args, ValueEnum};
use serde::{Deserialize, Serialize};

/// Architecture selected on the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Serialize, Deserialize)]
pub enum ArchKind {
    /// Attention-gated VGG
    #[value(alias = "attn")]
    AttnVgg,
    /// Plain VGG baseline
    Vgg,
}

/// Model flags shared by `test`, `init` and `info`.
#[derive(Debug, Clone, Args)]
pub struct ModelArgs {
    /// Model architecture
    #[arg(long, value_enum, default_value = "attn-vgg")]
    pub arch: ArchKind,

    /// Number of classes
    #[arg(long, default_value = "2", value_name = "N")]
    pub n_classes: usize,

    /// Pool intermediate stages instead of attending to them
    #[arg(long)]
    pub no_attention: bool,

    /// Add a third head on stage 2
    #[arg(long)]
    pub third_head: bool,

    /// Attention normalization: softmax or sigmoid
    #[arg(long, value_name = "MODE")]
    pub normalize_attn: Option<AttentionNormalization>,
}

impl ModelArgs {
    /// Build an architecture from the flags alone.
    ///
    /// The attention-gated model needs an explicit normalization mode, even
    /// with `--no-attention`, so that the checkpoint metadata is complete.
    pub fn to_arch(&self) -> Result<ModelArch> {
        match self.arch {
            ArchKind::AttnVgg => {
                let Some(normalization) = self.normalize_attn else {
                    bail!("--normalize-attn (softmax or sigmoid) is required for attn-vgg");
                };
                let config = AttnVggConfig::new(self.n_classes, !self.no_attention, normalization)
                    .with_third_head(self.third_head);
                config.validate().context("Invalid model configuration")?;
                Ok(ModelArch::AttnVgg(config))
            }
            ArchKind::Vgg => {
                let config = VggConfig::new(self.n_classes);
                config.validate().context("Invalid model configuration")?;
                Ok(ModelArch::Vgg(config))
            }
        }
    }
}

/// Resolve the architecture of `checkpoint`.
///
/// Metadata next to the checkpoint wins over the flags; without it the
/// flags must describe the model completely.
pub fn resolve_arch(checkpoint: &Path, args: &ModelArgs) -> Result<ModelArch> {
    let meta_path = attnmel::models::metadata_path(checkpoint);
    if meta_path.exists() {
        let metadata = CheckpointMetadata::load(&meta_path)
            .with_context(|| format!("Failed to read metadata {:?}", meta_path))?;
        if let (ModelArch::AttnVgg(config), Some(flag)) = (&metadata.model, args.normalize_attn) {
            if config.normalization != flag {
                tracing::warn!(
                    checkpoint = %config.normalization,
                    flag = %flag,
                    "ignoring --normalize-attn, checkpoint metadata takes precedence"
                );
            }
        }
        tracing::info!(arch = metadata.model.name(), path = ?meta_path, "using checkpoint metadata");
        return Ok(metadata.model);
    }

    tracing::info!("no checkpoint metadata, building the model from flags");
    args.to_arch()
}

/// Parameters of a `test` run, saved to `<outf>/config.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvalConfig {
    /// Checkpoint that was evaluated.
    pub checkpoint: PathBuf,
    /// Test manifest.
    pub manifest: PathBuf,
    /// Output directory.
    pub outf: PathBuf,
    /// Evaluated architecture.
    pub model: ModelArch,
    /// Batch size.
    pub batch_size: usize,
    /// Decision threshold.
    pub threshold: f64,
    /// Whether image grids and overlays were written.
    pub log_images: bool,
}

impl EvalConfig {
    /// File name inside the output directory.
    pub const FILE_NAME: &'static str = "config.json";

    /// Write the config to `<outf>/config.json`.
    pub fn save(&self) -> Result<PathBuf> {
        std::fs::create_dir_all(&self.outf)
            .with_context(|| format!("Failed to create {:?}", self.outf))?;
        let path = self.outf.join(Self::FILE_NAME);
        std::fs::write(&path, serde_json::to_string_pretty(self)?)?;
        Ok(path)
    }

    /// Read a saved config.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let json = std::fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read {:?}", path.as_ref()))?;
        serde_json::from_str(&json).context("Failed to parse config.json")
    }

    /// Result CSV path.
    pub fn results_path(&self) -> PathBuf {
        self.outf.join("test_results.csv")
    }

    /// Directory of the image sink.
    pub fn log_dir(&self) -> PathBuf {
        self.outf.join("log_test")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(arch: ArchKind, normalize_attn: Option<AttentionNormalization>) -> ModelArgs {
        ModelArgs {
            arch,
            n_classes: 2,
            no_attention: false,
            third_head: true,
            normalize_attn,
        }
    }

    #[test]
    fn test_normalization_is_required() {
        assert!(args(ArchKind::AttnVgg, None).to_arch().is_err());

        let arch = args(ArchKind::AttnVgg, Some(AttentionNormalization::Sigmoid))
            .to_arch()
            .unwrap();
        match arch {
            ModelArch::AttnVgg(config) => {
                assert_eq!(config.normalization, AttentionNormalization::Sigmoid);
                assert!(config.attention);
                assert!(config.third_head);
            }
            other => panic!("unexpected arch {:?}", other),
        }

        assert!(matches!(
            args(ArchKind::Vgg, None).to_arch().unwrap(),
            ModelArch::Vgg(_)
        ));
    }

    #[test]
    fn test_metadata_overrides_flags() {
        let dir = tempfile::tempdir().unwrap();
        let checkpoint = dir.path().join("net.mpk");

        let stored = AttnVggConfig::new(2, true, AttentionNormalization::Softmax);
        CheckpointMetadata::new(ModelArch::AttnVgg(stored))
            .save(attnmel::models::metadata_path(&checkpoint))
            .unwrap();

        let flags = args(ArchKind::Vgg, Some(AttentionNormalization::Sigmoid));
        match resolve_arch(&checkpoint, &flags).unwrap() {
            ModelArch::AttnVgg(config) => {
                assert_eq!(config.normalization, AttentionNormalization::Softmax)
            }
            other => panic!("unexpected arch {:?}", other),
        }

        let missing = dir.path().join("other.mpk");
        assert!(resolve_arch(&missing, &args(ArchKind::AttnVgg, None)).is_err());
    }

    #[test]
    fn test_eval_config_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let config = EvalConfig {
            checkpoint: "net.mpk".into(),
            manifest: "test.csv".into(),
            outf: dir.path().join("logs"),
            model: ModelArch::Vgg(VggConfig::new(2)),
            batch_size: 64,
            threshold: 0.5,
            log_images: true,
        };

        let path = config.save().unwrap();
        assert_eq!(path, dir.path().join("logs/config.json"));

        let loaded = EvalConfig::load(&path).unwrap();
        assert_eq!(loaded.batch_size, 64);
        assert_eq!(loaded.model.name(), "Vgg");
        assert_eq!(loaded.results_path(), dir.path().join("logs/test_results.csv"));
    }
}
