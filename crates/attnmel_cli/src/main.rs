//! attnmel CLI for evaluating attention-gated skin lesion classifiers.

mod config;

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use attnmel::analysis::{compute_metrics, DEFAULT_THRESHOLD};
use attnmel::core::{ImageClassifier, Seed};
use attnmel::data::{ImageDataset, ImageLoader, Preprocess};
use attnmel::eval::{evaluate, EvalOptions};
use attnmel::explain::{ImageSink, PngDirSink};
use attnmel::models::{
    metadata_path, CheckpointMetadata, ModelArch, ModelCheckpoint, STAGE_LAYOUT,
};
use burn::prelude::*;
use burn_ndarray::NdArray;

use crate::config::{resolve_arch, EvalConfig, ModelArgs};

/// Backend type for inference.
type InferBackend = NdArray<f32>;

#[derive(Parser)]
#[command(name = "attnmel")]
#[command(author, version)]
#[command(about = "Attention-gated VGG skin lesion classifier - evaluate checkpoints and score results")]
#[command(long_about = "attnmel: attention-gated VGG16-BN for dermoscopic images.

EXAMPLES:
  # Write a freshly initialized checkpoint with softmax attention
  attnmel init --output net.mpk --normalize-attn softmax

  # Evaluate a checkpoint on the test manifest
  attnmel test --checkpoint net.mpk --csv test.csv --outf logs

  # Score an existing result file
  attnmel metrics --results logs/test_results.csv --gt test.csv

  # Show the layout of a model
  attnmel info --checkpoint net.mpk")]
struct Cli {
    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Evaluate a checkpoint on a test manifest
    Test {
        /// Checkpoint to evaluate
        #[arg(long, value_name = "PATH")]
        checkpoint: PathBuf,

        /// Test manifest (image, meta, label)
        #[arg(long = "csv", default_value = "test.csv", value_name = "PATH")]
        manifest: PathBuf,

        /// Output directory for results, images and config
        #[arg(long, default_value = "logs", value_name = "DIR")]
        outf: PathBuf,

        /// Batch size
        #[arg(long, default_value = "64", value_name = "SIZE")]
        batch_size: usize,

        /// Decision threshold for precision and recall
        #[arg(long, default_value_t = DEFAULT_THRESHOLD, value_name = "T")]
        threshold: f64,

        /// Skip writing image grids and attention overlays
        #[arg(long)]
        no_log_images: bool,

        #[command(flatten)]
        model: ModelArgs,
    },
    /// Compute metrics from a result CSV and a ground-truth manifest
    Metrics {
        /// Result CSV, one probability column per class
        #[arg(long, value_name = "PATH")]
        results: PathBuf,

        /// Ground-truth manifest, label in the third column
        #[arg(long, value_name = "PATH")]
        gt: PathBuf,

        /// Decision threshold for precision and recall
        #[arg(long, default_value_t = DEFAULT_THRESHOLD, value_name = "T")]
        threshold: f64,

        /// Write the precision-recall curve to this PNG
        #[arg(long, value_name = "PATH")]
        pr_curve: Option<PathBuf>,
    },
    /// Write a freshly initialized checkpoint with metadata
    Init {
        /// Checkpoint path
        #[arg(long, value_name = "PATH")]
        output: PathBuf,

        /// Backbone-only record with pretrained weights
        #[arg(long, value_name = "PATH")]
        pretrained_backbone: Option<PathBuf>,

        /// Random seed for weight initialization
        #[arg(long, default_value = "42", value_name = "SEED")]
        seed: u64,

        #[command(flatten)]
        model: ModelArgs,
    },
    /// Print the layout of a model
    Info {
        /// Read the architecture from this checkpoint's metadata
        #[arg(long, value_name = "PATH")]
        checkpoint: Option<PathBuf>,

        #[command(flatten)]
        model: ModelArgs,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging
    let log_level = match cli.verbose {
        0 => tracing::Level::WARN,
        1 => tracing::Level::INFO,
        2 => tracing::Level::DEBUG,
        _ => tracing::Level::TRACE,
    };

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(tracing_subscriber::filter::LevelFilter::from_level(log_level))
        .init();

    let device = burn_ndarray::NdArrayDevice::Cpu;

    match cli.command {
        Commands::Test {
            checkpoint,
            manifest,
            outf,
            batch_size,
            threshold,
            no_log_images,
            model,
        } => {
            let arch = resolve_arch(&checkpoint, &model)?;
            let config = EvalConfig {
                checkpoint,
                manifest,
                outf,
                model: arch,
                batch_size,
                threshold,
                log_images: !no_log_images,
            };
            handle_test(&config, &device)
        }
        Commands::Metrics {
            results,
            gt,
            threshold,
            pr_curve,
        } => handle_metrics(&results, &gt, threshold, pr_curve.as_deref()),
        Commands::Init {
            output,
            pretrained_backbone,
            seed,
            model,
        } => handle_init(&output, pretrained_backbone.as_deref(), seed, &model, &device),
        Commands::Info { checkpoint, model } => handle_info(checkpoint.as_deref(), &model, &device),
    }
}

fn handle_test(config: &EvalConfig, device: &<InferBackend as Backend>::Device) -> Result<()> {
    println!("=== attnmel Test ===\n");
    println!("Configuration:");
    println!("  Architecture: {}", config.model.name());
    println!("  Checkpoint: {:?}", config.checkpoint);
    println!("  Manifest: {:?}", config.manifest);
    println!("  Output: {:?}", config.outf);
    println!("  Batch size: {}", config.batch_size);
    println!("  Threshold: {}\n", config.threshold);

    let config_path = config.save()?;
    tracing::info!(path = ?config_path, "saved run config");

    let dataset = ImageDataset::open(&config.manifest, Preprocess::isic())
        .with_context(|| format!("Failed to open manifest {:?}", config.manifest))?;
    println!("Test samples: {}", dataset.len());

    let loader = ImageLoader::builder(dataset)
        .batch_size(config.batch_size)
        .shuffle(false)
        .build()
        .context("Failed to create test loader")?;

    match &config.model {
        ModelArch::AttnVgg(model_config) => {
            println!(
                "  Attention: {}, normalization: {}, third head: {}\n",
                model_config.attention, model_config.normalization, model_config.third_head
            );
            let model = model_config
                .init::<InferBackend>(device)
                .load_checkpoint(&config.checkpoint, device)
                .with_context(|| format!("Failed to load {:?}", config.checkpoint))?;
            run_test(&model, &loader, config, device)
        }
        ModelArch::Vgg(model_config) => {
            let model = model_config
                .init::<InferBackend>(device)
                .load_checkpoint(&config.checkpoint, device)
                .with_context(|| format!("Failed to load {:?}", config.checkpoint))?;
            run_test(&model, &loader, config, device)
        }
    }
}

fn run_test<M: ImageClassifier<InferBackend>>(
    model: &M,
    loader: &ImageLoader,
    config: &EvalConfig,
    device: &<InferBackend as Backend>::Device,
) -> Result<()> {
    let mut sink = if config.log_images {
        Some(PngDirSink::new(config.log_dir()).context("Failed to create image log directory")?)
    } else {
        None
    };

    let options = EvalOptions {
        threshold: config.threshold,
        ..EvalOptions::default()
    };

    println!("Start testing...");
    let summary = evaluate(
        model,
        loader,
        device,
        config.results_path(),
        sink.as_mut().map(|s| s as &mut dyn ImageSink),
        options,
    )
    .context("Evaluation failed")?;

    println!("\nAccuracy on test data: {:.2}%", summary.accuracy() * 100.0);
    println!("{}", summary.report.summary());
    println!("\nResults written to {:?}", summary.results_path);
    if let Some(sink) = &sink {
        println!("Images written to {:?}", sink.root());
    }

    println!("\n=== Testing finished successfully! ===");
    Ok(())
}

fn handle_metrics(
    results: &Path,
    gt: &Path,
    threshold: f64,
    pr_curve: Option<&Path>,
) -> Result<()> {
    let report = compute_metrics(results, gt, threshold)
        .with_context(|| format!("Failed to score {:?} against {:?}", results, gt))?;

    println!("{}", report.summary());

    if let Some(path) = pr_curve {
        report
            .pr_curve_image()
            .save(path)
            .with_context(|| format!("Failed to write {:?}", path))?;
        println!("\nSaved precision-recall curve to {:?}", path);
    }

    Ok(())
}

fn handle_init(
    output: &Path,
    pretrained_backbone: Option<&Path>,
    seed: u64,
    args: &ModelArgs,
    device: &<InferBackend as Backend>::Device,
) -> Result<()> {
    let arch = args.to_arch()?;
    Seed::new(seed).seed_backend::<InferBackend>();

    if let Some(parent) = output.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }

    let backbone_config = match &arch {
        ModelArch::AttnVgg(config) => &config.backbone,
        ModelArch::Vgg(config) => &config.backbone,
    };
    let backbone = pretrained_backbone
        .map(|path| {
            tracing::info!(path = ?path, "loading pretrained backbone");
            backbone_config
                .init::<InferBackend>(device)
                .load_checkpoint(path, device)
                .with_context(|| format!("Failed to load pretrained backbone {:?}", path))
        })
        .transpose()?;

    match &arch {
        ModelArch::AttnVgg(config) => {
            let mut model = config.init::<InferBackend>(device);
            if let Some(backbone) = backbone {
                model = model.with_backbone(backbone);
            }
            model.save_checkpoint(output).context("Failed to save checkpoint")?;
        }
        ModelArch::Vgg(config) => {
            let mut model = config.init::<InferBackend>(device);
            if let Some(backbone) = backbone {
                model = model.with_backbone(backbone);
            }
            model.save_checkpoint(output).context("Failed to save checkpoint")?;
        }
    }

    let meta_path = metadata_path(output);
    CheckpointMetadata::new(arch.clone())
        .with_pretrained_backbone(pretrained_backbone.is_some())
        .with_extra("seed", seed.to_string())
        .save(&meta_path)
        .context("Failed to save checkpoint metadata")?;

    println!("Saved {} checkpoint to {:?}", arch.name(), output);
    println!("Saved metadata to {:?}", meta_path);
    Ok(())
}

fn handle_info(
    checkpoint: Option<&Path>,
    args: &ModelArgs,
    device: &<InferBackend as Backend>::Device,
) -> Result<()> {
    let arch = match checkpoint {
        Some(path) => resolve_arch(path, args)?,
        None => args.to_arch()?,
    };

    println!("Model: {}", arch.name());
    println!("─────────────────────────────────────────");
    println!("  Classes:         {}", arch.n_classes());

    let backbone = match &arch {
        ModelArch::AttnVgg(config) => &config.backbone,
        ModelArch::Vgg(config) => &config.backbone,
    };
    println!("  Input channels:  {}", backbone.in_channels);
    for (i, (stage, reference)) in backbone.stages.iter().zip(STAGE_LAYOUT.iter()).enumerate() {
        let note = if stage == reference { "" } else { " (custom)" };
        println!(
            "  Stage {}:         {} x conv3x3-{}{}",
            i + 1,
            stage.n_convs,
            stage.width,
            note
        );
    }

    let n_params = match &arch {
        ModelArch::AttnVgg(config) => {
            println!("  Attention:       {}", config.attention);
            println!("  Normalization:   {}", config.normalization);
            println!("  Third head:      {}", config.third_head);
            println!("  Descriptor len:  {}", config.descriptor_len());
            config.init::<InferBackend>(device).num_params()
        }
        ModelArch::Vgg(config) => {
            println!("  Hidden width:    {}", config.hidden);
            config.init::<InferBackend>(device).num_params()
        }
    };
    println!("  Parameters:      {}", n_params);

    Ok(())
}
