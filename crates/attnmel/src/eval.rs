//! Test-set evaluation loop.
//!
//! Runs a classifier over a loader batch by batch, streams the softmax
//! probabilities to a result CSV, logs image grids and attention overlays
//! to an [`ImageSink`], then scores the result file against the labels of
//! the batches in the order they were produced.

use std::path::{Path, PathBuf};

use attnmel_analysis::{argmax, MetricsError, MetricsReport};
use attnmel_core::{CoreError, ImageClassifier};
use attnmel_data::{read_results, DataError, ImageBatch, ImageLoader, ResultWriter};
use attnmel_explain::{
    image_grid, to_rgb_image, up_factor, visualize_attention, ExplainError, GridOptions, ImageSink,
};
use burn::prelude::*;
use burn::tensor::activation::softmax;
use thiserror::Error;

/// Tag of the input image grid.
pub const TAG_IMAGE: &str = "test/image";
/// Tag of the precision-recall curve.
pub const TAG_PR_CURVE: &str = "test/pr_curve";

/// Tag of the `k`-th attention overlay (1-based).
pub fn attention_tag(k: usize) -> String {
    format!("test/attention_map_{}", k)
}

/// Result type for evaluation.
pub type Result<T> = std::result::Result<T, EvalError>;

/// Errors raised during evaluation.
#[derive(Error, Debug)]
pub enum EvalError {
    /// Forward pass failed.
    #[error("Model error: {0}")]
    Core(#[from] CoreError),

    /// Loading or writing data failed.
    #[error("Data error: {0}")]
    Data(#[from] DataError),

    /// Metrics could not be computed.
    #[error("Metrics error: {0}")]
    Metrics(#[from] MetricsError),

    /// Rendering or storing an image failed.
    #[error("Visualization error: {0}")]
    Explain(#[from] ExplainError),
}

/// Evaluation options.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EvalOptions {
    /// Decision threshold for precision and recall.
    pub threshold: f64,
    /// Images per batch that are visualized.
    pub n_vis: usize,
    /// Tiles per grid row.
    pub nrow: usize,
}

impl Default for EvalOptions {
    fn default() -> Self {
        Self {
            threshold: attnmel_analysis::DEFAULT_THRESHOLD,
            n_vis: 16,
            nrow: 4,
        }
    }
}

/// Outcome of an evaluation run.
#[derive(Debug, Clone)]
pub struct EvalSummary {
    /// Number of evaluated samples.
    pub n_samples: usize,
    /// Samples whose arg-max prediction matched the label.
    pub correct: usize,
    /// Result CSV that was written.
    pub results_path: PathBuf,
    /// Metrics computed from the result CSV.
    pub report: MetricsReport,
}

impl EvalSummary {
    /// Running accuracy accumulated during inference.
    pub fn accuracy(&self) -> f64 {
        if self.n_samples == 0 {
            0.0
        } else {
            self.correct as f64 / self.n_samples as f64
        }
    }
}

/// Evaluate `model` on every batch of `loader`.
///
/// Row `i` of the result CSV is scored against the label of the `i`-th
/// sample the loader yields, so shuffled loaders and in-memory manifests
/// score correctly. When `sink` is given,
/// the first `n_vis` images of each batch and their attention overlays are
/// recorded with the batch index as step, and the precision-recall curve is
/// recorded at step 0 at the end.
///
/// # Errors
///
/// Any failing batch aborts the run.
pub fn evaluate<B, M>(
    model: &M,
    loader: &ImageLoader,
    device: &B::Device,
    results_path: impl AsRef<Path>,
    mut sink: Option<&mut dyn ImageSink>,
    options: EvalOptions,
) -> Result<EvalSummary>
where
    B: Backend,
    M: ImageClassifier<B>,
{
    let n_classes = model.n_classes();
    let mut writer = ResultWriter::create(results_path.as_ref())?;
    let mut labels = Vec::with_capacity(loader.len());
    let mut correct = 0;

    tracing::info!(
        n_batches = loader.n_batches(),
        n_samples = loader.len(),
        "start testing"
    );

    for (step, batch) in loader.iter::<B>(device).enumerate() {
        let batch = batch?;
        let output = model.forward_classifier(batch.images.clone())?;

        let probs: Vec<f32> = softmax(output.logits.clone(), 1)
            .into_data()
            .iter::<f32>()
            .collect();
        writer.write_flat(&probs, n_classes)?;

        let batch_correct = probs
            .chunks(n_classes)
            .zip(&batch.labels)
            .filter(|(row, &label)| argmax(row) == label)
            .count();
        correct += batch_correct;
        labels.extend_from_slice(&batch.labels);
        tracing::debug!(step, batch_size = batch.len(), batch_correct, "evaluated batch");

        if let Some(sink) = sink.as_deref_mut() {
            log_images(sink, &batch, &output.attention_maps(), step, options)?;
        }
    }

    let results_path = writer.finish()?;
    let rows = read_results(&results_path)?;
    let report = MetricsReport::from_rows(&rows, &labels, options.threshold)?;
    let n_samples = labels.len();

    if let Some(sink) = sink.as_deref_mut() {
        sink.add_image(TAG_PR_CURVE, &report.pr_curve_image(), 0)?;
    }

    tracing::info!(
        n_samples,
        accuracy = report.accuracy,
        map = report.mean_average_precision,
        auc = report.auc,
        "testing done"
    );

    Ok(EvalSummary {
        n_samples,
        correct,
        results_path,
        report,
    })
}

/// Record the image grid and one overlay per attention map.
fn log_images<B: Backend>(
    sink: &mut dyn ImageSink,
    batch: &ImageBatch<B>,
    maps: &[&Tensor<B, 4>],
    step: usize,
    options: EvalOptions,
) -> Result<()> {
    let n = options.n_vis.min(batch.len());
    let grid_options = GridOptions::new(options.nrow);
    let images = batch.head(n);
    let [_, _, image_size, _] = images.dims();

    let grid = image_grid(images, grid_options)?;
    sink.add_image(TAG_IMAGE, &to_rgb_image(&grid)?, step)?;

    for (k, map) in maps.iter().enumerate() {
        let map = (*map).clone().slice([0..n]);
        let [_, _, map_size, _] = map.dims();
        let factor = up_factor(image_size, map_size)?;

        let overlay = visualize_attention(&grid, map, factor, grid_options)?;
        tracing::debug!(
            head = k + 1,
            max = overlay.stats.max,
            min = overlay.stats.min,
            mean = overlay.stats.mean,
            "attention map"
        );
        sink.add_image(&attention_tag(k + 1), &to_rgb_image(&overlay.image)?, step)?;
    }

    Ok(())
}
