//! # attnmel_analysis
//!
//! Evaluation metrics for attnmel classifiers.
//!
//! This crate provides:
//! - Accuracy, mean average precision and ROC AUC from class probabilities
//! - Precision and recall at a decision threshold, backed by a confusion matrix
//! - Precision-recall curves and their rasterized plot
//! - [`compute_metrics`] to evaluate a result CSV against a ground-truth manifest

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]

mod confusion;
mod error;
pub mod metrics;
pub mod plot;
mod report;

pub use confusion::ConfusionMatrix;
pub use error::{MetricsError, Result};
pub use metrics::{
    accuracy, argmax, average_precision, binary_roc_auc, mean_average_precision,
    precision_recall_curve, roc_auc, threshold_metrics, PrCurve, ThresholdMetrics,
    DEFAULT_THRESHOLD, POSITIVE_CLASS,
};
pub use plot::render_pr_curve;
pub use report::{compute_metrics, MetricsReport};
