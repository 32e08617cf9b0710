//! End-of-run metrics report computed from result and ground-truth CSVs.

use std::path::Path;

use image::RgbImage;
use serde::{Deserialize, Serialize};

use crate::error::{MetricsError, Result};
use crate::metrics::{
    accuracy, mean_average_precision, precision_recall_curve, roc_auc, threshold_metrics,
    PrCurve, ThresholdMetrics, POSITIVE_CLASS,
};
use crate::plot::render_pr_curve;

/// Aggregate evaluation metrics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsReport {
    /// Number of evaluated samples.
    pub n_samples: usize,
    /// Arg-max accuracy.
    pub accuracy: f64,
    /// Mean average precision.
    pub mean_average_precision: f64,
    /// ROC AUC.
    pub auc: f64,
    /// Precision and recall at the decision threshold.
    pub threshold: ThresholdMetrics,
    /// Positive-class precision-recall curve.
    pub pr_curve: PrCurve,
}

impl MetricsReport {
    /// Compute every metric from in-memory rows.
    ///
    /// # Errors
    ///
    /// Fails on inconsistent input, a single-class label set, or labels
    /// without any positive sample.
    pub fn from_rows(probs: &[Vec<f32>], labels: &[usize], threshold: f64) -> Result<Self> {
        let accuracy = accuracy(probs, labels)?;
        let mean_average_precision = mean_average_precision(probs, labels)?;
        let auc = roc_auc(probs, labels)?;
        let threshold = threshold_metrics(probs, labels, threshold)?;

        let scores: Vec<f64> = probs
            .iter()
            .map(|row| f64::from(row[POSITIVE_CLASS]))
            .collect();
        let positives: Vec<bool> = labels.iter().map(|&l| l == POSITIVE_CLASS).collect();
        let pr_curve = precision_recall_curve(&scores, &positives)?;

        Ok(Self {
            n_samples: labels.len(),
            accuracy,
            mean_average_precision,
            auc,
            threshold,
            pr_curve,
        })
    }

    /// Rasterized positive-class precision-recall curve.
    pub fn pr_curve_image(&self) -> RgbImage {
        render_pr_curve(&self.pr_curve)
    }

    /// Human-readable summary.
    pub fn summary(&self) -> String {
        format!(
            "test result ({} samples): accuracy {:.2}%\n\
             mean precision {:.2}% mean recall {:.2}%\n\
             precision (positive) {:.2}% recall (positive) {:.2}%\n\
             mAP {:.2}% AUC {:.4}\n\n{}",
            self.n_samples,
            100.0 * self.accuracy,
            100.0 * self.threshold.precision_macro,
            100.0 * self.threshold.recall_macro,
            100.0 * self.threshold.precision_positive,
            100.0 * self.threshold.recall_positive,
            100.0 * self.mean_average_precision,
            self.auc,
            self.threshold.confusion.to_string_table(),
        )
    }
}

/// Compute metrics from a result CSV and a ground-truth manifest.
///
/// # Errors
///
/// Fails when a file cannot be parsed (with its line number), when the row
/// counts differ, or when a metric is undefined for the labels.
pub fn compute_metrics(
    result_csv: impl AsRef<Path>,
    gt_csv: impl AsRef<Path>,
    threshold: f64,
) -> Result<MetricsReport> {
    let probs = attnmel_data::read_results(result_csv.as_ref())?;
    let labels = attnmel_data::read_labels(gt_csv.as_ref())?;
    if probs.len() != labels.len() {
        return Err(MetricsError::LengthMismatch {
            scores: probs.len(),
            labels: labels.len(),
        });
    }

    tracing::debug!(
        n_samples = labels.len(),
        result = %result_csv.as_ref().display(),
        "computing metrics"
    );
    MetricsReport::from_rows(&probs, &labels, threshold)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::DEFAULT_THRESHOLD;
    use approx::assert_relative_eq;
    use std::fs;

    #[test]
    fn test_compute_metrics_from_files() {
        let dir = tempfile::tempdir().unwrap();
        let results = dir.path().join("test_results.csv");
        let gt = dir.path().join("test.csv");

        fs::write(&results, "0.9,0.1\n0.2,0.8\n0.4,0.6\n0.7,0.3\n").unwrap();
        fs::write(&gt, "a.jpg,m,0\nb.jpg,m,1\nc.jpg,m,1\nd.jpg,m,0\n").unwrap();

        let report = compute_metrics(&results, &gt, DEFAULT_THRESHOLD).unwrap();
        assert_eq!(report.n_samples, 4);
        assert_relative_eq!(report.accuracy, 1.0);
        assert_relative_eq!(report.mean_average_precision, 1.0);
        assert_relative_eq!(report.auc, 1.0);
        assert_relative_eq!(report.threshold.recall_positive, 1.0);
        assert!(report.summary().contains("AUC 1.0000"));
        assert_eq!(report.pr_curve_image().width(), crate::plot::PLOT_WIDTH);
    }

    #[test]
    fn test_row_count_mismatch() {
        let dir = tempfile::tempdir().unwrap();
        let results = dir.path().join("r.csv");
        let gt = dir.path().join("gt.csv");

        fs::write(&results, "0.9,0.1\n").unwrap();
        fs::write(&gt, "a.jpg,m,0\nb.jpg,m,1\n").unwrap();

        assert!(matches!(
            compute_metrics(&results, &gt, DEFAULT_THRESHOLD),
            Err(MetricsError::LengthMismatch { scores: 1, labels: 2 })
        ));
    }

    #[test]
    fn test_malformed_result_row_surfaces_line() {
        let dir = tempfile::tempdir().unwrap();
        let results = dir.path().join("r.csv");
        let gt = dir.path().join("gt.csv");

        fs::write(&results, "0.9,0.1\n0.5;0.5\n").unwrap();
        fs::write(&gt, "a.jpg,m,0\nb.jpg,m,1\n").unwrap();

        let err = compute_metrics(&results, &gt, DEFAULT_THRESHOLD).unwrap_err();
        assert!(err.to_string().contains(":2:"), "{}", err);
    }

    #[test]
    fn test_report_serializes() {
        let probs = vec![vec![0.8, 0.2], vec![0.3, 0.7]];
        let report = MetricsReport::from_rows(&probs, &[0, 1], DEFAULT_THRESHOLD).unwrap();
        let json = serde_json::to_string(&report).unwrap();
        assert!(json.contains("mean_average_precision"));
    }
}
