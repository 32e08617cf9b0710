//! Ranking and threshold metrics from class probabilities.
//!
//! Probabilities arrive as one row per sample. For two classes the
//! positive-class column (index 1) is the score; for more classes the
//! ranking metrics are macro averages of one-vs-rest scores.

use serde::{Deserialize, Serialize};

use crate::confusion::ConfusionMatrix;
use crate::error::{MetricsError, Result};

/// Index of the positive (melanoma) class.
pub const POSITIVE_CLASS: usize = 1;

/// Default decision threshold on the positive-class probability.
pub const DEFAULT_THRESHOLD: f64 = 0.5;

/// Scores closer than this are treated as tied.
const TIE_EPS: f64 = 1e-10;

/// Check rows against labels and return the number of classes.
fn validate(probs: &[Vec<f32>], labels: &[usize]) -> Result<usize> {
    if probs.len() != labels.len() {
        return Err(MetricsError::LengthMismatch {
            scores: probs.len(),
            labels: labels.len(),
        });
    }
    let first = probs.first().ok_or(MetricsError::Empty)?;
    let n_classes = first.len();
    if n_classes < 2 {
        return Err(MetricsError::TooFewClasses(n_classes));
    }
    if let Some((row, r)) = probs.iter().enumerate().find(|(_, r)| r.len() != n_classes) {
        return Err(MetricsError::RaggedRow {
            row,
            expected: n_classes,
            got: r.len(),
        });
    }
    if let Some(&label) = labels.iter().find(|&&l| l >= n_classes) {
        return Err(MetricsError::InvalidLabel { label, n_classes });
    }
    Ok(n_classes)
}

/// Index of the largest value; the first one wins ties.
pub fn argmax(row: &[f32]) -> usize {
    row.iter()
        .enumerate()
        .fold((0, f32::NEG_INFINITY), |(best, best_v), (i, &v)| {
            if v > best_v {
                (i, v)
            } else {
                (best, best_v)
            }
        })
        .0
}

/// Column `class` of every row, widened to f64.
fn column(probs: &[Vec<f32>], class: usize) -> Vec<f64> {
    probs.iter().map(|row| f64::from(row[class])).collect()
}

fn one_vs_rest(labels: &[usize], class: usize) -> Vec<bool> {
    labels.iter().map(|&l| l == class).collect()
}

/// Fraction of samples whose arg-max class equals the label.
///
/// # Errors
///
/// Fails on empty input or when rows and labels disagree.
pub fn accuracy(probs: &[Vec<f32>], labels: &[usize]) -> Result<f64> {
    validate(probs, labels)?;
    let correct = probs
        .iter()
        .zip(labels)
        .filter(|(row, &label)| argmax(row) == label)
        .count();
    Ok(correct as f64 / labels.len() as f64)
}

/// Precision-recall pairs at every distinct score threshold.
///
/// Points run from the highest threshold to the lowest, so recall is
/// non-decreasing. The first point is the `(recall 0, precision 1)` anchor
/// and has no threshold, hence `thresholds.len() + 1 == precision.len()`.
/// The curve stops once full recall is reached.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PrCurve {
    /// Precision per point.
    pub precision: Vec<f64>,
    /// Recall per point.
    pub recall: Vec<f64>,
    /// Decision thresholds, descending.
    pub thresholds: Vec<f64>,
}

impl PrCurve {
    /// Step-wise area: sum of `(R_n - R_{n-1}) * P_n`.
    pub fn average_precision(&self) -> f64 {
        self.recall
            .windows(2)
            .zip(self.precision.iter().skip(1))
            .map(|(r, p)| (r[1] - r[0]) * p)
            .sum()
    }

    /// Number of points including the anchor.
    pub fn len(&self) -> usize {
        self.precision.len()
    }

    /// Whether the curve has no points.
    pub fn is_empty(&self) -> bool {
        self.precision.is_empty()
    }
}

/// Sample indices ordered by descending score.
fn descending(scores: &[f64]) -> Vec<usize> {
    let mut order: Vec<usize> = (0..scores.len()).collect();
    order.sort_by(|&a, &b| {
        scores[b]
            .partial_cmp(&scores[a])
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    order
}

/// Precision-recall curve of binary scores.
///
/// # Errors
///
/// Fails on empty or mismatched input and when there are no positives.
pub fn precision_recall_curve(scores: &[f64], positives: &[bool]) -> Result<PrCurve> {
    if scores.len() != positives.len() {
        return Err(MetricsError::LengthMismatch {
            scores: scores.len(),
            labels: positives.len(),
        });
    }
    if scores.is_empty() {
        return Err(MetricsError::Empty);
    }
    let n_pos = positives.iter().filter(|&&p| p).count();
    if n_pos == 0 {
        return Err(MetricsError::NoPositives("precision-recall curve"));
    }

    let order = descending(scores);
    let mut curve = PrCurve {
        precision: vec![1.0],
        recall: vec![0.0],
        thresholds: Vec::new(),
    };

    let (mut tp, mut fp) = (0usize, 0usize);
    let mut i = 0;
    while i < order.len() {
        let threshold = scores[order[i]];
        while i < order.len() && (scores[order[i]] - threshold).abs() < TIE_EPS {
            if positives[order[i]] {
                tp += 1;
            } else {
                fp += 1;
            }
            i += 1;
        }

        curve.thresholds.push(threshold);
        curve.precision.push(tp as f64 / (tp + fp) as f64);
        curve.recall.push(tp as f64 / n_pos as f64);

        if tp == n_pos {
            break;
        }
    }

    Ok(curve)
}

/// Average precision of binary scores.
///
/// # Errors
///
/// See [`precision_recall_curve`].
pub fn average_precision(scores: &[f64], positives: &[bool]) -> Result<f64> {
    Ok(precision_recall_curve(scores, positives)?.average_precision())
}

/// Area under the ROC curve via the rank-sum statistic; ties share the
/// average rank.
///
/// # Errors
///
/// Returns [`MetricsError::SingleClass`] when only one class is present.
pub fn binary_roc_auc(scores: &[f64], positives: &[bool]) -> Result<f64> {
    if scores.len() != positives.len() {
        return Err(MetricsError::LengthMismatch {
            scores: scores.len(),
            labels: positives.len(),
        });
    }
    if scores.is_empty() {
        return Err(MetricsError::Empty);
    }

    let n = scores.len();
    let n_pos = positives.iter().filter(|&&p| p).count();
    let n_neg = n - n_pos;
    if n_pos == 0 || n_neg == 0 {
        return Err(MetricsError::SingleClass("ROC AUC"));
    }

    // ascending: rank 1 is the lowest score
    let mut order = descending(scores);
    order.reverse();

    let mut rank_sum = 0.0;
    let mut current_rank = 0.0;
    let mut i = 0;
    while i < n {
        let score = scores[order[i]];
        let mut j = i;
        while j < n && (scores[order[j]] - score).abs() < TIE_EPS {
            j += 1;
        }

        let group_size = (j - i) as f64;
        let avg_rank = current_rank + (group_size + 1.0) / 2.0;
        let group_pos = order[i..j].iter().filter(|&&k| positives[k]).count();
        rank_sum += avg_rank * group_pos as f64;

        current_rank += group_size;
        i = j;
    }

    let n_pos = n_pos as f64;
    Ok((rank_sum - n_pos * (n_pos + 1.0) / 2.0) / (n_pos * n_neg as f64))
}

/// Mean average precision.
///
/// Two classes: average precision of the positive-class column. More
/// classes: mean one-vs-rest average precision over classes that occur.
///
/// # Errors
///
/// Fails on invalid input or when no class has positives.
pub fn mean_average_precision(probs: &[Vec<f32>], labels: &[usize]) -> Result<f64> {
    let n_classes = validate(probs, labels)?;
    if n_classes == 2 {
        return average_precision(
            &column(probs, POSITIVE_CLASS),
            &one_vs_rest(labels, POSITIVE_CLASS),
        );
    }

    let per_class: Vec<f64> = (0..n_classes)
        .filter(|&c| labels.contains(&c))
        .map(|c| average_precision(&column(probs, c), &one_vs_rest(labels, c)))
        .collect::<Result<_>>()?;
    if per_class.is_empty() {
        return Err(MetricsError::NoPositives("mean average precision"));
    }
    Ok(per_class.iter().sum::<f64>() / per_class.len() as f64)
}

/// ROC AUC of class probabilities.
///
/// Two classes: AUC of the positive-class column. More classes: mean
/// one-vs-rest AUC over classes that occur and do not cover every sample.
///
/// # Errors
///
/// Returns [`MetricsError::SingleClass`] when the labels hold one class.
pub fn roc_auc(probs: &[Vec<f32>], labels: &[usize]) -> Result<f64> {
    let n_classes = validate(probs, labels)?;
    if n_classes == 2 {
        return binary_roc_auc(
            &column(probs, POSITIVE_CLASS),
            &one_vs_rest(labels, POSITIVE_CLASS),
        );
    }

    let per_class: Vec<f64> = (0..n_classes)
        .filter_map(|c| binary_roc_auc(&column(probs, c), &one_vs_rest(labels, c)).ok())
        .collect();
    if per_class.is_empty() {
        return Err(MetricsError::SingleClass("ROC AUC"));
    }
    Ok(per_class.iter().sum::<f64>() / per_class.len() as f64)
}

/// Precision and recall at a fixed decision threshold.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThresholdMetrics {
    /// Threshold on the positive-class probability.
    pub threshold: f64,
    /// Precision averaged over all classes.
    pub precision_macro: f64,
    /// Recall averaged over all classes.
    pub recall_macro: f64,
    /// Precision of the positive class.
    pub precision_positive: f64,
    /// Recall of the positive class.
    pub recall_positive: f64,
    /// Underlying confusion matrix.
    pub confusion: ConfusionMatrix,
}

/// Threshold the scores and compute precision and recall.
///
/// Two classes predict positive when `probs[1] >= threshold`; more classes
/// fall back to the arg-max and ignore the threshold. Undefined ratios
/// evaluate to 0.
///
/// # Errors
///
/// Fails on empty or inconsistent input.
pub fn threshold_metrics(
    probs: &[Vec<f32>],
    labels: &[usize],
    threshold: f64,
) -> Result<ThresholdMetrics> {
    let n_classes = validate(probs, labels)?;
    let preds: Vec<usize> = probs
        .iter()
        .map(|row| {
            if n_classes == 2 {
                usize::from(f64::from(row[POSITIVE_CLASS]) >= threshold)
            } else {
                argmax(row)
            }
        })
        .collect();
    let confusion = ConfusionMatrix::from_predictions(&preds, labels, n_classes);

    Ok(ThresholdMetrics {
        threshold,
        precision_macro: confusion.macro_precision(),
        recall_macro: confusion.macro_recall(),
        precision_positive: confusion.precision(POSITIVE_CLASS),
        recall_positive: confusion.recall(POSITIVE_CLASS),
        confusion,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn separable() -> (Vec<Vec<f32>>, Vec<usize>) {
        (
            vec![
                vec![0.9, 0.1],
                vec![0.2, 0.8],
                vec![0.4, 0.6],
                vec![0.7, 0.3],
            ],
            vec![0, 1, 1, 0],
        )
    }

    #[test]
    fn test_perfectly_separable_scores() {
        let (probs, labels) = separable();

        assert_relative_eq!(accuracy(&probs, &labels).unwrap(), 1.0);
        assert_relative_eq!(mean_average_precision(&probs, &labels).unwrap(), 1.0);
        assert_relative_eq!(roc_auc(&probs, &labels).unwrap(), 1.0);

        let t = threshold_metrics(&probs, &labels, DEFAULT_THRESHOLD).unwrap();
        assert_relative_eq!(t.precision_macro, 1.0);
        assert_relative_eq!(t.recall_macro, 1.0);
        assert_relative_eq!(t.precision_positive, 1.0);
        assert_relative_eq!(t.recall_positive, 1.0);
    }

    #[test]
    fn test_average_precision_known_value() {
        // ranking P N P N: precision 1 at recall 0.5, 2/3 at recall 1
        let scores = [0.9, 0.8, 0.7, 0.6];
        let positives = [true, false, true, false];
        let ap = average_precision(&scores, &positives).unwrap();
        assert_relative_eq!(ap, 0.5 + 0.5 * 2.0 / 3.0, epsilon = 1e-12);
    }

    #[test]
    fn test_pr_curve_shape() {
        let curve = precision_recall_curve(&[0.9, 0.8, 0.7, 0.6], &[true, false, true, false]).unwrap();
        assert_eq!(curve.len(), curve.thresholds.len() + 1);
        assert_eq!(curve.recall, vec![0.0, 0.5, 0.5, 1.0]);
        assert!(curve.recall.windows(2).all(|w| w[0] <= w[1]));
        // stops at full recall, 0.6 never becomes a threshold
        assert_eq!(curve.thresholds, vec![0.9, 0.8, 0.7]);
    }

    #[test]
    fn test_tied_scores() {
        let scores = [0.5, 0.5, 0.5, 0.5];
        let positives = [true, false, true, false];

        assert_relative_eq!(binary_roc_auc(&scores, &positives).unwrap(), 0.5);
        assert_relative_eq!(average_precision(&scores, &positives).unwrap(), 0.5);
    }

    #[test]
    fn test_roc_auc_known_value() {
        let scores = [0.1, 0.4, 0.35, 0.8];
        let positives = [false, false, true, true];
        assert_relative_eq!(binary_roc_auc(&scores, &positives).unwrap(), 0.75);
    }

    #[test]
    fn test_single_class_auc_fails() {
        let probs = vec![vec![0.3, 0.7], vec![0.6, 0.4]];
        let labels = vec![1, 1];
        assert!(matches!(
            roc_auc(&probs, &labels),
            Err(MetricsError::SingleClass(_))
        ));
    }

    #[test]
    fn test_threshold_zero_predicts_positive() {
        let (probs, labels) = separable();
        let t = threshold_metrics(&probs, &labels, 0.0).unwrap();
        assert_relative_eq!(t.recall_positive, 1.0);
        assert_relative_eq!(t.precision_positive, 0.5);
        // class 0 is never predicted
        assert_relative_eq!(t.precision_macro, 0.25);
    }

    #[test]
    fn test_multiclass_macro() {
        let probs = vec![
            vec![0.8, 0.1, 0.1],
            vec![0.1, 0.8, 0.1],
            vec![0.1, 0.1, 0.8],
        ];
        let labels = vec![0, 1, 2];
        assert_relative_eq!(mean_average_precision(&probs, &labels).unwrap(), 1.0);
        assert_relative_eq!(roc_auc(&probs, &labels).unwrap(), 1.0);
        assert_relative_eq!(accuracy(&probs, &labels).unwrap(), 1.0);
    }

    #[test]
    fn test_invalid_inputs() {
        let probs = vec![vec![0.5, 0.5]];
        assert!(matches!(
            accuracy(&probs, &[0, 1]),
            Err(MetricsError::LengthMismatch { .. })
        ));
        assert!(matches!(accuracy(&[], &[]), Err(MetricsError::Empty)));
        assert!(matches!(
            accuracy(&probs, &[2]),
            Err(MetricsError::InvalidLabel { label: 2, .. })
        ));
        assert!(matches!(
            accuracy(&[vec![1.0]], &[0]),
            Err(MetricsError::TooFewClasses(1))
        ));
        assert!(matches!(
            accuracy(&[vec![0.5, 0.5], vec![1.0]], &[0, 0]),
            Err(MetricsError::RaggedRow { row: 1, .. })
        ));
    }

    #[test]
    fn test_argmax_first_wins_ties() {
        assert_eq!(argmax(&[0.5, 0.5]), 0);
        assert_eq!(argmax(&[0.1, 0.3, 0.6]), 2);
    }
}
