//! Confusion matrix and per-class rates.

use serde::{Deserialize, Serialize};

/// Confusion matrix for classification evaluation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfusionMatrix {
    /// Counts indexed as `[true][pred]`.
    pub matrix: Vec<Vec<usize>>,
    /// Number of classes.
    pub n_classes: usize,
}

impl ConfusionMatrix {
    /// Create an empty confusion matrix.
    pub fn new(n_classes: usize) -> Self {
        Self {
            matrix: vec![vec![0; n_classes]; n_classes],
            n_classes,
        }
    }

    /// Build from predicted and true class indices.
    pub fn from_predictions(preds: &[usize], targets: &[usize], n_classes: usize) -> Self {
        let mut cm = Self::new(n_classes);
        for (&pred, &target) in preds.iter().zip(targets) {
            cm.add(target, pred);
        }
        cm
    }

    /// Record one prediction. Out-of-range classes are ignored.
    pub fn add(&mut self, true_class: usize, pred_class: usize) {
        if true_class < self.n_classes && pred_class < self.n_classes {
            self.matrix[true_class][pred_class] += 1;
        }
    }

    /// Total number of recorded samples.
    pub fn total(&self) -> usize {
        self.matrix.iter().flatten().sum()
    }

    /// True positives of `class`.
    pub fn true_positives(&self, class: usize) -> usize {
        self.matrix[class][class]
    }

    /// Samples predicted as `class`.
    pub fn predicted(&self, class: usize) -> usize {
        self.matrix.iter().map(|row| row[class]).sum()
    }

    /// Samples whose true class is `class`.
    pub fn support(&self, class: usize) -> usize {
        self.matrix[class].iter().sum()
    }

    /// Fraction of correct predictions, 0 when empty.
    pub fn accuracy(&self) -> f64 {
        let correct: usize = (0..self.n_classes).map(|i| self.true_positives(i)).sum();
        ratio(correct, self.total())
    }

    /// Precision of `class`, 0 when nothing was predicted as it.
    pub fn precision(&self, class: usize) -> f64 {
        ratio(self.true_positives(class), self.predicted(class))
    }

    /// Recall of `class`, 0 when the class never occurs.
    pub fn recall(&self, class: usize) -> f64 {
        ratio(self.true_positives(class), self.support(class))
    }

    /// Whether `class` occurs as a label or as a prediction.
    pub fn is_present(&self, class: usize) -> bool {
        self.support(class) > 0 || self.predicted(class) > 0
    }

    /// Unweighted mean of per-class precision over present classes.
    pub fn macro_precision(&self) -> f64 {
        self.macro_average(|c| self.precision(c))
    }

    /// Unweighted mean of per-class recall over present classes.
    pub fn macro_recall(&self) -> f64 {
        self.macro_average(|c| self.recall(c))
    }

    /// Classes that never occur in labels or predictions are left out.
    fn macro_average(&self, per_class: impl Fn(usize) -> f64) -> f64 {
        let present: Vec<usize> = (0..self.n_classes).filter(|&c| self.is_present(c)).collect();
        if present.is_empty() {
            return 0.0;
        }
        present.iter().map(|&c| per_class(c)).sum::<f64>() / present.len() as f64
    }

    /// Text table with true classes as rows.
    pub fn to_string_table(&self) -> String {
        let mut s = String::from("true\\pred");
        for j in 0..self.n_classes {
            s.push_str(&format!("{:>8}", j));
        }
        s.push('\n');

        for (i, row) in self.matrix.iter().enumerate() {
            s.push_str(&format!("{:>9}", i));
            for count in row {
                s.push_str(&format!("{:>8}", count));
            }
            s.push('\n');
        }

        s
    }
}

fn ratio(num: usize, den: usize) -> f64 {
    if den == 0 {
        0.0
    } else {
        num as f64 / den as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counts() {
        let cm = ConfusionMatrix::from_predictions(&[0, 0, 1, 1, 2, 2], &[0, 1, 1, 1, 2, 0], 3);

        assert_eq!(cm.matrix[0][0], 1);
        assert_eq!(cm.matrix[1][0], 1);
        assert_eq!(cm.matrix[1][1], 2);
        assert_eq!(cm.total(), 6);
        assert_eq!(cm.support(1), 3);
        assert_eq!(cm.predicted(2), 2);
    }

    #[test]
    fn test_rates() {
        let cm = ConfusionMatrix::from_predictions(&[0, 0, 1, 1], &[0, 1, 0, 1], 2);

        assert!((cm.accuracy() - 0.5).abs() < 1e-12);
        assert!((cm.precision(0) - 0.5).abs() < 1e-12);
        assert!((cm.recall(1) - 0.5).abs() < 1e-12);
        assert!((cm.macro_precision() - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_undefined_rates_are_zero() {
        // class 1 is never predicted and never occurs
        let cm = ConfusionMatrix::from_predictions(&[0, 0], &[0, 0], 2);
        assert_eq!(cm.precision(1), 0.0);
        assert_eq!(cm.recall(1), 0.0);
        assert_eq!(ConfusionMatrix::new(2).accuracy(), 0.0);
        assert_eq!(ConfusionMatrix::new(2).macro_precision(), 0.0);
    }

    #[test]
    fn test_macro_average_skips_absent_classes() {
        // class 2 never occurs and is never predicted
        let cm = ConfusionMatrix::from_predictions(&[0, 1, 1, 1], &[0, 0, 1, 1], 3);
        assert!(!cm.is_present(2));
        assert!((cm.macro_precision() - (1.0 + 2.0 / 3.0) / 2.0).abs() < 1e-12);
        assert!((cm.macro_recall() - 0.75).abs() < 1e-12);

        let cm = ConfusionMatrix::from_predictions(&[0, 0], &[0, 0], 2);
        assert!((cm.macro_recall() - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_table() {
        let cm = ConfusionMatrix::from_predictions(&[1], &[0], 2);
        let table = cm.to_string_table();
        assert_eq!(table.lines().count(), 3);
        assert!(table.lines().nth(1).unwrap().ends_with("       1"));
    }
}
