//! Error types for attnmel_analysis.

use thiserror::Error;

/// Result type alias using [`MetricsError`].
pub type Result<T> = std::result::Result<T, MetricsError>;

/// Errors that can occur while computing metrics.
#[derive(Error, Debug)]
pub enum MetricsError {
    /// Scores and labels differ in length.
    #[error("Length mismatch: {scores} score rows but {labels} labels")]
    LengthMismatch {
        /// Number of score rows.
        scores: usize,
        /// Number of labels.
        labels: usize,
    },

    /// No samples to evaluate.
    #[error("No samples to evaluate")]
    Empty,

    /// Only one class is present in the labels.
    #[error("Only one class present in labels; {0} is undefined")]
    SingleClass(&'static str),

    /// No positive samples, so recall is undefined.
    #[error("No positive samples; {0} is undefined")]
    NoPositives(&'static str),

    /// Label outside the score columns.
    #[error("Label {label} out of range for {n_classes} classes")]
    InvalidLabel {
        /// The offending label.
        label: usize,
        /// Number of score columns.
        n_classes: usize,
    },

    /// Probability row with the wrong number of columns.
    #[error("Row {row} has {got} columns, expected {expected}")]
    RaggedRow {
        /// 0-based row index.
        row: usize,
        /// Columns of the first row.
        expected: usize,
        /// Columns of this row.
        got: usize,
    },

    /// Probability rows need at least two columns.
    #[error("Expected at least 2 class columns, got {0}")]
    TooFewClasses(usize),

    /// CSV reading error.
    #[error("Data error: {0}")]
    Data(#[from] attnmel_data::DataError),
}
