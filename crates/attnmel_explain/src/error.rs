//! Error types for attnmel_explain.

use thiserror::Error;

/// Result type alias using [`ExplainError`].
pub type Result<T> = std::result::Result<T, ExplainError>;

/// Errors raised while building or writing visualizations.
#[derive(Error, Debug)]
pub enum ExplainError {
    /// Input with an unexpected shape.
    #[error("Invalid shape: expected {expected}, got {got}")]
    InvalidShape {
        /// Expected shape description.
        expected: String,
        /// Actual shape.
        got: String,
    },

    /// Nothing to visualize.
    #[error("Empty input: {0}")]
    Empty(String),

    /// Image encoding error.
    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
