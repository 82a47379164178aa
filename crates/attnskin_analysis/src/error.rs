//! Error types for attnskin_analysis.

use thiserror::Error;

/// Result type alias using [`AnalysisError`].
pub type Result<T> = std::result::Result<T, AnalysisError>;

/// Errors raised while computing metrics.
#[derive(Error, Debug)]
pub enum AnalysisError {
    /// Two inputs that must pair up have different lengths.
    #[error("Length mismatch: {left} {left_name} vs {right} {right_name}")]
    LengthMismatch {
        /// Name of the first input.
        left_name: &'static str,
        /// Length of the first input.
        left: usize,
        /// Name of the second input.
        right_name: &'static str,
        /// Length of the second input.
        right: usize,
    },

    /// A class index is outside `0..n_classes`.
    #[error("Class {class} out of range for {n_classes} classes")]
    ClassOutOfRange {
        /// The offending class.
        class: usize,
        /// Number of classes.
        n_classes: usize,
    },

    /// No samples were given.
    #[error("No samples to evaluate")]
    Empty,
}

pub(crate) fn check_lengths(
    left_name: &'static str,
    left: usize,
    right_name: &'static str,
    right: usize,
) -> Result<()> {
    if left == right {
        Ok(())
    } else {
        Err(AnalysisError::LengthMismatch {
            left_name,
            left,
            right_name,
            right,
        })
    }
}
