//! Error types for attnskin_data.

use thiserror::Error;

/// Result type alias using [`DataError`].
pub type Result<T> = std::result::Result<T, DataError>;

/// Errors that can occur in data operations.
#[derive(Error, Debug)]
pub enum DataError {
    /// Empty dataset.
    #[error("Dataset is empty")]
    EmptyDataset,

    /// Index out of bounds.
    #[error("Index {index} out of bounds for length {length}")]
    IndexOutOfBounds {
        /// The requested index.
        index: usize,
        /// The length of the collection.
        length: usize,
    },

    /// Batch size error.
    #[error("Invalid batch size: {0}")]
    InvalidBatchSize(String),

    /// Malformed label file.
    #[error("File format error: {0}")]
    FormatError(String),

    /// Image could not be decoded.
    #[error("Failed to decode image {path}: {source}")]
    Image {
        /// Image path.
        path: String,
        /// Decoder error.
        #[source]
        source: image::ImageError,
    },

    /// CSV reader or writer error.
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// I/O error.
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// Core error.
    #[error("Core error: {0}")]
    CoreError(#[from] attnskin_core::CoreError),

    /// Background loader stopped unexpectedly.
    #[error("Data loader worker failed: {0}")]
    Worker(String),
}
