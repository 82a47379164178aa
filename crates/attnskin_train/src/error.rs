//! Error types for training.

use thiserror::Error;

/// Result type alias for training operations.
pub type Result<T> = std::result::Result<T, TrainError>;

/// Errors that can occur during training.
#[derive(Error, Debug)]
pub enum TrainError {
    /// Invalid learning rate.
    #[error("Invalid learning rate: {0}")]
    InvalidLearningRate(String),

    /// Invalid training or loss configuration.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Checkpoint error.
    #[error("Checkpoint error: {0}")]
    Checkpoint(#[from] attnskin_models::CheckpointError),

    /// Model construction error.
    #[error("Model error: {0}")]
    Model(#[from] attnskin_models::ModelError),

    /// Callback error.
    #[error("Callback error: {0}")]
    CallbackError(String),

    /// Data error.
    #[error("Data error: {0}")]
    DataError(#[from] attnskin_data::DataError),

    /// Core error.
    #[error("Core error: {0}")]
    CoreError(#[from] attnskin_core::CoreError),

    /// Metric computation error.
    #[error("Metric error: {0}")]
    Analysis(#[from] attnskin_analysis::AnalysisError),

    /// Metrics file error.
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// I/O error.
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// Serialization error.
    #[error("Serialization error: {0}")]
    SerializationError(String),
}
