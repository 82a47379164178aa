//! Error types for attnskin_models.

use attnskin_core::CoreError;
use thiserror::Error;

/// Result type alias using [`ModelError`].
pub type Result<T> = std::result::Result<T, ModelError>;

/// Errors raised while building a model from its configuration.
#[derive(Error, Debug)]
pub enum ModelError {
    /// The configuration describes a model that cannot be built.
    #[error("Invalid model configuration: {0}")]
    Config(String),

    /// Error from the core crate.
    #[error(transparent)]
    Core(#[from] CoreError),
}

impl From<ModelError> for CoreError {
    fn from(err: ModelError) -> Self {
        match err {
            ModelError::Core(inner) => inner,
            ModelError::Config(msg) => CoreError::ConfigError(msg),
        }
    }
}
