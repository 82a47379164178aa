//! Model checkpointing.
//!
//! Weights are stored with Burn's named MessagePack recorder (`*.mpk`); the
//! model configuration travels in a JSON sidecar so a checkpoint can be
//! rebuilt without knowing how it was trained.
//!
//! # Example
//!
//! ```rust,ignore
//! use attnskin_models::checkpoint::{load_classifier, CheckpointMetadata, ModelCheckpoint};
//!
//! model.save_checkpoint(dir.join("net.mpk"))?;
//! CheckpointMetadata::new(&config).with_epoch(3).save(dir.join("net.json"))?;
//!
//! let model = load_classifier::<NdArray>(dir.join("net.mpk"), dir.join("net.json"), &device)?;
//! ```

use std::path::Path;

use burn::module::Module;
use burn::prelude::*;
use burn::record::{FullPrecisionSettings, NamedMpkFileRecorder};
use serde::{Deserialize, Serialize};

use crate::classifier::{AttnClassifier, AttnClassifierConfig};
use crate::error::ModelError;

type Recorder = NamedMpkFileRecorder<FullPrecisionSettings>;

/// Save a model's weights.
pub fn save_model<B, M>(model: &M, path: impl AsRef<Path>) -> Result<()>
where
    B: Backend,
    M: Module<B>,
{
    model
        .clone()
        .save_file(path.as_ref().to_path_buf(), &Recorder::new())
        .map_err(|e| CheckpointError::Save(e.to_string()))
}

/// Load saved weights into `model`.
pub fn load_model<B, M>(model: M, path: impl AsRef<Path>, device: &B::Device) -> Result<M>
where
    B: Backend,
    M: Module<B>,
{
    model
        .load_file(path.as_ref().to_path_buf(), &Recorder::new(), device)
        .map_err(|e| CheckpointError::Load(e.to_string()))
}

/// Rebuild a classifier from its weights and metadata sidecar.
pub fn load_classifier<B: Backend>(
    weights: impl AsRef<Path>,
    metadata: impl AsRef<Path>,
    device: &B::Device,
) -> Result<AttnClassifier<B>> {
    let metadata = CheckpointMetadata::load(metadata)?;
    let model = metadata.config.init::<B>(device)?;
    model.load_checkpoint(weights, device)
}

/// Model checkpoint metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckpointMetadata {
    /// Model configuration.
    pub config: AttnClassifierConfig,
    /// Training epoch (if applicable).
    pub epoch: Option<usize>,
    /// Test accuracy (if applicable).
    pub test_accuracy: Option<f32>,
    /// Melanoma AUC (if applicable).
    pub test_auc: Option<f32>,
    /// Additional metadata.
    pub extra: std::collections::BTreeMap<String, String>,
}

impl CheckpointMetadata {
    /// Create new metadata for a model.
    pub fn new(config: &AttnClassifierConfig) -> Self {
        Self {
            config: config.clone(),
            epoch: None,
            test_accuracy: None,
            test_auc: None,
            extra: Default::default(),
        }
    }

    /// Set the training epoch.
    #[must_use]
    pub fn with_epoch(mut self, epoch: usize) -> Self {
        self.epoch = Some(epoch);
        self
    }

    /// Set the test accuracy.
    #[must_use]
    pub fn with_test_accuracy(mut self, accuracy: f32) -> Self {
        self.test_accuracy = Some(accuracy);
        self
    }

    /// Set the test AUC.
    #[must_use]
    pub fn with_test_auc(mut self, auc: f32) -> Self {
        self.test_auc = Some(auc);
        self
    }

    /// Add extra metadata.
    #[must_use]
    pub fn with_extra(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.extra.insert(key.into(), value.into());
        self
    }

    /// Save metadata to a JSON file.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let json = serde_json::to_string_pretty(self)
            .map_err(|e| CheckpointError::Save(e.to_string()))?;
        std::fs::write(path, json).map_err(|e| CheckpointError::Save(e.to_string()))?;
        Ok(())
    }

    /// Load metadata from a JSON file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let json =
            std::fs::read_to_string(path).map_err(|e| CheckpointError::Load(e.to_string()))?;
        serde_json::from_str(&json).map_err(|e| CheckpointError::Load(e.to_string()))
    }
}

/// Result type for checkpoint operations.
pub type Result<T> = std::result::Result<T, CheckpointError>;

/// Checkpoint-related errors.
#[derive(Debug, thiserror::Error)]
pub enum CheckpointError {
    /// Error saving checkpoint.
    #[error("Failed to save checkpoint: {0}")]
    Save(String),

    /// Error loading checkpoint.
    #[error("Failed to load checkpoint: {0}")]
    Load(String),

    /// The stored configuration cannot be built.
    #[error(transparent)]
    Model(#[from] ModelError),
}

/// Extension trait for models to add checkpoint methods.
pub trait ModelCheckpoint<B: Backend>: Module<B> {
    /// Save the model to a checkpoint file.
    fn save_checkpoint(&self, path: impl AsRef<Path>) -> Result<()> {
        save_model::<B, Self>(self, path)
    }

    /// Load weights from a checkpoint into a copy of this model.
    fn load_checkpoint(&self, path: impl AsRef<Path>, device: &B::Device) -> Result<Self> {
        load_model::<B, Self>(self.clone(), path, device)
    }
}

impl<B: Backend, M: Module<B>> ModelCheckpoint<B> for M {}

#[cfg(test)]
mod tests {
    use super::*;
    use attnskin_core::LesionClassifier;
    use burn_ndarray::NdArray;

    type TestBackend = NdArray;

    #[test]
    fn test_checkpoint_metadata() {
        let config = AttnClassifierConfig::new(2);
        let meta = CheckpointMetadata::new(&config)
            .with_epoch(10)
            .with_test_accuracy(0.82)
            .with_test_auc(0.77)
            .with_extra("dataset", "ISIC2017");

        assert_eq!(meta.epoch, Some(10));
        assert_eq!(meta.test_accuracy, Some(0.82));
        assert_eq!(meta.test_auc, Some(0.77));
        assert_eq!(meta.extra.get("dataset"), Some(&"ISIC2017".to_string()));
    }

    #[test]
    fn test_save_and_reload_classifier() {
        let dir = tempfile::tempdir().unwrap();
        let device = Default::default();
        let config = AttnClassifierConfig::new(2).with_base_width(2);
        let model = config.init::<TestBackend>(&device).unwrap();

        model.save_checkpoint(dir.path().join("net.mpk")).unwrap();
        CheckpointMetadata::new(&config)
            .with_epoch(1)
            .save(dir.path().join("net.json"))
            .unwrap();

        let restored = load_classifier::<TestBackend>(
            dir.path().join("net.mpk"),
            dir.path().join("net.json"),
            &device,
        )
        .unwrap();

        let x = Tensor::<TestBackend, 4>::ones([1, 3, 32, 32], &device);
        let a = model.forward(x.clone()).unwrap().into_data().convert::<f32>().to_vec::<f32>().unwrap();
        let b = restored.forward(x).unwrap().into_data().convert::<f32>().to_vec::<f32>().unwrap();
        for (a, b) in a.iter().zip(&b) {
            assert!((a - b).abs() < 1e-6);
        }
    }

    #[test]
    fn test_missing_checkpoint_is_load_error() {
        let result = CheckpointMetadata::load("/nonexistent/net.json");
        assert!(matches!(result, Err(CheckpointError::Load(_))));
    }
}
