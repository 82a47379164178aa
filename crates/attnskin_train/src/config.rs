//! Experiment configuration.
//!
//! An [`ExperimentConfig`] bundles everything needed to reproduce a run. It is
//! written as `config.json` next to the checkpoints.

use std::path::{Path, PathBuf};

use attnskin_core::Seed;
use attnskin_models::AttnClassifierConfig;
use attnskin_transforms::PreprocessConfig;
use serde::{Deserialize, Serialize};

use crate::error::{Result, TrainError};
use crate::losses::LossConfig;
use crate::scheduler::SchedulerConfig;

/// Augmentation passes per epoch without oversampling.
pub const DEFAULT_NUM_AUG: usize = 8;
/// Augmentation passes per epoch with oversampling.
pub const OVERSAMPLED_NUM_AUG: usize = 5;

/// SGD settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptimizerConfig {
    /// Initial learning rate.
    pub lr: f64,
    /// Momentum factor.
    pub momentum: f64,
    /// L2 penalty.
    pub weight_decay: f32,
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        Self {
            lr: 0.01,
            momentum: 0.9,
            weight_decay: 5e-4,
        }
    }
}

/// Settings of the training loop.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainingConfig {
    /// Number of epochs.
    pub epochs: usize,
    /// Mini-batch size.
    pub batch_size: usize,
    /// Optimizer settings.
    pub optimizer: OptimizerConfig,
    /// Learning-rate schedule.
    pub scheduler: SchedulerConfig,
    /// Loss function.
    pub loss: LossConfig,
    /// Passes over the training set per epoch; `None` picks 8, or 5 with oversampling.
    pub num_aug: Option<usize>,
    /// Steps between monitoring passes; 0 disables them.
    pub log_every: usize,
    /// Balance classes by oversampling the training set.
    pub over_sample: bool,
    /// Batches prepared ahead of the loop; 0 loads inline.
    pub prefetch: usize,
    /// Master seed.
    pub seed: Seed,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            epochs: 50,
            batch_size: 32,
            optimizer: OptimizerConfig::default(),
            scheduler: SchedulerConfig::default(),
            loss: LossConfig::default(),
            num_aug: None,
            log_every: 10,
            over_sample: false,
            prefetch: 2,
            seed: Seed::default(),
        }
    }
}

impl TrainingConfig {
    /// Passes over the training set per epoch.
    pub fn augmentation_passes(&self) -> usize {
        self.num_aug.unwrap_or(if self.over_sample {
            OVERSAMPLED_NUM_AUG
        } else {
            DEFAULT_NUM_AUG
        })
    }

    /// Epoch whose weights are kept as a separate snapshot.
    pub fn milestone_epoch(&self) -> usize {
        self.epochs / 2
    }

    /// Check the settings.
    ///
    /// # Errors
    ///
    /// Returns an error for zero epochs, batch size or augmentation passes,
    /// and for invalid rates, momentum or schedules.
    pub fn validate(&self) -> Result<()> {
        if self.epochs == 0 {
            return Err(TrainError::Config("epochs must be > 0".into()));
        }
        if self.batch_size == 0 {
            return Err(TrainError::Config("batch_size must be > 0".into()));
        }
        if self.augmentation_passes() == 0 {
            return Err(TrainError::Config("num_aug must be > 0".into()));
        }
        if !(0.0..1.0).contains(&self.optimizer.momentum) {
            return Err(TrainError::Config(format!(
                "momentum must be in [0, 1), got {}",
                self.optimizer.momentum
            )));
        }
        if self.optimizer.weight_decay < 0.0 {
            return Err(TrainError::Config("weight_decay must be >= 0".into()));
        }
        self.scheduler.init(self.optimizer.lr)?;
        Ok(())
    }
}

/// Where the images come from.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DataConfig {
    /// CSV listing training images and labels.
    pub train_csv: Option<PathBuf>,
    /// CSV listing test images and labels.
    pub test_csv: Option<PathBuf>,
    /// Directory relative image paths are resolved against.
    pub image_root: Option<PathBuf>,
    /// Image preprocessing.
    pub preprocess: PreprocessConfig,
}

/// A complete, reproducible experiment description.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExperimentConfig {
    /// Model architecture.
    pub model: AttnClassifierConfig,
    /// Training loop.
    pub training: TrainingConfig,
    /// Data sources and preprocessing.
    pub data: DataConfig,
    /// Output directory for checkpoints and metrics.
    pub output_dir: PathBuf,
    /// Upsampling factor of the shallowest attention map; deeper maps use 2x and 4x.
    pub base_up_factor: usize,
}

impl Default for ExperimentConfig {
    fn default() -> Self {
        Self {
            model: AttnClassifierConfig::default(),
            training: TrainingConfig::default(),
            data: DataConfig::default(),
            output_dir: PathBuf::from("logs"),
            base_up_factor: 8,
        }
    }
}

impl ExperimentConfig {
    /// Validate every section.
    ///
    /// # Errors
    ///
    /// Returns the first configuration error found.
    pub fn validate(&self) -> Result<()> {
        self.model.validate()?;
        self.training.validate()?;
        self.training.loss.init(self.model.n_classes)?;
        self.data.preprocess.init()?;
        if self.base_up_factor == 0 {
            return Err(TrainError::Config("base_up_factor must be > 0".into()));
        }
        Ok(())
    }

    /// Save as pretty JSON.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let json = serde_json::to_string_pretty(self)
            .map_err(|e| TrainError::SerializationError(e.to_string()))?;
        std::fs::write(path, json)?;
        Ok(())
    }

    /// Load from JSON. Missing fields take their defaults.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        serde_json::from_str(&json).map_err(|e| TrainError::SerializationError(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ExperimentConfig::default();
        assert_eq!(config.training.epochs, 50);
        assert_eq!(config.training.batch_size, 32);
        assert!((config.training.optimizer.lr - 0.01).abs() < 1e-12);
        assert_eq!(config.training.augmentation_passes(), 8);
        assert_eq!(config.training.milestone_epoch(), 25);
        assert_eq!(config.base_up_factor, 8);
        config.validate().unwrap();
    }

    #[test]
    fn test_oversampling_changes_passes() {
        let training = TrainingConfig {
            over_sample: true,
            ..Default::default()
        };
        assert_eq!(training.augmentation_passes(), 5);
        let explicit = TrainingConfig {
            over_sample: true,
            num_aug: Some(2),
            ..Default::default()
        };
        assert_eq!(explicit.augmentation_passes(), 2);
    }

    #[test]
    fn test_invalid() {
        let mut config = ExperimentConfig::default();
        config.training.batch_size = 0;
        assert!(config.validate().is_err());

        let mut config = ExperimentConfig::default();
        config.training.optimizer.lr = -1.0;
        assert!(matches!(
            config.validate(),
            Err(TrainError::InvalidLearningRate(_))
        ));

        let mut config = ExperimentConfig::default();
        config.model.n_classes = 1;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_save_load_partial_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        let mut config = ExperimentConfig::default();
        config.training.epochs = 3;
        config.save(&path).unwrap();
        let loaded = ExperimentConfig::load(&path).unwrap();
        assert_eq!(loaded.training.epochs, 3);

        std::fs::write(&path, r#"{"training": {"epochs": 7}}"#).unwrap();
        let partial = ExperimentConfig::load(&path).unwrap();
        assert_eq!(partial.training.epochs, 7);
        assert_eq!(partial.training.batch_size, 32);
    }
}
