//! # attnskin_train
//!
//! Training loop, losses, schedules and evaluation for attention-gated
//! lesion classifiers.
//!
//! This crate provides:
//! - [`Trainer`] running SGD with augmentation passes, monitoring and checkpoints
//! - Cross-entropy and focal losses
//! - Step and constant learning-rate schedules
//! - A callback system with progress logging and NaN termination
//! - Evaluation producing `test_results.csv` and an [`EvaluationSummary`]
//! - [`ExperimentConfig`], the serializable description of a run
//!
//! ## Example
//!
//! ```rust,ignore
//! use attnskin_train::{ExperimentConfig, ProgressCallback, TerminateOnNanCallback, Trainer};
//!
//! let config = ExperimentConfig::default();
//! let model = config.model.init::<Autodiff<NdArray>>(&device)?;
//! let mut trainer = Trainer::<Autodiff<NdArray>>::new(config.training.clone(), device)?
//!     .with_callback(ProgressCallback::new())
//!     .with_callback(TerminateOnNanCallback::new())
//!     .with_output_dir(&config.output_dir);
//! let output = trainer.fit(model, &train_loader, Some(&test_loader))?;
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod callback;
pub mod config;
pub mod error;
pub mod evaluation;
pub mod losses;
pub mod metrics;
pub mod scheduler;
pub mod state;
pub mod trainer;

pub use attnskin_analysis::EvaluationSummary;
pub use callback::{Callback, CallbackContext, CallbackList, ProgressCallback, TerminateOnNanCallback};
pub use config::{DataConfig, ExperimentConfig, OptimizerConfig, TrainingConfig};
pub use error::{Result, TrainError};
pub use evaluation::{
    check_labels, evaluate, predict, read_probabilities, write_probabilities, Predictions,
    TEST_RESULTS_FILE,
};
pub use losses::{Criterion, CrossEntropyLoss, FocalLoss, LossConfig};
pub use metrics::{batch_accuracy, RunningAverage};
pub use scheduler::{ConstantLR, Scheduler, SchedulerConfig, StepLR};
pub use state::TrainingState;
pub use trainer::{
    has_checkpoint, milestone_checkpoint, Trainer, TrainingOutput, LATEST_CHECKPOINT,
    LATEST_METADATA,
};
