//! # attnskin
//!
//! Attention-gated convolutional classifiers for dermoscopy images.
//!
//! A VGG or ResNet backbone produces feature maps at strides 8, 16 and 32.
//! Each one is scored against the global descriptor of the network by an
//! attention gate, the attended descriptors are fused and a linear head
//! produces the class logits.
//!
//! - **Data**: label CSVs, image decoding, oversampling, batched loading
//! - **Transforms**: resize, crop, flips and ISIC normalization
//! - **Models**: backbones, attention gates, stage fusion, checkpoints
//! - **Training**: SGD with step decay, cross-entropy and focal loss, callbacks
//! - **Analysis**: confusion matrix, precision/recall, mAP, ROC and AUC
//! - **Explainability**: attention statistics and upsampled display maps
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use attnskin::prelude::*;
//!
//! let train = LesionDataset::from_csv("train.csv", None)?.oversample();
//! let loader = ImageDataLoader::builder(train, PreprocessConfig::default().init()?)
//!     .batch_size(32)
//!     .shuffle(true)
//!     .build()?;
//!
//! let model = AttnClassifierConfig::new(2)
//!     .with_normalization(AttentionNormalization::Sigmoid)
//!     .init::<Autodiff<NdArray>>(&device)?;
//!
//! let mut trainer = Trainer::new(TrainingConfig::default(), device)?
//!     .with_callback(ProgressCallback::new())
//!     .with_output_dir("logs");
//! let output = trainer.fit(model, &loader, None)?;
//! ```
//!
//! ## Feature Flags
//!
//! - `backend-ndarray` (default): CPU backend using ndarray
//! - `backend-wgpu`: GPU backend using WGPU

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]

pub use attnskin_analysis as analysis;
pub use attnskin_core as core;
pub use attnskin_data as data;
pub use attnskin_explain as explain;
pub use attnskin_models as models;
pub use attnskin_train as train;
pub use attnskin_transforms as transforms;

/// Prelude module for convenient imports.
///
/// ```rust,ignore
/// use attnskin::prelude::*;
/// ```
pub mod prelude {
    // Core types
    pub use attnskin_core::{
        AttentionMap, AttentionNormalization, ClassifierOutput, ImageBatch, LesionClassifier,
        Result, Seed, Split,
    };

    // Data
    pub use attnskin_data::{ImageDataLoader, LesionDataset};

    // Transforms
    pub use attnskin_transforms::{Preprocess, PreprocessConfig};

    // Models
    pub use attnskin_models::{
        AttnClassifier, AttnClassifierConfig, BackboneKind, Compatibility, FusionMode,
    };

    // Training
    pub use attnskin_train::{
        evaluate, ExperimentConfig, LossConfig, ProgressCallback, Trainer, TrainingConfig,
    };

    // Analysis
    pub use attnskin_analysis::{ConfusionMatrix, EvaluationSummary};

    // Explain
    pub use attnskin_explain::{AttentionCapture, AttentionSummary};
}

/// All module for importing everything.
pub mod all {
    pub use super::prelude::*;

    pub use attnskin_analysis::{
        average_precision, confusion_matrix, mean_average_precision, roc_auc, roc_curve,
        ProbabilityTable, RocCurve, MELANOMA_CLASS,
    };
    pub use attnskin_core::{backend, ImageShape, Transform, N_ATTENTION_STAGES};
    pub use attnskin_data::{read_image, read_label_csv, LabelRecord};
    pub use attnskin_explain::{display_map, up_factors, upsample_attention, AttentionStats};
    pub use attnskin_models::{
        load_classifier, AttentionGate, AttentionGateConfig, BackboneConfig, CheckpointMetadata,
        FusionConfig, SigmoidScale, WeightInit,
    };
    pub use attnskin_train::{
        predict, Callback, CallbackContext, CallbackList, Criterion, FocalLoss, SchedulerConfig,
        StepLR, TerminateOnNanCallback,
    };
}
