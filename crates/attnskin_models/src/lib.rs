//! # attnskin_models
//!
//! Attention-gated convolutional classifiers for skin lesion images.
//!
//! ## Architecture
//!
//! - **Backbones** ([`backbone`]): VGG-16 and ResNet feature extractors that
//!   expose stage maps at strides 8, 16 and 32 plus a global descriptor
//! - **Attention gates** ([`attention`]): score each location of a stage map
//!   against the global descriptor and pool by the normalized scores
//! - **Normalizers** ([`normalize`]): softmax or sigmoid attention
//! - **Fusion** ([`fusion`]): combine the three pooled stage vectors
//! - **Classifier** ([`AttnClassifier`]): everything wired together
//!
//! ## Example
//!
//! ```rust,ignore
//! use attnskin_models::{AttnClassifierConfig, BackboneKind};
//! use attnskin_core::LesionClassifier;
//!
//! let config = AttnClassifierConfig::new(2).with_backbone(BackboneKind::ResNet);
//! let model = config.init::<NdArray>(&device)?;
//! let out = model.forward_attention(images)?;
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod attention;
pub mod backbone;
pub mod checkpoint;
pub mod classifier;
mod error;
pub mod fusion;
pub mod init;
pub mod normalize;

pub use attention::{AttentionGate, AttentionGateConfig, Compatibility, GateOutput};
pub use backbone::{Backbone, BackboneConfig, BackboneFeatures, BackboneKind, FeatureExtractor};
pub use checkpoint::{
    load_classifier, load_model, save_model, CheckpointError, CheckpointMetadata, ModelCheckpoint,
};
pub use classifier::{spatial_mean, AttnClassifier, AttnClassifierConfig};
pub use error::{ModelError, Result};
pub use fusion::{FusionConfig, FusionMode, StageFusion};
pub use init::WeightInit;
pub use normalize::{Normalize, Normalizer, SigmoidNormalizer, SigmoidScale, SoftmaxNormalizer};
