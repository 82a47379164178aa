//! # attnskin_core
//!
//! Core types and traits for attention-gated skin lesion classification.
//!
//! This crate provides:
//! - [`Seed`] for deterministic random number generation
//! - [`ImageShape`] for image batch shape metadata
//! - [`ImageBatch`] pairing an image tensor with its class labels
//! - [`Transform`] trait for per-sample preprocessing and augmentation
//! - [`LesionClassifier`] and [`AttentionMap`] describing what a model returns
//! - Error types and common utilities
//!
//! ## Shape Convention
//!
//! Image data follows the convention `(N, C, H, W)`:
//! - `N`: Batch size (number of images)
//! - `C`: Channels (3 for RGB input, feature channels inside the network)
//! - `H`, `W`: Spatial height and width
//!
//! Attention maps drop the channel axis and are `(N, H, W)`.
//!
//! ## Example
//!
//! ```rust,ignore
//! use attnskin_core::{ImageShape, Seed};
//!
//! let seed = Seed::new(0);
//! let shape = ImageShape::new(32, 3, 224, 224);
//! assert_eq!(shape.downsampled(8)?.spatial(), (28, 28));
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]

mod attention;
mod error;
mod model_trait;
mod seed;
mod shape;
mod split;
mod tensor;
mod transform;

pub use attention::{AttentionMap, AttentionNormalization};
pub use error::{CoreError, Result};
pub use model_trait::{ClassifierOutput, LesionClassifier, N_ATTENTION_STAGES};
pub use seed::Seed;
pub use shape::ImageShape;
pub use split::Split;
pub use tensor::ImageBatch;
pub use transform::{Compose, Identity, Transform};

/// Backend type aliases for convenience
pub mod backend {
    #[cfg(feature = "backend-ndarray")]
    pub use burn_ndarray::NdArray;

    #[cfg(feature = "backend-wgpu")]
    pub use burn_wgpu::Wgpu;
}
