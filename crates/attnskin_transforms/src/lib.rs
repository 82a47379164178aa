//! # attnskin_transforms
//!
//! Image preprocessing and augmentation.
//!
//! This crate provides:
//! - Geometric transforms on decoded RGB images ([`geometric`])
//! - Conversion to `CHW` float arrays and channel normalization ([`tensor`])
//! - The dermoscopy preprocessing pipeline ([`Preprocess`])
//!
//! ## Example
//!
//! ```rust,ignore
//! use attnskin_transforms::Preprocess;
//! use attnskin_core::{Seed, Split};
//!
//! let preprocess = Preprocess::isic(256, 224);
//! let mut rng = Seed::new(0).to_rng();
//! let chw = preprocess.apply(image, Split::Train, &mut rng)?; // (3, 224, 224)
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod geometric;
mod pipeline;
pub mod tensor;

pub use geometric::{CenterCrop, RandomCrop, RandomHorizontalFlip, RandomVerticalFlip, Resize};
pub use pipeline::{Preprocess, PreprocessConfig};
pub use tensor::{to_chw, Normalize, ISIC_MEAN, ISIC_STD};
