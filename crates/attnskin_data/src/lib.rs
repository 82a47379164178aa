//! # attnskin_data
//!
//! Datasets and dataloaders for dermoscopy images.
//!
//! This crate provides:
//! - [`LesionDataset`] for labelled images listed in a CSV file or held in memory
//! - [`ImageDataLoader`] for shuffled, augmented, parallel batch preparation
//! - I/O helpers for label files and image decoding
//!
//! ## Example
//!
//! ```rust,ignore
//! use attnskin_data::{ImageDataLoader, LesionDataset};
//! use attnskin_transforms::Preprocess;
//! use attnskin_core::{Seed, Split};
//!
//! let train = LesionDataset::from_csv("train.csv", None)?;
//! let loader = ImageDataLoader::builder(train, Preprocess::isic(256, 224)?)
//!     .batch_size(32)
//!     .shuffle(true)
//!     .seed(Seed::new(0))
//!     .build()?;
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]

mod dataset;
mod error;
mod io;
mod loader;

pub use dataset::{ImageSource, LesionDataset, LesionSample};
pub use error::{DataError, Result};
pub use io::{read_image, read_label_csv, LabelRecord};
pub use loader::{HostBatch, ImageDataLoader, ImageDataLoaderBuilder, ImageDataLoaderIter};
