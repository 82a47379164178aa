//! # attnskin_explain
//!
//! Inspection tools for the attention gates of a lesion classifier.
//!
//! This crate provides:
//! - [`AttentionCapture`] to run a display batch and keep its attention maps
//! - Per-stage max/min/mean statistics
//! - Bilinear upsampling of the maps to image resolution, stretched per image
//!   for softmax attention

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]

mod capture;
mod stats;
mod upsample;

pub use capture::AttentionCapture;
pub use stats::{AttentionStats, AttentionSummary};
pub use upsample::{display_map, min_max_per_image, up_factors, upsample, upsample_attention};
