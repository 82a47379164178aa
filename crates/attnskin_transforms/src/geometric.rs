//! Geometric transforms on decoded RGB images.
//!
//! Random transforms only run on the training split; the crops come as a
//! pair so one pipeline serves both splits: [`RandomCrop`] for training,
//! [`CenterCrop`] for evaluation.

use attnskin_core::{CoreError, Result, Split, Transform};
use image::imageops::{self, FilterType};
use image::RgbImage;
use rand::Rng;
use rand_chacha::ChaCha8Rng;

/// Resize to a fixed `width x height`, ignoring aspect ratio.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Resize {
    width: u32,
    height: u32,
}

impl Resize {
    /// Resize to a square of side `size`.
    #[must_use]
    pub const fn square(size: u32) -> Self {
        Self {
            width: size,
            height: size,
        }
    }

    /// Resize to `width x height`.
    #[must_use]
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

impl Transform<RgbImage> for Resize {
    fn apply(&self, input: RgbImage, _split: Split, _rng: &mut ChaCha8Rng) -> Result<RgbImage> {
        if input.dimensions() == (self.width, self.height) {
            return Ok(input);
        }
        Ok(imageops::resize(&input, self.width, self.height, FilterType::Triangle))
    }

    fn name(&self) -> &str {
        "Resize"
    }
}

fn crop_checked(input: &RgbImage, x: u32, y: u32, size: u32) -> Result<RgbImage> {
    let (w, h) = input.dimensions();
    if size > w || size > h {
        return Err(CoreError::TransformError(format!(
            "cannot crop {size}x{size} from a {w}x{h} image"
        )));
    }
    Ok(imageops::crop_imm(input, x, y, size, size).to_image())
}

/// Square crop at a uniformly random position. Training only.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RandomCrop {
    size: u32,
}

impl RandomCrop {
    /// Crop a `size x size` patch.
    #[must_use]
    pub const fn new(size: u32) -> Self {
        Self { size }
    }
}

impl Transform<RgbImage> for RandomCrop {
    fn apply(&self, input: RgbImage, _split: Split, rng: &mut ChaCha8Rng) -> Result<RgbImage> {
        let (w, h) = input.dimensions();
        let max_x = w.saturating_sub(self.size);
        let max_y = h.saturating_sub(self.size);
        let x = rng.gen_range(0..=max_x);
        let y = rng.gen_range(0..=max_y);
        crop_checked(&input, x, y, self.size)
    }

    fn name(&self) -> &str {
        "RandomCrop"
    }

    fn should_apply(&self, split: Split) -> bool {
        split.is_train()
    }
}

/// Square crop at the image center. Evaluation only.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CenterCrop {
    size: u32,
}

impl CenterCrop {
    /// Crop a `size x size` patch.
    #[must_use]
    pub const fn new(size: u32) -> Self {
        Self { size }
    }
}

impl Transform<RgbImage> for CenterCrop {
    fn apply(&self, input: RgbImage, _split: Split, _rng: &mut ChaCha8Rng) -> Result<RgbImage> {
        let (w, h) = input.dimensions();
        let x = w.saturating_sub(self.size) / 2;
        let y = h.saturating_sub(self.size) / 2;
        crop_checked(&input, x, y, self.size)
    }

    fn name(&self) -> &str {
        "CenterCrop"
    }

    fn should_apply(&self, split: Split) -> bool {
        split.is_eval()
    }
}

/// Mirror left-right with probability `p`. Training only.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RandomHorizontalFlip {
    p: f64,
}

impl RandomHorizontalFlip {
    /// Flip with probability `p`.
    #[must_use]
    pub const fn new(p: f64) -> Self {
        Self { p }
    }
}

impl Default for RandomHorizontalFlip {
    fn default() -> Self {
        Self::new(0.5)
    }
}

impl Transform<RgbImage> for RandomHorizontalFlip {
    fn apply(&self, input: RgbImage, _split: Split, rng: &mut ChaCha8Rng) -> Result<RgbImage> {
        if rng.gen_bool(self.p.clamp(0.0, 1.0)) {
            Ok(imageops::flip_horizontal(&input))
        } else {
            Ok(input)
        }
    }

    fn name(&self) -> &str {
        "RandomHorizontalFlip"
    }

    fn should_apply(&self, split: Split) -> bool {
        split.is_train()
    }
}

/// Mirror top-bottom with probability `p`. Training only.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RandomVerticalFlip {
    p: f64,
}

impl RandomVerticalFlip {
    /// Flip with probability `p`.
    #[must_use]
    pub const fn new(p: f64) -> Self {
        Self { p }
    }
}

impl Default for RandomVerticalFlip {
    fn default() -> Self {
        Self::new(0.5)
    }
}

impl Transform<RgbImage> for RandomVerticalFlip {
    fn apply(&self, input: RgbImage, _split: Split, rng: &mut ChaCha8Rng) -> Result<RgbImage> {
        if rng.gen_bool(self.p.clamp(0.0, 1.0)) {
            Ok(imageops::flip_vertical(&input))
        } else {
            Ok(input)
        }
    }

    fn name(&self) -> &str {
        "RandomVerticalFlip"
    }

    fn should_apply(&self, split: Split) -> bool {
        split.is_train()
    }
}
