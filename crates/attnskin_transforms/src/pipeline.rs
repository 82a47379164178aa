//! The preprocessing pipeline applied to every dermoscopy image.

use attnskin_core::{Compose, CoreError, Result, Split, Transform};
use image::RgbImage;
use ndarray::Array3;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

use crate::geometric::{CenterCrop, RandomCrop, RandomHorizontalFlip, RandomVerticalFlip, Resize};
use crate::tensor::{to_chw, Normalize, ISIC_MEAN, ISIC_STD};

/// Settings of [`Preprocess`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PreprocessConfig {
    /// Side length images are resized to before cropping.
    pub resize: u32,
    /// Side length of the crop fed to the network.
    pub crop: u32,
    /// Channel means.
    pub mean: [f32; 3],
    /// Channel standard deviations.
    pub std: [f32; 3],
    /// Random flips during training.
    pub flips: bool,
}

impl Default for PreprocessConfig {
    fn default() -> Self {
        Self {
            resize: 256,
            crop: 224,
            mean: ISIC_MEAN,
            std: ISIC_STD,
            flips: true,
        }
    }
}

impl PreprocessConfig {
    /// Build the pipeline.
    pub fn init(&self) -> Result<Preprocess> {
        if self.crop == 0 || self.crop > self.resize {
            return Err(CoreError::ConfigError(format!(
                "crop size {} must be in 1..={}",
                self.crop, self.resize
            )));
        }

        let mut spatial = Compose::new()
            .then(Resize::square(self.resize))
            .then(RandomCrop::new(self.crop))
            .then(CenterCrop::new(self.crop));
        if self.flips {
            spatial.push(RandomVerticalFlip::default());
            spatial.push(RandomHorizontalFlip::default());
        }

        Ok(Preprocess {
            spatial,
            normalize: Normalize::new(self.mean, self.std)?,
            crop: self.crop,
        })
    }
}

/// Resize, crop, flip, convert and normalize.
///
/// Training: resize, random crop, random vertical and horizontal flips.
/// Evaluation: resize, center crop. Both end with `[0, 1]` scaling and
/// per-channel standardization.
pub struct Preprocess {
    spatial: Compose<RgbImage>,
    normalize: Normalize,
    crop: u32,
}

impl Preprocess {
    /// The standard pipeline with ISIC statistics.
    pub fn isic(resize: u32, crop: u32) -> Result<Self> {
        PreprocessConfig {
            resize,
            crop,
            ..Default::default()
        }
        .init()
    }

    /// Side length of the output.
    #[must_use]
    pub fn output_size(&self) -> usize {
        self.crop as usize
    }

    /// Names of the image-level steps that run for `split`.
    pub fn steps(&self, split: Split) -> Vec<&str> {
        self.spatial.active_names(split)
    }

    /// Run the pipeline on one image, producing `(3, crop, crop)`.
    pub fn apply(&self, image: RgbImage, split: Split, rng: &mut ChaCha8Rng) -> Result<Array3<f32>> {
        let image = self.spatial.apply(image, split, rng)?;
        self.normalize.apply(to_chw(&image), split, rng)
    }
}
