//! Conversion of images to float arrays and channel normalization.

use attnskin_core::{CoreError, Result, Split, Transform};
use image::RgbImage;
use ndarray::{Array3, Axis};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

/// Per-channel mean of the ISIC 2017 training images (RGB, `[0, 1]` scale).
pub const ISIC_MEAN: [f32; 3] = [0.6916, 0.5459, 0.4865];

/// Per-channel standard deviation of the ISIC 2017 training images.
pub const ISIC_STD: [f32; 3] = [0.0834, 0.1164, 0.1322];

/// Convert an RGB image to a `(3, H, W)` array scaled to `[0, 1]`.
#[must_use]
pub fn to_chw(image: &RgbImage) -> Array3<f32> {
    let (w, h) = image.dimensions();
    let mut out = Array3::<f32>::zeros((3, h as usize, w as usize));
    for (x, y, pixel) in image.enumerate_pixels() {
        let (x, y) = (x as usize, y as usize);
        out[[0, y, x]] = f32::from(pixel[0]) / 255.0;
        out[[1, y, x]] = f32::from(pixel[1]) / 255.0;
        out[[2, y, x]] = f32::from(pixel[2]) / 255.0;
    }
    out
}

/// Standardize each channel: `(x - mean) / std`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Normalize {
    mean: [f32; 3],
    std: [f32; 3],
}

impl Normalize {
    /// Create a normalization with explicit statistics.
    ///
    /// # Errors
    ///
    /// Fails if any standard deviation is not a positive finite number.
    pub fn new(mean: [f32; 3], std: [f32; 3]) -> Result<Self> {
        if std.iter().any(|s| !s.is_finite() || *s <= 0.0) {
            return Err(CoreError::ConfigError(format!(
                "channel std must be positive, got {std:?}"
            )));
        }
        Ok(Self { mean, std })
    }

    /// Statistics of the ISIC 2017 training set.
    #[must_use]
    pub const fn isic() -> Self {
        Self {
            mean: ISIC_MEAN,
            std: ISIC_STD,
        }
    }

    /// Channel means.
    #[must_use]
    pub const fn mean(&self) -> [f32; 3] {
        self.mean
    }

    /// Channel standard deviations.
    #[must_use]
    pub const fn std(&self) -> [f32; 3] {
        self.std
    }
}

impl Default for Normalize {
    fn default() -> Self {
        Self::isic()
    }
}

impl Transform<Array3<f32>> for Normalize {
    fn apply(&self, mut input: Array3<f32>, _split: Split, _rng: &mut ChaCha8Rng) -> Result<Array3<f32>> {
        if input.shape()[0] != 3 {
            return Err(CoreError::InvalidShape {
                expected: "3 channels".into(),
                got: format!("{} channels", input.shape()[0]),
            });
        }
        for (c, mut channel) in input.axis_iter_mut(Axis(0)).enumerate() {
            let (mean, std) = (self.mean[c], self.std[c]);
            channel.mapv_inplace(|v| (v - mean) / std);
        }
        Ok(input)
    }

    fn name(&self) -> &str {
        "Normalize"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use attnskin_core::Seed;
    use image::Rgb;

    #[test]
    fn test_to_chw_layout() {
        let image = RgbImage::from_fn(3, 2, |x, y| Rgb([255, (x * 10) as u8, (y * 20) as u8]));
        let chw = to_chw(&image);
        assert_eq!(chw.shape(), &[3, 2, 3]);
        assert_eq!(chw[[0, 1, 2]], 1.0);
        assert!((chw[[1, 0, 2]] - 20.0 / 255.0).abs() < 1e-6);
        assert!((chw[[2, 1, 0]] - 20.0 / 255.0).abs() < 1e-6);
    }

    #[test]
    fn test_normalize_channels() {
        let norm = Normalize::new([0.5, 0.0, 1.0], [0.5, 1.0, 2.0]).unwrap();
        let input = Array3::<f32>::ones((3, 2, 2));
        let out = norm.apply(input, Split::Test, &mut Seed::new(0).to_rng()).unwrap();
        assert_eq!(out[[0, 0, 0]], 1.0);
        assert_eq!(out[[1, 1, 1]], 1.0);
        assert_eq!(out[[2, 0, 1]], 0.0);
    }

    #[test]
    fn test_normalize_rejects_bad_input() {
        assert!(Normalize::new([0.0; 3], [1.0, 0.0, 1.0]).is_err());
        let gray = Array3::<f32>::zeros((1, 2, 2));
        let err = Normalize::isic().apply(gray, Split::Train, &mut Seed::new(0).to_rng());
        assert!(err.is_err());
    }
}
