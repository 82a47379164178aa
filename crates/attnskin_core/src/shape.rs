//! Image batch shape metadata.

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, Result};

/// Shape metadata for image and feature-map tensors.
///
/// Follows the convention `(N, C, H, W)`.
///
/// # Example
///
/// ```rust
/// use attnskin_core::ImageShape;
///
/// let shape = ImageShape::new(4, 3, 224, 224);
/// assert_eq!(shape.batch(), 4);
/// assert_eq!(shape.channels(), 3);
/// assert_eq!(shape.spatial(), (224, 224));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ImageShape {
    batch: usize,
    channels: usize,
    height: usize,
    width: usize,
}

impl ImageShape {
    /// Create a new shape with the specified dimensions.
    #[must_use]
    pub const fn new(batch: usize, channels: usize, height: usize, width: usize) -> Self {
        Self {
            batch,
            channels,
            height,
            width,
        }
    }

    /// Create a shape from a slice of exactly four dimensions `[N, C, H, W]`.
    ///
    /// # Errors
    ///
    /// Returns an error if the slice doesn't contain exactly 4 elements.
    pub fn from_dims(dims: &[usize]) -> Result<Self> {
        match dims {
            &[n, c, h, w] => Ok(Self::new(n, c, h, w)),
            _ => Err(CoreError::DimensionError {
                expected: 4,
                got: dims.len(),
            }),
        }
    }

    /// Get the batch size.
    #[must_use]
    pub const fn batch(&self) -> usize {
        self.batch
    }

    /// Get the number of channels.
    #[must_use]
    pub const fn channels(&self) -> usize {
        self.channels
    }

    /// Get the spatial extent as `(height, width)`.
    #[must_use]
    pub const fn spatial(&self) -> (usize, usize) {
        (self.height, self.width)
    }

    /// Number of spatial locations, `H * W`.
    #[must_use]
    pub const fn locations(&self) -> usize {
        self.height * self.width
    }

    /// Check if any dimension is zero.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.batch == 0 || self.channels == 0 || self.height == 0 || self.width == 0
    }

    /// Get the total number of elements.
    #[must_use]
    pub const fn numel(&self) -> usize {
        self.batch * self.channels * self.height * self.width
    }

    /// Convert to an array.
    #[must_use]
    pub const fn as_array(&self) -> [usize; 4] {
        [self.batch, self.channels, self.height, self.width]
    }

    /// Create a new shape with a different number of channels.
    #[must_use]
    pub const fn with_channels(&self, channels: usize) -> Self {
        Self {
            channels,
            ..*self
        }
    }

    /// Spatial shape after an overall stride of `factor`.
    ///
    /// # Errors
    ///
    /// Returns an error if `factor` is zero or does not divide both spatial sides.
    pub fn downsampled(&self, factor: usize) -> Result<Self> {
        if factor == 0 || self.height % factor != 0 || self.width % factor != 0 {
            return Err(CoreError::InvalidShape {
                expected: format!("spatial size divisible by {factor}"),
                got: format!("{}x{}", self.height, self.width),
            });
        }
        Ok(Self {
            height: self.height / factor,
            width: self.width / factor,
            ..*self
        })
    }
}

impl std::fmt::Display for ImageShape {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "(N={}, C={}, H={}, W={})",
            self.batch, self.channels, self.height, self.width
        )
    }
}

impl From<[usize; 4]> for ImageShape {
    fn from([batch, channels, height, width]: [usize; 4]) -> Self {
        Self::new(batch, channels, height, width)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shape_from_dims() {
        let shape = ImageShape::from_dims(&[4, 3, 224, 224]).unwrap();
        assert_eq!(shape.as_array(), [4, 3, 224, 224]);

        assert!(ImageShape::from_dims(&[4, 3, 224]).is_err());
        assert!(ImageShape::from_dims(&[4, 3, 224, 224, 1]).is_err());
    }

    #[test]
    fn test_stage_resolutions() {
        let input = ImageShape::new(4, 3, 224, 224);
        assert_eq!(input.downsampled(8).unwrap().spatial(), (28, 28));
        assert_eq!(input.downsampled(16).unwrap().spatial(), (14, 14));
        assert_eq!(input.downsampled(32).unwrap().spatial(), (7, 7));
        assert!(input.downsampled(0).is_err());
        assert!(ImageShape::new(1, 3, 100, 100).downsampled(32).is_err());
    }

    #[test]
    fn test_shape_is_empty() {
        assert!(!ImageShape::new(1, 3, 8, 8).is_empty());
        assert!(ImageShape::new(0, 3, 8, 8).is_empty());
        assert!(ImageShape::new(1, 3, 0, 8).is_empty());
    }

    #[test]
    fn test_display() {
        let shape = ImageShape::new(2, 64, 28, 28).with_channels(128);
        assert_eq!(shape.to_string(), "(N=2, C=128, H=28, W=28)");
        assert_eq!(shape.locations(), 784);
    }
}
