//! Batched image tensors.

use burn::prelude::*;

use crate::error::{CoreError, Result};
use crate::shape::ImageShape;

/// A batch of images with their class labels.
///
/// This is the unit handed from the data loader to the model.
#[derive(Debug, Clone)]
pub struct ImageBatch<B: Backend> {
    /// Normalized images `(N, 3, H, W)`.
    pub images: Tensor<B, 4>,

    /// Integer class labels `(N,)`.
    pub labels: Tensor<B, 1, Int>,
}

impl<B: Backend> ImageBatch<B> {
    /// Create a batch, checking that images and labels agree on `N`.
    pub fn new(images: Tensor<B, 4>, labels: Tensor<B, 1, Int>) -> Result<Self> {
        let n_images = images.dims()[0];
        let n_labels = labels.dims()[0];

        if n_images != n_labels {
            return Err(CoreError::ShapeMismatch(format!(
                "images batch size {} != labels batch size {}",
                n_images, n_labels
            )));
        }

        Ok(Self { images, labels })
    }

    /// Build a batch from host buffers laid out as `(N, C, H, W)`.
    pub fn from_host(
        pixels: Vec<f32>,
        shape: ImageShape,
        labels: &[usize],
        device: &B::Device,
    ) -> Result<Self> {
        if pixels.len() != shape.numel() {
            return Err(CoreError::InvalidShape {
                expected: format!("{} values for {}", shape.numel(), shape),
                got: format!("{} values", pixels.len()),
            });
        }
        let images = Tensor::from_data(TensorData::new(pixels, shape.as_array()), device);
        let labels: Vec<i64> = labels.iter().map(|&l| l as i64).collect();
        let n = labels.len();
        let labels = Tensor::from_data(TensorData::new(labels, [n]), device);
        Self::new(images, labels)
    }

    /// Get the batch size.
    #[must_use]
    pub fn batch_size(&self) -> usize {
        self.images.dims()[0]
    }

    /// Shape of the image tensor.
    #[must_use]
    pub fn shape(&self) -> ImageShape {
        ImageShape::from(self.images.dims())
    }

    /// Get the device.
    pub fn device(&self) -> B::Device {
        self.images.device()
    }

    /// Move the batch to a device.
    pub fn to_device(self, device: &B::Device) -> Self {
        Self {
            images: self.images.to_device(device),
            labels: self.labels.to_device(device),
        }
    }
}
