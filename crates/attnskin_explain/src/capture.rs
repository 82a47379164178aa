//! Run a classifier once and keep what its attention gates produced.

use attnskin_core::{AttentionMap, LesionClassifier, Result, N_ATTENTION_STAGES};
use burn::prelude::*;

use crate::stats::AttentionSummary;
use crate::upsample::upsample_attention;

/// Attention captured from one forward pass over a display batch.
#[derive(Debug, Clone)]
pub struct AttentionCapture<B: Backend> {
    maps: [AttentionMap<B>; N_ATTENTION_STAGES],
    logits: Tensor<B, 2>,
    image_size: [usize; 2],
}

impl<B: Backend> AttentionCapture<B> {
    /// Forward `images` through `model` and keep the attention maps.
    pub fn capture<M: LesionClassifier<B>>(model: &M, images: Tensor<B, 4>) -> Result<Self> {
        let [_, _, h, w] = images.dims();
        let output = model.forward_attention(images)?;
        Ok(Self {
            maps: output.attention,
            logits: output.logits,
            image_size: [h, w],
        })
    }

    /// Map of a stage (0 is the shallowest).
    pub fn get(&self, stage: usize) -> Option<&AttentionMap<B>> {
        self.maps.get(stage)
    }

    /// All stage maps.
    pub fn maps(&self) -> &[AttentionMap<B>; N_ATTENTION_STAGES] {
        &self.maps
    }

    /// Logits of the captured pass.
    pub fn logits(&self) -> &Tensor<B, 2> {
        &self.logits
    }

    /// True if the model has attention switched off.
    pub fn is_disabled(&self) -> bool {
        self.maps.iter().all(|m| !m.is_computed())
    }

    /// Max/min/mean per stage.
    pub fn summary(&self) -> Result<AttentionSummary> {
        AttentionSummary::from_maps(&self.maps)
    }

    /// Display maps upsampled by `base_up_factor × {1, 2, 4}`.
    pub fn display_maps(&self, base_up_factor: usize) -> [Option<Tensor<B, 3>>; N_ATTENTION_STAGES] {
        let maps = upsample_attention(&self.maps, base_up_factor);
        for map in maps.iter().flatten() {
            let [_, h, w] = map.dims();
            if [h, w] != self.image_size {
                tracing::debug!(
                    "display map is {h}x{w}, images are {}x{}",
                    self.image_size[0],
                    self.image_size[1]
                );
            }
        }
        maps
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use attnskin_models::AttnClassifierConfig;
    use burn_ndarray::NdArray;

    type TestBackend = NdArray;

    #[test]
    fn test_capture_matches_image_resolution() {
        let device = Default::default();
        let model = AttnClassifierConfig::new(2)
            .with_base_width(2)
            .init::<TestBackend>(&device)
            .unwrap();
        let images = Tensor::<TestBackend, 4>::ones([2, 3, 64, 64], &device);

        let capture = AttentionCapture::capture(&model, images).unwrap();
        assert!(!capture.is_disabled());
        assert_eq!(capture.logits().dims(), [2, 2]);

        let summary = capture.summary().unwrap();
        for stats in summary.stages.iter().flatten() {
            assert!(stats.min <= stats.mean && stats.mean <= stats.max);
        }

        for map in capture.display_maps(8) {
            assert_eq!(map.unwrap().dims(), [2, 64, 64]);
        }
    }

    #[test]
    fn test_capture_without_attention() {
        let device = Default::default();
        let model = AttnClassifierConfig::new(2)
            .with_base_width(2)
            .with_attention(false)
            .init::<TestBackend>(&device)
            .unwrap();
        let images = Tensor::<TestBackend, 4>::ones([1, 3, 32, 32], &device);

        let capture = AttentionCapture::capture(&model, images).unwrap();
        assert!(capture.is_disabled());
        assert!(capture.summary().unwrap().is_disabled());
        assert!(capture.display_maps(8).iter().all(Option::is_none));
    }
}
