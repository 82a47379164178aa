//! Model traits for training and evaluation.
//!
//! Defines what a lesion classifier returns so the training loop and the
//! attention inspection tools stay independent of any concrete architecture.

use burn::prelude::*;

use crate::attention::AttentionMap;
use crate::error::Result;

/// Number of backbone stages carrying an attention gate.
pub const N_ATTENTION_STAGES: usize = 3;

/// Everything a forward pass produces.
#[derive(Debug, Clone)]
pub struct ClassifierOutput<B: Backend> {
    /// Class logits `(N, n_classes)`.
    pub logits: Tensor<B, 2>,
    /// Attention per stage, shallowest first (`/8`, `/16`, `/32`).
    pub attention: [AttentionMap<B>; N_ATTENTION_STAGES],
    /// Pooled stage descriptors `(N, C_l)`, shallowest first.
    pub pooled: [Tensor<B, 2>; N_ATTENTION_STAGES],
}

/// Trait for skin lesion classification models.
///
/// Implemented for every backend so a model trained on an autodiff backend
/// can be evaluated through its inner module.
pub trait LesionClassifier<B: Backend>: Module<B> + Clone + Send {
    /// Forward pass returning logits, attention maps and pooled descriptors.
    ///
    /// # Arguments
    ///
    /// * `images` - Input tensor of shape (N, 3, H, W)
    ///
    /// # Errors
    ///
    /// Returns a shape error when the input does not match the configured
    /// channel counts.
    fn forward_attention(&self, images: Tensor<B, 4>) -> Result<ClassifierOutput<B>>;

    /// Forward pass returning logits `(N, n_classes)`.
    fn forward(&self, images: Tensor<B, 4>) -> Result<Tensor<B, 2>> {
        Ok(self.forward_attention(images)?.logits)
    }

    /// Forward pass returning class probabilities.
    fn forward_probs(&self, images: Tensor<B, 4>) -> Result<Tensor<B, 2>> {
        let logits = self.forward(images)?;
        Ok(burn::tensor::activation::softmax(logits, 1))
    }

    /// Number of output classes.
    fn n_classes(&self) -> usize;
}
