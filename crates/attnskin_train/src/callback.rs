//! Callback system for training hooks.

use std::collections::BTreeMap;

use crate::error::Result;

/// Context passed to callbacks containing training state.
#[derive(Debug, Clone)]
pub struct CallbackContext {
    /// Current epoch (0-indexed).
    pub epoch: usize,
    /// Total number of epochs.
    pub n_epochs: usize,
    /// Global optimizer step.
    pub step: usize,
    /// Current learning rate.
    pub lr: f64,
    /// Loss of the last training batch.
    pub train_loss: Option<f32>,
    /// Mean training loss of the finished epoch.
    pub epoch_loss: Option<f32>,
    /// Evaluation metrics of the finished epoch.
    pub metrics: BTreeMap<String, f32>,
    /// Whether to stop training.
    pub stop_training: bool,
}

impl CallbackContext {
    /// Create a new callback context.
    pub fn new(n_epochs: usize) -> Self {
        Self {
            epoch: 0,
            n_epochs,
            step: 0,
            lr: 0.0,
            train_loss: None,
            epoch_loss: None,
            metrics: BTreeMap::new(),
            stop_training: false,
        }
    }
}

/// Trait for training callbacks.
///
/// Callbacks allow customization of the training loop at various points.
pub trait Callback: Send {
    /// Called before training starts.
    fn before_fit(&mut self, _ctx: &mut CallbackContext) -> Result<()> {
        Ok(())
    }

    /// Called after training completes.
    fn after_fit(&mut self, _ctx: &mut CallbackContext) -> Result<()> {
        Ok(())
    }

    /// Called before each epoch.
    fn before_epoch(&mut self, _ctx: &mut CallbackContext) -> Result<()> {
        Ok(())
    }

    /// Called after each epoch, once evaluation metrics are in the context.
    fn after_epoch(&mut self, _ctx: &mut CallbackContext) -> Result<()> {
        Ok(())
    }

    /// Called after each training batch, once its loss is known.
    fn after_batch(&mut self, _ctx: &mut CallbackContext) -> Result<()> {
        Ok(())
    }

    /// Get the callback name.
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }
}

/// A list of callbacks.
#[derive(Default)]
pub struct CallbackList {
    callbacks: Vec<Box<dyn Callback>>,
}

impl CallbackList {
    /// Create a new empty callback list.
    pub fn new() -> Self {
        Self {
            callbacks: Vec::new(),
        }
    }

    /// Add a callback.
    pub fn add<C: Callback + 'static>(&mut self, callback: C) {
        self.callbacks.push(Box::new(callback));
    }

    /// Number of registered callbacks.
    pub fn len(&self) -> usize {
        self.callbacks.len()
    }

    /// True if no callback is registered.
    pub fn is_empty(&self) -> bool {
        self.callbacks.is_empty()
    }

    /// Call before_fit on all callbacks.
    pub fn before_fit(&mut self, ctx: &mut CallbackContext) -> Result<()> {
        self.callbacks.iter_mut().try_for_each(|cb| cb.before_fit(ctx))
    }

    /// Call after_fit on all callbacks.
    pub fn after_fit(&mut self, ctx: &mut CallbackContext) -> Result<()> {
        self.callbacks.iter_mut().try_for_each(|cb| cb.after_fit(ctx))
    }

    /// Call before_epoch on all callbacks.
    pub fn before_epoch(&mut self, ctx: &mut CallbackContext) -> Result<()> {
        self.callbacks.iter_mut().try_for_each(|cb| cb.before_epoch(ctx))
    }

    /// Call after_epoch on all callbacks.
    pub fn after_epoch(&mut self, ctx: &mut CallbackContext) -> Result<()> {
        self.callbacks.iter_mut().try_for_each(|cb| cb.after_epoch(ctx))
    }

    /// Call after_batch on all callbacks.
    pub fn after_batch(&mut self, ctx: &mut CallbackContext) -> Result<()> {
        self.callbacks.iter_mut().try_for_each(|cb| cb.after_batch(ctx))
    }
}

/// Logs epoch summaries through `tracing`.
#[derive(Debug, Default)]
pub struct ProgressCallback;

impl ProgressCallback {
    /// Create a new progress callback.
    pub fn new() -> Self {
        Self
    }
}

impl Callback for ProgressCallback {
    fn before_fit(&mut self, ctx: &mut CallbackContext) -> Result<()> {
        tracing::info!("Starting training for {} epochs", ctx.n_epochs);
        Ok(())
    }

    fn after_epoch(&mut self, ctx: &mut CallbackContext) -> Result<()> {
        let loss = ctx.epoch_loss.map(|l| format!("{l:.4}")).unwrap_or_default();
        tracing::info!(
            "Epoch {}/{}: train_loss={}, lr={:.6}",
            ctx.epoch + 1,
            ctx.n_epochs,
            loss,
            ctx.lr
        );
        for (name, value) in &ctx.metrics {
            tracing::info!("  {}: {:.4}", name, value);
        }
        Ok(())
    }

    fn after_fit(&mut self, _ctx: &mut CallbackContext) -> Result<()> {
        tracing::info!("Training completed");
        Ok(())
    }

    fn name(&self) -> &str {
        "ProgressCallback"
    }
}

/// Stops training as soon as a batch loss is NaN or infinite.
#[derive(Debug, Default)]
pub struct TerminateOnNanCallback {
    nan_count: usize,
}

impl TerminateOnNanCallback {
    /// Create a new terminate on NaN callback.
    pub fn new() -> Self {
        Self { nan_count: 0 }
    }

    /// Number of non-finite losses seen.
    pub fn nan_count(&self) -> usize {
        self.nan_count
    }
}

impl Callback for TerminateOnNanCallback {
    fn after_batch(&mut self, ctx: &mut CallbackContext) -> Result<()> {
        if let Some(loss) = ctx.train_loss {
            if !loss.is_finite() {
                self.nan_count += 1;
                tracing::error!(
                    "NaN/Inf detected in training loss at epoch {} step {}",
                    ctx.epoch,
                    ctx.step
                );
                ctx.stop_training = true;
            }
        }
        Ok(())
    }

    fn name(&self) -> &str {
        "TerminateOnNanCallback"
    }
}
