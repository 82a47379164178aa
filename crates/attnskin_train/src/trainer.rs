//! The training loop.
//!
//! Each epoch runs `num_aug` passes over the training loader with SGD, then
//! evaluates on the test loader, writes `test_results.csv` and checkpoints the
//! weights. Every `log_every` steps the batch just trained on is re-scored in
//! evaluation mode to track a smoothed accuracy.

use std::path::{Path, PathBuf};
use std::time::Instant;

use attnskin_analysis::EvaluationSummary;
use attnskin_core::LesionClassifier;
use attnskin_data::ImageDataLoader;
use attnskin_models::{CheckpointMetadata, ModelCheckpoint};
use burn::module::AutodiffModule;
use burn::optim::decay::WeightDecayConfig;
use burn::optim::momentum::MomentumConfig;
use burn::optim::{GradientsParams, Optimizer, SgdConfig};
use burn::prelude::*;
use burn::tensor::backend::AutodiffBackend;

use crate::callback::{Callback, CallbackContext, CallbackList};
use crate::config::TrainingConfig;
use crate::error::Result;
use crate::evaluation::{check_labels, evaluate, TEST_RESULTS_FILE};
use crate::metrics::batch_accuracy;
use crate::state::TrainingState;

/// File name of the latest weights.
pub const LATEST_CHECKPOINT: &str = "net.mpk";
/// File name of the metadata sidecar of the latest weights.
pub const LATEST_METADATA: &str = "net.json";

/// File name of the snapshot taken at `epoch`.
pub fn milestone_checkpoint(epoch: usize) -> String {
    format!("net{epoch}.mpk")
}

/// Result of a training run.
#[derive(Debug)]
pub struct TrainingOutput<M> {
    /// Trained model.
    pub model: M,
    /// Mean training loss per epoch.
    pub epoch_losses: Vec<f32>,
    /// Evaluation summary per epoch, when a test loader was given.
    pub summaries: Vec<EvaluationSummary>,
    /// Final loop state.
    pub state: TrainingState,
    /// True if a callback stopped training early.
    pub stopped_early: bool,
    /// Total training time in seconds.
    pub training_time_secs: f64,
}

/// Trainer for lesion classifiers on an autodiff backend.
pub struct Trainer<B: AutodiffBackend> {
    config: TrainingConfig,
    device: B::Device,
    callbacks: CallbackList,
    output_dir: Option<PathBuf>,
    metadata: Option<CheckpointMetadata>,
}

impl<B: AutodiffBackend> Trainer<B> {
    /// Create a trainer.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid.
    pub fn new(config: TrainingConfig, device: B::Device) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            device,
            callbacks: CallbackList::new(),
            output_dir: None,
            metadata: None,
        })
    }

    /// Register a callback.
    #[must_use]
    pub fn with_callback<C: Callback + 'static>(mut self, callback: C) -> Self {
        self.callbacks.add(callback);
        self
    }

    /// Write checkpoints and the metrics file under `dir`.
    #[must_use]
    pub fn with_output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.output_dir = Some(dir.into());
        self
    }

    /// Write this metadata (updated per epoch) next to the latest weights.
    #[must_use]
    pub fn with_metadata(mut self, metadata: CheckpointMetadata) -> Self {
        self.metadata = Some(metadata);
        self
    }

    /// Training settings.
    pub fn config(&self) -> &TrainingConfig {
        &self.config
    }

    /// Train `model`, evaluating on `test` after every epoch if given.
    pub fn fit<M>(
        &mut self,
        model: M,
        train: &ImageDataLoader,
        test: Option<&ImageDataLoader>,
    ) -> Result<TrainingOutput<M>>
    where
        M: AutodiffModule<B> + LesionClassifier<B>,
        M::InnerModule: LesionClassifier<B::InnerBackend>,
    {
        let start_time = Instant::now();
        let epochs = self.config.epochs;
        let passes = self.config.augmentation_passes();

        check_labels(train, model.n_classes())?;
        if let Some(test) = test {
            check_labels(test, model.n_classes())?;
        }

        let criterion = self.config.loss.init(model.n_classes())?;
        let scheduler = self.config.scheduler.init(self.config.optimizer.lr)?;
        let mut optim = SgdConfig::new()
            .with_momentum(Some(
                MomentumConfig::new()
                    .with_momentum(self.config.optimizer.momentum)
                    .with_dampening(0.0),
            ))
            .with_weight_decay(Some(WeightDecayConfig::new(self.config.optimizer.weight_decay)))
            .init::<B, M>();

        if let Some(dir) = &self.output_dir {
            std::fs::create_dir_all(dir)?;
        }

        tracing::info!(
            epochs,
            passes,
            batches_per_pass = train.n_batches(),
            loss = %self.config.loss,
            scheduler = scheduler.name(),
            "starting training"
        );

        let mut state = TrainingState::new();
        let mut ctx = CallbackContext::new(epochs);
        let mut epoch_losses = Vec::with_capacity(epochs);
        let mut summaries = Vec::new();
        let mut model = model;
        let mut stopped_early = false;

        self.callbacks.before_fit(&mut ctx)?;

        'epochs: for epoch in 0..epochs {
            state.epoch = epoch;
            state.lr = scheduler.get_lr(epoch);
            ctx.epoch = epoch;
            ctx.lr = state.lr;
            ctx.metrics.clear();
            self.callbacks.before_epoch(&mut ctx)?;

            let mut loss_sum = 0.0f32;
            let mut n_steps = 0usize;

            for pass in 0..passes {
                for batch in train.iter_epoch::<B>(epoch * passes + pass, &self.device) {
                    let batch = batch?;

                    let logits = model.forward(batch.images.clone())?;
                    let loss = criterion.forward(logits, batch.labels.clone());
                    let loss_value = loss.clone().into_scalar().elem::<f32>();

                    state.last_loss = Some(loss_value);
                    ctx.step = state.step;
                    ctx.train_loss = Some(loss_value);
                    self.callbacks.after_batch(&mut ctx)?;
                    if ctx.stop_training {
                        stopped_early = true;
                        break 'epochs;
                    }

                    let grads = GradientsParams::from_grads(loss.backward(), &model);
                    model = optim.step(state.lr, model, grads);

                    if state.should_log(self.config.log_every) {
                        self.monitor(&model, &mut state, batch.images, batch.labels, loss_value)?;
                    }

                    loss_sum += loss_value;
                    n_steps += 1;
                    state.step += 1;
                }
            }

            let epoch_loss = if n_steps > 0 {
                loss_sum / n_steps as f32
            } else {
                0.0
            };
            epoch_losses.push(epoch_loss);
            ctx.epoch_loss = Some(epoch_loss);

            let summary = match test {
                Some(test) => Some(self.evaluate_epoch(&model, test)?),
                None => None,
            };
            if let Some(summary) = &summary {
                ctx.metrics.insert("accuracy".into(), summary.accuracy);
                ctx.metrics.insert("mean_precision".into(), summary.mean_precision);
                ctx.metrics.insert("mean_recall".into(), summary.mean_recall);
                ctx.metrics.insert("melanoma_precision".into(), summary.positive_precision);
                ctx.metrics.insert("melanoma_recall".into(), summary.positive_recall);
                ctx.metrics.insert("melanoma_auc".into(), summary.positive_auc);
                ctx.metrics.insert("map".into(), summary.mean_ap);
            }

            self.save_epoch(&model, epoch, summary.as_ref())?;
            summaries.extend(summary);

            self.callbacks.after_epoch(&mut ctx)?;
            if ctx.stop_training {
                stopped_early = true;
                break;
            }
        }

        self.callbacks.after_fit(&mut ctx)?;
        let training_time_secs = start_time.elapsed().as_secs_f64();
        tracing::info!(training_time_secs, steps = state.step, stopped_early, "training finished");

        Ok(TrainingOutput {
            model,
            epoch_losses,
            summaries,
            state,
            stopped_early,
            training_time_secs,
        })
    }

    /// Re-score a batch in evaluation mode and update the running accuracy.
    fn monitor<M>(
        &self,
        model: &M,
        state: &mut TrainingState,
        images: Tensor<B, 4>,
        labels: Tensor<B, 1, Int>,
        loss: f32,
    ) -> Result<()>
    where
        M: AutodiffModule<B> + LesionClassifier<B>,
        M::InnerModule: LesionClassifier<B::InnerBackend>,
    {
        let logits = model.valid().forward(images.inner())?;
        let accuracy = batch_accuracy(logits, labels.inner());
        let running = state.running_accuracy.update(accuracy);
        tracing::info!(
            "[epoch {}][step {}] loss {:.4} accuracy {:.2}% running avg accuracy {:.2}%",
            state.epoch,
            state.step,
            loss,
            accuracy * 100.0,
            running * 100.0
        );
        Ok(())
    }

    fn evaluate_epoch<M>(&self, model: &M, test: &ImageDataLoader) -> Result<EvaluationSummary>
    where
        M: AutodiffModule<B> + LesionClassifier<B>,
        M::InnerModule: LesionClassifier<B::InnerBackend>,
    {
        let results = self.output_dir.as_ref().map(|d| d.join(TEST_RESULTS_FILE));
        evaluate::<B::InnerBackend, M::InnerModule>(
            &model.valid(),
            test,
            &self.device,
            results.as_deref(),
        )
    }

    fn save_epoch<M>(&self, model: &M, epoch: usize, summary: Option<&EvaluationSummary>) -> Result<()>
    where
        M: AutodiffModule<B>,
    {
        let Some(dir) = &self.output_dir else {
            return Ok(());
        };

        let inner = model.valid();
        inner.save_checkpoint(dir.join(LATEST_CHECKPOINT))?;
        if epoch == self.config.milestone_epoch() {
            inner.save_checkpoint(dir.join(milestone_checkpoint(epoch)))?;
            tracing::info!(epoch, "saved milestone checkpoint");
        }

        if let Some(metadata) = &self.metadata {
            let mut metadata = metadata.clone().with_epoch(epoch);
            if let Some(summary) = summary {
                metadata = metadata
                    .with_test_accuracy(summary.accuracy)
                    .with_test_auc(summary.positive_auc);
            }
            metadata.save(dir.join(LATEST_METADATA))?;
        }
        tracing::debug!(epoch, dir = %dir.display(), "saved checkpoint");
        Ok(())
    }
}

/// Output directory helper: `true` if a completed run left weights in `dir`.
pub fn has_checkpoint(dir: &Path) -> bool {
    dir.join(LATEST_CHECKPOINT).is_file()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TrainError;
    use attnskin_core::{Seed, Split};
    use attnskin_data::LesionDataset;
    use attnskin_models::AttnClassifierConfig;
    use attnskin_transforms::Preprocess;
    use burn_autodiff::Autodiff;
    use burn_ndarray::NdArray;
    use image::{Rgb, RgbImage};

    type TestBackend = Autodiff<NdArray>;

    fn loader(n: usize, split: Split) -> ImageDataLoader {
        let images = (0..n)
            .map(|i| RgbImage::from_fn(40, 40, |x, y| Rgb([(i * 40) as u8, (x * 6) as u8, (y * 6) as u8])))
            .collect();
        let labels = (0..n).map(|i| i % 2).collect();
        ImageDataLoader::builder(
            LesionDataset::from_images(images, labels).unwrap(),
            Preprocess::isic(36, 32).unwrap(),
        )
        .batch_size(2)
        .shuffle(split.is_train())
        .split(split)
        .seed(Seed::new(3))
        .build()
        .unwrap()
    }

    fn config(epochs: usize) -> TrainingConfig {
        TrainingConfig {
            epochs,
            batch_size: 2,
            num_aug: Some(1),
            log_every: 1,
            prefetch: 0,
            ..Default::default()
        }
    }

    #[test]
    fn test_fit_writes_outputs() {
        let dir = tempfile::tempdir().unwrap();
        let device = Default::default();
        let model_config = AttnClassifierConfig::new(2).with_base_width(2);
        let model = model_config.init::<TestBackend>(&device).unwrap();

        let mut trainer = Trainer::<TestBackend>::new(config(2), device)
            .unwrap()
            .with_output_dir(dir.path())
            .with_metadata(CheckpointMetadata::new(&model_config));
        let output = trainer
            .fit(model, &loader(4, Split::Train), Some(&loader(4, Split::Test)))
            .unwrap();

        assert_eq!(output.epoch_losses.len(), 2);
        assert_eq!(output.summaries.len(), 2);
        assert_eq!(output.state.step, 4);
        assert!(!output.stopped_early);
        assert!(has_checkpoint(dir.path()));
        assert!(dir.path().join(milestone_checkpoint(1)).is_file());
        assert!(dir.path().join(TEST_RESULTS_FILE).is_file());

        let metadata = CheckpointMetadata::load(dir.path().join(LATEST_METADATA)).unwrap();
        assert_eq!(metadata.epoch, Some(1));
        assert!(metadata.test_accuracy.is_some());
    }

    #[test]
    fn test_callback_can_stop_training() {
        struct StopAfterFirstEpoch;
        impl Callback for StopAfterFirstEpoch {
            fn after_epoch(&mut self, ctx: &mut CallbackContext) -> Result<()> {
                ctx.stop_training = true;
                Ok(())
            }
        }

        let device = Default::default();
        let model = AttnClassifierConfig::new(2)
            .with_base_width(2)
            .init::<TestBackend>(&device)
            .unwrap();
        let mut trainer = Trainer::<TestBackend>::new(config(5), device)
            .unwrap()
            .with_callback(StopAfterFirstEpoch);
        let output = trainer.fit(model, &loader(2, Split::Train), None).unwrap();

        assert!(output.stopped_early);
        assert_eq!(output.epoch_losses.len(), 1);
        assert!(output.summaries.is_empty());
    }

    #[test]
    fn test_invalid_config_rejected() {
        let mut bad = config(1);
        bad.epochs = 0;
        assert!(Trainer::<TestBackend>::new(bad, Default::default()).is_err());
    }

    #[test]
    fn test_label_beyond_n_classes_fails_before_training() {
        let dir = tempfile::tempdir().unwrap();
        let device = Default::default();
        let model = AttnClassifierConfig::new(2)
            .with_base_width(2)
            .init::<TestBackend>(&device)
            .unwrap();
        let images = vec![RgbImage::new(40, 40), RgbImage::new(40, 40)];
        let train = ImageDataLoader::builder(
            LesionDataset::from_images(images, vec![0, 2]).unwrap(),
            Preprocess::isic(36, 32).unwrap(),
        )
        .batch_size(2)
        .build()
        .unwrap();

        let mut trainer = Trainer::<TestBackend>::new(config(1), device)
            .unwrap()
            .with_output_dir(dir.path());
        let result = trainer.fit(model, &train, None);
        assert!(matches!(result, Err(TrainError::Config(_))));
        assert!(!has_checkpoint(dir.path()));
    }
}
