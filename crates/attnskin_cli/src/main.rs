//! attnskin CLI for training and evaluating attention-gated lesion classifiers.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use attnskin_core::{AttentionNormalization, LesionClassifier, Seed, Split};
use attnskin_data::{ImageDataLoader, LesionDataset};
use attnskin_explain::AttentionCapture;
use attnskin_models::{
    load_classifier, BackboneKind, CheckpointMetadata, Compatibility, FusionMode, WeightInit,
};
use attnskin_train::{
    check_labels, evaluate, has_checkpoint, ExperimentConfig, LossConfig, ProgressCallback,
    TerminateOnNanCallback, Trainer, LATEST_CHECKPOINT, LATEST_METADATA, TEST_RESULTS_FILE,
};
use attnskin_transforms::PreprocessConfig;
use burn::module::AutodiffModule;
use burn::prelude::*;
use burn_autodiff::Autodiff;
use burn_ndarray::NdArray;

/// Backend type for training.
type TrainBackend = Autodiff<NdArray>;
/// Backend type for evaluation.
type EvalBackend = NdArray;

/// Images in the attention display batch.
const DISPLAY_BATCH: usize = 16;

#[derive(Parser)]
#[command(name = "attnskin")]
#[command(author, version)]
#[command(about = "Attention-gated CNN classifiers for dermoscopy images")]
#[command(long_about = "attnskin: train and evaluate VGG/ResNet classifiers with attention gates \
at strides 8, 16 and 32 on ISIC skin lesion images.

EXAMPLES:
  # Print the default experiment configuration
  attnskin config

  # Train with softmax attention and focal loss
  attnskin train --train-csv train.csv --test-csv test.csv --focal-loss

  # Train a ResNet with sigmoid attention on a balanced training set
  attnskin train --train-csv train.csv --test-csv test.csv \\
      --backbone resnet --normalization sigmoid --over-sample

  # Evaluate the last checkpoint
  attnskin eval --checkpoint-dir logs --test-csv test.csv")]
struct Cli {
    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Train a classifier
    Train(TrainArgs),
    /// Evaluate a trained classifier
    Eval(EvalArgs),
    /// Print or write the default experiment configuration
    Config {
        /// Write to this file instead of stdout
        #[arg(long, value_name = "PATH")]
        output: Option<PathBuf>,
    },
}

#[derive(Args)]
struct DataArgs {
    /// CSV listing test images and labels
    #[arg(long, value_name = "PATH")]
    test_csv: Option<PathBuf>,

    /// Directory relative image paths are resolved against
    #[arg(long, value_name = "DIR")]
    image_root: Option<PathBuf>,

    /// Batch size
    #[arg(long, value_name = "SIZE")]
    batch_size: Option<usize>,

    /// Upsampling factor of the shallowest attention map
    #[arg(long, value_name = "N")]
    base_up_factor: Option<usize>,
}

#[derive(Args)]
struct TrainArgs {
    /// Start from this experiment configuration (JSON)
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// CSV listing training images and labels
    #[arg(long, value_name = "PATH")]
    train_csv: Option<PathBuf>,

    #[command(flatten)]
    data: DataArgs,

    /// Number of epochs
    #[arg(long, value_name = "N")]
    epochs: Option<usize>,

    /// Initial learning rate
    #[arg(long, value_name = "LR")]
    lr: Option<f64>,

    /// Directory for checkpoints, config and metrics
    #[arg(long, value_name = "DIR")]
    outf: Option<PathBuf>,

    /// Backbone: vgg or resnet
    #[arg(long, value_name = "NAME")]
    backbone: Option<BackboneKind>,

    /// Width of the first backbone stage
    #[arg(long, value_name = "N")]
    base_width: Option<usize>,

    /// Attention normalization: softmax or sigmoid
    #[arg(long, value_name = "NAME")]
    normalization: Option<AttentionNormalization>,

    /// Gate compatibility: dot, bilinear or additive
    #[arg(long, value_name = "NAME")]
    compatibility: Option<Compatibility>,

    /// Stage fusion: concat, sum or deepest
    #[arg(long, value_name = "NAME")]
    fusion: Option<FusionMode>,

    /// Weight initialization, e.g. kaiming-normal or xavier-uniform
    #[arg(long, value_name = "NAME")]
    init: Option<WeightInit>,

    /// Turn the attention gates off
    #[arg(long)]
    no_attention: bool,

    /// Train with focal loss
    #[arg(long)]
    focal_loss: bool,

    /// Focal loss focusing parameter
    #[arg(long, value_name = "GAMMA")]
    gamma: Option<f32>,

    /// Oversample minority classes
    #[arg(long)]
    over_sample: bool,

    /// Passes over the training set per epoch
    #[arg(long, value_name = "N")]
    num_aug: Option<usize>,

    /// Random seed
    #[arg(long, value_name = "SEED")]
    seed: Option<u64>,
}

#[derive(Args)]
struct EvalArgs {
    /// Directory holding net.mpk and net.json
    #[arg(long, default_value = "logs", value_name = "DIR")]
    checkpoint_dir: PathBuf,

    #[command(flatten)]
    data: DataArgs,

    /// Write test_results.csv here
    #[arg(long, value_name = "DIR")]
    outf: Option<PathBuf>,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging
    let log_level = match cli.verbose {
        0 => tracing::Level::WARN,
        1 => tracing::Level::INFO,
        2 => tracing::Level::DEBUG,
        _ => tracing::Level::TRACE,
    };

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(tracing_subscriber::filter::LevelFilter::from_level(log_level))
        .init();

    match cli.command {
        Commands::Train(args) => handle_train(args),
        Commands::Eval(args) => handle_eval(args),
        Commands::Config { output } => handle_config(output),
    }
}

/// Apply command-line overrides on top of a loaded or default configuration.
fn build_config(args: &TrainArgs) -> Result<ExperimentConfig> {
    let mut config = match &args.config {
        Some(path) => ExperimentConfig::load(path)
            .with_context(|| format!("failed to load config {}", path.display()))?,
        None => ExperimentConfig::default(),
    };

    if let Some(path) = &args.train_csv {
        config.data.train_csv = Some(path.clone());
    }
    if let Some(path) = &args.data.test_csv {
        config.data.test_csv = Some(path.clone());
    }
    if let Some(dir) = &args.data.image_root {
        config.data.image_root = Some(dir.clone());
    }
    if let Some(batch_size) = args.data.batch_size {
        config.training.batch_size = batch_size;
    }
    if let Some(factor) = args.data.base_up_factor {
        config.base_up_factor = factor;
    }
    if let Some(epochs) = args.epochs {
        config.training.epochs = epochs;
    }
    if let Some(lr) = args.lr {
        config.training.optimizer.lr = lr;
    }
    if let Some(dir) = &args.outf {
        config.output_dir = dir.clone();
    }

    let mut model = config.model.clone();
    if let Some(kind) = args.backbone {
        model = model.with_backbone(kind);
    }
    if let Some(width) = args.base_width {
        model = model.with_base_width(width);
    }
    if let Some(normalization) = args.normalization {
        model = model.with_normalization(normalization);
    }
    if let Some(compatibility) = args.compatibility {
        model = model.with_compatibility(compatibility);
    }
    if let Some(fusion) = args.fusion {
        model = model.with_fusion(fusion);
    }
    if let Some(init) = args.init {
        model = model.with_init(init);
    }
    if args.no_attention {
        model = model.with_attention(false);
    }
    config.model = model;

    if args.focal_loss || args.gamma.is_some() {
        config.training.loss = LossConfig::focal(args.gamma.unwrap_or(2.0));
    }
    if args.over_sample {
        config.training.over_sample = true;
    }
    if let Some(num_aug) = args.num_aug {
        config.training.num_aug = Some(num_aug);
    }
    if let Some(seed) = args.seed {
        config.training.seed = Seed::new(seed);
    }

    config.validate().context("invalid configuration")?;
    Ok(config)
}

fn load_dataset(csv: &Path, root: Option<&Path>) -> Result<LesionDataset> {
    let dataset = LesionDataset::from_csv(csv, root)
        .with_context(|| format!("failed to read {}", csv.display()))?;
    tracing::info!(
        path = %csv.display(),
        samples = dataset.len(),
        classes = ?dataset.class_counts(),
        "loaded dataset"
    );
    Ok(dataset)
}

fn build_loader(
    dataset: LesionDataset,
    preprocess: &PreprocessConfig,
    batch_size: usize,
    split: Split,
    seed: Seed,
    prefetch: usize,
) -> Result<ImageDataLoader> {
    ImageDataLoader::builder(dataset, preprocess.init()?)
        .batch_size(batch_size)
        .shuffle(split.is_train())
        .split(split)
        .seed(seed)
        .prefetch(prefetch)
        .build()
        .context("failed to build data loader")
}

/// Log attention statistics of the first display batch.
fn log_attention<B: Backend, M: LesionClassifier<B>>(
    label: &str,
    model: &M,
    loader: &ImageDataLoader,
    base_up_factor: usize,
    device: &B::Device,
) -> Result<()> {
    let Some(batch) = loader.iter::<B>(device).next() else {
        return Ok(());
    };
    let images = batch?.images;
    let [n, ..] = images.dims();
    let images = images.slice([0..n.min(DISPLAY_BATCH)]);

    let capture = AttentionCapture::capture(model, images)?;
    if capture.is_disabled() {
        tracing::info!("attention disabled, no maps to inspect");
        return Ok(());
    }
    capture.summary()?.log(label);
    for (stage, map) in capture.display_maps(base_up_factor).iter().enumerate() {
        if let Some(map) = map {
            tracing::debug!(split = label, stage = stage + 1, dims = ?map.dims(), "display map");
        }
    }
    Ok(())
}

fn handle_train(args: TrainArgs) -> Result<()> {
    let config = build_config(&args)?;
    let Some(train_csv) = config.data.train_csv.clone() else {
        bail!("no training data: pass --train-csv or set data.train_csv in the config");
    };
    let root = config.data.image_root.as_deref();
    let seed = config.training.seed;

    TrainBackend::seed(seed.value());
    let device = Default::default();

    let mut train_set = load_dataset(&train_csv, root)?;
    if config.training.over_sample {
        train_set = train_set.oversample();
    }
    let train_loader = build_loader(
        train_set,
        &config.data.preprocess,
        config.training.batch_size,
        Split::Train,
        seed.derive("train"),
        config.training.prefetch,
    )?;
    let test_loader = match &config.data.test_csv {
        Some(path) => Some(build_loader(
            load_dataset(path, root)?,
            &config.data.preprocess,
            config.training.batch_size,
            Split::Test,
            seed.derive("test"),
            config.training.prefetch,
        )?),
        None => None,
    };

    std::fs::create_dir_all(&config.output_dir)
        .with_context(|| format!("failed to create {}", config.output_dir.display()))?;
    config.save(config.output_dir.join("config.json"))?;

    let model = config.model.init::<TrainBackend>(&device)?;
    let mut trainer = Trainer::<TrainBackend>::new(config.training.clone(), device)?
        .with_callback(ProgressCallback::new())
        .with_callback(TerminateOnNanCallback::new())
        .with_output_dir(&config.output_dir)
        .with_metadata(CheckpointMetadata::new(&config.model).with_extra("seed", seed.value().to_string()));

    println!(
        "Training {} on {} images for {} epochs ({} passes each)",
        config.model.backbone.kind,
        train_loader.len(),
        config.training.epochs,
        config.training.augmentation_passes()
    );
    let output = trainer.fit(model, &train_loader, test_loader.as_ref())?;

    if output.stopped_early {
        println!("Training stopped early at step {}", output.state.step);
    }
    if let Some(summary) = output.summaries.last() {
        println!("Final test: {summary}");
    }
    let trained = output.model.valid();
    log_attention::<EvalBackend, _>(
        "train",
        &trained,
        &train_loader,
        config.base_up_factor,
        &Default::default(),
    )?;
    if let Some(test_loader) = &test_loader {
        log_attention::<EvalBackend, _>(
            "test",
            &trained,
            test_loader,
            config.base_up_factor,
            &Default::default(),
        )?;
    }
    println!(
        "Finished in {:.1}s, checkpoints in {}",
        output.training_time_secs,
        config.output_dir.display()
    );
    Ok(())
}

fn handle_eval(args: EvalArgs) -> Result<()> {
    if !has_checkpoint(&args.checkpoint_dir) {
        bail!("no {} in {}", LATEST_CHECKPOINT, args.checkpoint_dir.display());
    }
    let Some(test_csv) = &args.data.test_csv else {
        bail!("--test-csv is required for evaluation");
    };

    let device = Default::default();
    let model = load_classifier::<EvalBackend>(
        args.checkpoint_dir.join(LATEST_CHECKPOINT),
        args.checkpoint_dir.join(LATEST_METADATA),
        &device,
    )
    .context("failed to load checkpoint")?;

    // Preprocessing comes from the run's config when it is available.
    let saved = args.checkpoint_dir.join("config.json");
    let preprocess = if saved.is_file() {
        ExperimentConfig::load(&saved)?.data.preprocess
    } else {
        PreprocessConfig::default()
    };

    let loader = build_loader(
        load_dataset(test_csv, args.data.image_root.as_deref())?,
        &preprocess,
        args.data.batch_size.unwrap_or(32),
        Split::Test,
        Seed::default(),
        0,
    )?;
    check_labels(&loader, model.n_classes()).context("test labels do not fit the checkpoint")?;

    let results = match &args.outf {
        Some(dir) => {
            std::fs::create_dir_all(dir)?;
            Some(dir.join(TEST_RESULTS_FILE))
        }
        None => None,
    };
    let summary = evaluate::<EvalBackend, _>(&model, &loader, &device, results.as_deref())?;
    println!("{summary}");
    println!("{}", summary.confusion.to_string_table());

    log_attention::<EvalBackend, _>("test", &model, &loader, args.data.base_up_factor.unwrap_or(8), &device)?;
    Ok(())
}

fn handle_config(output: Option<PathBuf>) -> Result<()> {
    let config = ExperimentConfig::default();
    match output {
        Some(path) => {
            config.save(&path)?;
            println!("Wrote {}", path.display());
        }
        None => println!("{}", serde_json::to_string_pretty(&config)?),
    }
    Ok(())
}
