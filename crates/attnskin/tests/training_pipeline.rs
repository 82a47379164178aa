//! Integration tests for the training pipeline.
//!
//! Images are written to disk as PNG files with a label CSV, then loaded,
//! trained on, checkpointed, reloaded and evaluated.

use std::path::Path;

use attnskin::all::*;
use burn::module::AutodiffModule;
use burn_autodiff::Autodiff;
use burn_ndarray::NdArray;
use image::{Rgb, RgbImage};

type TrainBackend = Autodiff<NdArray>;
type EvalBackend = NdArray;

/// Write `n` synthetic lesions and a headerless label file.
fn write_split(dir: &Path, name: &str, n: usize) -> std::path::PathBuf {
    std::fs::create_dir_all(dir.join(name)).unwrap();
    let mut rows = String::new();
    for i in 0..n {
        let label = usize::from(i % 3 == 0);
        let img = RgbImage::from_fn(48, 48, |x, y| {
            let d = (x as i32 - 24).pow(2) + (y as i32 - 24).pow(2);
            let dark = label == 1 && d < 150;
            if dark {
                Rgb([60, 30, 20])
            } else {
                Rgb([200, (120 + x) as u8, (110 + y) as u8])
            }
        });
        let file = format!("{name}/img_{i}.png");
        img.save(dir.join(&file)).unwrap();
        rows.push_str(&format!("{file},{file}.mask,{label}\n"));
    }
    let csv = dir.join(format!("{name}.csv"));
    std::fs::write(&csv, rows).unwrap();
    csv
}

fn loader(csv: &Path, root: &Path, split: Split) -> ImageDataLoader {
    let dataset = LesionDataset::from_csv(csv, Some(root)).unwrap();
    ImageDataLoader::builder(dataset, Preprocess::isic(36, 32).unwrap())
        .batch_size(3)
        .shuffle(split.is_train())
        .split(split)
        .seed(Seed::new(11))
        .prefetch(1)
        .build()
        .unwrap()
}

#[test]
fn test_train_checkpoint_reload_evaluate() {
    let dir = tempfile::tempdir().unwrap();
    let train_csv = write_split(dir.path(), "train", 9);
    let test_csv = write_split(dir.path(), "test", 5);
    let out_dir = dir.path().join("logs");

    let train = LesionDataset::from_csv(&train_csv, Some(dir.path())).unwrap();
    assert_eq!(train.class_counts().get(&1), Some(&3));
    let balanced = train.oversample();
    assert_eq!(balanced.class_counts().get(&0), balanced.class_counts().get(&1));

    let train_loader = loader(&train_csv, dir.path(), Split::Train);
    let test_loader = loader(&test_csv, dir.path(), Split::Test);

    let device = Default::default();
    let model_config = AttnClassifierConfig::new(2).with_base_width(2);
    let model = model_config.init::<TrainBackend>(&device).unwrap();

    let config = TrainingConfig {
        epochs: 2,
        batch_size: 3,
        num_aug: Some(1),
        loss: LossConfig::focal(2.0),
        log_every: 1,
        ..Default::default()
    };
    let mut trainer = Trainer::<TrainBackend>::new(config, device)
        .unwrap()
        .with_callback(TerminateOnNanCallback::new())
        .with_output_dir(&out_dir)
        .with_metadata(CheckpointMetadata::new(&model_config));
    let output = trainer.fit(model, &train_loader, Some(&test_loader)).unwrap();

    assert_eq!(output.epoch_losses.len(), 2);
    assert!(output.epoch_losses.iter().all(|l| l.is_finite()));
    assert_eq!(output.state.step, 6);

    let results = attnskin::train::read_probabilities(out_dir.join(attnskin::train::TEST_RESULTS_FILE)).unwrap();
    assert_eq!(results.len(), 5);
    assert_eq!(results.n_classes(), 2);
    for row in results.rows() {
        assert!((row.iter().sum::<f32>() - 1.0).abs() < 1e-4);
    }

    // The reloaded checkpoint scores the test set exactly like the trained model.
    let reloaded = load_classifier::<EvalBackend>(
        out_dir.join(attnskin::train::LATEST_CHECKPOINT),
        out_dir.join(attnskin::train::LATEST_METADATA),
        &Default::default(),
    )
    .unwrap();
    let trained = output.model.valid();
    let a = predict::<EvalBackend, _>(&trained, &test_loader, &Default::default()).unwrap();
    let b = predict::<EvalBackend, _>(&reloaded, &test_loader, &Default::default()).unwrap();
    assert_eq!(a.targets, b.targets);
    for (x, y) in a.probabilities.rows().iter().zip(b.probabilities.rows()) {
        for (p, q) in x.iter().zip(y) {
            assert!((p - q).abs() < 1e-5);
        }
    }

    // Attention statistics of the first train and test display batches.
    for display in [&train_loader, &test_loader] {
        let batch = display.iter::<EvalBackend>(&Default::default()).next().unwrap().unwrap();
        let capture = AttentionCapture::capture(&trained, batch.images).unwrap();
        let stats = capture.summary().unwrap();
        assert!(stats.stages.iter().all(Option::is_some));
        stats.log(&display.split().to_string());
    }

    let summary = evaluate::<EvalBackend, _>(&reloaded, &test_loader, &Default::default(), None).unwrap();
    assert_eq!(summary.confusion.total(), 5);
    assert!((0.0..=1.0).contains(&summary.accuracy));
}
