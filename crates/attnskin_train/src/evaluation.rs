//! Model evaluation: collect probabilities, write the metrics file, summarize.

use std::path::Path;

use attnskin_analysis::{EvaluationSummary, ProbabilityTable, MELANOMA_CLASS};
use attnskin_core::LesionClassifier;
use attnskin_data::ImageDataLoader;
use burn::prelude::*;

use crate::error::{Result, TrainError};

/// File name of the per-sample probability table.
pub const TEST_RESULTS_FILE: &str = "test_results.csv";

/// Class probabilities and true labels for every sample of a loader.
#[derive(Debug, Clone)]
pub struct Predictions {
    /// Softmax probabilities, one row per sample.
    pub probabilities: ProbabilityTable,
    /// True class indices.
    pub targets: Vec<usize>,
}

/// Check that every label of `loader` is a valid class of the model.
pub fn check_labels(loader: &ImageDataLoader, n_classes: usize) -> Result<()> {
    let needed = loader.dataset().n_classes();
    if needed > n_classes {
        return Err(TrainError::Config(format!(
            "{} data has label {} but the model has {} classes",
            loader.split(),
            needed - 1,
            n_classes
        )));
    }
    Ok(())
}

/// Run the model over a loader in its current mode.
///
/// Pass the inner (evaluation) module of an autodiff model.
pub fn predict<B, M>(model: &M, loader: &ImageDataLoader, device: &B::Device) -> Result<Predictions>
where
    B: Backend,
    M: LesionClassifier<B>,
{
    let n_classes = model.n_classes();
    check_labels(loader, n_classes)?;
    let mut probs = Vec::with_capacity(loader.len() * n_classes);
    let mut targets = Vec::with_capacity(loader.len());

    for batch in loader.iter::<B>(device) {
        let batch = batch?;
        let p = model.forward_probs(batch.images)?;
        probs.extend(
            p.into_data()
                .convert::<f32>()
                .to_vec::<f32>()
                .map_err(|e| TrainError::SerializationError(format!("{e:?}")))?,
        );
        let labels = batch
            .labels
            .into_data()
            .convert::<i64>()
            .to_vec::<i64>()
            .map_err(|e| TrainError::SerializationError(format!("{e:?}")))?;
        targets.extend(labels.into_iter().map(|l| l as usize));
        tracing::debug!(seen = targets.len(), "evaluated batch");
    }

    Ok(Predictions {
        probabilities: ProbabilityTable::from_flat(&probs, n_classes)?,
        targets,
    })
}

/// Write probabilities as a headerless CSV, one row per sample.
pub fn write_probabilities(path: impl AsRef<Path>, table: &ProbabilityTable) -> Result<()> {
    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .from_path(path)?;
    for row in table.rows() {
        writer.serialize(row)?;
    }
    writer.flush()?;
    Ok(())
}

/// Read a table written by [`write_probabilities`].
pub fn read_probabilities(path: impl AsRef<Path>) -> Result<ProbabilityTable> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .from_path(path)?;
    let rows = reader
        .deserialize::<Vec<f32>>()
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(ProbabilityTable::from_rows(rows)?)
}

/// Evaluate a model, optionally writing the probability table to `results`.
pub fn evaluate<B, M>(
    model: &M,
    loader: &ImageDataLoader,
    device: &B::Device,
    results: Option<&Path>,
) -> Result<EvaluationSummary>
where
    B: Backend,
    M: LesionClassifier<B>,
{
    let predictions = predict::<B, M>(model, loader, device)?;
    if let Some(path) = results {
        write_probabilities(path, &predictions.probabilities)?;
        tracing::debug!(path = %path.display(), "wrote probabilities");
    }
    let summary =
        EvaluationSummary::compute(&predictions.probabilities, &predictions.targets, MELANOMA_CLASS)?;
    tracing::info!("{summary}");
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_probabilities_csv_has_no_header() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(TEST_RESULTS_FILE);
        let table = ProbabilityTable::from_rows(vec![vec![0.25, 0.75], vec![0.9, 0.1]]).unwrap();

        write_probabilities(&path, &table).unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        assert_eq!(text.lines().next(), Some("0.25,0.75"));
        assert_eq!(text.lines().count(), 2);

        assert_eq!(read_probabilities(&path).unwrap(), table);
    }

    #[test]
    fn test_read_missing_file() {
        assert!(read_probabilities("/nonexistent/test_results.csv").is_err());
    }

    #[test]
    fn test_label_outside_model_classes_is_rejected() {
        use attnskin_core::Split;
        use attnskin_data::LesionDataset;
        use attnskin_models::AttnClassifierConfig;
        use attnskin_transforms::Preprocess;
        use burn_ndarray::NdArray;
        use image::RgbImage;

        let images = vec![RgbImage::new(40, 40), RgbImage::new(40, 40)];
        let loader = ImageDataLoader::builder(
            LesionDataset::from_images(images, vec![0, 2]).unwrap(),
            Preprocess::isic(36, 32).unwrap(),
        )
        .batch_size(2)
        .split(Split::Test)
        .build()
        .unwrap();
        assert!(matches!(check_labels(&loader, 2), Err(TrainError::Config(_))));
        assert!(check_labels(&loader, 3).is_ok());

        let device = Default::default();
        let model = AttnClassifierConfig::new(2)
            .with_base_width(2)
            .init::<NdArray>(&device)
            .unwrap();
        let result = evaluate::<NdArray, _>(&model, &loader, &device, None);
        assert!(matches!(result, Err(TrainError::Config(_))));
    }
}
