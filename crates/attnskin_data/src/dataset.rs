//! Labelled collections of dermoscopy images.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use image::RgbImage;

use crate::error::{DataError, Result};
use crate::io::{read_image, read_label_csv};

/// Where a sample's pixels come from.
#[derive(Debug, Clone)]
pub enum ImageSource {
    /// Decoded lazily from disk.
    File(PathBuf),
    /// Already in memory.
    Memory(Arc<RgbImage>),
}

/// One labelled image.
#[derive(Debug, Clone)]
pub struct LesionSample {
    /// Pixel source.
    pub source: ImageSource,
    /// Class index.
    pub label: usize,
}

/// A labelled image dataset.
///
/// Images listed in a label file are decoded on access, so constructing a
/// dataset is cheap and the loader decodes in parallel.
///
/// # Example
///
/// ```rust,ignore
/// use attnskin_data::LesionDataset;
///
/// let train = LesionDataset::from_csv("train.csv", Some("ISIC2017".as_ref()))?;
/// println!("{} images, class counts {:?}", train.len(), train.class_counts());
/// ```
#[derive(Debug, Clone, Default)]
pub struct LesionDataset {
    samples: Vec<LesionSample>,
}

impl LesionDataset {
    /// Create a dataset from a label file.
    pub fn from_csv(path: impl AsRef<Path>, root: Option<&Path>) -> Result<Self> {
        let samples = read_label_csv(path, root)?
            .into_iter()
            .map(|r| LesionSample {
                source: ImageSource::File(r.path),
                label: r.label,
            })
            .collect();
        Ok(Self { samples })
    }

    /// Create a dataset from decoded images.
    ///
    /// # Errors
    ///
    /// Fails if `images` and `labels` differ in length.
    pub fn from_images(images: Vec<RgbImage>, labels: Vec<usize>) -> Result<Self> {
        if images.len() != labels.len() {
            return Err(DataError::FormatError(format!(
                "{} images but {} labels",
                images.len(),
                labels.len()
            )));
        }
        let samples = images
            .into_iter()
            .zip(labels)
            .map(|(image, label)| LesionSample {
                source: ImageSource::Memory(Arc::new(image)),
                label,
            })
            .collect();
        Ok(Self { samples })
    }

    /// Get the number of samples.
    #[must_use]
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// Check if the dataset is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Class label of every sample, in order.
    #[must_use]
    pub fn labels(&self) -> Vec<usize> {
        self.samples.iter().map(|s| s.label).collect()
    }

    /// Largest label plus one.
    #[must_use]
    pub fn n_classes(&self) -> usize {
        self.samples.iter().map(|s| s.label + 1).max().unwrap_or(0)
    }

    /// Number of samples per class.
    #[must_use]
    pub fn class_counts(&self) -> BTreeMap<usize, usize> {
        let mut counts = BTreeMap::new();
        for sample in &self.samples {
            *counts.entry(sample.label).or_insert(0) += 1;
        }
        counts
    }

    /// Get a sample's metadata.
    pub fn sample(&self, index: usize) -> Result<&LesionSample> {
        self.samples.get(index).ok_or(DataError::IndexOutOfBounds {
            index,
            length: self.samples.len(),
        })
    }

    /// Decode a sample.
    pub fn get(&self, index: usize) -> Result<(RgbImage, usize)> {
        let sample = self.sample(index)?;
        let image = match &sample.source {
            ImageSource::File(path) => read_image(path)?,
            ImageSource::Memory(image) => image.as_ref().clone(),
        };
        Ok((image, sample.label))
    }

    /// Create a subset with the given indices.
    pub fn subset(&self, indices: &[usize]) -> Result<Self> {
        let samples = indices
            .iter()
            .map(|&i| self.sample(i).cloned())
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { samples })
    }

    /// Offline oversampling: repeat the samples of every class until each
    /// class has as many samples as the largest one.
    ///
    /// Repetition is round-robin within a class, so the result is
    /// deterministic and every original sample appears at least once.
    #[must_use]
    pub fn oversample(&self) -> Self {
        let counts = self.class_counts();
        let Some(&target) = counts.values().max() else {
            return self.clone();
        };

        let mut samples = self.samples.clone();
        for (&label, &count) in &counts {
            let members: Vec<&LesionSample> =
                self.samples.iter().filter(|s| s.label == label).collect();
            samples.extend(members.iter().cycle().take(target - count).map(|s| (*s).clone()));
        }

        tracing::info!(
            before = self.len(),
            after = samples.len(),
            "oversampled minority classes"
        );
        Self { samples }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tiny(labels: &[usize]) -> LesionDataset {
        let images = labels
            .iter()
            .map(|&l| RgbImage::from_pixel(2, 2, image::Rgb([l as u8, 0, 0])))
            .collect();
        LesionDataset::from_images(images, labels.to_vec()).unwrap()
    }

    #[test]
    fn test_from_images() {
        let ds = tiny(&[0, 1, 0]);
        assert_eq!(ds.len(), 3);
        assert_eq!(ds.n_classes(), 2);
        let (image, label) = ds.get(1).unwrap();
        assert_eq!(label, 1);
        assert_eq!(image.get_pixel(0, 0)[0], 1);
        assert!(matches!(ds.get(3), Err(DataError::IndexOutOfBounds { index: 3, length: 3 })));
    }

    #[test]
    fn test_length_mismatch() {
        let result = LesionDataset::from_images(vec![RgbImage::new(1, 1)], vec![0, 1]);
        assert!(result.is_err());
    }

    #[test]
    fn test_oversample_balances_classes() {
        let ds = tiny(&[0, 0, 0, 0, 0, 1, 1]);
        let balanced = ds.oversample();
        let counts = balanced.class_counts();
        assert_eq!(counts[&0], 5);
        assert_eq!(counts[&1], 5);
        assert_eq!(balanced.len(), 10);
    }

    #[test]
    fn test_subset() {
        let ds = tiny(&[0, 1, 1]);
        let sub = ds.subset(&[2, 0]).unwrap();
        assert_eq!(sub.labels(), vec![1, 0]);
        assert!(ds.subset(&[5]).is_err());
    }

    #[test]
    fn test_from_csv_decodes_lazily() {
        let dir = tempfile::tempdir().unwrap();
        RgbImage::from_pixel(3, 3, image::Rgb([1, 2, 3]))
            .save(dir.path().join("x.png"))
            .unwrap();
        std::fs::write(dir.path().join("list.csv"), "x.png,1\nmissing.png,0\n").unwrap();

        let ds = LesionDataset::from_csv(dir.path().join("list.csv"), Some(dir.path())).unwrap();
        assert_eq!(ds.len(), 2);
        assert_eq!(ds.get(0).unwrap().1, 1);
        assert!(matches!(ds.get(1), Err(DataError::Image { .. })));
    }
}
