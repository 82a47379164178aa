//! Batched, shuffled, augmented iteration over a [`LesionDataset`].
//!
//! Decoding and preprocessing of a batch fans out over the rayon pool. With
//! `prefetch(depth)` a background thread prepares up to `depth` host batches
//! ahead of the training loop; the loop itself only uploads ready buffers.

use std::sync::mpsc::{self, Receiver};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use attnskin_core::{ImageBatch, ImageShape, Seed, Split};
use attnskin_transforms::Preprocess;
use burn::prelude::*;
use rand::seq::SliceRandom;
use rayon::prelude::*;

use crate::dataset::LesionDataset;
use crate::error::{DataError, Result};

/// A dataloader that produces image batches from a dataset.
///
/// Shuffling and augmentation are driven by the loader seed and the epoch
/// number, so an epoch can be replayed exactly.
///
/// # Example
///
/// ```rust,ignore
/// use attnskin_data::{ImageDataLoader, LesionDataset};
/// use attnskin_transforms::Preprocess;
///
/// let loader = ImageDataLoader::builder(dataset, Preprocess::isic(256, 224)?)
///     .batch_size(32)
///     .shuffle(true)
///     .prefetch(2)
///     .build()?;
///
/// for batch in loader.iter_epoch::<NdArray>(epoch, &device) {
///     let batch = batch?;
/// }
/// ```
pub struct ImageDataLoader {
    dataset: Arc<LesionDataset>,
    preprocess: Arc<Preprocess>,
    batch_size: usize,
    shuffle: bool,
    drop_last: bool,
    seed: Seed,
    split: Split,
    prefetch: usize,
}

impl ImageDataLoader {
    /// Create a new dataloader builder.
    #[must_use]
    pub fn builder(dataset: LesionDataset, preprocess: Preprocess) -> ImageDataLoaderBuilder {
        ImageDataLoaderBuilder::new(dataset, preprocess)
    }

    /// Get the dataset.
    #[must_use]
    pub fn dataset(&self) -> &LesionDataset {
        &self.dataset
    }

    /// Get the batch size.
    #[must_use]
    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Get the number of batches.
    #[must_use]
    pub fn n_batches(&self) -> usize {
        let n = self.dataset.len();
        if self.drop_last {
            n / self.batch_size
        } else {
            n.div_ceil(self.batch_size)
        }
    }

    /// Get the total number of samples.
    #[must_use]
    pub fn len(&self) -> usize {
        self.dataset.len()
    }

    /// Check if the loader is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.dataset.is_empty()
    }

    /// Get the data split type.
    #[must_use]
    pub fn split(&self) -> Split {
        self.split
    }

    /// Side length of produced images.
    #[must_use]
    pub fn image_size(&self) -> usize {
        self.preprocess.output_size()
    }

    /// Sample order for an epoch.
    fn order(&self, epoch_seed: Seed) -> Vec<usize> {
        let mut indices: Vec<usize> = (0..self.dataset.len()).collect();
        if self.shuffle {
            indices.shuffle(&mut epoch_seed.derive("shuffle").to_rng());
        }
        indices
    }

    /// Iterate the first epoch.
    #[must_use]
    pub fn iter<B: Backend>(&self, device: &B::Device) -> ImageDataLoaderIter<B> {
        self.iter_epoch(0, device)
    }

    /// Iterate a given epoch.
    #[must_use]
    pub fn iter_epoch<B: Backend>(&self, epoch: usize, device: &B::Device) -> ImageDataLoaderIter<B> {
        let epoch_seed = self.seed.derive(&format!("{}-epoch-{}", self.split, epoch));
        let plan = BatchPlan {
            dataset: Arc::clone(&self.dataset),
            preprocess: Arc::clone(&self.preprocess),
            order: self.order(epoch_seed),
            batch_size: self.batch_size,
            split: self.split,
            augment_seed: epoch_seed.derive("augment"),
        };
        let n_batches = self.n_batches();

        let source = if self.prefetch > 0 {
            BatchSource::prefetch(plan, n_batches, self.prefetch)
        } else {
            BatchSource::Inline { plan, next: 0 }
        };

        ImageDataLoaderIter {
            source,
            device: device.clone(),
            remaining: n_batches,
        }
    }
}

/// Builder for [`ImageDataLoader`].
pub struct ImageDataLoaderBuilder {
    dataset: LesionDataset,
    preprocess: Preprocess,
    batch_size: usize,
    shuffle: bool,
    drop_last: bool,
    seed: Seed,
    split: Split,
    prefetch: usize,
}

impl ImageDataLoaderBuilder {
    /// Create a new builder.
    #[must_use]
    pub fn new(dataset: LesionDataset, preprocess: Preprocess) -> Self {
        Self {
            dataset,
            preprocess,
            batch_size: 32,
            shuffle: false,
            drop_last: false,
            seed: Seed::default(),
            split: Split::Train,
            prefetch: 0,
        }
    }

    /// Set the batch size.
    #[must_use]
    pub fn batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    /// Enable or disable shuffling.
    #[must_use]
    pub fn shuffle(mut self, shuffle: bool) -> Self {
        self.shuffle = shuffle;
        self
    }

    /// Enable or disable dropping the last incomplete batch.
    #[must_use]
    pub fn drop_last(mut self, drop_last: bool) -> Self {
        self.drop_last = drop_last;
        self
    }

    /// Set the seed for shuffling and augmentation.
    #[must_use]
    pub fn seed(mut self, seed: Seed) -> Self {
        self.seed = seed;
        self
    }

    /// Set the data split type.
    #[must_use]
    pub fn split(mut self, split: Split) -> Self {
        self.split = split;
        self
    }

    /// Prepare up to `depth` batches on a background thread; 0 disables.
    #[must_use]
    pub fn prefetch(mut self, depth: usize) -> Self {
        self.prefetch = depth;
        self
    }

    /// Build the dataloader.
    ///
    /// # Errors
    ///
    /// Returns an error if the batch size is zero or the dataset is empty.
    pub fn build(self) -> Result<ImageDataLoader> {
        if self.batch_size == 0 {
            return Err(DataError::InvalidBatchSize(
                "Batch size must be greater than 0".to_string(),
            ));
        }

        if self.dataset.is_empty() {
            return Err(DataError::EmptyDataset);
        }

        Ok(ImageDataLoader {
            dataset: Arc::new(self.dataset),
            preprocess: Arc::new(self.preprocess),
            batch_size: self.batch_size,
            shuffle: self.shuffle,
            drop_last: self.drop_last,
            seed: self.seed,
            split: self.split,
            prefetch: self.prefetch,
        })
    }
}

/// A preprocessed batch in host memory.
#[derive(Debug, Clone)]
pub struct HostBatch {
    /// Pixels laid out as `(N, 3, H, W)`.
    pub pixels: Vec<f32>,
    /// Batch shape.
    pub shape: ImageShape,
    /// Class labels.
    pub labels: Vec<usize>,
}

impl HostBatch {
    /// Upload to a device.
    pub fn into_batch<B: Backend>(self, device: &B::Device) -> Result<ImageBatch<B>> {
        Ok(ImageBatch::from_host(self.pixels, self.shape, &self.labels, device)?)
    }
}

/// Everything needed to materialize the batches of one epoch.
struct BatchPlan {
    dataset: Arc<LesionDataset>,
    preprocess: Arc<Preprocess>,
    order: Vec<usize>,
    batch_size: usize,
    split: Split,
    augment_seed: Seed,
}

impl BatchPlan {
    fn load(&self, batch: usize) -> Result<HostBatch> {
        let start = batch * self.batch_size;
        let end = (start + self.batch_size).min(self.order.len());

        let samples = (start..end)
            .into_par_iter()
            .map(|position| {
                let (image, label) = self.dataset.get(self.order[position])?;
                // One generator per epoch position: same draws whatever thread runs it.
                let mut rng = self.augment_seed.worker(position).to_rng();
                let chw = self.preprocess.apply(image, self.split, &mut rng)?;
                Ok((chw, label))
            })
            .collect::<Result<Vec<_>>>()?;

        let side = self.preprocess.output_size();
        let shape = ImageShape::new(samples.len(), 3, side, side);
        let mut pixels = Vec::with_capacity(shape.numel());
        let mut labels = Vec::with_capacity(samples.len());
        for (chw, label) in samples {
            pixels.extend(chw.iter().copied());
            labels.push(label);
        }

        Ok(HostBatch {
            pixels,
            shape,
            labels,
        })
    }
}

enum BatchSource {
    Inline {
        plan: BatchPlan,
        next: usize,
    },
    Prefetch {
        rx: Option<Receiver<Result<HostBatch>>>,
        handle: Option<JoinHandle<()>>,
    },
}

impl BatchSource {
    fn prefetch(plan: BatchPlan, n_batches: usize, depth: usize) -> Self {
        let (tx, rx) = mpsc::sync_channel(depth.max(1));
        let handle = thread::spawn(move || {
            for batch in 0..n_batches {
                if tx.send(plan.load(batch)).is_err() {
                    return;
                }
            }
        });
        Self::Prefetch {
            rx: Some(rx),
            handle: Some(handle),
        }
    }

    fn next_host(&mut self) -> Result<HostBatch> {
        match self {
            Self::Inline { plan, next } => {
                let batch = plan.load(*next);
                *next += 1;
                batch
            }
            Self::Prefetch { rx, .. } => rx
                .as_ref()
                .ok_or_else(|| DataError::Worker("prefetch channel closed".into()))?
                .recv()
                .map_err(|_| DataError::Worker("prefetch thread exited early".into()))?,
        }
    }
}

impl Drop for BatchSource {
    fn drop(&mut self) {
        if let Self::Prefetch { rx, handle } = self {
            // Unblock a producer waiting on a full channel before joining it.
            drop(rx.take());
            if let Some(handle) = handle.take() {
                let _ = handle.join();
            }
        }
    }
}

/// Iterator over batches from an [`ImageDataLoader`].
pub struct ImageDataLoaderIter<B: Backend> {
    source: BatchSource,
    device: B::Device,
    remaining: usize,
}

impl<B: Backend> Iterator for ImageDataLoaderIter<B> {
    type Item = Result<ImageBatch<B>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 {
            return None;
        }
        self.remaining -= 1;
        Some(
            self.source
                .next_host()
                .and_then(|host| host.into_batch(&self.device)),
        )
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl<B: Backend> ExactSizeIterator for ImageDataLoaderIter<B> {}

#[cfg(test)]
mod tests {
    use super::*;
    use burn_ndarray::NdArray;
    use image::{Rgb, RgbImage};

    type TestBackend = NdArray;

    fn dataset(n: usize) -> LesionDataset {
        let images = (0..n)
            .map(|i| RgbImage::from_fn(20, 20, |x, y| Rgb([(i * 10) as u8, x as u8, y as u8])))
            .collect();
        let labels = (0..n).map(|i| i % 2).collect();
        LesionDataset::from_images(images, labels).unwrap()
    }

    fn loader(n: usize, prefetch: usize) -> ImageDataLoader {
        ImageDataLoader::builder(dataset(n), Preprocess::isic(16, 8).unwrap())
            .batch_size(3)
            .shuffle(true)
            .seed(Seed::new(9))
            .prefetch(prefetch)
            .build()
            .unwrap()
    }

    fn collect_labels(loader: &ImageDataLoader, epoch: usize) -> Vec<i64> {
        let device = Default::default();
        loader
            .iter_epoch::<TestBackend>(epoch, &device)
            .flat_map(|b| {
                b.unwrap()
                    .labels
                    .into_data()
                    .convert::<i64>()
                    .to_vec::<i64>()
                    .unwrap()
            })
            .collect()
    }

    #[test]
    fn test_batch_shapes() {
        let loader = loader(7, 0);
        assert_eq!(loader.n_batches(), 3);
        let device = Default::default();
        let batches: Vec<_> = loader.iter::<TestBackend>(&device).map(|b| b.unwrap()).collect();
        assert_eq!(batches.len(), 3);
        assert_eq!(batches[0].images.dims(), [3, 3, 8, 8]);
        assert_eq!(batches[2].images.dims(), [1, 3, 8, 8]);
    }

    #[test]
    fn test_drop_last() {
        let loader = ImageDataLoader::builder(dataset(7), Preprocess::isic(16, 8).unwrap())
            .batch_size(3)
            .drop_last(true)
            .build()
            .unwrap();
        assert_eq!(loader.n_batches(), 2);
        assert_eq!(loader.iter::<TestBackend>(&Default::default()).len(), 2);
    }

    #[test]
    fn test_epochs_are_replayable() {
        let loader = loader(12, 0);
        assert_eq!(collect_labels(&loader, 1), collect_labels(&loader, 1));
        let mut all = collect_labels(&loader, 2);
        all.sort_unstable();
        assert_eq!(all.iter().filter(|&&l| l == 1).count(), 6);
    }

    #[test]
    fn test_prefetch_matches_inline() {
        let device = Default::default();
        let pixels = |loader: &ImageDataLoader| -> Vec<f32> {
            loader
                .iter_epoch::<TestBackend>(3, &device)
                .flat_map(|b| b.unwrap().images.into_data().convert::<f32>().to_vec::<f32>().unwrap())
                .collect()
        };
        assert_eq!(pixels(&loader(8, 0)), pixels(&loader(8, 2)));
    }

    #[test]
    fn test_dropping_prefetch_iterator_early() {
        let loader = loader(30, 1);
        let mut iter = loader.iter::<TestBackend>(&Default::default());
        assert!(iter.next().unwrap().is_ok());
        drop(iter);
    }

    #[test]
    fn test_invalid_builder() {
        let zero = ImageDataLoader::builder(dataset(2), Preprocess::isic(16, 8).unwrap())
            .batch_size(0)
            .build();
        assert!(matches!(zero, Err(DataError::InvalidBatchSize(_))));
        let empty =
            ImageDataLoader::builder(LesionDataset::default(), Preprocess::isic(16, 8).unwrap()).build();
        assert!(matches!(empty, Err(DataError::EmptyDataset)));
    }
}
