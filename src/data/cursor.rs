// ============================================================
// Layer 4 — Batch Cursor
// ============================================================
// Batches come from Burn's DataLoader; the cursor only cycles it.
// When a pass is exhausted it asks the loader for a fresh iterator,
// so `next()` never returns None for a non-empty loader and the
// cursor must not be collected or otherwise drained eagerly.
//
// Per pass (decided by the loader):
//   - order is sequential, or reshuffled from the seeded RNG
//   - ceil(len / batch_size) batches, the last one possibly short
//   - no skipping or de-duplication across pass boundaries

use std::sync::Arc;

use burn::{
    data::{
        dataloader::{DataLoader, DataLoaderBuilder, DataLoaderIterator},
        dataset::Dataset,
    },
    prelude::*,
};

use crate::data::{
    batcher::{ImageBatch, ImageBatcher},
    dataset::DatasetError,
};
use crate::domain::image::ImageItem;

pub type ImageLoader<B> = Arc<dyn DataLoader<B, ImageBatch<B>>>;

/// Build a Burn DataLoader over `dataset`.
///
/// `num_workers = 0` batches on the calling thread; more workers
/// prefetch in the background.
pub fn build_loader<B: Backend, D: Dataset<ImageItem> + 'static>(
    dataset:      D,
    batch_size:   usize,
    shuffle_seed: Option<u64>,
    num_workers:  usize,
    device:       &B::Device,
) -> Result<ImageLoader<B>, DatasetError> {
    if batch_size == 0 {
        return Err(DatasetError::ZeroBatchSize);
    }
    if dataset.len() == 0 {
        return Err(DatasetError::Empty("loader source".to_string()));
    }

    let mut builder = DataLoaderBuilder::new(ImageBatcher)
        .batch_size(batch_size)
        .set_device(device.clone());
    if let Some(seed) = shuffle_seed {
        builder = builder.shuffle(seed);
    }
    if num_workers > 0 {
        builder = builder.num_workers(num_workers);
    }
    Ok(builder.build(dataset))
}

pub struct BatchCursor<'a, B: Backend> {
    loader: &'a dyn DataLoader<B, ImageBatch<B>>,
    iter:   Box<dyn DataLoaderIterator<ImageBatch<B>> + 'a>,
    passes: usize,
    served: usize,
}

impl<'a, B: Backend> BatchCursor<'a, B> {
    pub fn new(loader: &'a dyn DataLoader<B, ImageBatch<B>>) -> Result<Self, DatasetError> {
        if loader.num_items() == 0 {
            return Err(DatasetError::Empty("cursor source".to_string()));
        }
        Ok(Self { loader, iter: loader.iter(), passes: 0, served: 0 })
    }

    /// Completed passes over the dataset
    pub fn passes(&self) -> usize {
        self.passes
    }

    /// Total batches handed out so far
    pub fn served(&self) -> usize {
        self.served
    }
}

impl<B: Backend> Iterator for BatchCursor<'_, B> {
    type Item = ImageBatch<B>;

    fn next(&mut self) -> Option<Self::Item> {
        let batch = match self.iter.next() {
            Some(batch) => batch,
            None => {
                self.passes += 1;
                let loader = self.loader;
                self.iter  = loader.iter();
                tracing::debug!("Batch cursor restarting (pass {})", self.passes + 1);
                self.iter.next()?
            }
        };
        self.served += 1;
        Some(batch)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::dataset::ImageDataset;
    use crate::domain::image::{ImageShape, PixelImage};
    use burn::backend::NdArray;

    type TestBackend = NdArray;

    /// Items whose label is their index; pixel value = index too.
    fn dataset(n: usize) -> ImageDataset {
        let shape = ImageShape::new(1, 1, 1);
        ImageDataset::new(
            (0..n)
                .map(|i| ImageItem {
                    image: PixelImage::new(shape, vec![i as u8]).unwrap(),
                    label: i,
                })
                .collect(),
        )
    }

    fn loader(n: usize, batch: usize, seed: Option<u64>) -> ImageLoader<TestBackend> {
        build_loader(dataset(n), batch, seed, 0, &Default::default()).unwrap()
    }

    fn labels(batch: ImageBatch<TestBackend>) -> Vec<i64> {
        batch
            .labels
            .into_data()
            .convert::<i64>()
            .to_vec()
            .unwrap()
    }

    #[test]
    fn test_yields_d_over_b_batches_then_repeats() {
        let loader = loader(12, 4, None);
        let mut c  = BatchCursor::new(loader.as_ref()).unwrap();

        let first_pass: Vec<Vec<i64>> = (0..3).map(|_| labels(c.next().unwrap())).collect();
        assert_eq!(first_pass[0], vec![0, 1, 2, 3]);
        assert_eq!(first_pass[2], vec![8, 9, 10, 11]);
        assert_eq!(c.passes(), 0);

        // fourth call wraps around to the start
        assert_eq!(labels(c.next().unwrap()), vec![0, 1, 2, 3]);
        assert_eq!(c.passes(), 1);
        assert_eq!(c.served(), 4);
    }

    #[test]
    fn test_never_exhausts() {
        let loader = loader(3, 2, None);
        let c      = BatchCursor::new(loader.as_ref()).unwrap();
        // take() keeps this finite; the cursor itself never ends
        assert_eq!(c.take(50).count(), 50);
    }

    #[test]
    fn test_last_batch_of_pass_may_be_short() {
        let loader = loader(5, 2, None);
        let mut c  = BatchCursor::new(loader.as_ref()).unwrap();
        let sizes: Vec<usize> = (0..4).map(|_| c.next().unwrap().len()).collect();
        assert_eq!(sizes, vec![2, 2, 1, 2]);
        assert_eq!(c.passes(), 1);
    }

    #[test]
    fn test_shuffled_pass_covers_every_item_once() {
        let loader = loader(10, 5, Some(7));
        let mut c  = BatchCursor::new(loader.as_ref()).unwrap();
        let mut seen: Vec<i64> = (0..2).flat_map(|_| labels(c.next().unwrap())).collect();
        seen.sort();
        assert_eq!(seen, (0..10).collect::<Vec<i64>>());
        assert_eq!(c.passes(), 0);
    }

    #[test]
    fn test_worker_loader_cycles_too() {
        let loader = build_loader::<TestBackend, _>(dataset(4), 2, None, 1, &Default::default()).unwrap();
        let c      = BatchCursor::new(loader.as_ref()).unwrap();
        let total: usize = c.take(6).map(|b| b.len()).sum();
        assert_eq!(total, 12);
    }

    #[test]
    fn test_rejects_empty_dataset_and_zero_batch() {
        let device = Default::default();
        assert!(matches!(
            build_loader::<TestBackend, _>(dataset(0), 4, None, 0, &device),
            Err(DatasetError::Empty(_))
        ));
        assert!(matches!(
            build_loader::<TestBackend, _>(dataset(4), 0, None, 0, &device),
            Err(DatasetError::ZeroBatchSize)
        ));
    }
}
