// ============================================================
// Layer 4 — Image Batcher
// ============================================================
// Converts a Vec<ImageItem> into tensors on the target device.
//
//   Input:  N items, each C×H×W u8 pixels
//   Output: images [N, C, H, W] as floats in [0,1], labels [N]
//
// Pixels are flattened sample by sample, divided by 255 and
// reshaped; the CHW layout of ImageItem makes this a single copy.

use burn::{data::dataloader::batcher::Batcher, prelude::*};

use crate::domain::image::ImageItem;

#[derive(Debug, Clone)]
pub struct ImageBatch<B: Backend> {
    /// [batch, channels, height, width], values in [0,1]
    pub images: Tensor<B, 4>,

    /// [batch] class indices (unused by the diffusion loss)
    pub labels: Tensor<B, 1, Int>,
}

impl<B: Backend> ImageBatch<B> {
    pub fn len(&self) -> usize {
        self.images.dims()[0]
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Stateless; the DataLoader hands in the target device per batch.
#[derive(Clone, Debug, Default)]
pub struct ImageBatcher;

// ─── Burn Batcher Trait Implementation ────────────────────────────────────────
// This is what makes ImageBatcher work with Burn's DataLoader.
impl<B: Backend> Batcher<B, ImageItem, ImageBatch<B>> for ImageBatcher {
    /// All items must share one shape; `items` must be non-empty.
    fn batch(&self, items: Vec<ImageItem>, device: &B::Device) -> ImageBatch<B> {
        let batch_size = items.len();
        let [c, h, w]  = items[0].image.shape.as_array();

        let pixels: Vec<f32> = items
            .iter()
            .flat_map(|item| item.image.data.iter().map(|&p| p as f32 / 255.0))
            .collect();

        let labels: Vec<i32> = items.iter().map(|item| item.label as i32).collect();

        let images = Tensor::<B, 1>::from_floats(pixels.as_slice(), device)
            .reshape([batch_size, c, h, w]);
        let labels = Tensor::<B, 1, Int>::from_ints(labels.as_slice(), device);

        ImageBatch { images, labels }
    }
}
