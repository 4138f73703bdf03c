// ============================================================
// Layer 3 — Image Domain Types
// ============================================================
// Pixels are stored channel-first (CHW) as u8, the layout both
// the CIFAR-10 binary files and PNG export work with. Conversion
// to floats happens in the batcher (Layer 4).

use serde::{Deserialize, Serialize};

/// Channel / height / width of one image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageShape {
    pub channels: usize,
    pub height:   usize,
    pub width:    usize,
}

impl ImageShape {
    /// CIFAR-10: 3 × 32 × 32
    pub const CIFAR: ImageShape = ImageShape { channels: 3, height: 32, width: 32 };

    pub fn new(channels: usize, height: usize, width: usize) -> Self {
        Self { channels, height, width }
    }

    /// Number of values in one image
    pub fn numel(&self) -> usize {
        self.channels * self.height * self.width
    }

    pub fn as_array(&self) -> [usize; 3] {
        [self.channels, self.height, self.width]
    }
}

/// A single 8-bit image, CHW order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PixelImage {
    pub shape: ImageShape,
    pub data:  Vec<u8>,
}

impl PixelImage {
    /// Returns None when `data` does not match `shape`.
    pub fn new(shape: ImageShape, data: Vec<u8>) -> Option<Self> {
        (data.len() == shape.numel()).then_some(Self { shape, data })
    }

    /// Value at (channel, y, x)
    pub fn at(&self, c: usize, y: usize, x: usize) -> u8 {
        let plane = self.shape.height * self.shape.width;
        self.data[c * plane + y * self.shape.width + x]
    }
}

/// One labelled dataset sample. The label is carried along but
/// never used by the diffusion objective.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageItem {
    pub image: PixelImage,
    pub label: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejects_wrong_length() {
        assert!(PixelImage::new(ImageShape::new(3, 2, 2), vec![0; 11]).is_none());
        assert!(PixelImage::new(ImageShape::new(3, 2, 2), vec![0; 12]).is_some());
    }

    #[test]
    fn test_chw_indexing() {
        let shape = ImageShape::new(2, 2, 3);
        let img   = PixelImage::new(shape, (0..12).collect()).unwrap();
        // channel 1 starts after 2*3 values
        assert_eq!(img.at(1, 0, 0), 6);
        assert_eq!(img.at(0, 1, 2), 5);
        assert_eq!(img.at(1, 1, 1), 10);
    }
}
