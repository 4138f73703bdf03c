use std::path::PathBuf;

use burn::data::dataset::Dataset;
use thiserror::Error;

use crate::domain::image::ImageItem;

#[derive(Error, Debug)]
pub enum DatasetError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("dataset file not found: {}", .0.display())]
    MissingFile(PathBuf),

    #[error("malformed dataset file '{}': {reason}", .path.display())]
    Malformed { path: PathBuf, reason: String },

    #[error("dataset '{0}' contains no images")]
    Empty(String),

    #[error("batch size must be at least 1")]
    ZeroBatchSize,
}

pub struct ImageDataset {
    items: Vec<ImageItem>,
}

impl ImageDataset {
    pub fn new(items: Vec<ImageItem>) -> Self { Self { items } }
}

impl Dataset<ImageItem> for ImageDataset {
    fn get(&self, index: usize) -> Option<ImageItem> {
        self.items.get(index).cloned()
    }

    fn len(&self) -> usize {
        self.items.len()
    }
}
