// ============================================================
// Layer 4 — Image Folder Loader
// ============================================================
// Loads every .png/.jpg/.jpeg/.bmp/.gif file from one directory,
// resizes it to the target shape with a Lanczos3 filter, and
// stores it as CHW u8. There is no label information in a flat
// folder so every item gets label 0.
//
// A folder has no built-in validation split, so the loaded images
// are shuffled and split by `val_fraction`.

use anyhow::{Context, Result};
use image::imageops::FilterType;
use std::{
    fs,
    path::{Path, PathBuf},
};

use crate::data::dataset::DatasetError;
use crate::data::splitter::split_non_empty;
use crate::domain::image::{ImageItem, ImageShape, PixelImage};
use crate::domain::traits::{DatasetSource, DatasetSplits};

const EXTENSIONS: [&str; 5] = ["png", "jpg", "jpeg", "bmp", "gif"];

pub struct ImageFolderLoader {
    dir:          PathBuf,
    shape:        ImageShape,
    val_fraction: f64,
}

impl ImageFolderLoader {
    pub fn new(dir: impl Into<PathBuf>, shape: ImageShape, val_fraction: f64) -> Self {
        Self { dir: dir.into(), shape, val_fraction }
    }

    /// Sorted list of image files in the directory
    fn image_paths(&self) -> Result<Vec<PathBuf>> {
        if !self.dir.is_dir() {
            return Err(DatasetError::MissingFile(self.dir.clone()).into());
        }

        let mut paths = Vec::new();
        for entry in fs::read_dir(&self.dir)
            .with_context(|| format!("Cannot read directory '{}'", self.dir.display()))?
        {
            let path = entry?.path();
            let ext  = path
                .extension()
                .and_then(|e| e.to_str())
                .map(str::to_lowercase)
                .unwrap_or_default();
            if EXTENSIONS.contains(&ext.as_str()) {
                paths.push(path);
            }
        }
        paths.sort();
        Ok(paths)
    }
}

impl DatasetSource for ImageFolderLoader {
    fn load_splits(&self) -> Result<DatasetSplits> {
        let mut items = Vec::new();

        for path in self.image_paths()? {
            match load_single_image(&path, self.shape) {
                Ok(image) => items.push(ImageItem { image, label: 0 }),
                // One unreadable file should not sink the whole folder
                Err(e) => tracing::warn!("Skipping '{}': {e:#}", path.display()),
            }
        }

        if items.is_empty() {
            return Err(DatasetError::Empty(self.dir.display().to_string()).into());
        }
        tracing::info!("Loaded {} images from '{}'", items.len(), self.dir.display());

        let (train, validation) = split_non_empty(items, 1.0 - self.val_fraction)?;
        Ok(DatasetSplits { train, validation })
    }
}

/// Decode, resize and convert one file to a CHW PixelImage.
fn load_single_image(path: &Path, shape: ImageShape) -> Result<PixelImage> {
    let img = image::open(path)
        .with_context(|| format!("Cannot decode '{}'", path.display()))?;
    let img = img
        .resize_exact(shape.width as u32, shape.height as u32, FilterType::Lanczos3)
        .to_rgb8();

    // interleaved RGB (HWC) → planar CHW
    let plane    = shape.height * shape.width;
    let mut data = vec![0u8; shape.numel()];
    for (idx, pixel) in img.pixels().enumerate() {
        for c in 0..shape.channels.min(3) {
            data[c * plane + idx] = pixel[c];
        }
    }

    PixelImage::new(shape, data)
        .with_context(|| format!("'{}' does not match shape {:?}", path.display(), shape))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_png(path: &Path, rgb: [u8; 3]) {
        let img = image::RgbImage::from_pixel(8, 8, image::Rgb(rgb));
        img.save(path).unwrap();
    }

    #[test]
    fn test_loads_and_splits_folder() {
        let tmp = tempfile::tempdir().unwrap();
        for i in 0..10 {
            write_png(&tmp.path().join(format!("{i:02}.png")), [255, 0, 0]);
        }
        fs::write(tmp.path().join("notes.txt"), "not an image").unwrap();

        let loader = ImageFolderLoader::new(tmp.path(), ImageShape::new(3, 4, 4), 0.2);
        let splits = loader.load_splits().unwrap();
        assert_eq!(splits.train.len(), 8);
        assert_eq!(splits.validation.len(), 2);

        // resized and planar: red plane full, green plane empty
        let img = &splits.train[0].image;
        assert_eq!(img.shape, ImageShape::new(3, 4, 4));
        assert_eq!(img.at(0, 3, 3), 255);
        assert_eq!(img.at(1, 0, 0), 0);
    }

    #[test]
    fn test_empty_folder_is_an_error() {
        let tmp = tempfile::tempdir().unwrap();
        let loader = ImageFolderLoader::new(tmp.path(), ImageShape::CIFAR, 0.1);
        assert!(loader.load_splits().is_err());
    }

    #[test]
    fn test_corrupt_file_is_skipped() {
        let tmp = tempfile::tempdir().unwrap();
        write_png(&tmp.path().join("a.png"), [0, 0, 255]);
        write_png(&tmp.path().join("b.png"), [0, 255, 0]);
        fs::write(tmp.path().join("bad.png"), b"garbage").unwrap();

        let loader = ImageFolderLoader::new(tmp.path(), ImageShape::new(3, 2, 2), 0.5);
        let splits = loader.load_splits().unwrap();
        assert_eq!(splits.train.len() + splits.validation.len(), 2);
    }

    #[test]
    fn test_tiny_folder_still_gets_validation_images() {
        let tmp = tempfile::tempdir().unwrap();
        for i in 0..5 {
            write_png(&tmp.path().join(format!("{i}.png")), [9, 9, 9]);
        }
        let loader = ImageFolderLoader::new(tmp.path(), ImageShape::new(3, 2, 2), 0.1);
        let splits = loader.load_splits().unwrap();
        assert_eq!(splits.train.len(), 4);
        assert_eq!(splits.validation.len(), 1);
    }

    #[test]
    fn test_single_image_folder_cannot_be_split() {
        let tmp = tempfile::tempdir().unwrap();
        write_png(&tmp.path().join("only.png"), [9, 9, 9]);
        let loader = ImageFolderLoader::new(tmp.path(), ImageShape::new(3, 2, 2), 0.1);
        let err    = loader.load_splits().unwrap_err();
        assert!(err.to_string().contains("split"));
    }
}
