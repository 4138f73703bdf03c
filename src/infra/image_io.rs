// ============================================================
// Layer 6 — Image Export
// ============================================================
// Writes CHW u8 images to disk via the `image` crate. Three-channel
// images become RGB files, single-channel images greyscale.

use anyhow::{bail, Context, Result};
use std::path::Path;

use crate::domain::image::PixelImage;

pub fn save_image(image: &PixelImage, path: &Path) -> Result<()> {
    let shape = image.shape;
    let (w, h) = (shape.width as u32, shape.height as u32);

    match shape.channels {
        3 => image::RgbImage::from_fn(w, h, |x, y| {
            let (x, y) = (x as usize, y as usize);
            image::Rgb([image.at(0, y, x), image.at(1, y, x), image.at(2, y, x)])
        })
        .save(path),
        1 => image::GrayImage::from_fn(w, h, |x, y| image::Luma([image.at(0, y as usize, x as usize)]))
            .save(path),
        n => bail!("cannot export an image with {n} channels"),
    }
    .with_context(|| format!("Cannot write image '{}'", path.display()))
}
