// ============================================================
// Layer 2 — SampleUseCase
// ============================================================
// Loads a checkpoint and writes generated images as PNG files:
//
//   <out_dir>/sample_000.png, sample_001.png, …

use anyhow::{Context, Result};
use std::{fs, path::PathBuf};

use crate::infra::{checkpoint::CheckpointManager, image_io::save_image};
use crate::ml::inferencer::Sampler;

pub struct SampleUseCase {
    sampler: Sampler,
    out_dir: PathBuf,
}

impl SampleUseCase {
    pub fn new(checkpoint_dir: impl Into<PathBuf>, out_dir: impl Into<PathBuf>) -> Result<Self> {
        let ckpt    = CheckpointManager::open(checkpoint_dir)?;
        let sampler = Sampler::from_checkpoint(&ckpt)?;
        Ok(Self { sampler, out_dir: out_dir.into() })
    }

    /// Generate `count` images and return the written paths.
    pub fn execute(&self, count: usize, batch_size: usize) -> Result<Vec<PathBuf>> {
        fs::create_dir_all(&self.out_dir)
            .with_context(|| format!("Cannot create output directory '{}'", self.out_dir.display()))?;

        let images = self.sampler.sample(count, batch_size)?;
        let width  = count.saturating_sub(1).to_string().len().max(3);

        images
            .iter()
            .enumerate()
            .map(|(i, img)| {
                let path = self.out_dir.join(format!("sample_{i:0width$}.png"));
                save_image(img, &path)?;
                Ok(path)
            })
            .collect()
    }
}
