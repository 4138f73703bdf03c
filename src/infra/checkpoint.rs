// ============================================================
// Layer 6 — Checkpoint Manager
// ============================================================
// Saves and restores model weights using Burn's CompactRecorder.
//
// Directory layout:
//   checkpoints/
//     model.mpk            ← weights (CompactRecorder adds the extension)
//     train_config.json    ← the TrainConfig of the run
//
// The config is needed to rebuild the exact architecture
// (base_channels, norm_groups, timesteps, image_size) before
// the weights can be loaded into it.

use anyhow::{Context, Result};
use std::{fs, path::PathBuf};
use burn::{
    prelude::*,
    record::{CompactRecorder, Recorder},
};

use crate::application::train_use_case::TrainConfig;
use crate::ml::diffusion::DiffusionWrapper;

const MODEL_FILE:  &str = "model";
const CONFIG_FILE: &str = "train_config.json";

pub struct CheckpointManager {
    dir: PathBuf,
}

impl CheckpointManager {
    /// Open a checkpoint directory, creating it if needed.
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)
            .with_context(|| format!("Cannot create checkpoint directory '{}'", dir.display()))?;
        Ok(Self { dir })
    }

    /// Open an existing checkpoint directory for reading.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        if !dir.is_dir() {
            anyhow::bail!(
                "Checkpoint directory '{}' does not exist. Have you run 'train' with --checkpoint-dir?",
                dir.display()
            );
        }
        Ok(Self { dir })
    }

    pub fn save_model<B: Backend>(&self, model: &DiffusionWrapper<B>) -> Result<()> {
        let path = self.dir.join(MODEL_FILE);

        CompactRecorder::new()
            .record(model.clone().into_record(), path.clone())
            .with_context(|| format!("Failed to save checkpoint to '{}'", path.display()))?;

        tracing::debug!("Saved model weights to '{}'", path.display());
        Ok(())
    }

    /// Load saved weights into `model`, which must have the saved architecture.
    pub fn load_model<B: Backend>(
        &self,
        model:  DiffusionWrapper<B>,
        device: &B::Device,
    ) -> Result<DiffusionWrapper<B>> {
        let path = self.dir.join(MODEL_FILE);

        let record = CompactRecorder::new()
            .load(path.clone(), device)
            .with_context(|| format!("Cannot load checkpoint '{}'", path.display()))?;

        Ok(model.load_record(record))
    }

    pub fn save_config(&self, cfg: &TrainConfig) -> Result<()> {
        let path = self.dir.join(CONFIG_FILE);
        let json = serde_json::to_string_pretty(cfg)?;

        fs::write(&path, json)
            .with_context(|| format!("Cannot write config to '{}'", path.display()))?;

        tracing::debug!("Saved training config to '{}'", path.display());
        Ok(())
    }

    pub fn load_config(&self) -> Result<TrainConfig> {
        let path = self.dir.join(CONFIG_FILE);

        let json = fs::read_to_string(&path)
            .with_context(|| format!("Cannot read config from '{}'", path.display()))?;

        serde_json::from_str(&json)
            .with_context(|| format!("Malformed config in '{}'", path.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;

    type TestBackend = NdArray;

    fn tiny_config() -> TrainConfig {
        TrainConfig {
            base_channels: 8,
            norm_groups:   4,
            timesteps:     4,
            image_size:    8,
            ..TrainConfig::default()
        }
    }

    #[test]
    fn test_config_round_trip() {
        let tmp  = tempfile::tempdir().unwrap();
        let ckpt = CheckpointManager::new(tmp.path().join("ckpt")).unwrap();
        let cfg  = tiny_config();

        ckpt.save_config(&cfg).unwrap();
        assert_eq!(ckpt.load_config().unwrap(), cfg);
    }

    #[test]
    fn test_weights_round_trip() {
        let tmp    = tempfile::tempdir().unwrap();
        let ckpt   = CheckpointManager::new(tmp.path()).unwrap();
        let device = Default::default();
        let cfg    = tiny_config().diffusion_config();

        let saved: DiffusionWrapper<TestBackend> = cfg.init(&device);
        ckpt.save_model(&saved).unwrap();

        let fresh: DiffusionWrapper<TestBackend> = cfg.init(&device);
        let loaded = ckpt.load_model(fresh, &device).unwrap();

        let x = Tensor::<TestBackend, 4>::ones([1, 3, 8, 8], &device);
        let a: Vec<f32> = saved.denoiser().forward(x.clone(), &[2]).into_data().to_vec().unwrap();
        let b: Vec<f32> = loaded.denoiser().forward(x, &[2]).into_data().to_vec().unwrap();
        // CompactRecorder stores half precision
        approx::assert_abs_diff_eq!(a.as_slice(), b.as_slice(), epsilon = 2e-2);
    }

    #[test]
    fn test_open_missing_dir_fails() {
        let tmp = tempfile::tempdir().unwrap();
        assert!(CheckpointManager::open(tmp.path().join("nope")).is_err());
        assert!(CheckpointManager::open(tmp.path()).unwrap().load_config().is_err());
    }
}
