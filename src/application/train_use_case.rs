// ============================================================
// Layer 2 — TrainUseCase
// ============================================================
// Orchestrates the full training pipeline in order:
//
//   Step 1: Validate the configuration      (this layer)
//   Step 2: Load train/validation splits    (Layer 4 - data)
//   Step 3: Reference statistics for FID    (Layer 6 - infra)
//   Step 4: Open the experiment session     (Layer 6 - infra)
//   Step 5: Run the training loop           (Layer 5 - ml)
//   Step 6: Close session, save checkpoint  (Layer 6 - infra)
//
// If any step fails the session is still closed by its Drop impl,
// so metrics logged up to the failure survive on disk.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

use crate::data::{cifar::Cifar10Loader, loader::ImageFolderLoader};
use crate::domain::image::ImageShape;
use crate::domain::traits::{DatasetSource, DatasetSplits, MetricSink, SampleMetric};
use crate::infra::{
    checkpoint::CheckpointManager,
    frechet::{FrechetEvaluator, PooledPixelFeatures},
    session::RunSession,
};
use crate::ml::diffusion::DiffusionConfig;
use crate::ml::model::DenoiserConfig;
use crate::ml::trainer::run_training;

// ─── Enumerations ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DatasetKind {
    /// CIFAR-10 binary batches (data_batch_*.bin / test_batch.bin)
    Cifar10,
    /// A flat directory of image files, resized on load
    Folder,
}

/// How micro-batch losses combine across gradient accumulation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccumulationMode {
    /// Gradients add up; the effective step grows with accumulation_steps
    #[default]
    Sum,
    /// Each micro-batch loss is divided by accumulation_steps
    Mean,
}

impl AccumulationMode {
    /// Factor applied to each micro-batch loss before backward.
    pub fn loss_weight(self, accumulation_steps: usize) -> f64 {
        match self {
            AccumulationMode::Sum  => 1.0,
            AccumulationMode::Mean => 1.0 / accumulation_steps.max(1) as f64,
        }
    }
}

// ─── Config Errors ────────────────────────────────────────────────────────────

#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("{0} must be at least 1")]
    ZeroValue(&'static str),

    #[error("learning rate must be finite and positive, got {0}")]
    LearningRate(f64),

    #[error("gradient clip norm must be finite and positive, got {0}")]
    ClipNorm(f64),

    #[error("image size must be a positive multiple of 4, got {0}")]
    ImageSize(usize),

    #[error("CIFAR-10 images are 32×32, but image size is {0}")]
    CifarImageSize(usize),

    #[error("base channels ({channels}) must be divisible by norm groups ({groups})")]
    NormGroups { channels: usize, groups: usize },

    #[error("validation fraction must lie strictly between 0 and 1, got {0}")]
    ValFraction(f64),
}

// ─── Training Configuration ──────────────────────────────────────────────────
// All knobs of one training run. Serialisable so it can be written
// next to the metrics and next to the checkpoint, where the sampler
// reads it back to rebuild the model architecture.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainConfig {
    pub dataset:      DatasetKind,
    pub data_dir:     String,
    pub download:     bool,
    pub val_fraction: f64,
    pub shuffle_seed: Option<u64>,
    pub num_workers:  usize,

    pub num_iterations:     usize,
    pub batch_size:         usize,
    pub accumulation_steps: usize,
    pub accumulation:       AccumulationMode,
    pub learning_rate:      f64,
    pub grad_clip_norm:     f64,

    pub validate_every:       usize,
    pub generate_every:       usize,
    pub evaluate:             bool,
    pub evaluate_every:       usize,
    pub evaluate_batch_size:  usize,
    pub evaluate_num_samples: usize,

    pub base_channels: usize,
    pub norm_groups:   usize,
    pub timesteps:     usize,
    pub image_size:    usize,

    pub run_dir:        String,
    pub project:        String,
    pub checkpoint_dir: Option<String>,
}

impl Default for TrainConfig {
    fn default() -> Self {
        Self {
            dataset:      DatasetKind::Cifar10,
            data_dir:     "data/cifar10".to_string(),
            download:     false,
            val_fraction: 0.1,
            shuffle_seed: None,
            num_workers:  1,

            num_iterations:     100_000,
            batch_size:         4,
            accumulation_steps: 4,
            accumulation:       AccumulationMode::Sum,
            learning_rate:      1e-4,
            grad_clip_norm:     0.5,

            validate_every:       100,
            generate_every:       500,
            evaluate:             false,
            evaluate_every:       100_000,
            evaluate_batch_size:  50,
            evaluate_num_samples: 10_000,

            base_channels: 64,
            norm_groups:   8,
            timesteps:     1000,
            image_size:    32,

            run_dir:        "runs".to_string(),
            project:        "cifar10-diffusion".to_string(),
            checkpoint_dir: None,
        }
    }
}

impl TrainConfig {
    /// Reject values the training loop cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let counts = [
            ("num_iterations",       self.num_iterations),
            ("batch_size",           self.batch_size),
            ("accumulation_steps",   self.accumulation_steps),
            ("validate_every",       self.validate_every),
            ("generate_every",       self.generate_every),
            ("evaluate_every",       self.evaluate_every),
            ("evaluate_batch_size",  self.evaluate_batch_size),
            ("evaluate_num_samples", self.evaluate_num_samples),
            ("base_channels",        self.base_channels),
            ("norm_groups",          self.norm_groups),
            ("timesteps",            self.timesteps),
        ];
        if let Some((name, _)) = counts.iter().find(|(_, v)| *v == 0) {
            return Err(ConfigError::ZeroValue(name));
        }

        if !(self.learning_rate.is_finite() && self.learning_rate > 0.0) {
            return Err(ConfigError::LearningRate(self.learning_rate));
        }
        if !(self.grad_clip_norm.is_finite() && self.grad_clip_norm > 0.0) {
            return Err(ConfigError::ClipNorm(self.grad_clip_norm));
        }
        if self.image_size == 0 || self.image_size % 4 != 0 {
            return Err(ConfigError::ImageSize(self.image_size));
        }
        if self.dataset == DatasetKind::Cifar10 && self.image_size != 32 {
            return Err(ConfigError::CifarImageSize(self.image_size));
        }
        if self.base_channels % self.norm_groups != 0 {
            return Err(ConfigError::NormGroups {
                channels: self.base_channels,
                groups:   self.norm_groups,
            });
        }
        if self.dataset == DatasetKind::Folder
            && !(self.val_fraction > 0.0 && self.val_fraction < 1.0)
        {
            return Err(ConfigError::ValFraction(self.val_fraction));
        }
        Ok(())
    }

    pub fn image_shape(&self) -> ImageShape {
        ImageShape::new(3, self.image_size, self.image_size)
    }

    /// Architecture of the diffusion model described by this config.
    pub fn diffusion_config(&self) -> DiffusionConfig {
        let denoiser = DenoiserConfig::new()
            .with_base_channels(self.base_channels)
            .with_norm_groups(self.norm_groups);
        DiffusionConfig::new(denoiser)
            .with_timesteps(self.timesteps)
            .with_image_size(self.image_size)
    }

    /// Evaluation period, or None when evaluation is off.
    pub fn evaluation_period(&self) -> Option<usize> {
        self.evaluate.then_some(self.evaluate_every)
    }
}

// ─── TrainUseCase ─────────────────────────────────────────────────────────────
pub struct TrainUseCase {
    config: TrainConfig,
}

impl TrainUseCase {
    pub fn new(config: TrainConfig) -> Self {
        Self { config }
    }

    /// Run training end to end. Returns the run directory of the session.
    pub fn execute(&self) -> Result<PathBuf> {
        let cfg = &self.config;

        // ── Step 1: Validate ──────────────────────────────────────────────────
        cfg.validate().context("Invalid training configuration")?;
        if cfg.accumulation == AccumulationMode::Sum && cfg.accumulation_steps > 1 {
            tracing::warn!(
                "Summing gradients over {} micro-batches: the effective learning rate \
                 scales with accumulation_steps (use --accumulation mean to average)",
                cfg.accumulation_steps
            );
        }

        // ── Step 2: Load the dataset ──────────────────────────────────────────
        let splits = self.load_splits()?;
        tracing::info!(
            "Dataset ready: {} train, {} validation images",
            splits.train.len(),
            splits.validation.len()
        );

        // ── Step 3: Reference statistics for the quality metric ───────────────
        let evaluator = if cfg.evaluate {
            let reference = splits.train.iter().take(cfg.evaluate_num_samples).map(|item| &item.image);
            Some(FrechetEvaluator::from_reference(reference, PooledPixelFeatures::default())?)
        } else {
            None
        };

        // ── Step 4: Experiment session ────────────────────────────────────────
        let mut session = RunSession::init(&cfg.run_dir, &cfg.project, cfg)?;
        let run_dir     = session.dir().to_path_buf();

        // ── Step 5: Training loop (Layer 5) ───────────────────────────────────
        let metric = evaluator.as_ref().map(|e| e as &dyn SampleMetric);
        let model  = run_training(cfg, splits, &mut session, metric)?;
        session.finish()?;

        // ── Step 6: Checkpoint ────────────────────────────────────────────────
        if let Some(dir) = &cfg.checkpoint_dir {
            let ckpt = CheckpointManager::new(dir)?;
            ckpt.save_config(cfg)?;
            ckpt.save_model(&model)?;
            tracing::info!("Checkpoint written to '{}'", dir);
        }

        Ok(run_dir)
    }

    fn load_splits(&self) -> Result<DatasetSplits> {
        let cfg = &self.config;
        match cfg.dataset {
            DatasetKind::Cifar10 => {
                tracing::info!("Loading CIFAR-10 from '{}'", cfg.data_dir);
                Cifar10Loader::new(&cfg.data_dir)
                    .with_download(cfg.download)
                    .load_splits()
            }
            DatasetKind::Folder => {
                tracing::info!("Loading images from '{}'", cfg.data_dir);
                ImageFolderLoader::new(&cfg.data_dir, cfg.image_shape(), cfg.val_fraction).load_splits()
            }
        }
    }
}
