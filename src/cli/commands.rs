// ============================================================
// Layer 1 — CLI Commands and Arguments
// ============================================================
// Defines the two subcommands, `train` and `sample`, and all their
// flags. Defaults reproduce the reference CIFAR-10 run.

use clap::{Args, Subcommand, ValueEnum};
use crate::application::train_use_case::{AccumulationMode, DatasetKind, TrainConfig};

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Train the diffusion model
    Train(TrainArgs),

    /// Generate images from a saved checkpoint
    Sample(SampleArgs),
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum DatasetArg {
    /// CIFAR-10 binary batches
    Cifar10,
    /// Directory of image files
    Folder,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccumulationArg {
    Sum,
    Mean,
}

#[derive(Args, Debug)]
pub struct TrainArgs {
    // ── Data ──────────────────────────────────────────────────────────────────
    #[arg(long, value_enum, default_value_t = DatasetArg::Cifar10)]
    pub dataset: DatasetArg,

    /// CIFAR-10 root (or its cifar-10-batches-bin folder), or an image folder
    #[arg(long, default_value = "data/cifar10")]
    pub data_dir: String,

    /// Fetch CIFAR-10 into --data-dir when its batch files are missing
    #[arg(long)]
    pub download: bool,

    /// Share of a folder dataset held out for validation
    #[arg(long, default_value_t = 0.1)]
    pub val_fraction: f64,

    /// Shuffle training batches with this seed (sequential when absent)
    #[arg(long)]
    pub shuffle_seed: Option<u64>,

    /// DataLoader worker threads (0 batches on the training thread)
    #[arg(long, default_value_t = 1)]
    pub num_workers: usize,

    // ── Optimisation ──────────────────────────────────────────────────────────
    #[arg(long, default_value_t = 100_000)]
    pub num_iterations: usize,

    #[arg(long, default_value_t = 4)]
    pub batch_size: usize,

    /// Micro-batches per optimiser step
    #[arg(long, default_value_t = 4)]
    pub accumulation_steps: usize,

    /// Sum or average the micro-batch gradients
    #[arg(long, value_enum, default_value_t = AccumulationArg::Sum)]
    pub accumulation: AccumulationArg,

    #[arg(long, default_value_t = 1e-4)]
    pub learning_rate: f64,

    #[arg(long, default_value_t = 0.5)]
    pub grad_clip_norm: f64,

    // ── Instrumentation ───────────────────────────────────────────────────────
    #[arg(long, default_value_t = 100)]
    pub validate_every: usize,

    #[arg(long, default_value_t = 500)]
    pub generate_every: usize,

    /// Compute the Fréchet distance during training
    #[arg(long)]
    pub evaluate: bool,

    #[arg(long, default_value_t = 100_000)]
    pub evaluate_every: usize,

    #[arg(long, default_value_t = 50)]
    pub evaluate_batch_size: usize,

    #[arg(long, default_value_t = 10_000)]
    pub evaluate_num_samples: usize,

    // ── Model ─────────────────────────────────────────────────────────────────
    #[arg(long, default_value_t = 64)]
    pub base_channels: usize,

    #[arg(long, default_value_t = 8)]
    pub norm_groups: usize,

    /// Diffusion steps of the linear beta schedule
    #[arg(long, default_value_t = 1000)]
    pub timesteps: usize,

    #[arg(long, default_value_t = 32)]
    pub image_size: usize,

    // ── Output ────────────────────────────────────────────────────────────────
    /// Root directory for experiment sessions
    #[arg(long, default_value = "runs")]
    pub run_dir: String,

    #[arg(long, default_value = "cifar10-diffusion")]
    pub project: String,

    /// Save weights and config here after training
    #[arg(long)]
    pub checkpoint_dir: Option<String>,
}

/// The application layer never sees clap types.
impl From<TrainArgs> for TrainConfig {
    fn from(a: TrainArgs) -> Self {
        TrainConfig {
            dataset: match a.dataset {
                DatasetArg::Cifar10 => DatasetKind::Cifar10,
                DatasetArg::Folder  => DatasetKind::Folder,
            },
            data_dir:     a.data_dir,
            download:     a.download,
            val_fraction: a.val_fraction,
            shuffle_seed: a.shuffle_seed,
            num_workers:  a.num_workers,

            num_iterations:     a.num_iterations,
            batch_size:         a.batch_size,
            accumulation_steps: a.accumulation_steps,
            accumulation: match a.accumulation {
                AccumulationArg::Sum  => AccumulationMode::Sum,
                AccumulationArg::Mean => AccumulationMode::Mean,
            },
            learning_rate:  a.learning_rate,
            grad_clip_norm: a.grad_clip_norm,

            validate_every:       a.validate_every,
            generate_every:       a.generate_every,
            evaluate:             a.evaluate,
            evaluate_every:       a.evaluate_every,
            evaluate_batch_size:  a.evaluate_batch_size,
            evaluate_num_samples: a.evaluate_num_samples,

            base_channels: a.base_channels,
            norm_groups:   a.norm_groups,
            timesteps:     a.timesteps,
            image_size:    a.image_size,

            run_dir:        a.run_dir,
            project:        a.project,
            checkpoint_dir: a.checkpoint_dir,
        }
    }
}

#[derive(Args, Debug)]
pub struct SampleArgs {
    /// Directory written by `train --checkpoint-dir`
    #[arg(long, default_value = "checkpoints")]
    pub checkpoint_dir: String,

    /// Where to write the PNG files
    #[arg(long, default_value = "samples")]
    pub out_dir: String,

    #[arg(long, default_value_t = 16)]
    pub count: usize,

    /// Images generated per reverse-diffusion pass
    #[arg(long, default_value_t = 16)]
    pub batch_size: usize,
}
