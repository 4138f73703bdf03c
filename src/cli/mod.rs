// ============================================================
// Layer 1 — CLI / Presentation Layer
// ============================================================
// Entry point for all user interaction, parsed with `clap`.
// All work is delegated to Layer 2 (application).
//
//   1. `train`  — trains the diffusion model and logs a session
//   2. `sample` — loads a checkpoint and writes PNG samples

pub mod commands;

use anyhow::Result;
use clap::Parser;
use commands::{Commands, SampleArgs, TrainArgs};

#[derive(Parser, Debug)]
#[command(
    name = "cifar-diffusion",
    version = "0.1.0",
    about = "Train a DDPM image diffusion model on CIFAR-10, then sample from it."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    /// Route to the matching use case; this layer never computes.
    pub fn run(self) -> Result<()> {
        match self.command {
            Commands::Train(args)  => run_train(args),
            Commands::Sample(args) => run_sample(args),
        }
    }
}

fn run_train(args: TrainArgs) -> Result<()> {
    use crate::application::train_use_case::TrainUseCase;

    tracing::info!("Starting training on '{}'", args.data_dir);

    let run_dir = TrainUseCase::new(args.into()).execute()?;

    println!("Training complete. Run logged to {}", run_dir.display());
    Ok(())
}

fn run_sample(args: SampleArgs) -> Result<()> {
    use crate::application::sample_use_case::SampleUseCase;

    let use_case = SampleUseCase::new(&args.checkpoint_dir, &args.out_dir)?;
    let written  = use_case.execute(args.count, args.batch_size)?;

    println!("Wrote {} images to {}", written.len(), args.out_dir);
    Ok(())
}
