// ============================================================
// Layer 5 — ML / Model Layer (Burn)
// ============================================================
// All model, diffusion and training code built on Burn.
//
//   model.rs      — UNet noise predictor with sinusoidal time
//                   embedding and residual blocks
//
//   diffusion.rs  — linear beta schedule, noise-prediction loss,
//                   DDPM reverse sampling
//
//   fidelity.rs   — adapts the generator to the metric seam
//                   (u8 images in batches)
//
//   clipping.rs   — global L2 norm clipping over all gradients
//
//   trainer.rs    — the iteration loop: accumulation, clipping,
//                   Adam, validation, generation, evaluation
//
//   inferencer.rs — loads a checkpoint and samples images

/// UNet denoiser architecture
pub mod model;

/// Noise schedule, training loss and reverse sampling
pub mod diffusion;

/// Generator → u8 image adapter for quality metrics
pub mod fidelity;

/// Global gradient norm clipping
pub mod clipping;

/// Training loop with periodic instrumentation
pub mod trainer;

/// Checkpoint loading and sampling
pub mod inferencer;
