// ============================================================
// Layer 5 — Sampler
// ============================================================
// Rebuilds a trained diffusion model from a checkpoint directory
// and draws images from it on the plain (non-autodiff) backend.

use anyhow::Result;

use crate::domain::image::PixelImage;
use crate::infra::checkpoint::CheckpointManager;
use crate::ml::diffusion::DiffusionWrapper;
use crate::ml::fidelity::model_output_to_images;

type InferBackend = burn::backend::Wgpu;

pub struct Sampler {
    model:  DiffusionWrapper<InferBackend>,
    device: burn::backend::wgpu::WgpuDevice,
}

impl Sampler {
    pub fn from_checkpoint(ckpt_manager: &CheckpointManager) -> Result<Self> {
        let device = burn::backend::wgpu::WgpuDevice::default();
        let cfg    = ckpt_manager.load_config()?;

        let model: DiffusionWrapper<InferBackend> = cfg.diffusion_config().init(&device);
        let model = ckpt_manager.load_model(model, &device)?;
        tracing::info!(
            "Model loaded from checkpoint ({} timesteps, {}×{})",
            cfg.timesteps, cfg.image_size, cfg.image_size,
        );
        Ok(Self { model, device })
    }

    /// Generate `count` images, `batch_size` at a time.
    pub fn sample(&self, count: usize, batch_size: usize) -> Result<Vec<PixelImage>> {
        let batch_size = batch_size.max(1);
        let mut images = Vec::with_capacity(count);

        while images.len() < count {
            let n = batch_size.min(count - images.len());
            images.extend(model_output_to_images(self.model.generate(n, &self.device))?);
            tracing::debug!("Sampled {}/{}", images.len(), count);
        }
        Ok(images)
    }
}
