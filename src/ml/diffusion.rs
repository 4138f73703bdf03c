// ============================================================
// Layer 5 — Diffusion Wrapper (DDPM)
// ============================================================
// Wraps the denoiser with the forward noising process and the
// reverse sampler.
//
// Training (forward_loss):
//   t  ~ U{0, …, T−1}  per image
//   ε  ~ N(0, I)
//   x_t = √ᾱ_t · x_0 + √(1 − ᾱ_t) · ε
//   loss = mean((ε̂(x_t, t) − ε)²)
//
// Sampling (generate), t = T−1 … 0:
//   x̂_0    = clamp((x_t − √(1 − ᾱ_t) · ε̂) / √ᾱ_t, −1, 1)
//   μ       = (√ᾱ_{t−1} β_t / (1 − ᾱ_t)) · x̂_0
//           + (√α_t (1 − ᾱ_{t−1}) / (1 − ᾱ_t)) · x_t
//   x_{t−1} = μ + σ_t z,  σ_t² = β̃_t,  z = 0 at t = 0
//
// Betas grow linearly from 1e-4 to 0.02.

use burn::{prelude::*, tensor::Distribution};
use rand::Rng;
use thiserror::Error;

use crate::domain::image::ImageShape;
use crate::ml::model::{Denoiser, DenoiserConfig};

pub const BETA_START: f64 = 1e-4;
pub const BETA_END:   f64 = 0.02;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ModelError {
    #[error("input shape mismatch: expected [N, {}, {}, {}], got {actual:?}",
        .expected.channels, .expected.height, .expected.width)]
    ShapeMismatch { expected: ImageShape, actual: [usize; 4] },

    #[error("batch must contain at least one image")]
    EmptyBatch,
}

// ─── Noise schedule ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub struct NoiseSchedule {
    pub betas:          Vec<f32>,
    pub alphas:         Vec<f32>,
    pub alphas_cumprod: Vec<f32>,
}

use burn::constant;
constant!(NoiseSchedule);

impl core::fmt::Display for NoiseSchedule {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Debug::fmt(self, f)
    }
}

impl NoiseSchedule {
    pub fn linear(timesteps: usize) -> Self {
        let betas: Vec<f32> = (0..timesteps)
            .map(|i| {
                let frac = if timesteps > 1 { i as f64 / (timesteps - 1) as f64 } else { 0.0 };
                (BETA_START + frac * (BETA_END - BETA_START)) as f32
            })
            .collect();

        let alphas: Vec<f32> = betas.iter().map(|b| 1.0 - b).collect();

        let mut cumulative = 1.0f32;
        let alphas_cumprod = alphas
            .iter()
            .map(|a| {
                cumulative *= a;
                cumulative
            })
            .collect();

        Self { betas, alphas, alphas_cumprod }
    }

    pub fn len(&self) -> usize {
        self.betas.len()
    }

    /// ᾱ_{t−1}, with ᾱ_{−1} = 1
    fn alpha_cumprod_prev(&self, t: usize) -> f32 {
        if t == 0 { 1.0 } else { self.alphas_cumprod[t - 1] }
    }

    /// Posterior variance β̃_t
    pub fn posterior_variance(&self, t: usize) -> f32 {
        let prev = self.alpha_cumprod_prev(t);
        ((1.0 - prev) / (1.0 - self.alphas_cumprod[t]) * self.betas[t]).max(1e-20)
    }
}

// ─── Wrapper ──────────────────────────────────────────────────────────────────

#[derive(Config, Debug)]
pub struct DiffusionConfig {
    pub denoiser: DenoiserConfig,

    #[config(default = 1000)]
    pub timesteps: usize,

    #[config(default = 32)]
    pub image_size: usize,
}

impl DiffusionConfig {
    pub fn init<B: Backend>(&self, device: &B::Device) -> DiffusionWrapper<B> {
        let shape = ImageShape::new(self.denoiser.in_channels, self.image_size, self.image_size);
        DiffusionWrapper::new(self.denoiser.init(device), shape, self.timesteps)
    }
}

#[derive(Module, Debug)]
pub struct DiffusionWrapper<B: Backend> {
    denoiser: Denoiser<B>,
    channels: usize,
    height:   usize,
    width:    usize,
    schedule: NoiseSchedule,
}

impl<B: Backend> DiffusionWrapper<B> {
    pub fn new(denoiser: Denoiser<B>, input_shape: ImageShape, timesteps: usize) -> Self {
        Self {
            denoiser,
            channels: input_shape.channels,
            height:   input_shape.height,
            width:    input_shape.width,
            schedule: NoiseSchedule::linear(timesteps),
        }
    }

    pub fn input_shape(&self) -> ImageShape {
        ImageShape::new(self.channels, self.height, self.width)
    }

    pub fn denoiser(&self) -> &Denoiser<B> {
        &self.denoiser
    }

    fn check_shape(&self, dims: [usize; 4]) -> Result<(), ModelError> {
        let expected = self.input_shape();
        if dims[0] == 0 {
            return Err(ModelError::EmptyBatch);
        }
        if dims[1..] != expected.as_array() {
            return Err(ModelError::ShapeMismatch { expected, actual: dims });
        }
        Ok(())
    }

    /// Noise-prediction MSE for a batch of images already scaled to [-1,1].
    pub fn forward_loss(&self, images: Tensor<B, 4>) -> Result<Tensor<B, 1>, ModelError> {
        let dims = images.dims();
        self.check_shape(dims)?;
        let [batch, c, h, w] = dims;

        let schedule = &self.schedule;
        let mut rng  = rand::thread_rng();
        let t: Vec<usize> = (0..batch).map(|_| rng.gen_range(0..schedule.len())).collect();

        let device = images.device();
        let (signal, noise_scale): (Vec<f32>, Vec<f32>) = t
            .iter()
            .map(|&ti| {
                let ab = schedule.alphas_cumprod[ti];
                (ab.sqrt(), (1.0 - ab).sqrt())
            })
            .unzip();
        let signal = Tensor::<B, 1>::from_floats(signal.as_slice(), &device)
            .reshape([batch, 1, 1, 1])
            .expand([batch, c, h, w]);
        let noise_scale = Tensor::<B, 1>::from_floats(noise_scale.as_slice(), &device)
            .reshape([batch, 1, 1, 1])
            .expand([batch, c, h, w]);

        let noise = Tensor::random_like(&images, Distribution::Normal(0.0, 1.0));
        let noisy = images * signal + noise.clone() * noise_scale;

        let predicted = self.denoiser.forward(noisy, &t);
        Ok((predicted - noise).powf_scalar(2.0).mean())
    }

    /// Run the full reverse process for `count` images.
    /// Output values lie in [-1,1].
    pub fn generate(&self, count: usize, device: &B::Device) -> Tensor<B, 4> {
        let schedule  = &self.schedule;
        let timesteps = schedule.len();
        let [c, h, w] = self.input_shape().as_array();

        let mut x = Tensor::<B, 4>::random(
            [count, c, h, w],
            Distribution::Normal(0.0, 1.0),
            device,
        );

        for t in (0..timesteps).rev() {
            let eps = self.denoiser.forward(x.clone(), &vec![t; count]);

            let ab      = schedule.alphas_cumprod[t];
            let ab_prev = schedule.alpha_cumprod_prev(t);
            let beta    = schedule.betas[t];

            let x0 = (x.clone() - eps * (1.0 - ab).sqrt())
                .div_scalar(ab.sqrt())
                .clamp(-1.0, 1.0);

            let coeff_x0 = ab_prev.sqrt() * beta / (1.0 - ab);
            let coeff_xt = schedule.alphas[t].sqrt() * (1.0 - ab_prev) / (1.0 - ab);
            let mean     = x0.mul_scalar(coeff_x0) + x.mul_scalar(coeff_xt);

            x = if t > 0 {
                let z = Tensor::random([count, c, h, w], Distribution::Normal(0.0, 1.0), device);
                mean + z.mul_scalar(schedule.posterior_variance(t).sqrt())
            } else {
                mean
            };

            if t % 100 == 0 {
                tracing::debug!("Denoising step {}/{}", timesteps - t, timesteps);
            }
        }

        x.clamp(-1.0, 1.0)
    }
}
