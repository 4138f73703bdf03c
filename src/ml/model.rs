// ============================================================
// Layer 5 — Denoiser (UNet noise predictor)
// ============================================================
// Predicts the noise ε that was mixed into an image at timestep t.
//
// Resolution path for a 32×32 input with base width c:
//
//   in_conv            3  → c    32×32   ─┐ skip1
//   res1               c  → c    32×32    │
//   down1 (2×2, s2)    c  → c    16×16    │
//   res2               c  → 2c   16×16   ─┼ skip2
//   down2 (2×2, s2)    2c → 2c    8×8     │
//   res3               2c → 2c    8×8    ─┼ skip3
//   mid1, mid2         2c → 2c    8×8     │
//   up_res3  [mid|skip3]  4c → 2c 8×8     │
//   up2 (T 2×2, s2)    2c → 2c   16×16    │
//   up_res2  [·|skip2]    4c → c 16×16    │
//   up1 (T 2×2, s2)    c  → c    32×32    │
//   up_res1  [·|skip1]    2c → c 32×32   ─┘
//   out_norm → silu → out_conv  c → 3
//
// Height and width must be divisible by 4.

use burn::{
    nn::{
        conv::{Conv2d, Conv2dConfig, ConvTranspose2d, ConvTranspose2dConfig},
        GroupNorm, GroupNormConfig, Linear, LinearConfig, PaddingConfig2d,
    },
    prelude::*,
    tensor::activation,
};

#[derive(Config, Debug)]
pub struct DenoiserConfig {
    #[config(default = 3)]
    pub in_channels: usize,

    /// Width of the first level; deeper levels use 2×
    #[config(default = 64)]
    pub base_channels: usize,

    /// GroupNorm groups; must divide base_channels
    #[config(default = 8)]
    pub norm_groups: usize,
}

impl DenoiserConfig {
    pub fn init<B: Backend>(&self, device: &B::Device) -> Denoiser<B> {
        let c        = self.base_channels;
        let time_dim = c * 4;
        let res      = |cin: usize, cout: usize| self.res_block::<B>(cin, cout, time_dim, device);

        Denoiser {
            time:      TimeEmbedding::new(c, time_dim, device),
            in_conv:   conv3x3(self.in_channels, c, device),
            res1:      res(c, c),
            down1:     downsample(c, device),
            res2:      res(c, 2 * c),
            down2:     downsample(2 * c, device),
            res3:      res(2 * c, 2 * c),
            mid1:      res(2 * c, 2 * c),
            mid2:      res(2 * c, 2 * c),
            up_res3:   res(4 * c, 2 * c),
            up2:       upsample(2 * c, device),
            up_res2:   res(4 * c, c),
            up1:       upsample(c, device),
            up_res1:   res(2 * c, c),
            out_norm:  GroupNormConfig::new(self.norm_groups, c).init(device),
            out_conv:  conv3x3(c, self.in_channels, device),
        }
    }

    fn res_block<B: Backend>(
        &self,
        in_channels:  usize,
        out_channels: usize,
        time_dim:     usize,
        device:       &B::Device,
    ) -> ResBlock<B> {
        let skip = (in_channels != out_channels).then(|| {
            Conv2dConfig::new([in_channels, out_channels], [1, 1]).init(device)
        });
        ResBlock {
            norm1:     GroupNormConfig::new(self.norm_groups, in_channels).init(device),
            conv1:     conv3x3(in_channels, out_channels, device),
            time_proj: LinearConfig::new(time_dim, out_channels).init(device),
            norm2:     GroupNormConfig::new(self.norm_groups, out_channels).init(device),
            conv2:     conv3x3(out_channels, out_channels, device),
            skip,
        }
    }
}

fn conv3x3<B: Backend>(cin: usize, cout: usize, device: &B::Device) -> Conv2d<B> {
    Conv2dConfig::new([cin, cout], [3, 3])
        .with_padding(PaddingConfig2d::Same)
        .init(device)
}

fn downsample<B: Backend>(channels: usize, device: &B::Device) -> Conv2d<B> {
    Conv2dConfig::new([channels, channels], [2, 2])
        .with_stride([2, 2])
        .init(device)
}

fn upsample<B: Backend>(channels: usize, device: &B::Device) -> ConvTranspose2d<B> {
    ConvTranspose2dConfig::new([channels, channels], [2, 2])
        .with_stride([2, 2])
        .init(device)
}

// ─── Timestep embedding ───────────────────────────────────────────────────────

/// Sinusoidal features of the integer timestep followed by a
/// two-layer MLP.
#[derive(Module, Debug)]
pub struct TimeEmbedding<B: Backend> {
    linear1: Linear<B>,
    linear2: Linear<B>,
    dim:     usize,
}

impl<B: Backend> TimeEmbedding<B> {
    pub fn new(dim: usize, out_dim: usize, device: &B::Device) -> Self {
        Self {
            linear1: LinearConfig::new(dim, out_dim).init(device),
            linear2: LinearConfig::new(out_dim, out_dim).init(device),
            dim,
        }
    }

    pub fn forward(&self, timesteps: &[usize], device: &B::Device) -> Tensor<B, 2> {
        let t = sinusoidal_embedding::<B>(timesteps, self.dim, device);
        let t = activation::silu(self.linear1.forward(t));
        self.linear2.forward(t)
    }
}

/// [batch, dim] table of sin/cos features with geometric
/// frequencies from 1 down to 1/10000.
pub fn sinusoidal_embedding<B: Backend>(
    timesteps: &[usize],
    dim:       usize,
    device:    &B::Device,
) -> Tensor<B, 2> {
    let half = dim / 2;
    let freqs: Vec<f32> = (0..half)
        .map(|i| (-(i as f32) * 4.0 * std::f32::consts::LN_10 / half as f32).exp())
        .collect();

    let mut values = Vec::with_capacity(timesteps.len() * dim);
    for &t in timesteps {
        let args = freqs.iter().map(|f| t as f32 * f);
        values.extend(args.clone().map(f32::sin));
        values.extend(args.map(f32::cos));
        // odd dims: pad the last column
        values.extend(std::iter::repeat(0.0).take(dim - 2 * half));
    }

    Tensor::<B, 1>::from_floats(values.as_slice(), device).reshape([timesteps.len(), dim])
}

// ─── Residual block ───────────────────────────────────────────────────────────

#[derive(Module, Debug)]
pub struct ResBlock<B: Backend> {
    norm1:     GroupNorm<B>,
    conv1:     Conv2d<B>,
    time_proj: Linear<B>,
    norm2:     GroupNorm<B>,
    conv2:     Conv2d<B>,
    skip:      Option<Conv2d<B>>,
}

impl<B: Backend> ResBlock<B> {
    pub fn forward(&self, x: Tensor<B, 4>, t_emb: Tensor<B, 2>) -> Tensor<B, 4> {
        let h = self.conv1.forward(activation::silu(self.norm1.forward(x.clone())));

        // per-channel timestep shift, broadcast over H×W
        let t = self.time_proj.forward(activation::silu(t_emb));
        let [batch, channels] = t.dims();
        let h = h + t.reshape([batch, channels, 1, 1]);

        let h = self.conv2.forward(activation::silu(self.norm2.forward(h)));

        let residual = match &self.skip {
            Some(conv) => conv.forward(x),
            None       => x,
        };
        h + residual
    }
}

// ─── Denoiser ─────────────────────────────────────────────────────────────────

#[derive(Module, Debug)]
pub struct Denoiser<B: Backend> {
    time:     TimeEmbedding<B>,
    in_conv:  Conv2d<B>,
    res1:     ResBlock<B>,
    down1:    Conv2d<B>,
    res2:     ResBlock<B>,
    down2:    Conv2d<B>,
    res3:     ResBlock<B>,
    mid1:     ResBlock<B>,
    mid2:     ResBlock<B>,
    up_res3:  ResBlock<B>,
    up2:      ConvTranspose2d<B>,
    up_res2:  ResBlock<B>,
    up1:      ConvTranspose2d<B>,
    up_res1:  ResBlock<B>,
    out_norm: GroupNorm<B>,
    out_conv: Conv2d<B>,
}

impl<B: Backend> Denoiser<B> {
    /// x: [batch, C, H, W] noisy images, timesteps: one per batch row.
    /// Returns the predicted noise with the same shape as x.
    pub fn forward(&self, x: Tensor<B, 4>, timesteps: &[usize]) -> Tensor<B, 4> {
        let device = x.device();
        let t      = self.time.forward(timesteps, &device);

        let h     = self.in_conv.forward(x);
        let skip1 = self.res1.forward(h, t.clone());

        let h     = self.down1.forward(skip1.clone());
        let skip2 = self.res2.forward(h, t.clone());

        let h     = self.down2.forward(skip2.clone());
        let skip3 = self.res3.forward(h, t.clone());

        let h = self.mid1.forward(skip3.clone(), t.clone());
        let h = self.mid2.forward(h, t.clone());

        let h = self.up_res3.forward(Tensor::cat(vec![h, skip3], 1), t.clone());
        let h = self.up2.forward(h);
        let h = self.up_res2.forward(Tensor::cat(vec![h, skip2], 1), t.clone());
        let h = self.up1.forward(h);
        let h = self.up_res1.forward(Tensor::cat(vec![h, skip1], 1), t);

        self.out_conv.forward(activation::silu(self.out_norm.forward(h)))
    }
}
