// ============================================================
// Layer 5 — Fidelity Wrapper
// ============================================================
// Adapts the diffusion generator to the SampleSource seam used by
// the distance metric:
//
//   sample(n) → generate(n) in [-1,1] → rescale to [0,1]
//             → round(255x) clamped → u8 CHW images

use anyhow::{anyhow, Result};
use burn::prelude::*;

use crate::data::scaling::{quantize, rescale};
use crate::domain::image::{ImageShape, PixelImage};
use crate::domain::traits::SampleSource;
use crate::ml::diffusion::DiffusionWrapper;

/// Split a [N, C, H, W] tensor with values in [0,1] into 8-bit images.
pub fn unit_tensor_to_images<B: Backend>(images: Tensor<B, 4>) -> Result<Vec<PixelImage>> {
    let [n, c, h, w] = images.dims();
    let values: Vec<f32> = images
        .into_data()
        .convert::<f32>()
        .to_vec()
        .map_err(|e| anyhow!("Cannot read generated pixels: {e:?}"))?;

    let shape = ImageShape::new(c, h, w);
    let per   = shape.numel();
    (0..n)
        .map(|i| {
            let data = values[i * per..(i + 1) * per].iter().map(|&v| quantize(v)).collect();
            PixelImage::new(shape, data).ok_or_else(|| anyhow!("pixel count mismatch"))
        })
        .collect()
}

/// Same as `unit_tensor_to_images` for model output in [-1,1].
pub fn model_output_to_images<B: Backend>(samples: Tensor<B, 4>) -> Result<Vec<PixelImage>> {
    unit_tensor_to_images(rescale(samples))
}

pub struct FidelityWrapper<'a, B: Backend> {
    generator:  &'a DiffusionWrapper<B>,
    device:     B::Device,
    batch_size: usize,
}

impl<'a, B: Backend> FidelityWrapper<'a, B> {
    pub fn new(generator: &'a DiffusionWrapper<B>, device: B::Device, batch_size: usize) -> Self {
        Self { generator, device, batch_size: batch_size.max(1) }
    }
}

impl<B: Backend> SampleSource for FidelityWrapper<'_, B> {
    fn batch_size(&self) -> usize {
        self.batch_size
    }

    fn sample(&mut self, n: usize) -> Result<Vec<PixelImage>> {
        if n == 0 {
            return Ok(Vec::new());
        }
        model_output_to_images(self.generator.generate(n, &self.device))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ml::diffusion::DiffusionConfig;
    use crate::ml::model::DenoiserConfig;
    use burn::backend::NdArray;

    type TestBackend = NdArray;

    #[test]
    fn test_unit_tensor_quantization() {
        let device = Default::default();
        let x = Tensor::<TestBackend, 1>::from_floats([0.0f32, 0.5, 1.0, 1.2, -0.1, 0.2, 0.3, 0.4], &device)
            .reshape([2, 1, 2, 2]);
        let images = unit_tensor_to_images(x).unwrap();
        assert_eq!(images.len(), 2);
        assert_eq!(images[0].data, vec![0, 128, 255, 255]);
        assert_eq!(images[1].data, vec![0, 51, 77, 102]);
    }

    #[test]
    fn test_model_range_maps_to_full_u8_range() {
        let device = Default::default();
        let x = Tensor::<TestBackend, 1>::from_floats([-1.0f32, 0.0, 1.0, 3.0], &device)
            .reshape([1, 1, 2, 2]);
        let images = model_output_to_images(x).unwrap();
        assert_eq!(images[0].data, vec![0, 128, 255, 255]);
    }

    #[test]
    fn test_wrapper_emits_requested_count() {
        let device = Default::default();
        let model = DiffusionConfig::new(
            DenoiserConfig::new().with_base_channels(8).with_norm_groups(4),
        )
        .with_timesteps(2)
        .with_image_size(4)
        .init::<TestBackend>(&device);

        let mut wrapper = FidelityWrapper::new(&model, device, 0);
        assert_eq!(wrapper.batch_size(), 1);
        let images = wrapper.sample(3).unwrap();
        assert_eq!(images.len(), 3);
        assert!(images.iter().all(|img| img.data.len() == 3 * 4 * 4));
        assert!(wrapper.sample(0).unwrap().is_empty());
    }
}
