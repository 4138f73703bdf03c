// ============================================================
// Layer 4 — Pixel Range Conversions
// ============================================================
//   scale    : [0,1]  → [-1,1]   x ↦ 2x − 1     (model input)
//   rescale  : [-1,1] → [0,1]    x ↦ (x + 1)/2  (display / metrics)
//   quantize : [0,1]  → u8       x ↦ round(255x), clamped
//
// scale and rescale are exact inverses of each other.

use burn::prelude::*;

pub fn scale<B: Backend, const D: usize>(x: Tensor<B, D>) -> Tensor<B, D> {
    x.mul_scalar(2.0).sub_scalar(1.0)
}

pub fn rescale<B: Backend, const D: usize>(x: Tensor<B, D>) -> Tensor<B, D> {
    x.add_scalar(1.0).div_scalar(2.0)
}

/// [0,1] float → 8-bit pixel. Out-of-range inputs saturate.
pub fn quantize(x: f32) -> u8 {
    (x * 255.0).round().clamp(0.0, 255.0) as u8
}
