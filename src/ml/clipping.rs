// ============================================================
// Layer 5 — Global Gradient Norm Clipping
// ============================================================
// Treats every parameter gradient of a module as one long vector:
//
//   total = sqrt( Σ_p ‖g_p‖² )
//   if total > max:  g_p ← g_p · max / (total + 1e-6)   for every p
//
// Parameter ids are found with a ModuleVisitor; gradients live on
// the inner (non-autodiff) backend inside GradientsParams.

use std::marker::PhantomData;

use burn::{
    module::{AutodiffModule, ModuleVisitor, Param},
    optim::GradientsParams,
    prelude::*,
    tensor::{backend::AutodiffBackend, ElementConversion},
};

const EPSILON: f64 = 1e-6;

struct SquaredNorm<'a, B: AutodiffBackend> {
    grads: &'a GradientsParams,
    total: f64,
    _b:    PhantomData<B>,
}

impl<B: AutodiffBackend> ModuleVisitor<B> for SquaredNorm<'_, B> {
    fn visit_float<const D: usize>(&mut self, param: &Param<Tensor<B, D>>) {
        if let Some(grad) = self.grads.get::<B::InnerBackend, D>(param.id) {
            self.total += grad.powf_scalar(2.0).sum().into_scalar().elem::<f64>();
        }
    }
}

struct Rescale<'a, B: AutodiffBackend> {
    grads: &'a mut GradientsParams,
    scale: f64,
    _b:    PhantomData<B>,
}

impl<B: AutodiffBackend> ModuleVisitor<B> for Rescale<'_, B> {
    fn visit_float<const D: usize>(&mut self, param: &Param<Tensor<B, D>>) {
        if let Some(grad) = self.grads.remove::<B::InnerBackend, D>(param.id) {
            self.grads.register(param.id, grad.mul_scalar(self.scale));
        }
    }
}

/// L2 norm over all gradients of `module` held in `grads`.
pub fn global_grad_norm<B, M>(module: &M, grads: &GradientsParams) -> f64
where
    B: AutodiffBackend,
    M: AutodiffModule<B>,
{
    let mut visitor = SquaredNorm::<B> { grads, total: 0.0, _b: PhantomData };
    module.visit(&mut visitor);
    visitor.total.sqrt()
}

/// Scale all gradients so their global norm is at most `max_norm`.
/// Returns the norm before clipping.
pub fn clip_global_norm<B, M>(module: &M, grads: &mut GradientsParams, max_norm: f64) -> f64
where
    B: AutodiffBackend,
    M: AutodiffModule<B>,
{
    let total = global_grad_norm(module, grads);
    if total > max_norm {
        let scale       = max_norm / (total + EPSILON);
        let mut visitor = Rescale::<B> { grads, scale, _b: PhantomData };
        module.visit(&mut visitor);
        tracing::debug!("Clipped gradient norm {total:.4} → {max_norm}");
    }
    total
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::{Autodiff, NdArray};
    use burn::nn::{Linear, LinearConfig};

    type TestBackend = Autodiff<NdArray>;

    /// Linear(2 → 1) with every gradient entry equal to `x`:
    /// loss = x · Σ(W·[1, 1] + b) gives dW = [x, x], db = x.
    fn grads_for(x: f32) -> (Linear<TestBackend>, GradientsParams) {
        let device = Default::default();
        let linear: Linear<TestBackend> = LinearConfig::new(2, 1).init(&device);
        let ones   = Tensor::<TestBackend, 2>::ones([1, 2], &device);
        let loss   = linear.forward(ones).sum().mul_scalar(x);
        let grads  = GradientsParams::from_grads(loss.backward(), &linear);
        (linear, grads)
    }

    #[test]
    fn test_norm_sums_over_all_parameters() {
        let (linear, grads) = grads_for(0.3);
        // sqrt(3 · 0.09)
        approx::assert_abs_diff_eq!(global_grad_norm(&linear, &grads), 0.519_615, epsilon = 1e-5);
    }

    #[test]
    fn test_clipping_bounds_the_combined_norm() {
        let (linear, mut grads) = grads_for(0.3);

        let before = clip_global_norm(&linear, &mut grads, 0.5);
        approx::assert_abs_diff_eq!(before, 0.519_615, epsilon = 1e-5);

        let after = global_grad_norm(&linear, &grads);
        assert!(after <= 0.5 + 1e-5, "global norm {after} exceeds 0.5");
        approx::assert_abs_diff_eq!(after, 0.5, epsilon = 1e-4);

        // direction is preserved: every entry shrinks by the same factor
        let w: Vec<f32> = grads
            .get::<NdArray, 2>(linear.weight.id)
            .unwrap()
            .into_data()
            .to_vec()
            .unwrap();
        approx::assert_abs_diff_eq!(w[0], w[1], epsilon = 1e-7);
    }

    #[test]
    fn test_small_gradients_are_untouched() {
        let (linear, mut grads) = grads_for(0.1);
        let before = global_grad_norm(&linear, &grads);
        clip_global_norm(&linear, &mut grads, 0.5);
        approx::assert_abs_diff_eq!(global_grad_norm(&linear, &grads), before, epsilon = 1e-9);
    }
}
