//! Global-norm gradient clipping.
//!
//! Burn's optimizer-level clipping bounds each parameter's gradient on its own.
//! This module bounds the L2 norm of all gradients taken together, which keeps
//! the direction of the update intact.

use std::marker::PhantomData;

use burn::{
    module::{AutodiffModule, ModuleVisitor, ParamId},
    optim::GradientsParams,
    tensor::{backend::AutodiffBackend, ElementConversion, Tensor},
};

/// L2 norm over every parameter gradient of `module` found in `grads`.
pub fn grad_norm<B, M>(module: &M, grads: &GradientsParams) -> f64
where
    B: AutodiffBackend,
    M: AutodiffModule<B>,
{
    let mut visitor = SquaredNorm::<B> {
        grads,
        sum: 0.0,
        backend: PhantomData,
    };
    module.visit(&mut visitor);
    visitor.sum.sqrt()
}

/// Scale `grads` so that their global norm is at most `max_norm`.
///
/// Returns the clipped gradients and the norm measured before clipping.
/// Non-positive `max_norm` disables clipping.
pub fn clip_grad_norm<B, M>(module: &M, mut grads: GradientsParams, max_norm: f64) -> (GradientsParams, f64)
where
    B: AutodiffBackend,
    M: AutodiffModule<B>,
{
    let total_norm = grad_norm::<B, M>(module, &grads);
    if max_norm <= 0.0 {
        return (grads, total_norm);
    }

    let coef = max_norm / (total_norm + 1e-6);
    if coef < 1.0 {
        let mut visitor = ScaleGrads::<B> {
            grads: &mut grads,
            coef,
            backend: PhantomData,
        };
        module.visit(&mut visitor);
    }
    (grads, total_norm)
}

struct SquaredNorm<'a, B> {
    grads: &'a GradientsParams,
    sum: f64,
    backend: PhantomData<B>,
}

impl<B: AutodiffBackend> ModuleVisitor<B> for SquaredNorm<'_, B> {
    fn visit_float<const D: usize>(&mut self, id: ParamId, _tensor: &Tensor<B, D>) {
        if let Some(grad) = self.grads.get::<B::InnerBackend, D>(id) {
            self.sum += (grad.clone() * grad).sum().into_scalar().elem::<f64>();
        }
    }
}

struct ScaleGrads<'a, B> {
    grads: &'a mut GradientsParams,
    coef: f64,
    backend: PhantomData<B>,
}

impl<B: AutodiffBackend> ModuleVisitor<B> for ScaleGrads<'_, B> {
    fn visit_float<const D: usize>(&mut self, id: ParamId, _tensor: &Tensor<B, D>) {
        if let Some(grad) = self.grads.remove::<B::InnerBackend, D>(id) {
            self.grads
                .register::<B::InnerBackend, D>(id, grad.mul_scalar(self.coef));
        }
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;
    use burn::{
        backend::{Autodiff, NdArray},
        nn::{Linear, LinearConfig},
    };

    use super::*;

    type TestBackend = Autodiff<NdArray>;

    fn large_grads() -> (Linear<TestBackend>, GradientsParams) {
        let device = Default::default();
        let layer = LinearConfig::new(4, 2).init::<TestBackend>(&device);
        let input = Tensor::<TestBackend, 2>::ones([3, 4], &device);
        let loss = layer.forward(input).sum().mul_scalar(100.0);
        let grads = GradientsParams::from_grads(loss.backward(), &layer);
        (layer, grads)
    }

    #[test]
    fn norm_above_threshold_is_scaled_down() {
        let (layer, grads) = large_grads();
        let (clipped, before) = clip_grad_norm::<TestBackend, _>(&layer, grads, 1.0);

        assert!(before > 1.0);
        assert_relative_eq!(grad_norm::<TestBackend, _>(&layer, &clipped), 1.0, epsilon = 1e-4);
    }

    #[test]
    fn norm_below_threshold_is_untouched() {
        let (layer, grads) = large_grads();
        let before = grad_norm::<TestBackend, _>(&layer, &grads);
        let (clipped, measured) = clip_grad_norm::<TestBackend, _>(&layer, grads, before * 10.0);

        assert_relative_eq!(measured, before, epsilon = 1e-9);
        assert_relative_eq!(grad_norm::<TestBackend, _>(&layer, &clipped), before, epsilon = 1e-6);
    }

    #[test]
    fn non_positive_threshold_disables_clipping() {
        let (layer, grads) = large_grads();
        let before = grad_norm::<TestBackend, _>(&layer, &grads);
        let (clipped, _) = clip_grad_norm::<TestBackend, _>(&layer, grads, 0.0);

        assert_relative_eq!(grad_norm::<TestBackend, _>(&layer, &clipped), before, epsilon = 1e-6);
    }
}
