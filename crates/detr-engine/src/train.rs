//! One training epoch.

use std::collections::BTreeMap;

use burn::{
    module::AutodiffModule,
    optim::{GradientsParams, Optimizer},
    tensor::{backend::AutodiffBackend, ElementConversion},
};
use detr_metric::{reduce_dict, MetricLogger, ProgressTracker, SmoothedValue, ValueFormat};

use crate::{
    clip::clip_grad_norm,
    data::Batch,
    engine::Engine,
    error::{EngineError, EngineResult},
    loss::{loss_values, weighted_loss, Criterion, LossSummary, CLASS_ERROR},
    model::Detector,
    optim::TrainOptimizer,
};

impl Engine {
    /// Run one pass over `data_loader`, updating `model` after every batch.
    ///
    /// `logger` is cleared on entry and holds the epoch's meters on return.
    /// The returned map holds the global average of every meter, synchronised
    /// across workers. `max_norm > 0` enables global-norm gradient clipping.
    ///
    /// A non-finite loss is handed to the engine's
    /// [`DivergenceHandler`](crate::DivergenceHandler) before any optimiser step.
    #[allow(clippy::too_many_arguments)]
    pub fn train_one_epoch<B, M, C, O, I>(
        &self,
        mut model: M,
        criterion: &C,
        data_loader: I,
        optimizer: &mut TrainOptimizer<O>,
        device: &B::Device,
        epoch: usize,
        max_norm: f64,
        logger: &mut MetricLogger,
    ) -> EngineResult<(M, BTreeMap<String, f64>)>
    where
        B: AutodiffBackend,
        M: AutodiffModule<B> + Detector<B>,
        C: Criterion<B, M::Output>,
        O: Optimizer<M, B>,
        I: IntoIterator<Item = Batch<B>>,
    {
        logger.clear();
        logger.add_meter("lr", SmoothedValue::new(1, ValueFormat::Value { precision: 6 }));
        logger.add_meter(
            CLASS_ERROR,
            SmoothedValue::new(1, ValueFormat::Value { precision: 2 }),
        );

        let batches = data_loader.into_iter();
        let mut progress = ProgressTracker::new(
            format!("Epoch: [{epoch}]"),
            self.config.print_freq,
            exact_len(&batches),
        );

        for batch in batches {
            progress.data_ready();
            let Batch { samples, targets } = batch.to_device(device);

            let outputs = model.forward(samples);
            let loss_dict = criterion.forward(&outputs, &targets);
            let weights = criterion.weight_dict();
            let losses = weighted_loss(&loss_dict, weights).ok_or_else(|| {
                EngineError::NoWeightedLoss {
                    terms: loss_dict.keys().cloned().collect(),
                }
            })?;

            let reduced = reduce_dict(&loss_values(&loss_dict), self.group.as_ref(), true);
            let summary = LossSummary::new(&reduced, weights);

            let optimized = losses.clone().into_scalar().elem::<f64>();
            if !optimized.is_finite() || !summary.total.is_finite() {
                let loss_value = if optimized.is_finite() {
                    summary.total
                } else {
                    optimized
                };
                self.on_divergence.diverged(loss_value, &reduced);
            }
            let class_error = summary.class_error()?;

            let grads = GradientsParams::from_grads(losses.backward(), &model);
            let grads = if max_norm > 0.0 {
                let (grads, norm) = clip_grad_norm::<B, M>(&model, grads, max_norm);
                tracing::trace!(norm, max_norm, "clipped gradients");
                grads
            } else {
                grads
            };
            model = optimizer.step::<B, M>(model, grads);

            logger.update("loss", summary.total);
            logger.update_all(&summary.scaled);
            logger.update_all(&summary.unscaled);
            logger.update(CLASS_ERROR, class_error);
            logger.update("lr", optimizer.lr());

            progress.step(logger);
        }
        progress.finish();

        logger.synchronize_between_processes(self.group.as_ref());
        tracing::info!("Averaged stats: {logger}");

        Ok((model, logger.global_averages()))
    }
}

/// Number of items left when the iterator reports it exactly.
pub(crate) fn exact_len<T: Iterator>(iter: &T) -> Option<usize> {
    match iter.size_hint() {
        (lower, Some(upper)) if lower == upper => Some(lower),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exact_len_needs_matching_bounds() {
        assert_eq!(exact_len(&vec![1, 2, 3].into_iter()), Some(3));
        assert_eq!(exact_len(&(0..).take_while(|i| *i < 3)), None);
    }
}
