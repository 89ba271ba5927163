//! One evaluation pass, with mask visualisation.

use std::{
    collections::BTreeMap,
    path::{Path, PathBuf},
};

use burn::tensor::backend::Backend;
use detr_metric::{reduce_dict, MetricLogger, ProgressTracker, SmoothedValue, ValueFormat};

use crate::{
    data::{Batch, OriginalSample},
    engine::Engine,
    error::{EngineError, EngineResult},
    evaluator::{EvalDataset, IouType, PanopticEvaluator},
    loss::{loss_values, Criterion, LossSummary, CLASS_ERROR},
    model::Detector,
    postprocess::{ImagePrediction, PostProcessors},
    train::exact_len,
};

/// Everything an evaluation pass produces.
#[derive(Debug, Clone, Default)]
pub struct EvalOutcome {
    /// Post-processed predictions of the last batch only, keyed by image id.
    pub results: BTreeMap<u64, ImagePrediction>,
    /// Global average of every logged loss term over the pass.
    pub stats: BTreeMap<String, f64>,
    /// Detection summary statistics per IoU type.
    pub coco_stats: BTreeMap<IouType, Vec<f64>>,
    /// Panoptic quality, when a panoptic post-processor was configured.
    pub panoptic_stats: Option<BTreeMap<String, f64>>,
    /// Every visualisation file written, in order.
    pub visualizations: Vec<PathBuf>,
}

impl Engine {
    /// Run `model` over `data_loader` and evaluate its detections.
    ///
    /// `model` must already be in inference mode, e.g. the result of
    /// [`AutodiffModule::valid`](burn::module::AutodiffModule::valid).
    ///
    /// `originals` yields the un-normalised image of every batch, one per batch, in
    /// the same order. When a segmentation post-processor is present, every
    /// candidate of that image scoring above the configured threshold is
    /// rendered to disk; this requires batches of exactly one image.
    #[allow(clippy::too_many_arguments)]
    pub fn evaluate<B, M, C, D, I, S>(
        &self,
        model: &M,
        criterion: &C,
        postprocessors: &PostProcessors<B, M::Output>,
        data_loader: I,
        base_ds: &D,
        device: &B::Device,
        output_dir: &Path,
        originals: S,
    ) -> EngineResult<EvalOutcome>
    where
        B: Backend,
        M: Detector<B>,
        C: Criterion<B, M::Output>,
        D: EvalDataset,
        I: IntoIterator<Item = Batch<B>>,
        S: IntoIterator<Item = OriginalSample>,
    {
        let mut logger = MetricLogger::default();
        logger.add_meter(
            CLASS_ERROR,
            SmoothedValue::new(1, ValueFormat::Value { precision: 2 }),
        );

        let iou_types = postprocessors.iou_types();
        let mut coco_evaluator = base_ds.detection_evaluator(&iou_types);
        let mut panoptic_evaluator: Option<Box<dyn PanopticEvaluator>> =
            if postprocessors.panoptic.is_some() {
                Some(base_ds.panoptic_evaluator(
                    base_ds.ann_file(),
                    base_ds.ann_folder(),
                    &output_dir.join(&self.config.panoptic_subdir),
                )?)
            } else {
                None
            };

        let visualizer = self.visualizer()?;
        let mut originals = originals.into_iter();
        let batches = data_loader.into_iter();
        let mut progress = ProgressTracker::new("Test:", self.config.print_freq, exact_len(&batches));

        let mut outcome = EvalOutcome::default();
        for (index, batch) in batches.enumerate() {
            progress.data_ready();
            let batch = batch.to_device(device);
            let original = originals
                .next()
                .ok_or(EngineError::OriginalsExhausted { batch: index })?;
            let orig_sizes = batch.orig_sizes();
            let sizes = batch.sizes();
            let Batch { samples, targets } = batch;

            let outputs = model.forward(samples);
            let loss_dict = criterion.forward(&outputs, &targets);
            let reduced = reduce_dict(&loss_values(&loss_dict), self.group.as_ref(), true);
            let summary = LossSummary::new(&reduced, criterion.weight_dict());
            logger.update("loss", summary.total);
            logger.update_all(&summary.scaled);
            logger.update_all(&summary.unscaled);
            logger.update(CLASS_ERROR, summary.class_error()?);

            let mut results = postprocessors.bbox.process(&outputs, &orig_sizes)?;
            if let Some(segm) = &postprocessors.segm {
                results = segm.refine(results, &outputs, &orig_sizes, &sizes)?;
            }
            let predictions = results
                .into_iter()
                .map(|result| result.into_prediction())
                .collect::<EngineResult<Vec<_>>>()?;
            if predictions.len() != targets.len() {
                return Err(EngineError::SizeMismatch {
                    what: "results",
                    expected: targets.len(),
                    actual: predictions.len(),
                });
            }

            if postprocessors.segm.is_some() {
                if targets.len() != 1 {
                    return Err(EngineError::VisualizationBatchSize {
                        actual: targets.len(),
                    });
                }
                if targets[0].image_id != original.image_id {
                    return Err(EngineError::SampleMismatch {
                        batch: targets[0].image_id,
                        original: original.image_id,
                    });
                }
                let written = visualizer.render(&original, &predictions[0])?;
                outcome.visualizations.extend(written);
            }

            let res: BTreeMap<u64, ImagePrediction> = targets
                .iter()
                .map(|target| target.image_id)
                .zip(predictions)
                .collect();
            coco_evaluator.update(&res)?;

            if let (Some(panoptic), Some(evaluator)) =
                (&postprocessors.panoptic, panoptic_evaluator.as_mut())
            {
                let mut pano = panoptic.process(&outputs, &sizes, &orig_sizes)?;
                for (prediction, target) in pano.iter_mut().zip(&targets) {
                    prediction.image_id = target.image_id;
                    prediction.file_name = format!("{:012}.png", target.image_id);
                }
                evaluator.update(pano)?;
            }

            outcome.results = res;
            progress.step(&logger);
        }
        progress.finish();

        logger.synchronize_between_processes(self.group.as_ref());
        tracing::info!("Averaged stats: {logger}");

        coco_evaluator.synchronize_between_processes(self.group.as_ref());
        coco_evaluator.accumulate()?;
        outcome.coco_stats = coco_evaluator.summarize()?;

        if let Some(evaluator) = panoptic_evaluator.as_mut() {
            evaluator.synchronize_between_processes(self.group.as_ref());
            outcome.panoptic_stats = Some(evaluator.summarize()?);
        }

        outcome.stats = logger.global_averages();
        tracing::info!(
            files = outcome.visualizations.len(),
            dir = %visualizer.root().display(),
            "evaluation finished"
        );
        Ok(outcome)
    }
}
