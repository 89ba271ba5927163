//! Seams to the dataset-specific evaluators.
//!
//! COCO-style detection metrics and panoptic quality are computed elsewhere; the
//! evaluation loop only feeds predictions in and collects the summaries.

use std::{collections::BTreeMap, fmt, path::Path};

use detr_metric::ProcessGroup;

use crate::{
    error::EngineResult,
    postprocess::{ImagePrediction, PanopticPrediction},
};

/// Kind of overlap used when matching predictions to ground truth.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum IouType {
    Segm,
    Bbox,
}

impl IouType {
    pub const fn name(self) -> &'static str {
        match self {
            Self::Segm => "segm",
            Self::Bbox => "bbox",
        }
    }
}

impl fmt::Display for IouType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Accumulates detection results and computes COCO-style statistics.
pub trait DetectionEvaluator {
    /// Add predictions keyed by image id.
    fn update(&mut self, predictions: &BTreeMap<u64, ImagePrediction>) -> EngineResult<()>;

    fn synchronize_between_processes(&mut self, group: &dyn ProcessGroup);

    fn accumulate(&mut self) -> EngineResult<()>;

    /// Summary statistics per IoU type.
    fn summarize(&mut self) -> EngineResult<BTreeMap<IouType, Vec<f64>>>;
}

/// Accumulates panoptic segmentations and computes panoptic quality.
pub trait PanopticEvaluator {
    fn update(&mut self, predictions: Vec<PanopticPrediction>) -> EngineResult<()>;

    fn synchronize_between_processes(&mut self, group: &dyn ProcessGroup);

    fn summarize(&mut self) -> EngineResult<BTreeMap<String, f64>>;
}

/// The validation dataset as far as evaluation is concerned: where its
/// annotations live and how to build evaluators over them.
pub trait EvalDataset {
    /// Panoptic annotation file.
    fn ann_file(&self) -> &Path;

    /// Folder holding the panoptic PNG annotations.
    fn ann_folder(&self) -> &Path;

    fn detection_evaluator(&self, iou_types: &[IouType]) -> Box<dyn DetectionEvaluator>;

    /// Build a panoptic evaluator writing its predictions under `output_dir`.
    fn panoptic_evaluator(
        &self,
        ann_file: &Path,
        ann_folder: &Path,
        output_dir: &Path,
    ) -> EngineResult<Box<dyn PanopticEvaluator>>;
}
