//! Epoch-level training and evaluation loops for DETR-style detectors.
//!
//! The model, loss criterion, data loading and metric evaluators are supplied by
//! the caller through the traits in this crate:
//!
//! - **[`Detector`]**: the model's forward pass
//! - **[`Criterion`]**: loss terms and their weights
//! - **[`PostProcess`]**, **[`PostProcessSegm`]**, **[`PostProcessPanoptic`]**: raw outputs to detections
//! - **[`EvalDataset`]**: the evaluators of the validation set
//!
//! [`Engine::train_one_epoch`] and [`Engine::evaluate`] drive them. Evaluation
//! also writes one overlay image per confident candidate, see [`MaskVisualizer`].

mod clip;
mod config;
mod data;
mod divergence;
mod engine;
mod error;
mod evaluate;
mod evaluator;
mod loss;
mod model;
mod optim;
mod postprocess;
mod train;
mod visualize;

pub use clip::{clip_grad_norm, grad_norm};
pub use config::EngineConfig;
pub use data::{Batch, OriginalSample, Target};
pub use divergence::{DivergenceHandler, ExitOnDivergence};
pub use engine::Engine;
pub use error::{EngineError, EngineResult};
pub use evaluate::EvalOutcome;
pub use evaluator::{DetectionEvaluator, EvalDataset, IouType, PanopticEvaluator};
pub use loss::{loss_values, weighted_loss, Criterion, LossDict, LossSummary, WeightDict, CLASS_ERROR};
pub use model::Detector;
pub use optim::TrainOptimizer;
pub use postprocess::{
    BoxPostProcessor, DetectionResult, DetrOutput, ImagePrediction, MaskPostProcessor,
    MaskPostProcessorConfig, MaskStack, PanopticPrediction, PostProcess, PostProcessPanoptic,
    PostProcessSegm, PostProcessors, SegmentInfo,
};
pub use visualize::MaskVisualizer;
