#![allow(dead_code)]

use std::{
    cell::RefCell,
    collections::VecDeque,
    path::PathBuf,
    sync::{Arc, Mutex},
};

use burn::{
    module::{AutodiffModule, Module},
    nn::{Linear, LinearConfig},
    optim::{GradientsParams, Optimizer},
    tensor::{
        backend::{AutodiffBackend, Backend},
        Int, Tensor, TensorData,
    },
    LearningRate,
};
use detr_engine::{Batch, Criterion, Detector, DivergenceHandler, LossDict, Target, WeightDict, CLASS_ERROR};

/// A four-pixel, single-output linear model.
#[derive(Module, Debug)]
pub struct Tiny<B: Backend> {
    linear: Linear<B>,
}

impl<B: Backend> Tiny<B> {
    pub fn new(device: &B::Device) -> Self {
        Self {
            linear: LinearConfig::new(4, 1).init(device),
        }
    }

    /// Current weights, row-major.
    pub fn weights(&self) -> Vec<f32> {
        self.linear.weight.val().into_data().to_vec().unwrap()
    }
}

/// Weights of the module handed to one optimizer step, and of the module it returned.
#[derive(Debug, Clone, PartialEq)]
pub struct StepRecord {
    pub before: Vec<f32>,
    pub after: Vec<f32>,
}

/// Wraps an optimizer and records the weights around every step it takes.
pub struct Watched<O> {
    inner: O,
    pub history: Arc<Mutex<Vec<StepRecord>>>,
}

impl<O> Watched<O> {
    pub fn new(inner: O) -> Self {
        Self {
            inner,
            history: Arc::default(),
        }
    }
}

impl<B, O> Optimizer<Tiny<B>, B> for Watched<O>
where
    B: AutodiffBackend,
    O: Optimizer<Tiny<B>, B>,
{
    type Record = O::Record;

    fn step(&mut self, lr: LearningRate, module: Tiny<B>, grads: GradientsParams) -> Tiny<B> {
        let before = module.weights();
        let module = self.inner.step(lr, module, grads);
        self.history.lock().unwrap().push(StepRecord {
            before,
            after: module.weights(),
        });
        module
    }

    fn to_record(&self) -> Self::Record {
        self.inner.to_record()
    }

    fn load_record(self, record: Self::Record) -> Self {
        Self {
            inner: self.inner.load_record(record),
            history: self.history,
        }
    }
}

impl<B: Backend> Detector<B> for Tiny<B> {
    type Output = Tensor<B, 2>;

    fn forward(&self, samples: Tensor<B, 4>) -> Tensor<B, 2> {
        let [batch, _, _, _] = samples.dims();
        self.linear.forward(samples.reshape([batch, 4]))
    }
}

/// One scripted set of loss terms.
#[derive(Debug, Clone, Copy)]
pub struct Step {
    pub loss_ce: f32,
    pub loss_bbox: f32,
    pub class_error: Option<f32>,
}

impl Step {
    pub const fn new(loss_ce: f32, loss_bbox: f32, class_error: f32) -> Self {
        Self {
            loss_ce,
            loss_bbox,
            class_error: Some(class_error),
        }
    }
}

/// Criterion returning pre-recorded loss values, one [`Step`] per call.
///
/// Every term stays attached to the model output with a non-zero gradient, so
/// an optimizer step really moves the weights even though the values are fixed.
pub struct Scripted {
    weights: WeightDict,
    steps: RefCell<VecDeque<Step>>,
}

impl Scripted {
    pub fn new(weights: &[(&str, f64)], steps: impl IntoIterator<Item = Step>) -> Self {
        Self {
            weights: weights.iter().map(|(n, w)| (n.to_string(), *w)).collect(),
            steps: RefCell::new(steps.into_iter().collect()),
        }
    }

    fn next(&self) -> Step {
        self.steps
            .borrow_mut()
            .pop_front()
            .expect("criterion called more often than scripted")
    }
}

impl<B: Backend> Criterion<B, Tensor<B, 2>> for Scripted {
    fn weight_dict(&self) -> &WeightDict {
        &self.weights
    }

    fn forward(&self, outputs: &Tensor<B, 2>, _targets: &[Target<B>]) -> LossDict<B> {
        let step = self.next();
        let mean = outputs.clone().mean();
        let anchor = mean.clone() - mean.detach();
        let term = |value: f32| anchor.clone().add_scalar(value);

        let mut losses = LossDict::new();
        losses.insert("loss_ce".to_string(), term(step.loss_ce));
        losses.insert("loss_bbox".to_string(), term(step.loss_bbox));
        if let Some(class_error) = step.class_error {
            losses.insert(CLASS_ERROR.to_string(), term(class_error));
        }
        losses
    }
}

impl<B: Backend> Criterion<B, ()> for Scripted {
    fn weight_dict(&self) -> &WeightDict {
        &self.weights
    }

    fn forward(&self, _outputs: &(), _targets: &[Target<B>]) -> LossDict<B> {
        let step = self.next();
        let device = Default::default();
        let term = |value: f32| Tensor::<B, 1>::from_floats([value], &device);

        let mut losses = LossDict::new();
        losses.insert("loss_ce".to_string(), term(step.loss_ce));
        losses.insert("loss_bbox".to_string(), term(step.loss_bbox));
        if let Some(class_error) = step.class_error {
            losses.insert(CLASS_ERROR.to_string(), term(class_error));
        }
        losses
    }
}

/// A target for one image of `size` (`[height, width]`).
pub fn target<B: Backend>(image_id: u64, size: [usize; 2], device: &B::Device) -> Target<B> {
    Target {
        image_id,
        boxes: Tensor::from_data(TensorData::new(vec![0.5f32, 0.5, 0.2, 0.2], [1, 4]), device),
        labels: Tensor::<B, 1, Int>::zeros([1], device),
        masks: None,
        orig_size: size,
        size,
    }
}

/// A batch of `[2, 2]` single-channel images, one per id.
pub fn batch<B: Backend>(image_ids: &[u64], device: &B::Device) -> Batch<B> {
    let samples = Tensor::ones([image_ids.len(), 1, 2, 2], device);
    let targets = image_ids
        .iter()
        .map(|id| target(*id, [2, 2], device))
        .collect();
    Batch::new(samples, targets)
}

/// Records the diverged loss, then unwinds instead of exiting.
#[derive(Default)]
pub struct PanicOnDivergence {
    pub seen: Mutex<Vec<f64>>,
}

impl DivergenceHandler for PanicOnDivergence {
    fn diverged(&self, loss: f64, _reduced: &std::collections::BTreeMap<String, f64>) -> ! {
        self.seen.lock().unwrap().push(loss);
        panic!("Loss is {loss}, stopping training");
    }
}

/// A fresh scratch directory under the system temp dir.
pub fn scratch(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("detr-engine-{name}-{}", std::process::id()));
    if dir.exists() {
        std::fs::remove_dir_all(&dir).unwrap();
    }
    std::fs::create_dir_all(&dir).unwrap();
    dir
}
