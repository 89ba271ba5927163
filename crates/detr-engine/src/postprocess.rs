//! Conversion of raw model outputs into per-image detections.

use burn::{
    config::Config,
    tensor::{
        activation::{sigmoid, softmax},
        backend::Backend,
        Bool, Int, Tensor, TensorData,
    },
};

use crate::{
    error::{EngineError, EngineResult},
    evaluator::IouType,
};

/// Raw output of a DETR head.
#[derive(Debug, Clone)]
pub struct DetrOutput<B: Backend> {
    /// Class logits with shape `[B, Q, C + 1]`; the last class is "no object".
    pub pred_logits: Tensor<B, 3>,
    /// Normalised `(cx, cy, w, h)` boxes with shape `[B, Q, 4]`.
    pub pred_boxes: Tensor<B, 3>,
    /// Mask logits with shape `[B, Q, h, w]`, for segmentation heads.
    pub pred_masks: Option<Tensor<B, 4>>,
}

/// Detections for one image, still on the device.
#[derive(Debug, Clone)]
pub struct DetectionResult<B: Backend> {
    /// `[Q]`
    pub scores: Tensor<B, 1>,
    /// `[Q]`
    pub labels: Tensor<B, 1, Int>,
    /// `[Q, 4]` absolute `(x0, y0, x1, y1)` in original-image pixels.
    pub boxes: Tensor<B, 2>,
    /// `[Q, 1, H, W]` at original-image size.
    pub masks: Option<Tensor<B, 4, Bool>>,
}

impl<B: Backend> DetectionResult<B> {
    /// Read the detections back to the host.
    pub fn into_prediction(self) -> EngineResult<ImagePrediction> {
        let scores = self
            .scores
            .into_data()
            .convert::<f32>()
            .to_vec::<f32>()
            .map_err(tensor_data_error)?;
        let labels = self
            .labels
            .into_data()
            .convert::<i64>()
            .to_vec::<i64>()
            .map_err(tensor_data_error)?;
        let boxes = self
            .boxes
            .into_data()
            .convert::<f32>()
            .to_vec::<f32>()
            .map_err(tensor_data_error)?
            .chunks_exact(4)
            .map(|b| [b[0], b[1], b[2], b[3]])
            .collect();

        let masks = match self.masks {
            Some(masks) => {
                let [count, _, height, width] = masks.dims();
                let data = masks
                    .float()
                    .into_data()
                    .convert::<f32>()
                    .to_vec::<f32>()
                    .map_err(tensor_data_error)?
                    .into_iter()
                    .map(|v| v > 0.5)
                    .collect();
                Some(MaskStack {
                    count,
                    height,
                    width,
                    data,
                })
            }
            None => None,
        };

        Ok(ImagePrediction {
            scores,
            labels,
            boxes,
            masks,
        })
    }
}

fn tensor_data_error(err: burn::tensor::DataError) -> EngineError {
    EngineError::TensorData {
        reason: format!("{err:?}"),
    }
}

/// Binary masks for every candidate of one image, row-major.
#[derive(Debug, Clone, PartialEq)]
pub struct MaskStack {
    pub count: usize,
    pub height: usize,
    pub width: usize,
    pub data: Vec<bool>,
}

impl MaskStack {
    /// Mask of candidate `index`, `height * width` values.
    pub fn mask(&self, index: usize) -> Option<&[bool]> {
        let len = self.height * self.width;
        self.data.get(index * len..(index + 1) * len)
    }
}

/// Host-side detections for one image, as handed to evaluators and the visualiser.
#[derive(Debug, Clone, PartialEq)]
pub struct ImagePrediction {
    pub scores: Vec<f32>,
    pub labels: Vec<i64>,
    pub boxes: Vec<[f32; 4]>,
    pub masks: Option<MaskStack>,
}

impl ImagePrediction {
    /// Candidate indices whose score is strictly above `threshold`, in index order.
    ///
    /// The comparison happens at the scores' own `f32` precision.
    pub fn above_threshold(&self, threshold: f64) -> Vec<usize> {
        let threshold = threshold as f32;
        self.scores
            .iter()
            .enumerate()
            .filter(|(_, score)| **score > threshold)
            .map(|(index, _)| index)
            .collect()
    }
}

/// One panoptic segmentation, PNG-encoded, with its segment table.
#[derive(Debug, Clone, PartialEq)]
pub struct PanopticPrediction {
    pub image_id: u64,
    pub file_name: String,
    pub png: Vec<u8>,
    pub segments_info: Vec<SegmentInfo>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SegmentInfo {
    pub id: u32,
    pub category_id: i64,
    pub area: u64,
}

/// Produces scores, labels and boxes from raw outputs.
pub trait PostProcess<B: Backend, O> {
    /// `orig_target_sizes` holds `[height, width]` of each original image.
    fn process(&self, outputs: &O, orig_target_sizes: &[[usize; 2]]) -> EngineResult<Vec<DetectionResult<B>>>;
}

/// Adds binary masks to results produced by a [`PostProcess`].
pub trait PostProcessSegm<B: Backend, O> {
    /// `max_target_sizes` holds the size of each image after the input transforms.
    fn refine(
        &self,
        results: Vec<DetectionResult<B>>,
        outputs: &O,
        orig_target_sizes: &[[usize; 2]],
        max_target_sizes: &[[usize; 2]],
    ) -> EngineResult<Vec<DetectionResult<B>>>;
}

/// Produces panoptic segmentations.
///
/// The engine fills in `image_id` and `file_name` afterwards.
pub trait PostProcessPanoptic<B: Backend, O> {
    fn process(
        &self,
        outputs: &O,
        processed_sizes: &[[usize; 2]],
        target_sizes: &[[usize; 2]],
    ) -> EngineResult<Vec<PanopticPrediction>>;
}

/// The post-processors requested for an evaluation run.
///
/// Box post-processing always runs; the others are optional and decide which
/// metrics are computed.
pub struct PostProcessors<B: Backend, O> {
    pub bbox: Box<dyn PostProcess<B, O>>,
    pub segm: Option<Box<dyn PostProcessSegm<B, O>>>,
    pub panoptic: Option<Box<dyn PostProcessPanoptic<B, O>>>,
}

impl<B: Backend, O> PostProcessors<B, O> {
    pub fn new(bbox: impl PostProcess<B, O> + 'static) -> Self {
        Self {
            bbox: Box::new(bbox),
            segm: None,
            panoptic: None,
        }
    }

    pub fn with_segm(mut self, segm: impl PostProcessSegm<B, O> + 'static) -> Self {
        self.segm = Some(Box::new(segm));
        self
    }

    pub fn with_panoptic(mut self, panoptic: impl PostProcessPanoptic<B, O> + 'static) -> Self {
        self.panoptic = Some(Box::new(panoptic));
        self
    }

    /// Metric kinds implied by the configured post-processors, segmentation first.
    pub fn iou_types(&self) -> Vec<IouType> {
        let mut types = Vec::with_capacity(2);
        if self.segm.is_some() {
            types.push(IouType::Segm);
        }
        types.push(IouType::Bbox);
        types
    }
}

/// Standard DETR box post-processing.
///
/// Softmax over the class logits, drop the "no object" class, keep the best
/// class per query, and convert boxes to absolute corner form.
#[derive(Debug, Clone, Copy, Default)]
pub struct BoxPostProcessor;

impl<B: Backend> PostProcess<B, DetrOutput<B>> for BoxPostProcessor {
    fn process(
        &self,
        outputs: &DetrOutput<B>,
        orig_target_sizes: &[[usize; 2]],
    ) -> EngineResult<Vec<DetectionResult<B>>> {
        let [batch, queries, classes] = outputs.pred_logits.dims();
        if orig_target_sizes.len() != batch {
            return Err(EngineError::SizeMismatch {
                what: "orig_target_sizes",
                expected: batch,
                actual: orig_target_sizes.len(),
            });
        }
        let device = outputs.pred_logits.device();

        let prob = softmax(outputs.pred_logits.clone(), 2);
        let (scores, labels) = prob
            .slice([0..batch, 0..queries, 0..classes - 1])
            .max_dim_with_indices(2);
        let boxes = box_cxcywh_to_xyxy(outputs.pred_boxes.clone());

        let results = orig_target_sizes
            .iter()
            .enumerate()
            .map(|(i, &[height, width])| {
                let (w, h) = (width as f32, height as f32);
                let scale = Tensor::<B, 1>::from_floats([w, h, w, h], &device).reshape([1, 4]);
                DetectionResult {
                    scores: scores.clone().slice([i..i + 1, 0..queries, 0..1]).reshape([queries]),
                    labels: labels.clone().slice([i..i + 1, 0..queries, 0..1]).reshape([queries]),
                    boxes: boxes
                        .clone()
                        .slice([i..i + 1, 0..queries, 0..4])
                        .reshape([queries, 4])
                        .mul(scale),
                    masks: None,
                }
            })
            .collect();
        Ok(results)
    }
}

fn box_cxcywh_to_xyxy<B: Backend>(boxes: Tensor<B, 3>) -> Tensor<B, 3> {
    let [batch, queries, _] = boxes.dims();
    let coord = |i: usize| boxes.clone().slice([0..batch, 0..queries, i..i + 1]);
    let (cx, cy) = (coord(0), coord(1));
    let (half_w, half_h) = (coord(2).div_scalar(2.0), coord(3).div_scalar(2.0));

    Tensor::cat(
        vec![
            cx.clone() - half_w.clone(),
            cy.clone() - half_h.clone(),
            cx + half_w,
            cy + half_h,
        ],
        2,
    )
}

/// Configuration for [`MaskPostProcessor`].
#[derive(Config, Debug)]
pub struct MaskPostProcessorConfig {
    /// Probability above which a mask pixel is set.
    #[config(default = 0.5)]
    pub threshold: f64,
}

impl MaskPostProcessorConfig {
    pub fn init(&self) -> MaskPostProcessor {
        MaskPostProcessor {
            threshold: self.threshold,
        }
    }
}

/// Standard DETR mask post-processing.
///
/// Mask logits are upsampled to the largest transformed size in the batch,
/// thresholded, cropped to each image's transformed size and resized to its
/// original size.
#[derive(Debug, Clone, Copy)]
pub struct MaskPostProcessor {
    threshold: f64,
}

impl<B: Backend> PostProcessSegm<B, DetrOutput<B>> for MaskPostProcessor {
    fn refine(
        &self,
        results: Vec<DetectionResult<B>>,
        outputs: &DetrOutput<B>,
        orig_target_sizes: &[[usize; 2]],
        max_target_sizes: &[[usize; 2]],
    ) -> EngineResult<Vec<DetectionResult<B>>> {
        let pred_masks = outputs.pred_masks.clone().ok_or(EngineError::MissingMasks)?;
        if orig_target_sizes.len() != max_target_sizes.len() {
            return Err(EngineError::SizeMismatch {
                what: "max_target_sizes",
                expected: orig_target_sizes.len(),
                actual: max_target_sizes.len(),
            });
        }
        if results.len() != max_target_sizes.len() {
            return Err(EngineError::SizeMismatch {
                what: "results",
                expected: max_target_sizes.len(),
                actual: results.len(),
            });
        }

        let [_, queries, _, _] = pred_masks.dims();
        let max_h = max_target_sizes.iter().map(|s| s[0]).max().unwrap_or(0);
        let max_w = max_target_sizes.iter().map(|s| s[1]).max().unwrap_or(0);

        let masks = resize(pred_masks, [max_h, max_w], Sampling::Bilinear);
        let masks = sigmoid(masks).greater_elem(self.threshold).float();

        let refined = results
            .into_iter()
            .zip(max_target_sizes.iter().zip(orig_target_sizes))
            .enumerate()
            .map(|(i, (mut result, (&[h, w], &[orig_h, orig_w])))| {
                let cropped = masks
                    .clone()
                    .slice([i..i + 1, 0..queries, 0..h, 0..w])
                    .reshape([queries, 1, h, w]);
                let resized = resize(cropped, [orig_h, orig_w], Sampling::Nearest);
                result.masks = Some(resized.greater_elem(0.5));
                result
            })
            .collect();
        Ok(refined)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Sampling {
    Bilinear,
    Nearest,
}

/// Row-major `[output, input]` weights resampling one axis on the pixel-centre
/// grid (`align_corners = false`).
///
/// Bilinear reads source position `(dst + 0.5) * input / output - 0.5`, clamped
/// at zero; nearest reads `floor(dst * input / output)`.
fn resample_matrix(input: usize, output: usize, sampling: Sampling) -> Vec<f32> {
    let mut weights = vec![0.0f32; output * input];
    if input == 0 {
        return weights;
    }
    let scale = input as f64 / output as f64;
    for (dst, row) in weights.chunks_exact_mut(input).enumerate() {
        match sampling {
            Sampling::Bilinear => {
                let src = ((dst as f64 + 0.5) * scale - 0.5).max(0.0);
                let lo = (src.floor() as usize).min(input - 1);
                let hi = (lo + 1).min(input - 1);
                let frac = (src - lo as f64) as f32;
                row[lo] += 1.0 - frac;
                row[hi] += frac;
            }
            Sampling::Nearest => {
                let src = ((dst as f64 * scale).floor() as usize).min(input - 1);
                row[src] = 1.0;
            }
        }
    }
    weights
}

/// Resize the two trailing axes of `[batch, channels, height, width]` to `size`.
fn resize<B: Backend>(x: Tensor<B, 4>, size: [usize; 2], sampling: Sampling) -> Tensor<B, 4> {
    let [batch, channels, height, width] = x.dims();
    let [out_h, out_w] = size;
    let device = x.device();

    let rows = Tensor::<B, 2>::from_data(
        TensorData::new(resample_matrix(height, out_h, sampling), [out_h, height]),
        &device,
    )
    .reshape([1, 1, out_h, height])
    .expand([batch, channels, out_h, height]);
    let cols = Tensor::<B, 2>::from_data(
        TensorData::new(resample_matrix(width, out_w, sampling), [out_w, width]),
        &device,
    )
    .transpose()
    .reshape([1, 1, width, out_w])
    .expand([batch, channels, width, out_w]);

    rows.matmul(x).matmul(cols)
}
