//! Per-iteration inputs of the training and evaluation loops.

use burn::tensor::{backend::Backend, Int, Tensor};
use image::DynamicImage;

/// Ground-truth annotations for one image.
///
/// Sizes are `[height, width]` in pixels.
#[derive(Debug, Clone)]
pub struct Target<B: Backend> {
    /// External identifier of the image, used to key evaluator results and output paths.
    pub image_id: u64,
    /// Boxes with shape `[N, 4]`, normalised `(cx, cy, w, h)`.
    pub boxes: Tensor<B, 2>,
    /// Class labels with shape `[N]`.
    pub labels: Tensor<B, 1, Int>,
    /// Instance masks with shape `[N, H, W]`, when the dataset has them.
    pub masks: Option<Tensor<B, 3>>,
    /// Size of the image as stored on disk.
    pub orig_size: [usize; 2],
    /// Size of the image after the input transforms.
    pub size: [usize; 2],
}

impl<B: Backend> Target<B> {
    pub fn to_device(self, device: &B::Device) -> Self {
        Self {
            image_id: self.image_id,
            boxes: self.boxes.to_device(device),
            labels: self.labels.to_device(device),
            masks: self.masks.map(|masks| masks.to_device(device)),
            orig_size: self.orig_size,
            size: self.size,
        }
    }
}

/// A batch as produced by the data loader.
#[derive(Debug, Clone)]
pub struct Batch<B: Backend> {
    /// Normalised images with shape `[B, 3, H, W]`.
    pub samples: Tensor<B, 4>,
    /// One entry per image in `samples`.
    pub targets: Vec<Target<B>>,
}

impl<B: Backend> Batch<B> {
    pub fn new(samples: Tensor<B, 4>, targets: Vec<Target<B>>) -> Self {
        Self { samples, targets }
    }

    /// Move the samples and every target tensor to `device`.
    pub fn to_device(self, device: &B::Device) -> Self {
        Self {
            samples: self.samples.to_device(device),
            targets: self
                .targets
                .into_iter()
                .map(|target| target.to_device(device))
                .collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.targets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }

    pub fn orig_sizes(&self) -> Vec<[usize; 2]> {
        self.targets.iter().map(|t| t.orig_size).collect()
    }

    pub fn sizes(&self) -> Vec<[usize; 2]> {
        self.targets.iter().map(|t| t.size).collect()
    }
}

/// An un-normalised image paired with its identifier, consumed one per
/// evaluation batch for visualisation.
#[derive(Debug, Clone)]
pub struct OriginalSample {
    pub image: DynamicImage,
    pub image_id: u64,
}

impl OriginalSample {
    pub fn new(image: impl Into<DynamicImage>, image_id: u64) -> Self {
        Self {
            image: image.into(),
            image_id,
        }
    }
}

#[cfg(test)]
mod tests {
    use burn::backend::NdArray;

    use super::*;

    type TestBackend = NdArray;

    fn target(image_id: u64, orig_size: [usize; 2], size: [usize; 2]) -> Target<TestBackend> {
        let device = Default::default();
        Target {
            image_id,
            boxes: Tensor::from_floats([[0.5, 0.5, 0.2, 0.2]], &device),
            labels: Tensor::from_ints([3], &device),
            masks: None,
            orig_size,
            size,
        }
    }

    #[test]
    fn batch_exposes_per_image_sizes() {
        let device = Default::default();
        let batch = Batch::new(
            Tensor::<TestBackend, 4>::zeros([2, 3, 8, 8], &device),
            vec![target(1, [480, 640], [8, 8]), target(2, [100, 200], [8, 4])],
        );

        assert_eq!(batch.len(), 2);
        assert_eq!(batch.orig_sizes(), vec![[480, 640], [100, 200]]);
        assert_eq!(batch.sizes(), vec![[8, 8], [8, 4]]);
    }

    #[test]
    fn to_device_keeps_metadata() {
        let device = Default::default();
        let moved = target(9, [4, 5], [2, 3]).to_device(&device);

        assert_eq!(moved.image_id, 9);
        assert_eq!(moved.orig_size, [4, 5]);
        assert_eq!(moved.size, [2, 3]);
        assert_eq!(moved.boxes.dims(), [1, 4]);
    }
}
