use burn::tensor::{backend::Backend, Tensor};

/// A detection model as seen by the training and evaluation loops.
///
/// Training runs the model on an autodiff backend; evaluation runs the
/// module returned by `AutodiffModule::valid`, which carries no gradient state.
pub trait Detector<B: Backend> {
    /// Raw model output, consumed by the criterion and the post-processors.
    type Output;

    /// Forward pass over normalised images with shape `[B, 3, H, W]`.
    fn forward(&self, samples: Tensor<B, 4>) -> Self::Output;
}
