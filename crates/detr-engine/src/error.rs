use detr_util::DrawError;
use thiserror::Error;

/// The error type for training and evaluation loops.
///
/// A non-finite training loss never reaches the caller as an error,
/// see [`DivergenceHandler`](crate::DivergenceHandler).
#[derive(Error, Debug)]
pub enum EngineError {
    /// None of the criterion's loss terms has a weight, so there is nothing to optimise.
    #[error("no loss term has a weight; loss terms: {terms:?}")]
    NoWeightedLoss {
        /// The loss terms the criterion produced.
        terms: Vec<String>,
    },

    /// A term the loop reads unconditionally is missing from the loss dictionary.
    #[error("loss dictionary has no '{name}' entry")]
    MissingLossTerm {
        /// The missing term.
        name: String,
    },

    /// Reading tensor data back to the host failed.
    #[error("failed to read tensor data: {reason}")]
    TensorData {
        /// The reason the readback failed.
        reason: String,
    },

    /// Per-image lists do not line up with the batch or with each other.
    #[error("size mismatch in {what}: expected {expected}, got {actual}")]
    SizeMismatch {
        /// The list that is too short or too long.
        what: &'static str,
        /// The length that was needed.
        expected: usize,
        /// The length that was found.
        actual: usize,
    },

    /// The segmentation post-processor ran on outputs without mask logits,
    /// or a prediction without masks was handed to the visualiser.
    #[error("model outputs carry no masks")]
    MissingMasks,

    /// The original-sample iterator ended before the batch iterator.
    #[error("original samples exhausted at batch {batch}")]
    OriginalsExhausted {
        /// Index of the batch left without an original sample.
        batch: usize,
    },

    /// Visualisation pairs one original sample with one batch.
    #[error("visualisation requires batches of exactly one image, got {actual}")]
    VisualizationBatchSize {
        /// Number of images in the offending batch.
        actual: usize,
    },

    /// The original sample does not belong to the current batch.
    #[error("original sample is image {original}, batch holds image {batch}")]
    SampleMismatch {
        /// Image id of the batch.
        batch: u64,
        /// Image id of the original sample.
        original: u64,
    },

    /// Error when the engine configuration holds an out-of-range setting.
    #[error("Invalid engine configuration: {reason}")]
    InvalidConfiguration {
        /// The setting at fault and why.
        reason: String,
    },

    /// Evaluator failure reported by an external evaluator implementation.
    #[error("evaluator error: {message}")]
    Evaluator {
        /// The evaluator's message.
        message: String,
    },

    /// Error when composing or writing a visualisation fails.
    #[error(transparent)]
    Draw(#[from] DrawError),
}

/// A specialized `Result` type for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;
