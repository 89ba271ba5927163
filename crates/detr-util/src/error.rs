use std::path::PathBuf;

use thiserror::Error;

/// Errors raised while composing or writing overlay images.
#[derive(Debug, Error)]
pub enum DrawError {
    /// The mask and the image it is blended over differ in size.
    #[error("mask is {mask_width}x{mask_height}, image is {image_width}x{image_height}")]
    DimensionMismatch {
        /// Width of the image being drawn on.
        image_width: u32,
        /// Height of the image being drawn on.
        image_height: u32,
        /// Width of the mask.
        mask_width: u32,
        /// Height of the mask.
        mask_height: u32,
    },

    /// Row-major mask data does not hold `width * height` values.
    #[error("mask data length mismatch: expected {expected}, got {actual}")]
    DataLengthMismatch {
        /// `width * height` of the requested mask.
        expected: usize,
        /// Number of values supplied.
        actual: usize,
    },

    /// The blend factor is outside `[0, 1]`.
    #[error("blend factor must lie in [0, 1], got {alpha}")]
    InvalidAlpha {
        /// The rejected blend factor.
        alpha: f32,
    },

    /// The embedded label font could not be parsed.
    #[error("failed to load label font")]
    Font {
        /// The underlying font parsing error.
        #[source]
        source: ab_glyph::InvalidFont,
    },

    /// Creating an output directory failed for a reason other than it already existing.
    #[error("failed to create directory '{}'", path.display())]
    CreateDir {
        /// The directory that could not be created.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// Encoding or writing an overlay image failed.
    #[error("failed to write image '{}'", path.display())]
    Save {
        /// The destination file.
        path: PathBuf,
        /// The underlying image encoding error.
        #[source]
        source: image::ImageError,
    },
}

/// A specialized `Result` type for drawing operations.
pub type DrawResult<T> = Result<T, DrawError>;
