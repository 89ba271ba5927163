//! Metric tracking for DETR-style training and evaluation loops.
//!
//! This crate provides the bookkeeping side of a training loop:
//!
//! - **[`SmoothedValue`]**: a scalar series with a sliding window and a global running average
//! - **[`MetricLogger`]**: a named collection of [`SmoothedValue`]s with progress logging
//! - **[`ProcessGroup`]**: the seam through which values are combined across workers
//!
//! Nothing in here touches tensors. Loss terms are read back to `f64` before they are
//! recorded, so reducing or logging a value can never influence a gradient.

mod dist;
mod logger;
mod smoothed;

pub use dist::{reduce_dict, ProcessGroup, SingleProcess};
pub use logger::{MetricLogger, ProgressTracker};
pub use smoothed::{SmoothedValue, ValueFormat};
