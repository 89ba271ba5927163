//! DETR-style detector training and evaluation on Burn.
//!
//! This crate re-exports the component crates and adds backend selection and
//! logging setup for binaries.

pub mod backend;
pub mod logging;

#[doc(inline)]
pub use detr_engine as engine;
#[doc(inline)]
pub use detr_metric as metric;
#[doc(inline)]
pub use detr_util as util;
