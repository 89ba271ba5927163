//! Drawing utilities for detection overlays.
//!
//! Everything here operates on `image` buffers in RGB order. Tensors are read back
//! by the caller before anything is drawn.

mod draw;
mod error;
mod fs;

pub use draw::{blend_mask, draw_box, draw_text, label_font, mask_from_slice};
pub use error::{DrawError, DrawResult};
pub use fs::{ensure_dir, save_png};
