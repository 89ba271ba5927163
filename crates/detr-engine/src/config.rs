use std::path::PathBuf;

use burn::config::Config;

use crate::error::{EngineError, EngineResult};

/// Settings shared by the training and evaluation loops.
///
/// Colors are RGB.
#[derive(Config, Debug)]
pub struct EngineConfig {
    /// Log a progress line every this many iterations.
    #[config(default = 10)]
    pub print_freq: usize,
    /// Candidates scoring strictly above this are visualised.
    #[config(default = 0.1)]
    pub score_threshold: f64,
    /// Weight of the mask color when blended over the image.
    #[config(default = 0.5)]
    pub mask_alpha: f32,
    #[config(default = "[0, 0, 255]")]
    pub mask_color: [u8; 3],
    #[config(default = "[0, 0, 255]")]
    pub box_color: [u8; 3],
    #[config(default = "[255, 30, 0]")]
    pub text_color: [u8; 3],
    #[config(default = 3)]
    pub box_thickness: u32,
    /// Height of the score label font, in pixels.
    #[config(default = 20.0)]
    pub text_size: f32,
    /// Baseline of the score label, below the box's top edge.
    #[config(default = 20)]
    pub text_offset: i32,
    /// Root of the visualisation tree.
    #[config(default = "PathBuf::from(\"mask_img\")")]
    pub vis_dir: PathBuf,
    /// Panoptic predictions go to `<output_dir>/<panoptic_subdir>`.
    #[config(default = "String::from(\"panoptic_eval\")")]
    pub panoptic_subdir: String,
}

impl EngineConfig {
    pub fn validate(&self) -> EngineResult<()> {
        if self.print_freq == 0 {
            return Err(EngineError::InvalidConfiguration {
                reason: "print_freq must be at least 1".to_string(),
            });
        }
        if !(0.0..=1.0).contains(&self.mask_alpha) {
            return Err(EngineError::InvalidConfiguration {
                reason: format!("mask_alpha must lie in [0, 1], got {}", self.mask_alpha),
            });
        }
        if self.box_thickness == 0 {
            return Err(EngineError::InvalidConfiguration {
                reason: "box_thickness must be at least 1".to_string(),
            });
        }
        if !(self.text_size.is_finite() && self.text_size > 0.0) {
            return Err(EngineError::InvalidConfiguration {
                reason: format!("text_size must be positive, got {}", self.text_size),
            });
        }
        Ok(())
    }
}
