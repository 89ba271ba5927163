//! Per-candidate mask overlays written to disk during evaluation.

use std::path::{Path, PathBuf};

use ab_glyph::FontRef;
use detr_util::{
    blend_mask, draw_box, draw_text, ensure_dir, label_font, mask_from_slice, save_png,
};
use image::{Rgb, RgbImage};

use crate::{
    config::EngineConfig,
    data::OriginalSample,
    error::{EngineError, EngineResult},
    postprocess::ImagePrediction,
};

/// Renders one PNG per confident candidate:
/// the candidate's mask blended over the original image, its box, and its score.
///
/// Files land at `<root>/img<id>/img<id>_box<n>.png`, where `n` counts the
/// selected candidates of that image from zero. Existing files are overwritten.
#[derive(Debug, Clone)]
pub struct MaskVisualizer {
    root: PathBuf,
    score_threshold: f64,
    alpha: f32,
    mask_color: Rgb<u8>,
    box_color: Rgb<u8>,
    text_color: Rgb<u8>,
    box_thickness: u32,
    text_size: f32,
    text_offset: i32,
    font: FontRef<'static>,
}

impl MaskVisualizer {
    pub fn new(config: &EngineConfig) -> EngineResult<Self> {
        Ok(Self {
            root: config.vis_dir.clone(),
            score_threshold: config.score_threshold,
            alpha: config.mask_alpha,
            mask_color: Rgb(config.mask_color),
            box_color: Rgb(config.box_color),
            text_color: Rgb(config.text_color),
            box_thickness: config.box_thickness,
            text_size: config.text_size,
            text_offset: config.text_offset,
            font: label_font()?,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn image_dir(&self, image_id: u64) -> PathBuf {
        self.root.join(format!("img{image_id}"))
    }

    pub fn output_path(&self, image_id: u64, ordinal: usize) -> PathBuf {
        self.image_dir(image_id)
            .join(format!("img{image_id}_box{ordinal}.png"))
    }

    /// Compose the overlay for candidate `index` on top of `image`.
    pub fn compose(
        &self,
        image: &RgbImage,
        prediction: &ImagePrediction,
        index: usize,
    ) -> EngineResult<RgbImage> {
        let masks = prediction.masks.as_ref().ok_or(EngineError::MissingMasks)?;
        let data = masks.mask(index).ok_or(EngineError::SizeMismatch {
            what: "masks",
            expected: index + 1,
            actual: masks.count,
        })?;
        let mask = mask_from_slice(masks.width as u32, masks.height as u32, data)?;

        let mut out = blend_mask(image, &mask, self.mask_color, self.alpha)?;

        let bbox = prediction.boxes.get(index).ok_or(EngineError::SizeMismatch {
            what: "boxes",
            expected: index + 1,
            actual: prediction.boxes.len(),
        })?;
        let score = prediction.scores.get(index).ok_or(EngineError::SizeMismatch {
            what: "scores",
            expected: index + 1,
            actual: prediction.scores.len(),
        })?;

        let [x0, y0, x1, y1] = bbox.map(|v| v as i32);
        draw_box(&mut out, [x0, y0, x1, y1], self.box_color, self.box_thickness);
        draw_text(
            &mut out,
            &score_label(*score),
            (x0, y0 + self.text_offset),
            self.text_color,
            &self.font,
            self.text_size,
        );
        Ok(out)
    }

    /// Write an overlay for every candidate scoring above the threshold.
    ///
    /// Returns the written paths in selection order.
    pub fn render(
        &self,
        original: &OriginalSample,
        prediction: &ImagePrediction,
    ) -> EngineResult<Vec<PathBuf>> {
        let selected = prediction.above_threshold(self.score_threshold);
        if selected.is_empty() {
            return Ok(Vec::new());
        }

        let image = original.image.to_rgb8();
        let mut written = Vec::with_capacity(selected.len());
        for (ordinal, index) in selected.into_iter().enumerate() {
            let out = self.compose(&image, prediction, index)?;

            ensure_dir(self.image_dir(original.image_id))?;
            let path = self.output_path(original.image_id, ordinal);
            save_png(&out, &path)?;
            written.push(path);
        }

        tracing::debug!(
            image_id = original.image_id,
            files = written.len(),
            "rendered mask overlays"
        );
        Ok(written)
    }
}

/// `score : <score>` with the score rounded to four decimals and printed in
/// shortest form, keeping one decimal for whole numbers (`1.0`, `0.9`, `0.1235`).
fn score_label(score: f32) -> String {
    let rounded = (f64::from(score) * 10_000.0).round() / 10_000.0;
    if rounded.fract() == 0.0 {
        format!("score : {rounded:.1}")
    } else {
        format!("score : {rounded}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::postprocess::MaskStack;

    fn visualizer(root: &Path) -> MaskVisualizer {
        MaskVisualizer::new(&EngineConfig::new().with_vis_dir(root.to_path_buf())).unwrap()
    }

    #[test]
    fn paths_encode_image_and_ordinal() {
        let vis = visualizer(Path::new("mask_img"));
        assert_eq!(
            vis.output_path(42, 3),
            PathBuf::from("mask_img/img42/img42_box3.png")
        );
    }

    #[test]
    fn scores_render_with_at_most_four_decimals() {
        assert_eq!(score_label(0.9), "score : 0.9");
        assert_eq!(score_label(0.123_456), "score : 0.1235");
        assert_eq!(score_label(0.5), "score : 0.5");
    }

    #[test]
    fn whole_scores_keep_one_decimal() {
        assert_eq!(score_label(1.0), "score : 1.0");
        assert_eq!(score_label(0.999_99), "score : 1.0");
        assert_eq!(score_label(0.0), "score : 0.0");
    }

    #[test]
    fn compose_needs_masks() {
        let vis = visualizer(Path::new("unused"));
        let prediction = ImagePrediction {
            scores: vec![0.9],
            labels: vec![1],
            boxes: vec![[0.0, 0.0, 1.0, 1.0]],
            masks: None,
        };
        let err = vis
            .compose(&RgbImage::new(2, 2), &prediction, 0)
            .unwrap_err();
        assert!(matches!(err, EngineError::MissingMasks));
    }

    #[test]
    fn compose_blends_only_under_the_mask() {
        let vis = visualizer(Path::new("unused"));
        let prediction = ImagePrediction {
            scores: vec![0.9],
            labels: vec![1],
            boxes: vec![[20.0, 20.0, 30.0, 30.0]],
            masks: Some(MaskStack {
                count: 1,
                height: 40,
                width: 40,
                data: (0..1600).map(|i| i == 0).collect(),
            }),
        };
        let image = RgbImage::from_pixel(40, 40, Rgb([100, 100, 100]));

        let out = vis.compose(&image, &prediction, 0).unwrap();
        assert_eq!(out.get_pixel(0, 0), &Rgb([50, 50, 178]));
        assert_eq!(out.get_pixel(39, 0), &Rgb([100, 100, 100]));
        // Top edge of the box, clear of the label.
        assert_eq!(out.get_pixel(25, 20), &Rgb([0, 0, 255]));
    }

    #[test]
    fn compose_rejects_a_candidate_without_a_box() {
        let vis = visualizer(Path::new("unused"));
        let prediction = ImagePrediction {
            scores: vec![0.9, 0.8],
            labels: vec![1, 1],
            boxes: vec![[0.0, 0.0, 1.0, 1.0]],
            masks: Some(MaskStack {
                count: 2,
                height: 2,
                width: 2,
                data: vec![true; 8],
            }),
        };
        let err = vis
            .compose(&RgbImage::new(2, 2), &prediction, 1)
            .unwrap_err();
        assert!(matches!(
            err,
            EngineError::SizeMismatch {
                what: "boxes",
                expected: 2,
                actual: 1
            }
        ));
    }
}
