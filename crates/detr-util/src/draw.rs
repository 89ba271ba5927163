//! Overlay primitives: mask blending, rectangles and labels.

use ab_glyph::{Font, FontRef, PxScale, ScaleFont};
use image::{GrayImage, Luma, Rgb, RgbImage};
use imageproc::{
    drawing::{draw_hollow_rect_mut, draw_text_mut},
    rect::Rect,
};

use crate::error::{DrawError, DrawResult};

/// Build a binary mask image from row-major `data`; set pixels become 255.
pub fn mask_from_slice(width: u32, height: u32, data: &[bool]) -> DrawResult<GrayImage> {
    let expected = width as usize * height as usize;
    if data.len() != expected {
        return Err(DrawError::DataLengthMismatch {
            expected,
            actual: data.len(),
        });
    }
    Ok(GrayImage::from_fn(width, height, |x, y| {
        let on = data[y as usize * width as usize + x as usize];
        Luma([if on { 255 } else { 0 }])
    }))
}

/// Blend a solid `color` over `image` wherever `mask` is non-zero.
///
/// Computes `image * (1 - alpha) + painted * alpha`, where `painted` is `image`
/// with the masked pixels replaced by `color`. Unmasked pixels come out
/// unchanged. Channels are rounded half to even and saturated to `u8`.
pub fn blend_mask(
    image: &RgbImage,
    mask: &GrayImage,
    color: Rgb<u8>,
    alpha: f32,
) -> DrawResult<RgbImage> {
    if !(0.0..=1.0).contains(&alpha) {
        return Err(DrawError::InvalidAlpha { alpha });
    }
    if image.dimensions() != mask.dimensions() {
        return Err(DrawError::DimensionMismatch {
            image_width: image.width(),
            image_height: image.height(),
            mask_width: mask.width(),
            mask_height: mask.height(),
        });
    }

    let mut out = image.clone();
    for (x, y, pixel) in out.enumerate_pixels_mut() {
        if mask.get_pixel(x, y)[0] == 0 {
            continue;
        }
        for (channel, paint) in pixel.0.iter_mut().zip(color.0) {
            let mixed = f32::from(*channel) * (1.0 - alpha) + f32::from(paint) * alpha;
            *channel = mixed.round_ties_even().clamp(0.0, 255.0) as u8;
        }
    }
    Ok(out)
}

/// Draw the outline of `[x0, y0, x1, y1]` (inclusive corners), `thickness`
/// pixels wide and centred on the box edge. Parts outside the image are clipped.
pub fn draw_box(image: &mut RgbImage, bbox: [i32; 4], color: Rgb<u8>, thickness: u32) {
    let (x0, x1) = (bbox[0].min(bbox[2]), bbox[0].max(bbox[2]));
    let (y0, y1) = (bbox[1].min(bbox[3]), bbox[1].max(bbox[3]));

    let thickness = thickness.max(1) as i32;
    let inner = (thickness - 1) / 2;
    for offset in -inner..=(thickness - 1 - inner) {
        let width = x1 - x0 + 1 + 2 * offset;
        let height = y1 - y0 + 1 + 2 * offset;
        if width <= 0 || height <= 0 {
            continue;
        }
        let rect = Rect::at(x0 - offset, y0 - offset).of_size(width as u32, height as u32);
        draw_hollow_rect_mut(image, rect, color);
    }
}

static LABEL_FONT: &[u8] = include_bytes!("../assets/DejaVuSans.ttf");

/// The font used for score labels (DejaVu Sans, embedded in the crate).
pub fn label_font() -> DrawResult<FontRef<'static>> {
    FontRef::try_from_slice(LABEL_FONT).map_err(|source| DrawError::Font { source })
}

/// Render `text` at `size` pixels, anti-aliased over the existing pixels.
///
/// `origin` is the left end of the baseline, as in OpenCV's `putText`; glyphs
/// extend up to the font's ascent above it. Parts outside the image are clipped.
pub fn draw_text(
    image: &mut RgbImage,
    text: &str,
    origin: (i32, i32),
    color: Rgb<u8>,
    font: &FontRef<'_>,
    size: f32,
) {
    let scale = PxScale::from(size);
    let ascent = font.as_scaled(scale).ascent();
    let top = origin.1 - ascent.round() as i32;
    draw_text_mut(image, color, origin.0, top, scale, font, text);
}
