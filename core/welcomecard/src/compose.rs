use image::codecs::png::PngEncoder;
use image::codecs::webp::WebPEncoder;
use image::imageops::{self, FilterType};
use image::{GrayImage, ImageEncoder, RgbaImage};

use crate::error::CardError;
use crate::slot::Slot;
use crate::OutputFormat;

/// Neutral gray used when no usable avatar is available.
const PLACEHOLDER_COLOR: image::Rgba<u8> = image::Rgba([200, 200, 200, 255]);

/// Decode the avatar, substituting a gray square when it is missing or broken.
///
/// The boolean is `true` when the placeholder was used.
pub(crate) fn decode_avatar(input: Option<&[u8]>, diameter: u32) -> (RgbaImage, bool) {
    let placeholder = || RgbaImage::from_pixel(diameter, diameter, PLACEHOLDER_COLOR);

    let Some(bytes) = input.filter(|b| !b.is_empty()) else {
        return (placeholder(), true);
    };

    match image::load_from_memory(bytes) {
        Ok(decoded) if decoded.width() > 0 && decoded.height() > 0 => (decoded.to_rgba8(), false),
        Ok(_) => {
            tracing::debug!("avatar has zero dimensions; using placeholder");
            (placeholder(), true)
        }
        Err(e) => {
            tracing::debug!(error = %e, "avatar decode failed; using placeholder");
            (placeholder(), true)
        }
    }
}

/// Crop the centred square of the avatar, then scale it to `diameter`.
///
/// Cropping first keeps the intermediate no larger than the source, however
/// extreme its aspect ratio.
pub(crate) fn fit_cover(avatar: RgbaImage, diameter: u32, filter: FilterType) -> RgbaImage {
    if avatar.dimensions() == (diameter, diameter) {
        return avatar;
    }
    let (width, height) = avatar.dimensions();
    let side = width.min(height);
    let x = (width - side) / 2;
    let y = (height - side) / 2;

    let square = if (width, height) == (side, side) {
        avatar
    } else {
        imageops::crop_imm(&avatar, x, y, side, side).to_image()
    };
    imageops::resize(&square, diameter, diameter, filter)
}

/// Single-channel disc mask: 255 inside the inscribed circle, 0 outside.
///
/// Edge pixels carry their approximate coverage so the rim is anti-aliased.
pub(crate) fn circle_mask(diameter: u32) -> GrayImage {
    let radius = diameter as f32 / 2.0;
    GrayImage::from_fn(diameter, diameter, |x, y| {
        let dx = x as f32 + 0.5 - radius;
        let dy = y as f32 + 0.5 - radius;
        let distance = (dx * dx + dy * dy).sqrt();
        let coverage = (radius - distance + 0.5).clamp(0.0, 1.0);
        image::Luma([(coverage * 255.0).round() as u8])
    })
}

/// Multiply the avatar's alpha by the mask.
pub(crate) fn apply_mask(avatar: &mut RgbaImage, mask: &GrayImage) {
    for (pixel, m) in avatar.pixels_mut().zip(mask.pixels()) {
        let alpha = pixel.0[3] as u32 * m.0[0] as u32;
        pixel.0[3] = ((alpha + 127) / 255) as u8;
    }
}

/// Alpha-composite `top` over `canvas` with its top-left corner at `(left, top_y)`.
///
/// Parts that fall outside the canvas are dropped. Fully transparent pixels
/// leave the canvas untouched.
pub(crate) fn paste_over(canvas: &mut RgbaImage, top: &RgbaImage, left: u32, top_y: u32) {
    let (canvas_w, canvas_h) = canvas.dimensions();

    for (dx, dy, fg) in top.enumerate_pixels() {
        let x = left as u64 + dx as u64;
        let y = top_y as u64 + dy as u64;
        if x >= canvas_w as u64 || y >= canvas_h as u64 {
            continue;
        }

        let fg_alpha = fg.0[3];
        if fg_alpha == 0 {
            continue;
        }
        let bg = canvas.get_pixel_mut(x as u32, y as u32);
        if fg_alpha == 255 {
            *bg = *fg;
            continue;
        }
        *bg = blend_over(bg, fg);
    }
}

fn blend_over(bg: &image::Rgba<u8>, fg: &image::Rgba<u8>) -> image::Rgba<u8> {
    let fg_a = fg.0[3] as f32 / 255.0;
    let bg_a = bg.0[3] as f32 / 255.0;
    let out_a = fg_a + bg_a * (1.0 - fg_a);
    if out_a <= 0.0 {
        return image::Rgba([0, 0, 0, 0]);
    }

    let channel = |i: usize| {
        let c = (fg.0[i] as f32 * fg_a + bg.0[i] as f32 * bg_a * (1.0 - fg_a)) / out_a;
        c.round().clamp(0.0, 255.0) as u8
    };

    image::Rgba([
        channel(0),
        channel(1),
        channel(2),
        (out_a * 255.0).round() as u8,
    ])
}

/// Encode the canvas losslessly in the requested format.
pub(crate) fn encode_image(image: &RgbaImage, format: &OutputFormat) -> Result<Vec<u8>, CardError> {
    let mut buffer = Vec::new();
    let (width, height) = image.dimensions();

    match format {
        OutputFormat::Png => {
            PngEncoder::new(&mut buffer)
                .write_image(image.as_raw(), width, height, image::ExtendedColorType::Rgba8)
                .map_err(|e| CardError::EncodeFailed(e.to_string()))?;
        }
        OutputFormat::Webp => {
            WebPEncoder::new_lossless(&mut buffer)
                .write_image(image.as_raw(), width, height, image::ExtendedColorType::Rgba8)
                .map_err(|e| CardError::EncodeFailed(e.to_string()))?;
        }
    }

    Ok(buffer)
}

/// Render the avatar into `slot` on a copy of `background`.
///
/// Returns the composited canvas and whether the placeholder avatar was used.
/// `background` is never modified.
pub(crate) fn compose_canvas(
    background: &RgbaImage,
    slot: Slot,
    avatar: Option<&[u8]>,
    filter: FilterType,
) -> (RgbaImage, bool) {
    let (decoded, placeholder) = decode_avatar(avatar, slot.diameter());
    let mut fitted = fit_cover(decoded, slot.diameter(), filter);
    apply_mask(&mut fitted, &circle_mask(slot.diameter()));

    let mut canvas = background.clone();
    paste_over(&mut canvas, &fitted, slot.left(), slot.top());

    (canvas, placeholder)
}
