use std::borrow::Cow;

use image::imageops::FilterType;
use image::{GrayImage, RgbaImage};

/// Shrink `image` so its width is at most `max_width`, keeping the aspect ratio.
///
/// Returns the (possibly borrowed) working image and the factor
/// `original_width / scaled_width` needed to project coordinates back onto
/// the original. Images already narrow enough are returned untouched with a
/// factor of `1.0`.
pub fn downsample(
    image: &RgbaImage,
    max_width: u32,
    filter: FilterType,
) -> (Cow<'_, RgbaImage>, f64) {
    let (width, height) = image.dimensions();
    if max_width == 0 || width <= max_width {
        return (Cow::Borrowed(image), 1.0);
    }

    let scale = width as f64 / max_width as f64;
    let new_height = ((height as f64 / scale).round() as u32).max(1);
    let scaled = image::imageops::resize(image, max_width, new_height, filter);

    (Cow::Owned(scaled), scale)
}

/// Luma conversion; the alpha channel is ignored.
pub fn to_grayscale(image: &RgbaImage) -> GrayImage {
    image::imageops::grayscale(image)
}

/// Arithmetic mean of all intensities (0–255). Empty images report 0.
pub fn mean_brightness(gray: &GrayImage) -> f64 {
    let count = gray.as_raw().len();
    if count == 0 {
        return 0.0;
    }
    let sum: u64 = gray.as_raw().iter().map(|&v| v as u64).sum();
    sum as f64 / count as f64
}
