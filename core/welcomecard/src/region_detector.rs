use image::imageops::FilterType;
use image::{GrayImage, RgbaImage};

use crate::sampler::{downsample, mean_brightness, to_grayscale};

/// Default width the background is reduced to before the component search.
pub const DEFAULT_MAX_WIDTH: u32 = 800;

/// Brightness added to the image mean to form the threshold.
const BRIGHTNESS_OFFSET: f64 = 40.0;

/// Lowest threshold ever used, keeps dim backgrounds from flooding the mask.
const MIN_CUTOFF: u8 = 200;

/// Fraction of the diameter trimmed from each side of a detected circle.
const INSET_RATIO: f64 = 0.02;

/// Smallest diameter a detection may shrink to.
pub const MIN_DIAMETER: u32 = 10;

/// Axis-aligned region in the coordinate space of the analysed image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BoundingBox {
    /// X coordinate of the top-left corner (pixels).
    pub left: u32,
    /// Y coordinate of the top-left corner (pixels).
    pub top: u32,
    /// Width in pixels, always > 0.
    pub width: u32,
    /// Height in pixels, always > 0.
    pub height: u32,
}

/// Pluggable placeholder locator.
///
/// Implement this to replace the bright-blob heuristic and pass it to
/// [`crate::CardPipeline::detector`].
pub trait SlotDetector: Send + Sync {
    /// Locate the circular placeholder in `background`, in its own pixel coordinates.
    fn detect(&self, background: &RgbaImage) -> Option<BoundingBox>;
}

/// One 4-connected run of "on" pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Component {
    pub min_x: u32,
    pub min_y: u32,
    pub max_x: u32,
    pub max_y: u32,
    pub area: u64,
    pub touches_border: bool,
}

impl Component {
    fn width(&self) -> u32 {
        self.max_x - self.min_x + 1
    }

    fn height(&self) -> u32 {
        self.max_y - self.min_y + 1
    }
}

/// Finds the largest bright blob and treats it as the placeholder circle.
#[derive(Debug, Clone)]
pub struct BrightRegionDetector {
    max_width: u32,
    filter: FilterType,
    brightness_offset: f64,
    min_cutoff: u8,
    reject_border: bool,
}

impl Default for BrightRegionDetector {
    fn default() -> Self {
        Self {
            max_width: DEFAULT_MAX_WIDTH,
            filter: FilterType::Lanczos3,
            brightness_offset: BRIGHTNESS_OFFSET,
            min_cutoff: MIN_CUTOFF,
            reject_border: false,
        }
    }
}

impl BrightRegionDetector {
    /// Detector with the default 800px working width and Lanczos3 resampling.
    pub fn new() -> Self {
        Self::default()
    }

    /// Width the background is reduced to before analysis (default: 800).
    pub fn max_width(mut self, max_width: u32) -> Self {
        self.max_width = max_width;
        self
    }

    /// Resampling filter used for the reduction (default: Lanczos3).
    pub fn filter(mut self, filter: FilterType) -> Self {
        self.filter = filter;
        self
    }

    /// Ignore blobs that touch the edge of the image (default: false).
    ///
    /// Bright borders and sky regions are common false positives; enabling
    /// this skips them at the cost of missing a slot drawn flush to an edge.
    pub fn reject_border(mut self, enable: bool) -> Self {
        self.reject_border = enable;
        self
    }

    /// Threshold for a grayscale image: mean + offset, clamped to [min_cutoff, 255].
    pub(crate) fn cutoff(&self, gray: &GrayImage) -> u8 {
        let raw = (mean_brightness(gray) + self.brightness_offset) as i64;
        raw.clamp(self.min_cutoff as i64, 255) as u8
    }
}

impl BrightRegionDetector {
    /// Largest bright component in background coordinates, as
    /// `(left, top, diameter)` before the inset is applied.
    pub(crate) fn locate(&self, background: &RgbaImage) -> Option<(u32, u32, u32)> {
        let (small, scale) = downsample(background, self.max_width, self.filter);
        let gray = to_grayscale(&small);
        let cutoff = self.cutoff(&gray);

        let components = find_components(&gray, cutoff);
        tracing::debug!(
            cutoff,
            components = components.len(),
            "bright component search finished"
        );

        let best = largest(
            components
                .iter()
                .filter(|c| !(self.reject_border && c.touches_border)),
        )?;

        let diameter_small = best.width().min(best.height());
        if scale != 1.0 {
            Some((
                (best.min_x as f64 * scale).round() as u32,
                (best.min_y as f64 * scale).round() as u32,
                (diameter_small as f64 * scale).round() as u32,
            ))
        } else {
            Some((best.min_x, best.min_y, diameter_small))
        }
    }
}

impl SlotDetector for BrightRegionDetector {
    fn detect(&self, background: &RgbaImage) -> Option<BoundingBox> {
        let (left, top, diameter) = self.locate(background)?;
        let (left, top, diameter) = inset(left, top, diameter);
        Some(clamp_to_image(left, top, diameter, background.dimensions()))
    }
}

/// Shrink a detected circle inward so a dark outline around the blob stays outside it.
pub(crate) fn inset(left: u32, top: u32, diameter: u32) -> (u32, u32, u32) {
    let pad = (diameter as f64 * INSET_RATIO).floor() as u32;
    (
        left + pad,
        top + pad,
        diameter.saturating_sub(2 * pad).max(MIN_DIAMETER),
    )
}

/// Keep the square inside the image; rounding during back-projection can push
/// it one pixel past the edge.
fn clamp_to_image(left: u32, top: u32, diameter: u32, (width, height): (u32, u32)) -> BoundingBox {
    let left = left.min(width.saturating_sub(1));
    let top = top.min(height.saturating_sub(1));
    let side = diameter.min(width - left).min(height - top).max(1);
    BoundingBox {
        left,
        top,
        width: side,
        height: side,
    }
}

/// First component with the largest area.
fn largest<'a>(components: impl Iterator<Item = &'a Component>) -> Option<&'a Component> {
    components.fold(None::<&'a Component>, |best, c| match best {
        Some(b) if b.area >= c.area => Some(b),
        _ => Some(c),
    })
}

/// Label every 4-connected region of pixels at or above `cutoff`.
///
/// Each on-pixel is pushed onto the work stack exactly once, so the search is
/// linear in the pixel count.
pub(crate) fn find_components(gray: &GrayImage, cutoff: u8) -> Vec<Component> {
    let (width, height) = gray.dimensions();
    let (w, h) = (width as usize, height as usize);
    let on: Vec<bool> = gray.as_raw().iter().map(|&v| v >= cutoff).collect();
    let mut visited = vec![false; on.len()];
    let mut stack: Vec<usize> = Vec::new();
    let mut components = Vec::new();

    for start in 0..on.len() {
        if !on[start] || visited[start] {
            continue;
        }

        visited[start] = true;
        stack.push(start);

        let mut component = Component {
            min_x: u32::MAX,
            min_y: u32::MAX,
            max_x: 0,
            max_y: 0,
            area: 0,
            touches_border: false,
        };

        while let Some(idx) = stack.pop() {
            let (x, y) = (idx % w, idx / w);
            component.area += 1;
            component.min_x = component.min_x.min(x as u32);
            component.max_x = component.max_x.max(x as u32);
            component.min_y = component.min_y.min(y as u32);
            component.max_y = component.max_y.max(y as u32);
            if x == 0 || y == 0 || x + 1 == w || y + 1 == h {
                component.touches_border = true;
            }

            let mut visit = |n: usize| {
                if on[n] && !visited[n] {
                    visited[n] = true;
                    stack.push(n);
                }
            };
            if x > 0 {
                visit(idx - 1);
            }
            if x + 1 < w {
                visit(idx + 1);
            }
            if y > 0 {
                visit(idx - w);
            }
            if y + 1 < h {
                visit(idx + w);
            }
        }

        components.push(component);
    }

    components
}
