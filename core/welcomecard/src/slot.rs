use std::fmt;
use std::str::FromStr;

use image::RgbaImage;
use once_cell::sync::OnceCell;

use crate::error::CardError;
use crate::region_detector::{BoundingBox, BrightRegionDetector, SlotDetector, MIN_DIAMETER};

/// Where the avatar goes: a `diameter`-sided square at `(left, top)` in
/// background coordinates. The square may extend past the canvas; pasting clips it.
///
/// Fields are private so every slot has passed the diameter check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Slot {
    left: u32,
    top: u32,
    diameter: u32,
}

impl Slot {
    /// Create a slot, rejecting diameters below 10.
    pub fn new(left: u32, top: u32, diameter: u32) -> Result<Self, CardError> {
        if diameter < MIN_DIAMETER {
            return Err(CardError::InvalidDiameter(diameter));
        }
        Ok(Self {
            left,
            top,
            diameter,
        })
    }

    /// X coordinate of the top-left corner (pixels).
    pub fn left(&self) -> u32 {
        self.left
    }

    /// Y coordinate of the top-left corner (pixels).
    pub fn top(&self) -> u32 {
        self.top
    }

    /// Side of the square and diameter of the inscribed circle, at least 10.
    pub fn diameter(&self) -> u32 {
        self.diameter
    }
}

impl Default for Slot {
    fn default() -> Self {
        Self {
            left: 620,
            top: 170,
            diameter: 300,
        }
    }
}

impl From<BoundingBox> for Slot {
    fn from(bbox: BoundingBox) -> Self {
        Self {
            left: bbox.left,
            top: bbox.top,
            diameter: bbox.width.min(bbox.height).max(MIN_DIAMETER),
        }
    }
}

/// How the slot is chosen.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum DetectionMode {
    /// Locate the placeholder on the background, falling back to the manual slot.
    #[default]
    Auto,

    /// Always use the manual slot.
    Manual,
}

impl FromStr for DetectionMode {
    type Err = CardError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "auto" => Ok(Self::Auto),
            "manual" => Ok(Self::Manual),
            _ => Err(CardError::InvalidMode(s.to_string())),
        }
    }
}

impl fmt::Display for DetectionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Auto => f.write_str("auto"),
            Self::Manual => f.write_str("manual"),
        }
    }
}

/// Decides the slot for a background and remembers the answer.
///
/// In [`DetectionMode::Auto`] the detector runs at most once for the lifetime
/// of the resolver. Concurrent first callers wait for that single run.
pub struct SlotResolver {
    mode: DetectionMode,
    manual: Slot,
    detector: Box<dyn SlotDetector>,
    cached: OnceCell<Slot>,
}

impl SlotResolver {
    /// Resolver using the built-in bright-region detector.
    pub fn new(mode: DetectionMode, manual: Slot) -> Self {
        Self::with_detector(mode, manual, Box::new(BrightRegionDetector::new()))
    }

    /// Resolver using a caller-provided detector.
    pub fn with_detector(mode: DetectionMode, manual: Slot, detector: Box<dyn SlotDetector>) -> Self {
        Self {
            mode,
            manual,
            detector,
            cached: OnceCell::new(),
        }
    }

    /// Configured detection mode.
    pub fn mode(&self) -> DetectionMode {
        self.mode
    }

    /// Manual slot, also the fallback when detection fails.
    pub fn manual(&self) -> Slot {
        self.manual
    }

    /// The memoized auto slot, if detection has already run.
    pub fn cached(&self) -> Option<Slot> {
        self.cached.get().copied()
    }

    pub(crate) fn set_mode(&mut self, mode: DetectionMode) {
        self.mode = mode;
        self.cached = OnceCell::new();
    }

    pub(crate) fn set_manual(&mut self, manual: Slot) {
        self.manual = manual;
        self.cached = OnceCell::new();
    }

    pub(crate) fn set_detector(&mut self, detector: Box<dyn SlotDetector>) {
        self.detector = detector;
        self.cached = OnceCell::new();
    }

    /// Slot for `background`.
    pub fn resolve(&self, background: &RgbaImage) -> Slot {
        match self.mode {
            DetectionMode::Manual => self.manual,
            DetectionMode::Auto => *self.cached.get_or_init(|| self.detect(background)),
        }
    }

    fn detect(&self, background: &RgbaImage) -> Slot {
        match self.detector.detect(background) {
            Some(bbox) => {
                let slot = Slot::from(bbox);
                tracing::info!(
                    left = slot.left,
                    top = slot.top,
                    diameter = slot.diameter,
                    "auto-detected avatar slot"
                );
                slot
            }
            None => {
                tracing::warn!(
                    left = self.manual.left,
                    top = self.manual.top,
                    diameter = self.manual.diameter,
                    "slot detection failed; falling back to manual coordinates"
                );
                self.manual
            }
        }
    }
}

impl fmt::Debug for SlotResolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SlotResolver")
            .field("mode", &self.mode)
            .field("manual", &self.manual)
            .field("cached", &self.cached.get())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct CountingDetector {
        calls: Arc<AtomicUsize>,
        result: Option<BoundingBox>,
    }

    impl SlotDetector for CountingDetector {
        fn detect(&self, _background: &RgbaImage) -> Option<BoundingBox> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.result
        }
    }

    fn counting(result: Option<BoundingBox>) -> (Box<dyn SlotDetector>, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        let detector = CountingDetector {
            calls: Arc::clone(&calls),
            result,
        };
        (Box::new(detector), calls)
    }

    fn background() -> RgbaImage {
        RgbaImage::from_pixel(64, 48, image::Rgba([0, 0, 0, 255]))
    }

    #[test]
    fn slot_rejects_small_diameter() {
        assert!(matches!(Slot::new(0, 0, 9), Err(CardError::InvalidDiameter(9))));
        assert!(Slot::new(0, 0, 10).is_ok());
    }

    #[test]
    fn tiny_bounding_box_still_yields_valid_slot() {
        let slot = Slot::from(BoundingBox {
            left: 1,
            top: 2,
            width: 3,
            height: 3,
        });
        assert_eq!((slot.left(), slot.top(), slot.diameter()), (1, 2, 10));
    }

    #[test]
    fn mode_parsing() {
        assert_eq!("auto".parse::<DetectionMode>().unwrap(), DetectionMode::Auto);
        assert_eq!(" MANUAL ".parse::<DetectionMode>().unwrap(), DetectionMode::Manual);
        assert!("sometimes".parse::<DetectionMode>().is_err());
        assert_eq!(DetectionMode::Manual.to_string(), "manual");
    }

    #[test]
    fn bounding_box_converts_with_smaller_side() {
        let slot = Slot::from(BoundingBox {
            left: 3,
            top: 4,
            width: 50,
            height: 40,
        });
        assert_eq!(slot, Slot::new(3, 4, 40).unwrap());
    }

    #[test]
    fn manual_mode_never_detects() {
        let manual = Slot::new(5, 6, 20).unwrap();
        let (detector, calls) = counting(None);
        let resolver = SlotResolver::with_detector(DetectionMode::Manual, manual, detector);

        assert_eq!(resolver.resolve(&background()), manual);
        assert_eq!(resolver.resolve(&RgbaImage::new(1, 1)), manual);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert_eq!(resolver.cached(), None);
    }

    #[test]
    fn auto_mode_detects_once() {
        let bbox = BoundingBox {
            left: 10,
            top: 12,
            width: 30,
            height: 30,
        };
        let (detector, calls) = counting(Some(bbox));
        let resolver = SlotResolver::with_detector(DetectionMode::Auto, Slot::default(), detector);

        let first = resolver.resolve(&background());
        let second = resolver.resolve(&background());
        assert_eq!(first, second);
        assert_eq!(first, Slot::new(10, 12, 30).unwrap());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(resolver.cached(), Some(first));
    }

    #[test]
    fn auto_mode_caches_fallback() {
        let manual = Slot::new(1, 2, 15).unwrap();
        let (detector, calls) = counting(None);
        let resolver = SlotResolver::with_detector(DetectionMode::Auto, manual, detector);

        assert_eq!(resolver.resolve(&background()), manual);
        assert_eq!(resolver.resolve(&background()), manual);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn concurrent_first_access_detects_once() {
        let bbox = BoundingBox {
            left: 0,
            top: 0,
            width: 16,
            height: 16,
        };
        let (detector, calls) = counting(Some(bbox));
        let resolver = SlotResolver::with_detector(DetectionMode::Auto, Slot::default(), detector);
        let bg = background();

        std::thread::scope(|scope| {
            for _ in 0..8 {
                scope.spawn(|| resolver.resolve(&bg));
            }
        });

        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn changing_mode_clears_cache() {
        let (detector, calls) = counting(None);
        let mut resolver = SlotResolver::with_detector(DetectionMode::Auto, Slot::default(), detector);
        resolver.resolve(&background());
        resolver.set_mode(DetectionMode::Auto);
        assert_eq!(resolver.cached(), None);
        resolver.resolve(&background());
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }
}
