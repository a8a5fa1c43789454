//! Welcome card rendering: find the circular placeholder on a background image
//! and composite a circle-cropped avatar into it.
//!
//! # Example
//!
//! ```no_run
//! use welcomecard::CardPipeline;
//!
//! let background = std::fs::read("background.jpg").unwrap();
//! let avatar = std::fs::read("avatar.png").ok();
//!
//! let pipeline = CardPipeline::new();
//! let card = pipeline
//!     .produce_card_from_bytes(&background, avatar.as_deref())
//!     .unwrap();
//! std::fs::write("welcome.png", &card.data).unwrap();
//! ```
#![warn(missing_docs)]

mod background;
mod compose;
mod config;
mod error;
/// Placeholder detection traits and the built-in bright-region detector.
pub mod region_detector;
/// Downsampling and brightness helpers used by detection.
pub mod sampler;
mod slot;

pub use background::BackgroundCache;
pub use config::{CardConfig, ENV_DIAMETER, ENV_LEFT, ENV_MODE, ENV_TOP};
/// Error type returned by welcomecard operations.
pub use error::CardError;
/// Resampling filter selection, re-exported from `image`.
pub use image::imageops::FilterType;
pub use region_detector::{BoundingBox, BrightRegionDetector, SlotDetector};
pub use slot::{DetectionMode, Slot, SlotResolver};

use image::RgbaImage;

/// Lossless encoding of the finished card.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum OutputFormat {
    /// PNG.
    #[default]
    Png,

    /// Lossless WebP.
    Webp,
}

/// A rendered welcome card.
#[derive(Debug, Clone)]
pub struct WelcomeCard {
    /// The encoded image bytes.
    pub data: Vec<u8>,

    /// The output format used.
    pub format: OutputFormat,

    /// Width in pixels, equal to the background's.
    pub width: u32,

    /// Height in pixels, equal to the background's.
    pub height: u32,

    /// Where the avatar was placed.
    pub slot: Slot,

    /// Whether the gray placeholder stood in for a missing or unreadable avatar.
    pub placeholder_avatar: bool,
}

/// Renders welcome cards against one background.
///
/// Holds the decoded background and the resolved slot, each computed once.
/// Keep a single pipeline for the life of the process and share it across
/// threads; it is `Send + Sync`.
pub struct CardPipeline {
    config: CardConfig,
    custom_detector: bool,
    resolver: SlotResolver,
    background: BackgroundCache,
}

impl Default for CardPipeline {
    fn default() -> Self {
        Self::with_config(CardConfig::default())
    }
}

impl CardPipeline {
    /// Pipeline with default settings: auto detection, manual fallback
    /// `(620, 170, 300)`, Lanczos3, PNG.
    pub fn new() -> Self {
        Self::default()
    }

    /// Pipeline using an explicit configuration.
    pub fn with_config(config: CardConfig) -> Self {
        let resolver = SlotResolver::with_detector(
            config.mode,
            config.manual_slot,
            Box::new(Self::default_detector(&config)),
        );
        Self {
            config,
            custom_detector: false,
            resolver,
            background: BackgroundCache::new(),
        }
    }

    /// Pipeline configured from `CIRCLE_MODE` and `MANUAL_CIRCLE_*`.
    pub fn from_env() -> Result<Self, CardError> {
        Ok(Self::with_config(CardConfig::from_env()?))
    }

    fn default_detector(config: &CardConfig) -> BrightRegionDetector {
        BrightRegionDetector::new()
            .max_width(config.max_detect_width)
            .filter(config.filter)
    }

    fn refresh_default_detector(&mut self) {
        if !self.custom_detector {
            self.resolver
                .set_detector(Box::new(Self::default_detector(&self.config)));
        }
    }

    /// Set the detection mode (default: `DetectionMode::Auto`).
    pub fn mode(mut self, mode: DetectionMode) -> Self {
        self.config.mode = mode;
        self.resolver.set_mode(mode);
        self
    }

    /// Set the manual slot, used directly in manual mode and as the
    /// fallback when detection fails (default: `(620, 170, 300)`).
    pub fn manual_slot(mut self, slot: Slot) -> Self {
        self.config.manual_slot = slot;
        self.resolver.set_manual(slot);
        self
    }

    /// Set the resampling filter (default: `FilterType::Lanczos3`).
    pub fn filter(mut self, filter: FilterType) -> Self {
        self.config.filter = filter;
        self.refresh_default_detector();
        self
    }

    /// Set the width the background is reduced to for detection (default: 800).
    pub fn max_detect_width(mut self, width: u32) -> Self {
        self.config.max_detect_width = width;
        self.refresh_default_detector();
        self
    }

    /// Set the output format (default: `OutputFormat::Png`).
    pub fn format(mut self, format: OutputFormat) -> Self {
        self.config.format = format;
        self
    }

    /// Replace the built-in detector.
    ///
    /// ```no_run
    /// use welcomecard::{BoundingBox, CardPipeline, SlotDetector};
    ///
    /// struct Centered;
    /// impl SlotDetector for Centered {
    ///     fn detect(&self, bg: &image::RgbaImage) -> Option<BoundingBox> {
    ///         let side = bg.width().min(bg.height()) / 2;
    ///         Some(BoundingBox {
    ///             left: (bg.width() - side) / 2,
    ///             top: (bg.height() - side) / 2,
    ///             width: side,
    ///             height: side,
    ///         })
    ///     }
    /// }
    ///
    /// let pipeline = CardPipeline::new().detector(Box::new(Centered));
    /// ```
    pub fn detector(mut self, detector: Box<dyn SlotDetector>) -> Self {
        self.custom_detector = true;
        self.resolver.set_detector(detector);
        self
    }

    /// The active configuration.
    pub fn config(&self) -> &CardConfig {
        &self.config
    }

    /// The decoded background, fetching it through `fetch` on first use.
    ///
    /// Only a successful decode is cached.
    pub fn background<F>(&self, fetch: F) -> Result<&RgbaImage, CardError>
    where
        F: FnOnce() -> Option<Vec<u8>>,
    {
        self.background.get_or_load(fetch)
    }

    /// Where the avatar goes on `background`.
    pub fn slot(&self, background: &RgbaImage) -> Slot {
        self.resolver.resolve(background)
    }

    /// Resolve the slot and composite `avatar` (or the placeholder) into it.
    ///
    /// `background` is not modified. Avatar problems never fail the call;
    /// only encoding can.
    pub fn produce_card(
        &self,
        background: &RgbaImage,
        avatar: Option<&[u8]>,
    ) -> Result<WelcomeCard, CardError> {
        let slot = self.slot(background);
        self.compose(background, slot, avatar)
    }

    /// Like [`CardPipeline::produce_card`], decoding the background on the
    /// first call and reusing it afterwards. Later calls ignore `background`.
    pub fn produce_card_from_bytes(
        &self,
        background: &[u8],
        avatar: Option<&[u8]>,
    ) -> Result<WelcomeCard, CardError> {
        let decoded = self.background(|| Some(background.to_vec()))?;
        self.produce_card(decoded, avatar)
    }

    /// Composite into an explicit slot, bypassing resolution.
    pub fn compose(
        &self,
        background: &RgbaImage,
        slot: Slot,
        avatar: Option<&[u8]>,
    ) -> Result<WelcomeCard, CardError> {
        let (canvas, placeholder_avatar) =
            compose::compose_canvas(background, slot, avatar, self.config.filter);
        let data = compose::encode_image(&canvas, &self.config.format)?;

        Ok(WelcomeCard {
            data,
            format: self.config.format,
            width: canvas.width(),
            height: canvas.height(),
            slot,
            placeholder_avatar,
        })
    }
}

impl std::fmt::Debug for CardPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CardPipeline")
            .field("config", &self.config)
            .field("resolver", &self.resolver)
            .field("background_loaded", &self.background.get().is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn make_background(width: u32, height: u32) -> RgbaImage {
        let mut img = RgbaImage::from_fn(width, height, |x, y| {
            image::Rgba([(x * 60 / width.max(1)) as u8, (y * 60 / height.max(1)) as u8, 40, 255])
        });
        let (cx, cy, r) = (width as f32 / 2.0, height as f32 / 2.0, height as f32 / 4.0);
        for (x, y, pixel) in img.enumerate_pixels_mut() {
            let dx = x as f32 + 0.5 - cx;
            let dy = y as f32 + 0.5 - cy;
            if dx * dx + dy * dy <= r * r {
                *pixel = image::Rgba([250, 250, 250, 255]);
            }
        }
        img
    }

    fn make_png(img: &RgbaImage) -> Vec<u8> {
        compose::encode_image(img, &OutputFormat::Png).unwrap()
    }

    struct Counting(Arc<AtomicUsize>);

    impl SlotDetector for Counting {
        fn detect(&self, _background: &RgbaImage) -> Option<BoundingBox> {
            self.0.fetch_add(1, Ordering::SeqCst);
            None
        }
    }

    #[test]
    fn pipeline_is_send_and_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<CardPipeline>();
    }

    #[test]
    fn defaults() {
        let pipeline = CardPipeline::new();
        assert_eq!(pipeline.config().mode, DetectionMode::Auto);
        assert_eq!(pipeline.config().manual_slot, Slot::default());
        assert_eq!(pipeline.config().format, OutputFormat::Png);
    }

    #[test]
    fn card_matches_background_size() {
        let background = make_background(200, 120);
        let card = CardPipeline::new().produce_card(&background, None).unwrap();
        assert_eq!((card.width, card.height), (200, 120));
        assert!(card.placeholder_avatar);

        let decoded = image::load_from_memory(&card.data).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (200, 120));
    }

    #[test]
    fn auto_mode_finds_the_disk() {
        let background = make_background(200, 120);
        let slot = CardPipeline::new().slot(&background);
        // 60px disk centred at (100, 60), pad 1
        assert!((slot.diameter() as i64 - 58).abs() <= 2, "{slot:?}");
        assert!((slot.left() as i64 - 71).abs() <= 2, "{slot:?}");
        assert!((slot.top() as i64 - 31).abs() <= 2, "{slot:?}");
    }

    #[test]
    fn manual_mode_uses_fixed_slot() {
        let slot = Slot::new(3, 4, 20).unwrap();
        let pipeline = CardPipeline::new()
            .mode(DetectionMode::Manual)
            .manual_slot(slot);
        let card = pipeline
            .produce_card(&make_background(200, 120), None)
            .unwrap();
        assert_eq!(card.slot, slot);
    }

    #[test]
    fn custom_detector_survives_filter_change() {
        let calls = Arc::new(AtomicUsize::new(0));
        let pipeline = CardPipeline::new()
            .detector(Box::new(Counting(Arc::clone(&calls))))
            .filter(FilterType::Triangle)
            .manual_slot(Slot::new(1, 1, 12).unwrap());

        let background = make_background(64, 64);
        assert_eq!(pipeline.slot(&background), Slot::new(1, 1, 12).unwrap());
        pipeline.produce_card(&background, None).unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn webp_output() {
        let card = CardPipeline::new()
            .format(OutputFormat::Webp)
            .produce_card(&make_background(64, 48), None)
            .unwrap();
        assert_eq!(card.format, OutputFormat::Webp);
        assert_eq!(&card.data[0..4], b"RIFF");
    }

    #[test]
    fn background_bytes_are_decoded_once() {
        let pipeline = CardPipeline::new();
        let first = make_png(&make_background(80, 60));
        let second = make_png(&make_background(40, 30));

        let a = pipeline.produce_card_from_bytes(&first, None).unwrap();
        let b = pipeline.produce_card_from_bytes(&second, None).unwrap();
        assert_eq!((a.width, a.height), (80, 60));
        assert_eq!((b.width, b.height), (80, 60));
    }

    #[test]
    fn unreadable_background_is_an_error() {
        let err = CardPipeline::new()
            .produce_card_from_bytes(b"not an image", None)
            .unwrap_err();
        assert!(matches!(err, CardError::BackgroundUnavailable(_)));
    }

    #[test]
    fn broken_avatar_falls_back_to_placeholder() {
        let card = CardPipeline::new()
            .produce_card(&make_background(120, 80), Some(b"garbage"))
            .unwrap();
        assert!(card.placeholder_avatar);
    }
}
