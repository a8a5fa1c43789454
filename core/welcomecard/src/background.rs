use image::RgbaImage;
use once_cell::sync::OnceCell;

use crate::error::CardError;

/// Decode input bytes into the canonical RGBA model.
pub(crate) fn decode_background(input: &[u8]) -> Result<RgbaImage, CardError> {
    let decoded = image::load_from_memory(input)
        .map_err(|e| CardError::BackgroundUnavailable(e.to_string()))?;

    if decoded.width() == 0 || decoded.height() == 0 {
        return Err(CardError::BackgroundUnavailable(
            "image dimensions are zero".to_string(),
        ));
    }

    Ok(decoded.to_rgba8())
}

/// Decode-once store for the card background.
///
/// The image is written only after a successful decode; a failed load leaves
/// the cache empty so the next call tries again.
#[derive(Debug, Default)]
pub struct BackgroundCache {
    image: OnceCell<RgbaImage>,
}

impl BackgroundCache {
    /// Empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// The cached background, if one has been loaded.
    pub fn get(&self) -> Option<&RgbaImage> {
        self.image.get()
    }

    /// Return the cached background, fetching and decoding it on first use.
    ///
    /// `fetch` is only called while the cache is empty. It returns `None` when
    /// the bytes could not be obtained.
    pub fn get_or_load<F>(&self, fetch: F) -> Result<&RgbaImage, CardError>
    where
        F: FnOnce() -> Option<Vec<u8>>,
    {
        self.image.get_or_try_init(|| {
            let bytes = fetch().ok_or_else(|| {
                CardError::BackgroundUnavailable("no background bytes".to_string())
            })?;
            let image = decode_background(&bytes)?;
            tracing::debug!(
                width = image.width(),
                height = image.height(),
                "background decoded"
            );
            Ok(image)
        })
    }
}
