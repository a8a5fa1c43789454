use image::imageops::FilterType;

use crate::error::CardError;
use crate::region_detector::DEFAULT_MAX_WIDTH;
use crate::slot::{DetectionMode, Slot};
use crate::OutputFormat;

/// Environment variable selecting `auto` or `manual` slot placement.
pub const ENV_MODE: &str = "CIRCLE_MODE";
/// Environment variable for the manual slot's left edge.
pub const ENV_LEFT: &str = "MANUAL_CIRCLE_LEFT";
/// Environment variable for the manual slot's top edge.
pub const ENV_TOP: &str = "MANUAL_CIRCLE_TOP";
/// Environment variable for the manual slot's diameter.
pub const ENV_DIAMETER: &str = "MANUAL_CIRCLE_DIAMETER";

/// Settings for a [`crate::CardPipeline`].
#[derive(Debug, Clone)]
pub struct CardConfig {
    /// How the slot is chosen.
    pub mode: DetectionMode,

    /// Fixed slot for manual mode and the fallback for auto mode.
    pub manual_slot: Slot,

    /// Width the background is reduced to before slot detection.
    pub max_detect_width: u32,

    /// Resampling filter for detection downsampling and avatar fitting.
    pub filter: FilterType,

    /// Encoding of the finished card.
    pub format: OutputFormat,
}

impl Default for CardConfig {
    fn default() -> Self {
        Self {
            mode: DetectionMode::Auto,
            manual_slot: Slot::default(),
            max_detect_width: DEFAULT_MAX_WIDTH,
            filter: FilterType::Lanczos3,
            format: OutputFormat::Png,
        }
    }
}

impl CardConfig {
    /// Read `CIRCLE_MODE` and `MANUAL_CIRCLE_{LEFT,TOP,DIAMETER}` from the
    /// process environment. Unset variables keep their defaults.
    pub fn from_env() -> Result<Self, CardError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Like [`CardConfig::from_env`], reading values through `lookup`.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, CardError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(mode) = lookup(ENV_MODE) {
            config.mode = mode.parse()?;
        }

        let defaults = config.manual_slot;
        let left = parse_u32(&lookup, ENV_LEFT)?.unwrap_or(defaults.left());
        let top = parse_u32(&lookup, ENV_TOP)?.unwrap_or(defaults.top());
        let diameter = parse_u32(&lookup, ENV_DIAMETER)?.unwrap_or(defaults.diameter());
        config.manual_slot = Slot::new(left, top, diameter)?;

        Ok(config)
    }
}

fn parse_u32<F>(lookup: &F, key: &str) -> Result<Option<u32>, CardError>
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse::<u32>()
            .map(Some)
            .map_err(|e| CardError::InvalidConfig(format!("{key}={raw:?}: {e}"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_match_deployment() {
        let config = CardConfig::from_lookup(lookup_from(&[])).unwrap();
        assert_eq!(config.mode, DetectionMode::Auto);
        assert_eq!(config.manual_slot, Slot::new(620, 170, 300).unwrap());
        assert_eq!(config.max_detect_width, 800);
        assert!(matches!(config.format, OutputFormat::Png));
    }

    #[test]
    fn reads_all_variables() {
        let config = CardConfig::from_lookup(lookup_from(&[
            (ENV_MODE, "Manual"),
            (ENV_LEFT, "12"),
            (ENV_TOP, " 34 "),
            (ENV_DIAMETER, "56"),
        ]))
        .unwrap();
        assert_eq!(config.mode, DetectionMode::Manual);
        assert_eq!(config.manual_slot, Slot::new(12, 34, 56).unwrap());
    }

    #[test]
    fn partial_override_keeps_other_defaults() {
        let config = CardConfig::from_lookup(lookup_from(&[(ENV_TOP, "5")])).unwrap();
        assert_eq!(config.manual_slot, Slot::new(620, 5, 300).unwrap());
    }

    #[test]
    fn rejects_bad_values() {
        let err = CardConfig::from_lookup(lookup_from(&[(ENV_LEFT, "-3")])).unwrap_err();
        assert!(matches!(err, CardError::InvalidConfig(_)));

        let err = CardConfig::from_lookup(lookup_from(&[(ENV_MODE, "sometimes")])).unwrap_err();
        assert!(matches!(err, CardError::InvalidMode(_)));

        let err = CardConfig::from_lookup(lookup_from(&[(ENV_DIAMETER, "4")])).unwrap_err();
        assert!(matches!(err, CardError::InvalidDiameter(4)));
    }
}
