use thiserror::Error;

/// Failures surfaced to the caller. Avatar and detection problems are
/// recovered internally and never appear here.
#[derive(Debug, Error)]
pub enum CardError {
    #[error("background image unavailable: {0}")]
    BackgroundUnavailable(String),

    #[error("failed to encode card: {0}")]
    EncodeFailed(String),

    #[error("slot diameter must be at least 10, got {0}")]
    InvalidDiameter(u32),

    #[error("unknown detection mode: {0}")]
    InvalidMode(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}
