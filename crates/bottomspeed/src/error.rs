//! Error types for bottomspeed.

use thiserror::Error;

/// Errors from loading or validating bottom-speed settings.
///
/// The patch pass itself never fails; these only surface from the
/// configuration layer.
#[derive(Error, Debug)]
pub enum BottomSpeedError {
    /// Settings file could not be read.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Settings file is not valid TOML for [`BottomSpeedSettings`](crate::BottomSpeedSettings).
    #[error("invalid settings file: {0}")]
    Config(#[from] toml::de::Error),

    /// A settings value is out of range.
    #[error("invalid settings: {0}")]
    InvalidSettings(String),
}

/// Result type for bottomspeed operations.
pub type Result<T> = std::result::Result<T, BottomSpeedError>;
