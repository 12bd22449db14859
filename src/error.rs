//! Error types for the Tollgate admission-control layer.

use thiserror::Error;

/// Main error type for Tollgate operations.
///
/// Admission rejections are not errors: they are reported as `false` by
/// [`crate::ratelimit::RateLimiter::allow`].
#[derive(Error, Debug)]
pub enum TollgateError {
    /// Configuration-related errors (invalid limits, unparsable files)
    #[error("Configuration error: {0}")]
    Config(String),

    /// A call was made with an argument the callee cannot accept
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<config::ConfigError> for TollgateError {
    fn from(err: config::ConfigError) -> Self {
        TollgateError::Config(err.to_string())
    }
}

/// Result type alias for Tollgate operations.
pub type Result<T> = std::result::Result<T, TollgateError>;
