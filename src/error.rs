//! Error types for the Throttle service.

use thiserror::Error;

/// Main error type for Throttle operations.
///
/// The limiter itself never fails; a denied request is a normal outcome
/// rather than an error. These variants cover the surrounding service.
#[derive(Error, Debug)]
pub enum ThrottleError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<config::ConfigError> for ThrottleError {
    fn from(err: config::ConfigError) -> Self {
        ThrottleError::Config(err.to_string())
    }
}

/// Result type alias for Throttle operations.
pub type Result<T> = std::result::Result<T, ThrottleError>;
