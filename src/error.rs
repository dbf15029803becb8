//! Error types for the Marquee service.

use thiserror::Error;

/// Main error type for Marquee operations.
///
/// The rate limiter and animation manager never fail once constructed;
/// these variants cover construction and process boundaries only.
#[derive(Error, Debug)]
pub enum MarqueeError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// A rate limit policy with values outside its valid range
    #[error("Invalid rate limit policy: {0}")]
    InvalidPolicy(String),

    /// No async runtime available to drive timers
    #[error("Runtime error: {0}")]
    Runtime(String),

    /// Layered configuration source errors
    #[error("Configuration source error: {0}")]
    ConfigSource(#[from] config::ConfigError),

    /// HTTP server errors
    #[error("Server error: {0}")]
    Server(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for Marquee operations.
pub type Result<T> = std::result::Result<T, MarqueeError>;
