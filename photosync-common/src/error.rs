//! Common error types for photosync

use thiserror::Error;

/// Common result type for photosync operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised by the shared helpers
#[derive(Error, Debug)]
pub enum Error {
    /// Config file or log file access
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Missing server address or API key, unreadable settings
    #[error("Configuration error: {0}")]
    Config(String),

    /// Flag value that does not parse: policy, date range, pattern, zone
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Operation interrupted by the run's cancellation token
    #[error("Operation cancelled")]
    Cancelled,
}
