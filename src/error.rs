//! Error types for Cadence.

use thiserror::Error;

/// Main error type for Cadence operations.
#[derive(Error, Debug)]
pub enum CadenceError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// A wait or max-wait value below zero
    #[error("Invalid {name}: {value}ms is negative")]
    InvalidWait {
        /// Name of the offending setting
        name: &'static str,
        /// The rejected value in milliseconds
        value: i64,
    },

    /// Controller options that can never produce a delivery
    #[error("Invalid controller options: {0}")]
    InvalidOptions(String),

    /// A tokio-backed constructor was called outside a runtime
    #[error("No tokio runtime is available on this thread")]
    NoRuntime,

    /// Malformed replay script
    #[error("Script error on line {line}: {message}")]
    Script {
        /// 1-based line number
        line: usize,
        /// What was wrong with the line
        message: String,
    },

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for Cadence operations.
pub type Result<T> = std::result::Result<T, CadenceError>;

/// Convert a signed millisecond setting into a [`std::time::Duration`].
///
/// Negative values are rejected rather than clamped.
pub fn wait_from_millis(name: &'static str, value: i64) -> Result<std::time::Duration> {
    u64::try_from(value)
        .map(std::time::Duration::from_millis)
        .map_err(|_| CadenceError::InvalidWait { name, value })
}
