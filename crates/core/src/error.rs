//! Error types for the HVDC logistics engine.

use thiserror::Error;

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the HVDC logistics engine.
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Input violates an engine invariant. Always names the offending key
    /// (SKU id, warehouse/period, reference code).
    #[error("Validation error [{key}]: {reason}")]
    Validation { key: String, reason: String },

    /// Invalid period string or calendar arithmetic.
    #[error("Period error: {0}")]
    Period(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Generic error with message.
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Create a configuration error.
    pub fn config(msg: impl Into<String>) -> Self {
        Error::Config(msg.into())
    }

    /// Create a validation error for the given key.
    pub fn validation(key: impl Into<String>, reason: impl Into<String>) -> Self {
        Error::Validation {
            key: key.into(),
            reason: reason.into(),
        }
    }

    /// Create a period error.
    pub fn period(msg: impl Into<String>) -> Self {
        Error::Period(msg.into())
    }

    /// Key named by a validation error, if any.
    pub fn key(&self) -> Option<&str> {
        match self {
            Error::Validation { key, .. } => Some(key),
            _ => None,
        }
    }

    /// Whether this is a validation error.
    pub fn is_validation(&self) -> bool {
        matches!(self, Error::Validation { .. })
    }
}
