//! Error types for the core library.

use thiserror::Error;

/// Core library error type.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Bad or missing arguments, caught before any I/O.
    #[error("validation error: {0}")]
    Validation(String),

    /// The token endpoint rejected the credential or answered without a token.
    #[error("authentication error: {0}")]
    Auth(String),

    /// The token cache file exists but lacks a required field.
    #[error("token cache corrupt: {0}")]
    CacheCorrupt(String),

    /// A transport-level HTTP failure.
    #[error("network error: {0}")]
    Network(String),

    /// Delivery failed after exhausting the retry budget, or the provider
    /// rejected a request outside the retry loop.
    #[error("send failed after {attempts} attempt(s): {message}")]
    Send {
        /// Number of attempts made before giving up.
        attempts: u32,
        /// The last error reported.
        message: String,
    },

    /// A configuration-related error.
    #[error("configuration error: {0}")]
    Config(String),

    /// A path resolution or validation error.
    #[error("path error: {0}")]
    Path(String),

    /// An I/O error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A serialization or deserialization error.
    #[error("serialization error: {0}")]
    Serialization(String),
}

impl CoreError {
    /// Whether a failed send attempt with this error may be tried again.
    ///
    /// Transport failures and provider rejections are retried; validation,
    /// credential and cache problems are not.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Network(_) | Self::Send { .. })
    }
}

impl From<serde_json::Error> for CoreError {
    fn from(e: serde_json::Error) -> Self {
        Self::Serialization(e.to_string())
    }
}

/// Result type alias using `CoreError`.
pub type Result<T> = std::result::Result<T, CoreError>;
