//! Custom error types for translation operations

use thiserror::Error;

use crate::document::DocumentKind;

/// Errors raised by a translation backend for a single piece of text
#[derive(Error, Debug)]
pub enum BackendError {
    /// API request failed
    #[error("API error: {status} - {message}")]
    ApiError {
        status: u16,
        message: String,
    },

    /// Rate limit exceeded
    #[error("Rate limit exceeded. Retry after {retry_after:?} seconds")]
    RateLimitError {
        retry_after: Option<u64>,
    },

    /// Network error
    #[error("Network error: {message}")]
    NetworkError {
        message: String,
    },

    /// Invalid response from API
    #[error("Invalid response: {message}")]
    InvalidResponseError {
        message: String,
    },

    /// Request timeout
    #[error("Request timeout")]
    TimeoutError,

    /// The backend has no model for the language pair
    #[error("Unsupported language pair: {source_lang} -> {target_lang}")]
    UnsupportedPair {
        source_lang: String,
        target_lang: String,
    },

    /// Reqwest error
    #[error("HTTP client error: {0}")]
    HttpError(#[from] reqwest::Error),
}

impl BackendError {
    /// Whether retrying the same request can succeed
    pub fn is_retryable(&self) -> bool {
        !matches!(self, BackendError::UnsupportedPair { .. })
    }
}

/// Translation pipeline errors
#[derive(Error, Debug)]
pub enum TranslationError {
    /// The file name does not map to a supported document kind
    #[error("Unsupported document type: {file_name} (expected .xlsx or .csv)")]
    UnsupportedShape {
        file_name: String,
    },

    /// Input bytes are corrupt or malformed for the declared kind
    #[error("Failed to read {kind} document: {message}")]
    Deserialize {
        kind: DocumentKind,
        message: String,
    },

    /// The translation backend is not installed or not ready yet
    #[error("Translation capability unavailable: {reason}")]
    CapabilityUnavailable {
        reason: String,
    },

    /// The backend rejected or failed on a specific value
    #[error("Translation failed for '{text}': {source}")]
    TranslationFailure {
        text: String,
        #[source]
        source: BackendError,
    },

    /// A valid document could not be written back to bytes
    #[error("Failed to write document: {message}")]
    Serialize {
        message: String,
    },

    /// File operation error
    #[error("File error: {path} - {message}")]
    FileError {
        path: String,
        message: String,
    },

    /// Configuration error
    #[error("Configuration error: {message}")]
    ConfigError {
        message: String,
    },

    /// IO error
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),
}

impl TranslationError {
    /// Short machine-readable code, used by the HTTP API
    pub fn code(&self) -> &'static str {
        match self {
            TranslationError::UnsupportedShape { .. } => "unsupported_shape",
            TranslationError::Deserialize { .. } => "deserialize_error",
            TranslationError::CapabilityUnavailable { .. } => "capability_unavailable",
            TranslationError::TranslationFailure { .. } => "translation_failure",
            TranslationError::Serialize { .. } => "serialize_error",
            TranslationError::FileError { .. } => "file_error",
            TranslationError::ConfigError { .. } => "config_error",
            TranslationError::IoError(_) => "io_error",
            TranslationError::JsonError(_) => "json_error",
        }
    }
}

impl From<anyhow::Error> for TranslationError {
    fn from(err: anyhow::Error) -> Self {
        TranslationError::ConfigError {
            message: err.to_string(),
        }
    }
}

/// Result type for translation operations
pub type Result<T> = std::result::Result<T, TranslationError>;
