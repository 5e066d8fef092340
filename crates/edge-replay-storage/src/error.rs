//! Error types for edge-replay-storage

use thiserror::Error;

/// Result type for storage operations
pub type Result<T> = std::result::Result<T, StorageError>;

/// Errors raised by object storage backends
#[derive(Error, Debug)]
pub enum StorageError {
    /// Bucket or object does not exist
    #[error("not found: {0}")]
    NotFound(String),

    /// Listing, fetching or bucket management failed at the backend
    #[error("storage backend error: {message}")]
    Backend {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Configuration validation failed
    #[error("configuration error: {0}")]
    Config(String),

    /// Object content could not be decoded
    #[error("decode error for {key}: {source}")]
    Decode {
        key: String,
        #[source]
        source: std::io::Error,
    },
}

impl StorageError {
    /// Create a backend error without a source
    pub fn backend(message: impl Into<String>) -> Self {
        Self::Backend {
            message: message.into(),
            source: None,
        }
    }

    /// Create a backend error wrapping the SDK error
    pub fn backend_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Backend {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Whether the error reports a missing bucket or object
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}
