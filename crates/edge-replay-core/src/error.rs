//! Error types for edge-replay-core
//!
//! Errors fall into a few categories that decide how far they travel:
//! - Configuration errors stop the run before any side effect
//! - Storage and catalog errors are fatal to the run
//! - Transform errors fail their partition
//! - Reload errors fail their table only

use edge_replay_storage::StorageError;
use edge_replay_warehouse::WarehouseError;
use std::fmt;
use thiserror::Error;

/// Result type for replay operations
pub type Result<T> = std::result::Result<T, ReplayError>;

/// Error categories for classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// Invalid input or options
    Configuration,
    /// Object storage unreachable or failing
    Storage,
    /// External transformer failed
    Transform,
    /// Metadata service failed
    Catalog,
    /// Warehouse reload failed
    Reload,
    /// Internal invariant broken
    Internal,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Configuration => write!(f, "configuration"),
            Self::Storage => write!(f, "storage"),
            Self::Transform => write!(f, "transform"),
            Self::Catalog => write!(f, "catalog"),
            Self::Reload => write!(f, "reload"),
            Self::Internal => write!(f, "internal"),
        }
    }
}

/// Main error type for edge-replay-core
#[derive(Error, Debug)]
pub enum ReplayError {
    /// Window end is not after its start
    #[error("need a valid time range, got {start} to {end}")]
    InvalidRange { start: String, end: String },

    /// Timestamp could not be parsed or does not exist in its zone
    #[error("invalid timestamp: {0}")]
    InvalidTimestamp(String),

    /// Both stages were disabled
    #[error("--processor-only and --from-runtag together leave nothing to do")]
    ConflictingStages,

    /// Other invalid option
    #[error("configuration error: {0}")]
    Config(String),

    /// Listing the source bucket failed
    #[error("storage unavailable: {message}")]
    StorageUnavailable {
        message: String,
        #[source]
        source: StorageError,
    },

    /// Fetching or decoding one object failed
    #[error(transparent)]
    Storage(#[from] StorageError),

    /// Transformer exited unsuccessfully
    #[error("transformer failed for partition {partition}: {status}")]
    TransformFailed { partition: usize, status: String },

    /// Transformer could not be spawned or fed
    #[error("transformer error: {message}")]
    Transformer {
        message: String,
        #[source]
        source: std::io::Error,
    },

    /// Replay stage finished with failed partitions
    #[error("replay stage failed: {failed} of {total} partitions failed")]
    ReplayFailed { failed: usize, total: usize },

    /// Metadata service request failed
    #[error("catalog error: {message}")]
    Catalog {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Reload of one table failed
    #[error("reload of table {table} failed: {source}")]
    Reload {
        table: String,
        #[source]
        source: WarehouseError,
    },

    /// Internal error
    #[error("internal error: {0}")]
    Internal(String),
}

impl ReplayError {
    /// Get the error category
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::InvalidRange { .. }
            | Self::InvalidTimestamp(_)
            | Self::ConflictingStages
            | Self::Config(_) => ErrorCategory::Configuration,
            Self::StorageUnavailable { .. } | Self::Storage(_) => ErrorCategory::Storage,
            Self::TransformFailed { .. } | Self::Transformer { .. } | Self::ReplayFailed { .. } => {
                ErrorCategory::Transform
            }
            Self::Catalog { .. } => ErrorCategory::Catalog,
            Self::Reload { .. } => ErrorCategory::Reload,
            Self::Internal(_) => ErrorCategory::Internal,
        }
    }

    /// Whether the error stems from invalid input
    pub fn is_config(&self) -> bool {
        self.category() == ErrorCategory::Configuration
    }

    /// Create a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Wrap a listing failure
    pub fn storage_unavailable(message: impl Into<String>, source: StorageError) -> Self {
        Self::StorageUnavailable {
            message: message.into(),
            source,
        }
    }

    /// Wrap a transformer I/O failure
    pub fn transformer(message: impl Into<String>, source: std::io::Error) -> Self {
        Self::Transformer {
            message: message.into(),
            source,
        }
    }

    /// Create a catalog error
    pub fn catalog(message: impl Into<String>) -> Self {
        Self::Catalog {
            message: message.into(),
            source: None,
        }
    }

    /// Create a catalog error with source
    pub fn catalog_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Catalog {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Wrap a warehouse failure for one table
    pub fn reload(table: impl Into<String>, source: WarehouseError) -> Self {
        Self::Reload {
            table: table.into(),
            source,
        }
    }

    /// Create an internal error
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_categories() {
        assert!(ReplayError::ConflictingStages.is_config());
        assert!(ReplayError::InvalidTimestamp("x".into()).is_config());
        assert_eq!(
            ReplayError::TransformFailed {
                partition: 2,
                status: "exit status: 1".into()
            }
            .category(),
            ErrorCategory::Transform
        );
        assert_eq!(
            ReplayError::reload("click", WarehouseError::load("click", "bad")).category(),
            ErrorCategory::Reload
        );
        assert_eq!(
            ReplayError::from(StorageError::NotFound("edge/key".into())).category(),
            ErrorCategory::Storage
        );
    }

    #[test]
    fn test_error_display() {
        let err = ReplayError::InvalidRange {
            start: "2024-01-01 01:00:00 PST".into(),
            end: "2024-01-01 00:00:00 PST".into(),
        };
        assert_eq!(
            err.to_string(),
            "need a valid time range, got 2024-01-01 01:00:00 PST to 2024-01-01 00:00:00 PST"
        );

        let err = ReplayError::reload("impression", WarehouseError::load("impression", "S3"));
        assert!(err.to_string().starts_with("reload of table impression failed"));
        assert_eq!(ErrorCategory::Reload.to_string(), "reload");
    }
}
