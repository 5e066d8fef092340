//! Error types for edge-replay-warehouse
//!
//! Errors are classified so callers can tell connection problems from
//! statement failures:
//! - Retriable errors (connection)
//! - Non-retriable errors (query, bulk load, configuration)

use std::fmt;
use thiserror::Error;

/// Result type for warehouse operations
pub type Result<T> = std::result::Result<T, WarehouseError>;

/// Error categories for classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// Connection-related errors (retriable)
    Connection,
    /// Statement execution errors
    Query,
    /// Bulk load (COPY) errors
    Load,
    /// Transaction control errors
    Transaction,
    /// Credential resolution errors
    Credentials,
    /// Configuration error
    Configuration,
}

impl ErrorCategory {
    /// Whether errors in this category are generally retriable
    #[inline]
    pub const fn is_retriable(self) -> bool {
        matches!(self, Self::Connection)
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Connection => write!(f, "connection"),
            Self::Query => write!(f, "query"),
            Self::Load => write!(f, "load"),
            Self::Transaction => write!(f, "transaction"),
            Self::Credentials => write!(f, "credentials"),
            Self::Configuration => write!(f, "configuration"),
        }
    }
}

/// Main error type for edge-replay-warehouse
#[derive(Error, Debug)]
pub enum WarehouseError {
    /// Connection failed
    #[error("connection error: {message}")]
    Connection {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Statement execution failed
    #[error("query error: {message}")]
    Query {
        message: String,
        sql: Option<String>,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Bulk load into the import table failed
    #[error("load error for table {table}: {message}")]
    Load { table: String, message: String },

    /// BEGIN/COMMIT/ROLLBACK failed
    #[error("transaction error: {message}")]
    Transaction {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// AWS credentials for the bulk load could not be resolved
    #[error("credentials error: {0}")]
    Credentials(String),

    /// Configuration error
    #[error("configuration error: {0}")]
    Configuration(String),
}

impl WarehouseError {
    /// Get the error category
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::Connection { .. } => ErrorCategory::Connection,
            Self::Query { .. } => ErrorCategory::Query,
            Self::Load { .. } => ErrorCategory::Load,
            Self::Transaction { .. } => ErrorCategory::Transaction,
            Self::Credentials(_) => ErrorCategory::Credentials,
            Self::Configuration(_) => ErrorCategory::Configuration,
        }
    }

    /// Whether this error is retriable
    #[inline]
    pub fn is_retriable(&self) -> bool {
        self.category().is_retriable()
    }

    /// Create a connection error
    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection {
            message: message.into(),
            source: None,
        }
    }

    /// Create a connection error with source
    pub fn connection_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Connection {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Create a query error carrying the failed statement
    pub fn query_with_sql(message: impl Into<String>, sql: impl Into<String>) -> Self {
        Self::Query {
            message: message.into(),
            sql: Some(sql.into()),
            source: None,
        }
    }

    /// Create a bulk load error
    pub fn load(table: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Load {
            table: table.into(),
            message: message.into(),
        }
    }

    /// Create a transaction control error with source
    pub fn transaction_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Transaction {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Create a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }
}
