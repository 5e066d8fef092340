//! Object references and the storage trait implemented by every backend

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};

use crate::error::Result;

/// Reference to one stored object as reported by the listing call
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ObjectKey {
    /// Full key within the bucket
    pub path: String,
    /// Storage-reported modification time
    pub last_modified: DateTime<Utc>,
    /// Object size in bytes
    pub size: u64,
}

impl ObjectKey {
    /// Create a new object reference
    pub fn new(path: impl Into<String>, last_modified: DateTime<Utc>, size: u64) -> Self {
        Self {
            path: path.into(),
            last_modified,
            size,
        }
    }
}

/// Access to a bucket-oriented object store
#[async_trait]
pub trait ObjectStorage: Send + Sync {
    /// Create the bucket if it does not exist yet
    async fn ensure_bucket(&self, bucket: &str) -> Result<()>;

    /// List every object whose key starts with `prefix`, in key order
    async fn list(&self, bucket: &str, prefix: &str) -> Result<Vec<ObjectKey>>;

    /// Fetch the full content of one object
    async fn get(&self, bucket: &str, key: &str) -> Result<Bytes>;

    /// Whether at least one object exists under `prefix`
    async fn prefix_exists(&self, bucket: &str, prefix: &str) -> Result<bool> {
        Ok(!self.list(bucket, prefix).await?.is_empty())
    }
}
