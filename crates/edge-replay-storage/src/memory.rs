//! In-memory object store
//!
//! Keeps buckets in a sorted map so listings come back in key order, the same
//! way S3 returns them. Used by tests and dry runs.

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap, HashSet};

use crate::error::{Result, StorageError};
use crate::object::{ObjectKey, ObjectStorage};

#[derive(Debug, Clone)]
struct StoredObject {
    data: Bytes,
    last_modified: DateTime<Utc>,
}

/// Object store backed by process memory
#[derive(Debug, Default)]
pub struct MemoryStorage {
    buckets: RwLock<HashMap<String, BTreeMap<String, StoredObject>>>,
    failing_buckets: RwLock<HashSet<String>>,
}

impl MemoryStorage {
    /// Create an empty store with no buckets
    pub fn new() -> Self {
        Self::default()
    }

    /// Store an object, creating the bucket if needed
    pub fn put(
        &self,
        bucket: &str,
        key: impl Into<String>,
        data: impl Into<Bytes>,
        last_modified: DateTime<Utc>,
    ) {
        self.buckets
            .write()
            .entry(bucket.to_string())
            .or_default()
            .insert(
                key.into(),
                StoredObject {
                    data: data.into(),
                    last_modified,
                },
            );
    }

    /// Whether the bucket exists
    pub fn has_bucket(&self, bucket: &str) -> bool {
        self.buckets.read().contains_key(bucket)
    }

    /// Make every subsequent call against `bucket` fail with a backend error
    pub fn fail_bucket(&self, bucket: &str) {
        self.failing_buckets.write().insert(bucket.to_string());
    }

    fn check_available(&self, bucket: &str) -> Result<()> {
        if self.failing_buckets.read().contains(bucket) {
            return Err(StorageError::backend(format!(
                "bucket '{}' is unavailable",
                bucket
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl ObjectStorage for MemoryStorage {
    async fn ensure_bucket(&self, bucket: &str) -> Result<()> {
        self.check_available(bucket)?;
        self.buckets.write().entry(bucket.to_string()).or_default();
        Ok(())
    }

    async fn list(&self, bucket: &str, prefix: &str) -> Result<Vec<ObjectKey>> {
        self.check_available(bucket)?;
        let buckets = self.buckets.read();
        let objects = buckets
            .get(bucket)
            .ok_or_else(|| StorageError::NotFound(format!("bucket '{}'", bucket)))?;

        Ok(objects
            .range(prefix.to_string()..)
            .take_while(|(key, _)| key.starts_with(prefix))
            .map(|(key, obj)| ObjectKey::new(key.clone(), obj.last_modified, obj.data.len() as u64))
            .collect())
    }

    async fn get(&self, bucket: &str, key: &str) -> Result<Bytes> {
        self.check_available(bucket)?;
        self.buckets
            .read()
            .get(bucket)
            .and_then(|objects| objects.get(key))
            .map(|obj| obj.data.clone())
            .ok_or_else(|| StorageError::NotFound(format!("{}/{}", bucket, key)))
    }
}
