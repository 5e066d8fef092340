//! Amazon S3 object storage backend
//!
//! Reads raw edge logs and checks staging prefixes in S3 or S3-compatible
//! storage (MinIO, LocalStack).
//!
//! # Example
//!
//! ```rust,ignore
//! use edge_replay_storage::{ObjectStorage, S3Storage, S3StorageConfig};
//!
//! let storage = S3Storage::connect(&S3StorageConfig::default()).await?;
//! let keys = storage.list("edge-logs", "20240101").await?;
//! ```

use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_s3::types::{BucketLocationConstraint, CreateBucketConfiguration};
use aws_sdk_s3::Client as S3Client;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use validator::Validate;

use crate::error::{Result, StorageError};
use crate::object::{ObjectKey, ObjectStorage};

/// Wrapper for sensitive configuration values
///
/// Prevents accidental logging of secrets while allowing access when needed.
#[derive(Debug, Clone)]
pub struct SensitiveString(SecretString);

impl SensitiveString {
    /// Create a new sensitive string
    pub fn new(value: impl Into<String>) -> Self {
        Self(SecretString::from(value.into()))
    }

    /// Expose the secret value
    pub fn expose_secret(&self) -> &str {
        self.0.expose_secret()
    }
}

impl From<String> for SensitiveString {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

impl Serialize for SensitiveString {
    fn serialize<S: serde::Serializer>(
        &self,
        serializer: S,
    ) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str("***REDACTED***")
    }
}

impl<'de> Deserialize<'de> for SensitiveString {
    fn deserialize<D: serde::Deserializer<'de>>(
        deserializer: D,
    ) -> std::result::Result<Self, D::Error> {
        let value = String::deserialize(deserializer)?;
        Ok(Self::new(value))
    }
}

/// Configuration for the S3 backend
#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
pub struct S3StorageConfig {
    /// AWS region, also used as the location constraint for created buckets
    #[serde(default = "default_region")]
    #[validate(length(min = 1, max = 64))]
    pub region: String,

    /// Custom S3 endpoint URL (for S3-compatible services like MinIO)
    #[serde(default)]
    pub endpoint_url: Option<String>,

    /// AWS access key ID (uses environment/instance role if not provided)
    #[serde(default)]
    pub access_key_id: Option<SensitiveString>,

    /// AWS secret access key
    #[serde(default)]
    pub secret_access_key: Option<SensitiveString>,

    /// Use path-style addressing (required for MinIO)
    #[serde(default)]
    pub force_path_style: bool,
}

fn default_region() -> String {
    "us-west-2".to_string()
}

impl Default for S3StorageConfig {
    fn default() -> Self {
        Self {
            region: default_region(),
            endpoint_url: None,
            access_key_id: None,
            secret_access_key: None,
            force_path_style: false,
        }
    }
}

/// S3-backed [`ObjectStorage`]
#[derive(Debug, Clone)]
pub struct S3Storage {
    client: S3Client,
    region: String,
}

impl S3Storage {
    /// Build an S3 client from configuration and the default AWS credential chain
    pub async fn connect(config: &S3StorageConfig) -> Result<Self> {
        config
            .validate()
            .map_err(|e| StorageError::Config(e.to_string()))?;

        let mut aws_config_loader = aws_config::defaults(BehaviorVersion::latest())
            .region(aws_config::Region::new(config.region.clone()));

        // Use explicit credentials if provided
        if let (Some(access_key), Some(secret_key)) =
            (&config.access_key_id, &config.secret_access_key)
        {
            let creds = aws_sdk_s3::config::Credentials::new(
                access_key.expose_secret(),
                secret_key.expose_secret(),
                None,
                None,
                "edge-replay",
            );
            aws_config_loader = aws_config_loader.credentials_provider(creds);
        }

        let aws_config = aws_config_loader.load().await;
        let mut s3_config_builder = aws_sdk_s3::config::Builder::from(&aws_config);

        if let Some(endpoint) = &config.endpoint_url {
            s3_config_builder = s3_config_builder
                .endpoint_url(endpoint)
                .force_path_style(true);
        } else if config.force_path_style {
            s3_config_builder = s3_config_builder.force_path_style(true);
        }

        Ok(Self {
            client: S3Client::from_conf(s3_config_builder.build()),
            region: config.region.clone(),
        })
    }

    /// Wrap an existing client
    pub fn from_client(client: S3Client, region: impl Into<String>) -> Self {
        Self {
            client,
            region: region.into(),
        }
    }

    async fn create_bucket(&self, bucket: &str) -> Result<()> {
        let mut request = self.client.create_bucket().bucket(bucket);

        // us-east-1 rejects an explicit location constraint
        if self.region != "us-east-1" {
            request = request.create_bucket_configuration(
                CreateBucketConfiguration::builder()
                    .location_constraint(BucketLocationConstraint::from(self.region.as_str()))
                    .build(),
            );
        }

        match request.send().await {
            Ok(_) => {
                info!("Created bucket s3://{} in {}", bucket, self.region);
                Ok(())
            }
            Err(e) => {
                let already_owned = e
                    .as_service_error()
                    .is_some_and(|se| se.is_bucket_already_owned_by_you());
                if already_owned {
                    debug!("Bucket s3://{} created concurrently", bucket);
                    Ok(())
                } else {
                    Err(StorageError::backend_with_source(
                        format!("failed to create bucket '{}'", bucket),
                        e,
                    ))
                }
            }
        }
    }
}

fn to_chrono(ts: &aws_sdk_s3::primitives::DateTime) -> Option<DateTime<Utc>> {
    DateTime::from_timestamp(ts.secs(), ts.subsec_nanos())
}

#[async_trait]
impl ObjectStorage for S3Storage {
    async fn ensure_bucket(&self, bucket: &str) -> Result<()> {
        match self.client.head_bucket().bucket(bucket).send().await {
            Ok(_) => Ok(()),
            Err(e) => {
                let missing = e.as_service_error().is_some_and(|se| se.is_not_found());
                if missing {
                    warn!("Bucket s3://{} does not exist, creating it", bucket);
                    self.create_bucket(bucket).await
                } else {
                    Err(StorageError::backend_with_source(
                        format!("failed to access bucket '{}'", bucket),
                        e,
                    ))
                }
            }
        }
    }

    async fn list(&self, bucket: &str, prefix: &str) -> Result<Vec<ObjectKey>> {
        let mut pages = self
            .client
            .list_objects_v2()
            .bucket(bucket)
            .prefix(prefix)
            .into_paginator()
            .send();

        let mut keys = Vec::new();
        while let Some(page) = pages.next().await {
            let page = page.map_err(|e| {
                StorageError::backend_with_source(
                    format!("failed to list s3://{}/{}", bucket, prefix),
                    e,
                )
            })?;

            for object in page.contents() {
                let Some(key) = object.key() else { continue };
                let Some(last_modified) = object.last_modified().and_then(to_chrono) else {
                    warn!("Skipping s3://{}/{} without a modification time", bucket, key);
                    continue;
                };
                let size = object.size().unwrap_or_default().max(0) as u64;
                keys.push(ObjectKey::new(key, last_modified, size));
            }
        }

        debug!(
            "Listed {} objects under s3://{}/{}",
            keys.len(),
            bucket,
            prefix
        );
        Ok(keys)
    }

    async fn get(&self, bucket: &str, key: &str) -> Result<Bytes> {
        let output = self
            .client
            .get_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| {
                if e.as_service_error().is_some_and(|se| se.is_no_such_key()) {
                    StorageError::NotFound(format!("s3://{}/{}", bucket, key))
                } else {
                    StorageError::backend_with_source(
                        format!("failed to get s3://{}/{}", bucket, key),
                        e,
                    )
                }
            })?;

        let body = output.body.collect().await.map_err(|e| {
            StorageError::backend_with_source(format!("failed to read s3://{}/{}", bucket, key), e)
        })?;
        Ok(body.into_bytes())
    }

    async fn prefix_exists(&self, bucket: &str, prefix: &str) -> Result<bool> {
        let output = self
            .client
            .list_objects_v2()
            .bucket(bucket)
            .prefix(prefix)
            .max_keys(1)
            .send()
            .await
            .map_err(|e| {
                StorageError::backend_with_source(
                    format!("failed to list s3://{}/{}", bucket, prefix),
                    e,
                )
            })?;
        Ok(!output.contents().is_empty())
    }
}
