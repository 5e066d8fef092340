//! Object storage access for edge-replay
//!
//! This crate provides the storage side of a replay run:
//!
//! - **[`ObjectStorage`]** - the bucket-oriented trait the pipeline is written against
//! - **S3** - Amazon S3 and S3-compatible storage (MinIO, LocalStack)
//! - **Memory** - in-process store for tests and dry runs
//! - **Codec** - gzip decoding of raw edge objects
//!
//! # Feature Flags
//!
//! ```toml
//! # S3 backend (default)
//! edge-replay-storage = { version = "0.2", features = ["s3"] }
//!
//! # Memory backend only
//! edge-replay-storage = { version = "0.2", default-features = false }
//! ```

pub mod codec;
pub mod error;
pub mod memory;
pub mod object;

#[cfg(feature = "s3")]
pub mod s3;

pub use codec::{decode_gzip, encode_gzip};
pub use error::{Result, StorageError};
pub use memory::MemoryStorage;
pub use object::{ObjectKey, ObjectStorage};

#[cfg(feature = "s3")]
pub use s3::{S3Storage, S3StorageConfig, SensitiveString};
