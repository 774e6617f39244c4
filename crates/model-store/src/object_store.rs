//! Object store trait definition
//!
//! The resolver only ever needs one capability from an object store: fetch
//! the full content of a named object. Credential resolution, signing and
//! transport live behind this trait so the resolver can be exercised
//! without a network.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::StoreError;

/// Result type for object store operations
pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Bucket and key of an object.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct S3Location {
    pub bucket: String,
    pub key: String,
}

impl S3Location {
    pub fn new(bucket: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            key: key.into(),
        }
    }
}

impl std::fmt::Display for S3Location {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "s3://{}/{}", self.bucket, self.key)
    }
}

/// Read-only object store.
///
/// Guarantees:
/// - `get_object` returns the complete object body or an error, never a
///   truncated body.
/// - Retriable failures are reported as `StoreError::Transient`.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Fetch the full content of `bucket/key`.
    async fn get_object(&self, bucket: &str, key: &str) -> StoreResult<Vec<u8>>;
}
