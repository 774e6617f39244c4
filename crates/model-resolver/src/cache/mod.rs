//! Content-addressed cache for fetched model artifacts.
//!
//! A digest already identifies the correct content, so bytes that passed
//! verification once can be kept under their digest and served again
//! without another object-store round trip. Entries are still re-verified
//! on every read.

pub mod fs;

use thiserror::Error;

use crate::digest::Sha256Digest;

/// Errors from cache operations.
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("artifact not cached: {0}")]
    NotFound(Sha256Digest),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, CacheError>;

/// Content-addressed artifact cache interface.
pub trait ArtifactCache: Send + Sync {
    /// Store `data` and return its digest. Deduplicates automatically.
    fn put(&self, data: &[u8]) -> Result<Sha256Digest>;

    /// Retrieve the artifact for `digest`.
    fn get(&self, digest: &Sha256Digest) -> Result<Vec<u8>>;

    /// Check whether `digest` exists without reading the artifact.
    fn contains(&self, digest: &Sha256Digest) -> Result<bool>;

    /// Drop the entry for `digest`. No-op if absent.
    fn remove(&self, digest: &Sha256Digest) -> Result<()>;
}
