//! Error types for model-store

use thiserror::Error;

/// Errors returned by an [`ObjectStore`](crate::ObjectStore) backend.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// The bucket/key pair does not name an object
    #[error("object not found: s3://{bucket}/{key}")]
    NotFound { bucket: String, key: String },

    /// The store refused access to the object
    #[error("access denied: s3://{bucket}/{key}")]
    AccessDenied { bucket: String, key: String },

    /// Retriable failure: timeout, throttling or a server-side error
    #[error("transient store error: {0}")]
    Transient(String),

    /// Non-retriable transport or protocol failure
    #[error("transport error: {0}")]
    Transport(String),

    /// Store client could not be configured
    #[error("invalid store configuration: {0}")]
    Config(String),
}

impl StoreError {
    /// Whether a caller may reasonably retry the same request.
    pub fn is_transient(&self) -> bool {
        matches!(self, StoreError::Transient(_))
    }
}

impl From<reqwest::Error> for StoreError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() || err.is_connect() {
            StoreError::Transient(err.to_string())
        } else {
            StoreError::Transport(err.to_string())
        }
    }
}
