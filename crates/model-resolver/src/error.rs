//! Error taxonomy for model resolution.
//!
//! Every variant names the model entry by its configured reference string so
//! an operator can tell a typo from a retrained model from a network problem.

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::digest::Sha256Digest;

/// Model resolution errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ResolveError {
    #[error("invalid model reference {reference:?}: {reason}")]
    InvalidReferenceFormat { reference: String, reason: String },

    #[error("model {reference:?} not found in {}", .search_dir.display())]
    ModelNotFound {
        reference: String,
        search_dir: PathBuf,
    },

    #[error("model {reference:?} is unreadable: {reason}")]
    ArtifactUnreadable { reference: String, reason: String },

    #[error("transient failure fetching model {reference:?}: {reason}")]
    TransientFetchError { reference: String, reason: String },

    #[error("model {reference:?} has no SHA-256 digest; expected <uri>:<sha256>")]
    MissingDigest { reference: String },

    #[error("model {reference:?} failed integrity check: expected sha256 {expected}, got {actual}")]
    DigestMismatch {
        reference: String,
        expected: Sha256Digest,
        actual: Sha256Digest,
    },
}

/// Discriminant of [`ResolveError`], for reports and metrics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    InvalidReferenceFormat,
    ModelNotFound,
    ArtifactUnreadable,
    TransientFetchError,
    MissingDigest,
    DigestMismatch,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorKind::InvalidReferenceFormat => "invalid_reference_format",
            ErrorKind::ModelNotFound => "model_not_found",
            ErrorKind::ArtifactUnreadable => "artifact_unreadable",
            ErrorKind::TransientFetchError => "transient_fetch_error",
            ErrorKind::MissingDigest => "missing_digest",
            ErrorKind::DigestMismatch => "digest_mismatch",
        };
        f.write_str(s)
    }
}

impl ResolveError {
    /// The configured reference string of the failing entry.
    pub fn reference(&self) -> &str {
        match self {
            ResolveError::InvalidReferenceFormat { reference, .. }
            | ResolveError::ModelNotFound { reference, .. }
            | ResolveError::ArtifactUnreadable { reference, .. }
            | ResolveError::TransientFetchError { reference, .. }
            | ResolveError::MissingDigest { reference }
            | ResolveError::DigestMismatch { reference, .. } => reference,
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            ResolveError::InvalidReferenceFormat { .. } => ErrorKind::InvalidReferenceFormat,
            ResolveError::ModelNotFound { .. } => ErrorKind::ModelNotFound,
            ResolveError::ArtifactUnreadable { .. } => ErrorKind::ArtifactUnreadable,
            ResolveError::TransientFetchError { .. } => ErrorKind::TransientFetchError,
            ResolveError::MissingDigest { .. } => ErrorKind::MissingDigest,
            ResolveError::DigestMismatch { .. } => ErrorKind::DigestMismatch,
        }
    }

    /// Only transient fetch failures may be retried by a caller.
    pub fn is_transient(&self) -> bool {
        matches!(self, ResolveError::TransientFetchError { .. })
    }

    /// Re-label the error with the reference string as the operator wrote it.
    pub(crate) fn with_reference(mut self, text: &str) -> Self {
        match &mut self {
            ResolveError::InvalidReferenceFormat { reference, .. }
            | ResolveError::ModelNotFound { reference, .. }
            | ResolveError::ArtifactUnreadable { reference, .. }
            | ResolveError::TransientFetchError { reference, .. }
            | ResolveError::MissingDigest { reference }
            | ResolveError::DigestMismatch { reference, .. } => *reference = text.to_string(),
        }
        self
    }
}

/// Result type for model resolution.
pub type Result<T> = std::result::Result<T, ResolveError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_digest_mismatch_names_both_digests() {
        let expected = Sha256Digest::compute(b"expected");
        let actual = Sha256Digest::compute(b"actual");
        let err = ResolveError::DigestMismatch {
            reference: "file://m.pkl:abc".to_string(),
            expected,
            actual,
        };
        let msg = err.to_string();
        assert!(msg.contains(&expected.to_hex()));
        assert!(msg.contains(&actual.to_hex()));
        assert!(msg.contains("file://m.pkl:abc"));
    }

    #[test]
    fn test_model_not_found_names_search_dir() {
        let err = ResolveError::ModelNotFound {
            reference: "veg".to_string(),
            search_dir: PathBuf::from("models"),
        };
        assert_eq!(err.to_string(), "model \"veg\" not found in models");
        assert_eq!(err.reference(), "veg");
        assert_eq!(err.kind(), ErrorKind::ModelNotFound);
    }

    #[test]
    fn test_only_transient_fetch_is_transient() {
        let transient = ResolveError::TransientFetchError {
            reference: "s3://b/k".to_string(),
            reason: "503".to_string(),
        };
        let missing = ResolveError::MissingDigest {
            reference: "s3://b/k".to_string(),
        };
        assert!(transient.is_transient());
        assert!(!missing.is_transient());
    }

    #[test]
    fn test_error_kind_serializes_snake_case() {
        let json = serde_json::to_string(&ErrorKind::DigestMismatch).unwrap();
        assert_eq!(json, "\"digest_mismatch\"");
        assert_eq!(ErrorKind::DigestMismatch.to_string(), "digest_mismatch");
    }
}
