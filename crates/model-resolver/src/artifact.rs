//! Resolved model artifacts.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use model_store::S3Location;
use serde::{Deserialize, Serialize};

use crate::digest::Sha256Digest;
use crate::reference::{ModelReference, Scheme};

/// Where the bytes of an artifact were read from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "at", rename_all = "snake_case")]
pub enum ArtifactOrigin {
    /// Trusted local model directory
    ModelDir(PathBuf),
    /// Explicit `file://` path
    File(PathBuf),
    /// Object store
    ObjectStore(S3Location),
    /// Content-addressed cache, keyed by digest
    Cache(Sha256Digest),
}

/// Raw model bytes and the reference they were resolved from.
///
/// Immutable once built. `verified` is true only when the bytes matched the
/// reference's digest; local-name artifacts are trusted by location and
/// carry `verified = false`.
#[derive(Debug, Clone)]
pub struct VerifiedArtifact {
    bytes: Vec<u8>,
    source_ref: ModelReference,
    reference: String,
    verified: bool,
    digest: Sha256Digest,
    origin: ArtifactOrigin,
    resolved_at: DateTime<Utc>,
}

impl VerifiedArtifact {
    /// Artifact whose bytes matched `digest`.
    pub(crate) fn verified(
        bytes: Vec<u8>,
        source_ref: ModelReference,
        digest: Sha256Digest,
        origin: ArtifactOrigin,
    ) -> Self {
        Self {
            reference: source_ref.to_string(),
            bytes,
            source_ref,
            verified: true,
            digest,
            origin,
            resolved_at: Utc::now(),
        }
    }

    /// Artifact read from the trusted model directory.
    pub(crate) fn trusted_local(bytes: Vec<u8>, source_ref: ModelReference, path: PathBuf) -> Self {
        Self {
            reference: source_ref.to_string(),
            digest: Sha256Digest::compute(&bytes),
            bytes,
            source_ref,
            verified: false,
            origin: ArtifactOrigin::ModelDir(path),
            resolved_at: Utc::now(),
        }
    }

    pub(crate) fn with_reference(mut self, reference: &str) -> Self {
        self.reference = reference.to_string();
        self
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Hand the bytes to the caller (typically a model deserializer).
    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }

    pub fn source_ref(&self) -> &ModelReference {
        &self.source_ref
    }

    /// The reference string as configured.
    pub fn reference(&self) -> &str {
        &self.reference
    }

    pub fn is_verified(&self) -> bool {
        self.verified
    }

    /// SHA-256 of the bytes.
    pub fn digest(&self) -> &Sha256Digest {
        &self.digest
    }

    pub fn origin(&self) -> &ArtifactOrigin {
        &self.origin
    }

    pub fn resolved_at(&self) -> DateTime<Utc> {
        self.resolved_at
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn summary(&self) -> ArtifactSummary {
        ArtifactSummary {
            reference: self.reference.clone(),
            scheme: self.source_ref.scheme(),
            digest: self.digest,
            size: self.bytes.len(),
            verified: self.verified,
            origin: self.origin.clone(),
            resolved_at: self.resolved_at,
        }
    }
}

/// Serializable description of an artifact, without its bytes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactSummary {
    pub reference: String,
    pub scheme: Scheme,
    pub digest: Sha256Digest,
    pub size: usize,
    pub verified: bool,
    pub origin: ArtifactOrigin,
    pub resolved_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trusted_local_is_not_verified() {
        let reference = ModelReference::LocalName {
            name: "veg".to_string(),
        };
        let artifact = VerifiedArtifact::trusted_local(
            b"weights".to_vec(),
            reference,
            PathBuf::from("models/veg.pkl"),
        );
        assert!(!artifact.is_verified());
        assert_eq!(artifact.digest(), &Sha256Digest::compute(b"weights"));
        assert_eq!(artifact.reference(), "veg");
        assert_eq!(
            artifact.origin(),
            &ArtifactOrigin::ModelDir(PathBuf::from("models/veg.pkl"))
        );
    }

    #[test]
    fn test_summary_serializes_without_bytes() {
        let digest = Sha256Digest::compute(b"weights");
        let reference = ModelReference::S3 {
            location: S3Location::new("bucket", "m.pkl"),
            digest: Some(digest),
        };
        let artifact = VerifiedArtifact::verified(
            b"weights".to_vec(),
            reference,
            digest,
            ArtifactOrigin::ObjectStore(S3Location::new("bucket", "m.pkl")),
        );

        let json = serde_json::to_value(artifact.summary()).unwrap();
        assert_eq!(json["scheme"], "s3");
        assert_eq!(json["size"], 7);
        assert_eq!(json["verified"], true);
        assert_eq!(json["digest"], digest.to_hex());
        assert_eq!(json["origin"]["kind"], "object_store");
        assert!(json.get("bytes").is_none());
    }

    #[test]
    fn test_into_bytes_transfers_ownership() {
        let reference = ModelReference::LocalName {
            name: "veg".to_string(),
        };
        let artifact =
            VerifiedArtifact::trusted_local(b"abc".to_vec(), reference, PathBuf::from("veg.pkl"));
        assert_eq!(artifact.len(), 3);
        assert_eq!(artifact.into_bytes(), b"abc".to_vec());
    }
}
