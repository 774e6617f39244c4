//! SHA-256 integrity verification.
//!
//! A mismatch is always fatal for the model entry: there is no
//! warn-and-continue path.

use tracing::{debug, warn};

use crate::artifact::{ArtifactOrigin, VerifiedArtifact};
use crate::digest::Sha256Digest;
use crate::error::{ResolveError, Result};
use crate::reference::ModelReference;

/// Compare the SHA-256 of `bytes` with `expected`.
///
/// Returns the computed digest on mismatch.
pub fn check_digest(bytes: &[u8], expected: &Sha256Digest) -> std::result::Result<(), Sha256Digest> {
    let actual = Sha256Digest::compute(bytes);
    debug!(expected = %expected, actual = %actual, "comparing SHA-256 checksums");
    if actual == *expected {
        Ok(())
    } else {
        Err(actual)
    }
}

/// Verify fetched `bytes` against the digest carried by `source_ref`.
///
/// `source_ref` must carry a digest; references without one fail with
/// [`ResolveError::MissingDigest`].
pub fn verify(bytes: Vec<u8>, source_ref: ModelReference) -> Result<VerifiedArtifact> {
    let Some(expected) = source_ref.digest().copied() else {
        return Err(ResolveError::MissingDigest {
            reference: source_ref.to_string(),
        });
    };

    if let Err(actual) = check_digest(&bytes, &expected) {
        warn!(
            reference = %source_ref,
            expected = %expected,
            actual = %actual,
            "model has an incorrect SHA-256 checksum"
        );
        return Err(ResolveError::DigestMismatch {
            reference: source_ref.to_string(),
            expected,
            actual,
        });
    }

    let origin = match &source_ref {
        ModelReference::File { path, .. } => ArtifactOrigin::File(path.clone()),
        ModelReference::S3 { location, .. } => ArtifactOrigin::ObjectStore(location.clone()),
        ModelReference::LocalName { name } => ArtifactOrigin::ModelDir(name.into()),
    };
    debug!(reference = %source_ref, "checksum matches");
    Ok(VerifiedArtifact::verified(bytes, source_ref, expected, origin))
}
