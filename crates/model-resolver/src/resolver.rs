//! Model resolution: parse → locate or fetch → verify.
//!
//! Each call is independent and owns its byte buffer until it returns, so a
//! single `ModelResolver` can be cloned into as many tasks as there are
//! model entries.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use model_store::ObjectStore;
use tokio::time::Instant;
use tracing::{debug, info, instrument, warn};

use crate::artifact::{ArtifactOrigin, VerifiedArtifact};
use crate::cache::{ArtifactCache, CacheError};
use crate::digest::Sha256Digest;
use crate::error::{ResolveError, Result};
use crate::fetch::Fetcher;
use crate::local::{find_local_with, DEFAULT_MODEL_DIR, MODEL_EXTENSIONS};
use crate::reference::ModelReference;
use crate::verify::{check_digest, verify};

/// Resolves model reference strings to verified artifacts.
#[derive(Clone)]
pub struct ModelResolver {
    fetcher: Fetcher,
    search_dir: PathBuf,
    extensions: Vec<String>,
    cache: Option<Arc<dyn ArtifactCache>>,
}

impl ModelResolver {
    /// Resolver fetching remote objects from `store`, searching `models/`
    /// for bare names.
    pub fn new(store: Arc<dyn ObjectStore>) -> Self {
        Self {
            fetcher: Fetcher::new(store),
            search_dir: PathBuf::from(DEFAULT_MODEL_DIR),
            extensions: MODEL_EXTENSIONS.iter().map(|e| e.to_string()).collect(),
            cache: None,
        }
    }

    pub fn with_search_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.search_dir = dir.into();
        self
    }

    /// Replace the registered model-file extensions (highest priority first).
    pub fn with_extensions<I, S>(mut self, extensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.extensions = extensions.into_iter().map(Into::into).collect();
        self
    }

    /// Keep verified object-store artifacts in `cache`.
    pub fn with_cache(mut self, cache: Arc<dyn ArtifactCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Bound every fetch by `timeout`.
    pub fn with_fetch_timeout(mut self, timeout: Duration) -> Self {
        self.fetcher = self.fetcher.with_timeout(timeout);
        self
    }

    pub fn search_dir(&self) -> &Path {
        &self.search_dir
    }

    pub fn extensions(&self) -> &[String] {
        &self.extensions
    }

    /// Resolve `text` against the configured search directory.
    pub async fn resolve(&self, text: &str) -> Result<VerifiedArtifact> {
        self.resolve_inner(text, &self.search_dir, None).await
    }

    /// Resolve `text`, looking up bare names in `search_dir`.
    pub async fn resolve_in(&self, text: &str, search_dir: &Path) -> Result<VerifiedArtifact> {
        self.resolve_inner(text, search_dir, None).await
    }

    /// Resolve `text`, giving up on any fetch still running at `deadline`.
    pub async fn resolve_until(&self, text: &str, deadline: Instant) -> Result<VerifiedArtifact> {
        self.resolve_inner(text, &self.search_dir, Some(deadline)).await
    }

    #[instrument(skip_all, fields(reference = %text))]
    async fn resolve_inner(
        &self,
        text: &str,
        search_dir: &Path,
        deadline: Option<Instant>,
    ) -> Result<VerifiedArtifact> {
        let reference = ModelReference::parse(text)?;
        let local_name = match &reference {
            ModelReference::LocalName { name } => Some(name.clone()),
            _ => None,
        };
        let resolved = match local_name {
            Some(name) => self.resolve_local(&name, search_dir, reference).await,
            None => self.resolve_remote(reference, deadline).await,
        };

        match resolved {
            Ok(artifact) => {
                info!(
                    digest = %artifact.digest().short(),
                    size = artifact.len(),
                    verified = artifact.is_verified(),
                    "model resolved"
                );
                Ok(artifact.with_reference(text))
            }
            Err(err) => Err(err.with_reference(text)),
        }
    }

    async fn resolve_local(
        &self,
        name: &str,
        search_dir: &Path,
        reference: ModelReference,
    ) -> Result<VerifiedArtifact> {
        let path = find_local_with(name, search_dir, &self.extensions).await?;
        let bytes = tokio::fs::read(&path)
            .await
            .map_err(|e| ResolveError::ArtifactUnreadable {
                reference: name.to_string(),
                reason: format!("{}: {e}", path.display()),
            })?;
        debug!(path = %path.display(), "trusting model from local model directory");
        Ok(VerifiedArtifact::trusted_local(bytes, reference, path))
    }

    async fn resolve_remote(
        &self,
        reference: ModelReference,
        deadline: Option<Instant>,
    ) -> Result<VerifiedArtifact> {
        // Checked before any I/O: an unverifiable reference is never fetched.
        let expected = *reference
            .digest()
            .ok_or_else(|| ResolveError::MissingDigest {
                reference: reference.to_string(),
            })?;

        let cacheable = matches!(reference, ModelReference::S3 { .. });
        if cacheable {
            if let Some(bytes) = self.cached(&expected) {
                info!(digest = %expected.short(), "model served from cache");
                return Ok(VerifiedArtifact::verified(
                    bytes,
                    reference,
                    expected,
                    ArtifactOrigin::Cache(expected),
                ));
            }
        }

        let bytes = self.fetcher.fetch_until(&reference, deadline).await?;
        let artifact = verify(bytes, reference)?;

        if cacheable {
            if let Some(cache) = &self.cache {
                if let Err(e) = cache.put(artifact.bytes()) {
                    warn!(digest = %expected.short(), error = %e, "failed to cache model");
                }
            }
        }
        Ok(artifact)
    }

    /// Cached bytes for `digest`, re-verified. Corrupt entries are evicted.
    fn cached(&self, digest: &Sha256Digest) -> Option<Vec<u8>> {
        let cache = self.cache.as_ref()?;
        match cache.get(digest) {
            Ok(bytes) => match check_digest(&bytes, digest) {
                Ok(()) => Some(bytes),
                Err(actual) => {
                    warn!(
                        expected = %digest,
                        actual = %actual,
                        "cached model is corrupt, evicting"
                    );
                    if let Err(e) = cache.remove(digest) {
                        warn!(error = %e, "failed to evict corrupt cache entry");
                    }
                    None
                }
            },
            Err(CacheError::NotFound(_)) => {
                debug!(digest = %digest.short(), "cache miss");
                None
            }
            Err(e) => {
                warn!(error = %e, "cache read failed");
                None
            }
        }
    }
}
