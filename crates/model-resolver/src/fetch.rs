//! Fetching artifact bytes for `file://` and `s3://` references.
//!
//! The fetcher performs exactly one attempt. Retrying is left to the caller,
//! which can tell retriable failures apart via
//! [`ResolveError::is_transient`].

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use model_store::{ObjectStore, S3Location, StoreError};
use tokio::time::Instant;
use tracing::{debug, info};

use crate::error::{ResolveError, Result};
use crate::reference::ModelReference;

/// Reads model bytes from the filesystem or an object store.
#[derive(Clone)]
pub struct Fetcher {
    store: Arc<dyn ObjectStore>,
    timeout: Option<Duration>,
}

impl Fetcher {
    pub fn new(store: Arc<dyn ObjectStore>) -> Self {
        Self {
            store,
            timeout: None,
        }
    }

    /// Bound every fetch by `timeout`.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    /// Fetch the full artifact content for a `file` or `s3` reference.
    pub async fn fetch(&self, reference: &ModelReference) -> Result<Vec<u8>> {
        self.fetch_until(reference, None).await
    }

    /// Like [`fetch`](Self::fetch), but gives up at `deadline` (or at the
    /// configured timeout, whichever comes first) with a transient error.
    pub async fn fetch_until(
        &self,
        reference: &ModelReference,
        deadline: Option<Instant>,
    ) -> Result<Vec<u8>> {
        let deadline = match (deadline, self.timeout) {
            (Some(d), Some(t)) => Some(d.min(Instant::now() + t)),
            (Some(d), None) => Some(d),
            (None, Some(t)) => Some(Instant::now() + t),
            (None, None) => None,
        };

        let fetch = self.fetch_once(reference);
        match deadline {
            None => fetch.await,
            Some(at) => match tokio::time::timeout_at(at, fetch).await {
                Ok(result) => result,
                Err(_) => Err(ResolveError::TransientFetchError {
                    reference: reference.to_string(),
                    reason: "fetch deadline exceeded".to_string(),
                }),
            },
        }
    }

    async fn fetch_once(&self, reference: &ModelReference) -> Result<Vec<u8>> {
        match reference {
            ModelReference::File { path, .. } => read_file(reference, path).await,
            ModelReference::S3 { location, .. } => self.get_object(reference, location).await,
            ModelReference::LocalName { .. } => Err(ResolveError::InvalidReferenceFormat {
                reference: reference.to_string(),
                reason: "local model names are located, not fetched".to_string(),
            }),
        }
    }

    async fn get_object(&self, reference: &ModelReference, location: &S3Location) -> Result<Vec<u8>> {
        info!(%location, "loading model from object store");
        self.store
            .get_object(&location.bucket, &location.key)
            .await
            .map_err(|e| store_error(reference, e))
    }
}

async fn read_file(reference: &ModelReference, path: &Path) -> Result<Vec<u8>> {
    info!(path = %path.display(), "loading model from file");
    let bytes = tokio::fs::read(path)
        .await
        .map_err(|e| ResolveError::ArtifactUnreadable {
            reference: reference.to_string(),
            reason: format!("{}: {e}", path.display()),
        })?;
    debug!(path = %path.display(), size = bytes.len(), "read model file");
    Ok(bytes)
}

fn store_error(reference: &ModelReference, err: StoreError) -> ResolveError {
    if err.is_transient() {
        ResolveError::TransientFetchError {
            reference: reference.to_string(),
            reason: err.to_string(),
        }
    } else {
        ResolveError::ArtifactUnreadable {
            reference: reference.to_string(),
            reason: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::digest::Sha256Digest;
    use model_store::fakes::MemoryObjectStore;
    use tempfile::tempdir;

    fn slow_store() -> Arc<MemoryObjectStore> {
        Arc::new(
            MemoryObjectStore::new()
                .with_object("bucket", "slow.pkl", b"late".to_vec())
                .with_delay(Duration::from_secs(3600)),
        )
    }

    fn s3_ref(key: &str) -> ModelReference {
        ModelReference::S3 {
            location: S3Location::new("bucket", key),
            digest: Some(Sha256Digest::compute(b"x")),
        }
    }

    #[tokio::test]
    async fn test_fetch_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("m.pkl");
        std::fs::write(&path, b"model bytes").unwrap();
        let fetcher = Fetcher::new(Arc::new(MemoryObjectStore::new()));

        let reference = ModelReference::File { path, digest: None };
        assert_eq!(fetcher.fetch(&reference).await.unwrap(), b"model bytes");
    }

    #[tokio::test]
    async fn test_missing_file_is_unreadable() {
        let dir = tempdir().unwrap();
        let fetcher = Fetcher::new(Arc::new(MemoryObjectStore::new()));
        let reference = ModelReference::File {
            path: dir.path().join("absent.pkl"),
            digest: None,
        };

        let err = fetcher.fetch(&reference).await.unwrap_err();
        assert!(matches!(err, ResolveError::ArtifactUnreadable { .. }));
    }

    #[tokio::test]
    async fn test_fetch_s3_object() {
        let store = Arc::new(MemoryObjectStore::new().with_object("bucket", "m.pkl", b"s3".to_vec()));
        let fetcher = Fetcher::new(store.clone());

        assert_eq!(fetcher.fetch(&s3_ref("m.pkl")).await.unwrap(), b"s3");
        assert_eq!(store.call_count(), 1);
    }

    #[tokio::test]
    async fn test_store_errors_are_classified() {
        let store = Arc::new(MemoryObjectStore::new());
        store.fail_next("bucket", "m.pkl", StoreError::Transient("503".into()));
        let fetcher = Fetcher::new(store.clone());

        let first = fetcher.fetch(&s3_ref("m.pkl")).await.unwrap_err();
        assert!(first.is_transient());

        // queue drained: the object is simply absent
        let second = fetcher.fetch(&s3_ref("m.pkl")).await.unwrap_err();
        assert!(matches!(second, ResolveError::ArtifactUnreadable { .. }));
    }

    #[tokio::test]
    async fn test_access_denied_is_unreadable() {
        let store = Arc::new(MemoryObjectStore::new());
        store.fail_next(
            "bucket",
            "m.pkl",
            StoreError::AccessDenied {
                bucket: "bucket".into(),
                key: "m.pkl".into(),
            },
        );
        let fetcher = Fetcher::new(store);

        let err = fetcher.fetch(&s3_ref("m.pkl")).await.unwrap_err();
        assert!(matches!(err, ResolveError::ArtifactUnreadable { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_is_transient() {
        let fetcher = Fetcher::new(slow_store()).with_timeout(Duration::from_secs(5));

        let err = fetcher.fetch(&s3_ref("slow.pkl")).await.unwrap_err();
        assert!(err.is_transient());
    }

    #[tokio::test(start_paused = true)]
    async fn test_caller_deadline_is_honoured() {
        let fetcher = Fetcher::new(slow_store());
        let deadline = Instant::now() + Duration::from_millis(10);

        let err = fetcher
            .fetch_until(&s3_ref("slow.pkl"), Some(deadline))
            .await
            .unwrap_err();
        assert!(matches!(err, ResolveError::TransientFetchError { .. }));
    }

    #[tokio::test]
    async fn test_local_name_is_not_fetched() {
        let store = Arc::new(MemoryObjectStore::new());
        let fetcher = Fetcher::new(store.clone());
        let reference = ModelReference::LocalName {
            name: "veg".to_string(),
        };

        assert!(fetcher.fetch(&reference).await.is_err());
        assert_eq!(store.call_count(), 0);
    }
}
