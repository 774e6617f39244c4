//! Lookup of bare model names in the local model directory.
//!
//! The operator's own model directory is trusted: no digest is checked for
//! models found here.

use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::{ResolveError, Result};

/// Default directory searched for bare model names.
pub const DEFAULT_MODEL_DIR: &str = "models";

/// Registered model-file extensions, highest priority first.
pub const MODEL_EXTENSIONS: &[&str] = &["pkl", "joblib", "onnx", "pt", "safetensors", "bin", "py"];

/// Find `name` in `search_dir` using the registered extensions.
pub async fn find_local(name: &str, search_dir: &Path) -> Result<PathBuf> {
    find_local_with(name, search_dir, MODEL_EXTENSIONS).await
}

/// Find the regular file in `search_dir` whose stem is exactly `name` and
/// whose extension is in `extensions`. When several files match, the one
/// whose extension comes first in `extensions` wins. The scan is not
/// recursive.
pub async fn find_local_with<S: AsRef<str>>(
    name: &str,
    search_dir: &Path,
    extensions: &[S],
) -> Result<PathBuf> {
    let not_found = || ResolveError::ModelNotFound {
        reference: name.to_string(),
        search_dir: search_dir.to_path_buf(),
    };
    let unreadable = |e: std::io::Error| ResolveError::ArtifactUnreadable {
        reference: name.to_string(),
        reason: format!("cannot scan {}: {e}", search_dir.display()),
    };

    let mut entries = match tokio::fs::read_dir(search_dir).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            debug!(dir = %search_dir.display(), "model directory does not exist");
            return Err(not_found());
        }
        Err(e) => return Err(unreadable(e)),
    };

    let mut best: Option<(usize, PathBuf)> = None;
    while let Some(entry) = entries.next_entry().await.map_err(unreadable)? {
        let path = entry.path();
        if path.file_stem().and_then(|s| s.to_str()) != Some(name) {
            continue;
        }
        let Some(rank) = path
            .extension()
            .and_then(|e| e.to_str())
            .and_then(|ext| extensions.iter().position(|known| known.as_ref() == ext))
        else {
            continue;
        };
        // Follows symlinks so a linked model file still counts.
        let is_file = tokio::fs::metadata(&path)
            .await
            .map(|m| m.is_file())
            .unwrap_or(false);
        if !is_file {
            continue;
        }
        if best.as_ref().map_or(true, |(r, _)| rank < *r) {
            best = Some((rank, path));
        }
    }

    match best {
        Some((_, path)) => {
            debug!(name, path = %path.display(), "found local model");
            Ok(path)
        }
        None => Err(not_found()),
    }
}
