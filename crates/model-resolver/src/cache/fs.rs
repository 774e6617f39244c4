use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;

use super::{ArtifactCache, CacheError, Result};
use crate::digest::Sha256Digest;

/// Filesystem-backed artifact cache with git-style 2-char sharding.
///
/// Layout: `<root>/objects/<first 2 hex chars>/<remaining hex chars>`
pub struct FsArtifactCache {
    objects_dir: PathBuf,
}

impl FsArtifactCache {
    /// Open the cache rooted at `root`, creating `root/objects/` if needed.
    pub fn new(root: impl AsRef<Path>) -> Result<Self> {
        let objects_dir = root.as_ref().join("objects");
        fs::create_dir_all(&objects_dir)?;
        Ok(Self { objects_dir })
    }

    fn entry_path(&self, digest: &Sha256Digest) -> PathBuf {
        let hex = digest.to_hex();
        self.objects_dir.join(&hex[..2]).join(&hex[2..])
    }
}

impl ArtifactCache for FsArtifactCache {
    fn put(&self, data: &[u8]) -> Result<Sha256Digest> {
        let digest = Sha256Digest::compute(data);
        let path = self.entry_path(&digest);

        if path.exists() {
            return Ok(digest);
        }

        let shard_dir = self.objects_dir.join(&digest.to_hex()[..2]);
        fs::create_dir_all(&shard_dir)?;

        // Write to a temp file in the shard, then rename into place.
        let mut tmp = NamedTempFile::new_in(&shard_dir)?;
        tmp.write_all(data)?;
        tmp.persist(&path).map_err(|e| e.error)?;

        Ok(digest)
    }

    fn get(&self, digest: &Sha256Digest) -> Result<Vec<u8>> {
        let path = self.entry_path(digest);
        fs::read(&path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                CacheError::NotFound(*digest)
            } else {
                CacheError::Io(e)
            }
        })
    }

    fn contains(&self, digest: &Sha256Digest) -> Result<bool> {
        Ok(self.entry_path(digest).exists())
    }

    fn remove(&self, digest: &Sha256Digest) -> Result<()> {
        match fs::remove_file(self.entry_path(digest)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(CacheError::Io(e)),
        }
    }
}
