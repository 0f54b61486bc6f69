//! The always-present content-addressed cache backend (§3, §4.1).
//!
//! Keyed by [`FileId`], never the remote path or name — a FileInfo's `id`
//! doubles as its cache key. Unlike a real backend, the cache can never
//! fail with a rev conflict; its only failure mode is local I/O.

use pvsync_core::error::{SyncError, SyncResult};
use pvsync_core::types::FileId;
use std::path::{Path, PathBuf};

/// On-disk, content-addressed cache of the most recently written serialized
/// bytes per file id. One file per entry, written atomically (temp file +
/// rename) so a crash mid-write never leaves a torn cache entry.
pub struct CacheBackend {
    dir: PathBuf,
}

impl CacheBackend {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        CacheBackend { dir: dir.into() }
    }

    fn entry_path(&self, id: FileId) -> PathBuf {
        self.dir.join(id.to_string())
    }

    /// Load the most recently cached bytes for `id`. Returns
    /// [`SyncError::NotFound`] if nothing has ever been cached under it.
    pub async fn load(&self, id: FileId) -> SyncResult<Vec<u8>> {
        let path = self.entry_path(id);
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(SyncError::NotFound(format!("cache entry {id}")))
            }
            Err(e) => Err(SyncError::Cache(format!(
                "reading cache entry {id}: {e}"
            ))),
        }
    }

    /// Persist `bytes` as the latest cached content for `id`, replacing
    /// whatever was there before.
    pub async fn save(&self, id: FileId, bytes: &[u8]) -> SyncResult<()> {
        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| SyncError::Cache(format!("creating cache dir: {e}")))?;

        let final_path = self.entry_path(id);
        let tmp_path = self.dir.join(format!("{id}.tmp"));
        tokio::fs::write(&tmp_path, bytes)
            .await
            .map_err(|e| SyncError::Cache(format!("writing cache entry {id}: {e}")))?;
        tokio::fs::rename(&tmp_path, &final_path)
            .await
            .map_err(|e| SyncError::Cache(format!("renaming cache entry {id}: {e}")))?;
        Ok(())
    }

    /// Drop the cache entry for `id`, if any. Not finding one is not an
    /// error — removal is idempotent.
    pub async fn remove(&self, id: FileId) -> SyncResult<()> {
        match tokio::fs::remove_file(self.entry_path(id)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(SyncError::Cache(format!(
                "removing cache entry {id}: {e}"
            ))),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[tokio::test]
    async fn load_missing_entry_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let cache = CacheBackend::new(dir.path());
        let err = cache.load(Uuid::new_v4()).await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn save_then_load_roundtrips() {
        let dir = tempfile::tempdir().unwrap();
        let cache = CacheBackend::new(dir.path());
        let id = Uuid::new_v4();
        cache.save(id, b"hello").await.unwrap();
        let loaded = cache.load(id).await.unwrap();
        assert_eq!(loaded, b"hello");
    }

    #[tokio::test]
    async fn save_overwrites_previous_content() {
        let dir = tempfile::tempdir().unwrap();
        let cache = CacheBackend::new(dir.path());
        let id = Uuid::new_v4();
        cache.save(id, b"first").await.unwrap();
        cache.save(id, b"second").await.unwrap();
        assert_eq!(cache.load(id).await.unwrap(), b"second");
    }

    #[tokio::test]
    async fn remove_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let cache = CacheBackend::new(dir.path());
        let id = Uuid::new_v4();
        cache.remove(id).await.unwrap();
        cache.save(id, b"x").await.unwrap();
        cache.remove(id).await.unwrap();
        assert!(cache.load(id).await.unwrap_err().is_not_found());
        cache.remove(id).await.unwrap();
    }
}
