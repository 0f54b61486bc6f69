//! The local filesystem backend (`storage == "file"`, §4.1/§4.4).
//!
//! The only backend that supports `watch` in practice — every other
//! backend either has no meaningful "external change" notion or would
//! require a remote subscription the engine doesn't otherwise need.
//! `stat`'s rev is a cheap `mtime:len` fingerprint rather than a content
//! hash: good enough to detect "something touched this file since we last
//! looked" without reading the whole thing on every poll.

use crate::backend::{StorageBackend, StoreOpts, WatchCallback, WatchHandle};
use async_trait::async_trait;
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use pvsync_core::error::{SyncError, SyncResult};
use pvsync_core::types::{Rev, SaveOutcome, Stat};
use std::path::{Path, PathBuf};

/// Local filesystem storage backend, rooted at an optional base directory
/// used only by [`get_path_for_name`](StorageBackend::get_path_for_name).
pub struct LocalBackend {
    root: Option<PathBuf>,
}

impl LocalBackend {
    pub fn new() -> Self {
        LocalBackend { root: None }
    }

    pub fn rooted_at(root: impl Into<PathBuf>) -> Self {
        LocalBackend {
            root: Some(root.into()),
        }
    }

    async fn fingerprint(path: &Path) -> SyncResult<Rev> {
        let meta = tokio::fs::metadata(path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                SyncError::NotFound(path.display().to_string())
            } else {
                SyncError::StorageStat(format!("{}: {e}", path.display()))
            }
        })?;
        let mtime = meta
            .modified()
            .ok()
            .and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
            .map(|d| d.as_nanos())
            .unwrap_or(0);
        Ok(format!("{mtime}:{}", meta.len()))
    }
}

impl Default for LocalBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl StorageBackend for LocalBackend {
    fn tag(&self) -> &str {
        "file"
    }

    async fn load(&self, path: &str, _opts: &StoreOpts) -> SyncResult<(Vec<u8>, Stat)> {
        let path = Path::new(path);
        let bytes = tokio::fs::read(path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                SyncError::NotFound(path.display().to_string())
            } else {
                SyncError::StorageLoad(format!("{}: {e}", path.display()))
            }
        })?;
        let rev = Self::fingerprint(path).await.ok();
        Ok((bytes, Stat { rev }))
    }

    async fn save(
        &self,
        path: &str,
        _opts: &StoreOpts,
        bytes: Vec<u8>,
        expected_rev: Option<&Rev>,
    ) -> SyncResult<SaveOutcome> {
        let path = Path::new(path);
        if let Some(expected) = expected_rev {
            if let Ok(current) = Self::fingerprint(path).await {
                if &current != expected {
                    return Err(SyncError::RevConflict);
                }
            }
        }

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| SyncError::StorageSave(format!("creating {}: {e}", parent.display())))?;
        }
        let tmp_path = path.with_extension("pvsync-tmp");
        tokio::fs::write(&tmp_path, &bytes)
            .await
            .map_err(|e| SyncError::StorageSave(format!("writing {}: {e}", tmp_path.display())))?;
        tokio::fs::rename(&tmp_path, path)
            .await
            .map_err(|e| SyncError::StorageSave(format!("renaming to {}: {e}", path.display())))?;

        let rev = Self::fingerprint(path).await.ok();
        Ok(SaveOutcome {
            rev,
            path: Some(path.display().to_string()),
        })
    }

    async fn stat(&self, path: &str, _opts: &StoreOpts) -> SyncResult<Stat> {
        let rev = Self::fingerprint(Path::new(path)).await?;
        Ok(Stat { rev: Some(rev) })
    }

    fn get_path_for_name(&self, name: &str) -> Option<String> {
        let root = self.root.as_ref()?;
        Some(root.join(name).display().to_string())
    }

    fn supports_watch(&self) -> bool {
        true
    }

    fn watch(&self, path: &str, _opts: &StoreOpts, on_change: WatchCallback) -> SyncResult<WatchHandle> {
        let watched_path = PathBuf::from(path);
        let mut watcher: RecommendedWatcher =
            notify::recommended_watcher(move |res: notify::Result<Event>| match res {
                Ok(event) if matches!(event.kind, EventKind::Modify(_) | EventKind::Create(_)) => {
                    on_change();
                }
                Ok(_) => {}
                Err(e) => tracing::warn!(path = %watched_path.display(), error = %e, "watch error"),
            })
            .map_err(|e| SyncError::Other(anyhow::anyhow!("creating watcher: {e}")))?;

        watcher
            .watch(Path::new(path), RecursiveMode::NonRecursive)
            .map_err(|e| SyncError::Other(anyhow::anyhow!("watching {path}: {e}")))?;

        // Keep the watcher alive inside the handle; dropping it inside
        // `stop` is what actually tears down the OS-level subscription.
        Ok(WatchHandle::new(move || drop(watcher)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use tokio::time::{sleep, Duration};

    #[tokio::test]
    async fn save_then_load_roundtrips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("db.kdbx");
        let backend = LocalBackend::new();
        let outcome = backend
            .save(path.to_str().unwrap(), &StoreOpts::Null, b"hello".to_vec(), None)
            .await
            .unwrap();
        assert!(outcome.rev.is_some());

        let (bytes, stat) = backend.load(path.to_str().unwrap(), &StoreOpts::Null).await.unwrap();
        assert_eq!(bytes, b"hello");
        assert_eq!(stat.rev, outcome.rev);
    }

    #[tokio::test]
    async fn load_missing_file_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing.kdbx");
        let backend = LocalBackend::new();
        let err = backend
            .load(path.to_str().unwrap(), &StoreOpts::Null)
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn save_with_stale_expected_rev_conflicts() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("db.kdbx");
        let backend = LocalBackend::new();
        backend
            .save(path.to_str().unwrap(), &StoreOpts::Null, b"v1".to_vec(), None)
            .await
            .unwrap();
        let stale_rev = "0:0".to_string();
        let err = backend
            .save(path.to_str().unwrap(), &StoreOpts::Null, b"v2".to_vec(), Some(&stale_rev))
            .await
            .unwrap_err();
        assert!(err.is_rev_conflict());
    }

    #[tokio::test]
    async fn watch_fires_on_modify() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("db.kdbx");
        std::fs::write(&path, b"initial").unwrap();

        let backend = LocalBackend::new();
        let fired = Arc::new(AtomicUsize::new(0));
        let counter = fired.clone();
        let handle = backend
            .watch(path.to_str().unwrap(), &StoreOpts::Null, Arc::new(move || {
                counter.fetch_add(1, Ordering::SeqCst);
            }))
            .unwrap();

        sleep(Duration::from_millis(100)).await;
        std::fs::write(&path, b"changed").unwrap();
        sleep(Duration::from_millis(300)).await;

        assert!(fired.load(Ordering::SeqCst) >= 1);
        handle.unwatch();
    }
}
