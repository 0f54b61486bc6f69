//! The Sync State Machine (§4.5/C5) — the core of the engine.
//!
//! `sync(file, options?)` reconciles a [`File`] against its backend and
//! cache by rev comparison, remote-load-and-merge, and conflict retry. The
//! branches below follow §4.5's diagram top to bottom: local-only files
//! take the short path; remote-backed files run `stat → decide →
//! (load+merge)* → save`, bounded by `max_load_attempts`.

use crate::Engine;
use pvsync_core::error::{SyncError, SyncResult};
use pvsync_file::File;
use pvsync_registry::FileInfo;
use tracing::{debug, warn};

/// Per-call overrides to the file's own storage/path/opts — used for
/// "save as" to a new backend — plus an optional remote key for merge
/// (§4.5's invocation signature).
#[derive(Debug, Clone, Default)]
pub struct SyncOptions {
    pub storage: Option<String>,
    pub path: Option<String>,
    pub opts: Option<serde_json::Value>,
    pub remote_key: Option<String>,
}

/// What happened, for callers that want more than "it worked" (tests,
/// diagnostics). The sync's actual effect is already reflected in `file`
/// and the registry by the time this is returned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncOutcome {
    /// Local-only no-op: unmodified and already bound to this cache id.
    NoOp,
    /// Local-only file was serialized and written to the cache.
    SavedToCache,
    /// `stat` agreed with the last-known rev and nothing was modified.
    Clean,
    /// Remote bytes were loaded and merged in; no save followed.
    Merged,
    /// Local edits (or a post-merge dirty cache) were pushed to the
    /// backend, possibly after one or more merge retries.
    SavedToStorage { attempts: u32 },
}

impl Engine {
    /// `sync(file, options?)` (§4.5). Returns the caller-visible
    /// `(err)`/outcome; the completion contract (§4.5's numbered steps 1-5)
    /// always runs before this returns, success or failure.
    pub async fn sync(
        &self,
        file: &mut dyn File,
        options: Option<SyncOptions>,
    ) -> SyncResult<SyncOutcome> {
        if file.is_demo() {
            return Ok(SyncOutcome::NoOp);
        }
        if file.syncing() {
            return Err(SyncError::SyncInProgress);
        }

        let options = options.unwrap_or_default();
        let storage = options.storage.clone().or_else(|| {
            (!file.storage().is_empty()).then(|| file.storage().to_string())
        });
        let switching_backend = options
            .storage
            .as_deref()
            .is_some_and(|s| s != file.storage());

        let mut path = options.path.clone().unwrap_or_else(|| file.path().to_string());
        let opts = options
            .opts
            .clone()
            .unwrap_or_else(|| file.opts().clone());

        if let Some(tag) = storage.as_deref() {
            if (switching_backend || path.is_empty()) && !tag.is_empty() {
                if let Some(backend) = self.backends.resolve(tag) {
                    if let Some(computed) = backend.get_path_for_name(file_name_hint(file)) {
                        path = computed;
                    }
                }
            }
        }

        let mut file_info = self.resolve_or_create_file_info(file, storage.as_deref(), &path, &opts).await;
        file.set_sync_progress();

        let (result, saved_to_cache) = match storage.as_deref() {
            None | Some("") => self.sync_local_only(file, &file_info).await,
            Some(tag) => {
                self.sync_remote(file, &mut file_info, tag, &path, &opts, options.remote_key.as_deref())
                    .await
            }
        };

        if let Err(e) = &result {
            warn!(file = %file_info.id, error = %e, "sync failed");
        } else {
            debug!(file = %file_info.id, outcome = ?result, "sync finished");
        }
        let err = result.as_ref().err().map(|e| e.to_string());

        self.complete_sync(file, &mut file_info, path, storage, err, saved_to_cache)
            .await?;

        result
    }

    async fn resolve_or_create_file_info(
        &self,
        file: &dyn File,
        storage: Option<&str>,
        path: &str,
        opts: &serde_json::Value,
    ) -> FileInfo {
        let registry = self.registry.lock().await;
        registry
            .get(file.cache_id())
            .cloned()
            .unwrap_or_else(|| FileInfo {
                id: file.cache_id(),
                name: String::new(),
                storage: storage.unwrap_or_default().to_string(),
                path: path.to_string(),
                opts: opts.clone(),
                rev: file.rev(),
                modified: file.modified(),
                edit_state: file.get_local_edit_state(),
                sync_date: file.sync_date(),
                open_date: None,
                key_file_name: None,
                key_file_hash: file.get_key_file_hash(),
            })
    }

    /// Local-only branch (§4.5): no-op if already unmodified and bound to
    /// this cache id, otherwise serialize and write straight to the cache.
    async fn sync_local_only(
        &self,
        file: &mut dyn File,
        file_info: &FileInfo,
    ) -> (SyncResult<SyncOutcome>, bool) {
        if !file.modified() && file_info.id == file.cache_id() {
            return (Ok(SyncOutcome::NoOp), false);
        }

        let data = match file.get_data().await {
            Ok(data) => data,
            Err(e) => return (Err(e), false),
        };
        match self.backends.cache().save(file_info.id, &data).await {
            Ok(()) => (Ok(SyncOutcome::SavedToCache), true),
            Err(e) => (Err(e), false),
        }
    }

    /// Remote-backed branch (§4.5): `stat` → decide → `load+merge` or
    /// `save`, with the retry loop bounded by `max_load_attempts`.
    async fn sync_remote(
        &self,
        file: &mut dyn File,
        file_info: &mut FileInfo,
        storage: &str,
        path: &str,
        opts: &serde_json::Value,
        remote_key: Option<&str>,
    ) -> (SyncResult<SyncOutcome>, bool) {
        let backend = match self.backends.require(storage) {
            Ok(backend) => backend,
            Err(e) => return (Err(e), false),
        };

        match backend.stat(path, opts).await {
            Err(e) if e.is_not_found() => {
                self.save_to_cache_and_storage(file, file_info, backend.as_ref(), path, opts, 0)
                    .await
            }
            Err(e) => {
                let mut saved_to_cache = false;
                if file.dirty() {
                    if let Ok(data) = file.get_data().await {
                        saved_to_cache = self.backends.cache().save(file_info.id, &data).await.is_ok();
                    }
                }
                (Err(e), saved_to_cache)
            }
            Ok(stat) if stat.rev == file_info.rev && file.modified() => {
                self.save_to_cache_and_storage(file, file_info, backend.as_ref(), path, opts, 0)
                    .await
            }
            Ok(stat) if stat.rev == file_info.rev => (Ok(SyncOutcome::Clean), false),
            Ok(_) => {
                self.load_and_merge(file, file_info, backend.as_ref(), path, opts, remote_key, 0)
                    .await
            }
        }
    }

    /// `LoadAndMerge`, bounded at `max_load_attempts` (§4.5; §8 invariant
    /// 4). `attempt` counts prior attempts so a rev-conflict retry from
    /// `save_to_storage` increments rather than resets it.
    #[async_recursion::async_recursion]
    async fn load_and_merge(
        &self,
        file: &mut dyn File,
        file_info: &mut FileInfo,
        backend: &(dyn pvsync_storage::StorageBackend + '_),
        path: &str,
        opts: &serde_json::Value,
        remote_key: Option<&str>,
        attempt: u32,
    ) -> (SyncResult<SyncOutcome>, bool) {
        if attempt >= self.max_load_attempts {
            warn!(file = %file_info.id, attempt, max = self.max_load_attempts, "giving up after too many load attempts");
            return (Err(SyncError::TooManyLoadAttempts), false);
        }

        let (data, stat) = match backend.load(path, opts).await {
            Ok(v) => v,
            Err(e) => return (Err(e), false),
        };

        if let Err(e) = file.merge_or_update(&data, remote_key).await {
            if e.is_invalid_key() {
                self.ports.emit_remote_key_changed(file.cache_id());
            }
            return (Err(e), false);
        }

        self.ports.emit_refresh();

        file_info.rev = stat.rev.clone();
        file.set_rev(stat.rev);

        if file.modified() {
            self.save_to_cache_and_storage(file, file_info, backend, path, opts, attempt)
                .await
        } else if file.dirty() {
            match file.get_data().await {
                Ok(bytes) => match self.backends.cache().save(file_info.id, &bytes).await {
                    Ok(()) => (Ok(SyncOutcome::Merged), true),
                    Err(e) => (Err(e), false),
                },
                Err(e) => (Err(e), false),
            }
        } else {
            (Ok(SyncOutcome::Merged), false)
        }
    }

    /// `SaveToCacheAndStorage` (§4.5): write the cache only when `dirty`
    /// (it may already be current), then push to the backend.
    #[async_recursion::async_recursion]
    async fn save_to_cache_and_storage(
        &self,
        file: &mut dyn File,
        file_info: &mut FileInfo,
        backend: &(dyn pvsync_storage::StorageBackend + '_),
        path: &str,
        opts: &serde_json::Value,
        attempt: u32,
    ) -> (SyncResult<SyncOutcome>, bool) {
        let data = match file.get_data().await {
            Ok(data) => data,
            Err(e) => return (Err(e), false),
        };
        let mut saved_to_cache = false;

        if file.dirty() {
            if let Err(e) = self.backends.cache().save(file_info.id, &data).await {
                return (Err(e), false);
            }
            saved_to_cache = true;
        }

        self.save_to_storage(file, file_info, backend, path, opts, data, attempt, saved_to_cache)
            .await
    }

    /// `SaveToStorage` (§4.5): a `revConflict` re-enters `load_and_merge`,
    /// incrementing the attempt counter rather than resetting it.
    async fn save_to_storage(
        &self,
        file: &mut dyn File,
        file_info: &mut FileInfo,
        backend: &(dyn pvsync_storage::StorageBackend + '_),
        path: &str,
        opts: &serde_json::Value,
        data: Vec<u8>,
        attempt: u32,
        saved_to_cache: bool,
    ) -> (SyncResult<SyncOutcome>, bool) {
        match backend.save(path, opts, data, file_info.rev.as_ref()).await {
            Err(e) if e.is_rev_conflict() => {
                debug!(file = %file_info.id, attempt, "rev conflict on save, retrying load+merge");
                let (outcome, merged_saved) = self
                    .load_and_merge(file, file_info, backend, path, opts, None, attempt + 1)
                    .await;
                (outcome, merged_saved || saved_to_cache)
            }
            Err(e) => (Err(e), saved_to_cache),
            Ok(outcome) => {
                file_info.rev = outcome.rev.clone();
                file.set_rev(outcome.rev);
                if let Some(new_path) = outcome.path {
                    file.set_path(new_path.clone());
                    file_info.path = new_path;
                }
                (Ok(SyncOutcome::SavedToStorage { attempts: attempt + 1 }), saved_to_cache)
            }
        }
    }

    /// The completion contract (§4.5's numbered steps): clear `syncing`,
    /// copy terminal state into the FileInfo, upsert + persist the
    /// registry, then return `err` to the caller.
    async fn complete_sync(
        &self,
        file: &mut dyn File,
        file_info: &mut FileInfo,
        path: String,
        storage: Option<String>,
        err: Option<String>,
        saved_to_cache: bool,
    ) -> SyncResult<()> {
        file.set_sync_complete(
            Some(path.clone()),
            storage.clone(),
            err.clone(),
            saved_to_cache || err.is_none(),
        );
        file.set_cache_id(file_info.id);

        file_info.storage = storage.unwrap_or_default();
        file_info.path = path;
        file_info.opts = file.opts().clone();
        file_info.modified = file.modified();
        file_info.edit_state = file.get_local_edit_state();
        file_info.sync_date = file.sync_date();
        file_info.key_file_hash = file.get_key_file_hash();
        if file_info.rev.is_none() {
            file_info.rev = file.rev();
        }

        let mut registry = self.registry.lock().await;
        registry.unshift(file_info.clone());
        registry.save()
    }
}

fn file_name_hint(file: &dyn File) -> &str {
    file.path().rsplit('/').next().unwrap_or(file.path())
}
