//! The Open Orchestrator (§4.4/C4).
//!
//! Decides, per open request, which source the file is loaded from: the
//! content-addressed cache, caller-supplied bytes, a backend, or a
//! backend-then-cache fallback. The clauses below are transcribed in the
//! same top-to-bottom "first matching clause wins" order as §4.4 — each
//! `if`/`else if` arm is tagged with its clause number so the algorithm
//! stays traceable against the original decision table.

use crate::Engine;
use pvsync_core::error::{SyncError, SyncResult};
use pvsync_core::types::{FileId, Rev};
use pvsync_file::File;
use pvsync_registry::FileInfo;
use tracing::debug;
use uuid::Uuid;

pub struct OpenRequest {
    pub id: Option<FileId>,
    pub storage: Option<String>,
    pub name: String,
    pub path: Option<String>,
    pub opts: Option<serde_json::Value>,
    pub rev: Option<Rev>,
    pub password: String,
    pub key_file_data: Option<Vec<u8>>,
    pub file_data: Option<Vec<u8>>,
}

/// Result of a successful open (§4.4's post-open actions). The caller
/// (the Application Controller, C6) is responsible for actually
/// registering the file in the open-set, scheduling the deferred sync,
/// and wiring up the debounced watcher — the orchestrator only tells it
/// to.
pub struct OpenedFile {
    pub file: Box<dyn File>,
    pub file_info: FileInfo,
    /// Clauses 2 and 7: schedule `sync(file)` asynchronously after this
    /// call returns, rather than inline.
    pub schedule_sync: bool,
    /// Post-open actions: begin watching `path` with `FileChangeSync` ms
    /// debounce iff `storage == "file"`.
    pub begin_watch: bool,
}

impl Engine {
    /// Open a file per §4.4. `is_open` lets the caller's open-set (owned
    /// by the Application Controller, C6) answer the duplicate-id check
    /// without the engine needing to hold that set itself.
    pub async fn open(
        &self,
        request: OpenRequest,
        is_open: impl Fn(FileId) -> bool,
    ) -> SyncResult<OpenedFile> {
        let (file_info, opts) = self.resolve_file_info(&request).await;
        let storage = request.storage.clone();

        let (file, schedule_sync) = if let Some(fi) = file_info.as_ref().filter(|fi| fi.modified) {
            // Clause 2: modified cache path.
            let bytes = self.backends.cache().load(fi.id).await?;
            (self.open_bytes(&request, &bytes).await?, true)
        } else if let Some(data) = request.file_data.as_ref() {
            // Clause 3: supplied bytes.
            let file = self.open_bytes(&request, data).await?;
            let cache_id = file_info.as_ref().map(|fi| fi.id).unwrap_or_else(|| file.id());
            if let Err(e) = self.backends.cache().save(cache_id, data).await {
                tracing::warn!(error = %e, "failed to update cache after supplied-bytes open");
            }
            (file, false)
        } else if storage.is_none() {
            // Clause 4: local-only.
            let fi = file_info
                .as_ref()
                .ok_or_else(|| SyncError::NotFound(request.name.clone()))?;
            let bytes = self.backends.cache().load(fi.id).await?;
            (self.open_bytes(&request, &bytes).await?, false)
        } else if let Some(fi) = file_info
            .as_ref()
            .filter(|fi| fi.storage != "file" && fi.rev.is_some() && fi.rev == request.rev)
        {
            // Clause 5: fresh cache — skip stat/download entirely.
            let bytes = self.backends.cache().load(fi.id).await?;
            (self.open_bytes(&request, &bytes).await?, false)
        } else if file_info.is_none() || storage.as_deref() == Some("file") {
            // Clause 6: first-time open, or `storage == "file"` (no cached
            // rev can ever be trusted for the local backend).
            self.open_clause_six(&request, file_info.as_ref(), &opts).await?
        } else {
            // Clause 7: cached but possibly stale.
            let fi = file_info.as_ref().expect("checked above");
            let bytes = self.backends.cache().load(fi.id).await?;
            (self.open_bytes(&request, &bytes).await?, true)
        };

        if is_open(file.id()) {
            return Err(SyncError::DuplicateFileId(file.id().to_string()));
        }

        debug!(file = %file.id(), schedule_sync, "open resolved");
        self.finish_open(request, file_info, opts, file, schedule_sync).await
    }

    async fn open_clause_six(
        &self,
        request: &OpenRequest,
        file_info: Option<&FileInfo>,
        opts: &serde_json::Value,
    ) -> SyncResult<(Box<dyn File>, bool)> {
        let storage = request
            .storage
            .as_deref()
            .ok_or_else(|| SyncError::NotFound(request.name.clone()))?;
        let backend = self.backends.require(storage)?;
        let path = request
            .path
            .clone()
            .or_else(|| backend.get_path_for_name(&request.name))
            .ok_or_else(|| SyncError::NotFound(request.name.clone()))?;

        let cached_rev = file_info.and_then(|fi| fi.rev.clone());

        if let (Some(rev), true) = (cached_rev, backend.supports_stat()) {
            match backend.stat(&path, opts).await {
                Err(_) => return self.fallback_to_cache(request, file_info).await,
                Ok(stat) if stat.rev.as_ref() == Some(&rev) => {
                    return self.fallback_to_cache(request, file_info).await
                }
                Ok(_) => {}
            }
        }

        match backend.load(&path, opts).await {
            Ok((bytes, _stat)) => Ok((self.open_bytes(request, &bytes).await?, false)),
            Err(_) if file_info.is_some() => self.fallback_to_cache(request, file_info).await,
            Err(e) => Err(e),
        }
    }

    async fn fallback_to_cache(
        &self,
        request: &OpenRequest,
        file_info: Option<&FileInfo>,
    ) -> SyncResult<(Box<dyn File>, bool)> {
        let fi = file_info.ok_or_else(|| SyncError::NotFound(request.name.clone()))?;
        let bytes = self.backends.cache().load(fi.id).await?;
        Ok((self.open_bytes(request, &bytes).await?, false))
    }

    async fn open_bytes(&self, request: &OpenRequest, bytes: &[u8]) -> SyncResult<Box<dyn File>> {
        self.opener
            .open(&request.password, bytes, request.key_file_data.as_deref())
            .await
    }

    /// Clause 1: resolve the FileInfo by id or by the (storage, name,
    /// path) triple, adopting its persisted opts if the request didn't
    /// supply any.
    async fn resolve_file_info(&self, request: &OpenRequest) -> (Option<FileInfo>, serde_json::Value) {
        let registry = self.registry.lock().await;
        let file_info = request
            .id
            .and_then(|id| registry.get(id).cloned())
            .or_else(|| {
                registry
                    .get_match(
                        request.storage.as_deref().unwrap_or(""),
                        &request.name,
                        request.path.as_deref().unwrap_or(""),
                    )
                    .cloned()
            });

        let opts = request
            .opts
            .clone()
            .or_else(|| file_info.as_ref().map(|fi| fi.opts.clone()))
            .unwrap_or(serde_json::Value::Null);

        (file_info, opts)
    }

    /// Post-open actions (§4.4): attach `cacheId`, translate opts,
    /// upsert + persist the registry, and signal whether to begin
    /// watching.
    async fn finish_open(
        &self,
        request: OpenRequest,
        file_info: Option<FileInfo>,
        opts: serde_json::Value,
        mut file: Box<dyn File>,
        schedule_sync: bool,
    ) -> SyncResult<OpenedFile> {
        let cache_id = file_info.as_ref().map(|fi| fi.id).unwrap_or_else(Uuid::new_v4);
        file.set_cache_id(cache_id);

        let storage = request.storage.clone().unwrap_or_default();
        let opts = if let Some(backend) = (!storage.is_empty())
            .then(|| self.backends.resolve(&storage))
            .flatten()
        {
            backend.store_opts_to_file_opts(&opts)
        } else {
            opts
        };
        file.set_opts(opts.clone());
        file.set_storage(storage.clone());
        file.set_path(request.path.clone().unwrap_or_default());
        if let Some(rev) = file_info.as_ref().and_then(|fi| fi.rev.clone()) {
            file.set_rev(Some(rev));
        }

        let new_info = FileInfo {
            id: cache_id,
            name: request.name.clone(),
            storage: storage.clone(),
            path: file.path().to_string(),
            opts,
            rev: file.rev(),
            modified: file.modified(),
            edit_state: file.get_local_edit_state(),
            sync_date: file.sync_date(),
            open_date: now_unix(),
            key_file_name: file_info.as_ref().and_then(|fi| fi.key_file_name.clone()),
            key_file_hash: file.get_key_file_hash(),
        };

        {
            let mut registry = self.registry.lock().await;
            registry.unshift(new_info.clone());
            registry.save()?;
        }

        Ok(OpenedFile {
            file,
            file_info: new_info,
            schedule_sync,
            begin_watch: storage == "file",
        })
    }
}

fn now_unix() -> Option<u64> {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .ok()
        .map(|d| d.as_secs())
}
