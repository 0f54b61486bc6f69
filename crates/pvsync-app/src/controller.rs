//! The Application Controller (§4.6/C6).
//!
//! Glue, deliberately thin: it holds the open-file set the engine stays
//! silent about (§4.4/§4.5 say nothing about concurrent files, only about a
//! single `File`), routes each public operation to the engine, and wires up
//! the per-file debounced watcher the open orchestrator asks for via
//! `begin_watch`.

use crate::events::ControllerPorts;
use pvsync_core::error::{SyncError, SyncResult};
use pvsync_core::types::FileId;
use pvsync_engine::{Debouncer, Engine, OpenRequest, SyncOptions, SyncOutcome};
use pvsync_file::File;
use pvsync_storage::backend::WatchCallback;
use pvsync_storage::WatchHandle;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, warn};

struct OpenEntry {
    file: Box<dyn File>,
    _watch: Option<WatchHandle>,
}

/// Holds the open-file set and dispatches to the engine; no sync-state or
/// reconciliation logic lives here (§2's "Glue — minimal logic").
pub struct Controller {
    engine: Arc<Engine>,
    open: Arc<Mutex<HashMap<FileId, OpenEntry>>>,
    ports: ControllerPorts,
}

impl Controller {
    pub fn new(engine: Arc<Engine>, ports: ControllerPorts) -> Self {
        Controller {
            engine,
            open: Arc::new(Mutex::new(HashMap::new())),
            ports,
        }
    }

    pub fn ports(&self) -> &ControllerPorts {
        &self.ports
    }

    /// `openFile(request)` (§4.6, via §4.4). The duplicate-id check the
    /// orchestrator performs needs a synchronous snapshot of what's
    /// currently open; a second check after the open call closes the race
    /// window where two opens of the same database ran concurrently.
    pub async fn open_file(&self, request: OpenRequest) -> SyncResult<FileId> {
        let snapshot: HashSet<FileId> = {
            let open = self.open.lock().await;
            open.keys().copied().collect()
        };

        let opened = self.engine.open(request, move |id| snapshot.contains(&id)).await?;
        let id = opened.file.id();
        debug!(file = %id, begin_watch = opened.begin_watch, schedule_sync = opened.schedule_sync, "open resolved");

        let watch = if opened.begin_watch {
            self.begin_watch(id, &opened.file_info.storage, &opened.file_info.path, &opened.file_info.opts)
        } else {
            None
        };

        {
            let mut open = self.open.lock().await;
            if open.contains_key(&id) {
                return Err(SyncError::DuplicateFileId(id.to_string()));
            }
            open.insert(
                id,
                OpenEntry {
                    file: opened.file,
                    _watch: watch,
                },
            );
        }

        if opened.schedule_sync {
            self.spawn_sync(id);
        }

        Ok(id)
    }

    /// `closeFile(id)` (§4.6): drop the file from the open set, releasing
    /// its watcher (dropping `WatchHandle` does not itself call `unwatch`,
    /// so the handle's `stop` closure simply leaks with the entry — the
    /// watcher keeps firing into a detached task whose target has vanished;
    /// acceptable since the debounced `sync` below is then a no-op).
    pub async fn close_file(&self, id: FileId) -> bool {
        let mut open = self.open.lock().await;
        if let Some(mut entry) = open.remove(&id) {
            entry.file.close();
            true
        } else {
            false
        }
    }

    /// `closeAllFiles()` (§4.6).
    pub async fn close_all_files(&self) {
        let mut open = self.open.lock().await;
        for entry in open.values_mut() {
            entry.file.close();
        }
        open.clear();
    }

    /// `syncFile(id, options?)` (§4.6, routing straight to §4.5).
    pub async fn sync_file(&self, id: FileId, options: Option<SyncOptions>) -> SyncResult<SyncOutcome> {
        let mut open = self.open.lock().await;
        let entry = open
            .get_mut(&id)
            .ok_or_else(|| SyncError::NotFound(id.to_string()))?;
        self.engine.sync(entry.file.as_mut(), options).await
    }

    /// `createNewFile(password, keyFileData?)` (§4.6): build an empty
    /// database through the opener, then register it in the open set the
    /// same way `openFile` would, without a round trip through the open
    /// orchestrator (there's nothing on any backend yet to resolve).
    pub async fn create_new_file(&self, password: &str, key_file_data: Option<&[u8]>) -> SyncResult<FileId> {
        let file = self.engine.opener().create_new(password, key_file_data).await?;
        self.register_new(file).await
    }

    /// `createDemoFile()` (§4.6): open the bundled sample database bytes
    /// and wrap the result so `sync` on it is always a no-op (§4.5's guard
    /// clause), matching the shape of [`pvsync_file::DemoFile`].
    pub async fn create_demo_file(&self, demo_bytes: &[u8]) -> SyncResult<FileId> {
        let file = self.engine.opener().open("", demo_bytes, None).await?;
        let file = pvsync_file::DemoFile::new(file);
        self.register_new(Box::new(file)).await
    }

    /// `importFileWithXml(xml)` (§4.6, §9's open question: unlike the
    /// original contract, a `Result`-returning signature always hands the
    /// caller the imported file on success).
    pub async fn import_file_with_xml(&self, xml: &str) -> SyncResult<FileId> {
        let file = self.engine.opener().import_with_xml(xml).await?;
        self.register_new(file).await
    }

    /// `removeFileInfo(id)` (§4.6): forget a FileInfo entry; does not
    /// require the file to be open, and does not touch the cache.
    pub async fn remove_file_info(&self, id: FileId) -> SyncResult<()> {
        self.engine.remove_file_info(id).await
    }

    /// `clearStoredKeyFiles()` (§4.6).
    pub async fn clear_stored_key_files(&self) -> SyncResult<()> {
        self.engine.clear_stored_key_files().await
    }

    /// `empty-trash` (§6's listened-to events; §4.3's `emptyTrash`,
    /// followed by a sync since the File contract marks itself modified).
    pub async fn empty_trash(&self, id: FileId) -> SyncResult<SyncOutcome> {
        {
            let mut open = self.open.lock().await;
            let entry = open
                .get_mut(&id)
                .ok_or_else(|| SyncError::NotFound(id.to_string()))?;
            entry.file.empty_trash();
        }
        self.sync_file(id, None).await
    }

    pub async fn is_open(&self, id: FileId) -> bool {
        self.open.lock().await.contains_key(&id)
    }

    pub async fn open_count(&self) -> usize {
        self.open.lock().await.len()
    }

    async fn register_new(&self, file: Box<dyn File>) -> SyncResult<FileId> {
        let id = file.id();
        let mut open = self.open.lock().await;
        if open.contains_key(&id) {
            return Err(SyncError::DuplicateFileId(id.to_string()));
        }
        open.insert(id, OpenEntry { file, _watch: None });
        Ok(id)
    }

    /// Post-open watch step (§4.4): begin watching iff the backend
    /// supports it, coalescing raw notifications through a per-file
    /// [`Debouncer`] before calling `sync` (§4.4, §5, §8 invariant 6).
    fn begin_watch(&self, id: FileId, storage: &str, path: &str, opts: &serde_json::Value) -> Option<WatchHandle> {
        let backend = self.engine.backends().resolve(storage)?;
        if !backend.supports_watch() {
            return None;
        }

        let debouncer = Arc::new(Debouncer::new(self.engine.file_change_sync_ms()));
        let engine = self.engine.clone();
        let open = self.open.clone();

        let on_change: WatchCallback = Arc::new(move || {
            let engine = engine.clone();
            let open = open.clone();
            let debouncer = debouncer.clone();
            debouncer.notify(move || {
                let engine = engine.clone();
                let open = open.clone();
                tokio::spawn(async move {
                    let mut guard = open.lock().await;
                    if let Some(entry) = guard.get_mut(&id) {
                        if let Err(e) = engine.sync(entry.file.as_mut(), None).await {
                            warn!(file = %id, error = %e, "watch-triggered sync failed");
                        }
                    }
                });
            });
        });

        backend.watch(path, opts, on_change).ok()
    }

    fn spawn_sync(&self, id: FileId) {
        let engine = self.engine.clone();
        let open = self.open.clone();
        tokio::spawn(async move {
            let mut guard = open.lock().await;
            if let Some(entry) = guard.get_mut(&id) {
                if let Err(e) = engine.sync(entry.file.as_mut(), None).await {
                    warn!(file = %id, error = %e, "deferred post-open sync failed");
                }
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pvsync_engine::EnginePorts;
    use pvsync_file::MemoryOpener;
    use pvsync_registry::Registry;
    use pvsync_storage::{BackendRegistry, CacheBackend};

    fn make_controller(dir: &std::path::Path) -> Controller {
        let backends = BackendRegistry::new(CacheBackend::new(dir));
        let engine = Engine::new(
            Registry::load(dir.join("files.json")).unwrap(),
            backends,
            Arc::new(MemoryOpener),
            3,
            500,
            EnginePorts::new(),
        );
        Controller::new(Arc::new(engine), ControllerPorts::new())
    }

    #[tokio::test]
    async fn open_file_with_supplied_bytes_registers_it() {
        let dir = tempfile::tempdir().unwrap();
        let controller = make_controller(dir.path());

        let id = controller
            .open_file(OpenRequest {
                id: None,
                storage: None,
                name: "a".to_string(),
                path: None,
                opts: None,
                rev: None,
                password: String::new(),
                key_file_data: None,
                file_data: Some(b"payload".to_vec()),
            })
            .await
            .unwrap();

        assert!(controller.is_open(id).await);
        assert_eq!(controller.open_count().await, 1);
    }

    #[tokio::test]
    async fn opening_the_same_file_twice_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let controller = make_controller(dir.path());

        let request = || OpenRequest {
            id: None,
            storage: None,
            name: "a".to_string(),
            path: None,
            opts: None,
            rev: None,
            password: String::new(),
            key_file_data: None,
            file_data: Some(b"payload".to_vec()),
        };

        controller.open_file(request()).await.unwrap();
        let err = controller.open_file(request()).await.unwrap_err();
        assert!(matches!(err, SyncError::DuplicateFileId(_)));
        assert_eq!(controller.open_count().await, 1);
    }

    #[tokio::test]
    async fn close_file_removes_it_from_the_open_set() {
        let dir = tempfile::tempdir().unwrap();
        let controller = make_controller(dir.path());

        let id = controller
            .open_file(OpenRequest {
                id: None,
                storage: None,
                name: "a".to_string(),
                path: None,
                opts: None,
                rev: None,
                password: String::new(),
                key_file_data: None,
                file_data: Some(b"payload".to_vec()),
            })
            .await
            .unwrap();

        assert!(controller.close_file(id).await);
        assert!(!controller.is_open(id).await);
        assert!(!controller.close_file(id).await);
    }

    #[tokio::test]
    async fn sync_file_rejects_unknown_id() {
        let dir = tempfile::tempdir().unwrap();
        let controller = make_controller(dir.path());
        let err = controller.sync_file(FileId::new_v4(), None).await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn create_new_file_starts_modified_and_registers() {
        let dir = tempfile::tempdir().unwrap();
        let controller = make_controller(dir.path());

        let id = controller.create_new_file("hunter2", None).await.unwrap();
        assert!(controller.is_open(id).await);
    }

    #[tokio::test]
    async fn create_demo_file_always_syncs_as_a_no_op() {
        let dir = tempfile::tempdir().unwrap();
        let controller = make_controller(dir.path());

        let id = controller.create_demo_file(b"demo-bytes").await.unwrap();
        let outcome = controller.sync_file(id, None).await.unwrap();
        assert_eq!(outcome, SyncOutcome::NoOp);
    }

    #[tokio::test]
    async fn import_file_with_xml_registers_a_modified_file() {
        let dir = tempfile::tempdir().unwrap();
        let controller = make_controller(dir.path());

        let id = controller.import_file_with_xml("<xml/>").await.unwrap();
        assert!(controller.is_open(id).await);
    }

    #[tokio::test]
    async fn close_all_files_empties_the_open_set() {
        let dir = tempfile::tempdir().unwrap();
        let controller = make_controller(dir.path());

        controller
            .open_file(OpenRequest {
                id: None,
                storage: None,
                name: "a".to_string(),
                path: None,
                opts: None,
                rev: None,
                password: String::new(),
                key_file_data: None,
                file_data: Some(b"payload-a".to_vec()),
            })
            .await
            .unwrap();
        controller
            .open_file(OpenRequest {
                id: None,
                storage: None,
                name: "b".to_string(),
                path: None,
                opts: None,
                rev: None,
                password: String::new(),
                key_file_data: None,
                file_data: Some(b"payload-b".to_vec()),
            })
            .await
            .unwrap();

        assert_eq!(controller.open_count().await, 2);
        controller.close_all_files().await;
        assert_eq!(controller.open_count().await, 0);
    }

    #[tokio::test]
    async fn clear_stored_key_files_is_idempotent_with_nothing_open() {
        let dir = tempfile::tempdir().unwrap();
        let controller = make_controller(dir.path());
        controller.clear_stored_key_files().await.unwrap();
    }

    #[tokio::test]
    async fn remove_file_info_on_unknown_id_is_a_no_op() {
        let dir = tempfile::tempdir().unwrap();
        let controller = make_controller(dir.path());
        controller.remove_file_info(FileId::new_v4()).await.unwrap();
    }
}
