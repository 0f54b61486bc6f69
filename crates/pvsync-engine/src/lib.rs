//! pvsync-engine: the Open Orchestrator (§4.4/C4) and Sync State Machine
//! (§4.5/C5) — together the core of the system (55% combined share).
//!
//! [`Engine`] owns the registry, backend registry, and file opener; it is
//! deliberately silent about the open-file *set* (§4.6 assigns that to
//! the Application Controller) so duplicate-open checks are threaded in
//! by the caller rather than held as engine state.

pub mod debounce;
pub mod events;
pub mod open;
pub mod sync;

pub use debounce::Debouncer;
pub use events::EnginePorts;
pub use open::{OpenRequest, OpenedFile};
pub use sync::{SyncOptions, SyncOutcome};

use pvsync_core::error::SyncResult;
use pvsync_core::types::FileId;
use pvsync_file::FileOpener;
use pvsync_registry::Registry;
use pvsync_storage::BackendRegistry;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Shared state for the open orchestrator and sync state machine. The
/// spec's single-threaded cooperative scheduling model (§5) assumes no
/// engine-level locking is needed; we run on a standard multi-threaded
/// tokio runtime instead, so the registry is guarded by a `tokio::Mutex`
/// to preserve that invariant under real concurrency. Per-file
/// serialization still comes from `File::syncing`, exactly as specified.
pub struct Engine {
    pub(crate) registry: Arc<Mutex<Registry>>,
    pub(crate) backends: Arc<BackendRegistry>,
    pub(crate) opener: Arc<dyn FileOpener>,
    pub(crate) max_load_attempts: u32,
    pub(crate) file_change_sync_ms: u64,
    pub(crate) ports: EnginePorts,
}

impl Engine {
    pub fn new(
        registry: Registry,
        backends: BackendRegistry,
        opener: Arc<dyn FileOpener>,
        max_load_attempts: u32,
        file_change_sync_ms: u64,
        ports: EnginePorts,
    ) -> Self {
        Engine {
            registry: Arc::new(Mutex::new(registry)),
            backends: Arc::new(backends),
            opener,
            max_load_attempts,
            file_change_sync_ms,
            ports,
        }
    }

    pub async fn registry_snapshot(&self) -> Vec<pvsync_registry::FileInfo> {
        self.registry.lock().await.entries().to_vec()
    }

    /// The file opener (§4.3's `open`/`importWithXml`/
    /// `createKeyFileWithHash`), exposed so the Application Controller
    /// (§4.6) can drive `createNewFile`/`createDemoFile`/
    /// `importFileWithXml` without duplicating engine state.
    pub fn opener(&self) -> &Arc<dyn FileOpener> {
        &self.opener
    }

    /// The backend registry (§4.1/C1), exposed so the controller can set
    /// up/tear down watchers on the local backend (§4.4's post-open
    /// "begin watching" step) without the engine having to own the
    /// open-file set itself.
    pub fn backends(&self) -> &Arc<BackendRegistry> {
        &self.backends
    }

    /// `FileChangeSync` debounce window in milliseconds (§4.4, §5, §8
    /// invariant 6).
    pub fn file_change_sync_ms(&self) -> u64 {
        self.file_change_sync_ms
    }

    /// `removeFileInfo(id)` (§4.6): drop a FileInfo from the registry
    /// without touching the cache, so a "forget this file" action doesn't
    /// require the file to be open.
    pub async fn remove_file_info(&self, id: FileId) -> SyncResult<()> {
        let mut registry = self.registry.lock().await;
        registry.remove(id);
        registry.save()
    }

    /// `clearStoredKeyFiles()` (§4.6): wipe `keyFileName`/`keyFileHash`
    /// across the whole registry when "remember key files" is turned off.
    pub async fn clear_stored_key_files(&self) -> SyncResult<()> {
        let mut registry = self.registry.lock().await;
        registry.clear_key_file_hints();
        registry.save()
    }
}
