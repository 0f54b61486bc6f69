//! The `StorageBackend` capability trait (§4.1, §9 "dynamic storage lookup
//! by string").
//!
//! `stat`/`load`/`save` are required; `getPathForName` and `watch` are
//! optional capabilities with default "unsupported" implementations, so a
//! backend only overrides what it can actually do. Dispatch is dynamic —
//! `Box<dyn StorageBackend>` behind a tag string in [`crate::registry`] —
//! because the engine resolves a backend from a FileInfo's `storage` field
//! at runtime, not at compile time.

use async_trait::async_trait;
use pvsync_core::error::{SyncError, SyncResult};
use pvsync_core::types::{Rev, SaveOutcome, Stat};
use std::sync::Arc;

/// Backend-specific options, opaque to the engine. Persisted verbatim on a
/// FileInfo and translated to/from in-memory file opts by the owning
/// backend (§4.1's `fileOptsToStoreOpts`/`storeOptsToFileOpts`).
pub type StoreOpts = serde_json::Value;

/// Invoked by a backend's watcher on every raw change notification. The
/// engine (not the backend) is responsible for debouncing these into a
/// single `sync` call (§4.4, §5).
pub type WatchCallback = Arc<dyn Fn() + Send + Sync>;

/// Handle returned by [`StorageBackend::watch`]. Dropping it does **not**
/// stop the watch — call [`unwatch`](WatchHandle::unwatch) explicitly, so
/// the open orchestrator's "release the watcher on close" step (§4.4) is
/// visible at the call site rather than implicit in a `Drop` impl.
pub struct WatchHandle {
    stop: Box<dyn FnOnce() + Send>,
}

impl WatchHandle {
    pub fn new(stop: impl FnOnce() + Send + 'static) -> Self {
        WatchHandle {
            stop: Box::new(stop),
        }
    }

    pub fn unwatch(self) {
        (self.stop)();
    }
}

impl std::fmt::Debug for WatchHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("WatchHandle")
    }
}

fn unsupported(tag: &str, capability: &str) -> SyncError {
    SyncError::Other(anyhow::anyhow!(
        "backend '{tag}' does not support {capability}"
    ))
}

#[async_trait]
pub trait StorageBackend: Send + Sync {
    /// Tag this backend is registered under (§9). Used only for logging and
    /// error messages — the registry, not the backend, owns the mapping
    /// from tag to instance.
    fn tag(&self) -> &str;

    /// `load(path, opts) → (bytes, stat{rev?})` (§4.1).
    async fn load(&self, path: &str, opts: &StoreOpts) -> SyncResult<(Vec<u8>, Stat)>;

    /// `save(path, opts, bytes, expectedRev?) → stat{rev?, path?}` (§4.1).
    /// A returned [`SyncError::RevConflict`] means the caller should re-enter
    /// load+merge rather than treat this as a terminal failure.
    async fn save(
        &self,
        path: &str,
        opts: &StoreOpts,
        bytes: Vec<u8>,
        expected_rev: Option<&Rev>,
    ) -> SyncResult<SaveOutcome>;

    /// `stat(path, opts) → stat{rev?}` (§4.1). May return
    /// [`SyncError::NotFound`].
    async fn stat(&self, path: &str, opts: &StoreOpts) -> SyncResult<Stat>;

    /// True iff `stat` is a real remote round-trip rather than a stub that
    /// always errors. The open orchestrator (§4.4 step 6) only attempts a
    /// stat-before-download when this is true.
    fn supports_stat(&self) -> bool {
        true
    }

    /// Name-to-path convention (§4.1, optional). Default: unsupported.
    fn get_path_for_name(&self, _name: &str) -> Option<String> {
        None
    }

    /// True iff this backend can notify on external changes (§4.1; in
    /// practice only the local filesystem backend).
    fn supports_watch(&self) -> bool {
        false
    }

    /// Begin watching `path` for external changes. Raw notifications are
    /// forwarded to `on_change` undebounced; debouncing by
    /// `FileChangeSync` ms is the caller's job (§4.4, §5).
    fn watch(&self, _path: &str, _opts: &StoreOpts, _on_change: WatchCallback) -> SyncResult<WatchHandle> {
        Err(unsupported(self.tag(), "watch"))
    }

    /// Translate persisted opts into the shape the `File` object expects
    /// in memory (§4.1's `storeOptsToFileOpts`). Identity by default.
    fn store_opts_to_file_opts(&self, opts: &StoreOpts) -> StoreOpts {
        opts.clone()
    }

    /// Translate in-memory file opts into the shape persisted on a
    /// FileInfo (§4.1's `fileOptsToStoreOpts`). Identity by default.
    fn file_opts_to_store_opts(&self, opts: &StoreOpts) -> StoreOpts {
        opts.clone()
    }
}
