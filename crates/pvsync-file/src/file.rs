//! The `File` contract consumed by the engine (§4.3/C3).
//!
//! `File` is opaque to the engine: it knows the flag transitions it's
//! allowed to trigger (`set_sync_progress`, `set_sync_complete`, ...) but
//! never inspects the decrypted content. `mergeOrUpdate` in particular is
//! a black box — §9's design note says an implementer "may stub it in
//! tests with a controllable callback", which is exactly what
//! [`crate::memory::MemoryFile`] is for.
//!
//! `open`/`importWithXml` are modeled as [`FileOpener`] methods rather
//! than `File` methods: in the original callback-style contract they're
//! effectively constructors ("on success file has stable id"), and a
//! constructor that returns `Box<dyn File>` is the idiomatic shape here —
//! it's also what lets the engine swap a real KDBX opener for a test
//! double without `File` itself needing a `Self: Sized` bound.

use async_trait::async_trait;
use pvsync_core::error::SyncResult;
use pvsync_core::types::{EditState, FileId, Rev};

#[async_trait]
pub trait File: Send + Sync {
    /// Content-derived, stable identifier assigned at open time (§3). Used
    /// by the open orchestrator's duplicate-open check (§4.4).
    fn id(&self) -> FileId;

    /// FileInfo id this file is bound to for cache reads/writes (§3's
    /// `cacheId`). Distinct from `id` for a "save as" to a new backend.
    fn cache_id(&self) -> FileId;
    fn set_cache_id(&mut self, id: FileId);

    fn path(&self) -> &str;
    fn set_path(&mut self, path: String);

    fn storage(&self) -> &str;
    fn set_storage(&mut self, storage: String);

    fn opts(&self) -> &serde_json::Value;
    fn set_opts(&mut self, opts: serde_json::Value);

    /// Mirror of the last-known backend revision (§3).
    fn rev(&self) -> Option<Rev>;
    fn set_rev(&mut self, rev: Option<Rev>);

    /// Local edits not yet persisted to the backend (§3).
    fn modified(&self) -> bool;
    /// Local bytes not yet persisted to the cache (§3; orthogonal to
    /// `modified`).
    fn dirty(&self) -> bool;
    /// True while a sync cycle owns this file (§4.5's guard clause).
    fn syncing(&self) -> bool;

    fn sync_date(&self) -> Option<u64>;

    /// True for a demo database (§4.5's guard: `sync` on a demo file
    /// always succeeds as a no-op). `false` for every real `File`.
    fn is_demo(&self) -> bool {
        false
    }

    /// Serialize the current decrypted state to bytes (§4.3's `getData`).
    async fn get_data(&self) -> SyncResult<Vec<u8>>;

    /// Reconcile local edits against `remote_bytes` (§4.3's
    /// `mergeOrUpdate`). Must be idempotent under repeated identical
    /// remote bytes. A [`pvsync_core::error::SyncError::InvalidKey`]
    /// means the remote key material changed; the engine surfaces this as
    /// a `remote-key-changed` event and aborts the sync (§4.3, §7).
    async fn merge_or_update(
        &mut self,
        remote_bytes: &[u8],
        remote_key: Option<&str>,
    ) -> SyncResult<()>;

    fn set_local_edit_state(&mut self, blob: EditState);
    fn get_local_edit_state(&self) -> Option<EditState>;

    /// The only place `syncing` flips to true (§9's "named operations
    /// enforce invariants").
    fn set_sync_progress(&mut self);

    /// Clears `syncing`; clears `modified` and/or `dirty` depending on
    /// which stores were actually written (§5).
    fn set_sync_complete(
        &mut self,
        path: Option<String>,
        storage: Option<String>,
        err: Option<String>,
        saved_to_cache: bool,
    );

    fn close(&mut self);
    fn empty_trash(&mut self);
    /// Opaque trash-group identifier; the engine invokes but never
    /// interprets this (§4.3).
    fn get_trash_group(&self) -> Option<String>;

    fn get_key_file_hash(&self) -> Option<String>;
}

#[async_trait]
pub trait FileOpener: Send + Sync {
    /// Decrypt `bytes` with `password`/`key_file_data` (§4.3's `open`). On
    /// success the returned file has a stable, content-derived `id`.
    async fn open(
        &self,
        password: &str,
        bytes: &[u8],
        key_file_data: Option<&[u8]>,
    ) -> SyncResult<Box<dyn File>>;

    /// Alternate initializer from a cleartext XML import (§4.3's
    /// `importWithXml`). Per §9's open question, the success path always
    /// yields a file here — the "missing success callback" ambiguity in
    /// the original contract doesn't apply to a `Result`-returning
    /// signature.
    async fn import_with_xml(&self, xml: &str) -> SyncResult<Box<dyn File>>;

    /// Build a brand-new, empty database keyed by `password`/
    /// `key_file_data` (§4.6's `createNewFile`). Starts `modified` and
    /// `dirty`, since it has never been persisted to a cache or backend.
    async fn create_new(&self, password: &str, key_file_data: Option<&[u8]>) -> SyncResult<Box<dyn File>>;

    /// Opaque key-file material for a given hash (§4.3's
    /// `createKeyFileWithHash`).
    fn create_key_file_with_hash(&self, hash: &str) -> SyncResult<Vec<u8>>;
}
