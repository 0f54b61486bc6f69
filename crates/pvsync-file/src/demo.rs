//! Demo-file wrapper (§4.5's guard clause: `sync` on a demo file always
//! succeeds as a no-op).
//!
//! `File::is_demo` has no setter on the trait — a demo database isn't a
//! distinct state a concrete `File` transitions into, it's a property of
//! *which* database was opened. [`DemoFile`] wraps any already-opened
//! `File` (typically the bundled sample database, opened the same way as
//! any other) and overrides only `is_demo`, so the sync state machine's
//! guard clause fires without a dedicated branch in `KdbxFile`/`MemoryFile`.

use crate::file::File;
use async_trait::async_trait;
use pvsync_core::error::SyncResult;
use pvsync_core::types::{EditState, FileId, Rev};

pub struct DemoFile {
    inner: Box<dyn File>,
}

impl DemoFile {
    pub fn new(inner: Box<dyn File>) -> Self {
        DemoFile { inner }
    }
}

#[async_trait]
impl File for DemoFile {
    fn id(&self) -> FileId {
        self.inner.id()
    }

    fn cache_id(&self) -> FileId {
        self.inner.cache_id()
    }

    fn set_cache_id(&mut self, id: FileId) {
        self.inner.set_cache_id(id);
    }

    fn path(&self) -> &str {
        self.inner.path()
    }

    fn set_path(&mut self, path: String) {
        self.inner.set_path(path);
    }

    fn storage(&self) -> &str {
        self.inner.storage()
    }

    fn set_storage(&mut self, storage: String) {
        self.inner.set_storage(storage);
    }

    fn opts(&self) -> &serde_json::Value {
        self.inner.opts()
    }

    fn set_opts(&mut self, opts: serde_json::Value) {
        self.inner.set_opts(opts);
    }

    fn rev(&self) -> Option<Rev> {
        self.inner.rev()
    }

    fn set_rev(&mut self, rev: Option<Rev>) {
        self.inner.set_rev(rev);
    }

    fn modified(&self) -> bool {
        self.inner.modified()
    }

    fn dirty(&self) -> bool {
        self.inner.dirty()
    }

    fn syncing(&self) -> bool {
        self.inner.syncing()
    }

    fn sync_date(&self) -> Option<u64> {
        self.inner.sync_date()
    }

    fn is_demo(&self) -> bool {
        true
    }

    async fn get_data(&self) -> SyncResult<Vec<u8>> {
        self.inner.get_data().await
    }

    async fn merge_or_update(
        &mut self,
        remote_bytes: &[u8],
        remote_key: Option<&str>,
    ) -> SyncResult<()> {
        self.inner.merge_or_update(remote_bytes, remote_key).await
    }

    fn set_local_edit_state(&mut self, blob: EditState) {
        self.inner.set_local_edit_state(blob);
    }

    fn get_local_edit_state(&self) -> Option<EditState> {
        self.inner.get_local_edit_state()
    }

    fn set_sync_progress(&mut self) {
        self.inner.set_sync_progress();
    }

    fn set_sync_complete(
        &mut self,
        path: Option<String>,
        storage: Option<String>,
        err: Option<String>,
        saved_to_cache: bool,
    ) {
        self.inner.set_sync_complete(path, storage, err, saved_to_cache);
    }

    fn close(&mut self) {
        self.inner.close();
    }

    fn empty_trash(&mut self) {
        self.inner.empty_trash();
    }

    fn get_trash_group(&self) -> Option<String> {
        self.inner.get_trash_group()
    }

    fn get_key_file_hash(&self) -> Option<String> {
        self.inner.get_key_file_hash()
    }
}
