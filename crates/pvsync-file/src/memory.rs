//! In-memory `File`/`FileOpener` test double (§9: "an implementer may stub
//! [`mergeOrUpdate`] in tests with a controllable callback").
//!
//! Treats "decryption" as a no-op and "bytes" as opaque payload, so engine
//! tests can drive every sync-state-machine branch (rev match, rev
//! mismatch, merge success, `InvalidKey`) without a real KDBX fixture.

use crate::file::{File, FileOpener};
use crate::kdbx::derive_id;
use async_trait::async_trait;
use pvsync_core::error::{SyncError, SyncResult};
use pvsync_core::types::{EditState, FileId, Rev};
use std::sync::Arc;

/// Controllable merge behavior. Returning `Err` from this hook is how tests
/// exercise the `InvalidKey` / remote-key-changed path without a real
/// credential check.
pub type MergeHook = Arc<dyn Fn(&[u8], Option<&str>, &[u8]) -> SyncResult<Vec<u8>> + Send + Sync>;

pub struct MemoryFile {
    id: FileId,
    cache_id: FileId,
    path: String,
    storage: String,
    opts: serde_json::Value,
    rev: Option<Rev>,
    modified: bool,
    dirty: bool,
    syncing: bool,
    sync_date: Option<u64>,
    edit_state: Option<EditState>,
    data: Vec<u8>,
    key_file_hash: Option<String>,
    trash_group: Option<String>,
    merge_hook: Option<MergeHook>,
    demo: bool,
}

impl MemoryFile {
    pub fn new(data: Vec<u8>) -> Self {
        let id = derive_id(&data);
        MemoryFile {
            id,
            cache_id: id,
            path: String::new(),
            storage: String::new(),
            opts: serde_json::Value::Null,
            rev: None,
            modified: false,
            dirty: false,
            syncing: false,
            sync_date: None,
            edit_state: None,
            data,
            key_file_hash: None,
            trash_group: None,
            merge_hook: None,
            demo: false,
        }
    }

    pub fn with_merge_hook(mut self, hook: MergeHook) -> Self {
        self.merge_hook = Some(hook);
        self
    }

    pub fn with_demo(mut self, demo: bool) -> Self {
        self.demo = demo;
        self
    }

    pub fn set_modified(&mut self, modified: bool) {
        self.modified = modified;
    }

    pub fn set_dirty(&mut self, dirty: bool) {
        self.dirty = dirty;
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }
}

#[async_trait]
impl File for MemoryFile {
    fn id(&self) -> FileId {
        self.id
    }

    fn cache_id(&self) -> FileId {
        self.cache_id
    }

    fn set_cache_id(&mut self, id: FileId) {
        self.cache_id = id;
    }

    fn path(&self) -> &str {
        &self.path
    }

    fn set_path(&mut self, path: String) {
        self.path = path;
    }

    fn storage(&self) -> &str {
        &self.storage
    }

    fn set_storage(&mut self, storage: String) {
        self.storage = storage;
    }

    fn opts(&self) -> &serde_json::Value {
        &self.opts
    }

    fn set_opts(&mut self, opts: serde_json::Value) {
        self.opts = opts;
    }

    fn rev(&self) -> Option<Rev> {
        self.rev.clone()
    }

    fn set_rev(&mut self, rev: Option<Rev>) {
        self.rev = rev;
    }

    fn modified(&self) -> bool {
        self.modified
    }

    fn dirty(&self) -> bool {
        self.dirty
    }

    fn syncing(&self) -> bool {
        self.syncing
    }

    fn sync_date(&self) -> Option<u64> {
        self.sync_date
    }

    fn is_demo(&self) -> bool {
        self.demo
    }

    async fn get_data(&self) -> SyncResult<Vec<u8>> {
        Ok(self.data.clone())
    }

    async fn merge_or_update(
        &mut self,
        remote_bytes: &[u8],
        remote_key: Option<&str>,
    ) -> SyncResult<()> {
        let merged = match &self.merge_hook {
            Some(hook) => hook(remote_bytes, remote_key, &self.data)?,
            None => {
                if remote_key == Some("invalid") {
                    return Err(SyncError::InvalidKey("remote key rejected".to_string()));
                }
                remote_bytes.to_vec()
            }
        };
        self.data = merged;
        Ok(())
    }

    fn set_local_edit_state(&mut self, blob: EditState) {
        self.edit_state = Some(blob);
    }

    fn get_local_edit_state(&self) -> Option<EditState> {
        self.edit_state.clone()
    }

    fn set_sync_progress(&mut self) {
        self.syncing = true;
    }

    fn set_sync_complete(
        &mut self,
        path: Option<String>,
        storage: Option<String>,
        err: Option<String>,
        saved_to_cache: bool,
    ) {
        self.syncing = false;
        if let Some(path) = path {
            self.path = path;
        }
        if let Some(storage) = storage {
            self.storage = storage;
        }
        if err.is_none() {
            self.modified = false;
        }
        if saved_to_cache {
            self.dirty = false;
        }
    }

    fn close(&mut self) {
        self.syncing = false;
    }

    fn empty_trash(&mut self) {
        self.trash_group = None;
    }

    fn get_trash_group(&self) -> Option<String> {
        self.trash_group.clone()
    }

    fn get_key_file_hash(&self) -> Option<String> {
        self.key_file_hash.clone()
    }
}

pub struct MemoryOpener;

#[async_trait]
impl FileOpener for MemoryOpener {
    async fn open(
        &self,
        _password: &str,
        bytes: &[u8],
        _key_file_data: Option<&[u8]>,
    ) -> SyncResult<Box<dyn File>> {
        Ok(Box::new(MemoryFile::new(bytes.to_vec())))
    }

    async fn import_with_xml(&self, xml: &str) -> SyncResult<Box<dyn File>> {
        let mut file = MemoryFile::new(xml.as_bytes().to_vec());
        file.modified = true;
        file.dirty = true;
        Ok(Box::new(file))
    }

    async fn create_new(&self, _password: &str, _key_file_data: Option<&[u8]>) -> SyncResult<Box<dyn File>> {
        // Unlike `open`/`import_with_xml`, there are no bytes yet to derive
        // an id from — a random id stands in for keepass's fresh-database
        // identity until the first `get_data()`/save.
        let id = FileId::new_v4();
        Ok(Box::new(MemoryFile {
            id,
            cache_id: id,
            path: String::new(),
            storage: String::new(),
            opts: serde_json::Value::Null,
            rev: None,
            modified: true,
            dirty: true,
            syncing: false,
            sync_date: None,
            edit_state: None,
            data: Vec::new(),
            key_file_hash: None,
            trash_group: None,
            merge_hook: None,
            demo: false,
        }))
    }

    fn create_key_file_with_hash(&self, hash: &str) -> SyncResult<Vec<u8>> {
        Ok(hash.as_bytes().to_vec())
    }
}
