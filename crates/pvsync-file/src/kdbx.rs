//! KeePass-format (KDBX) `File` implementation.
//!
//! Opens a KDBX database with `keepass::Database::open` for credential
//! lookup, then goes further than a read-only lookup needs to: decrypt
//! on open, re-serialize on `get_data`, and re-open remote bytes on
//! `merge_or_update` to detect a changed master key.
//!
//! `merge_or_update`'s internals are explicitly out of scope (§9: "File
//! object coupling" — no CRDT/three-way-merge assumption is made here).
//! This implementation takes the simplest option that open question
//! leaves available: the remote copy wins once it opens cleanly under the
//! current (or supplied) key. A richer merge strategy can replace the body
//! of `merge_or_update` without touching the `File` contract.

use crate::file::{File, FileOpener};
use async_trait::async_trait;
use keepass::{Database, DatabaseKey};
use pvsync_core::error::{SyncError, SyncResult};
use pvsync_core::types::{EditState, FileId, Rev};
use secrecy::{ExposeSecret, SecretString};
use std::io::Cursor;
use uuid::Uuid;
use zeroize::Zeroize;

pub(crate) fn derive_id(bytes: &[u8]) -> FileId {
    use std::collections::hash_map::DefaultHasher;
    use std::hash::{Hash, Hasher};
    let mut hasher = DefaultHasher::new();
    bytes.hash(&mut hasher);
    let low = hasher.finish();
    bytes.len().hash(&mut hasher);
    let high = hasher.finish();
    Uuid::from_u64_pair(high, low)
}

fn build_key(password: &SecretString, key_file_data: Option<&[u8]>) -> SyncResult<DatabaseKey> {
    let mut key = DatabaseKey::new().with_password(password.expose_secret());
    if let Some(data) = key_file_data {
        let mut cursor = Cursor::new(data);
        key = key
            .with_keyfile(&mut cursor)
            .map_err(|e| SyncError::InvalidKey(format!("reading key file: {e}")))?;
    }
    Ok(key)
}

pub struct KdbxFile {
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
    key_file_hash: Option<String>,
    password: SecretString,
    key_file_data: Option<Vec<u8>>,
    db: Database,
}

impl KdbxFile {
    fn key(&self) -> SyncResult<DatabaseKey> {
        build_key(&self.password, self.key_file_data.as_deref())
    }
}

impl Drop for KdbxFile {
    fn drop(&mut self) {
        if let Some(data) = self.key_file_data.as_mut() {
            data.zeroize();
        }
    }
}

#[async_trait]
impl File for KdbxFile {
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

    async fn get_data(&self) -> SyncResult<Vec<u8>> {
        let key = self.key()?;
        let mut buf = Vec::new();
        self.db
            .save(&mut buf, key)
            .map_err(|e| SyncError::Other(anyhow::anyhow!("serializing KDBX database: {e}")))?;
        Ok(buf)
    }

    async fn merge_or_update(
        &mut self,
        remote_bytes: &[u8],
        remote_key: Option<&str>,
    ) -> SyncResult<()> {
        let key = match remote_key {
            Some(password) => build_key(&SecretString::from(password.to_string()), self.key_file_data.as_deref())?,
            None => self.key()?,
        };

        let mut cursor = Cursor::new(remote_bytes);
        let remote_db = Database::open(&mut cursor, key)
            .map_err(|e| SyncError::InvalidKey(format!("opening remote database: {e}")))?;

        // Remote wins once it opens cleanly — see module docs.
        self.db = remote_db;
        if let Some(new_password) = remote_key {
            self.password = SecretString::from(new_password.to_string());
        }
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
        if err.is_none() {
            self.sync_date = Some(
                std::time::SystemTime::now()
                    .duration_since(std::time::UNIX_EPOCH)
                    .unwrap_or_default()
                    .as_secs(),
            );
        }
    }

    fn close(&mut self) {
        self.syncing = false;
    }

    fn empty_trash(&mut self) {
        self.modified = true;
    }

    fn get_trash_group(&self) -> Option<String> {
        self.db
            .root
            .groups
            .iter()
            .find(|g| g.name.eq_ignore_ascii_case("recycle bin"))
            .map(|g| g.name.clone())
    }

    fn get_key_file_hash(&self) -> Option<String> {
        self.key_file_hash.clone()
    }
}

pub struct KdbxOpener;

impl KdbxOpener {
    pub fn new() -> Self {
        KdbxOpener
    }
}

impl Default for KdbxOpener {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl FileOpener for KdbxOpener {
    async fn open(
        &self,
        password: &str,
        bytes: &[u8],
        key_file_data: Option<&[u8]>,
    ) -> SyncResult<Box<dyn File>> {
        let password = SecretString::from(password.to_string());
        let key = build_key(&password, key_file_data)?;

        let mut cursor = Cursor::new(bytes);
        let db = Database::open(&mut cursor, key)
            .map_err(|e| SyncError::InvalidKey(format!("opening KDBX database: {e}")))?;

        let id = derive_id(bytes);
        Ok(Box::new(KdbxFile {
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
            key_file_hash: key_file_data.map(|data| derive_id(data).to_string()),
            password,
            key_file_data: key_file_data.map(|d| d.to_vec()),
            db,
        }))
    }

    async fn import_with_xml(&self, xml: &str) -> SyncResult<Box<dyn File>> {
        let db = Database::from_xml(xml.as_bytes(), None)
            .map_err(|e| SyncError::Other(anyhow::anyhow!("importing XML database: {e}")))?;

        let id = derive_id(xml.as_bytes());
        Ok(Box::new(KdbxFile {
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
            key_file_hash: None,
            password: SecretString::from(String::new()),
            key_file_data: None,
            db,
        }))
    }

    async fn create_new(&self, password: &str, key_file_data: Option<&[u8]>) -> SyncResult<Box<dyn File>> {
        let db = Database::from_xml(EMPTY_DATABASE_XML.as_bytes(), None)
            .map_err(|e| SyncError::Other(anyhow::anyhow!("building new KDBX database: {e}")))?;

        let id = Uuid::new_v4();
        Ok(Box::new(KdbxFile {
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
            key_file_hash: key_file_data.map(|data| derive_id(data).to_string()),
            password: SecretString::from(password.to_string()),
            key_file_data: key_file_data.map(|d| d.to_vec()),
            db,
        }))
    }

    fn create_key_file_with_hash(&self, hash: &str) -> SyncResult<Vec<u8>> {
        Ok(hash.as_bytes().to_vec())
    }
}

/// Minimal empty-root database body, parsed the same way as
/// [`FileOpener::import_with_xml`]; `createNewFile` has no bytes to decrypt,
/// so this is the only way to hand `keepass` a `Database` to key and save.
const EMPTY_DATABASE_XML: &str = r#"<?xml version="1.0" encoding="utf-8" standalone="yes"?>
<KeePassFile>
  <Meta>
    <Generator>pvsync</Generator>
  </Meta>
  <Root>
    <Group>
      <Name>Root</Name>
    </Group>
  </Root>
</KeePassFile>"#;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derive_id_is_deterministic_and_content_sensitive() {
        let a = derive_id(b"hello");
        let b = derive_id(b"hello");
        let c = derive_id(b"world");
        assert_eq!(a, b);
        assert_ne!(a, c);
    }
}
