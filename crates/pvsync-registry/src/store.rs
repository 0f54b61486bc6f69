//! The persisted FileInfo registry (§4.2/C2).
//!
//! An MRU-ordered list rather than a map: `unshift` must move an existing
//! entry to the head, and nothing else needs id-keyed random access often
//! enough to justify a secondary index. Persistence follows a state-cache
//! pattern — load the whole JSON document into memory, mutate, flush
//! atomically (temp file + rename).

use crate::info::FileInfo;
use pvsync_core::error::{SyncError, SyncResult};
use pvsync_core::types::FileId;
use std::path::{Path, PathBuf};

pub struct Registry {
    path: PathBuf,
    entries: Vec<FileInfo>,
    dirty: bool,
}

impl Registry {
    /// Load the registry from `path`, or start empty if it doesn't exist
    /// yet (first run).
    pub fn load(path: impl Into<PathBuf>) -> SyncResult<Self> {
        let path = path.into();
        let entries = if path.exists() {
            let content = std::fs::read_to_string(&path)
                .map_err(|e| SyncError::Other(anyhow::anyhow!("reading registry {}: {e}", path.display())))?;
            serde_json::from_str(&content)
                .map_err(|e| SyncError::Other(anyhow::anyhow!("parsing registry {}: {e}", path.display())))?
        } else {
            Vec::new()
        };

        Ok(Registry {
            path,
            entries,
            dirty: false,
        })
    }

    /// `get(id)` (§4.2).
    pub fn get(&self, id: FileId) -> Option<&FileInfo> {
        self.entries.iter().find(|info| info.id == id)
    }

    /// `getMatch(storage, name, path)` — exact triple match, used when an
    /// open request lacks an `id` (§4.2).
    pub fn get_match(&self, storage: &str, name: &str, path: &str) -> Option<&FileInfo> {
        self.entries.iter().find(|info| info.matches(storage, name, path))
    }

    /// `getByName(name)` (§4.2).
    pub fn get_by_name(&self, name: &str) -> Option<&FileInfo> {
        self.entries.iter().find(|info| info.name == name)
    }

    /// `remove(id)` (§4.2).
    pub fn remove(&mut self, id: FileId) -> Option<FileInfo> {
        let idx = self.entries.iter().position(|info| info.id == id)?;
        self.dirty = true;
        Some(self.entries.remove(idx))
    }

    /// `unshift(info)` — insert at head, replacing any existing entry with
    /// the same id (§3, §4.2: "inserting an existing `id` moves it to the
    /// head").
    pub fn unshift(&mut self, info: FileInfo) {
        self.entries.retain(|existing| existing.id != info.id);
        self.entries.insert(0, info);
        self.dirty = true;
    }

    /// All entries, most-recently-opened first.
    pub fn entries(&self) -> &[FileInfo] {
        &self.entries
    }

    /// Clear `keyFileName`/`keyFileHash` on every entry — the
    /// Application Controller's `clearStoredKeyFiles` (§4.6), for when
    /// "remember key files" is turned off after having been on. Order is
    /// untouched; this isn't an MRU-affecting operation.
    pub fn clear_key_file_hints(&mut self) {
        for entry in &mut self.entries {
            if entry.key_file_name.is_some() || entry.key_file_hash.is_some() {
                entry.key_file_name = None;
                entry.key_file_hash = None;
                self.dirty = true;
            }
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// `save()` — persist the whole list atomically (§4.2).
    pub fn save(&mut self) -> SyncResult<()> {
        if !self.dirty {
            return Ok(());
        }
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| SyncError::Other(anyhow::anyhow!("creating registry dir {}: {e}", parent.display())))?;
        }

        let json = serde_json::to_string_pretty(&self.entries)
            .map_err(|e| SyncError::Other(anyhow::anyhow!("serializing registry: {e}")))?;

        let tmp_path = self.path.with_extension("json.tmp");
        std::fs::write(&tmp_path, &json)
            .map_err(|e| SyncError::Other(anyhow::anyhow!("writing registry temp {}: {e}", tmp_path.display())))?;
        std::fs::rename(&tmp_path, &self.path)
            .map_err(|e| SyncError::Other(anyhow::anyhow!("renaming registry to {}: {e}", self.path.display())))?;

        self.dirty = false;
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for Registry {
    fn drop(&mut self) {
        if self.dirty {
            if let Err(e) = self.save() {
                tracing::warn!("failed to flush FileInfo registry on drop: {e}");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn sample(id: FileId, name: &str) -> FileInfo {
        FileInfo {
            id,
            name: name.to_string(),
            storage: "s3".to_string(),
            path: format!("/vaults/{name}.kdbx"),
            opts: serde_json::Value::Null,
            rev: None,
            modified: false,
            edit_state: None,
            sync_date: None,
            open_date: None,
            key_file_name: None,
            key_file_hash: None,
        }
    }

    #[test]
    fn load_nonexistent_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let registry = Registry::load(dir.path().join("files.json")).unwrap();
        assert!(registry.is_empty());
    }

    #[test]
    fn unshift_new_entry_goes_to_head() {
        let dir = tempfile::tempdir().unwrap();
        let mut registry = Registry::load(dir.path().join("files.json")).unwrap();
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        registry.unshift(sample(a, "a"));
        registry.unshift(sample(b, "b"));
        assert_eq!(registry.entries()[0].id, b);
        assert_eq!(registry.entries()[1].id, a);
    }

    #[test]
    fn unshift_existing_id_moves_to_head_without_duplicating() {
        let dir = tempfile::tempdir().unwrap();
        let mut registry = Registry::load(dir.path().join("files.json")).unwrap();
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        registry.unshift(sample(a, "a"));
        registry.unshift(sample(b, "b"));
        registry.unshift(sample(a, "a-renamed"));
        assert_eq!(registry.len(), 2);
        assert_eq!(registry.entries()[0].id, a);
        assert_eq!(registry.entries()[0].name, "a-renamed");
    }

    #[test]
    fn get_match_requires_all_three_fields() {
        let dir = tempfile::tempdir().unwrap();
        let mut registry = Registry::load(dir.path().join("files.json")).unwrap();
        registry.unshift(sample(Uuid::new_v4(), "a"));
        assert!(registry.get_match("s3", "a", "/vaults/a.kdbx").is_some());
        assert!(registry.get_match("file", "a", "/vaults/a.kdbx").is_none());
        assert!(registry.get_match("s3", "a", "/vaults/wrong.kdbx").is_none());
    }

    #[test]
    fn remove_drops_entry() {
        let dir = tempfile::tempdir().unwrap();
        let mut registry = Registry::load(dir.path().join("files.json")).unwrap();
        let a = Uuid::new_v4();
        registry.unshift(sample(a, "a"));
        assert!(registry.remove(a).is_some());
        assert!(registry.get(a).is_none());
        assert!(registry.remove(a).is_none());
    }

    #[test]
    fn save_then_reload_roundtrips_order() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("files.json");
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        {
            let mut registry = Registry::load(&path).unwrap();
            registry.unshift(sample(a, "a"));
            registry.unshift(sample(b, "b"));
            registry.save().unwrap();
        }

        let reloaded = Registry::load(&path).unwrap();
        assert_eq!(reloaded.entries()[0].id, b);
        assert_eq!(reloaded.entries()[1].id, a);
    }

    #[test]
    fn clear_key_file_hints_wipes_both_fields_everywhere() {
        let dir = tempfile::tempdir().unwrap();
        let mut registry = Registry::load(dir.path().join("files.json")).unwrap();
        let a = Uuid::new_v4();
        let mut info = sample(a, "a");
        info.key_file_name = Some("a.keyx".to_string());
        info.key_file_hash = Some("deadbeef".to_string());
        registry.unshift(info);

        registry.clear_key_file_hints();

        assert!(registry.get(a).unwrap().key_file_name.is_none());
        assert!(registry.get(a).unwrap().key_file_hash.is_none());
    }

    #[test]
    fn save_is_idempotent_when_not_dirty() {
        let dir = tempfile::tempdir().unwrap();
        let mut registry = Registry::load(dir.path().join("files.json")).unwrap();
        registry.save().unwrap();
        registry.save().unwrap();
    }
}

#[cfg(test)]
mod proptest_suite {
    use super::*;
    use proptest::prelude::*;
    use uuid::Uuid;

    fn sample(id: FileId) -> FileInfo {
        FileInfo {
            id,
            name: id.to_string(),
            storage: String::new(),
            path: String::new(),
            opts: serde_json::Value::Null,
            rev: None,
            modified: false,
            edit_state: None,
            sync_date: None,
            open_date: None,
            key_file_name: None,
            key_file_hash: None,
        }
    }

    fn arb_id_sequence() -> impl Strategy<Value = Vec<u8>> {
        prop::collection::vec(0u8..4, 1..30)
    }

    proptest! {
        #[test]
        fn unshifting_keeps_ids_unique(seq in arb_id_sequence()) {
            let pool: Vec<Uuid> = (0..4).map(|_| Uuid::new_v4()).collect();
            let dir = tempfile::tempdir().unwrap();
            let mut registry = Registry::load(dir.path().join("files.json")).unwrap();
            for idx in seq {
                registry.unshift(sample(pool[idx as usize]));
            }
            let mut ids: Vec<_> = registry.entries().iter().map(|e| e.id).collect();
            let before = ids.len();
            ids.sort();
            ids.dedup();
            prop_assert_eq!(before, ids.len());
        }

        #[test]
        fn last_unshifted_id_is_always_at_head(seq in arb_id_sequence()) {
            let pool: Vec<Uuid> = (0..4).map(|_| Uuid::new_v4()).collect();
            let dir = tempfile::tempdir().unwrap();
            let mut registry = Registry::load(dir.path().join("files.json")).unwrap();
            let mut last = None;
            for idx in seq {
                let id = pool[idx as usize];
                registry.unshift(sample(id));
                last = Some(id);
            }
            if let Some(last) = last {
                prop_assert_eq!(registry.entries()[0].id, last);
            }
        }
    }
}
