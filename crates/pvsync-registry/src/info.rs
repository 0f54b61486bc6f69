//! `FileInfo`: the persisted, per-file metadata record (§3).

use pvsync_core::types::{FileId, Rev};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileInfo {
    /// Stable opaque identifier. Also the cache key (§3).
    pub id: FileId,
    pub name: String,
    /// Backend tag, or empty for a local-only file (§3).
    #[serde(default)]
    pub storage: String,
    pub path: String,
    /// Backend-specific opaque options, round-tripped verbatim.
    #[serde(default)]
    pub opts: serde_json::Value,
    /// Last-known backend revision token.
    #[serde(default)]
    pub rev: Option<Rev>,
    /// True iff local edits exist that have never been successfully synced.
    #[serde(default)]
    pub modified: bool,
    /// Opaque in-progress local edit history, passed through untouched.
    #[serde(default)]
    pub edit_state: Option<Vec<u8>>,
    /// Unix seconds of the last successful sync.
    #[serde(default)]
    pub sync_date: Option<u64>,
    /// Unix seconds this file was last opened.
    #[serde(default)]
    pub open_date: Option<u64>,
    /// Stored only when "remember key files" is enabled.
    #[serde(default)]
    pub key_file_name: Option<String>,
    #[serde(default)]
    pub key_file_hash: Option<String>,
}

impl FileInfo {
    /// True iff `storage`/`name`/`path` all match — the `getMatch` triple
    /// used when an open request lacks an `id` (§4.2).
    pub fn matches(&self, storage: &str, name: &str, path: &str) -> bool {
        self.storage == storage && self.name == name && self.path == path
    }
}
