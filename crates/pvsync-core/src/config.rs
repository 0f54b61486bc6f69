//! Engine configuration (loaded from `pvsync.toml`).
//!
//! Mirrors the shape of a daemon config file: `#[serde(default)]` sections
//! with hand-written `Default` impls, so a partial or empty TOML document
//! still parses into a fully usable config.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub registry: RegistryConfig,
    pub cache: CacheConfig,
    pub sync: SyncConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    /// Path to the persisted FileInfo registry (JSON, §4.2/§6).
    pub path: PathBuf,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("~/.local/share/pvsync/files.json"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Directory holding the content-addressed cache backend (§3's Cache).
    pub dir: PathBuf,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("~/.cache/pvsync/files"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Debounce window for the local-file watcher, in milliseconds (§4.4's
    /// `FileChangeSync`). N change notifications within this window collapse
    /// into exactly one `sync` invocation (§8 invariant 6).
    pub file_change_sync_ms: u64,
    /// Retry bound for the load+merge cycle before `TooManyLoadAttempts`
    /// (§4.5, §7).
    pub max_load_attempts: u32,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            file_change_sync_ms: 500,
            max_load_attempts: 3,
        }
    }
}
