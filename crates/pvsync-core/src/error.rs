//! Engine-visible error kinds (§7).
//!
//! Storage backends and the `File` collaborator return ordinary `Result`s;
//! the engine only cares about a handful of boolean discriminators
//! (`not_found`, `rev_conflict`, merge's `InvalidKey`). `SyncError` collects
//! those into one enum so the state machine in `pvsync-engine` can match on
//! them instead of threading bespoke trait objects through every call.

use thiserror::Error;

pub type SyncResult<T> = Result<T, SyncError>;

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("storage load failed: {0}")]
    StorageLoad(String),

    #[error("storage save failed: {0}")]
    StorageSave(String),

    #[error("storage stat failed: {0}")]
    StorageStat(String),

    /// Server-side rev mismatch on save. Never surfaced to the caller —
    /// the sync state machine catches this and re-enters load+merge.
    #[error("revision conflict")]
    RevConflict,

    /// `stat`/`load` found nothing at the given path.
    #[error("not found: {0}")]
    NotFound(String),

    /// `mergeOrUpdate` failed because the remote key material changed.
    #[error("remote key changed: {0}")]
    InvalidKey(String),

    #[error("cache error: {0}")]
    Cache(String),

    /// Open rejected because the opened file's content-derived id is
    /// already present in the open-file set.
    #[error("file already open: {0}")]
    DuplicateFileId(String),

    #[error("sync already in progress")]
    SyncInProgress,

    /// Exceeded the load+merge retry bound (§4.5: max 3 attempts).
    #[error("too many load attempts")]
    TooManyLoadAttempts,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl SyncError {
    /// True for errors that mean "nothing there" rather than "transient
    /// failure" — distinguishes §4.5's `stat` → `err.notFound` branch from
    /// its generic-error branch.
    pub fn is_not_found(&self) -> bool {
        matches!(self, SyncError::NotFound(_))
    }

    /// True iff this is the save-time rev mismatch that should retry
    /// load+merge instead of terminating the sync.
    pub fn is_rev_conflict(&self) -> bool {
        matches!(self, SyncError::RevConflict)
    }

    /// True iff this is a merge failure caused by a key/credential change,
    /// which the engine must surface as `remote-key-changed` (§4.3/§7).
    pub fn is_invalid_key(&self) -> bool {
        matches!(self, SyncError::InvalidKey(_))
    }
}
