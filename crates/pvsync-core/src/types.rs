//! Shared primitives used across the workspace (§3, §4.1, §6).
//!
//! Kept deliberately tiny: these are the handful of types that cross crate
//! boundaries (storage ↔ engine ↔ registry). Everything else — `FileInfo`,
//! the `File` trait, the sync state machine's internal state — lives in the
//! crate that owns it.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Stable opaque identifier for a FileInfo record. Also the cache key (§3).
pub type FileId = Uuid;

/// Opaque, equality-comparable revision token issued by a backend (§6).
///
/// The engine uses only equality on this type, never ordering — absence
/// means "unknown, always reload".
pub type Rev = String;

/// Opaque blob capturing in-progress local edit history (§3's `editState`).
/// The engine passes this through untouched.
pub type EditState = Vec<u8>;

/// Result of a `stat` or `load` call: whatever revision metadata the
/// backend can report (§4.1).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stat {
    pub rev: Option<Rev>,
}

impl Stat {
    pub fn with_rev(rev: impl Into<Rev>) -> Self {
        Stat {
            rev: Some(rev.into()),
        }
    }

    pub fn unknown() -> Self {
        Stat { rev: None }
    }
}

/// Result of a `save` call. `path` is populated when the backend remaps the
/// path on write (name-mangling, content-addressing, etc. — §4.1).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SaveOutcome {
    pub rev: Option<Rev>,
    pub path: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stat_constructors() {
        assert_eq!(Stat::unknown().rev, None);
        assert_eq!(Stat::with_rev("r1").rev, Some("r1".to_string()));
    }
}
