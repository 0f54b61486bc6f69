//! Typed event ports (§9: "Event bus → explicit ports").
//!
//! Replaces a global pub/sub with a struct of optional handlers the
//! controller wires up at construction. Emission stays fire-and-forget —
//! no acknowledgment, no queueing — but the handler set is now a concrete,
//! ownable value instead of module-level state (§6's event bus).

use pvsync_core::types::FileId;
use std::sync::Arc;

pub type RefreshHandler = Arc<dyn Fn() + Send + Sync>;
pub type RemoteKeyChangedHandler = Arc<dyn Fn(FileId) + Send + Sync>;

/// Ports the sync state machine emits on (§6's "Emits" list). `filter` and
/// `select-entry` are UI-projection events with no engine-side state —
/// they belong to the controller's own API surface (§4.6), not here.
#[derive(Clone, Default)]
pub struct EnginePorts {
    pub on_refresh: Option<RefreshHandler>,
    pub on_remote_key_changed: Option<RemoteKeyChangedHandler>,
}

impl EnginePorts {
    pub fn new() -> Self {
        EnginePorts::default()
    }

    pub fn with_refresh(mut self, handler: RefreshHandler) -> Self {
        self.on_refresh = Some(handler);
        self
    }

    pub fn with_remote_key_changed(mut self, handler: RemoteKeyChangedHandler) -> Self {
        self.on_remote_key_changed = Some(handler);
        self
    }

    pub(crate) fn emit_refresh(&self) {
        if let Some(handler) = &self.on_refresh {
            handler();
        }
    }

    pub(crate) fn emit_remote_key_changed(&self, id: FileId) {
        if let Some(handler) = &self.on_remote_key_changed {
            handler(id);
        }
    }
}
