//! The controller's own event ports (§6, §9).
//!
//! `refresh` and `remote-key-changed` are emitted by the engine itself
//! ([`pvsync_engine::EnginePorts`]); `filter`/`select-entry` are pure UI
//! projections of the password-entry domain model, which §1 places out of
//! scope here. The ports still belong on the controller's API surface (so a
//! UI collaborator has somewhere to register), but their payload is left
//! opaque rather than modeling groups/entries/filters/sort/trash.

use std::sync::Arc;

pub type FilterHandler = Arc<dyn Fn(serde_json::Value) + Send + Sync>;
pub type SelectEntryHandler = Arc<dyn Fn(serde_json::Value) + Send + Sync>;

#[derive(Clone, Default)]
pub struct ControllerPorts {
    pub on_filter: Option<FilterHandler>,
    pub on_select_entry: Option<SelectEntryHandler>,
}

impl ControllerPorts {
    pub fn new() -> Self {
        ControllerPorts::default()
    }

    pub fn with_filter(mut self, handler: FilterHandler) -> Self {
        self.on_filter = Some(handler);
        self
    }

    pub fn with_select_entry(mut self, handler: SelectEntryHandler) -> Self {
        self.on_select_entry = Some(handler);
        self
    }

    pub(crate) fn emit_filter(&self, payload: serde_json::Value) {
        if let Some(handler) = &self.on_filter {
            handler(payload);
        }
    }

    pub(crate) fn emit_select_entry(&self, payload: serde_json::Value) {
        if let Some(handler) = &self.on_select_entry {
            handler(payload);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn emit_with_no_handler_is_a_no_op() {
        let ports = ControllerPorts::new();
        ports.emit_filter(serde_json::Value::Null);
        ports.emit_select_entry(serde_json::Value::Null);
    }

    #[test]
    fn emit_select_entry_invokes_registered_handler() {
        let count = Arc::new(AtomicUsize::new(0));
        let counter = count.clone();
        let ports = ControllerPorts::new().with_select_entry(Arc::new(move |_payload| {
            counter.fetch_add(1, Ordering::SeqCst);
        }));
        ports.emit_select_entry(serde_json::json!({"entry": "abc"}));
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }
}
