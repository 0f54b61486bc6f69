//! Backend registry: tag string → backend instance (§9 "dynamic storage
//! lookup by string → a registry of backend implementations keyed by
//! tag").
//!
//! The cache is not a member of this map — it's always present and has a
//! narrower, non-pluggable interface ([`CacheBackend`]) — but the registry
//! owns it too, since every engine call site needs both "the named remote
//! backend" and "the cache" together.

use crate::backend::StorageBackend;
use crate::cache::CacheBackend;
use pvsync_core::error::SyncError;
use std::collections::HashMap;
use std::sync::Arc;

pub struct BackendRegistry {
    backends: HashMap<String, Arc<dyn StorageBackend>>,
    cache: CacheBackend,
}

impl BackendRegistry {
    pub fn new(cache: CacheBackend) -> Self {
        BackendRegistry {
            backends: HashMap::new(),
            cache,
        }
    }

    /// Register a backend under its own tag, replacing any previous
    /// registration for that tag.
    pub fn register(&mut self, backend: Arc<dyn StorageBackend>) {
        self.backends.insert(backend.tag().to_string(), backend);
    }

    /// Resolve a backend by tag. `None`/empty tag means "local-only" and is
    /// not looked up here — the open orchestrator handles that case before
    /// reaching the registry (§4.4 step 4).
    pub fn resolve(&self, tag: &str) -> Option<Arc<dyn StorageBackend>> {
        self.backends.get(tag).cloned()
    }

    pub fn require(&self, tag: &str) -> Result<Arc<dyn StorageBackend>, SyncError> {
        self.resolve(tag)
            .ok_or_else(|| SyncError::Other(anyhow::anyhow!("no backend registered for tag '{tag}'")))
    }

    pub fn cache(&self) -> &CacheBackend {
        &self.cache
    }

    pub fn tags(&self) -> impl Iterator<Item = &str> {
        self.backends.keys().map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{StoreOpts, WatchCallback, WatchHandle};
    use async_trait::async_trait;
    use pvsync_core::error::SyncResult;
    use pvsync_core::types::{Rev, SaveOutcome, Stat};

    struct StubBackend(&'static str);

    #[async_trait]
    impl StorageBackend for StubBackend {
        fn tag(&self) -> &str {
            self.0
        }
        async fn load(&self, _path: &str, _opts: &StoreOpts) -> SyncResult<(Vec<u8>, Stat)> {
            Ok((vec![], Stat::unknown()))
        }
        async fn save(
            &self,
            _path: &str,
            _opts: &StoreOpts,
            _bytes: Vec<u8>,
            _expected_rev: Option<&Rev>,
        ) -> SyncResult<SaveOutcome> {
            Ok(SaveOutcome::default())
        }
        async fn stat(&self, _path: &str, _opts: &StoreOpts) -> SyncResult<Stat> {
            Ok(Stat::unknown())
        }
        fn watch(&self, _path: &str, _opts: &StoreOpts, _on_change: WatchCallback) -> SyncResult<WatchHandle> {
            Err(pvsync_core::error::SyncError::Other(anyhow::anyhow!("unsupported")))
        }
    }

    fn make_registry() -> BackendRegistry {
        let dir = tempfile::tempdir().unwrap();
        BackendRegistry::new(CacheBackend::new(dir.path()))
    }

    #[test]
    fn resolve_unknown_tag_is_none() {
        let registry = make_registry();
        assert!(registry.resolve("s3").is_none());
    }

    #[test]
    fn register_then_resolve() {
        let mut registry = make_registry();
        registry.register(Arc::new(StubBackend("s3")));
        assert!(registry.resolve("s3").is_some());
        assert_eq!(registry.tags().collect::<Vec<_>>(), vec!["s3"]);
    }

    #[test]
    fn require_missing_tag_errors() {
        let registry = make_registry();
        assert!(registry.require("missing").is_err());
    }

    #[test]
    fn re_registering_a_tag_replaces_it() {
        let mut registry = make_registry();
        registry.register(Arc::new(StubBackend("s3")));
        registry.register(Arc::new(StubBackend("s3")));
        assert_eq!(registry.tags().count(), 1);
    }
}
