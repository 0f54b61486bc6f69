//! pvsync-storage: the pluggable storage backend contract (§4.1/C1).
//!
//! A `StorageBackend` is the engine's only window onto the outside world:
//! `stat`/`load`/`save`, an optional `watch`, and a pair of opts
//! translators. Concrete backends are looked up by tag string through
//! [`registry::BackendRegistry`] — the engine never matches on a concrete
//! type. [`cache::CacheBackend`] is the one backend that's always present
//! and can never fail with a rev conflict.

pub mod backend;
pub mod cache;
pub mod local;
pub mod registry;
pub mod s3;

pub use backend::{StoreOpts, StorageBackend, WatchHandle};
pub use cache::CacheBackend;
pub use registry::BackendRegistry;
