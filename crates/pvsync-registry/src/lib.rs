//! pvsync-registry: the persisted, MRU-ordered FileInfo list (§4.2/C2).

pub mod info;
pub mod store;

pub use info::FileInfo;
pub use store::Registry;
