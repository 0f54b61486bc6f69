//! pvsync-app: the Application Controller (§4.6/C6).
//!
//! Deliberately the thinnest crate in the workspace (§2: "Glue — minimal
//! logic", 10% share): it owns the open-file set the engine stays silent
//! about, routes each public operation straight to [`pvsync_engine::Engine`],
//! and exposes the controller's own UI-projection event ports.

pub mod controller;
pub mod events;

pub use controller::Controller;
pub use events::ControllerPorts;
