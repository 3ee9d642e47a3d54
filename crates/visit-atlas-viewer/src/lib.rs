//! Visit Atlas - Application Library
//!
//! This is the main application crate that integrates the interaction core with a
//! walkers map, platform geolocation and persistent storage to create the
//! complete visited-countries viewer.

mod app;
mod entrypoints;

pub use app::VisitAtlasApp;

#[cfg(not(target_arch = "wasm32"))]
pub use entrypoints::run_native;

#[cfg(target_arch = "wasm32")]
pub use entrypoints::web::WebHandle;
