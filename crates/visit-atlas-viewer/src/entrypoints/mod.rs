//! Platform entry points: command line / GET parameter parsing, logging setup,
//! the native runner and the browser handle.

pub(crate) mod cli;
pub(crate) mod logging;
#[cfg(not(target_arch = "wasm32"))]
mod run;

#[cfg(target_arch = "wasm32")]
pub mod web;

#[cfg(not(target_arch = "wasm32"))]
pub use run::run_native;
