//! Logging setup
//!
//! Native builds log through a `tracing-subscriber` fmt layer filtered by `RUST_LOG`;
//! web builds log to the browser console through `tracing-wasm`, with the level taken
//! from the `envLOG_LEVEL` GET parameter.

/// Initialize logging with sensible defaults
#[cfg(not(target_arch = "wasm32"))]
pub fn setup_logging() {
    use tracing_subscriber::EnvFilter;
    use tracing_subscriber::fmt;
    use tracing_subscriber::prelude::*;

    if std::env::var("RUST_LOG").is_err() {
        // Safety: single-threaded at startup
        unsafe {
            if cfg!(debug_assertions) {
                std::env::set_var(
                    "RUST_LOG",
                    "debug,eframe::native=warn,hyper_util=info,walkers=info,egui::context=warn,reqwest::connect=info",
                );
            } else {
                std::env::set_var("RUST_LOG", "info,eframe=warn");
            }
        }
    }

    let fmt_layer = fmt::layer().with_filter(EnvFilter::from_default_env());
    if tracing_subscriber::registry().with(fmt_layer).try_init().is_err() {
        tracing::warn!("A global tracing subscriber was already installed");
    }

    if cfg!(feature = "profiling") {
        tracing::info!("Logging initialized (profiling scopes are emitted as tracing spans)");
    } else {
        tracing::info!("Logging initialized");
    }
}

/// Initialize console logging and the panic hook
#[cfg(target_arch = "wasm32")]
pub fn setup_logging() {
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;
    use tracing_wasm::WASMLayerConfigBuilder;

    let max_level = match super::cli::get_env("LOG_LEVEL") {
        Some(level) => parse_level(&level),
        None if cfg!(debug_assertions) => tracing::Level::DEBUG,
        None => tracing::Level::INFO,
    };

    let mut builder = WASMLayerConfigBuilder::new();
    builder.set_max_level(max_level);
    let _ = tracing_subscriber::registry()
        .with(tracing_wasm::WASMLayer::new(builder.build()))
        .try_init();

    std::panic::set_hook(Box::new(console_error_panic_hook::hook));
}

#[cfg_attr(not(target_arch = "wasm32"), allow(dead_code))]
fn parse_level(level: &str) -> tracing::Level {
    match level.to_uppercase().as_str() {
        "TRACE" => tracing::Level::TRACE,
        "DEBUG" => tracing::Level::DEBUG,
        "WARN" => tracing::Level::WARN,
        "ERROR" => tracing::Level::ERROR,
        _ => tracing::Level::INFO,
    }
}
