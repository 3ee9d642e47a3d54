//! Native runner

use crate::app::VisitAtlasApp;
use crate::app::settings::Settings;

pub const APP_NAME: &str = "Visit Atlas";

/// Run the application on native (desktop) platforms. Call this from `main.rs`.
pub fn run_native() {
    super::logging::setup_logging();
    tracing::info!("{} {}", APP_NAME, env!("CARGO_PKG_VERSION"));

    let settings = Settings::from_cli();

    let rt = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(rt) => rt,
        Err(e) => {
            tracing::error!("Failed to create Tokio runtime: {e}");
            return;
        }
    };
    // Tile downloads spawn onto the ambient runtime
    let _guard = rt.enter();

    let native_options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default()
            .with_inner_size([1280.0, 720.0])
            .with_title(APP_NAME),
        ..Default::default()
    };

    if let Err(e) = eframe::run_native(
        APP_NAME,
        native_options,
        Box::new(move |cc| Ok(Box::new(VisitAtlasApp::new(cc, settings)))),
    ) {
        tracing::error!("Application exited with an error: {e}");
    }
}
