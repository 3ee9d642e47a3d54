//! Application module
//!
//! This module provides the main application structure:
//! - Full-screen world map with the countries layer
//! - Hover highlighting and click-to-visit popups
//! - Toggleable sidebar listing the visited countries
//! - Locate button with geolocation retry
//! - Responsive layout (sidebar from bottom on portrait displays)

mod engine;
mod fetch;
mod location;
mod plugin;
pub(crate) mod settings;
mod state;
mod storage;
mod ui_panels;

use crate::app::engine::{RasterTiles, WalkersEngine, WalkersFactory};
use crate::app::location::{PlatformLocationApi, platform_api};
use crate::app::settings::Settings;
use crate::app::state::AppState;
use crate::app::storage::{MemoryStorage, StorageBackend, default_storage_backend};
use eframe::egui;
use visit_atlas_lib::engine::CursorStyle;
use visit_atlas_lib::{
    Coordinate, GeolocationProvider, MapLifecycleManager, MapPhase, PermissionNotice,
    TERRITORIAL_DEFAULT, ViewCameraController,
};
use walkers::{HttpTiles, Map, MapMemory};

/// Seconds since the Unix epoch, used for the permission notice cool-down
#[cfg(not(target_arch = "wasm32"))]
fn unix_now() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

#[cfg(target_arch = "wasm32")]
fn unix_now() -> u64 {
    (js_sys::Date::now() / 1000.0) as u64
}

/// Main application structure
pub struct VisitAtlasApp {
    /// Visited places and the toast slot
    state: AppState,

    /// Where `state` is persisted
    storage: Box<dyn StorageBackend>,

    /// Last persisted notice timestamp, to detect changes
    saved_notice_at: Option<u64>,

    notice: PermissionNotice,

    /// Map engine lifecycle, highlight and selection
    manager: MapLifecycleManager<WalkersFactory>,

    camera: ViewCameraController,

    provider: GeolocationProvider<PlatformLocationApi>,

    /// Base layer tiles, created with the engine
    tiles: Option<HttpTiles>,

    /// Attribution of the base layer
    attribution: String,

    /// Map state (camera position, zoom, etc.)
    map_memory: MapMemory,
}

impl VisitAtlasApp {
    pub fn new(_cc: &eframe::CreationContext<'_>, settings: Settings) -> Self {
        let storage = match default_storage_backend(settings.storage_path.clone()) {
            Ok(storage) => storage,
            Err(e) => {
                tracing::error!("Persistent storage unavailable, visits will not be kept: {e}");
                Box::new(MemoryStorage::default())
            }
        };

        let (state, notice) = if settings.ignore_persisted {
            tracing::info!("Ignoring persisted state (--ignore-persisted flag)");
            (AppState::new(), PermissionNotice::default())
        } else {
            AppState::load(storage.as_ref())
        };

        if let Some(kind) = settings.simulated_failure() {
            tracing::info!("Simulating location failure: {kind:?}");
        }

        let manager = MapLifecycleManager::new(
            WalkersFactory::new(settings.zoom),
            settings.countries_source(),
        );
        let provider = GeolocationProvider::new(platform_api(&settings));
        let mut camera = ViewCameraController::new();
        camera.request_initial(&provider);

        Self {
            saved_notice_at: notice.last_shown_at(),
            state,
            storage,
            notice,
            manager,
            camera,
            provider,
            tiles: None,
            attribution: String::new(),
            map_memory: MapMemory::default(),
        }
    }

    /// Create the engine once the window has a drawable area
    fn initialize_map(&mut self, ctx: &egui::Context) {
        let container_available = ctx.viewport_rect().is_positive();
        let known = self.camera.known_location();
        if !self
            .manager
            .initialize(container_available, known, &mut self.state)
        {
            return;
        }
        if let Some(engine) = self.manager.engine() {
            let base = &engine.config().base_layer;
            tracing::info!("Base layer: {} tile templates", base.tiles.len());
            self.tiles = Some(HttpTiles::new(RasterTiles::new(base), ctx.clone()));
            self.attribution = base.attribution.clone();
        }
    }

    /// Feed engine signals into the interaction core
    fn dispatch_events(&mut self) {
        let events = match self.manager.engine_mut() {
            Some(engine) => engine.poll_events(),
            None => return,
        };
        let known = self.camera.known_location();
        let now = instant::Instant::now();
        for event in events {
            self.manager
                .handle_event(event, known, &mut self.state, now);
        }
    }

    fn apply_camera(&mut self) {
        let Some(engine) = self.manager.engine_mut() else {
            return;
        };
        if let Some((center, zoom)) = engine.camera_update(instant::Instant::now()) {
            self.map_memory
                .center_at(walkers::lat_lon(center.latitude(), center.longitude()));
            if let Err(e) = self.map_memory.set_zoom(zoom) {
                tracing::warn!("Cannot apply zoom {zoom}: {e:?}");
            }
        }
    }

    fn observe_camera(&mut self) {
        let Some(engine) = self.manager.engine_mut() else {
            return;
        };
        if let Some(center) = self.map_memory.detached()
            && let Ok(center) = Coordinate::new(center.x(), center.y())
        {
            engine.observe_camera(center, self.map_memory.zoom());
        }
    }

    fn persist_if_changed(&mut self) {
        let notice_changed = self.notice.last_shown_at() != self.saved_notice_at;
        if !self.state.is_dirty() && !notice_changed {
            return;
        }
        match self.state.save(self.storage.as_ref(), &self.notice) {
            Ok(()) => self.saved_notice_at = self.notice.last_shown_at(),
            Err(e) => {
                tracing::error!("Failed to persist visited places: {e}");
                // Do not retry every frame
                self.saved_notice_at = self.notice.last_shown_at();
            }
        }
    }

    fn needs_repaint(&self) -> bool {
        let engine_busy = self
            .manager
            .engine()
            .is_some_and(|e| e.is_flying() || e.is_downloading());
        engine_busy
            || self.manager.phase() == MapPhase::Initializing
            || self.state.toast().is_some()
            || self.manager.highlight().has_pending_clear()
            || self.camera.is_retry_pending()
            // The browser answers the initial request asynchronously
            || self.camera.known_location().is_none()
    }
}

#[profiling::all_functions]
impl eframe::App for VisitAtlasApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        self.camera.process_reports(
            &mut self.manager,
            &mut self.state,
            &mut self.notice,
            unix_now(),
        );

        self.initialize_map(ctx);
        self.dispatch_events();
        self.manager.sync_visited(&self.state);
        self.manager.tick(instant::Instant::now());
        self.state.prune_toast();
        self.apply_camera();

        ui_panels::render_sidebar(ctx, &mut self.state, self.manager.phase());
        ui_panels::location_error_window(ctx, &mut self.notice, self.camera.last_failure());

        let plugin = self.manager.engine().map(WalkersEngine::plugin);
        let pointer_cursor = self
            .manager
            .engine()
            .is_some_and(|e| e.cursor() == CursorStyle::Pointer);
        let fallback = self
            .manager
            .user_marker()
            .unwrap_or(TERRITORIAL_DEFAULT);
        let my_position = walkers::lat_lon(fallback.latitude(), fallback.longitude());

        let mut locate_clicked = false;

        // Central panel: Map view (full screen)
        egui::CentralPanel::default()
            .frame(egui::Frame::NONE)
            .show(ctx, |ui| {
                profiling::scope!("map_panel");

                if let (Some(tiles), Some(plugin)) = (self.tiles.as_mut(), plugin) {
                    let map = Map::new(Some(tiles), &mut self.map_memory, my_position)
                        .with_plugin(plugin);
                    let response = ui.add(map);
                    if pointer_cursor && response.hovered() {
                        ctx.set_cursor_icon(egui::CursorIcon::PointingHand);
                    }
                    ui_panels::attribution(ui, &self.attribution);
                } else {
                    ui.centered_and_justified(|ui| {
                        ui.label("Map unavailable");
                    });
                }

                ui_panels::sidebar_toggle_button(ui, &mut self.state);
                locate_clicked = ui_panels::locate_button(
                    ui,
                    self.camera.known_location().is_some(),
                    self.camera.last_failure().is_some(),
                    self.camera.is_retry_pending(),
                );
                ui_panels::show_toast(ui, &self.state);
            });

        self.observe_camera();

        if locate_clicked {
            self.camera
                .fly_to_known_or_retry(&mut self.manager, &self.provider);
        }

        if let Some(engine) = self.manager.engine_mut()
            && let Some(signal) = ui_panels::visit_popup(ctx, engine)
        {
            engine.push_event(signal);
        }

        self.persist_if_changed();

        if self.needs_repaint() {
            ctx.request_repaint();
        }
    }

    fn save(&mut self, _storage: &mut dyn eframe::Storage) {
        if let Err(e) = self.state.save(self.storage.as_ref(), &self.notice) {
            tracing::error!("Failed to persist state on save: {e}");
        }
    }
}

impl Drop for VisitAtlasApp {
    fn drop(&mut self) {
        self.manager.teardown();
    }
}
