//! Map engine lifecycle
//!
//! [`MapLifecycleManager`] is the only owner of the engine instance. It walks the
//! engine through an explicit set of phases and is the single mutation point for
//! sources, layers, subscriptions and restyling. The hover tracker and the selection
//! controller borrow the engine per call and never keep it.

use crate::engine::{
    CursorStyle, EngineFactory, EngineResult, EventKind, FlyToOptions, GeoJsonSource,
    LayerDescriptor, LayerKind, MapConfig, MapEngine, MapEvent, MarkerId, PaintProperty,
    SourceData,
};
use crate::style::{FillColorRule, OUTLINE_COLOR, OpacityRule, MARKER_COLOR};
use crate::{
    AtlasError, AtlasStore, Coordinate, HighlightTracker, SelectionController, Severity,
    TERRITORIAL_DEFAULT, visited_codes,
};
use instant::Instant;
use std::collections::BTreeSet;

pub const COUNTRIES_SOURCE: &str = "countries";
pub const COUNTRIES_FILL_LAYER: &str = "countries-fill";
pub const COUNTRIES_OUTLINE_LAYER: &str = "countries-outline";

/// Zoom of a freshly created map
pub const INITIAL_ZOOM: f64 = 3.0;
/// Zoom used when centering on the user
pub const LOCATED_ZOOM: f64 = 5.0;

/// Events subscribed on the fill layer once the map is loaded
pub const REGION_EVENTS: [EventKind; 6] = [
    EventKind::PointerMove,
    EventKind::PointerEnter,
    EventKind::PointerLeave,
    EventKind::TouchStart,
    EventKind::TouchEnd,
    EventKind::Click,
];

const MAP_LOAD_PROBLEM: &str = "There was a problem loading the map. Please reload the page.";
const MAP_INIT_FAILED: &str =
    "Failed to initialize the map. Please refresh your browser and try again.";
const MAP_DATA_FAILED: &str = "Failed to load map data. Please reload the page.";

/// Camera flight used when centering on the user's location
pub fn located_flight() -> FlyToOptions {
    FlyToOptions::new(LOCATED_ZOOM)
        .with_speed(1.5)
        .with_curve(1.5)
}

/// Lifecycle phase of the map
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MapPhase {
    #[default]
    Uninitialized,
    /// Engine exists, waiting for its load signal
    Initializing,
    /// Loaded; layers may be partial if setup failed
    Ready,
    /// The engine could not be created
    Failed,
    Destroyed,
}

pub struct MapLifecycleManager<F: EngineFactory> {
    factory: F,
    phase: MapPhase,
    engine: Option<F::Engine>,
    highlight: HighlightTracker,
    selection: SelectionController,
    applied_visited: BTreeSet<String>,
    countries: SourceData,
    user_marker: Option<(MarkerId, Coordinate)>,
}

impl<F: EngineFactory> MapLifecycleManager<F> {
    pub fn new(factory: F, countries: SourceData) -> Self {
        Self {
            factory,
            phase: MapPhase::Uninitialized,
            engine: None,
            highlight: HighlightTracker::new(COUNTRIES_SOURCE),
            selection: SelectionController::default(),
            applied_visited: BTreeSet::new(),
            countries,
            user_marker: None,
        }
    }

    pub fn phase(&self) -> MapPhase {
        self.phase
    }

    pub fn is_ready(&self) -> bool {
        self.phase == MapPhase::Ready
    }

    pub fn engine(&self) -> Option<&F::Engine> {
        self.engine.as_ref()
    }

    pub fn engine_mut(&mut self) -> Option<&mut F::Engine> {
        self.engine.as_mut()
    }

    pub fn factory(&self) -> &F {
        &self.factory
    }

    pub fn highlight(&self) -> &HighlightTracker {
        &self.highlight
    }

    pub fn selection(&self) -> &SelectionController {
        &self.selection
    }

    /// Where the user marker was placed, if any
    pub fn user_marker(&self) -> Option<Coordinate> {
        self.user_marker.map(|(_, at)| at)
    }

    /// Create the engine once a display container is available.
    ///
    /// Returns true when an engine was created by this call.
    pub fn initialize<S: AtlasStore + ?Sized>(
        &mut self,
        container_available: bool,
        known_location: Option<Coordinate>,
        store: &mut S,
    ) -> bool {
        if self.phase != MapPhase::Uninitialized || !container_available {
            return false;
        }

        let center = known_location.unwrap_or(TERRITORIAL_DEFAULT);
        tracing::info!("Initializing map at {center}");
        match self.factory.create_instance(MapConfig::new(center, INITIAL_ZOOM)) {
            Ok(mut engine) => {
                engine.on(EventKind::Load, None);
                engine.on(EventKind::Error, None);
                self.engine = Some(engine);
                self.phase = MapPhase::Initializing;
                true
            }
            Err(err) => {
                tracing::error!("{}", AtlasError::EngineInitFailure(err));
                store.show_toast(MAP_INIT_FAILED, Severity::Error);
                self.phase = MapPhase::Failed;
                false
            }
        }
    }

    /// Route one engine signal
    pub fn handle_event<S: AtlasStore + ?Sized>(
        &mut self,
        event: MapEvent,
        known_location: Option<Coordinate>,
        store: &mut S,
        now: Instant,
    ) {
        profiling::scope!("MapLifecycleManager::handle_event");

        let Some(engine) = self.engine.as_mut() else {
            tracing::trace!("No engine, dropping {:?}", event.kind());
            return;
        };

        match (self.phase, event) {
            (MapPhase::Initializing | MapPhase::Ready, MapEvent::Error(err)) => {
                tracing::error!("Map error: {err}");
                if err.is_server_error() {
                    store.show_toast(MAP_LOAD_PROBLEM, Severity::Error);
                }
            }
            (MapPhase::Initializing, MapEvent::Load) => {
                let visited = visited_codes(store);
                if let Err(err) = setup_layers(engine, self.countries.clone(), &visited) {
                    tracing::error!("{}", AtlasError::LayerSetupFailure(err));
                    store.show_toast(MAP_DATA_FAILED, Severity::Error);
                } else {
                    self.applied_visited = visited;
                    tracing::info!("Map layers ready");
                }
                self.phase = MapPhase::Ready;
                if let Some(location) = known_location {
                    self.center_on_user(location);
                }
            }
            (MapPhase::Ready, MapEvent::PointerMove(e) | MapEvent::TouchStart(e)) => {
                if e.layer != COUNTRIES_FILL_LAYER {
                    return;
                }
                if let Some(feature) = e.features.first() {
                    self.highlight
                        .on_pointer_over_region(engine, feature.feature_id);
                }
            }
            (MapPhase::Ready, MapEvent::PointerEnter(e)) => {
                if e.layer == COUNTRIES_FILL_LAYER {
                    engine.set_cursor(CursorStyle::Pointer);
                }
            }
            (MapPhase::Ready, MapEvent::PointerLeave(e)) => {
                if e.layer == COUNTRIES_FILL_LAYER {
                    self.highlight.on_pointer_leave_region(engine);
                    engine.set_cursor(CursorStyle::Default);
                }
            }
            (MapPhase::Ready, MapEvent::TouchEnd(e)) => {
                if e.layer == COUNTRIES_FILL_LAYER {
                    self.highlight.schedule_delayed_clear(now);
                }
            }
            (MapPhase::Ready, MapEvent::Click(e)) => {
                if e.layer != COUNTRIES_FILL_LAYER {
                    return;
                }
                if let Some(feature) = e.features.first() {
                    self.selection
                        .on_region_activated(engine, feature, e.lng_lat);
                }
            }
            (MapPhase::Ready, MapEvent::PopupConfirmed(popup)) => {
                self.selection.confirm(engine, store, popup);
            }
            (MapPhase::Ready, MapEvent::PopupClosed(popup)) => {
                self.selection.on_popup_closed(popup);
            }
            (phase, event) => {
                tracing::debug!("Ignoring {:?} while {phase:?}", event.kind());
            }
        }
    }

    /// Reapply the fill color when the visited set changed
    pub fn sync_visited<S: AtlasStore + ?Sized>(&mut self, store: &S) {
        if self.phase != MapPhase::Ready {
            return;
        }
        let Some(engine) = self.engine.as_mut() else {
            return;
        };
        if !engine.has_layer(COUNTRIES_FILL_LAYER) {
            return;
        }

        let visited = visited_codes(store);
        if visited == self.applied_visited {
            return;
        }

        tracing::info!("Visited regions changed: {visited:?}");
        let rule = FillColorRule::for_visited(visited.iter().cloned());
        tracing::trace!("fill-color: {}", rule.to_expression());
        match engine.set_paint_property(COUNTRIES_FILL_LAYER, PaintProperty::FillColor(rule)) {
            Ok(()) => self.applied_visited = visited,
            Err(err) => tracing::error!("{}", AtlasError::StyleUpdateFailure(err)),
        }
    }

    /// Run time-based work such as the delayed touch clear
    pub fn tick(&mut self, now: Instant) {
        if self.phase != MapPhase::Ready {
            return;
        }
        if let Some(engine) = self.engine.as_mut() {
            self.highlight.tick(engine, now);
        }
    }

    /// Animate the camera; returns false when there is no live map
    pub fn fly_to(&mut self, center: Coordinate, options: FlyToOptions) -> bool {
        if !matches!(self.phase, MapPhase::Initializing | MapPhase::Ready) {
            return false;
        }
        match self.engine.as_mut() {
            Some(engine) => {
                tracing::debug!("Flying to {center} (zoom {})", options.zoom);
                engine.fly_to(center, options);
                true
            }
            None => false,
        }
    }

    /// Fly to the user's location and mark it
    pub fn center_on_user(&mut self, location: Coordinate) -> bool {
        if self.phase != MapPhase::Ready {
            return false;
        }
        if !self.fly_to(location, located_flight()) {
            return false;
        }
        self.place_user_marker(location);
        true
    }

    /// Put the user marker at `location`. There is at most one marker; later
    /// calls move it.
    pub fn place_user_marker(&mut self, location: Coordinate) {
        if self.phase != MapPhase::Ready {
            return;
        }
        let Some(engine) = self.engine.as_mut() else {
            return;
        };
        match self.user_marker {
            Some((_, at)) if at == location => {}
            Some((marker, _)) => {
                tracing::debug!("Moving user marker to {location}");
                engine.move_marker(marker, location);
                self.user_marker = Some((marker, location));
            }
            None => {
                let marker = engine.add_marker(location, MARKER_COLOR);
                self.user_marker = Some((marker, location));
            }
        }
    }

    /// Release the engine. Safe in every phase and safe to repeat.
    pub fn teardown(&mut self) {
        if let Some(mut engine) = self.engine.take() {
            tracing::info!("Tearing down map");
            if engine.has_layer(COUNTRIES_FILL_LAYER) {
                for kind in REGION_EVENTS {
                    engine.off(kind, Some(COUNTRIES_FILL_LAYER));
                }
            }
            engine.remove();
        }
        self.highlight.reset();
        self.selection.reset();
        self.applied_visited.clear();
        self.user_marker = None;
        self.phase = MapPhase::Destroyed;
    }
}

fn setup_layers<E: MapEngine + ?Sized>(
    engine: &mut E,
    countries: SourceData,
    visited: &BTreeSet<String>,
) -> EngineResult<()> {
    engine.add_source(
        COUNTRIES_SOURCE,
        GeoJsonSource {
            data: countries,
            generate_id: true,
        },
    )?;
    let color = FillColorRule::for_visited(visited.iter().cloned());
    let opacity = OpacityRule::default();
    tracing::trace!(
        "fill-color: {}, fill-opacity: {}",
        color.to_expression(),
        opacity.to_expression()
    );
    engine.add_layer(LayerDescriptor {
        id: COUNTRIES_FILL_LAYER.to_string(),
        source: COUNTRIES_SOURCE.to_string(),
        kind: LayerKind::Fill { color, opacity },
    })?;
    engine.add_layer(LayerDescriptor {
        id: COUNTRIES_OUTLINE_LAYER.to_string(),
        source: COUNTRIES_SOURCE.to_string(),
        kind: LayerKind::Line {
            color: OUTLINE_COLOR,
            width: 1.0,
        },
    })?;
    for kind in REGION_EVENTS {
        engine.on(kind, Some(COUNTRIES_FILL_LAYER));
    }
    Ok(())
}
