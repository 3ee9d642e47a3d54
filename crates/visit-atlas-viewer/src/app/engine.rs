//! walkers-backed map engine
//!
//! `WalkersEngine` keeps everything the interaction core asks of a map engine
//! (sources, layers, feature state, subscriptions, markers, popup, camera) and
//! renders it through [`RegionPlugin`]. Pointer input captured by the plugin comes
//! back as [`MapEvent`]s from [`WalkersEngine::poll_events`], filtered by the
//! current subscriptions. Remote sources are downloaded in the background and
//! swapped in when ready; failed downloads surface as [`MapEvent::Error`].

use crate::app::fetch::{Download, Downloader, spawn_download};
use crate::app::plugin::{LayerPaint, PointerFeedback, RegionPlugin, RegionSource};
use std::collections::{BTreeMap, BTreeSet, HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use visit_atlas_lib::engine::{
    CursorStyle, EngineError, EngineFactory, EngineResult, EventKind, FeatureId, FeatureState,
    FlyToOptions, GeoJsonSource, LayerDescriptor, LayerEvent, LayerKind, MapConfig, MapEngine,
    MapEvent, MarkerId, PaintProperty, PopupContent, PopupId, RasterSource, SourceData,
};
use visit_atlas_lib::style::Color;
use visit_atlas_lib::{Coordinate, RegionCatalog, RegionFeature, utils};
use walkers::TileId;
use walkers::sources::{Attribution, TileSource};

/// Raster tiles described by a [`RasterSource`] (`{z}/{x}/{y}` URL templates)
pub struct RasterTiles {
    templates: Vec<String>,
    max_zoom: u8,
}

impl RasterTiles {
    pub fn new(source: &RasterSource) -> Self {
        Self {
            templates: source.tiles.clone(),
            max_zoom: source.max_zoom,
        }
    }
}

impl TileSource for RasterTiles {
    fn tile_url(&self, tile_id: TileId) -> String {
        let template = match self.templates.len() {
            0 => return String::new(),
            n => &self.templates[(tile_id.x as usize + tile_id.y as usize) % n],
        };
        template
            .replace("{z}", &tile_id.zoom.to_string())
            .replace("{x}", &tile_id.x.to_string())
            .replace("{y}", &tile_id.y.to_string())
    }

    fn attribution(&self) -> Attribution {
        Attribution {
            text: "© OpenStreetMap contributors",
            url: "https://www.openstreetmap.org/copyright",
            logo_light: None,
            logo_dark: None,
        }
    }

    fn max_zoom(&self) -> u8 {
        self.max_zoom
    }
}

/// Creates [`WalkersEngine`]s, applying the viewer's preferred start zoom
pub struct WalkersFactory {
    initial_zoom: f64,
    downloader: Downloader,
}

impl WalkersFactory {
    pub fn new(initial_zoom: f64) -> Self {
        Self {
            initial_zoom,
            downloader: spawn_download,
        }
    }

    pub fn with_downloader(mut self, downloader: Downloader) -> Self {
        self.downloader = downloader;
        self
    }
}

impl EngineFactory for WalkersFactory {
    type Engine = WalkersEngine;

    fn create_instance(&mut self, mut config: MapConfig) -> EngineResult<WalkersEngine> {
        let base = &config.base_layer;
        if base.tiles.is_empty() {
            return Err(EngineError::Other("base layer has no tile URLs".to_string()));
        }
        if !(base.min_zoom as f64..=base.max_zoom as f64).contains(&self.initial_zoom) {
            return Err(EngineError::Other(format!(
                "zoom {} outside of the base layer range {}..={}",
                self.initial_zoom, base.min_zoom, base.max_zoom
            )));
        }
        config.zoom = self.initial_zoom;
        Ok(WalkersEngine::new(config).with_downloader(self.downloader))
    }
}

/// An animated camera move
#[derive(Debug, Clone)]
struct Flight {
    from: Coordinate,
    to: Coordinate,
    from_zoom: f64,
    to_zoom: f64,
    /// Extra zoom-out at the middle of the flight
    hump: f64,
    started: instant::Instant,
    duration: Duration,
}

impl Flight {
    fn new(
        from: Coordinate,
        from_zoom: f64,
        to: Coordinate,
        options: FlyToOptions,
        started: instant::Instant,
    ) -> Self {
        let distance = utils::distance_km(&from, &to);
        let speed = options.speed.max(0.1);
        let seconds = (0.6 + distance / 3000.0).min(3.5) / speed;
        Self {
            from,
            to,
            from_zoom,
            to_zoom: options.zoom,
            hump: (options.curve - 1.0).max(0.0) * (distance / 2000.0).min(3.0),
            started,
            duration: Duration::from_secs_f64(seconds),
        }
    }

    /// Camera at `now` and whether the flight is over
    fn sample(&self, now: instant::Instant) -> (Coordinate, f64, bool) {
        let elapsed = if now > self.started {
            now.duration_since(self.started)
        } else {
            Duration::ZERO
        };
        let t = (elapsed.as_secs_f64() / self.duration.as_secs_f64()).clamp(0.0, 1.0);
        let eased = t * t * (3.0 - 2.0 * t);
        let center = self.from.lerp(&self.to, eased);
        let zoom = self.from_zoom + (self.to_zoom - self.from_zoom) * eased
            - self.hump * (std::f64::consts::PI * t).sin();
        (center, zoom, t >= 1.0)
    }
}

#[derive(Debug, Clone)]
struct Camera {
    center: Coordinate,
    zoom: f64,
    /// The map widget still has to be moved to `center`/`zoom`
    pending_jump: bool,
    flight: Option<Flight>,
}

/// What the pointer looked like after the last processed frame
#[derive(Debug, Default)]
struct PointerState {
    frame: u64,
    hover: Option<Coordinate>,
    touching: bool,
    /// Features under the pointer per layer
    hits: BTreeMap<String, Vec<RegionFeature>>,
}

pub struct WalkersEngine {
    config: MapConfig,
    sources: HashMap<String, Arc<RegionSource>>,
    layers: Vec<LayerDescriptor>,
    feature_state: HashMap<(String, FeatureId), FeatureState>,
    subscriptions: BTreeSet<(EventKind, Option<String>)>,
    markers: Vec<(Coordinate, Color)>,
    popup: Option<(PopupId, PopupContent)>,
    next_popup: u64,
    cursor: CursorStyle,
    camera: Camera,
    feedback: Arc<RwLock<PointerFeedback>>,
    pointer: PointerState,
    queued: VecDeque<MapEvent>,
    downloader: Downloader,
    download_tx: UnboundedSender<Download>,
    downloads: UnboundedReceiver<Download>,
    /// Sources still being downloaded
    pending_sources: BTreeSet<String>,
    loaded: bool,
    removed: bool,
}

impl WalkersEngine {
    pub fn new(config: MapConfig) -> Self {
        let camera = Camera {
            center: config.center,
            zoom: config.zoom,
            pending_jump: true,
            flight: None,
        };
        let (download_tx, downloads) = mpsc::unbounded_channel();
        Self {
            config,
            sources: HashMap::new(),
            layers: Vec::new(),
            feature_state: HashMap::new(),
            subscriptions: BTreeSet::new(),
            markers: Vec::new(),
            popup: None,
            next_popup: 0,
            cursor: CursorStyle::Default,
            camera,
            feedback: Arc::new(RwLock::new(PointerFeedback::default())),
            pointer: PointerState::default(),
            queued: VecDeque::new(),
            downloader: spawn_download,
            download_tx,
            downloads,
            pending_sources: BTreeSet::new(),
            loaded: false,
            removed: false,
        }
    }

    pub fn config(&self) -> &MapConfig {
        &self.config
    }

    pub fn cursor(&self) -> CursorStyle {
        self.cursor
    }

    pub fn popup(&self) -> Option<(PopupId, &PopupContent)> {
        self.popup.as_ref().map(|(id, content)| (*id, content))
    }

    pub fn with_downloader(mut self, downloader: Downloader) -> Self {
        self.downloader = downloader;
        self
    }

    pub fn is_flying(&self) -> bool {
        self.camera.flight.is_some()
    }

    /// Whether a remote source is still being downloaded
    pub fn is_downloading(&self) -> bool {
        !self.pending_sources.is_empty()
    }

    /// Queue a signal produced by the UI (popup buttons)
    pub fn push_event(&mut self, event: MapEvent) {
        if let MapEvent::PopupClosed(id) = event
            && self.popup.as_ref().is_some_and(|(open, _)| *open == id)
        {
            self.popup = None;
        }
        self.queued.push_back(event);
    }

    /// Render snapshot for the current frame
    pub fn plugin(&self) -> RegionPlugin {
        let layers = self
            .layers
            .iter()
            .filter_map(|layer| {
                let source = self.sources.get(&layer.source)?.clone();
                Some(match &layer.kind {
                    LayerKind::Fill { color, opacity } => LayerPaint::Fill {
                        hovered: self.hovered(&layer.source),
                        source,
                        color: color.clone(),
                        opacity: *opacity,
                    },
                    LayerKind::Line { color, width } => LayerPaint::Line {
                        source,
                        color: *color,
                        width: *width,
                    },
                })
            })
            .collect();
        RegionPlugin::new(layers, self.markers.clone(), Arc::clone(&self.feedback))
            .with_popup_anchor(self.popup.as_ref().map(|(_, content)| content.anchor))
    }

    /// Where the open popup was anchored on screen during the last render
    pub fn popup_screen_pos(&self) -> Option<egui::Pos2> {
        self.popup.as_ref()?;
        self.feedback.try_read().ok()?.popup_pos
    }

    fn hovered(&self, source: &str) -> BTreeSet<FeatureId> {
        self.feature_state
            .iter()
            .filter(|((s, _), state)| s == source && state.hover)
            .map(|((_, id), _)| *id)
            .collect()
    }

    /// Where the map widget should be moved this frame, if anywhere
    pub fn camera_update(&mut self, now: instant::Instant) -> Option<(Coordinate, f64)> {
        if let Some(flight) = &self.camera.flight {
            let (center, zoom, done) = flight.sample(now);
            let zoom = self.clamp_zoom(zoom);
            self.camera.center = center;
            self.camera.zoom = zoom;
            if done {
                tracing::trace!("Flight to {center} finished");
                self.camera.flight = None;
            }
            return Some((center, zoom));
        }
        if self.camera.pending_jump {
            self.camera.pending_jump = false;
            return Some((self.camera.center, self.camera.zoom));
        }
        None
    }

    /// Camera as left by the user (dragging, zooming)
    pub fn observe_camera(&mut self, center: Coordinate, zoom: f64) {
        if self.camera.flight.is_none() && !self.camera.pending_jump {
            self.camera.center = center;
            self.camera.zoom = zoom;
        }
    }

    fn clamp_zoom(&self, zoom: f64) -> f64 {
        zoom.clamp(
            self.config.base_layer.min_zoom as f64,
            self.config.base_layer.max_zoom as f64,
        )
    }

    fn subscribed(&self, kind: EventKind, layer: Option<&str>) -> bool {
        self.subscriptions
            .contains(&(kind, layer.map(str::to_string)))
    }

    /// Turn the last frame's pointer feedback into subscribed events, followed by
    /// queued UI signals
    pub fn poll_events(&mut self) -> Vec<MapEvent> {
        profiling::scope!("WalkersEngine::poll_events");

        let mut events = Vec::new();
        if self.removed {
            self.queued.clear();
            return events;
        }

        self.finish_downloads(&mut events);

        // Use try_write: the plugin holds the lock only while painting
        let frame = match self.feedback.try_write() {
            Ok(mut feedback) => {
                let frame = feedback.clone();
                feedback.clicked = None;
                Some(frame)
            }
            Err(_) => None,
        };

        if let Some(frame) = frame
            && frame.frame != self.pointer.frame
        {
            if !self.loaded {
                self.loaded = true;
                if self.subscribed(EventKind::Load, None) {
                    events.push(MapEvent::Load);
                }
            }
            self.pointer_events(&frame, &mut events);
            if let Some(at) = frame.clicked {
                self.close_popup_on_empty_click(&at, &mut events);
            }
            self.pointer.frame = frame.frame;
            self.pointer.hover = frame.hover;
            self.pointer.touching = frame.touching;
        }

        events.extend(self.queued.drain(..));
        events
    }

    fn finish_downloads(&mut self, events: &mut Vec<MapEvent>) {
        while let Ok(Download { source_id, result }) = self.downloads.try_recv() {
            if !self.pending_sources.remove(&source_id) {
                tracing::debug!("Ignoring download for unknown source `{source_id}`");
                continue;
            }
            match result {
                Ok(source) => {
                    tracing::info!(
                        "Source `{source_id}` loaded with {} regions",
                        source.catalog().len()
                    );
                    self.feature_state.retain(|(s, _), _| *s != source_id);
                    self.pointer.hits.clear();
                    self.sources.insert(source_id, Arc::new(source));
                }
                Err(err) => {
                    tracing::error!("Source `{source_id}` failed to load: {err}");
                    if self.subscribed(EventKind::Error, None) {
                        events.push(MapEvent::Error(err));
                    }
                }
            }
        }
    }

    /// Clicking the map outside every region dismisses the open popup
    fn close_popup_on_empty_click(&mut self, at: &Coordinate, events: &mut Vec<MapEvent>) {
        if self.popup.is_none() {
            return;
        }
        let on_region = self
            .layers
            .iter()
            .filter(|l| matches!(l.kind, LayerKind::Fill { .. }))
            .filter_map(|l| self.sources.get(&l.source))
            .any(|source| !source.catalog().hit_test(at).is_empty());
        if on_region {
            return;
        }
        if let Some((popup, _)) = self.popup.take() {
            tracing::debug!("Popup {popup:?} closed by a click at {at}");
            events.push(MapEvent::PopupClosed(popup));
        }
    }

    fn pointer_events(&mut self, frame: &PointerFeedback, events: &mut Vec<MapEvent>) {
        let fill_layers: Vec<(String, Arc<RegionSource>)> = self
            .layers
            .iter()
            .filter(|l| matches!(l.kind, LayerKind::Fill { .. }))
            .filter_map(|l| Some((l.id.clone(), self.sources.get(&l.source)?.clone())))
            .collect();

        for (layer, source) in fill_layers {
            let hits = frame
                .hover
                .map(|at| features_at(source.catalog(), &at))
                .unwrap_or_default();
            let previous = self.pointer.hits.remove(&layer).unwrap_or_default();
            let moved = frame.hover != self.pointer.hover;

            let event = |features: Vec<RegionFeature>, lng_lat: Coordinate| LayerEvent {
                layer: layer.clone(),
                features,
                lng_lat,
            };

            if let Some(at) = frame.hover
                && !hits.is_empty()
            {
                if previous.is_empty() && self.subscribed(EventKind::PointerEnter, Some(&layer)) {
                    events.push(MapEvent::PointerEnter(event(hits.clone(), at)));
                }
                if moved && self.subscribed(EventKind::PointerMove, Some(&layer)) {
                    events.push(MapEvent::PointerMove(event(hits.clone(), at)));
                }
                if frame.touching
                    && !self.pointer.touching
                    && self.subscribed(EventKind::TouchStart, Some(&layer))
                {
                    events.push(MapEvent::TouchStart(event(hits.clone(), at)));
                }
            }

            let last_position = frame.hover.or(self.pointer.hover);
            if hits.is_empty()
                && !previous.is_empty()
                && let Some(at) = last_position
                && self.subscribed(EventKind::PointerLeave, Some(&layer))
            {
                events.push(MapEvent::PointerLeave(event(Vec::new(), at)));
            }

            if !frame.touching
                && self.pointer.touching
                && let Some(at) = last_position
            {
                let touched = if hits.is_empty() { &previous } else { &hits };
                if !touched.is_empty() && self.subscribed(EventKind::TouchEnd, Some(&layer)) {
                    events.push(MapEvent::TouchEnd(event(touched.clone(), at)));
                }
            }

            if let Some(at) = frame.clicked {
                let clicked = features_at(source.catalog(), &at);
                if !clicked.is_empty() && self.subscribed(EventKind::Click, Some(&layer)) {
                    events.push(MapEvent::Click(event(clicked, at)));
                }
            }

            self.pointer.hits.insert(layer, hits);
        }
    }
}

/// Features under `at`, topmost (last drawn) first
fn features_at(catalog: &RegionCatalog, at: &Coordinate) -> Vec<RegionFeature> {
    catalog
        .hit_test(at)
        .into_iter()
        .map(|region| region.feature.clone())
        .collect()
}

/// Load local source data; remote data is handled by the caller
fn load_catalog(data: &SourceData, generate_id: bool) -> EngineResult<RegionCatalog> {
    let text = match data {
        SourceData::Inline(text) => text.clone(),
        SourceData::Path(path) => std::fs::read_to_string(path).map_err(|e| {
            EngineError::SourceUnavailable(format!("{}: {}", path.display(), e))
        })?,
        SourceData::Url(_) => return Ok(RegionCatalog::default()),
    };
    RegionCatalog::from_geojson(&text, generate_id)
        .map_err(|e| EngineError::SourceUnavailable(e.to_string()))
}

impl MapEngine for WalkersEngine {
    fn add_source(&mut self, id: &str, source: GeoJsonSource) -> EngineResult<()> {
        if self.sources.contains_key(id) {
            return Err(EngineError::DuplicateSource(id.to_string()));
        }
        let catalog = load_catalog(&source.data, source.generate_id)?;
        if let SourceData::Url(url) = source.data {
            // Empty until the download finishes
            tracing::info!("Source `{id}` downloading from {url}");
            self.pending_sources.insert(id.to_string());
            (self.downloader)(id.to_string(), url, source.generate_id, self.download_tx.clone());
        } else {
            tracing::info!("Source `{id}` loaded with {} regions", catalog.len());
        }
        self.sources
            .insert(id.to_string(), Arc::new(RegionSource::new(catalog)));
        Ok(())
    }

    fn add_layer(&mut self, layer: LayerDescriptor) -> EngineResult<()> {
        if !self.sources.contains_key(&layer.source) {
            return Err(EngineError::SourceNotFound(layer.source));
        }
        if self.has_layer(&layer.id) {
            return Err(EngineError::DuplicateLayer(layer.id));
        }
        tracing::debug!("Adding layer `{}`", layer.id);
        self.layers.push(layer);
        Ok(())
    }

    fn has_layer(&self, id: &str) -> bool {
        self.layers.iter().any(|l| l.id == id)
    }

    fn set_feature_state(
        &mut self,
        source: &str,
        feature: FeatureId,
        state: FeatureState,
    ) -> EngineResult<()> {
        let loaded = self
            .sources
            .get(source)
            .ok_or_else(|| EngineError::SourceNotFound(source.to_string()))?;
        if loaded.catalog().get(feature).is_none() {
            return Err(EngineError::FeatureNotFound {
                source_id: source.to_string(),
                feature,
            });
        }
        if state == FeatureState::default() {
            self.feature_state.remove(&(source.to_string(), feature));
        } else {
            self.feature_state.insert((source.to_string(), feature), state);
        }
        Ok(())
    }

    fn set_paint_property(&mut self, layer: &str, property: PaintProperty) -> EngineResult<()> {
        let target = self
            .layers
            .iter_mut()
            .find(|l| l.id == layer)
            .ok_or_else(|| EngineError::LayerNotFound(layer.to_string()))?;
        match (&mut target.kind, property) {
            (LayerKind::Fill { color, .. }, PaintProperty::FillColor(rule)) => *color = rule,
            (LayerKind::Fill { opacity, .. }, PaintProperty::FillOpacity(rule)) => *opacity = rule,
            (LayerKind::Line { color, .. }, PaintProperty::LineColor(value)) => *color = value,
            (LayerKind::Line { width, .. }, PaintProperty::LineWidth(value)) => *width = value,
            (_, property) => {
                return Err(EngineError::Other(format!(
                    "`{}` does not apply to layer `{layer}`",
                    property.name()
                )));
            }
        }
        Ok(())
    }

    fn on(&mut self, event: EventKind, layer: Option<&str>) {
        self.subscriptions.insert((event, layer.map(str::to_string)));
    }

    fn off(&mut self, event: EventKind, layer: Option<&str>) {
        self.subscriptions
            .remove(&(event, layer.map(str::to_string)));
    }

    fn fly_to(&mut self, center: Coordinate, options: FlyToOptions) {
        let options = FlyToOptions {
            zoom: self.clamp_zoom(options.zoom),
            ..options
        };
        self.camera.pending_jump = false;
        self.camera.flight = Some(Flight::new(
            self.camera.center,
            self.camera.zoom,
            center,
            options,
            instant::Instant::now(),
        ));
    }

    fn add_marker(&mut self, at: Coordinate, color: Color) -> MarkerId {
        self.markers.push((at, color));
        MarkerId(self.markers.len() as u64 - 1)
    }

    fn move_marker(&mut self, marker: MarkerId, to: Coordinate) {
        match self.markers.get_mut(marker.0 as usize) {
            Some((at, _)) => *at = to,
            None => tracing::warn!("Unknown marker {marker:?}"),
        }
    }

    fn set_cursor(&mut self, cursor: CursorStyle) {
        self.cursor = cursor;
    }

    fn open_popup(&mut self, popup: PopupContent) -> PopupId {
        self.next_popup += 1;
        let id = PopupId(self.next_popup);
        self.popup = Some((id, popup));
        id
    }

    fn close_popup(&mut self, popup: PopupId) {
        if self.popup.as_ref().is_some_and(|(open, _)| *open == popup) {
            self.popup = None;
        }
    }

    fn remove(&mut self) {
        tracing::debug!("Removing map engine");
        self.sources.clear();
        self.layers.clear();
        self.feature_state.clear();
        self.subscriptions.clear();
        self.markers.clear();
        self.popup = None;
        self.camera.flight = None;
        self.queued.clear();
        self.pending_sources.clear();
        self.removed = true;
    }
}
