//! Recording doubles for the engine, the store and the platform location API

use crate::engine::{
    CursorStyle, EngineError, EngineFactory, EngineResult, EventKind, FeatureId, FeatureState,
    FlyToOptions, GeoJsonSource, LayerDescriptor, MapConfig, MapEngine, MarkerId,
    PaintProperty, PopupContent, PopupId,
};
use crate::style::Color;
use crate::{
    AtlasStore, Coordinate, LocationApi, LocationOptions, PlaceInfo, PlatformError,
    PositionCallback, PositionErrorCode, PositionReading, RegionFeature, Severity,
};
use std::cell::{Cell, Ref, RefCell, RefMut};
use std::collections::BTreeSet;
use std::rc::Rc;

/// What the platform does with a request
#[derive(Debug, Clone)]
pub enum LocationScript {
    /// Answer synchronously
    Answer(Result<PositionReading, PositionErrorCode>),
    /// Refuse to issue the request (the callback is dropped)
    Fail(PlatformError),
    /// Answer, then report an error anyway
    AnswerThenFail(Result<PositionReading, PositionErrorCode>),
    /// Accept the request and never answer
    Drop,
    /// Keep the callback for the test to call later
    Defer,
}

pub struct ScriptedLocationApi {
    supported: bool,
    script: LocationScript,
    deferred: Rc<RefCell<Option<PositionCallback>>>,
    requests: Cell<usize>,
}

impl ScriptedLocationApi {
    pub fn new(supported: bool, script: LocationScript) -> Self {
        Self {
            supported,
            script,
            deferred: Rc::new(RefCell::new(None)),
            requests: Cell::new(0),
        }
    }

    pub fn unsupported() -> Self {
        Self::new(false, LocationScript::Drop)
    }

    pub fn answering(answer: Result<PositionReading, PositionErrorCode>) -> Self {
        Self::new(true, LocationScript::Answer(answer))
    }

    pub fn deferred(&self) -> Rc<RefCell<Option<PositionCallback>>> {
        Rc::clone(&self.deferred)
    }

    pub fn requests(&self) -> usize {
        self.requests.get()
    }
}

impl LocationApi for ScriptedLocationApi {
    fn is_supported(&self) -> bool {
        self.supported
    }

    fn current_position(
        &self,
        _options: &LocationOptions,
        callback: PositionCallback,
    ) -> Result<(), PlatformError> {
        self.requests.set(self.requests.get() + 1);
        match self.script.clone() {
            LocationScript::Answer(answer) => {
                callback(answer);
                Ok(())
            }
            LocationScript::Fail(err) => {
                drop(callback);
                Err(err)
            }
            LocationScript::AnswerThenFail(answer) => {
                callback(answer);
                Err(PlatformError("late failure".to_string()))
            }
            LocationScript::Drop => {
                drop(callback);
                Ok(())
            }
            LocationScript::Defer => {
                *self.deferred.borrow_mut() = Some(callback);
                Ok(())
            }
        }
    }
}

/// Engine operations in call order
#[derive(Debug, Clone, PartialEq)]
pub enum EngineCall {
    AddSource(String, GeoJsonSource),
    AddLayer(LayerDescriptor),
    SetFeatureState(FeatureId, FeatureState),
    SetPaintProperty(String, PaintProperty),
    On(EventKind, Option<String>),
    Off(EventKind, Option<String>),
    FlyTo(Coordinate, FlyToOptions),
    AddMarker(Coordinate, Color),
    MoveMarker(MarkerId, Coordinate),
    SetCursor(CursorStyle),
    OpenPopup(PopupId, PopupContent),
    ClosePopup(PopupId),
    Remove,
}

#[derive(Debug, Default)]
pub struct EngineLog {
    pub configs: Vec<MapConfig>,
    pub calls: Vec<EngineCall>,
    pub sources: BTreeSet<String>,
    pub layers: BTreeSet<String>,
    pub subscriptions: BTreeSet<(EventKind, Option<String>)>,
    pub hovered: BTreeSet<FeatureId>,
    pub max_hovered: usize,
    /// Features the engine reports as missing
    pub missing_features: BTreeSet<FeatureId>,
    /// Error returned by `add_source`
    pub fail_sources: Option<EngineError>,
    pub open_popups: Vec<PopupId>,
    pub next_popup: u64,
    pub cursor: CursorStyle,
    pub removed: bool,
}

#[derive(Debug, Default)]
pub struct RecordingEngine {
    log: Rc<RefCell<EngineLog>>,
}

impl RecordingEngine {
    pub fn log(&self) -> Ref<'_, EngineLog> {
        self.log.borrow()
    }

    pub fn log_mut(&self) -> RefMut<'_, EngineLog> {
        self.log.borrow_mut()
    }

    pub fn hovered(&self) -> Vec<FeatureId> {
        self.log.borrow().hovered.iter().copied().collect()
    }

    pub fn open_popups(&self) -> Vec<PopupId> {
        self.log.borrow().open_popups.clone()
    }

    fn record(&self, call: EngineCall) {
        self.log.borrow_mut().calls.push(call);
    }
}

impl MapEngine for RecordingEngine {
    fn add_source(&mut self, id: &str, source: GeoJsonSource) -> EngineResult<()> {
        self.record(EngineCall::AddSource(id.to_string(), source));
        let mut log = self.log.borrow_mut();
        if let Some(err) = log.fail_sources.clone() {
            return Err(err);
        }
        if !log.sources.insert(id.to_string()) {
            return Err(EngineError::DuplicateSource(id.to_string()));
        }
        Ok(())
    }

    fn add_layer(&mut self, layer: LayerDescriptor) -> EngineResult<()> {
        self.record(EngineCall::AddLayer(layer.clone()));
        let mut log = self.log.borrow_mut();
        if !log.sources.contains(&layer.source) {
            return Err(EngineError::SourceNotFound(layer.source));
        }
        if !log.layers.insert(layer.id.clone()) {
            return Err(EngineError::DuplicateLayer(layer.id));
        }
        Ok(())
    }

    fn has_layer(&self, id: &str) -> bool {
        self.log.borrow().layers.contains(id)
    }

    fn set_feature_state(
        &mut self,
        source: &str,
        feature: FeatureId,
        state: FeatureState,
    ) -> EngineResult<()> {
        self.record(EngineCall::SetFeatureState(feature, state));
        let mut log = self.log.borrow_mut();
        if log.missing_features.contains(&feature) {
            return Err(EngineError::FeatureNotFound {
                source_id: source.to_string(),
                feature,
            });
        }
        if state.hover {
            log.hovered.insert(feature);
        } else {
            log.hovered.remove(&feature);
        }
        log.max_hovered = log.max_hovered.max(log.hovered.len());
        Ok(())
    }

    fn set_paint_property(&mut self, layer: &str, property: PaintProperty) -> EngineResult<()> {
        self.record(EngineCall::SetPaintProperty(layer.to_string(), property));
        if self.has_layer(layer) {
            Ok(())
        } else {
            Err(EngineError::LayerNotFound(layer.to_string()))
        }
    }

    fn on(&mut self, event: EventKind, layer: Option<&str>) {
        let layer = layer.map(str::to_string);
        self.record(EngineCall::On(event, layer.clone()));
        self.log.borrow_mut().subscriptions.insert((event, layer));
    }

    fn off(&mut self, event: EventKind, layer: Option<&str>) {
        let layer = layer.map(str::to_string);
        self.record(EngineCall::Off(event, layer.clone()));
        self.log.borrow_mut().subscriptions.remove(&(event, layer));
    }

    fn fly_to(&mut self, center: Coordinate, options: FlyToOptions) {
        self.record(EngineCall::FlyTo(center, options));
    }

    fn add_marker(&mut self, at: Coordinate, color: Color) -> MarkerId {
        self.record(EngineCall::AddMarker(at, color));
        let markers = self
            .log
            .borrow()
            .calls
            .iter()
            .filter(|c| matches!(c, EngineCall::AddMarker(..)))
            .count();
        MarkerId(markers as u64)
    }

    fn move_marker(&mut self, marker: MarkerId, to: Coordinate) {
        self.record(EngineCall::MoveMarker(marker, to));
    }

    fn set_cursor(&mut self, cursor: CursorStyle) {
        self.record(EngineCall::SetCursor(cursor));
        self.log.borrow_mut().cursor = cursor;
    }

    fn open_popup(&mut self, popup: PopupContent) -> PopupId {
        let id = {
            let mut log = self.log.borrow_mut();
            log.next_popup += 1;
            let id = PopupId(log.next_popup);
            log.open_popups.push(id);
            id
        };
        self.record(EngineCall::OpenPopup(id, popup));
        id
    }

    fn close_popup(&mut self, popup: PopupId) {
        self.record(EngineCall::ClosePopup(popup));
        self.log.borrow_mut().open_popups.retain(|p| *p != popup);
    }

    fn remove(&mut self) {
        self.record(EngineCall::Remove);
        self.log.borrow_mut().removed = true;
    }
}

/// Hands out [`RecordingEngine`]s that all write into one shared log
#[derive(Debug, Default)]
pub struct RecordingFactory {
    log: Rc<RefCell<EngineLog>>,
    fail: bool,
}

impl RecordingFactory {
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub fn log(&self) -> Ref<'_, EngineLog> {
        self.log.borrow()
    }

    pub fn shared_log(&self) -> Rc<RefCell<EngineLog>> {
        Rc::clone(&self.log)
    }
}

impl EngineFactory for RecordingFactory {
    type Engine = RecordingEngine;

    fn create_instance(&mut self, config: MapConfig) -> EngineResult<Self::Engine> {
        self.log.borrow_mut().configs.push(config);
        if self.fail {
            return Err(EngineError::Other("no rendering context".to_string()));
        }
        Ok(RecordingEngine {
            log: Rc::clone(&self.log),
        })
    }
}

#[derive(Debug, Default)]
pub struct RecordingStore {
    pub visited: Vec<PlaceInfo>,
    pub marked: Vec<PlaceInfo>,
    pub toasts: Vec<(String, Severity)>,
}

impl AtlasStore for RecordingStore {
    fn visited_places(&self) -> &[PlaceInfo] {
        &self.visited
    }

    fn mark_place_as_visited(&mut self, place: PlaceInfo) {
        self.marked.push(place.clone());
        self.visited.push(place);
    }

    fn show_toast(&mut self, message: &str, severity: Severity) {
        self.toasts.push((message.to_string(), severity));
    }
}

pub fn place(code: &str, name: &str) -> PlaceInfo {
    PlaceInfo {
        unique_id: code.to_string(),
        place_name: name.to_string(),
        admin_level: crate::region::COUNTRY_ADMIN_LEVEL.to_string(),
        country_code_iso: code.to_string(),
    }
}

pub fn region(id: u64, code: &str, name: &str) -> RegionFeature {
    RegionFeature {
        feature_id: FeatureId(id),
        region_id: code.to_string(),
        display_name: name.to_string(),
    }
}

/// Two rough country boxes: Japan (around Tokyo) and France
pub fn sample_geojson() -> String {
    r#"{
        "type": "FeatureCollection",
        "features": [
            {
                "type": "Feature",
                "properties": { "ISO_A2": "JP", "ADMIN": "Japan" },
                "geometry": {
                    "type": "MultiPolygon",
                    "coordinates": [
                        [[[138.0, 34.0], [141.0, 34.0], [141.0, 37.0], [138.0, 37.0], [138.0, 34.0]]],
                        [[[129.0, 31.0], [132.0, 31.0], [132.0, 34.0], [129.0, 34.0], [129.0, 31.0]]]
                    ]
                }
            },
            {
                "type": "Feature",
                "properties": { "ISO_A2": "FR", "ADMIN": "France" },
                "geometry": {
                    "type": "Polygon",
                    "coordinates": [
                        [[-4.5, 43.0], [7.5, 43.0], [7.5, 50.5], [-4.5, 50.5], [-4.5, 43.0]]
                    ]
                }
            }
        ]
    }"#
    .to_string()
}
