//! Map engine capability interface
//!
//! The interaction core never renders anything itself. It drives an engine through
//! [`MapEngine`] (sources, layers, per-feature state, paint properties, event
//! subscriptions, camera, markers, popups) and receives the engine's pointer, touch and
//! lifecycle signals as [`MapEvent`] values.

use crate::style::{Color, FillColorRule, OpacityRule};
use crate::{Coordinate, RegionFeature};
use std::fmt;
use std::path::PathBuf;

pub type EngineResult<T> = std::result::Result<T, EngineError>;

/// Errors reported by a map engine
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum EngineError {
    #[error("source `{0}` not found")]
    SourceNotFound(String),

    #[error("source `{0}` already exists")]
    DuplicateSource(String),

    #[error("layer `{0}` not found")]
    LayerNotFound(String),

    #[error("layer `{0}` already exists")]
    DuplicateLayer(String),

    #[error("feature {feature} not found in source `{source_id}`")]
    FeatureNotFound { source_id: String, feature: FeatureId },

    #[error("source data unavailable: {0}")]
    SourceUnavailable(String),

    #[error("request failed with HTTP status {status}: {message}")]
    Http { status: u16, message: String },

    #[error("{0}")]
    Other(String),
}

impl EngineError {
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Http { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Server-class (5xx) failures deserve a user-visible notification
    pub fn is_server_error(&self) -> bool {
        self.status().is_some_and(|s| s >= 500)
    }
}

/// Engine-assigned feature identifier, stable only within one load of a source
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FeatureId(pub u64);

impl fmt::Display for FeatureId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Transient per-feature state
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FeatureState {
    pub hover: bool,
}

/// Base raster tile layer
#[derive(Debug, Clone, PartialEq)]
pub struct RasterSource {
    pub tiles: Vec<String>,
    pub tile_size: u32,
    pub attribution: String,
    pub min_zoom: u8,
    pub max_zoom: u8,
}

impl RasterSource {
    pub fn openstreetmap() -> Self {
        Self {
            tiles: ["a", "b", "c"]
                .iter()
                .map(|host| format!("https://{host}.tile.openstreetmap.org/{{z}}/{{x}}/{{y}}.png"))
                .collect(),
            tile_size: 256,
            attribution: "© OpenStreetMap contributors".to_string(),
            min_zoom: 0,
            max_zoom: 19,
        }
    }
}

/// Everything needed to construct an engine instance
#[derive(Debug, Clone, PartialEq)]
pub struct MapConfig {
    pub base_layer: RasterSource,
    pub center: Coordinate,
    pub zoom: f64,
    pub touch_zoom_rotate: bool,
    pub drag_pan: bool,
    pub double_click_zoom: bool,
}

impl MapConfig {
    pub fn new(center: Coordinate, zoom: f64) -> Self {
        Self {
            base_layer: RasterSource::openstreetmap(),
            center,
            zoom,
            touch_zoom_rotate: true,
            drag_pan: true,
            double_click_zoom: true,
        }
    }
}

/// Where GeoJSON source data comes from
#[derive(Debug, Clone, PartialEq)]
pub enum SourceData {
    Url(String),
    Path(PathBuf),
    Inline(String),
}

/// GeoJSON geometry source
#[derive(Debug, Clone, PartialEq)]
pub struct GeoJsonSource {
    pub data: SourceData,
    /// Let the engine assign feature ids (required for feature state)
    pub generate_id: bool,
}

/// Layer paint definition
#[derive(Debug, Clone, PartialEq)]
pub enum LayerKind {
    Fill {
        color: FillColorRule,
        opacity: OpacityRule,
    },
    Line {
        color: Color,
        width: f32,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct LayerDescriptor {
    pub id: String,
    pub source: String,
    pub kind: LayerKind,
}

/// A single paint property update
#[derive(Debug, Clone, PartialEq)]
pub enum PaintProperty {
    FillColor(FillColorRule),
    FillOpacity(OpacityRule),
    LineColor(Color),
    LineWidth(f32),
}

impl PaintProperty {
    pub fn name(&self) -> &'static str {
        match self {
            Self::FillColor(_) => "fill-color",
            Self::FillOpacity(_) => "fill-opacity",
            Self::LineColor(_) => "line-color",
            Self::LineWidth(_) => "line-width",
        }
    }
}

/// Camera flight parameters
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FlyToOptions {
    pub zoom: f64,
    pub speed: f64,
    pub curve: f64,
}

impl FlyToOptions {
    pub fn new(zoom: f64) -> Self {
        Self {
            zoom,
            speed: 1.2,
            curve: 1.42,
        }
    }

    pub fn with_speed(mut self, speed: f64) -> Self {
        self.speed = speed;
        self
    }

    pub fn with_curve(mut self, curve: f64) -> Self {
        self.curve = curve;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CursorStyle {
    #[default]
    Default,
    Pointer,
}

/// Handle of a placed marker
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MarkerId(pub u64);

/// Handle of an open popup
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PopupId(pub u64);

/// Popup contents; the confirm button is part of the popup from the start
#[derive(Debug, Clone, PartialEq)]
pub struct PopupContent {
    pub anchor: Coordinate,
    pub title: String,
    pub confirm_label: String,
}

/// Event names that can be subscribed to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum EventKind {
    Load,
    Error,
    PointerMove,
    PointerEnter,
    PointerLeave,
    TouchStart,
    TouchEnd,
    Click,
}

/// Pointer or touch interaction with a layer
#[derive(Debug, Clone, PartialEq)]
pub struct LayerEvent {
    pub layer: String,
    /// Features under the pointer, topmost first
    pub features: Vec<RegionFeature>,
    pub lng_lat: Coordinate,
}

/// Signals emitted by an engine
#[derive(Debug, Clone, PartialEq)]
pub enum MapEvent {
    /// Style and tiles are loaded
    Load,
    Error(EngineError),
    PointerMove(LayerEvent),
    PointerEnter(LayerEvent),
    PointerLeave(LayerEvent),
    TouchStart(LayerEvent),
    TouchEnd(LayerEvent),
    Click(LayerEvent),
    PopupConfirmed(PopupId),
    PopupClosed(PopupId),
}

impl MapEvent {
    /// Subscription kind, `None` for popup signals which are always delivered
    pub fn kind(&self) -> Option<EventKind> {
        match self {
            Self::Load => Some(EventKind::Load),
            Self::Error(_) => Some(EventKind::Error),
            Self::PointerMove(_) => Some(EventKind::PointerMove),
            Self::PointerEnter(_) => Some(EventKind::PointerEnter),
            Self::PointerLeave(_) => Some(EventKind::PointerLeave),
            Self::TouchStart(_) => Some(EventKind::TouchStart),
            Self::TouchEnd(_) => Some(EventKind::TouchEnd),
            Self::Click(_) => Some(EventKind::Click),
            Self::PopupConfirmed(_) | Self::PopupClosed(_) => None,
        }
    }

    pub fn layer(&self) -> Option<&str> {
        match self {
            Self::PointerMove(e)
            | Self::PointerEnter(e)
            | Self::PointerLeave(e)
            | Self::TouchStart(e)
            | Self::TouchEnd(e)
            | Self::Click(e) => Some(&e.layer),
            _ => None,
        }
    }
}

/// A live map engine instance
pub trait MapEngine {
    fn add_source(&mut self, id: &str, source: GeoJsonSource) -> EngineResult<()>;

    fn add_layer(&mut self, layer: LayerDescriptor) -> EngineResult<()>;

    fn has_layer(&self, id: &str) -> bool;

    fn set_feature_state(
        &mut self,
        source: &str,
        feature: FeatureId,
        state: FeatureState,
    ) -> EngineResult<()>;

    fn set_paint_property(&mut self, layer: &str, property: PaintProperty) -> EngineResult<()>;

    /// Subscribe to an event, optionally restricted to one layer
    fn on(&mut self, event: EventKind, layer: Option<&str>);

    fn off(&mut self, event: EventKind, layer: Option<&str>);

    fn fly_to(&mut self, center: Coordinate, options: FlyToOptions);

    fn add_marker(&mut self, at: Coordinate, color: Color) -> MarkerId;

    fn move_marker(&mut self, marker: MarkerId, to: Coordinate);

    fn set_cursor(&mut self, cursor: CursorStyle);

    fn open_popup(&mut self, popup: PopupContent) -> PopupId;

    fn close_popup(&mut self, popup: PopupId);

    /// Release the instance; no other call is valid afterwards
    fn remove(&mut self);
}

/// Creates engine instances
pub trait EngineFactory {
    type Engine: MapEngine;

    fn create_instance(&mut self, config: MapConfig) -> EngineResult<Self::Engine>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_server_error_detection() {
        let server = EngineError::Http {
            status: 503,
            message: "unavailable".into(),
        };
        let client = EngineError::Http {
            status: 404,
            message: "missing".into(),
        };
        assert!(server.is_server_error());
        assert!(!client.is_server_error());
        assert!(!EngineError::Other("x".into()).is_server_error());
    }

    #[test]
    fn test_osm_raster_source() {
        let source = RasterSource::openstreetmap();
        assert_eq!(source.tiles.len(), 3);
        assert_eq!(
            source.tiles[0],
            "https://a.tile.openstreetmap.org/{z}/{x}/{y}.png"
        );
        assert_eq!(source.tile_size, 256);
        assert_eq!(source.max_zoom, 19);
    }

    #[test]
    fn test_paint_property_names() {
        assert_eq!(
            PaintProperty::FillColor(FillColorRule::for_visited(Vec::<String>::new())).name(),
            "fill-color"
        );
        assert_eq!(PaintProperty::LineWidth(1.0).name(), "line-width");
    }

    #[test]
    fn test_popup_events_have_no_kind() {
        assert_eq!(MapEvent::PopupClosed(PopupId(1)).kind(), None);
        assert_eq!(MapEvent::Load.kind(), Some(EventKind::Load));
    }
}
