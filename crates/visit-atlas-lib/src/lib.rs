//! Visit Atlas Library - Map Interaction Core
//!
//! This library turns raw device geolocation and map-engine pointer/touch events into
//! application state changes for a "countries I have visited" world map: hover
//! highlighting, visit selection, visit registration and camera movement.
//!
//! The map engine, the platform location API and the persistent store are external
//! capabilities behind traits, so the same core drives the walkers-based viewer and
//! the recording doubles used in tests.
//!
//! # Architecture
//!
//! - **[`GeolocationProvider`]**: location requests with a guaranteed fallback coordinate
//! - **[`HighlightTracker`]**: at most one hovered region, idempotent enter/leave
//! - **[`SelectionController`]**: region click to pending-visit popup to store
//! - **[`MapLifecycleManager`]**: engine instantiation, layers, events, restyling
//! - **[`ViewCameraController`]**: camera moves with geolocation retry
//! - **[`PermissionNotice`]**: rate-limited permission-denied explanation
//! - **[`RegionCatalog`]**: region polygons parsed from GeoJSON with hit-testing

mod camera;
mod coordinate;
pub mod engine;
mod geolocation;
mod highlight;
mod lifecycle;
mod notice;
mod region;
mod selection;
mod store;
pub mod style;
pub mod utils;

#[cfg(test)]
mod test_support;

// Public API exports
pub use camera::{LocationPurpose, LocationReport, LocationState, ViewCameraController};
pub use coordinate::{Coordinate, FALLBACK_COORDINATE, TERRITORIAL_DEFAULT};
pub use engine::{EngineError, EngineFactory, FeatureId, MapEngine, MapEvent};
pub use geolocation::{
    GeolocationProvider, LocationApi, LocationErrorKind, LocationGuidance, LocationOptions,
    LocationOutcome, PlatformError, PositionCallback, PositionErrorCode, PositionReading,
};
pub use highlight::{HighlightTracker, TOUCH_RELEASE_DELAY};
pub use lifecycle::{MapLifecycleManager, MapPhase};
pub use notice::{PERMISSION_NOTICE_COOLDOWN, PermissionNotice};
pub use region::{PlaceInfo, RegionCatalog, RegionFeature, RegionGeometry};
pub use selection::{PendingSelection, SelectionController};
pub use store::{AtlasStore, Severity, visited_codes};

/// Error taxonomy of the interaction core
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum AtlasError {
    #[error("geolocation is not supported on this platform")]
    Unsupported,

    #[error("location permission denied")]
    PermissionDenied,

    #[error("position unavailable")]
    PositionUnavailable,

    #[error("location request timed out")]
    Timeout,

    #[error("unknown location error")]
    UnknownLocation,

    #[error("map engine initialization failed: {0}")]
    EngineInitFailure(#[source] EngineError),

    #[error("map layer setup failed: {0}")]
    LayerSetupFailure(#[source] EngineError),

    #[error("map style update failed: {0}")]
    StyleUpdateFailure(#[source] EngineError),

    #[error("highlight state update failed: {0}")]
    HighlightStateFailure(#[source] EngineError),

    #[error("coordinate out of range: ({longitude}, {latitude})")]
    InvalidCoordinate { longitude: f64, latitude: f64 },

    #[error("invalid region geometry: {0}")]
    InvalidGeometry(String),
}

pub type Result<T> = std::result::Result<T, AtlasError>;
