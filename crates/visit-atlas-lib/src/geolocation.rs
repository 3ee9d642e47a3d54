//! Device geolocation with a guaranteed fallback coordinate
//!
//! [`GeolocationProvider::request_location`] invokes exactly one of its two callbacks,
//! exactly once, for every request: platform answers, platform errors while issuing the
//! request, unsupported platforms and requests the platform drops without answering all
//! end in a single callback. Failures always carry the fallback coordinate.

use crate::{AtlasError, Coordinate, FALLBACK_COORDINATE};
use std::cell::RefCell;
use std::rc::Rc;
use std::time::Duration;

/// Readings less precise than this are reported with a warning
pub const LOW_PRECISION_THRESHOLD_METERS: f64 = 5000.0;

/// Options passed to the platform location API
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LocationOptions {
    /// Request GPS-grade accuracy (costs power)
    pub enable_high_accuracy: bool,
    /// Give up after this long
    pub timeout: Duration,
    /// Accept cached positions up to this age
    pub maximum_age: Duration,
}

impl Default for LocationOptions {
    fn default() -> Self {
        Self {
            enable_high_accuracy: false,
            timeout: Duration::from_secs(10),
            maximum_age: Duration::from_secs(5 * 60),
        }
    }
}

/// Why a location could not be obtained
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum LocationErrorKind {
    PermissionDenied,
    PositionUnavailable,
    Timeout,
    Unsupported,
    Unknown,
}

/// User-facing explanation of a location failure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LocationGuidance {
    pub title: &'static str,
    pub message: &'static str,
    pub help: &'static [&'static str],
}

impl LocationErrorKind {
    /// Standard platform error code mapping (1, 2, 3, anything else)
    pub fn from_code(code: u16) -> Self {
        match code {
            1 => Self::PermissionDenied,
            2 => Self::PositionUnavailable,
            3 => Self::Timeout,
            _ => Self::Unknown,
        }
    }

    fn log_message(&self) -> &'static str {
        match self {
            Self::PermissionDenied => {
                "Location access was denied; allow it in the settings or use the default location"
            }
            Self::PositionUnavailable => {
                "Current position could not be determined; using the default location"
            }
            Self::Timeout => "Location request timed out; using the default location",
            Self::Unsupported => "Geolocation is not supported; using the default location",
            Self::Unknown => "Unknown location error; using the default location",
        }
    }

    /// Title, message and help steps shown in the location error window
    pub fn guidance(&self) -> LocationGuidance {
        match self {
            Self::PermissionDenied => LocationGuidance {
                title: "Location access was denied",
                message: "Location access is blocked in your browser settings. \
                          Allow location access to use the \"My location\" feature.",
                help: &[
                    "Chrome: click the lock icon left of the address bar, open \"Site settings\" and set \"Location\" to \"Allow\"",
                    "Safari: open \"Safari\" > \"Settings for This Website\" and set \"Location\" to \"Allow\"",
                    "iOS: open Settings > Privacy > Location Services and check the permission of your browser",
                ],
            },
            Self::PositionUnavailable => LocationGuidance {
                title: "Location unavailable",
                message: "Your device could not determine its location. The GPS signal may be weak \
                          or the location service may be having problems.",
                help: &[
                    "Turning on Wi-Fi can improve location accuracy",
                    "Move outdoors or near a window where the GPS signal is stronger",
                    "Make sure location services are enabled on your device",
                ],
            },
            Self::Timeout => LocationGuidance {
                title: "Location request timed out",
                message: "Getting your location took too long. Check your network connection \
                          or try again later.",
                help: &[
                    "Check your internet connection",
                    "Move to a place with better reception",
                    "Reload the page and try again",
                ],
            },
            Self::Unsupported => LocationGuidance {
                title: "Location not supported",
                message: "This platform does not provide a location service.",
                help: &[
                    "Update your browser to the latest version",
                    "Try another browser",
                ],
            },
            Self::Unknown => LocationGuidance {
                title: "An unknown error occurred",
                message: "A problem occurred while getting your location.",
                help: &[
                    "Update your browser to the latest version",
                    "Reload the page and try again",
                    "Try another browser",
                ],
            },
        }
    }
}

impl From<LocationErrorKind> for AtlasError {
    fn from(kind: LocationErrorKind) -> Self {
        match kind {
            LocationErrorKind::PermissionDenied => AtlasError::PermissionDenied,
            LocationErrorKind::PositionUnavailable => AtlasError::PositionUnavailable,
            LocationErrorKind::Timeout => AtlasError::Timeout,
            LocationErrorKind::Unsupported => AtlasError::Unsupported,
            LocationErrorKind::Unknown => AtlasError::UnknownLocation,
        }
    }
}

/// Result of one geolocation attempt
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LocationOutcome {
    Success {
        coordinate: Coordinate,
        accuracy_meters: f64,
    },
    Failure {
        kind: LocationErrorKind,
        fallback: Coordinate,
    },
}

impl LocationOutcome {
    /// The coordinate to use: the reading on success, the fallback on failure
    pub fn coordinate(&self) -> Coordinate {
        match self {
            Self::Success { coordinate, .. } => *coordinate,
            Self::Failure { fallback, .. } => *fallback,
        }
    }

    pub fn failure_kind(&self) -> Option<LocationErrorKind> {
        match self {
            Self::Success { .. } => None,
            Self::Failure { kind, .. } => Some(*kind),
        }
    }
}

/// Raw position payload from the platform
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PositionReading {
    pub longitude: f64,
    pub latitude: f64,
    pub accuracy_meters: f64,
}

/// Raw platform error code (1 = permission denied, 2 = unavailable, 3 = timeout)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PositionErrorCode(pub u16);

/// Error raised by the platform while issuing a request
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("platform location error: {0}")]
pub struct PlatformError(pub String);

/// Completion handed to the platform; called at most once
pub type PositionCallback = Box<dyn FnOnce(Result<PositionReading, PositionErrorCode>)>;

/// Platform location capability
pub trait LocationApi {
    /// Whether the platform has a location service at all
    fn is_supported(&self) -> bool;

    /// Start one asynchronous position request
    fn current_position(
        &self,
        options: &LocationOptions,
        callback: PositionCallback,
    ) -> Result<(), PlatformError>;
}

type SuccessHandler = Box<dyn FnOnce(Coordinate)>;
type FailureHandler = Box<dyn FnOnce(LocationOutcome)>;

/// Caller handlers of one in-flight request, consumed by the first resolution
struct PendingRequest {
    handlers: Option<(SuccessHandler, FailureHandler)>,
    fallback: Coordinate,
}

impl PendingRequest {
    fn resolve(request: &RefCell<PendingRequest>, outcome: LocationOutcome) {
        // The borrow ends before any handler runs
        let handlers = request.borrow_mut().handlers.take();
        match (handlers, outcome) {
            (None, outcome) => {
                tracing::debug!("Location request already resolved, ignoring {:?}", outcome);
            }
            (Some((on_success, _)), LocationOutcome::Success { coordinate, .. }) => {
                on_success(coordinate)
            }
            (Some((_, on_failure)), failure) => on_failure(failure),
        }
    }
}

impl Drop for PendingRequest {
    fn drop(&mut self) {
        if let Some((_, on_failure)) = self.handlers.take() {
            tracing::warn!("Location request was dropped without an answer");
            on_failure(LocationOutcome::Failure {
                kind: LocationErrorKind::Unknown,
                fallback: self.fallback,
            });
        }
    }
}

/// Wraps a [`LocationApi`] with the request policy and the fallback coordinate
pub struct GeolocationProvider<A> {
    api: A,
    fallback: Coordinate,
    options: LocationOptions,
}

impl<A: LocationApi> GeolocationProvider<A> {
    pub fn new(api: A) -> Self {
        Self {
            api,
            fallback: FALLBACK_COORDINATE,
            options: LocationOptions::default(),
        }
    }

    /// Override the fallback coordinate reported on failures
    pub fn with_fallback(mut self, fallback: Coordinate) -> Self {
        self.fallback = fallback;
        self
    }

    pub fn with_options(mut self, options: LocationOptions) -> Self {
        self.options = options;
        self
    }

    pub fn fallback(&self) -> Coordinate {
        self.fallback
    }

    pub fn options(&self) -> &LocationOptions {
        &self.options
    }

    pub fn api(&self) -> &A {
        &self.api
    }

    /// Request the current location.
    ///
    /// Exactly one of `on_success` / `on_failure` is invoked exactly once, possibly
    /// before this function returns.
    pub fn request_location<S, F>(&self, on_success: S, on_failure: F)
    where
        S: FnOnce(Coordinate) + 'static,
        F: FnOnce(LocationOutcome) + 'static,
    {
        let fallback = self.fallback;

        if !self.api.is_supported() {
            tracing::info!("{}", LocationErrorKind::Unsupported.log_message());
            on_failure(LocationOutcome::Failure {
                kind: LocationErrorKind::Unsupported,
                fallback,
            });
            return;
        }

        let request = Rc::new(RefCell::new(PendingRequest {
            handlers: Some((Box::new(on_success), Box::new(on_failure))),
            fallback,
        }));

        let callback_request = Rc::clone(&request);
        let callback: PositionCallback = Box::new(move |result| {
            let outcome = classify(result, fallback);
            PendingRequest::resolve(&callback_request, outcome);
        });

        tracing::debug!("Requesting current position ({:?})", self.options);
        if let Err(err) = self.api.current_position(&self.options, callback) {
            tracing::error!("Unexpected error while requesting the location: {err}");
            PendingRequest::resolve(
                &request,
                LocationOutcome::Failure {
                    kind: LocationErrorKind::Unknown,
                    fallback,
                },
            );
        }
    }
}

/// Turn a platform answer into an outcome, applying the precision and range policy
fn classify(
    result: Result<PositionReading, PositionErrorCode>,
    fallback: Coordinate,
) -> LocationOutcome {
    match result {
        Ok(reading) => {
            tracing::info!(
                "Obtained current position: lon={:.4} lat={:.4} accuracy={:.0}m",
                reading.longitude,
                reading.latitude,
                reading.accuracy_meters
            );
            if reading.accuracy_meters > LOW_PRECISION_THRESHOLD_METERS {
                tracing::warn!(
                    "Location precision is low: {:.0} m",
                    reading.accuracy_meters
                );
            }
            match Coordinate::new(reading.longitude, reading.latitude) {
                Ok(coordinate) => LocationOutcome::Success {
                    coordinate,
                    accuracy_meters: reading.accuracy_meters,
                },
                Err(err) => {
                    tracing::warn!("Discarding platform position: {err}");
                    LocationOutcome::Failure {
                        kind: LocationErrorKind::PositionUnavailable,
                        fallback,
                    }
                }
            }
        }
        Err(PositionErrorCode(code)) => {
            let kind = LocationErrorKind::from_code(code);
            tracing::warn!("{} (code {code})", kind.log_message());
            LocationOutcome::Failure { kind, fallback }
        }
    }
}
