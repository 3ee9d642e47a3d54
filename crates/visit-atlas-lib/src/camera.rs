//! Camera control around the user's location
//!
//! Geolocation answers arrive whenever the platform decides, before or after the map
//! is ready. The provider callbacks only push a [`LocationReport`] into a channel; the
//! UI loop drains it with [`ViewCameraController::process_reports`], which is where
//! state, notifications and camera moves happen.

use crate::engine::{EngineFactory, FlyToOptions};
use crate::lifecycle::LOCATED_ZOOM;
use crate::{
    AtlasStore, Coordinate, GeolocationProvider, LocationApi, LocationErrorKind,
    MapLifecycleManager, PermissionNotice, Severity,
};
use tokio::sync::mpsc;

const DEFAULT_LOCATION_USED: &str = "Location access is not allowed, so the default location is used. \
     The \"My location\" button will not work.";
const LOCATION_FOUND: &str = "Current location found";
const LOCATION_DENIED: &str =
    "Location access is denied. Please allow location access in your browser settings.";
const LOCATION_FAILED: &str = "Could not get your current location. Using the default location.";

/// Why a location request was made
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LocationPurpose {
    /// Request made at startup
    Initial,
    /// Request made from the locate button after a failure
    Retry,
}

/// One resolved location request
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LocationReport {
    pub purpose: LocationPurpose,
    /// The reading, or the fallback on failure
    pub coordinate: Coordinate,
    pub failure: Option<LocationErrorKind>,
}

/// What is known about the user's location
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct LocationState {
    pub known: Option<Coordinate>,
    pub last_failure: Option<LocationErrorKind>,
}

fn camera_flight() -> FlyToOptions {
    FlyToOptions::new(LOCATED_ZOOM).with_speed(1.5)
}

pub struct ViewCameraController {
    state: LocationState,
    reports_tx: mpsc::UnboundedSender<LocationReport>,
    reports_rx: mpsc::UnboundedReceiver<LocationReport>,
    retry_pending: bool,
}

impl Default for ViewCameraController {
    fn default() -> Self {
        Self::new()
    }
}

impl ViewCameraController {
    pub fn new() -> Self {
        let (reports_tx, reports_rx) = mpsc::unbounded_channel();
        Self {
            state: LocationState::default(),
            reports_tx,
            reports_rx,
            retry_pending: false,
        }
    }

    pub fn state(&self) -> &LocationState {
        &self.state
    }

    pub fn known_location(&self) -> Option<Coordinate> {
        self.state.known
    }

    pub fn last_failure(&self) -> Option<LocationErrorKind> {
        self.state.last_failure
    }

    /// Whether a retry request is still waiting for an answer
    pub fn is_retry_pending(&self) -> bool {
        self.retry_pending
    }

    /// Ask for the location once at startup
    pub fn request_initial<A: LocationApi>(&mut self, provider: &GeolocationProvider<A>) {
        self.request(provider, LocationPurpose::Initial);
    }

    /// Locate button: re-request after a failure, otherwise fly to the known location.
    ///
    /// Does nothing without a live map or without a known location.
    pub fn fly_to_known_or_retry<F, A>(
        &mut self,
        manager: &mut MapLifecycleManager<F>,
        provider: &GeolocationProvider<A>,
    ) where
        F: EngineFactory,
        A: LocationApi,
    {
        if manager.engine().is_none() {
            tracing::debug!("Locate requested without a map");
            return;
        }

        if self.state.last_failure.is_some() {
            if self.retry_pending {
                tracing::debug!("Location retry already in flight");
                return;
            }
            self.retry_pending = true;
            self.request(provider, LocationPurpose::Retry);
        } else if let Some(known) = self.state.known {
            manager.fly_to(known, camera_flight());
        }
    }

    /// Apply every queued report; returns how many were handled
    pub fn process_reports<F, S>(
        &mut self,
        manager: &mut MapLifecycleManager<F>,
        store: &mut S,
        notice: &mut PermissionNotice,
        now_unix_secs: u64,
    ) -> usize
    where
        F: EngineFactory,
        S: AtlasStore + ?Sized,
    {
        let mut handled = 0;
        while let Ok(report) = self.reports_rx.try_recv() {
            self.apply(report, manager, store, notice, now_unix_secs);
            handled += 1;
        }
        handled
    }

    fn request<A: LocationApi>(&self, provider: &GeolocationProvider<A>, purpose: LocationPurpose) {
        let success_tx = self.reports_tx.clone();
        let failure_tx = self.reports_tx.clone();
        provider.request_location(
            move |coordinate| {
                // A closed channel means the controller is gone
                let _ = success_tx.send(LocationReport {
                    purpose,
                    coordinate,
                    failure: None,
                });
            },
            move |outcome| {
                let _ = failure_tx.send(LocationReport {
                    purpose,
                    coordinate: outcome.coordinate(),
                    failure: outcome.failure_kind(),
                });
            },
        );
    }

    fn apply<F, S>(
        &mut self,
        report: LocationReport,
        manager: &mut MapLifecycleManager<F>,
        store: &mut S,
        notice: &mut PermissionNotice,
        now_unix_secs: u64,
    ) where
        F: EngineFactory,
        S: AtlasStore + ?Sized,
    {
        tracing::debug!("Location report: {report:?}");

        if report.failure == Some(LocationErrorKind::PermissionDenied) && notice.offer(now_unix_secs)
        {
            tracing::info!("Showing the location permission explanation");
        }

        match (report.purpose, report.failure) {
            (LocationPurpose::Initial, failure) => {
                self.state.known = Some(report.coordinate);
                self.state.last_failure = failure;
                if failure == Some(LocationErrorKind::PermissionDenied) {
                    store.show_toast(DEFAULT_LOCATION_USED, Severity::Warning);
                }
                // Arrived after the map loaded: re-center explicitly
                if manager.is_ready() {
                    manager.center_on_user(report.coordinate);
                }
            }
            (LocationPurpose::Retry, None) => {
                self.retry_pending = false;
                self.state.known = Some(report.coordinate);
                self.state.last_failure = None;
                if manager.fly_to(report.coordinate, camera_flight()) {
                    manager.place_user_marker(report.coordinate);
                    store.show_toast(LOCATION_FOUND, Severity::Success);
                }
            }
            (LocationPurpose::Retry, Some(LocationErrorKind::PermissionDenied)) => {
                self.retry_pending = false;
                self.state.last_failure = Some(LocationErrorKind::PermissionDenied);
                if manager.engine().is_some() {
                    store.show_toast(LOCATION_DENIED, Severity::Warning);
                }
            }
            (LocationPurpose::Retry, Some(kind)) => {
                self.retry_pending = false;
                self.state.last_failure = Some(kind);
                if manager.fly_to(report.coordinate, camera_flight()) {
                    store.show_toast(LOCATION_FAILED, Severity::Warning);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{MapEvent, SourceData};
    use crate::test_support::{
        EngineCall, LocationScript, RecordingFactory, RecordingStore, ScriptedLocationApi,
    };
    use crate::{FALLBACK_COORDINATE, PositionErrorCode, PositionReading};
    use instant::Instant;

    const NOW: u64 = 1_700_000_000;

    fn reading(lon: f64, lat: f64) -> Result<PositionReading, PositionErrorCode> {
        Ok(PositionReading {
            longitude: lon,
            latitude: lat,
            accuracy_meters: 30.0,
        })
    }

    fn provider(
        answer: Result<PositionReading, PositionErrorCode>,
    ) -> GeolocationProvider<ScriptedLocationApi> {
        GeolocationProvider::new(ScriptedLocationApi::answering(answer))
    }

    fn ready_manager(store: &mut RecordingStore) -> MapLifecycleManager<RecordingFactory> {
        let mut manager =
            MapLifecycleManager::new(RecordingFactory::default(), SourceData::Inline("{}".into()));
        manager.initialize(true, None, store);
        manager.handle_event(MapEvent::Load, None, store, Instant::now());
        manager
    }

    fn fly_targets(manager: &MapLifecycleManager<RecordingFactory>) -> Vec<Coordinate> {
        manager
            .engine()
            .unwrap()
            .log()
            .calls
            .iter()
            .filter_map(|c| match c {
                EngineCall::FlyTo(at, _) => Some(*at),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_initial_success_before_map() {
        let mut store = RecordingStore::default();
        let mut notice = PermissionNotice::default();
        let mut manager =
            MapLifecycleManager::new(RecordingFactory::default(), SourceData::Inline("{}".into()));
        let mut camera = ViewCameraController::new();

        camera.request_initial(&provider(reading(135.5, 34.7)));
        assert_eq!(camera.process_reports(&mut manager, &mut store, &mut notice, NOW), 1);

        let osaka = Coordinate::new(135.5, 34.7).unwrap();
        assert_eq!(camera.known_location(), Some(osaka));
        assert_eq!(camera.last_failure(), None);
        assert!(store.toasts.is_empty());
    }

    #[test]
    fn test_initial_success_after_ready_recenters() {
        let mut store = RecordingStore::default();
        let mut notice = PermissionNotice::default();
        let mut manager = ready_manager(&mut store);
        let mut camera = ViewCameraController::new();

        camera.request_initial(&provider(reading(135.5, 34.7)));
        camera.process_reports(&mut manager, &mut store, &mut notice, NOW);

        let osaka = Coordinate::new(135.5, 34.7).unwrap();
        assert_eq!(fly_targets(&manager), vec![osaka]);
        assert_eq!(manager.user_marker(), Some(osaka));
    }

    #[test]
    fn test_initial_permission_denied() {
        let mut store = RecordingStore::default();
        let mut notice = PermissionNotice::default();
        let mut manager =
            MapLifecycleManager::new(RecordingFactory::default(), SourceData::Inline("{}".into()));
        let mut camera = ViewCameraController::new();

        camera.request_initial(&provider(Err(PositionErrorCode(1))));
        camera.process_reports(&mut manager, &mut store, &mut notice, NOW);

        assert_eq!(camera.known_location(), Some(FALLBACK_COORDINATE));
        assert_eq!(
            camera.last_failure(),
            Some(LocationErrorKind::PermissionDenied)
        );
        assert_eq!(
            store.toasts,
            vec![(DEFAULT_LOCATION_USED.to_string(), Severity::Warning)]
        );
        assert!(notice.is_visible());
        assert_eq!(notice.last_shown_at(), Some(NOW));
    }

    #[test]
    fn test_initial_timeout_is_quiet() {
        let mut store = RecordingStore::default();
        let mut notice = PermissionNotice::default();
        let mut manager =
            MapLifecycleManager::new(RecordingFactory::default(), SourceData::Inline("{}".into()));
        let mut camera = ViewCameraController::new();

        camera.request_initial(&provider(Err(PositionErrorCode(3))));
        camera.process_reports(&mut manager, &mut store, &mut notice, NOW);

        assert_eq!(camera.last_failure(), Some(LocationErrorKind::Timeout));
        assert!(store.toasts.is_empty());
        assert!(!notice.is_visible());
    }

    #[test]
    fn test_known_location_flies_without_request() {
        let mut store = RecordingStore::default();
        let mut notice = PermissionNotice::default();
        let mut manager = ready_manager(&mut store);
        let mut camera = ViewCameraController::new();

        camera.request_initial(&provider(reading(135.5, 34.7)));
        camera.process_reports(&mut manager, &mut store, &mut notice, NOW);

        // A locate press must not hit the platform again
        let failing = GeolocationProvider::new(ScriptedLocationApi::new(
            true,
            LocationScript::Answer(Err(PositionErrorCode(2))),
        ));
        camera.fly_to_known_or_retry(&mut manager, &failing);
        assert_eq!(camera.process_reports(&mut manager, &mut store, &mut notice, NOW), 0);

        let osaka = Coordinate::new(135.5, 34.7).unwrap();
        assert_eq!(fly_targets(&manager), vec![osaka, osaka]);
        let (_, options) = match manager.engine().unwrap().log().calls.last() {
            Some(EngineCall::FlyTo(at, options)) => (*at, *options),
            other => panic!("unexpected call {other:?}"),
        };
        assert_eq!(options.zoom, 5.0);
        assert_eq!(options.speed, 1.5);
    }

    #[test]
    fn test_retry_permission_denied_does_not_move() {
        let mut store = RecordingStore::default();
        let mut notice = PermissionNotice::default();
        let mut manager = ready_manager(&mut store);
        let mut camera = ViewCameraController::new();

        let denied = provider(Err(PositionErrorCode(1)));
        camera.request_initial(&denied);
        camera.process_reports(&mut manager, &mut store, &mut notice, NOW);
        let flights_before = fly_targets(&manager).len();
        notice.dismiss();

        camera.fly_to_known_or_retry(&mut manager, &denied);
        camera.process_reports(&mut manager, &mut store, &mut notice, NOW + 60);

        assert_eq!(fly_targets(&manager).len(), flights_before);
        assert_eq!(
            store.toasts.last(),
            Some(&(LOCATION_DENIED.to_string(), Severity::Warning))
        );
        // Still inside the cool-down
        assert!(!notice.is_visible());
        assert!(!camera.is_retry_pending());
    }

    #[test]
    fn test_retry_success() {
        let mut store = RecordingStore::default();
        let mut notice = PermissionNotice::default();
        let mut manager = ready_manager(&mut store);
        let mut camera = ViewCameraController::new();

        camera.request_initial(&provider(Err(PositionErrorCode(2))));
        camera.process_reports(&mut manager, &mut store, &mut notice, NOW);

        camera.fly_to_known_or_retry(&mut manager, &provider(reading(2.35, 48.85)));
        camera.process_reports(&mut manager, &mut store, &mut notice, NOW);

        let paris = Coordinate::new(2.35, 48.85).unwrap();
        assert_eq!(camera.known_location(), Some(paris));
        assert_eq!(camera.last_failure(), None);
        assert_eq!(fly_targets(&manager).last(), Some(&paris));
        // The marker follows the real position instead of staying on the fallback
        assert_eq!(manager.user_marker(), Some(paris));
        assert_eq!(
            store.toasts.last(),
            Some(&(LOCATION_FOUND.to_string(), Severity::Success))
        );
    }

    #[test]
    fn test_retry_other_failure_flies_to_fallback() {
        let mut store = RecordingStore::default();
        let mut notice = PermissionNotice::default();
        let mut manager = ready_manager(&mut store);
        let mut camera = ViewCameraController::new();

        let unavailable = provider(Err(PositionErrorCode(2)));
        camera.request_initial(&unavailable);
        camera.process_reports(&mut manager, &mut store, &mut notice, NOW);

        camera.fly_to_known_or_retry(&mut manager, &unavailable);
        camera.process_reports(&mut manager, &mut store, &mut notice, NOW);

        assert_eq!(fly_targets(&manager).last(), Some(&FALLBACK_COORDINATE));
        assert_eq!(
            store.toasts.last(),
            Some(&(LOCATION_FAILED.to_string(), Severity::Warning))
        );
        assert_eq!(
            camera.last_failure(),
            Some(LocationErrorKind::PositionUnavailable)
        );
    }

    #[test]
    fn test_retry_is_not_duplicated_while_pending() {
        let mut store = RecordingStore::default();
        let mut notice = PermissionNotice::default();
        let mut manager = ready_manager(&mut store);
        let mut camera = ViewCameraController::new();

        camera.request_initial(&provider(Err(PositionErrorCode(3))));
        camera.process_reports(&mut manager, &mut store, &mut notice, NOW);

        let api = ScriptedLocationApi::new(true, LocationScript::Defer);
        let deferred = api.deferred();
        let slow = GeolocationProvider::new(api);
        camera.fly_to_known_or_retry(&mut manager, &slow);
        camera.fly_to_known_or_retry(&mut manager, &slow);
        assert!(camera.is_retry_pending());
        assert_eq!(slow.api().requests(), 1);

        let callback = deferred.borrow_mut().take().unwrap();
        callback(reading(10.0, 10.0));
        camera.process_reports(&mut manager, &mut store, &mut notice, NOW);
        assert!(!camera.is_retry_pending());
    }

    #[test]
    fn test_no_map_is_noop() {
        let mut store = RecordingStore::default();
        let mut notice = PermissionNotice::default();
        let mut manager =
            MapLifecycleManager::new(RecordingFactory::default(), SourceData::Inline("{}".into()));
        let mut camera = ViewCameraController::new();

        camera.request_initial(&provider(Err(PositionErrorCode(2))));
        camera.process_reports(&mut manager, &mut store, &mut notice, NOW);

        let api_provider = provider(reading(1.0, 1.0));
        camera.fly_to_known_or_retry(&mut manager, &api_provider);
        assert_eq!(api_provider.api().requests(), 0);
    }

    #[test]
    fn test_stale_report_after_teardown() {
        let mut store = RecordingStore::default();
        let mut notice = PermissionNotice::default();
        let mut manager = ready_manager(&mut store);
        let mut camera = ViewCameraController::new();

        let api = ScriptedLocationApi::new(true, LocationScript::Defer);
        let deferred = api.deferred();
        camera.request_initial(&GeolocationProvider::new(api));
        manager.teardown();

        let callback = deferred.borrow_mut().take().unwrap();
        callback(reading(10.0, 10.0));
        assert_eq!(camera.process_reports(&mut manager, &mut store, &mut notice, NOW), 1);
        assert!(manager.engine().is_none());
        assert!(store.toasts.is_empty());
    }
}
