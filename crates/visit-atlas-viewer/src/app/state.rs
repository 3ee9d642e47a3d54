//! Application state management
//!
//! `AppState` is the store the interaction core talks to: it owns the visited places
//! and the single toast slot, and knows how to persist itself.

use crate::app::storage::{StorageBackend, StorageResult, load_json_backend, save_json_backend};
use std::time::Duration;
use visit_atlas_lib::{AtlasStore, PermissionNotice, PlaceInfo, Severity};

/// Storage key of [`PersistedState`]
pub const STATE_KEY: &str = "visit_atlas_state";

const TOAST_DURATION: Duration = Duration::from_secs(4);
const TOAST_FADE: Duration = Duration::from_millis(300);

/// What survives a restart
#[derive(Debug, Default, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct PersistedState {
    pub visited_places: Vec<PlaceInfo>,
    /// Unix seconds when the location permission explanation was last shown
    #[serde(default)]
    pub permission_notice_shown_at: Option<u64>,
    #[serde(default)]
    pub sidebar_open: bool,
}

/// Transient notification
#[derive(Debug, Clone)]
pub struct Toast {
    pub message: String,
    pub severity: Severity,
    pub shown_at: instant::Instant,
}

impl Toast {
    fn is_expired(&self) -> bool {
        self.shown_at.elapsed() >= TOAST_DURATION
    }

    /// Fade in, stay, fade out
    pub fn alpha(&self) -> f32 {
        let elapsed = self.shown_at.elapsed();
        let fade = TOAST_FADE.as_secs_f32();
        if elapsed < TOAST_FADE {
            elapsed.as_secs_f32() / fade
        } else if elapsed < TOAST_DURATION - TOAST_FADE {
            1.0
        } else if elapsed < TOAST_DURATION {
            (TOAST_DURATION - elapsed).as_secs_f32() / fade
        } else {
            0.0
        }
    }
}

#[derive(Debug, Default)]
pub struct AppState {
    visited: Vec<PlaceInfo>,
    toast: Option<Toast>,
    pub sidebar_open: bool,
    /// Visited places changed since the last save
    dirty: bool,
}

impl AppState {
    pub fn new() -> Self {
        Self {
            sidebar_open: true,
            ..Default::default()
        }
    }

    pub fn from_persisted(persisted: PersistedState) -> Self {
        let mut state = Self {
            sidebar_open: persisted.sidebar_open,
            ..Default::default()
        };
        for place in persisted.visited_places {
            state.insert_place(place);
        }
        state
    }

    /// Restore from `backend`; a missing or unreadable entry gives a fresh state
    pub fn load(backend: &dyn StorageBackend) -> (Self, PermissionNotice) {
        match load_json_backend::<PersistedState>(backend, STATE_KEY) {
            Ok(Some(persisted)) => {
                tracing::info!(
                    "Restored {} visited places",
                    persisted.visited_places.len()
                );
                let notice = PermissionNotice::with_last_shown_at(persisted.permission_notice_shown_at);
                (Self::from_persisted(persisted), notice)
            }
            Ok(None) => {
                tracing::info!("No persisted state found, starting fresh");
                (Self::new(), PermissionNotice::default())
            }
            Err(e) => {
                tracing::warn!("Ignoring persisted state: {e}");
                (Self::new(), PermissionNotice::default())
            }
        }
    }

    pub fn to_persisted(&self, notice: &PermissionNotice) -> PersistedState {
        PersistedState {
            visited_places: self.visited.clone(),
            permission_notice_shown_at: notice.last_shown_at(),
            sidebar_open: self.sidebar_open,
        }
    }

    pub fn save(&mut self, backend: &dyn StorageBackend, notice: &PermissionNotice) -> StorageResult<()> {
        save_json_backend(backend, STATE_KEY, &self.to_persisted(notice))?;
        self.dirty = false;
        Ok(())
    }

    /// Whether there are unsaved visited place changes
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn visited_count(&self) -> usize {
        self.visited.len()
    }

    pub fn clear_visited(&mut self) {
        if !self.visited.is_empty() {
            tracing::info!("Clearing {} visited places", self.visited.len());
            self.visited.clear();
            self.dirty = true;
        }
    }

    /// The toast to display, if it has not expired yet
    pub fn toast(&self) -> Option<&Toast> {
        self.toast.as_ref().filter(|t| !t.is_expired())
    }

    /// Drop an expired toast; returns whether one is still showing
    pub fn prune_toast(&mut self) -> bool {
        if self.toast.as_ref().is_some_and(Toast::is_expired) {
            self.toast = None;
        }
        self.toast.is_some()
    }

    fn insert_place(&mut self, place: PlaceInfo) -> bool {
        if self.visited.iter().any(|p| p.unique_id == place.unique_id) {
            return false;
        }
        self.visited.push(place);
        self.visited
            .sort_by(|a, b| a.place_name.cmp(&b.place_name));
        true
    }
}

impl AtlasStore for AppState {
    fn visited_places(&self) -> &[PlaceInfo] {
        &self.visited
    }

    fn mark_place_as_visited(&mut self, place: PlaceInfo) {
        let name = place.place_name.clone();
        if self.insert_place(place) {
            self.dirty = true;
            self.show_toast(&format!("{name} marked as visited"), Severity::Success);
        } else {
            self.show_toast(&format!("{name} is already marked as visited"), Severity::Info);
        }
    }

    fn show_toast(&mut self, message: &str, severity: Severity) {
        match severity {
            Severity::Error => tracing::error!("Toast: {message}"),
            Severity::Warning => tracing::warn!("Toast: {message}"),
            Severity::Info | Severity::Success => tracing::info!("Toast: {message}"),
        }
        self.toast = Some(Toast {
            message: message.to_string(),
            severity,
            shown_at: instant::Instant::now(),
        });
    }
}
