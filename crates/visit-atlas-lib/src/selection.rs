//! Region selection and visit confirmation
//!
//! Activating a region opens a popup whose confirm action is bound to the region's
//! [`PlaceInfo`] when the popup is created, so there is no window in which the popup
//! exists without a working confirm button.

use crate::engine::{MapEngine, PopupContent, PopupId};
use crate::{AtlasStore, Coordinate, PlaceInfo, RegionFeature};

pub const CONFIRM_LABEL: &str = "Mark as visited";

/// The open popup and the place it confirms
#[derive(Debug, Clone, PartialEq)]
pub struct PendingSelection {
    pub popup: PopupId,
    pub place: PlaceInfo,
    pub anchor: Coordinate,
}

#[derive(Debug, Default)]
pub struct SelectionController {
    pending: Option<PendingSelection>,
    selected: Option<PlaceInfo>,
}

impl SelectionController {
    pub fn pending(&self) -> Option<&PendingSelection> {
        self.pending.as_ref()
    }

    /// Last region the user activated
    pub fn selected(&self) -> Option<&PlaceInfo> {
        self.selected.as_ref()
    }

    /// Open the visit popup for `feature`, replacing any open one
    pub fn on_region_activated<E: MapEngine + ?Sized>(
        &mut self,
        engine: &mut E,
        feature: &RegionFeature,
        anchor: Coordinate,
    ) -> PopupId {
        tracing::info!("Region clicked: {}", feature.display_name);
        self.dismiss(engine);

        let place = feature.place_info();
        let popup = engine.open_popup(PopupContent {
            anchor,
            title: feature.display_name.clone(),
            confirm_label: CONFIRM_LABEL.to_string(),
        });
        self.selected = Some(place.clone());
        self.pending = Some(PendingSelection {
            popup,
            place,
            anchor,
        });
        popup
    }

    /// Confirm button of `popup` was pressed; returns whether a visit was recorded
    pub fn confirm<E, S>(&mut self, engine: &mut E, store: &mut S, popup: PopupId) -> bool
    where
        E: MapEngine + ?Sized,
        S: AtlasStore + ?Sized,
    {
        match self.pending.take() {
            Some(pending) if pending.popup == popup => {
                tracing::info!("Marking {} as visited", pending.place.place_name);
                store.mark_place_as_visited(pending.place);
                engine.close_popup(popup);
                true
            }
            other => {
                tracing::warn!("Ignoring confirmation from stale popup {popup:?}");
                self.pending = other;
                false
            }
        }
    }

    /// The engine closed `popup` on its own (e.g. close-on-click)
    pub fn on_popup_closed(&mut self, popup: PopupId) {
        if self.pending.as_ref().is_some_and(|p| p.popup == popup) {
            self.pending = None;
        }
    }

    /// Close the open popup, if any
    pub fn dismiss<E: MapEngine + ?Sized>(&mut self, engine: &mut E) {
        if let Some(pending) = self.pending.take() {
            engine.close_popup(pending.popup);
        }
    }

    /// Forget the pending selection without touching the engine
    pub fn reset(&mut self) {
        self.pending = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::FeatureId;
    use crate::test_support::{EngineCall, RecordingEngine, RecordingStore, region};

    fn anchor() -> Coordinate {
        Coordinate::new(139.7, 35.7).unwrap()
    }

    #[test]
    fn test_activation_opens_popup() {
        let mut engine = RecordingEngine::default();
        let mut selection = SelectionController::default();

        let popup = selection.on_region_activated(&mut engine, &region(0, "JP", "Japan"), anchor());

        let pending = selection.pending().unwrap();
        assert_eq!(pending.popup, popup);
        assert_eq!(pending.place.country_code_iso, "JP");
        assert_eq!(engine.open_popups(), vec![popup]);
        match &engine.log().calls[0] {
            EngineCall::OpenPopup(_, content) => {
                assert_eq!(content.title, "Japan");
                assert_eq!(content.confirm_label, CONFIRM_LABEL);
                assert_eq!(content.anchor, anchor());
            }
            other => panic!("unexpected call {other:?}"),
        }
    }

    #[test]
    fn test_new_selection_replaces_popup() {
        let mut engine = RecordingEngine::default();
        let mut selection = SelectionController::default();

        let first = selection.on_region_activated(&mut engine, &region(0, "JP", "Japan"), anchor());
        let second =
            selection.on_region_activated(&mut engine, &region(1, "FR", "France"), anchor());

        assert_ne!(first, second);
        assert_eq!(engine.open_popups(), vec![second]);
        assert_eq!(selection.selected().unwrap().country_code_iso, "FR");
    }

    #[test]
    fn test_confirm_marks_once_and_dismisses_once() {
        let mut engine = RecordingEngine::default();
        let mut store = RecordingStore::default();
        let mut selection = SelectionController::default();

        let popup = selection.on_region_activated(&mut engine, &region(0, "JP", "Japan"), anchor());
        assert!(selection.confirm(&mut engine, &mut store, popup));
        assert!(!selection.confirm(&mut engine, &mut store, popup));

        assert_eq!(store.marked.len(), 1);
        assert_eq!(store.marked[0].country_code_iso, "JP");
        let closes = engine
            .log()
            .calls
            .iter()
            .filter(|c| matches!(c, EngineCall::ClosePopup(_)))
            .count();
        assert_eq!(closes, 1);
        assert!(selection.pending().is_none());
    }

    #[test]
    fn test_stale_confirmation_is_ignored() {
        let mut engine = RecordingEngine::default();
        let mut store = RecordingStore::default();
        let mut selection = SelectionController::default();

        let old = selection.on_region_activated(&mut engine, &region(0, "JP", "Japan"), anchor());
        let current =
            selection.on_region_activated(&mut engine, &region(1, "FR", "France"), anchor());

        assert!(!selection.confirm(&mut engine, &mut store, old));
        assert!(store.marked.is_empty());
        assert_eq!(selection.pending().unwrap().popup, current);
    }

    #[test]
    fn test_popup_closed_by_engine() {
        let mut engine = RecordingEngine::default();
        let mut selection = SelectionController::default();

        let popup = selection.on_region_activated(&mut engine, &region(0, "JP", "Japan"), anchor());
        selection.on_popup_closed(popup);
        assert!(selection.pending().is_none());
        // The last selection is still remembered
        assert_eq!(selection.selected().unwrap().place_name, "Japan");
    }

    #[test]
    fn test_region_uses_semantic_code_not_feature_id() {
        let mut engine = RecordingEngine::default();
        let mut store = RecordingStore::default();
        let mut selection = SelectionController::default();

        let feature = RegionFeature {
            feature_id: FeatureId(42),
            region_id: "NZ".to_string(),
            display_name: "New Zealand".to_string(),
        };
        let popup = selection.on_region_activated(&mut engine, &feature, anchor());
        selection.confirm(&mut engine, &mut store, popup);
        assert_eq!(store.marked[0].unique_id, "NZ");
    }
}
