//! Hover highlighting of a single region
//!
//! The engine-side hover flag is set on at most one feature at a time. Transitions
//! always clear the previous feature before flagging the next one, and engine errors
//! are logged without interrupting the gesture.

use crate::engine::{FeatureId, FeatureState, MapEngine};
use crate::AtlasError;
use instant::Instant;
use std::time::Duration;

/// How long a region stays highlighted after the finger is lifted
pub const TOUCH_RELEASE_DELAY: Duration = Duration::from_secs(1);

/// Tracks which feature currently carries the hover flag
#[derive(Debug)]
pub struct HighlightTracker {
    source: String,
    current: Option<FeatureId>,
    pending_clear: Option<Instant>,
}

impl HighlightTracker {
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            current: None,
            pending_clear: None,
        }
    }

    pub fn current(&self) -> Option<FeatureId> {
        self.current
    }

    pub fn has_pending_clear(&self) -> bool {
        self.pending_clear.is_some()
    }

    /// Pointer (or finger) is over `feature`
    pub fn on_pointer_over_region<E: MapEngine + ?Sized>(
        &mut self,
        engine: &mut E,
        feature: FeatureId,
    ) {
        // A new touch keeps the region lit
        self.pending_clear = None;

        if self.current == Some(feature) {
            return;
        }
        if let Some(previous) = self.current.take() {
            self.apply(engine, previous, false);
        }
        self.apply(engine, feature, true);
        self.current = Some(feature);
    }

    /// Pointer left the region layer
    pub fn on_pointer_leave_region<E: MapEngine + ?Sized>(&mut self, engine: &mut E) {
        self.pending_clear = None;
        if let Some(previous) = self.current.take() {
            self.apply(engine, previous, false);
        }
    }

    /// Touch ended: clear the highlight after [`TOUCH_RELEASE_DELAY`]
    pub fn schedule_delayed_clear(&mut self, now: Instant) {
        if self.current.is_some() {
            self.pending_clear = Some(now + TOUCH_RELEASE_DELAY);
        }
    }

    /// Run a due delayed clear
    pub fn tick<E: MapEngine + ?Sized>(&mut self, engine: &mut E, now: Instant) {
        if self.pending_clear.is_some_and(|deadline| now >= deadline) {
            self.on_pointer_leave_region(engine);
        }
    }

    /// Forget all state without touching the engine
    pub fn reset(&mut self) {
        self.current = None;
        self.pending_clear = None;
    }

    fn apply<E: MapEngine + ?Sized>(&self, engine: &mut E, feature: FeatureId, hover: bool) {
        match engine.set_feature_state(&self.source, feature, FeatureState { hover }) {
            Ok(()) => tracing::trace!("Feature {feature} hover={hover}"),
            Err(err) => {
                tracing::warn!("{}", AtlasError::HighlightStateFailure(err));
            }
        }
    }
}
