//! Rate-limited explanation for denied location permission

use std::time::Duration;

/// The permission explanation is shown at most once per this window
pub const PERMISSION_NOTICE_COOLDOWN: Duration = Duration::from_secs(7 * 24 * 60 * 60);

/// Remembers when the permission-denied explanation was last shown.
///
/// Timestamps are seconds since the Unix epoch so the state can be persisted as is.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PermissionNotice {
    last_shown_at: Option<u64>,
    #[cfg_attr(feature = "serde", serde(skip))]
    visible: bool,
}

impl PermissionNotice {
    pub fn with_last_shown_at(last_shown_at: Option<u64>) -> Self {
        Self {
            last_shown_at,
            visible: false,
        }
    }

    pub fn last_shown_at(&self) -> Option<u64> {
        self.last_shown_at
    }

    pub fn is_visible(&self) -> bool {
        self.visible
    }

    /// Whether the cool-down has elapsed at `now`
    pub fn is_due(&self, now: u64) -> bool {
        match self.last_shown_at {
            None => true,
            // A clock that went backwards counts as "not yet due"
            Some(shown) => now
                .checked_sub(shown)
                .is_some_and(|elapsed| elapsed >= PERMISSION_NOTICE_COOLDOWN.as_secs()),
        }
    }

    /// Offer the explanation; returns true when it becomes visible
    pub fn offer(&mut self, now: u64) -> bool {
        if self.visible {
            return false;
        }
        if !self.is_due(now) {
            tracing::debug!("Permission notice already shown recently, not repeating it");
            return false;
        }
        self.last_shown_at = Some(now);
        self.visible = true;
        true
    }

    pub fn dismiss(&mut self) {
        self.visible = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DAY: u64 = 24 * 60 * 60;

    #[test]
    fn test_first_offer_shows() {
        let mut notice = PermissionNotice::default();
        assert!(notice.offer(1_000));
        assert!(notice.is_visible());
        assert_eq!(notice.last_shown_at(), Some(1_000));
    }

    #[test]
    fn test_cooldown_suppresses_repeat() {
        let mut notice = PermissionNotice::default();
        assert!(notice.offer(0));
        notice.dismiss();

        assert!(!notice.offer(6 * DAY));
        assert!(!notice.is_visible());

        assert!(notice.offer(7 * DAY));
        assert_eq!(notice.last_shown_at(), Some(7 * DAY));
    }

    #[test]
    fn test_restored_state_is_respected() {
        let mut notice = PermissionNotice::with_last_shown_at(Some(10 * DAY));
        assert!(!notice.offer(12 * DAY));
        assert!(notice.offer(17 * DAY));
    }

    #[test]
    fn test_clock_going_backwards() {
        let notice = PermissionNotice::with_last_shown_at(Some(10 * DAY));
        assert!(!notice.is_due(DAY));
    }

    #[test]
    fn test_offer_while_visible_is_ignored() {
        let mut notice = PermissionNotice::default();
        assert!(notice.offer(0));
        assert!(!notice.offer(30 * DAY));
        assert_eq!(notice.last_shown_at(), Some(0));
    }
}
