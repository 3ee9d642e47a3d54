//! External store interface
//!
//! The store owns the visited places and the notification channel. The interaction
//! core only reads the visited places and signals through the store's operations.

use crate::PlaceInfo;
use std::collections::BTreeSet;

/// Notification severity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Severity {
    Info,
    Success,
    Warning,
    Error,
}

/// Application store capability
pub trait AtlasStore {
    fn visited_places(&self) -> &[PlaceInfo];

    fn mark_place_as_visited(&mut self, place: PlaceInfo);

    fn show_toast(&mut self, message: &str, severity: Severity);
}

/// Region codes of all visited places (empty codes are ignored)
pub fn visited_codes<S: AtlasStore + ?Sized>(store: &S) -> BTreeSet<String> {
    store
        .visited_places()
        .iter()
        .filter(|place| !place.country_code_iso.is_empty())
        .map(|place| place.country_code_iso.clone())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{RecordingStore, place};

    #[test]
    fn test_visited_codes_skip_empty() {
        let mut store = RecordingStore::default();
        store.mark_place_as_visited(place("JP", "Japan"));
        store.mark_place_as_visited(place("", "Atlantis"));
        store.mark_place_as_visited(place("FR", "France"));
        store.mark_place_as_visited(place("JP", "Japan"));

        let codes: Vec<String> = visited_codes(&store).into_iter().collect();
        assert_eq!(codes, vec!["FR".to_string(), "JP".to_string()]);
    }
}
