//! Optimistic removal overlay.
//!
//! A transient in-memory set of record ids the UI should treat as already
//! removed while the outbox delete is still unconfirmed. The overlay only
//! ever hides ids; it never fabricates or mutates record content.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

/// Shared set of optimistically hidden record ids.
#[derive(Clone, Debug, Default)]
pub struct OptimisticOverlay {
    hidden: Arc<Mutex<HashSet<String>>>,
}

impl OptimisticOverlay {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Hide an id from the visible set.
    pub fn hide(&self, id: &str) {
        if let Ok(mut hidden) = self.hidden.lock() {
            hidden.insert(id.to_string());
        }
    }

    /// Make an id visible again (confirmation arrived, or the delete was
    /// abandoned and the UI must surface the record once more).
    pub fn unhide(&self, id: &str) {
        if let Ok(mut hidden) = self.hidden.lock() {
            hidden.remove(id);
        }
    }

    /// Whether an id is currently hidden.
    #[must_use]
    pub fn is_hidden(&self, id: &str) -> bool {
        self.hidden.lock().is_ok_and(|hidden| hidden.contains(id))
    }

    /// Snapshot of all hidden ids.
    #[must_use]
    pub fn hidden_ids(&self) -> Vec<String> {
        self.hidden
            .lock()
            .map(|hidden| hidden.iter().cloned().collect())
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hide_and_unhide() {
        let overlay = OptimisticOverlay::new();
        assert!(!overlay.is_hidden("a1"));

        overlay.hide("a1");
        assert!(overlay.is_hidden("a1"));

        overlay.unhide("a1");
        assert!(!overlay.is_hidden("a1"));
    }

    #[test]
    fn test_unhide_absent_id_is_a_no_op() {
        let overlay = OptimisticOverlay::new();
        overlay.unhide("never-hidden");
        assert!(!overlay.is_hidden("never-hidden"));
    }

    #[test]
    fn test_hidden_ids_snapshot() {
        let overlay = OptimisticOverlay::new();
        overlay.hide("a1");
        overlay.hide("a2");

        let mut ids = overlay.hidden_ids();
        ids.sort();
        assert_eq!(ids, vec!["a1", "a2"]);
    }

    #[test]
    fn test_clones_share_state() {
        let overlay = OptimisticOverlay::new();
        let clone = overlay.clone();
        clone.hide("a1");
        assert!(overlay.is_hidden("a1"));
    }
}
