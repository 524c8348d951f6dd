//! Article synchronization engine.

mod coordinator;
mod overlay;

pub use coordinator::SyncCoordinator;
pub use overlay::OptimisticOverlay;

/// Outcome and progress state of sync cycles.
///
/// Transitions are Idle → Syncing → {Success, Offline, Error}; exactly
/// one cycle per owner is in flight at a time. The outcome is the
/// resting state: it stays observable until the next cycle flips the
/// status back to Syncing, so the status never returns to Idle after
/// the first cycle.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SyncStatus {
    /// No cycle has run yet
    Idle,
    /// A cycle is in flight
    Syncing,
    /// The last cycle completed and the cache converged
    Success,
    /// The last cycle hit a transient network failure; retry later
    Offline,
    /// The last cycle failed terminally (bad token, storage failure)
    Error(String),
}

impl SyncStatus {
    /// Whether the last cycle ended without converging.
    #[must_use]
    pub const fn is_failure(&self) -> bool {
        matches!(self, Self::Offline | Self::Error(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failure_covers_offline_and_error() {
        assert!(SyncStatus::Offline.is_failure());
        assert!(SyncStatus::Error("boom".to_string()).is_failure());
        assert!(!SyncStatus::Idle.is_failure());
        assert!(!SyncStatus::Syncing.is_failure());
        assert!(!SyncStatus::Success.is_failure());
    }
}
