//! Sync cycle orchestration.
//!
//! A cycle runs four phases against the remote item service: flush the
//! outbox, fetch the remote set, reconcile it with the local cache, and
//! persist the resulting patch in one transaction. Failures never escape
//! as errors; they are folded into the reported [`SyncStatus`].

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use tokio::sync::watch;

use crate::config::SyncOptions;
use crate::db::{
    ArticleStore, Database, OutboxStore, ReconcilePatch, SqliteArticleStore, SqliteOutboxStore,
};
use crate::error::Result;
use crate::models::{Article, OutboxEntry, OutboxOperation};
use crate::remote::{GatewayError, RemoteGateway};

use super::{OptimisticOverlay, SyncStatus};

/// Runs reconciliation cycles for a single owner.
///
/// At most one cycle is in flight at a time; a cycle requested while one
/// is running coalesces onto it, so every concurrent caller observes the
/// same outcome and the remote service sees a single fetch.
pub struct SyncCoordinator<G> {
    articles: SqliteArticleStore,
    outbox: SqliteOutboxStore,
    overlay: OptimisticOverlay,
    gateway: Arc<G>,
    owner_id: String,
    options: SyncOptions,
    status: Arc<watch::Sender<SyncStatus>>,
    inflight: Arc<Mutex<Option<watch::Receiver<Option<SyncStatus>>>>>,
    last_synced_at: Arc<Mutex<Option<i64>>>,
    closed: Arc<AtomicBool>,
}

impl<G> Clone for SyncCoordinator<G> {
    fn clone(&self) -> Self {
        Self {
            articles: self.articles.clone(),
            outbox: self.outbox.clone(),
            overlay: self.overlay.clone(),
            gateway: Arc::clone(&self.gateway),
            owner_id: self.owner_id.clone(),
            options: self.options,
            status: Arc::clone(&self.status),
            inflight: Arc::clone(&self.inflight),
            last_synced_at: Arc::clone(&self.last_synced_at),
            closed: Arc::clone(&self.closed),
        }
    }
}

impl<G: RemoteGateway + 'static> SyncCoordinator<G> {
    /// Create a coordinator for the given owner.
    pub fn new(db: &Database, gateway: G, owner_id: impl Into<String>, options: SyncOptions) -> Self {
        let (status, _) = watch::channel(SyncStatus::Idle);
        Self {
            articles: SqliteArticleStore::new(db.clone()),
            outbox: SqliteOutboxStore::new(db.clone()),
            overlay: OptimisticOverlay::new(),
            gateway: Arc::new(gateway),
            owner_id: owner_id.into(),
            options,
            status: Arc::new(status),
            inflight: Arc::new(Mutex::new(None)),
            last_synced_at: Arc::new(Mutex::new(None)),
            closed: Arc::new(AtomicBool::new(false)),
        }
    }

    /// The most recently reported status.
    #[must_use]
    pub fn status(&self) -> SyncStatus {
        self.status.borrow().clone()
    }

    /// Watch status transitions.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<SyncStatus> {
        self.status.subscribe()
    }

    /// The overlay of optimistically hidden ids.
    #[must_use]
    pub const fn overlay(&self) -> &OptimisticOverlay {
        &self.overlay
    }

    /// Stop scheduling cycles. An in-flight cycle is allowed to finish so
    /// the outbox never ends up in an ambiguous acknowledged state.
    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }

    /// Run one reconciliation cycle, or join the one already in flight.
    pub async fn sync(&self, token: &str) -> SyncStatus {
        if self.closed.load(Ordering::SeqCst) {
            return self.status();
        }

        let mut outcome_rx = {
            let Ok(mut inflight) = self.inflight.lock() else {
                return SyncStatus::Error("sync state mutex poisoned".to_string());
            };
            if let Some(rx) = inflight.as_ref() {
                // Coalesce onto the in-flight cycle
                rx.clone()
            } else {
                let (outcome_tx, rx) = watch::channel(None);
                *inflight = Some(rx.clone());
                self.spawn_cycle(token.to_owned(), outcome_tx);
                rx
            }
        };

        loop {
            if let Some(outcome) = outcome_rx.borrow_and_update().clone() {
                return outcome;
            }
            if outcome_rx.changed().await.is_err() {
                return self.status();
            }
        }
    }

    /// Run the cycle on its own task so caller cancellation never aborts
    /// a network call between send and acknowledge.
    fn spawn_cycle(&self, token: String, outcome_tx: watch::Sender<Option<SyncStatus>>) {
        let coordinator = self.clone();
        tokio::spawn(async move {
            coordinator.status.send_replace(SyncStatus::Syncing);
            let outcome = coordinator.run_cycle(&token).await;

            if let Ok(mut inflight) = coordinator.inflight.lock() {
                *inflight = None;
            }
            coordinator.status.send_replace(outcome.clone());
            outcome_tx.send_replace(Some(outcome));
        });
    }

    async fn run_cycle(&self, token: &str) -> SyncStatus {
        match self.try_cycle(token).await {
            Ok(status) => status,
            Err(error) => {
                tracing::error!("Sync cycle aborted on storage failure: {error}");
                SyncStatus::Error(error.to_string())
            }
        }
    }

    async fn try_cycle(&self, token: &str) -> Result<SyncStatus> {
        if let Some(interrupted) = self.flush_outbox(token).await? {
            return Ok(interrupted);
        }

        let since = if self.options.use_delta {
            self.watermark()
        } else {
            None
        };
        let remote = match self.fetch_remote(token, since).await {
            Ok(remote) => remote,
            Err(error) => {
                tracing::debug!("Fetch phase failed: {error}");
                return Ok(status_for(&error));
            }
        };

        let local = self.articles.list_with_deleted(&self.owner_id)?;
        let pending_puts = self.outbox.pending_put_ids(&self.owner_id)?;
        let patch = reconcile_sets(&local, &remote, &pending_puts, since.is_some());
        tracing::debug!(
            upserts = patch.upserts.len(),
            purges = patch.purges.len(),
            "Reconciled remote set"
        );

        self.articles.apply_patch(&self.owner_id, &patch)?;
        self.remember_watermark(&remote);
        self.settle_overlay()?;

        Ok(SyncStatus::Success)
    }

    /// Replay pending outbox entries in sequence order.
    ///
    /// Returns `Some(status)` when the cycle must stop before fetching,
    /// so a stale remote view is never reconciled while writes are still
    /// outstanding.
    async fn flush_outbox(&self, token: &str) -> Result<Option<SyncStatus>> {
        for entry in self.outbox.pending(&self.owner_id)? {
            if entry.attempts >= self.options.max_attempts {
                self.abandon(&entry)?;
                continue;
            }

            let interrupted = match entry.operation {
                OutboxOperation::Put => self.flush_put(&entry, token).await?,
                OutboxOperation::Delete => self.flush_delete(&entry, token).await?,
            };
            if interrupted.is_some() {
                return Ok(interrupted);
            }
        }
        Ok(None)
    }

    async fn flush_put(&self, entry: &OutboxEntry, token: &str) -> Result<Option<SyncStatus>> {
        let Some(article) = entry.payload.as_ref() else {
            tracing::warn!(sequence = entry.sequence, "Dropping put entry without payload");
            self.outbox.acknowledge(entry.sequence)?;
            return Ok(None);
        };

        match self.gateway.put(article, token).await {
            Ok(saved) => {
                if let Some(revision) = saved.revision.as_deref() {
                    self.articles
                        .set_revision(&self.owner_id, &entry.article_id, revision)?;
                }
                self.outbox.acknowledge(entry.sequence)?;
                Ok(None)
            }
            Err(GatewayError::Conflict) => self.resolve_put_conflict(entry, article, token).await,
            Err(GatewayError::Unavailable(reason)) => {
                self.outbox.mark_failed(entry.sequence, &reason)?;
                Ok(Some(SyncStatus::Offline))
            }
            Err(error @ GatewayError::Unauthorized) => {
                // A rejected token is not the entry's failure; it replays
                // untouched once a fresh token arrives
                Ok(Some(SyncStatus::Error(error.to_string())))
            }
            Err(error) => {
                // The service will never accept this payload; retrying forever
                // would stall every entry behind it
                tracing::warn!(
                    sequence = entry.sequence,
                    article = %entry.article_id,
                    "Dropping rejected put: {error}"
                );
                self.outbox.acknowledge(entry.sequence)?;
                Ok(None)
            }
        }
    }

    async fn flush_delete(&self, entry: &OutboxEntry, token: &str) -> Result<Option<SyncStatus>> {
        match self.gateway.delete(&entry.article_id, token).await {
            Ok(()) => {
                self.outbox.acknowledge(entry.sequence)?;
                self.articles.delete(&self.owner_id, &entry.article_id)?;
                Ok(None)
            }
            Err(GatewayError::Conflict) => self.resolve_delete_conflict(entry, token).await,
            Err(GatewayError::Unavailable(reason)) => {
                self.outbox.mark_failed(entry.sequence, &reason)?;
                Ok(Some(SyncStatus::Offline))
            }
            Err(error @ GatewayError::Unauthorized) => {
                Ok(Some(SyncStatus::Error(error.to_string())))
            }
            Err(error) => {
                tracing::warn!(
                    sequence = entry.sequence,
                    article = %entry.article_id,
                    "Delete rejected, reverting local removal: {error}"
                );
                self.outbox.acknowledge(entry.sequence)?;
                self.articles.restore(&self.owner_id, &entry.article_id)?;
                self.overlay.unhide(&entry.article_id);
                Ok(None)
            }
        }
    }

    /// Resolve a put conflict by last-writer-wins on `saved_at`; ties
    /// favor the remote copy.
    async fn resolve_put_conflict(
        &self,
        entry: &OutboxEntry,
        local: &Article,
        token: &str,
    ) -> Result<Option<SyncStatus>> {
        let remote = match self.gateway.fetch_one(&entry.article_id, token).await {
            Ok(remote) => remote,
            Err(error) => return self.conflict_lookup_failed(entry, &error),
        };

        match remote {
            Some(remote) if remote.saved_at >= local.saved_at => {
                tracing::debug!(article = %entry.article_id, "Conflict resolved in favor of remote copy");
                self.articles.put(&remote)?;
                self.outbox.acknowledge(entry.sequence)?;
                Ok(None)
            }
            Some(remote) => {
                // Local copy is newer; overwrite with the server's revision attached
                let mut forced = local.clone();
                forced.revision = remote.revision;
                self.force_put(entry, &forced, token).await
            }
            None => {
                // The contested record vanished remotely; recreate from scratch
                let mut fresh = local.clone();
                fresh.revision = None;
                self.force_put(entry, &fresh, token).await
            }
        }
    }

    async fn force_put(
        &self,
        entry: &OutboxEntry,
        article: &Article,
        token: &str,
    ) -> Result<Option<SyncStatus>> {
        match self.gateway.put(article, token).await {
            Ok(saved) => {
                if let Some(revision) = saved.revision.as_deref() {
                    self.articles
                        .set_revision(&self.owner_id, &entry.article_id, revision)?;
                }
                self.outbox.acknowledge(entry.sequence)?;
                Ok(None)
            }
            Err(GatewayError::Unavailable(reason)) => {
                self.outbox.mark_failed(entry.sequence, &reason)?;
                Ok(Some(SyncStatus::Offline))
            }
            Err(error @ GatewayError::Unauthorized) => {
                Ok(Some(SyncStatus::Error(error.to_string())))
            }
            Err(error) => {
                // Entry stays queued; the next cycle resolves from the top
                self.outbox.mark_failed(entry.sequence, &error.to_string())?;
                Ok(None)
            }
        }
    }

    async fn resolve_delete_conflict(
        &self,
        entry: &OutboxEntry,
        token: &str,
    ) -> Result<Option<SyncStatus>> {
        let remote = match self.gateway.fetch_one(&entry.article_id, token).await {
            Ok(remote) => remote,
            Err(error) => return self.conflict_lookup_failed(entry, &error),
        };

        let Some(remote) = remote else {
            // Already gone remotely; the delete is effectively acknowledged
            self.outbox.acknowledge(entry.sequence)?;
            self.articles.delete(&self.owner_id, &entry.article_id)?;
            return Ok(None);
        };

        let local_saved_at = self
            .articles
            .get(&self.owner_id, &entry.article_id)?
            .map_or(0, |article| article.saved_at);

        if remote.saved_at >= local_saved_at {
            // The record was updated elsewhere after the local removal;
            // the newer copy wins and the delete is cancelled
            tracing::debug!(article = %entry.article_id, "Delete cancelled by newer remote copy");
            self.articles.put(&remote)?;
            self.overlay.unhide(&entry.article_id);
            self.outbox.acknowledge(entry.sequence)?;
            return Ok(None);
        }

        match self.gateway.delete(&entry.article_id, token).await {
            Ok(()) => {
                self.outbox.acknowledge(entry.sequence)?;
                self.articles.delete(&self.owner_id, &entry.article_id)?;
                Ok(None)
            }
            Err(GatewayError::Unavailable(reason)) => {
                self.outbox.mark_failed(entry.sequence, &reason)?;
                Ok(Some(SyncStatus::Offline))
            }
            Err(error) => {
                self.outbox.mark_failed(entry.sequence, &error.to_string())?;
                Ok(None)
            }
        }
    }

    fn conflict_lookup_failed(
        &self,
        entry: &OutboxEntry,
        error: &GatewayError,
    ) -> Result<Option<SyncStatus>> {
        if matches!(error, GatewayError::Unauthorized) {
            return Ok(Some(SyncStatus::Error(error.to_string())));
        }
        self.outbox.mark_failed(entry.sequence, &error.to_string())?;
        if error.is_retryable() {
            Ok(Some(SyncStatus::Offline))
        } else {
            Ok(None)
        }
    }

    /// Drop an entry that exhausted its retry ceiling. Abandoned deletes
    /// revert the local removal so the record resurfaces in the UI.
    fn abandon(&self, entry: &OutboxEntry) -> Result<()> {
        tracing::warn!(
            sequence = entry.sequence,
            article = %entry.article_id,
            attempts = entry.attempts,
            "Dropping outbox entry after repeated failures"
        );
        self.outbox.acknowledge(entry.sequence)?;
        if entry.operation == OutboxOperation::Delete {
            self.articles.restore(&self.owner_id, &entry.article_id)?;
            self.overlay.unhide(&entry.article_id);
        }
        Ok(())
    }

    async fn fetch_remote(
        &self,
        token: &str,
        since: Option<i64>,
    ) -> std::result::Result<Vec<Article>, GatewayError> {
        match since {
            Some(since) => self.gateway.fetch_since(&self.owner_id, token, since).await,
            None => self.gateway.fetch_all(&self.owner_id, token).await,
        }
    }

    fn watermark(&self) -> Option<i64> {
        self.last_synced_at.lock().map(|guard| *guard).unwrap_or(None)
    }

    fn remember_watermark(&self, remote: &[Article]) {
        let Some(newest) = remote.iter().map(|article| article.saved_at).max() else {
            return;
        };
        if let Ok(mut watermark) = self.last_synced_at.lock() {
            *watermark = Some(watermark.map_or(newest, |current| current.max(newest)));
        }
    }

    /// Clear overlay entries whose record is confirmed absent from the
    /// local cache.
    fn settle_overlay(&self) -> Result<()> {
        for id in self.overlay.hidden_ids() {
            if self.articles.get(&self.owner_id, &id)?.is_none() {
                self.overlay.unhide(&id);
            }
        }
        Ok(())
    }
}

fn status_for(error: &GatewayError) -> SyncStatus {
    if error.is_retryable() {
        SyncStatus::Offline
    } else {
        SyncStatus::Error(error.to_string())
    }
}

/// Compute the local patch that makes the cache converge on the remote
/// set.
///
/// Keyed by id: records only present remotely are inserted; records only
/// present locally are purged unless a put is still pending for them;
/// records present on both sides take the remote copy only when it is
/// strictly newer. Tombstoned local rows are left to the flush phase.
/// Delta fetches cannot observe remote deletions, so purges are skipped
/// for them.
fn reconcile_sets(
    local: &[Article],
    remote: &[Article],
    pending_puts: &HashSet<String>,
    skip_purges: bool,
) -> ReconcilePatch {
    let local_by_id: HashMap<&str, &Article> = local
        .iter()
        .map(|article| (article.id.as_str(), article))
        .collect();

    let mut patch = ReconcilePatch::default();

    for candidate in remote {
        match local_by_id.get(candidate.id.as_str()) {
            Some(existing) if existing.deleted => {}
            Some(existing) if candidate.saved_at > existing.saved_at => {
                patch.upserts.push(candidate.clone());
            }
            Some(_) => {}
            None => patch.upserts.push(candidate.clone()),
        }
    }

    if !skip_purges {
        let remote_ids: HashSet<&str> = remote.iter().map(|article| article.id.as_str()).collect();
        for existing in local {
            if !existing.deleted
                && !remote_ids.contains(existing.id.as_str())
                && !pending_puts.contains(&existing.id)
            {
                patch.purges.push(existing.id.clone());
            }
        }
    }

    patch
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn article(id: &str, saved_at: i64) -> Article {
        let mut article = Article::new(id, "owner-1");
        article.saved_at = saved_at;
        article
    }

    fn tombstone(id: &str, saved_at: i64) -> Article {
        let mut article = article(id, saved_at);
        article.deleted = true;
        article
    }

    #[test]
    fn reconcile_converges_on_newer_remote_copies() {
        // Local {a: 100}, remote {a: 200, b: 50} -> remote a wins, b inserted
        let local = vec![article("a", 100)];
        let remote = vec![article("a", 200), article("b", 50)];

        let patch = reconcile_sets(&local, &remote, &HashSet::new(), false);

        let mut upserted: Vec<_> = patch
            .upserts
            .iter()
            .map(|a| (a.id.as_str(), a.saved_at))
            .collect();
        upserted.sort();
        assert_eq!(upserted, vec![("a", 200), ("b", 50)]);
        assert!(patch.purges.is_empty());
    }

    #[test]
    fn reconcile_leaves_local_copy_when_not_strictly_older() {
        let local = vec![article("a", 200), article("b", 100)];
        let remote = vec![article("a", 200), article("b", 50)];

        let patch = reconcile_sets(&local, &remote, &HashSet::new(), false);
        assert!(patch.is_empty());
    }

    #[test]
    fn reconcile_purges_records_deleted_elsewhere() {
        let local = vec![article("a", 100), article("b", 100)];
        let remote = vec![article("a", 100)];

        let patch = reconcile_sets(&local, &remote, &HashSet::new(), false);
        assert_eq!(patch.purges, vec!["b".to_string()]);
    }

    #[test]
    fn reconcile_protects_records_with_pending_puts() {
        let local = vec![article("unsynced", 100)];
        let remote = vec![];
        let pending: HashSet<String> = ["unsynced".to_string()].into();

        let patch = reconcile_sets(&local, &remote, &pending, false);
        assert!(patch.is_empty());
    }

    #[test]
    fn reconcile_never_resurrects_tombstoned_rows() {
        // A pending local delete must not be overwritten by the remote copy
        let local = vec![tombstone("a", 100)];
        let remote = vec![article("a", 300)];

        let patch = reconcile_sets(&local, &remote, &HashSet::new(), false);
        assert!(patch.upserts.is_empty());
    }

    #[test]
    fn reconcile_skips_purges_for_delta_fetches() {
        let local = vec![article("untouched", 100)];
        let remote = vec![];

        let patch = reconcile_sets(&local, &remote, &HashSet::new(), true);
        assert!(patch.purges.is_empty());
    }

    #[test]
    fn gateway_errors_map_to_cycle_status() {
        assert_eq!(
            status_for(&GatewayError::Unavailable("timeout".to_string())),
            SyncStatus::Offline
        );
        assert!(matches!(
            status_for(&GatewayError::Unauthorized),
            SyncStatus::Error(_)
        ));
    }
}
