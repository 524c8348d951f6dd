//! Session surface consumed by the UI layers.
//!
//! A [`SyncSession`] binds the local stores, the outbox, and the sync
//! coordinator for one signed-in owner. Local mutations commit
//! synchronously and enqueue their remote counterpart; reads are served
//! from the cache with the optimistic overlay applied, so the UI never
//! blocks on the network.

use std::sync::Arc;

use crate::config::SyncOptions;
use crate::db::{
    ArticleStore, Database, OutboxStore, SqliteArticleStore, SqliteOutboxStore, SqliteTagStore,
    TagStore,
};
use crate::error::{Error, Result};
use crate::models::{Article, PendingOperation, Tag};
use crate::remote::RemoteGateway;
use crate::sync::{SyncCoordinator, SyncStatus};

/// Source of the bearer token presented to the remote item service.
pub trait TokenProvider: Send + Sync {
    /// The current token, or `None` when the owner is signed out.
    fn bearer_token(&self) -> Option<String>;
}

/// Token provider backed by a fixed string.
#[derive(Debug, Clone)]
pub struct StaticTokenProvider {
    token: String,
}

impl StaticTokenProvider {
    #[must_use]
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
        }
    }
}

impl TokenProvider for StaticTokenProvider {
    fn bearer_token(&self) -> Option<String> {
        Some(self.token.clone())
    }
}

/// Owner-scoped facade over the cache, outbox, and sync coordinator.
pub struct SyncSession<G, P> {
    articles: SqliteArticleStore,
    tags: SqliteTagStore,
    outbox: SqliteOutboxStore,
    coordinator: SyncCoordinator<G>,
    tokens: Arc<P>,
    owner_id: String,
}

impl<G, P> SyncSession<G, P>
where
    G: RemoteGateway + 'static,
    P: TokenProvider,
{
    /// Open a session for an owner on top of an initialized database.
    pub fn new(
        db: &Database,
        gateway: G,
        tokens: P,
        owner_id: impl Into<String>,
        options: SyncOptions,
    ) -> Self {
        let owner_id = owner_id.into();
        Self {
            articles: SqliteArticleStore::new(db.clone()),
            tags: SqliteTagStore::new(db.clone()),
            outbox: SqliteOutboxStore::new(db.clone()),
            coordinator: SyncCoordinator::new(db, gateway, owner_id.clone(), options),
            tokens: Arc::new(tokens),
            owner_id,
        }
    }

    /// The owner this session is scoped to.
    #[must_use]
    pub fn owner_id(&self) -> &str {
        &self.owner_id
    }

    /// Articles to render, newest first. Tombstoned rows and rows hidden
    /// by the optimistic overlay are excluded.
    pub fn visible_articles(&self) -> Result<Vec<Article>> {
        let overlay = self.coordinator.overlay();
        let articles = self
            .articles
            .list(&self.owner_id)?
            .into_iter()
            .filter(|article| !overlay.is_hidden(&article.id))
            .collect();
        Ok(articles)
    }

    /// A single article, or `None` when absent, tombstoned, or hidden.
    pub fn article(&self, id: &str) -> Result<Option<Article>> {
        if self.coordinator.overlay().is_hidden(id) {
            return Ok(None);
        }
        let article = self
            .articles
            .get(&self.owner_id, id)?
            .filter(|article| !article.deleted);
        Ok(article)
    }

    /// The most recently reported sync status.
    #[must_use]
    pub fn status(&self) -> SyncStatus {
        self.coordinator.status()
    }

    /// Watch sync status transitions.
    #[must_use]
    pub fn subscribe(&self) -> tokio::sync::watch::Receiver<SyncStatus> {
        self.coordinator.subscribe()
    }

    /// Run a reconciliation cycle now, or join the one in flight.
    pub async fn refresh(&self) -> SyncStatus {
        match self.tokens.bearer_token() {
            Some(token) => self.coordinator.sync(&token).await,
            None => SyncStatus::Error("no bearer token available".to_string()),
        }
    }

    /// Retry after a failed cycle. Identical to [`Self::refresh`]; the
    /// name exists so call sites read as intent.
    pub async fn retry(&self) -> SyncStatus {
        self.refresh().await
    }

    /// Save an article: commit it locally, enqueue the remote put, and
    /// kick off a background cycle.
    pub fn save(&self, mut article: Article) -> Result<()> {
        if article.id.trim().is_empty() {
            return Err(Error::InvalidInput(
                "article id must not be empty".to_string(),
            ));
        }
        if article.owner_id != self.owner_id {
            return Err(Error::InvalidInput(format!(
                "article belongs to a different owner: {}",
                article.owner_id
            )));
        }

        // Saving revives a record that was optimistically removed
        article.deleted = false;
        self.articles.put(&article)?;
        self.outbox.append(&PendingOperation::put(article.clone()))?;
        self.coordinator.overlay().unhide(&article.id);

        self.schedule_cycle();
        Ok(())
    }

    /// Remove an article: tombstone it locally, hide it from reads, and
    /// enqueue the remote delete. Removing an id that is absent or
    /// already tombstoned is a no-op.
    pub fn remove(&self, id: &str) -> Result<()> {
        let Some(existing) = self.articles.get(&self.owner_id, id)? else {
            return Ok(());
        };
        if existing.deleted {
            return Ok(());
        }

        self.outbox
            .append(&PendingOperation::delete(&self.owner_id, id))?;
        self.articles.mark_deleted(&self.owner_id, id)?;
        self.coordinator.overlay().hide(id);

        self.schedule_cycle();
        Ok(())
    }

    /// All tags, ordered by name.
    pub fn tags(&self) -> Result<Vec<Tag>> {
        self.tags.list_tags()
    }

    /// Replace the full tag set.
    pub fn replace_tags(&self, tags: &[Tag]) -> Result<()> {
        self.tags.replace_tags(tags)
    }

    /// Stop scheduling cycles; local reads and writes keep working.
    pub fn close(&self) {
        self.coordinator.close();
    }

    fn schedule_cycle(&self) {
        let Some(token) = self.tokens.bearer_token() else {
            tracing::debug!("No bearer token; deferring sync until sign-in");
            return;
        };
        // Local mutations must stay safe on threads without a runtime;
        // the mutation is already durable in the outbox, so the next
        // refresh picks it up
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            tracing::debug!("No async runtime; deferring sync to the next refresh");
            return;
        };
        let coordinator = self.coordinator.clone();
        handle.spawn(async move {
            coordinator.sync(&token).await;
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::{GatewayResult, RemoteGateway};
    use async_trait::async_trait;
    use pretty_assertions::assert_eq;

    const OWNER: &str = "owner-1";
    const TOKEN_VALUE: &str = "token-1";

    struct IdleGateway;

    #[async_trait]
    impl RemoteGateway for IdleGateway {
        async fn fetch_all(&self, _owner_id: &str, _token: &str) -> GatewayResult<Vec<Article>> {
            Ok(Vec::new())
        }

        async fn fetch_one(&self, _id: &str, _token: &str) -> GatewayResult<Option<Article>> {
            Ok(None)
        }

        async fn put(&self, article: &Article, _token: &str) -> GatewayResult<Article> {
            Ok(article.clone())
        }

        async fn delete(&self, _id: &str, _token: &str) -> GatewayResult<()> {
            Ok(())
        }
    }

    struct SignedOut;

    impl TokenProvider for SignedOut {
        fn bearer_token(&self) -> Option<String> {
            None
        }
    }

    fn setup() -> SyncSession<IdleGateway, SignedOut> {
        let db = Database::open_in_memory().unwrap();
        SyncSession::new(&db, IdleGateway, SignedOut, OWNER, SyncOptions::default())
    }

    fn article(id: &str, saved_at: i64) -> Article {
        let mut article = Article::new(id, OWNER);
        article.saved_at = saved_at;
        article
    }

    #[test]
    fn test_save_rejects_foreign_owner() {
        let session = setup();
        let foreign = Article::new("a1", "someone-else");
        assert!(session.save(foreign).is_err());
    }

    #[test]
    fn test_save_rejects_blank_id() {
        let session = setup();
        assert!(session.save(Article::new("  ", OWNER)).is_err());
    }

    #[test]
    fn test_save_commits_locally_and_enqueues_put() {
        let session = setup();
        session.save(article("a1", 100)).unwrap();

        let visible = session.visible_articles().unwrap();
        assert_eq!(visible.len(), 1);
        assert_eq!(visible[0].id, "a1");

        let pending = session.outbox.pending(OWNER).unwrap();
        assert_eq!(pending.len(), 1);
    }

    #[test]
    fn test_remove_hides_immediately_and_enqueues_delete() {
        let session = setup();
        session.save(article("a1", 100)).unwrap();
        session.remove("a1").unwrap();

        assert!(session.visible_articles().unwrap().is_empty());
        assert!(session.article("a1").unwrap().is_none());

        let pending = session.outbox.pending(OWNER).unwrap();
        assert_eq!(pending.len(), 2);
    }

    #[test]
    fn test_remove_unknown_id_is_a_no_op() {
        let session = setup();
        session.remove("missing").unwrap();
        assert!(session.outbox.pending(OWNER).unwrap().is_empty());
    }

    #[test]
    fn test_remove_twice_enqueues_one_delete() {
        let session = setup();
        session.save(article("a1", 100)).unwrap();
        session.remove("a1").unwrap();
        session.remove("a1").unwrap();

        // One put, one delete
        assert_eq!(session.outbox.pending(OWNER).unwrap().len(), 2);
    }

    #[test]
    fn test_save_after_remove_revives_the_record() {
        let session = setup();
        session.save(article("a1", 100)).unwrap();
        session.remove("a1").unwrap();
        session.save(article("a1", 200)).unwrap();

        let visible = session.visible_articles().unwrap();
        assert_eq!(visible.len(), 1);
        assert_eq!(visible[0].saved_at, 200);
    }

    #[test]
    fn test_mutations_work_without_an_async_runtime() {
        // No #[tokio::test]: save and remove must not panic when the
        // caller's thread has no ambient runtime
        let db = Database::open_in_memory().unwrap();
        let session = SyncSession::new(
            &db,
            IdleGateway,
            StaticTokenProvider::new(TOKEN_VALUE),
            OWNER,
            SyncOptions::default(),
        );

        session.save(article("a1", 100)).unwrap();
        session.remove("a1").unwrap();

        // Both mutations landed in the outbox for the next refresh
        assert_eq!(session.outbox.pending(OWNER).unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_refresh_without_token_reports_error() {
        let session = setup();
        assert!(matches!(session.refresh().await, SyncStatus::Error(_)));
    }
}
