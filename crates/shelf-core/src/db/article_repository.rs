//! Article repository implementation

use rusqlite::{params, types::Type, Connection, OptionalExtension};

use crate::error::Result;
use crate::models::Article;

use super::Database;

/// The set of local writes produced by one reconciliation, applied as a
/// single transaction so readers never observe a torn result.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReconcilePatch {
    /// Remote copies to insert or overwrite locally
    pub upserts: Vec<Article>,
    /// Ids of records deleted elsewhere, to purge locally
    pub purges: Vec<String>,
}

impl ReconcilePatch {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.upserts.is_empty() && self.purges.is_empty()
    }
}

/// Trait for article cache operations
pub trait ArticleStore {
    /// Get an article by owner-scoped id, including tombstoned rows
    fn get(&self, owner_id: &str, id: &str) -> Result<Option<Article>>;

    /// List articles (excluding tombstoned), newest first
    fn list(&self, owner_id: &str) -> Result<Vec<Article>>;

    /// List articles including tombstoned rows, newest first
    fn list_with_deleted(&self, owner_id: &str) -> Result<Vec<Article>>;

    /// Upsert an article by owner-scoped id
    fn put(&self, article: &Article) -> Result<()>;

    /// Mark an article as logically deleted (idempotent)
    fn mark_deleted(&self, owner_id: &str, id: &str) -> Result<()>;

    /// Clear a tombstone, making the row visible again (idempotent)
    fn restore(&self, owner_id: &str, id: &str) -> Result<()>;

    /// Record the server-assigned revision after an acknowledged put
    fn set_revision(&self, owner_id: &str, id: &str, revision: &str) -> Result<()>;

    /// Physically remove a row (idempotent; absent ids are not an error)
    fn delete(&self, owner_id: &str, id: &str) -> Result<()>;

    /// Apply a reconciliation patch in one transaction
    fn apply_patch(&self, owner_id: &str, patch: &ReconcilePatch) -> Result<()>;
}

/// `SQLite` implementation of `ArticleStore`
#[derive(Clone)]
pub struct SqliteArticleStore {
    db: Database,
}

impl SqliteArticleStore {
    /// Create a new store backed by the given database
    #[must_use]
    pub const fn new(db: Database) -> Self {
        Self { db }
    }

    /// Parse an article from a database row.
    ///
    /// The `revision` and `is_deleted` columns are authoritative; the
    /// payload JSON may lag behind after `set_revision`.
    fn parse_article(row: &rusqlite::Row<'_>) -> rusqlite::Result<Article> {
        let payload: String = row.get(0)?;
        let revision: Option<String> = row.get(1)?;
        let is_deleted: i64 = row.get(2)?;

        let mut article: Article = serde_json::from_str(&payload)
            .map_err(|error| rusqlite::Error::FromSqlConversionFailure(0, Type::Text, Box::new(error)))?;
        article.revision = revision;
        article.deleted = is_deleted != 0;
        Ok(article)
    }

    fn upsert(conn: &Connection, article: &Article) -> Result<()> {
        let payload = serde_json::to_string(article)?;
        conn.execute(
            "INSERT INTO articles (owner_id, id, revision, saved_at, is_deleted, payload)
             VALUES (?, ?, ?, ?, ?, ?)
             ON CONFLICT(owner_id, id) DO UPDATE SET
                 revision = excluded.revision,
                 saved_at = excluded.saved_at,
                 is_deleted = excluded.is_deleted,
                 payload = excluded.payload",
            params![
                article.owner_id,
                article.id,
                article.revision,
                article.saved_at,
                i32::from(article.deleted),
                payload
            ],
        )?;
        Ok(())
    }
}

impl ArticleStore for SqliteArticleStore {
    fn get(&self, owner_id: &str, id: &str) -> Result<Option<Article>> {
        self.db.with_conn(|conn| {
            let article = conn
                .query_row(
                    "SELECT payload, revision, is_deleted FROM articles
                     WHERE owner_id = ? AND id = ?",
                    params![owner_id, id],
                    Self::parse_article,
                )
                .optional()?;
            Ok(article)
        })
    }

    fn list(&self, owner_id: &str) -> Result<Vec<Article>> {
        self.db.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT payload, revision, is_deleted FROM articles
                 WHERE owner_id = ? AND is_deleted = 0
                 ORDER BY saved_at DESC",
            )?;
            let articles = stmt
                .query_map(params![owner_id], Self::parse_article)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(articles)
        })
    }

    fn list_with_deleted(&self, owner_id: &str) -> Result<Vec<Article>> {
        self.db.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT payload, revision, is_deleted FROM articles
                 WHERE owner_id = ?
                 ORDER BY saved_at DESC",
            )?;
            let articles = stmt
                .query_map(params![owner_id], Self::parse_article)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(articles)
        })
    }

    fn put(&self, article: &Article) -> Result<()> {
        self.db.with_conn(|conn| Self::upsert(conn, article))
    }

    fn mark_deleted(&self, owner_id: &str, id: &str) -> Result<()> {
        self.db.with_conn(|conn| {
            conn.execute(
                "UPDATE articles SET is_deleted = 1 WHERE owner_id = ? AND id = ?",
                params![owner_id, id],
            )?;
            Ok(())
        })
    }

    fn restore(&self, owner_id: &str, id: &str) -> Result<()> {
        self.db.with_conn(|conn| {
            conn.execute(
                "UPDATE articles SET is_deleted = 0 WHERE owner_id = ? AND id = ?",
                params![owner_id, id],
            )?;
            Ok(())
        })
    }

    fn set_revision(&self, owner_id: &str, id: &str, revision: &str) -> Result<()> {
        self.db.with_conn(|conn| {
            conn.execute(
                "UPDATE articles SET revision = ? WHERE owner_id = ? AND id = ?",
                params![revision, owner_id, id],
            )?;
            Ok(())
        })
    }

    fn delete(&self, owner_id: &str, id: &str) -> Result<()> {
        self.db.with_conn(|conn| {
            conn.execute(
                "DELETE FROM articles WHERE owner_id = ? AND id = ?",
                params![owner_id, id],
            )?;
            Ok(())
        })
    }

    fn apply_patch(&self, owner_id: &str, patch: &ReconcilePatch) -> Result<()> {
        if patch.is_empty() {
            return Ok(());
        }

        self.db.with_conn(|conn| {
            let tx = conn.transaction()?;
            for article in &patch.upserts {
                Self::upsert(&tx, article)?;
            }
            for id in &patch.purges {
                tx.execute(
                    "DELETE FROM articles WHERE owner_id = ? AND id = ?",
                    params![owner_id, id],
                )?;
            }
            tx.commit()?;
            Ok(())
        })
    }
}
