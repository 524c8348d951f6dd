//! Pending-operation outbox implementation
//!
//! Appends are durable before the call returns so a mutation made while
//! offline is never silently lost; replay order is the append order.

use std::collections::HashSet;

use rusqlite::{params, types::Type};

use crate::error::Result;
use crate::models::{Article, OutboxEntry, OutboxOperation, PendingOperation};
use crate::util::unix_timestamp_ms;

use super::Database;

/// Trait for outbox storage operations
pub trait OutboxStore {
    /// Append a mutation; returns the assigned sequence number
    fn append(&self, operation: &PendingOperation) -> Result<i64>;

    /// Pending entries for an owner, ordered by sequence
    fn pending(&self, owner_id: &str) -> Result<Vec<OutboxEntry>>;

    /// Remove an acknowledged entry
    fn acknowledge(&self, sequence: i64) -> Result<()>;

    /// Record a failed replay attempt, retaining the entry
    fn mark_failed(&self, sequence: i64, error: &str) -> Result<()>;

    /// Ids with a still-pending put, used to protect local-only records
    /// from the reconciliation purge
    fn pending_put_ids(&self, owner_id: &str) -> Result<HashSet<String>>;
}

/// `SQLite` implementation of `OutboxStore`
#[derive(Clone)]
pub struct SqliteOutboxStore {
    db: Database,
}

impl SqliteOutboxStore {
    /// Create a new store backed by the given database
    #[must_use]
    pub const fn new(db: Database) -> Self {
        Self { db }
    }

    fn parse_entry(row: &rusqlite::Row<'_>) -> rusqlite::Result<OutboxEntry> {
        let operation: String = row.get(3)?;
        let operation: OutboxOperation = operation
            .parse()
            .map_err(|error| rusqlite::Error::FromSqlConversionFailure(3, Type::Text, Box::new(error)))?;

        let payload: Option<String> = row.get(4)?;
        let payload: Option<Article> = payload
            .map(|raw| serde_json::from_str(&raw))
            .transpose()
            .map_err(|error| rusqlite::Error::FromSqlConversionFailure(4, Type::Text, Box::new(error)))?;

        Ok(OutboxEntry {
            sequence: row.get(0)?,
            owner_id: row.get(1)?,
            article_id: row.get(2)?,
            operation,
            payload,
            attempts: row.get(5)?,
            last_error: row.get(6)?,
            created_at: row.get(7)?,
        })
    }
}

impl OutboxStore for SqliteOutboxStore {
    fn append(&self, operation: &PendingOperation) -> Result<i64> {
        let (owner_id, article_id, kind, payload) = match operation {
            PendingOperation::Put(article) => (
                article.owner_id.as_str(),
                article.id.as_str(),
                OutboxOperation::Put,
                Some(serde_json::to_string(article)?),
            ),
            PendingOperation::Delete {
                owner_id,
                article_id,
            } => (
                owner_id.as_str(),
                article_id.as_str(),
                OutboxOperation::Delete,
                None,
            ),
        };

        self.db.with_conn(|conn| {
            conn.execute(
                "INSERT INTO outbox (owner_id, article_id, operation, payload, created_at)
                 VALUES (?, ?, ?, ?, ?)",
                params![
                    owner_id,
                    article_id,
                    kind.as_str(),
                    payload,
                    unix_timestamp_ms()
                ],
            )?;
            Ok(conn.last_insert_rowid())
        })
    }

    fn pending(&self, owner_id: &str) -> Result<Vec<OutboxEntry>> {
        self.db.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT sequence, owner_id, article_id, operation, payload, attempts, last_error, created_at
                 FROM outbox
                 WHERE owner_id = ?
                 ORDER BY sequence ASC",
            )?;
            let rows = stmt.query_map(params![owner_id], Self::parse_entry)?;

            // An undecodable row must not wedge the whole queue; skip it
            // and let the healthy entries replay
            let mut entries = Vec::new();
            for row in rows {
                match row {
                    Ok(entry) => entries.push(entry),
                    Err(rusqlite::Error::FromSqlConversionFailure(_, _, error)) => {
                        tracing::warn!("Skipping undecodable outbox entry: {error}");
                    }
                    Err(error) => return Err(error.into()),
                }
            }
            Ok(entries)
        })
    }

    fn acknowledge(&self, sequence: i64) -> Result<()> {
        self.db.with_conn(|conn| {
            conn.execute("DELETE FROM outbox WHERE sequence = ?", params![sequence])?;
            Ok(())
        })
    }

    fn mark_failed(&self, sequence: i64, error: &str) -> Result<()> {
        self.db.with_conn(|conn| {
            conn.execute(
                "UPDATE outbox SET attempts = attempts + 1, last_error = ? WHERE sequence = ?",
                params![error, sequence],
            )?;
            Ok(())
        })
    }

    fn pending_put_ids(&self, owner_id: &str) -> Result<HashSet<String>> {
        self.db.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT DISTINCT article_id FROM outbox WHERE owner_id = ? AND operation = 'put'",
            )?;
            let ids = stmt
                .query_map(params![owner_id], |row| row.get::<_, String>(0))?
                .collect::<rusqlite::Result<HashSet<_>>>()?;
            Ok(ids)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Article;
    use pretty_assertions::assert_eq;
    use tempfile::tempdir;

    const OWNER: &str = "owner-1";

    fn setup() -> SqliteOutboxStore {
        SqliteOutboxStore::new(Database::open_in_memory().unwrap())
    }

    fn put_op(id: &str) -> PendingOperation {
        PendingOperation::put(Article::new(id, OWNER))
    }

    #[test]
    fn test_append_assigns_increasing_sequences() {
        let outbox = setup();
        let first = outbox.append(&put_op("a1")).unwrap();
        let second = outbox.append(&PendingOperation::delete(OWNER, "a1")).unwrap();
        assert!(second > first);
    }

    #[test]
    fn test_pending_preserves_append_order() {
        let outbox = setup();
        outbox.append(&put_op("a1")).unwrap();
        outbox.append(&PendingOperation::delete(OWNER, "a1")).unwrap();
        outbox.append(&put_op("a2")).unwrap();

        let entries = outbox.pending(OWNER).unwrap();
        let kinds: Vec<_> = entries
            .iter()
            .map(|entry| (entry.article_id.as_str(), entry.operation))
            .collect();
        assert_eq!(
            kinds,
            vec![
                ("a1", OutboxOperation::Put),
                ("a1", OutboxOperation::Delete),
                ("a2", OutboxOperation::Put),
            ]
        );
    }

    #[test]
    fn test_pending_is_owner_scoped() {
        let outbox = setup();
        outbox.append(&put_op("a1")).unwrap();
        outbox
            .append(&PendingOperation::delete("someone-else", "x"))
            .unwrap();

        let entries = outbox.pending(OWNER).unwrap();
        assert_eq!(entries.len(), 1);
    }

    #[test]
    fn test_put_entries_carry_full_snapshot() {
        let outbox = setup();
        let mut article = Article::new("a1", OWNER);
        article.title = Some("Snapshot".to_string());
        outbox.append(&PendingOperation::put(article.clone())).unwrap();

        let entries = outbox.pending(OWNER).unwrap();
        assert_eq!(entries[0].payload.as_ref(), Some(&article));
    }

    #[test]
    fn test_acknowledge_removes_entry() {
        let outbox = setup();
        let sequence = outbox.append(&put_op("a1")).unwrap();
        outbox.acknowledge(sequence).unwrap();

        assert!(outbox.pending(OWNER).unwrap().is_empty());
    }

    #[test]
    fn test_mark_failed_increments_attempts() {
        let outbox = setup();
        let sequence = outbox.append(&put_op("a1")).unwrap();
        outbox.mark_failed(sequence, "connection refused").unwrap();
        outbox.mark_failed(sequence, "connection refused").unwrap();

        let entries = outbox.pending(OWNER).unwrap();
        assert_eq!(entries[0].attempts, 2);
        assert_eq!(entries[0].last_error.as_deref(), Some("connection refused"));
    }

    #[test]
    fn test_pending_put_ids() {
        let outbox = setup();
        outbox.append(&put_op("a1")).unwrap();
        outbox.append(&put_op("a1")).unwrap();
        outbox.append(&PendingOperation::delete(OWNER, "a2")).unwrap();

        let ids = outbox.pending_put_ids(OWNER).unwrap();
        assert_eq!(ids.len(), 1);
        assert!(ids.contains("a1"));
    }

    #[test]
    fn test_pending_skips_undecodable_entries() {
        let db = Database::open_in_memory().unwrap();
        let outbox = SqliteOutboxStore::new(db.clone());
        outbox.append(&put_op("good")).unwrap();

        // Corrupt payload written behind the store's back
        db.with_conn(|conn| {
            conn.execute(
                "INSERT INTO outbox (owner_id, article_id, operation, payload, created_at)
                 VALUES (?, ?, 'put', 'not json', 0)",
                params![OWNER, "bad"],
            )?;
            Ok(())
        })
        .unwrap();

        let entries = outbox.pending(OWNER).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].article_id, "good");
    }

    #[test]
    fn test_pending_skips_unknown_operations() {
        let db = Database::open_in_memory().unwrap();
        let outbox = SqliteOutboxStore::new(db.clone());
        db.with_conn(|conn| {
            conn.execute(
                "INSERT INTO outbox (owner_id, article_id, operation, created_at)
                 VALUES (?, ?, 'merge', 0)",
                params![OWNER, "a1"],
            )?;
            Ok(())
        })
        .unwrap();

        assert!(outbox.pending(OWNER).unwrap().is_empty());
    }

    #[test]
    fn test_appends_survive_reopen() {
        let tmp = tempdir().unwrap();
        let path = tmp.path().join("shelf.db");

        {
            let outbox = SqliteOutboxStore::new(Database::open(&path).unwrap());
            outbox.append(&put_op("a1")).unwrap();
        }

        let outbox = SqliteOutboxStore::new(Database::open(&path).unwrap());
        let entries = outbox.pending(OWNER).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].article_id, "a1");
    }
}
