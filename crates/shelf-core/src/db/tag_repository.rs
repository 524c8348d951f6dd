//! Tag repository implementation

use rusqlite::{params, types::Type};

use crate::error::Result;
use crate::models::{Tag, TagId};

use super::Database;

/// Trait for tag storage operations
pub trait TagStore {
    /// All tags, ordered by name
    fn list_tags(&self) -> Result<Vec<Tag>>;

    /// Replace the full tag set in one transaction
    fn replace_tags(&self, tags: &[Tag]) -> Result<()>;
}

/// `SQLite` implementation of `TagStore`
#[derive(Clone)]
pub struct SqliteTagStore {
    db: Database,
}

impl SqliteTagStore {
    /// Create a new store backed by the given database
    #[must_use]
    pub const fn new(db: Database) -> Self {
        Self { db }
    }

    fn parse_tag(row: &rusqlite::Row<'_>) -> rusqlite::Result<Tag> {
        let id: String = row.get(0)?;
        let id: TagId = id
            .parse()
            .map_err(|error| rusqlite::Error::FromSqlConversionFailure(0, Type::Text, Box::new(error)))?;
        Ok(Tag {
            id,
            name: row.get(1)?,
            color: row.get(2)?,
            created_at: row.get(3)?,
        })
    }
}

impl TagStore for SqliteTagStore {
    fn list_tags(&self) -> Result<Vec<Tag>> {
        self.db.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, name, color, created_at FROM tags ORDER BY name ASC",
            )?;
            let tags = stmt
                .query_map([], Self::parse_tag)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(tags)
        })
    }

    fn replace_tags(&self, tags: &[Tag]) -> Result<()> {
        self.db.with_conn(|conn| {
            let tx = conn.transaction()?;
            tx.execute("DELETE FROM tags", [])?;
            for tag in tags {
                tx.execute(
                    "INSERT INTO tags (id, name, color, created_at) VALUES (?, ?, ?, ?)",
                    params![tag.id.as_str(), tag.name, tag.color, tag.created_at],
                )?;
            }
            tx.commit()?;
            Ok(())
        })
    }
}
