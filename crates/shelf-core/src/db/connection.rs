//! Database connection management

use std::path::Path;
use std::sync::{Arc, Mutex};

use rusqlite::Connection;

use crate::error::{Error, Result};

use super::migrations;

/// Database wrapper for the on-device article cache.
///
/// Holds the connection behind a mutex so repositories can be used from
/// any thread; every operation is synchronous and never suspends while
/// the lock is held.
#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

impl Database {
    /// Open a database at the given path, creating it if it doesn't exist
    ///
    /// Runs migrations automatically.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let conn = Connection::open(path)?;
        Self::bootstrap(conn)
    }

    /// Open an in-memory database (useful for testing)
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Self::bootstrap(conn)
    }

    fn bootstrap(conn: Connection) -> Result<Self> {
        configure(&conn)?;
        migrations::run(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Run a closure against the connection while holding the lock.
    pub(crate) fn with_conn<T>(&self, f: impl FnOnce(&mut Connection) -> Result<T>) -> Result<T> {
        let mut guard = self
            .conn
            .lock()
            .map_err(|_| Error::Database("connection mutex poisoned".to_string()))?;
        f(&mut guard)
    }
}

/// Configure `SQLite` for durability and concurrent readers
fn configure(conn: &Connection) -> Result<()> {
    // WAL requires a file-backed database; ignore failures for in-memory
    conn.pragma_update(None, "journal_mode", "WAL").ok();
    conn.pragma_update(None, "synchronous", "NORMAL").ok();
    conn.pragma_update(None, "foreign_keys", "ON")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_open_in_memory() {
        let db = Database::open_in_memory().unwrap();
        db.with_conn(|conn| {
            let value: i32 = conn.query_row("SELECT 1", [], |row| row.get(0))?;
            assert_eq!(value, 1);
            Ok(())
        })
        .unwrap();
    }

    #[test]
    fn test_open_persists_across_reopen() {
        let tmp = tempdir().unwrap();
        let path = tmp.path().join("shelf.db");

        {
            let db = Database::open(&path).unwrap();
            db.with_conn(|conn| {
                conn.execute(
                    "INSERT INTO tags (id, name, color, created_at) VALUES (?, ?, ?, ?)",
                    rusqlite::params!["t1", "later", "#888888", 1],
                )?;
                Ok(())
            })
            .unwrap();
        }

        let db = Database::open(&path).unwrap();
        let count = db
            .with_conn(|conn| {
                let count: i64 = conn.query_row("SELECT COUNT(*) FROM tags", [], |row| row.get(0))?;
                Ok(count)
            })
            .unwrap();
        assert_eq!(count, 1);
    }
}
