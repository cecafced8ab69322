//! SQLite-backed cursor store.

use std::path::Path;

use rusqlite::{params, Connection, OptionalExtension};
use rusqlite_migration::{Migrations, M};
use tracing::debug;

use crate::error::{Result, SyncError};
use crate::model::Cursor;

use super::CursorStore;

/// Database migrations, applied in order and tracked via `user_version`.
fn migrations() -> Migrations<'static> {
    Migrations::new(vec![M::up(
        r#"
        -- Exactly one row, id = 1. Writes overwrite it.
        CREATE TABLE sync_cursor (
            id INTEGER PRIMARY KEY CHECK (id = 1),
            last_message_id TEXT,
            last_sequence TEXT,
            last_processed_at TEXT,
            updated_at TEXT NOT NULL DEFAULT (datetime('now'))
        );

        INSERT INTO sync_cursor (id) VALUES (1);
        "#,
    )])
}

/// Cursor store in a single-row SQLite table.
pub struct SqliteCursorStore {
    conn: Connection,
}

impl SqliteCursorStore {
    /// Open (or create) the database at `db_path`.
    pub fn open(db_path: impl AsRef<Path>) -> Result<Self> {
        let db_path = db_path.as_ref();
        if let Some(parent) = db_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| SyncError::io(parent, e))?;
        }

        let conn = Connection::open(db_path)?;
        // WAL keeps the single-row overwrite atomic across crashes.
        conn.execute_batch(
            r#"
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            "#,
        )?;
        debug!(path = %db_path.display(), "Opened cursor database");
        Self::from_connection(conn)
    }

    /// In-memory database, for tests.
    pub fn open_in_memory() -> Result<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(mut conn: Connection) -> Result<Self> {
        migrations().to_latest(&mut conn)?;
        Ok(Self { conn })
    }

    /// When the cursor was last written (SQLite `datetime('now')`, UTC).
    pub fn updated_at(&self) -> Result<Option<String>> {
        let updated = self
            .conn
            .query_row(
                "SELECT updated_at FROM sync_cursor WHERE id = 1",
                [],
                |row| row.get(0),
            )
            .optional()?;
        Ok(updated)
    }
}

/// Legacy databases stored "unset" as an empty string.
fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|s| !s.trim().is_empty())
}

impl CursorStore for SqliteCursorStore {
    fn read(&self) -> Result<Cursor> {
        let cursor = self
            .conn
            .query_row(
                "SELECT last_message_id, last_sequence, last_processed_at
                 FROM sync_cursor WHERE id = 1",
                [],
                |row| {
                    Ok(Cursor {
                        last_message_id: non_empty(row.get(0)?),
                        last_sequence: non_empty(row.get(1)?),
                        last_processed_at: non_empty(row.get(2)?),
                    })
                },
            )
            .optional()?;
        Ok(cursor.unwrap_or_default())
    }

    fn write(&mut self, cursor: &Cursor) -> Result<()> {
        self.conn.execute(
            "INSERT INTO sync_cursor (id, last_message_id, last_sequence, last_processed_at, updated_at)
             VALUES (1, ?1, ?2, ?3, datetime('now'))
             ON CONFLICT(id) DO UPDATE SET
                 last_message_id = excluded.last_message_id,
                 last_sequence = excluded.last_sequence,
                 last_processed_at = excluded.last_processed_at,
                 updated_at = excluded.updated_at",
            params![
                cursor.last_message_id,
                cursor.last_sequence,
                cursor.last_processed_at
            ],
        )?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Cursor {
        Cursor {
            last_message_id: Some("<m3@example.com>".into()),
            last_sequence: Some("7".into()),
            last_processed_at: Some("2024-01-03T09:00:00+00:00".into()),
        }
    }

    #[test]
    fn test_fresh_store_reads_empty_cursor() {
        let store = SqliteCursorStore::open_in_memory().unwrap();
        assert!(store.read().unwrap().is_empty());
    }

    #[test]
    fn test_write_then_read() {
        let mut store = SqliteCursorStore::open_in_memory().unwrap();
        store.write(&sample()).unwrap();
        assert_eq!(store.read().unwrap(), sample());
        assert!(store.updated_at().unwrap().is_some());
    }

    #[test]
    fn test_overwrite_keeps_single_row() {
        let mut store = SqliteCursorStore::open_in_memory().unwrap();
        store.write(&sample()).unwrap();
        let next = Cursor {
            last_message_id: Some("<m4@example.com>".into()),
            last_sequence: None,
            last_processed_at: Some("2024-01-04T09:00:00+00:00".into()),
        };
        store.write(&next).unwrap();

        assert_eq!(store.read().unwrap(), next);
        let rows: i64 = store
            .conn
            .query_row("SELECT COUNT(*) FROM sync_cursor", [], |row| row.get(0))
            .unwrap();
        assert_eq!(rows, 1);
    }

    #[test]
    fn test_empty_strings_read_as_unset() {
        let store = SqliteCursorStore::open_in_memory().unwrap();
        store
            .conn
            .execute(
                "UPDATE sync_cursor SET last_message_id = '', last_sequence = ' ' WHERE id = 1",
                [],
            )
            .unwrap();
        assert!(store.read().unwrap().is_empty());
    }

    #[test]
    fn test_persists_across_reopen() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("state").join("tracker.db");
        {
            let mut store = SqliteCursorStore::open(&path).unwrap();
            store.write(&sample()).unwrap();
        }
        let store = SqliteCursorStore::open(&path).unwrap();
        assert_eq!(store.read().unwrap(), sample());
    }
}
