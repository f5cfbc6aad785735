//! SQLite storage for the sync pipeline's state.

use std::path::Path;

use rusqlite::{params, Connection, OptionalExtension};

use crate::store::{BlobStore, StoreError};

#[derive(thiserror::Error, Debug)]
pub enum DbError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

pub struct Db {
    conn: Connection,
}

impl Db {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, DbError> {
        let conn = Connection::open(path)?;
        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;",
        )?;
        Ok(Self { conn })
    }

    /// Open an in-memory database (for testing).
    pub fn open_in_memory() -> Result<Self, DbError> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;",
        )?;
        Ok(Self { conn })
    }

    pub fn init(&self) -> Result<(), DbError> {
        let version: i32 = self
            .conn
            .pragma_query_value(None, "user_version", |row| row.get(0))?;

        if version < 1 {
            self.migrate_v1()?;
            self.conn.pragma_update(None, "user_version", 1)?;
        }

        let schema = include_str!("../../schema/sqlite.sql");
        self.conn.execute_batch(schema)?;

        Ok(())
    }

    /// Early builds kept cursors in their own table. Fold them into the
    /// blob store so every piece of state lives in one place.
    fn migrate_v1(&self) -> Result<(), DbError> {
        let schema = include_str!("../../schema/sqlite.sql");
        self.conn.execute_batch(schema)?;

        let has_legacy: bool = self
            .conn
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = 'fetch_cursors'",
                [],
                |row| row.get::<_, i64>(0),
            )
            .map(|count| count > 0)?;
        if !has_legacy {
            return Ok(());
        }

        let moved = self.conn.execute(
            "INSERT OR IGNORE INTO blobs (namespace, key, value, updated_at)
             SELECT 'cursor', code, CAST(last_fetched_date AS BLOB), datetime('now')
             FROM fetch_cursors WHERE last_fetched_date IS NOT NULL",
            [],
        )?;
        self.conn.execute("DROP TABLE fetch_cursors", [])?;
        tracing::info!("migrated {} legacy fetch cursors", moved);
        Ok(())
    }

    pub fn get_meta(&self, key: &str) -> Result<Option<String>, DbError> {
        self.conn
            .query_row(
                "SELECT value FROM ingest_meta WHERE key = ?1",
                params![key],
                |row| row.get(0),
            )
            .optional()
            .map_err(DbError::from)
    }

    pub fn set_meta(&self, key: &str, value: &str) -> Result<(), DbError> {
        self.conn.execute(
            "INSERT INTO ingest_meta (key, value) VALUES (?1, ?2)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
            params![key, value],
        )?;
        Ok(())
    }

    /// Number of blobs per namespace, for status output.
    pub fn namespace_counts(&self) -> Result<Vec<(String, i64)>, DbError> {
        let mut stmt = self.conn.prepare(
            "SELECT namespace, COUNT(*) FROM blobs GROUP BY namespace ORDER BY namespace",
        )?;
        let rows = stmt
            .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Last write time of one blob, RFC 3339.
    pub fn updated_at(&self, namespace: &str, key: &str) -> Result<Option<String>, DbError> {
        self.conn
            .query_row(
                "SELECT updated_at FROM blobs WHERE namespace = ?1 AND key = ?2",
                params![namespace, key],
                |row| row.get(0),
            )
            .optional()
            .map_err(DbError::from)
    }
}

impl BlobStore for Db {
    fn get(&self, namespace: &str, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        let value = self
            .conn
            .query_row(
                "SELECT value FROM blobs WHERE namespace = ?1 AND key = ?2",
                params![namespace, key],
                |row| row.get(0),
            )
            .optional()
            .map_err(DbError::from)?;
        Ok(value)
    }

    fn put(&self, namespace: &str, key: &str, value: &[u8]) -> Result<(), StoreError> {
        let now = chrono::Utc::now().to_rfc3339();
        self.conn
            .execute(
                "INSERT INTO blobs (namespace, key, value, updated_at) VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT(namespace, key) DO UPDATE SET
                   value = excluded.value,
                   updated_at = excluded.updated_at",
                params![namespace, key, value, now],
            )
            .map_err(DbError::from)?;
        Ok(())
    }

    fn delete(&self, namespace: &str, key: &str) -> Result<(), StoreError> {
        self.conn
            .execute(
                "DELETE FROM blobs WHERE namespace = ?1 AND key = ?2",
                params![namespace, key],
            )
            .map_err(DbError::from)?;
        Ok(())
    }

    fn keys(&self, namespace: &str) -> Result<Vec<String>, StoreError> {
        let mut stmt = self
            .conn
            .prepare("SELECT key FROM blobs WHERE namespace = ?1 ORDER BY key")
            .map_err(DbError::from)?;
        let keys = stmt
            .query_map(params![namespace], |row| row.get(0))
            .and_then(|rows| rows.collect::<Result<Vec<String>, _>>())
            .map_err(DbError::from)?;
        Ok(keys)
    }

    fn get_meta(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(Db::get_meta(self, key)?)
    }

    fn set_meta(&self, key: &str, value: &str) -> Result<(), StoreError> {
        Ok(Db::set_meta(self, key, value)?)
    }
}
