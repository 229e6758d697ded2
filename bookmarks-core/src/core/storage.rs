use crate::{BookmarkError, Result};
use rusqlite::Connection;
use std::path::Path;

/// Current on-disk schema version, stored in `store_meta`.
pub const SCHEMA_VERSION: &str = "1";

pub struct Storage {
    conn: Connection,
}

impl Storage {
    pub fn create<P: AsRef<Path>>(path: P) -> Result<Self> {
        let conn = Connection::open(path)?;
        Self::init(conn)
    }

    /// Creates a throwaway database that lives only as long as the value.
    pub fn in_memory() -> Result<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.execute_batch(include_str!("schema.sql"))?;
        conn.execute(
            "INSERT OR REPLACE INTO store_meta (key, value) VALUES ('schema_version', ?)",
            [SCHEMA_VERSION],
        )?;
        Ok(Self { conn })
    }

    /// Opens an existing bookmarks database.
    ///
    /// # Errors
    ///
    /// Returns [`BookmarkError::CorruptStore`] if the file is not a SQLite
    /// database, lacks the bookmark tables, or carries an unknown schema
    /// version.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let conn = Connection::open(path)?;

        // Validate database structure
        let table_count: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master
                 WHERE type='table'
                 AND name IN ('bookmarks', 'operations', 'store_meta')",
                [],
                |row| row.get(0),
            )
            .map_err(|e| BookmarkError::CorruptStore(format!("Not a bookmarks database: {e}")))?;

        if table_count != 3 {
            return Err(BookmarkError::CorruptStore(
                "Not a bookmarks database".to_string(),
            ));
        }

        let version: Option<String> = conn
            .query_row(
                "SELECT value FROM store_meta WHERE key = 'schema_version'",
                [],
                |row| row.get(0),
            )
            .ok();
        if version.as_deref() != Some(SCHEMA_VERSION) {
            return Err(BookmarkError::CorruptStore(format!(
                "Unsupported schema version {version:?}"
            )));
        }

        Ok(Self { conn })
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    pub fn connection_mut(&mut self) -> &mut Connection {
        &mut self.conn
    }
}
