//! Durable operation journal and purge strategies for the bookmark store.

use crate::{Operation, Result};
use rusqlite::{Connection, Transaction};
use serde::{Deserialize, Serialize};

/// Seconds in one day; used to convert `retention_days` to a Unix timestamp cutoff.
const SECONDS_PER_DAY: i64 = 86_400;

/// Controls which old operations are removed from the journal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PurgeStrategy {
    /// Retain only the most recent `keep_last` operations.
    KeepLast { keep_last: usize },
    /// Retain operations for up to `retention_days`.
    MaxAge { retention_days: u32 },
}

/// A journal row without its JSON payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OperationSummary {
    pub operation_id: String,
    pub timestamp: i64,
    pub operation_type: String,
    pub node_id: i64,
}

/// Records tree mutations to the `operations` table and purges stale entries.
pub struct OperationLog {
    strategy: PurgeStrategy,
}

impl OperationLog {
    /// Creates a new `OperationLog` with the given purge strategy.
    pub fn new(strategy: PurgeStrategy) -> Self {
        Self { strategy }
    }

    /// Serialises `op` and appends it to the `operations` table within `tx`.
    ///
    /// # Errors
    ///
    /// Returns [`crate::BookmarkError::Database`] if the INSERT fails, or
    /// [`crate::BookmarkError::Json`] if `op` cannot be serialised.
    pub fn log(&self, tx: &Transaction, op: &Operation) -> Result<()> {
        let op_json = serde_json::to_string(op)?;

        tx.execute(
            "INSERT INTO operations (operation_id, timestamp, operation_type, node_id, operation_data)
             VALUES (?, ?, ?, ?, ?)",
            rusqlite::params![
                op.operation_id(),
                op.timestamp(),
                op.type_name(),
                op.node().id,
                op_json,
            ],
        )?;

        Ok(())
    }

    /// Deletes old operations from the journal according to the purge strategy.
    ///
    /// Call this after logging a batch to keep the table bounded in size.
    ///
    /// # Errors
    ///
    /// Returns [`crate::BookmarkError::Database`] if the DELETE fails.
    pub fn purge_if_needed(&self, tx: &Transaction) -> Result<()> {
        match self.strategy {
            PurgeStrategy::KeepLast { keep_last } => {
                tx.execute(
                    "DELETE FROM operations WHERE id NOT IN (
                        SELECT id FROM operations ORDER BY id DESC LIMIT ?
                    )",
                    [keep_last as i64],
                )?;
            }
            PurgeStrategy::MaxAge { retention_days } => {
                let cutoff =
                    chrono::Utc::now().timestamp() - (i64::from(retention_days) * SECONDS_PER_DAY);
                tx.execute("DELETE FROM operations WHERE timestamp < ?", [cutoff])?;
            }
        }
        Ok(())
    }

    /// Returns up to `limit` journal entries, newest first.
    ///
    /// # Errors
    ///
    /// Returns [`crate::BookmarkError::Database`] if the query fails.
    pub fn list(&self, conn: &Connection, limit: usize) -> Result<Vec<OperationSummary>> {
        let mut stmt = conn.prepare(
            "SELECT operation_id, timestamp, operation_type, node_id
             FROM operations ORDER BY id DESC LIMIT ?",
        )?;
        let rows = stmt
            .query_map([limit as i64], |row| {
                Ok(OperationSummary {
                    operation_id: row.get(0)?,
                    timestamp: row.get(1)?,
                    operation_type: row.get(2)?,
                    node_id: row.get(3)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    /// Deletes every journal entry. Returns the number deleted.
    ///
    /// # Errors
    ///
    /// Returns [`crate::BookmarkError::Database`] if the DELETE fails.
    pub fn purge_all(&self, conn: &Connection) -> Result<usize> {
        Ok(conn.execute("DELETE FROM operations", [])?)
    }
}
