//! Durable storage for the bookmark tree.
//!
//! The manager hands every mutation to a [`PersistenceAdapter`] as an
//! [`Operation`] and moves on; it never waits for, or rolls back because of,
//! the adapter. [`SqlitePersistence`] is the adapter used by
//! [`BookmarkStore`](crate::BookmarkStore): it mirrors the tree into the
//! `bookmarks` table, keeps sibling positions gapless, and journals each
//! operation through an [`OperationLog`].
//!
//! Write failures are logged and kept on the adapter (see
//! [`PersistenceAdapter::last_error`]); they are never returned through the
//! mutating call.

use std::collections::HashMap;

use rusqlite::{Connection, OptionalExtension, Transaction};
use serde::{Deserialize, Serialize};

use crate::{
    BookmarkError, IconRef, NodeKind, NodeRecord, Operation, OperationLog, Result, Storage,
};

/// Receives the manager's per-mutation records.
pub trait PersistenceAdapter: Send {
    /// Accepts one operation. Must not fail back into the caller; errors go
    /// to the adapter's own error channel.
    fn record(&mut self, op: &Operation);

    /// Writes out anything buffered.
    ///
    /// # Errors
    ///
    /// Returns the storage error that prevented the write.
    fn flush(&mut self) -> Result<()>;

    /// Most recent write failure, if any.
    fn last_error(&self) -> Option<String>;
}

/// When [`SqlitePersistence`] writes buffered operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "camelCase")]
pub enum FlushMode {
    /// One transaction per operation.
    #[default]
    Immediate,
    /// Buffer until `max_pending` operations are waiting or `flush` is called.
    #[serde(rename_all = "camelCase")]
    Batched { max_pending: usize },
}

pub struct SqlitePersistence {
    storage: Storage,
    operation_log: OperationLog,
    mode: FlushMode,
    pending: Vec<Operation>,
    dead_letters: Vec<Operation>,
    errors: Vec<String>,
}

impl SqlitePersistence {
    pub fn new(storage: Storage, mode: FlushMode, operation_log: OperationLog) -> Self {
        Self {
            storage,
            operation_log,
            mode,
            pending: Vec::new(),
            dead_letters: Vec::new(),
            errors: Vec::new(),
        }
    }

    pub fn storage(&self) -> &Storage {
        &self.storage
    }

    pub fn operation_log(&self) -> &OperationLog {
        &self.operation_log
    }

    /// Number of operations waiting to be written.
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Drains the adapter's error channel.
    pub fn take_errors(&mut self) -> Vec<String> {
        std::mem::take(&mut self.errors)
    }

    /// Operations that could not be written, oldest first.
    pub fn dead_letters(&self) -> &[Operation] {
        &self.dead_letters
    }

    pub fn take_dead_letters(&mut self) -> Vec<Operation> {
        std::mem::take(&mut self.dead_letters)
    }

    /// Writes out everything pending.
    ///
    /// The whole batch is tried in one transaction first. If that rolls
    /// back, each operation is retried in its own transaction; the ones
    /// that still fail are moved to the dead-letter list and reported, and
    /// the rest are written. Nothing stays pending afterwards. Returns the
    /// first per-operation failure, if any.
    fn write_pending(&mut self) -> Result<()> {
        if self.pending.is_empty() {
            return Ok(());
        }
        match self.write_batch() {
            Ok(()) => {
                log::debug!("persisted {} bookmark operation(s)", self.pending.len());
                self.pending.clear();
                Ok(())
            }
            Err(e) => {
                log::warn!(
                    "batch of {} bookmark operation(s) failed ({e}); retrying one at a time",
                    self.pending.len()
                );
                self.write_one_by_one()
            }
        }
    }

    fn write_batch(&mut self) -> Result<()> {
        let tx = self.storage.connection_mut().transaction()?;
        for op in &self.pending {
            apply_operation(&tx, op)?;
            self.operation_log.log(&tx, op)?;
        }
        self.operation_log.purge_if_needed(&tx)?;
        tx.commit()?;
        Ok(())
    }

    fn write_one_by_one(&mut self) -> Result<()> {
        let mut first_error = None;
        for op in std::mem::take(&mut self.pending) {
            if let Err(e) = self.write_one(&op) {
                log::error!(
                    "failed to persist {} of node {}: {e}",
                    op.type_name(),
                    op.node().id
                );
                self.errors
                    .push(format!("{} of node {}: {e}", op.type_name(), op.node().id));
                self.dead_letters.push(op);
                first_error.get_or_insert(e);
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    fn write_one(&mut self, op: &Operation) -> Result<()> {
        let tx = self.storage.connection_mut().transaction()?;
        apply_operation(&tx, op)?;
        self.operation_log.log(&tx, op)?;
        self.operation_log.purge_if_needed(&tx)?;
        tx.commit()?;
        Ok(())
    }
}

impl PersistenceAdapter for SqlitePersistence {
    fn record(&mut self, op: &Operation) {
        self.pending.push(op.clone());
        let due = match self.mode {
            FlushMode::Immediate => true,
            FlushMode::Batched { max_pending } => self.pending.len() >= max_pending.max(1),
        };
        if due {
            // Failures are already on the error channel.
            let _ = self.write_pending();
        }
    }

    fn flush(&mut self) -> Result<()> {
        self.write_pending()
    }

    fn last_error(&self) -> Option<String> {
        self.errors.last().cloned()
    }
}

impl Drop for SqlitePersistence {
    fn drop(&mut self) {
        let _ = self.write_pending();
        if !self.dead_letters.is_empty() {
            log::error!(
                "dropping {} unsaved bookmark operation(s)",
                self.dead_letters.len()
            );
        }
    }
}

/// Mirrors a single operation into the `bookmarks` table.
fn apply_operation(tx: &Transaction, op: &Operation) -> Result<()> {
    match op {
        Operation::CreateNode { node, .. } => {
            tx.execute(
                "UPDATE bookmarks SET position = position + 1 WHERE parent_id IS ?1 AND position >= ?2",
                rusqlite::params![node.parent_id, node.position as i64],
            )?;
            insert_row(tx, node)?;
            raise_allocated_ids(tx, node.id, node.folder_id)?;
        }
        Operation::UpdateNode { node, .. } => {
            let changed = tx.execute(
                "UPDATE bookmarks SET name = ?1, address = ?2, shortcut = ?3, folder_id = ?4, icon_json = ?5
                 WHERE id = ?6",
                rusqlite::params![
                    node.name,
                    node.address,
                    node.shortcut,
                    node.folder_id,
                    serde_json::to_string(&node.icon)?,
                    node.id,
                ],
            )?;
            if changed == 0 {
                return Err(BookmarkError::NotFound(node.id));
            }
        }
        Operation::MoveNode {
            node,
            old_parent_id,
            old_position,
            ..
        } => {
            // Close the gap in the old sibling group. The node still sits at
            // old_position until the final UPDATE, so exclude it.
            tx.execute(
                "UPDATE bookmarks SET position = position - 1 WHERE parent_id = ?1 AND position > ?2 AND id != ?3",
                rusqlite::params![old_parent_id, *old_position as i64, node.id],
            )?;
            // Open a gap in the new sibling group.
            tx.execute(
                "UPDATE bookmarks SET position = position + 1 WHERE parent_id IS ?1 AND position >= ?2 AND id != ?3",
                rusqlite::params![node.parent_id, node.position as i64, node.id],
            )?;
            let changed = tx.execute(
                "UPDATE bookmarks SET parent_id = ?1, position = ?2, folder_id = ?3 WHERE id = ?4",
                rusqlite::params![node.parent_id, node.position as i64, node.folder_id, node.id],
            )?;
            if changed == 0 {
                return Err(BookmarkError::NotFound(node.id));
            }
        }
        Operation::DeleteNode {
            node, removed_ids, ..
        } => {
            for id in removed_ids {
                tx.execute("DELETE FROM bookmarks WHERE id = ?1", [id])?;
            }
            tx.execute(
                "UPDATE bookmarks SET position = position - 1 WHERE parent_id IS ?1 AND position > ?2",
                rusqlite::params![node.parent_id, node.position as i64],
            )?;
        }
    }
    Ok(())
}

fn insert_row(conn: &Connection, node: &NodeRecord) -> Result<()> {
    conn.execute(
        "INSERT INTO bookmarks (id, kind, name, address, shortcut, folder_id, parent_id, position, icon_json)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
        rusqlite::params![
            node.id,
            kind_name(node.kind),
            node.name,
            node.address,
            node.shortcut,
            node.folder_id,
            node.parent_id,
            node.position as i64,
            serde_json::to_string(&node.icon)?,
        ],
    )?;
    Ok(())
}

const MAX_NODE_ID_KEY: &str = "max_node_id";
const MAX_FOLDER_ID_KEY: &str = "max_folder_id";

fn raise_allocated_ids(conn: &Connection, id: i64, folder_id: i64) -> Result<()> {
    for (key, value) in [(MAX_NODE_ID_KEY, id), (MAX_FOLDER_ID_KEY, folder_id)] {
        conn.execute(
            "INSERT INTO store_meta (key, value) VALUES (?1, ?2)
             ON CONFLICT(key) DO UPDATE SET value = MAX(CAST(value AS INTEGER), ?2)",
            rusqlite::params![key, value],
        )?;
    }
    Ok(())
}

/// Highest node ID and folder id ever written to this database, or
/// `(0, 0)` if nothing has been.
///
/// # Errors
///
/// Returns [`BookmarkError::Database`] if `store_meta` cannot be read.
pub fn allocated_ids(conn: &Connection) -> Result<(i64, i64)> {
    let read = |key: &str| -> Result<i64> {
        let value = conn
            .query_row("SELECT value FROM store_meta WHERE key = ?", [key], |row| {
                row.get::<_, String>(0)
            })
            .optional()?;
        Ok(value.and_then(|v| v.parse().ok()).unwrap_or(0))
    };
    Ok((read(MAX_NODE_ID_KEY)?, read(MAX_FOLDER_ID_KEY)?))
}

fn kind_name(kind: NodeKind) -> &'static str {
    match kind {
        NodeKind::Folder => "Folder",
        NodeKind::Bookmark => "Bookmark",
    }
}

/// Replaces the whole `bookmarks` table with `records` in one transaction.
///
/// # Errors
///
/// Returns [`BookmarkError::Database`] or [`BookmarkError::Json`] if a row
/// cannot be written; the table is left untouched in that case.
pub fn write_snapshot(storage: &mut Storage, records: &[NodeRecord]) -> Result<()> {
    let tx = storage.connection_mut().transaction()?;
    tx.execute("DELETE FROM bookmarks", [])?;
    for record in records {
        insert_row(&tx, record)?;
        raise_allocated_ids(&tx, record.id, record.folder_id)?;
    }
    tx.commit()?;
    log::info!("wrote bookmark snapshot with {} node(s)", records.len());
    Ok(())
}

type BookmarkRow = (
    i64,
    String,
    String,
    Option<String>,
    Option<String>,
    i64,
    Option<i64>,
    i64,
    String,
);

fn map_bookmark_row(row: &rusqlite::Row) -> rusqlite::Result<BookmarkRow> {
    Ok((
        row.get(0)?,
        row.get(1)?,
        row.get(2)?,
        row.get(3)?,
        row.get(4)?,
        row.get(5)?,
        row.get(6)?,
        row.get(7)?,
        row.get(8)?,
    ))
}

fn record_from_row(row: BookmarkRow) -> Result<NodeRecord> {
    let (id, kind, name, address, shortcut, folder_id, parent_id, position, icon_json) = row;
    let kind = match kind.as_str() {
        "Folder" => NodeKind::Folder,
        "Bookmark" => NodeKind::Bookmark,
        other => {
            return Err(BookmarkError::CorruptStore(format!(
                "node {id} has unknown kind {other:?}"
            )))
        }
    };
    let icon: IconRef = serde_json::from_str(&icon_json).map_err(|e| {
        BookmarkError::CorruptStore(format!("node {id} has unreadable icon: {e}"))
    })?;
    let position = usize::try_from(position).map_err(|_| {
        BookmarkError::CorruptStore(format!("node {id} has negative position {position}"))
    })?;
    Ok(NodeRecord {
        id,
        kind,
        name,
        address,
        shortcut,
        folder_id,
        parent_id,
        position,
        icon,
    })
}

/// Reads the stored tree back as a parent-first snapshot.
///
/// Rows whose parent cannot be reached from a root are appended at the end
/// so that [`BookmarkNodeManager::from_records`] reports them as dangling.
///
/// # Errors
///
/// Returns [`BookmarkError::Database`] if the query fails, or
/// [`BookmarkError::CorruptStore`] for rows that cannot be decoded.
///
/// [`BookmarkNodeManager::from_records`]: crate::BookmarkNodeManager::from_records
pub fn load_snapshot(conn: &Connection) -> Result<Vec<NodeRecord>> {
    let mut stmt = conn.prepare(
        "SELECT id, kind, name, address, shortcut, folder_id, parent_id, position, icon_json
         FROM bookmarks ORDER BY parent_id, position, id",
    )?;
    let rows = stmt
        .query_map([], map_bookmark_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    let mut by_parent: HashMap<Option<i64>, Vec<NodeRecord>> = HashMap::new();
    let total = rows.len();
    for row in rows {
        let record = record_from_row(row)?;
        by_parent.entry(record.parent_id).or_default().push(record);
    }

    let mut ordered = Vec::with_capacity(total);
    let mut stack: Vec<NodeRecord> = by_parent.remove(&None).unwrap_or_default();
    stack.reverse();
    while let Some(record) = stack.pop() {
        let id = record.id;
        ordered.push(record);
        if let Some(children) = by_parent.remove(&Some(id)) {
            stack.extend(children.into_iter().rev());
        }
    }

    let mut unreachable: Vec<NodeRecord> = by_parent.into_values().flatten().collect();
    if !unreachable.is_empty() {
        log::warn!("{} stored bookmark(s) are not reachable from the root", unreachable.len());
        unreachable.sort_by_key(|r| r.id);
        ordered.extend(unreachable);
    }
    Ok(ordered)
}
