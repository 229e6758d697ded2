//! Bookmark export and import as a single JSON document.

use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::{BookmarkError, BookmarkNodeManager, NodeRecord, Result};

/// Format version written by this library.
pub const EXPORT_VERSION: u32 = 1;

/// Version of the library that wrote an export.
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Top-level JSON structure of an export file.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportBookmarks {
    pub version: u32,
    pub app_version: String,
    /// Parent-first snapshot, root included.
    pub nodes: Vec<NodeRecord>,
}

/// Writes the manager's whole tree to `writer` as pretty-printed JSON.
///
/// # Errors
///
/// Returns [`BookmarkError::Json`] if serialization or the write fails.
pub fn export_bookmarks<W: Write>(manager: &BookmarkNodeManager, writer: W) -> Result<()> {
    let export = ExportBookmarks {
        version: EXPORT_VERSION,
        app_version: APP_VERSION.to_string(),
        nodes: manager.snapshot(),
    };
    serde_json::to_writer_pretty(writer, &export)?;
    log::info!("exported {} bookmark node(s)", export.nodes.len());
    Ok(())
}

/// Exports to a new file at `path`, replacing any existing file.
///
/// # Errors
///
/// Returns [`BookmarkError::Io`] if the file cannot be created or flushed,
/// otherwise as [`export_bookmarks`].
pub fn export_to_file<P: AsRef<Path>>(manager: &BookmarkNodeManager, path: P) -> Result<()> {
    let mut writer = BufWriter::new(File::create(path)?);
    export_bookmarks(manager, &mut writer)?;
    writer.flush()?;
    Ok(())
}

/// Reads an export and rebuilds a detached manager from it.
///
/// The returned manager has no observers and no persistence; the caller
/// decides where it goes.
///
/// # Errors
///
/// Returns [`BookmarkError::Json`] for a malformed document,
/// [`BookmarkError::InvalidOperation`] for an export written by a newer
/// format version, and [`BookmarkError::CorruptStore`] if the nodes do not
/// form a valid tree.
pub fn import_bookmarks<R: Read>(reader: R) -> Result<BookmarkNodeManager> {
    let export: ExportBookmarks = serde_json::from_reader(reader)?;
    if export.version > EXPORT_VERSION {
        return Err(BookmarkError::InvalidOperation(format!(
            "Export format {} from version {} is newer than supported format {EXPORT_VERSION}",
            export.version, export.app_version
        )));
    }
    BookmarkNodeManager::from_records(export.nodes)
}

/// Imports from the file at `path`.
///
/// # Errors
///
/// Returns [`BookmarkError::Io`] if the file cannot be opened, otherwise as
/// [`import_bookmarks`].
pub fn import_from_file<P: AsRef<Path>>(path: P) -> Result<BookmarkNodeManager> {
    import_bookmarks(BufReader::new(File::open(path)?))
}
