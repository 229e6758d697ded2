//! Error types for the bookmarks core library.

use thiserror::Error;

use crate::TreeError;

/// All errors that can occur within the bookmarks core library.
#[derive(Debug, Error)]
pub enum BookmarkError {
    /// The target parent is missing or is not a folder.
    #[error("Invalid parent: {0}")]
    InvalidParent(String),

    /// A bookmark address is not a well-formed URL.
    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    /// The operation does not apply to this node (e.g. an address on a folder).
    #[error("Invalid operation: {0}")]
    InvalidOperation(String),

    /// Another node already holds the requested shortcut.
    #[error("Duplicate shortcut: {0}")]
    DuplicateShortcut(String),

    /// A move would make a folder its own ancestor.
    #[error("Cyclic move: {0}")]
    CyclicMove(String),

    /// A node ID does not resolve to a live node.
    #[error("Node not found: {0}")]
    NotFound(i64),

    /// Persisted data violates a tree invariant.
    #[error("Corrupt bookmark store: {0}")]
    CorruptStore(String),

    /// A SQLite operation failed.
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// An I/O operation on the filesystem failed.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Stored data could not be (de)serialized as JSON.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Convenience alias that pins the error type to [`BookmarkError`].
pub type Result<T> = std::result::Result<T, BookmarkError>;

impl From<TreeError> for BookmarkError {
    fn from(e: TreeError) -> Self {
        match e {
            TreeError::WouldCycle { .. } => Self::CyclicMove(e.to_string()),
            TreeError::Stale(_)
            | TreeError::AlreadyAttached(_)
            | TreeError::NotAChild { .. }
            | TreeError::RootImmovable => Self::InvalidOperation(e.to_string()),
        }
    }
}

impl BookmarkError {
    /// Returns a short, human-readable message suitable for display to the end user.
    #[must_use]
    pub fn user_message(&self) -> String {
        match self {
            Self::InvalidParent(_) => "Bookmarks can only be placed inside a folder".to_string(),
            Self::InvalidAddress(addr) => format!("Not a valid web address: {addr}"),
            Self::InvalidOperation(msg) => msg.clone(),
            Self::DuplicateShortcut(s) => format!("The shortcut \"{s}\" is already in use"),
            Self::CyclicMove(_) => "A folder cannot be moved into itself".to_string(),
            Self::NotFound(_) => "Bookmark no longer exists".to_string(),
            Self::CorruptStore(_) => {
                "Bookmarks could not be loaded and were reset; a backup was kept".to_string()
            }
            Self::Database(e) => format!("Failed to save: {e}"),
            Self::Io(e) => format!("File error: {e}"),
            Self::Json(e) => format!("Data format error: {e}"),
        }
    }
}
