//! Core library for a hierarchical bookmark store.
//!
//! [`BookmarkNodeManager`] owns the folder/bookmark tree and is the only way
//! to change it. Each mutation is validated up front, applied atomically,
//! announced to observers as a [`ChangeEvent`], and handed to an optional
//! [`PersistenceAdapter`]. [`BookmarkStore`] wires a manager to a SQLite file
//! at startup.
//!
//! Types are re-exported from their respective sub-modules for convenience;
//! consumers should import from the crate root rather than the `core` module.

pub mod core;

// Re-export commonly used types.
#[doc(inline)]
pub use core::{
    delete::DeleteResult,
    error::{BookmarkError, Result},
    events::{AddressStatus, BookmarkObserver, ChangeEvent, ChangeKind},
    export::{
        export_bookmarks, export_to_file, import_bookmarks, import_from_file, ExportBookmarks,
        APP_VERSION, EXPORT_VERSION,
    },
    manager::{BookmarkNodeManager, ROOT_FOLDER_ID, ROOT_ID},
    node::{BookmarkNode, IconRef, NodeKind},
    operation::Operation,
    operation_log::{OperationLog, OperationSummary, PurgeStrategy},
    persistence::{
        allocated_ids, load_snapshot, write_snapshot, FlushMode, PersistenceAdapter,
        SqlitePersistence,
    },
    record::NodeRecord,
    settings::{
        default_database_path, load_settings, load_settings_from, save_settings, save_settings_to,
        settings_file_path, StoreSettings,
    },
    shared::SharedBookmarks,
    storage::{Storage, SCHEMA_VERSION},
    store::{BookmarkStore, BOOKMARKS_BAR_NAME},
    tree::{Ancestors, Descendants, NodeRef, Tree, TreeError},
};
