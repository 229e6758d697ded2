//! Internal domain modules for the bookmarks core library.
//!
//! All public types from these modules are re-exported at the crate root
//! with `#[doc(inline)]`; import from there in preference to this module.

pub mod delete;
pub mod error;
pub mod events;
pub mod export;
pub mod manager;
pub mod node;
pub mod operation;
pub mod operation_log;
pub mod persistence;
pub mod record;
pub mod settings;
pub mod shared;
pub mod storage;
pub mod store;
pub mod tree;

#[doc(inline)]
pub use delete::DeleteResult;
#[doc(inline)]
pub use error::{BookmarkError, Result};
#[doc(inline)]
pub use events::{AddressStatus, BookmarkObserver, ChangeEvent, ChangeKind};
#[doc(inline)]
pub use export::{
    export_bookmarks, export_to_file, import_bookmarks, import_from_file, ExportBookmarks,
    APP_VERSION, EXPORT_VERSION,
};
#[doc(inline)]
pub use manager::{BookmarkNodeManager, ROOT_FOLDER_ID, ROOT_ID};
#[doc(inline)]
pub use node::{BookmarkNode, IconRef, NodeKind};
#[doc(inline)]
pub use operation::Operation;
#[doc(inline)]
pub use operation_log::{OperationLog, OperationSummary, PurgeStrategy};
#[doc(inline)]
pub use persistence::{
    allocated_ids, load_snapshot, write_snapshot, FlushMode, PersistenceAdapter, SqlitePersistence,
};
#[doc(inline)]
pub use record::NodeRecord;
#[doc(inline)]
pub use settings::{
    default_database_path, load_settings, load_settings_from, save_settings, save_settings_to,
    settings_file_path, StoreSettings,
};
#[doc(inline)]
pub use shared::SharedBookmarks;
#[doc(inline)]
pub use storage::{Storage, SCHEMA_VERSION};
#[doc(inline)]
pub use store::{BookmarkStore, BOOKMARKS_BAR_NAME};
#[doc(inline)]
pub use tree::{Ancestors, Descendants, NodeRef, Tree, TreeError};
