//! Opening a bookmark database at startup.

use std::fs;
use std::path::{Path, PathBuf};

use crate::{
    allocated_ids, load_snapshot, write_snapshot, BookmarkError, BookmarkNodeManager, FlushMode,
    OperationLog, OperationSummary, PurgeStrategy, Result, SharedBookmarks, SqlitePersistence,
    Storage, StoreSettings,
};

/// Name of the folder seeded into a brand-new store.
pub const BOOKMARKS_BAR_NAME: &str = "Bookmarks Bar";

/// A loaded bookmark tree wired to its SQLite file.
///
/// Every mutation made through [`manager_mut`](Self::manager_mut) is written
/// back according to the store's [`FlushMode`].
pub struct BookmarkStore {
    manager: BookmarkNodeManager,
    path: PathBuf,
    load_warning: Option<String>,
}

impl BookmarkStore {
    /// Opens the store described by `settings`.
    ///
    /// # Errors
    ///
    /// See [`open_at`](Self::open_at).
    pub fn open(settings: &StoreSettings) -> Result<Self> {
        Self::open_at(
            &settings.database_path,
            settings.flush_mode,
            settings.operation_log_keep,
        )
    }

    /// Opens or creates the database at `path`.
    ///
    /// A database that fails validation is moved aside to
    /// `<file>.corrupt-<timestamp>` and replaced by a fresh store; the
    /// reason is kept in [`load_warning`](Self::load_warning).
    ///
    /// # Errors
    ///
    /// Returns [`BookmarkError::Io`] if the directory cannot be created or
    /// the corrupt file cannot be moved, and [`BookmarkError::Database`] for
    /// SQLite failures that are not caused by bad content.
    pub fn open_at<P: AsRef<Path>>(path: P, flush_mode: FlushMode, keep_last: usize) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }

        let mut load_warning = None;
        let has_content = fs::metadata(&path).map(|m| m.len() > 0).unwrap_or(false);
        let (storage, mut manager) = if has_content {
            match Self::load_existing(&path) {
                Ok(loaded) => loaded,
                Err(BookmarkError::CorruptStore(reason)) => {
                    let backup = Self::move_aside(&path)?;
                    log::warn!(
                        "bookmark store {} is corrupt ({reason}); moved to {} and starting fresh",
                        path.display(),
                        backup.display()
                    );
                    load_warning = Some(reason);
                    Self::create_fresh(&path)?
                }
                Err(e) => return Err(e),
            }
        } else {
            Self::create_fresh(&path)?
        };

        let operation_log = OperationLog::new(PurgeStrategy::KeepLast { keep_last });
        manager.set_persistence(Box::new(SqlitePersistence::new(
            storage,
            flush_mode,
            operation_log,
        )));
        log::info!(
            "opened bookmark store {} with {} node(s)",
            path.display(),
            manager.len()
        );

        Ok(Self {
            manager,
            path,
            load_warning,
        })
    }

    fn load_existing(path: &Path) -> Result<(Storage, BookmarkNodeManager)> {
        let storage = Storage::open(path)?;
        let records = load_snapshot(storage.connection())?;
        let mut manager = BookmarkNodeManager::from_records(records)?;
        let (max_id, max_folder_id) = allocated_ids(storage.connection())?;
        manager.reserve_ids(max_id, max_folder_id);
        Ok((storage, manager))
    }

    fn create_fresh(path: &Path) -> Result<(Storage, BookmarkNodeManager)> {
        let mut storage = Storage::create(path)?;
        let mut manager = BookmarkNodeManager::new();
        manager.create_folder(manager.root_id(), BOOKMARKS_BAR_NAME, None)?;
        write_snapshot(&mut storage, &manager.snapshot())?;
        Ok((storage, manager))
    }

    fn move_aside(path: &Path) -> Result<PathBuf> {
        let stamp = chrono::Utc::now().format("%Y%m%d%H%M%S");
        let mut name = path.file_name().unwrap_or_default().to_os_string();
        name.push(format!(".corrupt-{stamp}"));
        let backup = path.with_file_name(name);
        fs::rename(path, &backup)?;
        Ok(backup)
    }

    pub fn manager(&self) -> &BookmarkNodeManager {
        &self.manager
    }

    pub fn manager_mut(&mut self) -> &mut BookmarkNodeManager {
        &mut self.manager
    }

    pub fn into_manager(self) -> BookmarkNodeManager {
        self.manager
    }

    /// Hands the manager to a [`SharedBookmarks`] for use across threads.
    pub fn into_shared(self) -> SharedBookmarks {
        SharedBookmarks::new(self.manager)
    }

    /// Why the previous database was discarded, if it was.
    pub fn load_warning(&self) -> Option<&str> {
        self.load_warning.as_deref()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Most recent journal entries, newest first.
    ///
    /// Buffered operations that have not been flushed yet are not included.
    ///
    /// # Errors
    ///
    /// Returns [`BookmarkError::Database`] if the journal cannot be read.
    pub fn recent_operations(&self, limit: usize) -> Result<Vec<OperationSummary>> {
        let storage = Storage::open(&self.path)?;
        OperationLog::new(PurgeStrategy::KeepLast { keep_last: limit })
            .list(storage.connection(), limit)
    }
}
