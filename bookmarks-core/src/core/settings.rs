//! Store settings persistence.
//!
//! Settings live in a JSON file at an OS-appropriate location. A missing or
//! unreadable file is never an error: the defaults are used instead.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::{FlushMode, Result};

const DATABASE_FILE_NAME: &str = "bookmarks.db";

/// Persisted settings for a [`BookmarkStore`](crate::BookmarkStore).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StoreSettings {
    /// SQLite file holding the bookmark tree.
    pub database_path: PathBuf,
    pub flush_mode: FlushMode,
    /// How many journal entries to retain.
    pub operation_log_keep: usize,
}

impl Default for StoreSettings {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
            flush_mode: FlushMode::default(),
            operation_log_keep: 1000,
        }
    }
}

impl StoreSettings {
    /// Defaults with the database at `path`.
    pub fn at<P: Into<PathBuf>>(path: P) -> Self {
        Self {
            database_path: path.into(),
            ..Self::default()
        }
    }
}

/// Returns the path to the settings JSON file.
///
/// - macOS / Linux: `~/.config/bookmarks/settings.json`
/// - Windows: `%APPDATA%/Bookmarks/settings.json`
pub fn settings_file_path() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        let base = dirs::config_dir().unwrap_or_else(|| PathBuf::from("."));
        base.join("Bookmarks").join("settings.json")
    }
    #[cfg(not(target_os = "windows"))]
    {
        let home = dirs::home_dir().unwrap_or_else(|| PathBuf::from("."));
        home.join(".config").join("bookmarks").join("settings.json")
    }
}

/// Default database location inside the platform data directory.
pub fn default_database_path() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| {
            dirs::home_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join(".local")
                .join("share")
        })
        .join("bookmarks")
        .join(DATABASE_FILE_NAME)
}

/// Loads settings from the default location.
pub fn load_settings() -> StoreSettings {
    load_settings_from(settings_file_path())
}

/// Loads settings from `path`; returns defaults if the file is missing or corrupt.
pub fn load_settings_from<P: AsRef<Path>>(path: P) -> StoreSettings {
    let path = path.as_ref();
    match fs::read_to_string(path) {
        Ok(content) => serde_json::from_str(&content).unwrap_or_else(|e| {
            log::warn!("ignoring unreadable settings file {}: {e}", path.display());
            StoreSettings::default()
        }),
        Err(_) => StoreSettings::default(),
    }
}

/// Saves settings to the default location.
///
/// # Errors
///
/// See [`save_settings_to`].
pub fn save_settings(settings: &StoreSettings) -> Result<()> {
    save_settings_to(settings_file_path(), settings)
}

/// Saves settings to `path`, creating parent directories as needed.
///
/// # Errors
///
/// Returns [`crate::BookmarkError::Io`] if the directory or file cannot be
/// written.
pub fn save_settings_to<P: AsRef<Path>>(path: P, settings: &StoreSettings) -> Result<()> {
    let path = path.as_ref();
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let json = serde_json::to_string_pretty(settings)?;
    fs::write(path, json)?;
    Ok(())
}
