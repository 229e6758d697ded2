//! A cloneable, thread-safe handle to one bookmark manager.

use std::sync::{Arc, Mutex, MutexGuard};

use crate::BookmarkNodeManager;

/// All collaborators share one manager behind a single coarse lock.
///
/// Clone the handle to give another component access; every clone refers
/// to the same tree.
#[derive(Clone)]
pub struct SharedBookmarks {
    inner: Arc<Mutex<BookmarkNodeManager>>,
}

impl SharedBookmarks {
    pub fn new(manager: BookmarkNodeManager) -> Self {
        Self {
            inner: Arc::new(Mutex::new(manager)),
        }
    }

    /// Runs `f` with read access to the manager.
    pub fn with<R>(&self, f: impl FnOnce(&BookmarkNodeManager) -> R) -> R {
        f(&self.lock())
    }

    /// Runs `f` with write access to the manager.
    pub fn with_mut<R>(&self, f: impl FnOnce(&mut BookmarkNodeManager) -> R) -> R {
        f(&mut self.lock())
    }

    fn lock(&self) -> MutexGuard<'_, BookmarkNodeManager> {
        // Manager mutations are all-or-nothing; a poisoned tree is still consistent.
        self.inner.lock().unwrap_or_else(|poisoned| {
            log::warn!("bookmark lock was poisoned; continuing with the current tree");
            poisoned.into_inner()
        })
    }
}
