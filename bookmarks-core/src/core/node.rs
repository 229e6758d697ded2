use serde::{Deserialize, Serialize};

/// Whether a node can hold children or points at an address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NodeKind {
    Folder,
    Bookmark,
}

/// Opaque icon handle; resolving it to pixels is the icon cache's job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "key")]
pub enum IconRef {
    FolderPlaceholder,
    BookmarkPlaceholder,
    /// Key into the icon cache, usually derived from the page's favicon.
    Cached(String),
}

impl IconRef {
    /// Placeholder icon for a freshly created node of `kind`.
    pub fn placeholder(kind: NodeKind) -> Self {
        match kind {
            NodeKind::Folder => Self::FolderPlaceholder,
            NodeKind::Bookmark => Self::BookmarkPlaceholder,
        }
    }
}

/// A folder or bookmark in the bookmark tree.
///
/// Nodes are only ever built and edited by
/// [`BookmarkNodeManager`](super::manager::BookmarkNodeManager); outside the
/// crate they are read-only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BookmarkNode {
    id: i64,
    kind: NodeKind,
    name: String,
    address: Option<String>,
    shortcut: Option<String>,
    icon: IconRef,
    /// A folder's own folder id, or the containing folder's id for a bookmark.
    folder_id: i64,
}

impl BookmarkNode {
    pub(crate) fn folder(id: i64, folder_id: i64, name: String) -> Self {
        Self {
            id,
            kind: NodeKind::Folder,
            name,
            address: None,
            shortcut: None,
            icon: IconRef::placeholder(NodeKind::Folder),
            folder_id,
        }
    }

    pub(crate) fn bookmark(id: i64, parent_folder_id: i64, name: String, address: String) -> Self {
        Self {
            id,
            kind: NodeKind::Bookmark,
            name,
            address: Some(address),
            shortcut: None,
            icon: IconRef::placeholder(NodeKind::Bookmark),
            folder_id: parent_folder_id,
        }
    }

    pub fn id(&self) -> i64 {
        self.id
    }

    pub fn kind(&self) -> NodeKind {
        self.kind
    }

    pub fn is_folder(&self) -> bool {
        self.kind == NodeKind::Folder
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Target address; always `None` for folders.
    pub fn address(&self) -> Option<&str> {
        self.address.as_deref()
    }

    pub fn shortcut(&self) -> Option<&str> {
        self.shortcut.as_deref()
    }

    pub fn icon(&self) -> &IconRef {
        &self.icon
    }

    pub fn folder_id(&self) -> i64 {
        self.folder_id
    }

    pub(crate) fn set_name(&mut self, name: String) {
        self.name = name;
    }

    pub(crate) fn set_address(&mut self, address: String) {
        self.address = Some(address);
    }

    /// Empty shortcuts are stored as `None`.
    pub(crate) fn set_shortcut(&mut self, shortcut: Option<String>) {
        self.shortcut = shortcut.filter(|s| !s.is_empty());
    }

    pub(crate) fn set_icon(&mut self, icon: IconRef) {
        self.icon = icon;
    }

    pub(crate) fn set_folder_id(&mut self, folder_id: i64) {
        self.folder_id = folder_id;
    }
}
