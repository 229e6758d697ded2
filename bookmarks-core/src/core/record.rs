//! Flat record shape used to persist and restore the bookmark tree.
//!
//! A snapshot is a `Vec<NodeRecord>` in parent-first order: the root comes
//! first, and every record appears after its parent, with siblings in
//! their stored order. [`BookmarkNodeManager::from_records`] consumes
//! exactly this shape.
//!
//! [`BookmarkNodeManager::from_records`]: super::manager::BookmarkNodeManager::from_records

use serde::{Deserialize, Serialize};

use crate::{BookmarkNode, IconRef, NodeKind};

/// One node as written to durable storage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeRecord {
    pub id: i64,
    pub kind: NodeKind,
    pub name: String,
    pub address: Option<String>,
    pub shortcut: Option<String>,
    pub folder_id: i64,
    /// Node ID of the parent folder, or `None` for the root.
    pub parent_id: Option<i64>,
    /// Zero-based position among siblings.
    pub position: usize,
    pub icon: IconRef,
}

impl NodeRecord {
    pub(crate) fn from_node(node: &BookmarkNode, parent_id: Option<i64>, position: usize) -> Self {
        Self {
            id: node.id(),
            kind: node.kind(),
            name: node.name().to_string(),
            address: node.address().map(str::to_string),
            shortcut: node.shortcut().map(str::to_string),
            folder_id: node.folder_id(),
            parent_id,
            position,
            icon: node.icon().clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_serializes_camel_case() {
        let node = BookmarkNode::bookmark(7, 1, "Mail".to_string(), "https://mail.example/".to_string());
        let record = NodeRecord::from_node(&node, Some(2), 0);
        let json = serde_json::to_string(&record).unwrap();

        assert!(json.contains("\"folderId\":1"));
        assert!(json.contains("\"parentId\":2"));
        assert!(json.contains("\"kind\":\"Bookmark\""));
    }
}
