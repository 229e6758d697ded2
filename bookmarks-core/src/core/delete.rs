//! Result type and ordering rules for node removal.
//!
//! Removing a single node always removes its whole subtree. When several
//! nodes are selected at once (e.g. rows in a list view), they are removed
//! in an order that keeps every not-yet-processed sibling index valid:
//!
//! 1. duplicate IDs are collapsed,
//! 2. IDs whose ancestor is also selected are dropped (the ancestor's
//!    removal already covers them),
//! 3. the remaining targets are processed deepest first, and within one
//!    parent from the highest sibling index to the lowest.
//!
//! ## Examples
//!
//! ```rust
//! use bookmarks_core::DeleteResult;
//!
//! let result = DeleteResult {
//!     deleted_count: 2,
//!     affected_ids: vec![4, 3],
//! };
//! let json = serde_json::to_string(&result).unwrap();
//! assert!(json.contains("deletedCount"));
//! assert!(json.contains("affectedIds"));
//! ```

use serde::{Deserialize, Serialize};

/// The outcome of a remove operation on a
/// [`BookmarkNodeManager`](super::manager::BookmarkNodeManager).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteResult {
    /// The total number of nodes that were destroyed, descendants included.
    pub deleted_count: usize,

    /// IDs of every destroyed node, descendants before their ancestors.
    pub affected_ids: Vec<i64>,
}

impl DeleteResult {
    pub(crate) fn absorb(&mut self, other: DeleteResult) {
        self.deleted_count += other.deleted_count;
        self.affected_ids.extend(other.affected_ids);
    }
}

/// Where a selected node sits at the moment the selection is resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct RemovalTarget {
    pub id: i64,
    pub depth: usize,
    pub parent_id: i64,
    pub position: usize,
}

/// Sorts `targets` into a safe processing order: deepest first, then by
/// parent, then by descending sibling position.
pub(crate) fn removal_order(mut targets: Vec<RemovalTarget>) -> Vec<i64> {
    targets.sort_by(|a, b| {
        b.depth
            .cmp(&a.depth)
            .then(a.parent_id.cmp(&b.parent_id))
            .then(b.position.cmp(&a.position))
    });
    targets.into_iter().map(|t| t.id).collect()
}
