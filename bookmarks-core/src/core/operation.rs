//! Per-mutation records handed to the persistence adapter.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::NodeRecord;

/// A single tree mutation, emitted once per successful manager call.
///
/// Operations are produced in the order mutations were applied and carry a
/// full snapshot of the affected node, so an adapter can make them durable
/// without reading the live tree. Every variant carries a stable
/// `operation_id` and a wall-clock `timestamp`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Operation {
    /// A folder or bookmark was inserted.
    CreateNode {
        /// Stable UUID for this operation.
        operation_id: String,
        /// Unix timestamp (seconds) when the operation was created.
        timestamp: i64,
        /// The new node, including its parent and sibling position.
        node: NodeRecord,
    },
    /// A node's name, address, shortcut or icon changed.
    UpdateNode {
        /// Stable UUID for this operation.
        operation_id: String,
        /// Unix timestamp (seconds) when the operation was created.
        timestamp: i64,
        /// The node after the update.
        node: NodeRecord,
    },
    /// A node was relocated to a new parent or position.
    MoveNode {
        /// Stable UUID for this operation.
        operation_id: String,
        /// Unix timestamp (seconds) when the operation was created.
        timestamp: i64,
        /// The node at its new location.
        node: NodeRecord,
        /// Parent node ID before the move.
        old_parent_id: i64,
        /// Sibling position before the move.
        old_position: usize,
    },
    /// A node and its whole subtree were removed.
    DeleteNode {
        /// Stable UUID for this operation.
        operation_id: String,
        /// Unix timestamp (seconds) when the operation was created.
        timestamp: i64,
        /// The removed subtree root as it was before removal.
        node: NodeRecord,
        /// IDs of every removed node, descendants first.
        removed_ids: Vec<i64>,
    },
}

impl Operation {
    pub(crate) fn create(node: NodeRecord) -> Self {
        Self::CreateNode {
            operation_id: Uuid::new_v4().to_string(),
            timestamp: chrono::Utc::now().timestamp(),
            node,
        }
    }

    pub(crate) fn update(node: NodeRecord) -> Self {
        Self::UpdateNode {
            operation_id: Uuid::new_v4().to_string(),
            timestamp: chrono::Utc::now().timestamp(),
            node,
        }
    }

    pub(crate) fn moved(node: NodeRecord, old_parent_id: i64, old_position: usize) -> Self {
        Self::MoveNode {
            operation_id: Uuid::new_v4().to_string(),
            timestamp: chrono::Utc::now().timestamp(),
            node,
            old_parent_id,
            old_position,
        }
    }

    pub(crate) fn delete(node: NodeRecord, removed_ids: Vec<i64>) -> Self {
        Self::DeleteNode {
            operation_id: Uuid::new_v4().to_string(),
            timestamp: chrono::Utc::now().timestamp(),
            node,
            removed_ids,
        }
    }

    /// Returns the stable identifier for this operation.
    #[must_use]
    pub fn operation_id(&self) -> &str {
        match self {
            Self::CreateNode { operation_id, .. }
            | Self::UpdateNode { operation_id, .. }
            | Self::MoveNode { operation_id, .. }
            | Self::DeleteNode { operation_id, .. } => operation_id,
        }
    }

    /// Returns the wall-clock Unix timestamp (seconds) when this operation was created.
    #[must_use]
    pub fn timestamp(&self) -> i64 {
        match self {
            Self::CreateNode { timestamp, .. }
            | Self::UpdateNode { timestamp, .. }
            | Self::MoveNode { timestamp, .. }
            | Self::DeleteNode { timestamp, .. } => *timestamp,
        }
    }

    /// Returns the snapshot of the node this operation is about.
    #[must_use]
    pub fn node(&self) -> &NodeRecord {
        match self {
            Self::CreateNode { node, .. }
            | Self::UpdateNode { node, .. }
            | Self::MoveNode { node, .. }
            | Self::DeleteNode { node, .. } => node,
        }
    }

    /// Short type tag, matching the serde `type` field.
    #[must_use]
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::CreateNode { .. } => "CreateNode",
            Self::UpdateNode { .. } => "UpdateNode",
            Self::MoveNode { .. } => "MoveNode",
            Self::DeleteNode { .. } => "DeleteNode",
        }
    }
}
