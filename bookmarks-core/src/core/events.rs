//! Change notifications published by the manager after each mutation.
//!
//! Observers receive exactly one [`ChangeEvent`] per successful mutation,
//! in the order the mutations were applied. Failed calls publish nothing.
//! Read-side caches (display models, address-bar badges) use these to
//! re-synchronize instead of reading the tree while it is being edited.

use std::sync::mpsc::Sender;

use serde::{Deserialize, Serialize};

/// What happened to the node named by a [`ChangeEvent`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChangeKind {
    Added,
    /// The node and its subtree are gone; `removed_ids` lists all of them.
    Removed { removed_ids: Vec<i64> },
    Moved { old_parent_folder_id: i64 },
    Updated,
}

/// An address whose bookmarked status flipped during the mutation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddressStatus {
    pub address: String,
    pub bookmarked: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeEvent {
    /// Monotonic per-manager counter, starting at 1.
    pub sequence: u64,
    pub kind: ChangeKind,
    /// ID of the affected node.
    pub id: i64,
    /// Folder id of the node's parent after the mutation (before it, for removals).
    pub parent_folder_id: i64,
    pub address_status: Vec<AddressStatus>,
}

/// Receives change notifications from a
/// [`BookmarkNodeManager`](super::manager::BookmarkNodeManager).
pub trait BookmarkObserver: Send {
    fn on_change(&mut self, event: &ChangeEvent);
}

impl<F> BookmarkObserver for F
where
    F: FnMut(&ChangeEvent) + Send,
{
    fn on_change(&mut self, event: &ChangeEvent) {
        self(event);
    }
}

/// Event-channel subscriber. A disconnected receiver is ignored.
impl BookmarkObserver for Sender<ChangeEvent> {
    fn on_change(&mut self, event: &ChangeEvent) {
        if self.send(event.clone()).is_err() {
            log::debug!("dropping change event {}: receiver gone", event.sequence);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;

    fn event(sequence: u64) -> ChangeEvent {
        ChangeEvent {
            sequence,
            kind: ChangeKind::Added,
            id: 1,
            parent_folder_id: 0,
            address_status: vec![],
        }
    }

    #[test]
    fn test_channel_observer_forwards_events() {
        let (tx, rx) = mpsc::channel();
        let mut observer = tx;
        observer.on_change(&event(1));
        observer.on_change(&event(2));

        let got: Vec<u64> = rx.try_iter().map(|e| e.sequence).collect();
        assert_eq!(got, vec![1, 2]);
    }

    #[test]
    fn test_channel_observer_survives_dropped_receiver() {
        let (tx, rx) = mpsc::channel::<ChangeEvent>();
        drop(rx);
        let mut observer = tx;
        observer.on_change(&event(1));
    }
}
