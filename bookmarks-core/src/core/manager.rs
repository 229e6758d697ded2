//! The single authority over the bookmark tree.

use std::collections::{HashMap, HashSet};
use std::sync::mpsc::{self, Receiver};

use url::Url;

use crate::core::delete::{removal_order, RemovalTarget};
use crate::{
    AddressStatus, BookmarkError, BookmarkNode, BookmarkObserver, ChangeEvent, ChangeKind,
    DeleteResult, IconRef, NodeKind, NodeRecord, NodeRef, Operation, PersistenceAdapter, Result,
    Tree,
};

/// ID of the root folder in a freshly created tree.
pub const ROOT_ID: i64 = 0;
/// Folder id of the root folder in a freshly created tree.
pub const ROOT_FOLDER_ID: i64 = 0;
const ROOT_NAME: &str = "Bookmarks";

/// Owns the bookmark tree and every index over it.
///
/// `BookmarkNodeManager` is the only type that creates, edits, relocates or
/// destroys [`BookmarkNode`]s. It keeps three auxiliary indexes (by ID, by
/// shortcut, by address) up to date on every mutation, so lookups never scan
/// the tree.
///
/// Every public mutation is all-or-nothing: arguments are fully validated
/// before the tree is touched, and a failed call leaves the tree, the
/// indexes and the ID allocators exactly as they were. After each successful
/// mutation the manager hands one [`Operation`] to the attached
/// [`PersistenceAdapter`] and one [`ChangeEvent`] to every observer.
///
/// There is no internal locking. Share one instance across threads through
/// [`SharedBookmarks`](crate::SharedBookmarks).
pub struct BookmarkNodeManager {
    tree: Tree<BookmarkNode>,
    by_id: HashMap<i64, NodeRef>,
    by_shortcut: HashMap<String, i64>,
    by_address: HashMap<String, Vec<i64>>,
    next_id: i64,
    next_folder_id: i64,
    sequence: u64,
    observers: Vec<Box<dyn BookmarkObserver>>,
    persistence: Option<Box<dyn PersistenceAdapter>>,
}

impl Default for BookmarkNodeManager {
    fn default() -> Self {
        Self::new()
    }
}

impl BookmarkNodeManager {
    /// Creates a manager holding only the root folder.
    pub fn new() -> Self {
        Self::with_root(BookmarkNode::folder(
            ROOT_ID,
            ROOT_FOLDER_ID,
            ROOT_NAME.to_string(),
        ))
    }

    fn with_root(root: BookmarkNode) -> Self {
        let root_id = root.id();
        let root_folder_id = root.folder_id();
        let tree = Tree::new(root);
        let mut by_id = HashMap::new();
        by_id.insert(root_id, tree.root());
        Self {
            tree,
            by_id,
            by_shortcut: HashMap::new(),
            by_address: HashMap::new(),
            next_id: root_id + 1,
            next_folder_id: root_folder_id + 1,
            sequence: 0,
            observers: Vec::new(),
            persistence: None,
        }
    }

    // ── collaborators ────────────────────────────────────────────

    /// Registers an observer that is called after every successful mutation.
    pub fn add_observer<O: BookmarkObserver + 'static>(&mut self, observer: O) {
        self.observers.push(Box::new(observer));
    }

    /// Returns a channel that receives a copy of every future change event.
    pub fn subscribe(&mut self) -> Receiver<ChangeEvent> {
        let (tx, rx) = mpsc::channel();
        self.add_observer(tx);
        rx
    }

    /// Attaches the adapter that receives one [`Operation`] per mutation,
    /// replacing any previous adapter.
    pub fn set_persistence(&mut self, adapter: Box<dyn PersistenceAdapter>) {
        self.persistence = Some(adapter);
    }

    pub fn persistence(&self) -> Option<&dyn PersistenceAdapter> {
        self.persistence.as_deref()
    }

    /// Asks the attached adapter to write out anything it has buffered.
    ///
    /// # Errors
    ///
    /// Returns whatever error the adapter reports. The in-memory tree is not
    /// affected either way.
    pub fn flush(&mut self) -> Result<()> {
        match self.persistence.as_mut() {
            Some(adapter) => adapter.flush(),
            None => Ok(()),
        }
    }

    /// Keeps future allocations above IDs that were handed out in an
    /// earlier session, including ones whose nodes have since been removed.
    pub fn reserve_ids(&mut self, max_id: i64, max_folder_id: i64) {
        self.next_id = self.next_id.max(max_id.saturating_add(1));
        self.next_folder_id = self.next_folder_id.max(max_folder_id.saturating_add(1));
    }

    // ── queries ──────────────────────────────────────────────────

    /// ID of the root folder.
    pub fn root_id(&self) -> i64 {
        self.tree.get(self.tree.root()).map_or(ROOT_ID, BookmarkNode::id)
    }

    /// Number of live nodes, including the root.
    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_id.len() <= 1
    }

    pub fn find_by_id(&self, id: i64) -> Option<&BookmarkNode> {
        self.by_id.get(&id).and_then(|h| self.tree.get(*h))
    }

    pub fn find_by_shortcut(&self, shortcut: &str) -> Option<&BookmarkNode> {
        self.by_shortcut
            .get(shortcut)
            .and_then(|id| self.find_by_id(*id))
    }

    /// True if at least one bookmark points at `address`.
    ///
    /// The address is normalized the same way stored addresses are, so
    /// `https://mail.example` matches a bookmark saved as
    /// `https://mail.example/`. Unparseable input is never bookmarked.
    pub fn is_bookmarked(&self, address: &str) -> bool {
        normalize_address(address)
            .ok()
            .and_then(|a| self.by_address.get(&a))
            .is_some_and(|ids| !ids.is_empty())
    }

    /// Every bookmark pointing at `address`, in the order they were indexed.
    pub fn find_nodes_by_address(&self, address: &str) -> Vec<&BookmarkNode> {
        let Ok(address) = normalize_address(address) else {
            return Vec::new();
        };
        self.by_address
            .get(&address)
            .map(|ids| ids.iter().filter_map(|id| self.find_by_id(*id)).collect())
            .unwrap_or_default()
    }

    /// Direct children of `id` in display order.
    ///
    /// # Errors
    ///
    /// Returns [`BookmarkError::NotFound`] if `id` is not a live node.
    pub fn children(&self, id: i64) -> Result<impl Iterator<Item = &BookmarkNode> + '_> {
        let handle = self.handle(id)?;
        Ok(self
            .tree
            .children(handle)
            .iter()
            .filter_map(move |h| self.tree.get(*h)))
    }

    /// The folder containing `id`, or `None` for the root.
    ///
    /// # Errors
    ///
    /// Returns [`BookmarkError::NotFound`] if `id` is not a live node.
    pub fn parent_of(&self, id: i64) -> Result<Option<&BookmarkNode>> {
        let handle = self.handle(id)?;
        Ok(self.tree.parent(handle).and_then(|p| self.tree.get(p)))
    }

    /// Sibling index of `id`, or `None` for the root.
    ///
    /// # Errors
    ///
    /// Returns [`BookmarkError::NotFound`] if `id` is not a live node.
    pub fn position_of(&self, id: i64) -> Result<Option<usize>> {
        let handle = self.handle(id)?;
        Ok(self.tree.position(handle))
    }

    /// Names from the root down to `id`, inclusive.
    ///
    /// # Errors
    ///
    /// Returns [`BookmarkError::NotFound`] if `id` is not a live node.
    pub fn path_of(&self, id: i64) -> Result<Vec<&str>> {
        let handle = self.handle(id)?;
        let mut names: Vec<&str> = std::iter::once(handle)
            .chain(self.tree.ancestors(handle))
            .filter_map(|h| self.tree.get(h))
            .map(BookmarkNode::name)
            .collect();
        names.reverse();
        Ok(names)
    }

    /// Depth-first pre-order walk over the whole tree, root first.
    pub fn walk(&self) -> impl Iterator<Item = &BookmarkNode> + '_ {
        self.tree
            .descendants(self.tree.root())
            .filter_map(move |h| self.tree.get(h))
    }

    /// All folders in pre-order, root first.
    pub fn folders(&self) -> Vec<&BookmarkNode> {
        self.walk().filter(|n| n.is_folder()).collect()
    }

    /// Full ordered snapshot: parent-first, siblings in display order.
    pub fn snapshot(&self) -> Vec<NodeRecord> {
        let mut records = Vec::with_capacity(self.tree.len());
        let mut stack = vec![(self.tree.root(), None, 0usize)];
        while let Some((handle, parent_id, position)) = stack.pop() {
            let Some(node) = self.tree.get(handle) else {
                continue;
            };
            records.push(NodeRecord::from_node(node, parent_id, position));
            for (index, child) in self.tree.children(handle).iter().enumerate().rev() {
                stack.push((*child, Some(node.id()), index));
            }
        }
        records
    }

    // ── creation ─────────────────────────────────────────────────

    /// Creates a folder named `name` inside `parent_id`.
    ///
    /// The folder gets a fresh node ID and a fresh folder id. It is
    /// inserted at `at_index` (clamped to the sibling count) or appended
    /// when no index is given. Returns the new node's ID.
    ///
    /// # Errors
    ///
    /// Returns [`BookmarkError::InvalidParent`] if `parent_id` does not name
    /// a live folder, or [`BookmarkError::InvalidOperation`] once the ID
    /// space is used up.
    pub fn create_folder(
        &mut self,
        parent_id: i64,
        name: &str,
        at_index: Option<usize>,
    ) -> Result<i64> {
        let parent = self.folder_handle(parent_id)?;
        let parent_folder_id = self.node(parent)?.folder_id();

        let id = self.unused_id()?;
        let folder_id = self.unused_folder_id()?;
        let handle = self.attach_new(
            parent,
            BookmarkNode::folder(id, folder_id, name.to_string()),
            at_index,
        )?;
        self.next_id += 1;
        self.next_folder_id += 1;

        log::debug!("created folder {id} ({name:?}) in folder {parent_folder_id}");
        let record = self.record_of(handle)?;
        self.publish(
            ChangeKind::Added,
            id,
            parent_folder_id,
            Vec::new(),
            Operation::create(record),
        );
        Ok(id)
    }

    /// Creates a bookmark for `address` inside `parent_id`.
    ///
    /// The address is parsed and stored in normalized form. The bookmark's
    /// folder id is copied from its parent. Returns the new node's ID.
    ///
    /// # Errors
    ///
    /// Returns [`BookmarkError::InvalidParent`] if `parent_id` does not name
    /// a live folder, [`BookmarkError::InvalidAddress`] if `address` is
    /// not a well-formed absolute URL, or [`BookmarkError::InvalidOperation`]
    /// once the ID space is used up.
    pub fn create_bookmark(
        &mut self,
        parent_id: i64,
        name: &str,
        address: &str,
        at_index: Option<usize>,
    ) -> Result<i64> {
        let parent = self.folder_handle(parent_id)?;
        let address = normalize_address(address)?;
        let parent_folder_id = self.node(parent)?.folder_id();

        let id = self.unused_id()?;
        let handle = self.attach_new(
            parent,
            BookmarkNode::bookmark(id, parent_folder_id, name.to_string(), address.clone()),
            at_index,
        )?;
        self.next_id += 1;

        let mut status = Vec::new();
        if self.index_address(&address, id) {
            status.push(AddressStatus {
                address,
                bookmarked: true,
            });
        }

        log::debug!("created bookmark {id} ({name:?}) in folder {parent_folder_id}");
        let record = self.record_of(handle)?;
        self.publish(
            ChangeKind::Added,
            id,
            parent_folder_id,
            status,
            Operation::create(record),
        );
        Ok(id)
    }

    // ── removal ──────────────────────────────────────────────────

    /// Removes `id` and, for a folder, its entire subtree.
    ///
    /// Every removed ID and shortcut stops resolving immediately. IDs are
    /// never handed out again in this session.
    ///
    /// # Errors
    ///
    /// Returns [`BookmarkError::NotFound`] if `id` is not a live node, or
    /// [`BookmarkError::InvalidOperation`] for the root folder.
    pub fn remove(&mut self, id: i64) -> Result<DeleteResult> {
        let handle = self.handle(id)?;
        if handle == self.tree.root() {
            return Err(BookmarkError::InvalidOperation(
                "The root folder cannot be removed".to_string(),
            ));
        }
        self.remove_handle(handle)
    }

    /// Removes several nodes selected together.
    ///
    /// The selection is deduplicated, nodes already covered by a selected
    /// ancestor are skipped, and the rest are removed deepest first and
    /// from the highest sibling index down, so no removal disturbs a
    /// position still waiting to be processed. One [`ChangeEvent`] is
    /// published per removed subtree.
    ///
    /// # Errors
    ///
    /// Fails before removing anything if any ID is unknown
    /// ([`BookmarkError::NotFound`]) or names the root
    /// ([`BookmarkError::InvalidOperation`]).
    pub fn remove_many(&mut self, ids: &[i64]) -> Result<DeleteResult> {
        let mut seen = HashSet::new();
        let mut selected = Vec::new();
        for &id in ids {
            if !seen.insert(id) {
                continue;
            }
            let handle = self.handle(id)?;
            if handle == self.tree.root() {
                return Err(BookmarkError::InvalidOperation(
                    "The root folder cannot be removed".to_string(),
                ));
            }
            selected.push(handle);
        }

        let selected_set: HashSet<NodeRef> = selected.iter().copied().collect();
        let mut targets = Vec::with_capacity(selected.len());
        for handle in selected {
            if self.tree.ancestors(handle).any(|a| selected_set.contains(&a)) {
                continue;
            }
            let parent = self.tree.parent(handle).ok_or_else(|| {
                BookmarkError::InvalidOperation("Cannot remove a detached node".to_string())
            })?;
            targets.push(RemovalTarget {
                id: self.node(handle)?.id(),
                depth: self.tree.depth(handle),
                parent_id: self.node(parent)?.id(),
                position: self.tree.position(handle).unwrap_or(0),
            });
        }

        let mut total = DeleteResult::default();
        for id in removal_order(targets) {
            let handle = self.handle(id)?;
            total.absorb(self.remove_handle(handle)?);
        }
        Ok(total)
    }

    /// Removes the children of `parent_id` at the given row indexes.
    ///
    /// Rows are resolved to node IDs before anything is removed, so the
    /// surviving children keep their original relative order.
    ///
    /// # Errors
    ///
    /// Returns [`BookmarkError::InvalidParent`] if `parent_id` is not a live
    /// folder, or [`BookmarkError::InvalidOperation`] if a row is out of
    /// range. Nothing is removed in either case.
    pub fn remove_children_at(&mut self, parent_id: i64, rows: &[usize]) -> Result<DeleteResult> {
        let parent = self.folder_handle(parent_id)?;
        let children = self.tree.children(parent);
        let mut ids = Vec::with_capacity(rows.len());
        for &row in rows {
            let child = children.get(row).ok_or_else(|| {
                BookmarkError::InvalidOperation(format!(
                    "Row {row} is out of range for folder {parent_id}"
                ))
            })?;
            ids.push(self.node(*child)?.id());
        }
        self.remove_many(&ids)
    }

    fn remove_handle(&mut self, handle: NodeRef) -> Result<DeleteResult> {
        let record = self.record_of(handle)?;
        let parent_folder_id = self
            .tree
            .parent(handle)
            .and_then(|p| self.tree.get(p))
            .map_or(ROOT_FOLDER_ID, BookmarkNode::folder_id);

        let removed = self.tree.remove_subtree(handle)?;

        let mut status = Vec::new();
        let mut removed_ids = Vec::with_capacity(removed.len());
        for node in &removed {
            self.by_id.remove(&node.id());
            if let Some(shortcut) = node.shortcut() {
                self.by_shortcut.remove(shortcut);
            }
            if let Some(address) = node.address() {
                if self.unindex_address(address, node.id()) {
                    status.push(AddressStatus {
                        address: address.to_string(),
                        bookmarked: false,
                    });
                }
            }
            removed_ids.push(node.id());
        }

        log::info!(
            "removed node {} with {} descendant(s)",
            record.id,
            removed_ids.len() - 1
        );
        self.publish(
            ChangeKind::Removed {
                removed_ids: removed_ids.clone(),
            },
            record.id,
            parent_folder_id,
            status,
            Operation::delete(record, removed_ids.clone()),
        );
        Ok(DeleteResult {
            deleted_count: removed_ids.len(),
            affected_ids: removed_ids,
        })
    }

    // ── relocation ───────────────────────────────────────────────

    /// Moves `id` (with its subtree) into `new_parent_id`.
    ///
    /// `at_index` is the node's final sibling index in the destination,
    /// clamped to the valid range; `None` appends. Moving within the same
    /// folder reorders. Bookmarks in the moved subtree get their folder id
    /// refreshed to match their containing folder. The node's ID never
    /// changes.
    ///
    /// # Errors
    ///
    /// Returns [`BookmarkError::NotFound`] if `id` is unknown,
    /// [`BookmarkError::InvalidParent`] if `new_parent_id` is not a live
    /// folder, [`BookmarkError::CyclicMove`] if `new_parent_id` is `id`
    /// itself or one of its descendants, and
    /// [`BookmarkError::InvalidOperation`] for the root.
    pub fn move_node(&mut self, id: i64, new_parent_id: i64, at_index: Option<usize>) -> Result<()> {
        let handle = self.handle(id)?;
        if handle == self.tree.root() {
            return Err(BookmarkError::InvalidOperation(
                "The root folder cannot be moved".to_string(),
            ));
        }
        let new_parent = self.handle(new_parent_id).map_err(|_| {
            BookmarkError::InvalidParent(format!("Node {new_parent_id} does not exist"))
        })?;

        // Walk up from the destination looking for the node being moved.
        if self.tree.is_ancestor_or_self(handle, new_parent) {
            return Err(BookmarkError::CyclicMove(format!(
                "Node {id} cannot be moved into itself or its descendant {new_parent_id}"
            )));
        }
        if !self.node(new_parent)?.is_folder() {
            return Err(BookmarkError::InvalidParent(format!(
                "Node {new_parent_id} is not a folder"
            )));
        }

        let old_parent = self.tree.parent(handle).ok_or_else(|| {
            BookmarkError::InvalidOperation(format!("Node {id} is not attached"))
        })?;
        let old_position = self.tree.position(handle).unwrap_or(0);
        let old_parent_id = self.node(old_parent)?.id();
        let old_parent_folder_id = self.node(old_parent)?.folder_id();
        let new_parent_folder_id = self.node(new_parent)?.folder_id();

        self.tree.detach(old_parent, handle)?;
        if let Err(e) = self
            .tree
            .insert_at(new_parent, handle, at_index.unwrap_or(usize::MAX))
        {
            self.tree.insert_at(old_parent, handle, old_position)?;
            return Err(e.into());
        }
        let refreshed = self.sync_folder_ids(handle);

        log::debug!(
            "moved node {id} from folder {old_parent_folder_id} to folder {new_parent_folder_id} \
             ({refreshed} folder id(s) refreshed)"
        );
        let record = self.record_of(handle)?;
        self.publish(
            ChangeKind::Moved {
                old_parent_folder_id,
            },
            id,
            new_parent_folder_id,
            Vec::new(),
            Operation::moved(record, old_parent_id, old_position),
        );
        Ok(())
    }

    /// Re-derives the cached folder id of every bookmark under `top`.
    /// Returns how many values actually changed.
    fn sync_folder_ids(&mut self, top: NodeRef) -> usize {
        let bookmarks: Vec<(NodeRef, i64)> = self
            .tree
            .descendants(top)
            .filter(|h| self.tree.get(*h).is_some_and(|n| !n.is_folder()))
            .filter_map(|h| {
                let parent = self.tree.parent(h)?;
                Some((h, self.tree.get(parent)?.folder_id()))
            })
            .collect();

        let mut changed = 0;
        for (handle, folder_id) in bookmarks {
            if let Some(node) = self.tree.get_mut(handle) {
                if node.folder_id() != folder_id {
                    node.set_folder_id(folder_id);
                    changed += 1;
                }
            }
        }
        changed
    }

    // ── attribute edits ──────────────────────────────────────────

    /// Renames `id`. Empty names are allowed.
    ///
    /// # Errors
    ///
    /// Returns [`BookmarkError::NotFound`] if `id` is unknown.
    pub fn rename(&mut self, id: i64, new_name: &str) -> Result<()> {
        let handle = self.handle(id)?;
        self.node_mut(handle)?.set_name(new_name.to_string());
        self.publish_update(handle, Vec::new())
    }

    /// Points bookmark `id` at `new_address`.
    ///
    /// # Errors
    ///
    /// Returns [`BookmarkError::NotFound`] if `id` is unknown,
    /// [`BookmarkError::InvalidOperation`] if `id` is a folder, or
    /// [`BookmarkError::InvalidAddress`] if `new_address` does not parse.
    pub fn set_address(&mut self, id: i64, new_address: &str) -> Result<()> {
        let handle = self.handle(id)?;
        let node = self.node(handle)?;
        if node.is_folder() {
            return Err(BookmarkError::InvalidOperation(format!(
                "Folder {id} cannot have an address"
            )));
        }
        let new_address = normalize_address(new_address)?;
        let old_address = node.address().map(str::to_string);

        let mut status = Vec::new();
        if old_address.as_deref() != Some(new_address.as_str()) {
            if let Some(old) = old_address {
                if self.unindex_address(&old, id) {
                    status.push(AddressStatus {
                        address: old,
                        bookmarked: false,
                    });
                }
            }
            if self.index_address(&new_address, id) {
                status.push(AddressStatus {
                    address: new_address.clone(),
                    bookmarked: true,
                });
            }
        }
        self.node_mut(handle)?.set_address(new_address);
        self.publish_update(handle, status)
    }

    /// Assigns a quick-load shortcut to `id`; an empty value clears it.
    ///
    /// # Errors
    ///
    /// Returns [`BookmarkError::NotFound`] if `id` is unknown,
    /// [`BookmarkError::InvalidOperation`] for the root folder, or
    /// [`BookmarkError::DuplicateShortcut`] if another node already holds
    /// `new_shortcut`.
    pub fn set_shortcut(&mut self, id: i64, new_shortcut: &str) -> Result<()> {
        let handle = self.handle(id)?;
        if handle == self.tree.root() && !new_shortcut.is_empty() {
            return Err(BookmarkError::InvalidOperation(
                "The root folder cannot have a shortcut".to_string(),
            ));
        }
        if !new_shortcut.is_empty() {
            if let Some(holder) = self.by_shortcut.get(new_shortcut) {
                if *holder != id {
                    return Err(BookmarkError::DuplicateShortcut(new_shortcut.to_string()));
                }
            }
        }

        let old = self.node(handle)?.shortcut().map(str::to_string);
        if let Some(old) = old {
            self.by_shortcut.remove(&old);
        }
        if !new_shortcut.is_empty() {
            self.by_shortcut.insert(new_shortcut.to_string(), id);
        }
        self.node_mut(handle)?
            .set_shortcut(Some(new_shortcut.to_string()));
        self.publish_update(handle, Vec::new())
    }

    /// Replaces the icon reference of `id`; used by the icon cache once a
    /// favicon has been resolved.
    ///
    /// # Errors
    ///
    /// Returns [`BookmarkError::NotFound`] if `id` is unknown.
    pub fn set_icon(&mut self, id: i64, icon: IconRef) -> Result<()> {
        let handle = self.handle(id)?;
        self.node_mut(handle)?.set_icon(icon);
        self.publish_update(handle, Vec::new())
    }

    fn publish_update(&mut self, handle: NodeRef, status: Vec<AddressStatus>) -> Result<()> {
        let record = self.record_of(handle)?;
        let parent_folder_id = self
            .tree
            .parent(handle)
            .and_then(|p| self.tree.get(p))
            .map_or(record.folder_id, BookmarkNode::folder_id);
        self.publish(
            ChangeKind::Updated,
            record.id,
            parent_folder_id,
            status,
            Operation::update(record),
        );
        Ok(())
    }

    // ── restore ──────────────────────────────────────────────────

    /// Rebuilds a manager from a persisted snapshot.
    ///
    /// `records` must be parent-first with siblings in display order, as
    /// produced by [`BookmarkNodeManager::snapshot`]. The first record is
    /// the root folder. Every invariant is checked while replaying; nothing
    /// is published to observers or persistence. ID allocation resumes
    /// above the highest ID seen.
    ///
    /// # Errors
    ///
    /// Returns [`BookmarkError::CorruptStore`] on an empty snapshot, a
    /// malformed root, a duplicate ID, folder id or shortcut, a parent that
    /// is missing or is a bookmark, a bookmark whose folder id disagrees with
    /// its parent, or an unparseable address.
    pub fn from_records<I>(records: I) -> Result<Self>
    where
        I: IntoIterator<Item = NodeRecord>,
    {
        let mut records = records.into_iter();
        let root = records
            .next()
            .ok_or_else(|| corrupt("snapshot is empty".to_string()))?;
        if root.parent_id.is_some() || root.kind != NodeKind::Folder {
            return Err(corrupt(format!(
                "first record {} is not a root folder",
                root.id
            )));
        }
        if root.address.is_some() {
            return Err(corrupt(format!("root folder {} has an address", root.id)));
        }

        let mut root_node = BookmarkNode::folder(root.id, root.folder_id, root.name);
        root_node.set_icon(root.icon);
        let mut manager = Self::with_root(root_node);
        let mut folder_ids = HashSet::from([root.folder_id]);
        let mut max_id = root.id;
        let mut max_folder_id = root.folder_id;
        if root.shortcut.as_deref().is_some_and(|s| !s.is_empty()) {
            return Err(corrupt(format!("root folder {} has a shortcut", root.id)));
        }

        for record in records {
            let parent_id = record
                .parent_id
                .ok_or_else(|| corrupt(format!("node {} is a second root", record.id)))?;
            if manager.by_id.contains_key(&record.id) {
                return Err(corrupt(format!("duplicate node id {}", record.id)));
            }
            let parent = *manager.by_id.get(&parent_id).ok_or_else(|| {
                corrupt(format!(
                    "node {} references missing parent {parent_id}",
                    record.id
                ))
            })?;
            let parent_node = manager.node(parent)?;
            if !parent_node.is_folder() {
                return Err(corrupt(format!(
                    "node {} has bookmark {parent_id} as its parent",
                    record.id
                )));
            }
            let parent_folder_id = parent_node.folder_id();

            let mut node = match record.kind {
                NodeKind::Folder => {
                    if record.address.as_deref().is_some_and(|a| !a.is_empty()) {
                        return Err(corrupt(format!("folder {} has an address", record.id)));
                    }
                    if !folder_ids.insert(record.folder_id) {
                        return Err(corrupt(format!(
                            "duplicate folder id {} on node {}",
                            record.folder_id, record.id
                        )));
                    }
                    max_folder_id = max_folder_id.max(record.folder_id);
                    BookmarkNode::folder(record.id, record.folder_id, record.name)
                }
                NodeKind::Bookmark => {
                    if record.folder_id != parent_folder_id {
                        return Err(corrupt(format!(
                            "bookmark {} has folder id {} but its parent has {parent_folder_id}",
                            record.id, record.folder_id
                        )));
                    }
                    let raw = record.address.unwrap_or_default();
                    let address = normalize_address(&raw).map_err(|_| {
                        corrupt(format!("bookmark {} has malformed address {raw:?}", record.id))
                    })?;
                    BookmarkNode::bookmark(record.id, parent_folder_id, record.name, address)
                }
            };
            node.set_icon(record.icon);

            let address = node.address().map(str::to_string);
            let handle = manager.tree.insert(node);
            manager.tree.append(parent, handle)?;
            manager.by_id.insert(record.id, handle);
            if let Some(address) = address {
                manager.index_address(&address, record.id);
            }
            if let Some(shortcut) = record.shortcut.filter(|s| !s.is_empty()) {
                manager.restore_shortcut(handle, record.id, shortcut)?;
            }
            max_id = max_id.max(record.id);
        }

        manager.next_id = max_id
            .checked_add(1)
            .ok_or_else(|| corrupt(format!("node id {max_id} leaves no room for new ids")))?;
        manager.next_folder_id = max_folder_id.checked_add(1).ok_or_else(|| {
            corrupt(format!("folder id {max_folder_id} leaves no room for new ids"))
        })?;
        log::info!("restored bookmark tree with {} node(s)", manager.len());
        Ok(manager)
    }

    fn restore_shortcut(&mut self, handle: NodeRef, id: i64, shortcut: String) -> Result<()> {
        if self.by_shortcut.contains_key(&shortcut) {
            return Err(corrupt(format!("duplicate shortcut {shortcut:?} on node {id}")));
        }
        self.by_shortcut.insert(shortcut.clone(), id);
        self.node_mut(handle)?.set_shortcut(Some(shortcut));
        Ok(())
    }

    // ── internals ────────────────────────────────────────────────

    // The allocators are only advanced once the new node is attached.
    fn unused_id(&self) -> Result<i64> {
        if self.next_id == i64::MAX {
            return Err(BookmarkError::InvalidOperation(
                "No node ids left to allocate".to_string(),
            ));
        }
        Ok(self.next_id)
    }

    fn unused_folder_id(&self) -> Result<i64> {
        if self.next_folder_id == i64::MAX {
            return Err(BookmarkError::InvalidOperation(
                "No folder ids left to allocate".to_string(),
            ));
        }
        Ok(self.next_folder_id)
    }

    fn handle(&self, id: i64) -> Result<NodeRef> {
        self.by_id
            .get(&id)
            .copied()
            .ok_or(BookmarkError::NotFound(id))
    }

    /// Resolves `id` to a folder handle, mapping every failure to `InvalidParent`.
    fn folder_handle(&self, id: i64) -> Result<NodeRef> {
        let handle = self
            .handle(id)
            .map_err(|_| BookmarkError::InvalidParent(format!("Node {id} does not exist")))?;
        if !self.node(handle)?.is_folder() {
            return Err(BookmarkError::InvalidParent(format!(
                "Node {id} is not a folder"
            )));
        }
        Ok(handle)
    }

    fn node(&self, handle: NodeRef) -> Result<&BookmarkNode> {
        self.tree
            .get(handle)
            .ok_or_else(|| BookmarkError::InvalidOperation(format!("stale node handle {handle:?}")))
    }

    fn node_mut(&mut self, handle: NodeRef) -> Result<&mut BookmarkNode> {
        self.tree
            .get_mut(handle)
            .ok_or_else(|| BookmarkError::InvalidOperation(format!("stale node handle {handle:?}")))
    }

    fn attach_new(
        &mut self,
        parent: NodeRef,
        node: BookmarkNode,
        at_index: Option<usize>,
    ) -> Result<NodeRef> {
        let id = node.id();
        let handle = self.tree.insert(node);
        if let Err(e) = self
            .tree
            .insert_at(parent, handle, at_index.unwrap_or(usize::MAX))
        {
            self.tree.remove_subtree(handle)?;
            return Err(e.into());
        }
        self.by_id.insert(id, handle);
        Ok(handle)
    }

    fn record_of(&self, handle: NodeRef) -> Result<NodeRecord> {
        let node = self.node(handle)?;
        let parent_id = self
            .tree
            .parent(handle)
            .and_then(|p| self.tree.get(p))
            .map(BookmarkNode::id);
        let position = self.tree.position(handle).unwrap_or(0);
        Ok(NodeRecord::from_node(node, parent_id, position))
    }

    /// Adds `id` under `address`. True if the address was not bookmarked before.
    fn index_address(&mut self, address: &str, id: i64) -> bool {
        let ids = self.by_address.entry(address.to_string()).or_default();
        let was_empty = ids.is_empty();
        ids.push(id);
        was_empty
    }

    /// Drops `id` from `address`. True if no bookmark points there any more.
    fn unindex_address(&mut self, address: &str, id: i64) -> bool {
        let Some(ids) = self.by_address.get_mut(address) else {
            return false;
        };
        ids.retain(|x| *x != id);
        if ids.is_empty() {
            self.by_address.remove(address);
            true
        } else {
            false
        }
    }

    fn publish(
        &mut self,
        kind: ChangeKind,
        id: i64,
        parent_folder_id: i64,
        address_status: Vec<AddressStatus>,
        operation: Operation,
    ) {
        self.sequence += 1;
        let event = ChangeEvent {
            sequence: self.sequence,
            kind,
            id,
            parent_folder_id,
            address_status,
        };
        if let Some(adapter) = self.persistence.as_mut() {
            adapter.record(&operation);
        }
        for observer in &mut self.observers {
            observer.on_change(&event);
        }
    }
}

/// Parses `address` as an absolute URL and returns its canonical text.
fn normalize_address(address: &str) -> Result<String> {
    Url::parse(address.trim())
        .map(|url| url.to_string())
        .map_err(|e| BookmarkError::InvalidAddress(format!("{address:?}: {e}")))
}

fn corrupt(details: String) -> BookmarkError {
    BookmarkError::CorruptStore(details)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    /// Collects every operation it is handed.
    #[derive(Clone, Default)]
    struct RecordingAdapter {
        ops: Arc<Mutex<Vec<Operation>>>,
    }

    impl PersistenceAdapter for RecordingAdapter {
        fn record(&mut self, op: &Operation) {
            self.ops.lock().unwrap().push(op.clone());
        }

        fn flush(&mut self) -> Result<()> {
            Ok(())
        }

        fn last_error(&self) -> Option<String> {
            None
        }
    }

    fn names(mgr: &BookmarkNodeManager, id: i64) -> Vec<String> {
        mgr.children(id)
            .unwrap()
            .map(|n| n.name().to_string())
            .collect()
    }

    /// Checks the cross-node invariants over the whole tree.
    fn assert_consistent(mgr: &BookmarkNodeManager) {
        let mut ids = HashSet::new();
        for node in mgr.walk() {
            assert!(ids.insert(node.id()), "duplicate id {}", node.id());
            if !node.is_folder() {
                let parent = mgr.parent_of(node.id()).unwrap().unwrap();
                assert!(parent.is_folder());
                assert_eq!(node.folder_id(), parent.folder_id(), "stale folder id on {}", node.id());
                assert_eq!(mgr.children(node.id()).unwrap().count(), 0);
            }
        }
        assert_eq!(ids.len(), mgr.len());
    }

    #[test]
    fn test_new_manager_has_root_folder() {
        let mgr = BookmarkNodeManager::new();
        let root = mgr.find_by_id(mgr.root_id()).unwrap();
        assert!(root.is_folder());
        assert_eq!(root.folder_id(), ROOT_FOLDER_ID);
        assert_eq!(mgr.len(), 1);
        assert!(mgr.is_empty());
    }

    #[test]
    fn test_work_mail_scenario() {
        let mut mgr = BookmarkNodeManager::new();
        let root = mgr.root_id();
        let work = mgr.create_folder(root, "Work", Some(0)).unwrap();
        let mail = mgr
            .create_bookmark(work, "Mail", "https://mail.example/", None)
            .unwrap();

        assert!(mgr.is_bookmarked("https://mail.example/"));
        let err = mgr.move_node(work, work, None).unwrap_err();
        assert!(matches!(err, BookmarkError::CyclicMove(_)));

        mgr.remove(work).unwrap();
        assert!(mgr.find_by_id(mail).is_none());
        assert!(!mgr.is_bookmarked("https://mail.example/"));
    }

    #[test]
    fn test_bookmark_inherits_parent_folder_id() {
        let mut mgr = BookmarkNodeManager::new();
        let work = mgr.create_folder(mgr.root_id(), "Work", None).unwrap();
        let mail = mgr
            .create_bookmark(work, "Mail", "https://mail.example/", None)
            .unwrap();
        let work_folder = mgr.find_by_id(work).unwrap().folder_id();

        assert_ne!(work_folder, ROOT_FOLDER_ID);
        assert_eq!(mgr.find_by_id(mail).unwrap().folder_id(), work_folder);
    }

    #[test]
    fn test_create_under_bookmark_is_invalid_parent() {
        let mut mgr = BookmarkNodeManager::new();
        let mail = mgr
            .create_bookmark(mgr.root_id(), "Mail", "https://mail.example/", None)
            .unwrap();

        let err = mgr.create_folder(mail, "Nope", None).unwrap_err();
        assert!(matches!(err, BookmarkError::InvalidParent(_)));
        let err = mgr
            .create_bookmark(999, "Nope", "https://x.example/", None)
            .unwrap_err();
        assert!(matches!(err, BookmarkError::InvalidParent(_)));
        assert_eq!(mgr.len(), 2);
    }

    #[test]
    fn test_create_bookmark_rejects_malformed_address() {
        let mut mgr = BookmarkNodeManager::new();
        let events = mgr.subscribe();
        let err = mgr
            .create_bookmark(mgr.root_id(), "Bad", "not a url", None)
            .unwrap_err();

        assert!(matches!(err, BookmarkError::InvalidAddress(_)));
        assert_eq!(mgr.len(), 1);
        assert!(events.try_recv().is_err(), "failed calls publish nothing");
    }

    #[test]
    fn test_insert_index_is_clamped() {
        let mut mgr = BookmarkNodeManager::new();
        let root = mgr.root_id();
        mgr.create_folder(root, "a", None).unwrap();
        mgr.create_folder(root, "b", Some(50)).unwrap();
        mgr.create_folder(root, "c", Some(1)).unwrap();
        assert_eq!(names(&mgr, root), vec!["a", "c", "b"]);
    }

    #[test]
    fn test_ids_are_never_reused() {
        let mut mgr = BookmarkNodeManager::new();
        let a = mgr.create_folder(mgr.root_id(), "a", None).unwrap();
        mgr.remove(a).unwrap();
        let b = mgr.create_folder(mgr.root_id(), "b", None).unwrap();
        assert!(b > a);
    }

    #[test]
    fn test_failed_creates_do_not_consume_ids() {
        let mut mgr = BookmarkNodeManager::new();
        let root = mgr.root_id();
        let a = mgr.create_folder(root, "a", None).unwrap();
        let a_folder_id = mgr.find_by_id(a).unwrap().folder_id();
        let bm = mgr.create_bookmark(root, "bm", "https://bm.example/", None).unwrap();

        assert!(mgr.create_folder(bm, "nope", None).is_err());
        assert!(mgr.create_folder(999, "nope", None).is_err());
        assert!(mgr.create_bookmark(a, "nope", "not a url", None).is_err());
        assert!(mgr.create_bookmark(bm, "nope", "https://x.example/", None).is_err());

        let b = mgr.create_folder(root, "b", None).unwrap();
        assert_eq!(b, bm + 1);
        assert_eq!(mgr.find_by_id(b).unwrap().folder_id(), a_folder_id + 1);
    }

    #[test]
    fn test_reserving_the_last_id_stops_allocation() {
        let mut mgr = BookmarkNodeManager::new();
        mgr.reserve_ids(i64::MAX, i64::MAX);
        let before = mgr.snapshot();

        let err = mgr.create_folder(mgr.root_id(), "f", None).unwrap_err();
        assert!(matches!(err, BookmarkError::InvalidOperation(_)));
        let err = mgr
            .create_bookmark(mgr.root_id(), "b", "https://b.example/", None)
            .unwrap_err();
        assert!(matches!(err, BookmarkError::InvalidOperation(_)));
        assert_eq!(mgr.snapshot(), before);
    }

    #[test]
    fn test_shortcut_scenario() {
        let mut mgr = BookmarkNodeManager::new();
        let root = mgr.root_id();
        let a = mgr.create_bookmark(root, "A", "https://a.example/", None).unwrap();
        let b = mgr.create_bookmark(root, "B", "https://b.example/", None).unwrap();

        mgr.set_shortcut(a, "w").unwrap();
        let err = mgr.set_shortcut(b, "w").unwrap_err();
        assert!(matches!(err, BookmarkError::DuplicateShortcut(_)));
        assert!(mgr.find_by_id(b).unwrap().shortcut().is_none());

        mgr.set_shortcut(a, "").unwrap();
        mgr.set_shortcut(b, "w").unwrap();
        assert_eq!(mgr.find_by_shortcut("w").unwrap().id(), b);
        assert!(mgr.find_by_id(a).unwrap().shortcut().is_none());
    }

    #[test]
    fn test_reassigning_own_shortcut_succeeds() {
        let mut mgr = BookmarkNodeManager::new();
        let a = mgr
            .create_bookmark(mgr.root_id(), "A", "https://a.example/", None)
            .unwrap();
        mgr.set_shortcut(a, "w").unwrap();
        mgr.set_shortcut(a, "w").unwrap();
        mgr.set_shortcut(a, "x").unwrap();
        assert!(mgr.find_by_shortcut("w").is_none());
        assert_eq!(mgr.find_by_shortcut("x").unwrap().id(), a);
    }

    #[test]
    fn test_remove_releases_shortcuts_of_descendants() {
        let mut mgr = BookmarkNodeManager::new();
        let work = mgr.create_folder(mgr.root_id(), "Work", None).unwrap();
        let inner = mgr.create_folder(work, "Inner", None).unwrap();
        let deep = mgr
            .create_bookmark(inner, "Deep", "https://deep.example/", None)
            .unwrap();
        mgr.set_shortcut(deep, "d").unwrap();

        let result = mgr.remove(work).unwrap();
        assert_eq!(result.deleted_count, 3);
        assert_eq!(result.affected_ids.last(), Some(&work));
        for id in [work, inner, deep] {
            assert!(mgr.find_by_id(id).is_none());
        }
        assert!(mgr.find_by_shortcut("d").is_none());
        assert_consistent(&mgr);
    }

    #[test]
    fn test_root_cannot_be_removed_or_moved() {
        let mut mgr = BookmarkNodeManager::new();
        let root = mgr.root_id();
        let f = mgr.create_folder(root, "f", None).unwrap();
        assert!(matches!(
            mgr.remove(root).unwrap_err(),
            BookmarkError::InvalidOperation(_)
        ));
        assert!(matches!(
            mgr.move_node(root, f, None).unwrap_err(),
            BookmarkError::InvalidOperation(_)
        ));
        assert!(matches!(
            mgr.set_shortcut(root, "r").unwrap_err(),
            BookmarkError::InvalidOperation(_)
        ));
        assert!(mgr.find_by_shortcut("r").is_none());
    }

    #[test]
    fn test_remove_unknown_is_not_found() {
        let mut mgr = BookmarkNodeManager::new();
        assert!(matches!(mgr.remove(77).unwrap_err(), BookmarkError::NotFound(77)));
    }

    #[test]
    fn test_remove_rows_keeps_survivors_in_order() {
        let mut mgr = BookmarkNodeManager::new();
        let root = mgr.root_id();
        let folder = mgr.create_folder(root, "Five", None).unwrap();
        let kids: Vec<i64> = (0..5)
            .map(|i| {
                mgr.create_bookmark(folder, &format!("k{i}"), &format!("https://k{i}.example/"), None)
                    .unwrap()
            })
            .collect();

        let result = mgr.remove_children_at(folder, &[1, 3, 4]).unwrap();
        assert_eq!(result.deleted_count, 3);

        let remaining: Vec<i64> = mgr.children(folder).unwrap().map(BookmarkNode::id).collect();
        assert_eq!(remaining, vec![kids[0], kids[2]]);
        assert_eq!(mgr.position_of(kids[2]).unwrap(), Some(1));
    }

    #[test]
    fn test_remove_many_dedupes_and_skips_covered_descendants() {
        let mut mgr = BookmarkNodeManager::new();
        let root = mgr.root_id();
        let a = mgr.create_folder(root, "a", None).unwrap();
        let a1 = mgr.create_bookmark(a, "a1", "https://a1.example/", None).unwrap();
        let b = mgr.create_bookmark(root, "b", "https://b.example/", None).unwrap();

        let result = mgr.remove_many(&[a1, a, a, b]).unwrap();
        assert_eq!(result.deleted_count, 3);
        assert_eq!(mgr.len(), 1);
    }

    #[test]
    fn test_remove_many_is_atomic_on_unknown_id() {
        let mut mgr = BookmarkNodeManager::new();
        let a = mgr.create_folder(mgr.root_id(), "a", None).unwrap();
        let err = mgr.remove_many(&[a, 404]).unwrap_err();
        assert!(matches!(err, BookmarkError::NotFound(404)));
        assert!(mgr.find_by_id(a).is_some());
    }

    #[test]
    fn test_remove_rows_out_of_range_removes_nothing() {
        let mut mgr = BookmarkNodeManager::new();
        let root = mgr.root_id();
        mgr.create_folder(root, "a", None).unwrap();
        let err = mgr.remove_children_at(root, &[0, 3]).unwrap_err();
        assert!(matches!(err, BookmarkError::InvalidOperation(_)));
        assert_eq!(mgr.len(), 2);
    }

    #[test]
    fn test_move_reorders_within_folder() {
        let mut mgr = BookmarkNodeManager::new();
        let root = mgr.root_id();
        let a = mgr.create_folder(root, "a", None).unwrap();
        mgr.create_folder(root, "b", None).unwrap();
        let c = mgr.create_folder(root, "c", None).unwrap();

        mgr.move_node(c, root, Some(0)).unwrap();
        assert_eq!(names(&mgr, root), vec!["c", "a", "b"]);
        mgr.move_node(a, root, None).unwrap();
        assert_eq!(names(&mgr, root), vec!["c", "b", "a"]);
    }

    #[test]
    fn test_move_updates_bookmark_folder_ids() {
        let mut mgr = BookmarkNodeManager::new();
        let root = mgr.root_id();
        let src = mgr.create_folder(root, "src", None).unwrap();
        let dst = mgr.create_folder(root, "dst", None).unwrap();
        let sub = mgr.create_folder(src, "sub", None).unwrap();
        let leaf = mgr.create_bookmark(src, "leaf", "https://leaf.example/", None).unwrap();
        let deep = mgr.create_bookmark(sub, "deep", "https://deep.example/", None).unwrap();

        mgr.move_node(leaf, dst, None).unwrap();
        let dst_folder = mgr.find_by_id(dst).unwrap().folder_id();
        assert_eq!(mgr.find_by_id(leaf).unwrap().folder_id(), dst_folder);

        mgr.move_node(sub, dst, Some(0)).unwrap();
        let sub_folder = mgr.find_by_id(sub).unwrap().folder_id();
        assert_eq!(mgr.find_by_id(deep).unwrap().folder_id(), sub_folder);
        assert_eq!(mgr.path_of(deep).unwrap(), vec!["Bookmarks", "dst", "sub", "deep"]);
        assert_consistent(&mgr);
    }

    #[test]
    fn test_move_into_descendant_is_cyclic_and_leaves_tree_unchanged() {
        let mut mgr = BookmarkNodeManager::new();
        let root = mgr.root_id();
        let a = mgr.create_folder(root, "a", None).unwrap();
        let b = mgr.create_folder(a, "b", None).unwrap();
        let c = mgr.create_folder(b, "c", None).unwrap();
        let before = mgr.snapshot();

        for target in [a, b, c] {
            let err = mgr.move_node(a, target, None).unwrap_err();
            assert!(matches!(err, BookmarkError::CyclicMove(_)));
        }
        assert_eq!(mgr.snapshot(), before);
    }

    #[test]
    fn test_move_into_bookmark_is_invalid_parent() {
        let mut mgr = BookmarkNodeManager::new();
        let root = mgr.root_id();
        let a = mgr.create_folder(root, "a", None).unwrap();
        let bm = mgr.create_bookmark(root, "bm", "https://bm.example/", None).unwrap();
        let err = mgr.move_node(a, bm, None).unwrap_err();
        assert!(matches!(err, BookmarkError::InvalidParent(_)));
    }

    #[test]
    fn test_move_bookmark_into_itself_is_cyclic() {
        let mut mgr = BookmarkNodeManager::new();
        let root = mgr.root_id();
        let a = mgr.create_bookmark(root, "a", "https://a.example/", None).unwrap();
        let before = mgr.snapshot();

        let err = mgr.move_node(a, a, None).unwrap_err();
        assert!(matches!(err, BookmarkError::CyclicMove(_)));
        assert_eq!(mgr.snapshot(), before);

        let err = mgr.move_node(a, 999, None).unwrap_err();
        assert!(matches!(err, BookmarkError::InvalidParent(_)));
    }

    #[test]
    fn test_set_address_on_folder_is_invalid_operation() {
        let mut mgr = BookmarkNodeManager::new();
        let f = mgr.create_folder(mgr.root_id(), "f", None).unwrap();
        let err = mgr.set_address(f, "https://x.example/").unwrap_err();
        assert!(matches!(err, BookmarkError::InvalidOperation(_)));
    }

    #[test]
    fn test_set_address_reindexes() {
        let mut mgr = BookmarkNodeManager::new();
        let root = mgr.root_id();
        let a = mgr.create_bookmark(root, "a", "https://old.example/", None).unwrap();
        let events = mgr.subscribe();

        mgr.set_address(a, "https://new.example").unwrap();
        assert!(!mgr.is_bookmarked("https://old.example/"));
        assert!(mgr.is_bookmarked("https://new.example/"));
        assert_eq!(mgr.find_by_id(a).unwrap().address(), Some("https://new.example/"));

        let event = events.try_recv().unwrap();
        assert_eq!(event.kind, ChangeKind::Updated);
        assert_eq!(event.address_status.len(), 2);
        assert!(event.address_status.iter().any(|s| s.bookmarked));
        assert!(event.address_status.iter().any(|s| !s.bookmarked));
    }

    #[test]
    fn test_same_address_in_several_folders() {
        let mut mgr = BookmarkNodeManager::new();
        let root = mgr.root_id();
        let f = mgr.create_folder(root, "f", None).unwrap();
        let a = mgr.create_bookmark(root, "a", "https://same.example/", None).unwrap();
        let b = mgr.create_bookmark(f, "b", "https://same.example/", None).unwrap();

        let found: Vec<i64> = mgr
            .find_nodes_by_address("https://same.example/")
            .iter()
            .map(|n| n.id())
            .collect();
        assert_eq!(found, vec![a, b]);

        mgr.remove(a).unwrap();
        assert!(mgr.is_bookmarked("https://same.example/"));
        mgr.remove(f).unwrap();
        assert!(!mgr.is_bookmarked("https://same.example/"));
        assert!(mgr.find_nodes_by_address("garbage").is_empty());
    }

    #[test]
    fn test_events_are_ordered_one_per_mutation() {
        let mut mgr = BookmarkNodeManager::new();
        let events = mgr.subscribe();
        let root = mgr.root_id();
        let work = mgr.create_folder(root, "Work", None).unwrap();
        let mail = mgr.create_bookmark(work, "Mail", "https://mail.example/", None).unwrap();
        mgr.rename(mail, "Webmail").unwrap();
        mgr.move_node(mail, root, None).unwrap();
        mgr.remove(work).unwrap();

        let got: Vec<ChangeEvent> = events.try_iter().collect();
        assert_eq!(got.len(), 5);
        assert!(got.windows(2).all(|w| w[0].sequence + 1 == w[1].sequence));
        assert_eq!(got[0].kind, ChangeKind::Added);
        assert_eq!(got[1].address_status[0].address, "https://mail.example/");
        assert_eq!(got[2].kind, ChangeKind::Updated);
        let work_folder_id = match &got[3].kind {
            ChangeKind::Moved { old_parent_folder_id } => *old_parent_folder_id,
            other => panic!("expected move, got {other:?}"),
        };
        assert_eq!(got[3].parent_folder_id, ROOT_FOLDER_ID);
        assert_ne!(work_folder_id, ROOT_FOLDER_ID);
        assert_eq!(
            got[4].kind,
            ChangeKind::Removed {
                removed_ids: vec![work]
            }
        );
    }

    #[test]
    fn test_closure_observer() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let mut mgr = BookmarkNodeManager::new();
        mgr.add_observer(move |e: &ChangeEvent| sink.lock().unwrap().push(e.id));

        let f = mgr.create_folder(mgr.root_id(), "f", None).unwrap();
        assert_eq!(*seen.lock().unwrap(), vec![f]);
    }

    #[test]
    fn test_persistence_receives_operations_in_order() {
        let adapter = RecordingAdapter::default();
        let ops = Arc::clone(&adapter.ops);
        let mut mgr = BookmarkNodeManager::new();
        mgr.set_persistence(Box::new(adapter));

        let root = mgr.root_id();
        let a = mgr.create_folder(root, "a", None).unwrap();
        let b = mgr.create_bookmark(root, "b", "https://b.example/", Some(0)).unwrap();
        mgr.move_node(b, a, None).unwrap();
        mgr.set_shortcut(b, "bb").unwrap();
        mgr.remove(a).unwrap();
        let _ = mgr.rename(999, "nope");

        let ops = ops.lock().unwrap();
        let kinds: Vec<&str> = ops.iter().map(Operation::type_name).collect();
        assert_eq!(
            kinds,
            vec!["CreateNode", "CreateNode", "MoveNode", "UpdateNode", "DeleteNode"]
        );
        match &ops[2] {
            Operation::MoveNode {
                node,
                old_parent_id,
                old_position,
                ..
            } => {
                assert_eq!(node.parent_id, Some(a));
                assert_eq!(*old_parent_id, root);
                assert_eq!(*old_position, 0);
            }
            other => panic!("expected move, got {other:?}"),
        }
        assert_eq!(ops[3].node().shortcut.as_deref(), Some("bb"));
        match &ops[4] {
            Operation::DeleteNode { removed_ids, .. } => assert_eq!(removed_ids, &vec![b, a]),
            other => panic!("expected delete, got {other:?}"),
        }
    }

    #[test]
    fn test_snapshot_round_trip() {
        let mut mgr = BookmarkNodeManager::new();
        let root = mgr.root_id();
        let work = mgr.create_folder(root, "Work", None).unwrap();
        let mail = mgr.create_bookmark(work, "Mail", "https://mail.example/", None).unwrap();
        mgr.create_bookmark(work, "Docs", "https://docs.example/", Some(0)).unwrap();
        mgr.create_folder(root, "Empty", Some(0)).unwrap();
        mgr.set_shortcut(mail, "m").unwrap();
        mgr.set_icon(mail, IconRef::Cached("mail.example".to_string())).unwrap();

        let snapshot = mgr.snapshot();
        let restored = BookmarkNodeManager::from_records(snapshot.clone()).unwrap();

        assert_eq!(restored.snapshot(), snapshot);
        assert_eq!(restored.find_by_shortcut("m").unwrap().id(), mail);
        assert!(restored.is_bookmarked("https://mail.example/"));
        assert_eq!(names(&restored, work), vec!["Docs", "Mail"]);
        assert_consistent(&restored);
    }

    #[test]
    fn test_restored_manager_allocates_above_loaded_ids() {
        let mut mgr = BookmarkNodeManager::new();
        let f = mgr.create_folder(mgr.root_id(), "f", None).unwrap();
        let folder_id = mgr.find_by_id(f).unwrap().folder_id();

        let mut restored = BookmarkNodeManager::from_records(mgr.snapshot()).unwrap();
        let g = restored.create_folder(restored.root_id(), "g", None).unwrap();
        assert!(g > f);
        assert!(restored.find_by_id(g).unwrap().folder_id() > folder_id);
    }

    fn record(id: i64, kind: NodeKind, parent: Option<i64>, folder_id: i64) -> NodeRecord {
        NodeRecord {
            id,
            kind,
            name: format!("n{id}"),
            address: (kind == NodeKind::Bookmark).then(|| format!("https://n{id}.example/")),
            shortcut: None,
            folder_id,
            parent_id: parent,
            position: 0,
            icon: IconRef::placeholder(kind),
        }
    }

    #[test]
    fn test_load_rejects_invariant_violations() {
        let root = record(0, NodeKind::Folder, None, 0);
        let cases: Vec<(&str, Vec<NodeRecord>)> = vec![
            ("empty", vec![]),
            ("bookmark root", vec![record(0, NodeKind::Bookmark, None, 0)]),
            (
                "duplicate id",
                vec![
                    root.clone(),
                    record(1, NodeKind::Folder, Some(0), 1),
                    record(1, NodeKind::Folder, Some(0), 2),
                ],
            ),
            (
                "dangling parent",
                vec![root.clone(), record(1, NodeKind::Folder, Some(9), 1)],
            ),
            (
                "bookmark parent",
                vec![
                    root.clone(),
                    record(1, NodeKind::Bookmark, Some(0), 0),
                    record(2, NodeKind::Bookmark, Some(1), 0),
                ],
            ),
            (
                "stale folder id",
                vec![root.clone(), record(1, NodeKind::Bookmark, Some(0), 5)],
            ),
            (
                "duplicate folder id",
                vec![root.clone(), record(1, NodeKind::Folder, Some(0), 0)],
            ),
            (
                "second root",
                vec![root.clone(), record(1, NodeKind::Folder, None, 1)],
            ),
            (
                "exhausted node ids",
                vec![root.clone(), record(i64::MAX, NodeKind::Bookmark, Some(0), 0)],
            ),
            (
                "exhausted folder ids",
                vec![root.clone(), record(1, NodeKind::Folder, Some(0), i64::MAX)],
            ),
        ];

        for (label, records) in cases {
            match BookmarkNodeManager::from_records(records) {
                Err(BookmarkError::CorruptStore(_)) => {}
                Err(other) => panic!("{label}: expected CorruptStore, got {other:?}"),
                Ok(_) => panic!("{label}: expected CorruptStore, got Ok"),
            }
        }

        let mut dup_a = record(1, NodeKind::Bookmark, Some(0), 0);
        dup_a.shortcut = Some("x".to_string());
        let mut dup_b = record(2, NodeKind::Bookmark, Some(0), 0);
        dup_b.shortcut = Some("x".to_string());
        assert!(matches!(
            BookmarkNodeManager::from_records(vec![root.clone(), dup_a, dup_b]),
            Err(BookmarkError::CorruptStore(_))
        ));

        let mut bad_addr = record(1, NodeKind::Bookmark, Some(0), 0);
        bad_addr.address = Some("::::".to_string());
        assert!(matches!(
            BookmarkNodeManager::from_records(vec![root, bad_addr]),
            Err(BookmarkError::CorruptStore(_))
        ));
    }

    #[test]
    fn test_folders_lists_in_pre_order() {
        let mut mgr = BookmarkNodeManager::new();
        let root = mgr.root_id();
        let a = mgr.create_folder(root, "a", None).unwrap();
        mgr.create_folder(a, "a1", None).unwrap();
        mgr.create_bookmark(root, "x", "https://x.example/", Some(0)).unwrap();
        mgr.create_folder(root, "b", None).unwrap();

        let folders: Vec<&str> = mgr.folders().iter().map(|f| f.name()).collect();
        assert_eq!(folders, vec!["Bookmarks", "a", "a1", "b"]);
    }

    #[test]
    fn test_random_edits_preserve_invariants() {
        // Deterministic pseudo-random edit sequence.
        let mut mgr = BookmarkNodeManager::new();
        let mut seed: u64 = 0x2545_f491_4f6c_dd1d;
        let mut next = move || {
            seed ^= seed << 13;
            seed ^= seed >> 7;
            seed ^= seed << 17;
            seed
        };

        for step in 0..400 {
            let ids: Vec<i64> = mgr.walk().map(BookmarkNode::id).collect();
            let pick = ids[(next() as usize) % ids.len()];
            let other = ids[(next() as usize) % ids.len()];
            match next() % 5 {
                0 => {
                    let _ = mgr.create_folder(pick, &format!("f{step}"), Some(next() as usize % 4));
                }
                1 => {
                    let _ = mgr.create_bookmark(pick, &format!("b{step}"), &format!("https://h{}.example/", step % 7), None);
                }
                2 | 3 => {
                    let before = mgr.snapshot();
                    if let Err(e) = mgr.move_node(pick, other, Some(next() as usize % 4)) {
                        assert_eq!(mgr.snapshot(), before, "failed move mutated tree: {e}");
                    }
                }
                _ => {
                    if pick != mgr.root_id() && next() % 3 == 0 {
                        mgr.remove(pick).unwrap();
                    }
                }
            }
            assert_consistent(&mgr);
        }
    }
}
