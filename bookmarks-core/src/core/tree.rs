//! Arena-backed ordered tree used as the container for bookmark nodes.
//!
//! Nodes live in a slot vector and refer to each other through [`NodeRef`]
//! handles. The tree owns every slot; a parent owns the ordering of its
//! children, and a child's parent link is a plain handle used only for
//! upward traversal. Freed slots bump their generation, so a handle to a
//! destroyed node never resolves again even after its slot is reused.
//!
//! The tree knows nothing about bookmarks. Invariants that span the whole
//! structure (unique identifiers, shortcut uniqueness, folder-id caching)
//! belong to [`BookmarkNodeManager`](super::manager::BookmarkNodeManager).

use thiserror::Error;

/// Stable handle to a node slot in a [`Tree`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeRef {
    index: u32,
    generation: u32,
}

/// Errors raised by structural tree primitives.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TreeError {
    #[error("stale or unknown node handle {0:?}")]
    Stale(NodeRef),

    #[error("node {0:?} already has a parent")]
    AlreadyAttached(NodeRef),

    #[error("node {child:?} is not a child of {parent:?}")]
    NotAChild { parent: NodeRef, child: NodeRef },

    #[error("attaching {child:?} under {parent:?} would create a cycle")]
    WouldCycle { parent: NodeRef, child: NodeRef },

    #[error("the root node cannot be attached, detached or removed")]
    RootImmovable,
}

struct Entry<T> {
    value: T,
    parent: Option<NodeRef>,
    children: Vec<NodeRef>,
}

struct Slot<T> {
    generation: u32,
    entry: Option<Entry<T>>,
}

/// An ordered tree with a fixed root.
///
/// Nodes are created detached with [`Tree::insert`] and become part of the
/// structure through [`Tree::append`] or [`Tree::insert_at`]. A detached node
/// is owned by whoever holds its handle until it is attached or destroyed
/// with [`Tree::remove_subtree`].
pub struct Tree<T> {
    slots: Vec<Slot<T>>,
    free: Vec<u32>,
    root: NodeRef,
    live: usize,
}

impl<T> Tree<T> {
    /// Creates a tree containing only `root_value`.
    pub fn new(root_value: T) -> Self {
        let mut tree = Self {
            slots: Vec::new(),
            free: Vec::new(),
            root: NodeRef { index: 0, generation: 0 },
            live: 0,
        };
        tree.root = tree.insert(root_value);
        tree
    }

    pub fn root(&self) -> NodeRef {
        self.root
    }

    /// Number of live nodes, attached or not, including the root.
    pub fn len(&self) -> usize {
        self.live
    }

    pub fn is_empty(&self) -> bool {
        self.live == 0
    }

    /// Allocates a detached node holding `value`.
    pub fn insert(&mut self, value: T) -> NodeRef {
        let entry = Entry {
            value,
            parent: None,
            children: Vec::new(),
        };
        self.live += 1;
        if let Some(index) = self.free.pop() {
            let slot = &mut self.slots[index as usize];
            slot.entry = Some(entry);
            NodeRef {
                index,
                generation: slot.generation,
            }
        } else {
            let index = self.slots.len() as u32;
            self.slots.push(Slot {
                generation: 0,
                entry: Some(entry),
            });
            NodeRef {
                index,
                generation: 0,
            }
        }
    }

    fn entry(&self, node: NodeRef) -> Option<&Entry<T>> {
        self.slots
            .get(node.index as usize)
            .filter(|slot| slot.generation == node.generation)
            .and_then(|slot| slot.entry.as_ref())
    }

    fn entry_mut(&mut self, node: NodeRef) -> Option<&mut Entry<T>> {
        self.slots
            .get_mut(node.index as usize)
            .filter(|slot| slot.generation == node.generation)
            .and_then(|slot| slot.entry.as_mut())
    }

    pub fn contains(&self, node: NodeRef) -> bool {
        self.entry(node).is_some()
    }

    pub fn get(&self, node: NodeRef) -> Option<&T> {
        self.entry(node).map(|e| &e.value)
    }

    pub fn get_mut(&mut self, node: NodeRef) -> Option<&mut T> {
        self.entry_mut(node).map(|e| &mut e.value)
    }

    pub fn parent(&self, node: NodeRef) -> Option<NodeRef> {
        self.entry(node).and_then(|e| e.parent)
    }

    /// Direct children of `node` in sibling order.
    ///
    /// This is a live view, not a copy; callers that intend to mutate the
    /// tree while walking it must copy the handles first. A stale handle
    /// yields an empty slice.
    pub fn children(&self, node: NodeRef) -> &[NodeRef] {
        self.entry(node)
            .map(|e| e.children.as_slice())
            .unwrap_or_default()
    }

    /// Index of `node` within its parent's children, or `None` for the root
    /// and for detached nodes.
    pub fn position(&self, node: NodeRef) -> Option<usize> {
        let parent = self.parent(node)?;
        self.children(parent).iter().position(|c| *c == node)
    }

    /// Appends `child` as the last child of `parent`.
    ///
    /// # Errors
    ///
    /// See [`Tree::insert_at`].
    pub fn append(&mut self, parent: NodeRef, child: NodeRef) -> Result<NodeRef, TreeError> {
        let end = self.children(parent).len();
        self.insert_at(parent, child, end)
    }

    /// Inserts `child` under `parent` at `index`, clamping out-of-range
    /// indexes to the end of the sibling list.
    ///
    /// # Errors
    ///
    /// Returns [`TreeError::AlreadyAttached`] if `child` already has a
    /// parent, [`TreeError::WouldCycle`] if `parent` lies inside the subtree
    /// rooted at `child`, [`TreeError::RootImmovable`] for the root, and
    /// [`TreeError::Stale`] for dead handles.
    pub fn insert_at(
        &mut self,
        parent: NodeRef,
        child: NodeRef,
        index: usize,
    ) -> Result<NodeRef, TreeError> {
        if child == self.root {
            return Err(TreeError::RootImmovable);
        }
        let child_entry = self.entry(child).ok_or(TreeError::Stale(child))?;
        if child_entry.parent.is_some() {
            return Err(TreeError::AlreadyAttached(child));
        }
        if !self.contains(parent) {
            return Err(TreeError::Stale(parent));
        }
        if self.is_ancestor_or_self(child, parent) {
            return Err(TreeError::WouldCycle { parent, child });
        }

        let siblings = &mut self
            .entry_mut(parent)
            .ok_or(TreeError::Stale(parent))?
            .children;
        let index = index.min(siblings.len());
        siblings.insert(index, child);

        if let Some(entry) = self.entry_mut(child) {
            entry.parent = Some(parent);
        }
        Ok(child)
    }

    /// Removes `child` from `parent`'s sibling list without destroying it.
    ///
    /// # Errors
    ///
    /// Returns [`TreeError::NotAChild`] if `child` is not a direct child of
    /// `parent`, or [`TreeError::Stale`] if `parent` is dead.
    pub fn detach(&mut self, parent: NodeRef, child: NodeRef) -> Result<NodeRef, TreeError> {
        let siblings = &mut self
            .entry_mut(parent)
            .ok_or(TreeError::Stale(parent))?
            .children;
        let pos = siblings
            .iter()
            .position(|c| *c == child)
            .ok_or(TreeError::NotAChild { parent, child })?;
        siblings.remove(pos);

        if let Some(entry) = self.entry_mut(child) {
            entry.parent = None;
        }
        Ok(child)
    }

    /// Destroys `node` and its whole subtree, detaching it first if needed.
    ///
    /// Values are returned in post-order: every descendant precedes its
    /// ancestors, and `node`'s own value comes last.
    ///
    /// # Errors
    ///
    /// Returns [`TreeError::RootImmovable`] for the root and
    /// [`TreeError::Stale`] for dead handles.
    pub fn remove_subtree(&mut self, node: NodeRef) -> Result<Vec<T>, TreeError> {
        if node == self.root {
            return Err(TreeError::RootImmovable);
        }
        if !self.contains(node) {
            return Err(TreeError::Stale(node));
        }
        if let Some(parent) = self.parent(node) {
            self.detach(parent, node)?;
        }

        // Reversed pre-order places every node after all of its descendants.
        let mut doomed: Vec<NodeRef> = self.descendants(node).collect();
        doomed.reverse();

        let mut values = Vec::with_capacity(doomed.len());
        for handle in doomed {
            let slot = &mut self.slots[handle.index as usize];
            if let Some(entry) = slot.entry.take() {
                slot.generation = slot.generation.wrapping_add(1);
                self.free.push(handle.index);
                self.live -= 1;
                values.push(entry.value);
            }
        }
        Ok(values)
    }

    /// Iterates the ancestors of `node`, nearest first, excluding `node`.
    pub fn ancestors(&self, node: NodeRef) -> Ancestors<'_, T> {
        Ancestors {
            tree: self,
            next: self.parent(node),
        }
    }

    /// Depth-first pre-order walk of the subtree rooted at `node`,
    /// starting with `node` itself.
    pub fn descendants(&self, node: NodeRef) -> Descendants<'_, T> {
        let stack = if self.contains(node) { vec![node] } else { Vec::new() };
        Descendants { tree: self, stack }
    }

    /// True when `node` is `ancestor` or lies somewhere beneath it.
    pub fn is_ancestor_or_self(&self, ancestor: NodeRef, node: NodeRef) -> bool {
        node == ancestor || self.ancestors(node).any(|a| a == ancestor)
    }

    /// Number of edges between `node` and the top of its tree.
    pub fn depth(&self, node: NodeRef) -> usize {
        self.ancestors(node).count()
    }
}

pub struct Ancestors<'a, T> {
    tree: &'a Tree<T>,
    next: Option<NodeRef>,
}

impl<T> Iterator for Ancestors<'_, T> {
    type Item = NodeRef;

    fn next(&mut self) -> Option<NodeRef> {
        let current = self.next?;
        self.next = self.tree.parent(current);
        Some(current)
    }
}

pub struct Descendants<'a, T> {
    tree: &'a Tree<T>,
    stack: Vec<NodeRef>,
}

impl<T> Iterator for Descendants<'_, T> {
    type Item = NodeRef;

    fn next(&mut self) -> Option<NodeRef> {
        let current = self.stack.pop()?;
        self.stack
            .extend(self.tree.children(current).iter().rev().copied());
        Some(current)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn values(tree: &Tree<&'static str>, nodes: &[NodeRef]) -> Vec<&'static str> {
        nodes.iter().map(|n| *tree.get(*n).unwrap()).collect()
    }

    #[test]
    fn test_append_keeps_order() {
        let mut tree = Tree::new("root");
        let root = tree.root();
        for name in ["a", "b", "c"] {
            let node = tree.insert(name);
            tree.append(root, node).unwrap();
        }
        assert_eq!(values(&tree, tree.children(root)), vec!["a", "b", "c"]);
        assert_eq!(tree.len(), 4);
    }

    #[test]
    fn test_insert_at_clamps_out_of_range_index() {
        let mut tree = Tree::new("root");
        let root = tree.root();
        let a = tree.insert("a");
        tree.append(root, a).unwrap();
        let b = tree.insert("b");
        tree.insert_at(root, b, 99).unwrap();
        let c = tree.insert("c");
        tree.insert_at(root, c, 0).unwrap();
        assert_eq!(values(&tree, tree.children(root)), vec!["c", "a", "b"]);
        assert_eq!(tree.position(b), Some(2));
    }

    #[test]
    fn test_append_rejects_attached_node() {
        let mut tree = Tree::new("root");
        let root = tree.root();
        let a = tree.insert("a");
        tree.append(root, a).unwrap();
        assert_eq!(tree.append(root, a), Err(TreeError::AlreadyAttached(a)));
    }

    #[test]
    fn test_detach_requires_direct_child() {
        let mut tree = Tree::new("root");
        let root = tree.root();
        let a = tree.insert("a");
        let b = tree.insert("b");
        tree.append(root, a).unwrap();
        tree.append(a, b).unwrap();

        assert_eq!(
            tree.detach(root, b),
            Err(TreeError::NotAChild { parent: root, child: b })
        );
        tree.detach(a, b).unwrap();
        assert!(tree.parent(b).is_none());
        assert!(tree.children(a).is_empty());
        // Detached, not destroyed.
        assert_eq!(tree.get(b), Some(&"b"));
    }

    #[test]
    fn test_insert_under_own_descendant_is_rejected() {
        let mut tree = Tree::new("root");
        let root = tree.root();
        let a = tree.insert("a");
        let b = tree.insert("b");
        tree.append(root, a).unwrap();
        tree.append(a, b).unwrap();
        tree.detach(root, a).unwrap();

        assert_eq!(
            tree.append(b, a),
            Err(TreeError::WouldCycle { parent: b, child: a })
        );
    }

    #[test]
    fn test_remove_subtree_is_post_order_and_invalidates_handles() {
        let mut tree = Tree::new("root");
        let root = tree.root();
        let a = tree.insert("a");
        let a1 = tree.insert("a1");
        let a2 = tree.insert("a2");
        tree.append(root, a).unwrap();
        tree.append(a, a1).unwrap();
        tree.append(a, a2).unwrap();

        let removed = tree.remove_subtree(a).unwrap();
        assert_eq!(removed.last(), Some(&"a"));
        assert_eq!(removed.len(), 3);
        assert!(!tree.contains(a1));
        assert!(tree.children(root).is_empty());
        assert_eq!(tree.len(), 1);

        // Reused slot gets a fresh generation.
        let fresh = tree.insert("fresh");
        assert_ne!(fresh, a);
        assert!(tree.get(a).is_none());
        assert_eq!(tree.get(fresh), Some(&"fresh"));
    }

    #[test]
    fn test_root_cannot_be_removed() {
        let mut tree = Tree::new("root");
        let root = tree.root();
        assert_eq!(tree.remove_subtree(root), Err(TreeError::RootImmovable));
    }

    #[test]
    fn test_descendants_are_pre_order() {
        let mut tree = Tree::new("root");
        let root = tree.root();
        let a = tree.insert("a");
        let a1 = tree.insert("a1");
        let b = tree.insert("b");
        tree.append(root, a).unwrap();
        tree.append(a, a1).unwrap();
        tree.append(root, b).unwrap();

        let order: Vec<NodeRef> = tree.descendants(root).collect();
        assert_eq!(values(&tree, &order), vec!["root", "a", "a1", "b"]);
        assert_eq!(tree.depth(a1), 2);
        assert!(tree.is_ancestor_or_self(a, a1));
        assert!(!tree.is_ancestor_or_self(b, a1));
    }
}
