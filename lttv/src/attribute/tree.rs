//! The attribute tree itself (C1): a typed, named, hierarchical key/value
//! store used for statistics and as a hook-registration rendezvous.
//!
//! A node is either a [`Node::Leaf`] or a [`Node::Branch`] mapping key to
//! child. Children are stored behind `Rc<RefCell<_>>` so that a shallow copy
//! can alias a child subtree with the original instead of cloning it, while
//! a deep copy recurses and allocates fresh nodes.
//!
//! This is an explicit, documented trade-off: `Rc` makes the tree
//! single-thread-only, which is never a problem in practice since the
//! engine is single-threaded and cooperative; a consumer that truly needs
//! to publish a tree across threads deep-copies it first.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use super::interner::{Interner, Key};
use super::value::{AttributeValue, ValueKind};
use crate::domain::errors::InternalError;

pub type NodeRef = Rc<RefCell<Node>>;

#[derive(Debug)]
pub enum Node {
    Leaf(AttributeValue),
    Branch(Branch),
}

impl Node {
    #[must_use]
    pub fn new_branch() -> Self {
        Node::Branch(Branch::default())
    }

    #[must_use]
    pub fn as_leaf(&self) -> Option<&AttributeValue> {
        match self {
            Node::Leaf(v) => Some(v),
            Node::Branch(_) => None,
        }
    }

    #[must_use]
    pub fn as_branch(&self) -> Option<&Branch> {
        match self {
            Node::Branch(b) => Some(b),
            Node::Leaf(_) => None,
        }
    }

    pub fn as_branch_mut(&mut self) -> Option<&mut Branch> {
        match self {
            Node::Branch(b) => Some(b),
            Node::Leaf(_) => None,
        }
    }

    /// Recursively clone into an independent tree; `Opaque` leaves share
    /// their payload `Arc` (cloning the data itself is not this tree's job)
    /// but every `Node`/`Branch`/`Rc<RefCell<_>>` wrapper is freshly
    /// allocated.
    #[must_use]
    pub fn deep_copy(&self) -> Node {
        match self {
            Node::Leaf(v) => Node::Leaf(v.clone()),
            Node::Branch(b) => Node::Branch(b.deep_copy()),
        }
    }

    /// Shallow copy: branch structure at this level is duplicated, but each
    /// child `Rc` is cloned (refcount incremented) rather than recursed
    /// into, so the copy and the original alias the same child subtrees.
    #[must_use]
    pub fn shallow_copy(&self) -> Node {
        match self {
            Node::Leaf(v) => Node::Leaf(v.clone()),
            Node::Branch(b) => Node::Branch(b.shallow_copy()),
        }
    }
}

#[derive(Debug, Default)]
pub struct Branch {
    /// Ordered entries; unnamed entries keep insertion order, as do named
    /// ones interleaved with them.
    entries: Vec<(Option<Key>, NodeRef)>,
    /// Index from a named key to its position in `entries`, enforcing "each
    /// named key appears at most once".
    index: HashMap<Key, usize>,
}

impl Branch {
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[must_use]
    pub fn get(&self, i: usize) -> Option<&NodeRef> {
        self.entries.get(i).map(|(_, n)| n)
    }

    #[must_use]
    pub fn find_named(&self, key: Key) -> Option<&NodeRef> {
        self.index.get(&key).map(|&i| &self.entries[i].1)
    }

    /// Iterate this branch's named children, skipping unnamed entries.
    /// Used by the stats aggregator's summation pass to walk the tree
    /// without knowing its key names up front.
    pub fn iter_named(&self) -> impl Iterator<Item = (Key, &NodeRef)> {
        self.entries.iter().filter_map(|(key, node)| key.map(|k| (k, node)))
    }

    /// Insert a new named child. Returns `false` without modifying the
    /// branch if `key` is already present (callers use `find_named` first
    /// when they want get-or-create semantics).
    pub fn insert_named(&mut self, key: Key, node: Node) -> bool {
        if self.index.contains_key(&key) {
            return false;
        }
        self.index.insert(key, self.entries.len());
        self.entries.push((Some(key), Rc::new(RefCell::new(node))));
        true
    }

    pub fn append_unnamed(&mut self, node: Node) {
        self.entries.push((None, Rc::new(RefCell::new(node))));
    }

    fn deep_copy(&self) -> Branch {
        let mut out = Branch::default();
        for (key, child) in &self.entries {
            let copied = child.borrow().deep_copy();
            match key {
                Some(k) => {
                    out.insert_named(*k, copied);
                }
                None => out.append_unnamed(copied),
            }
        }
        out
    }

    fn shallow_copy(&self) -> Branch {
        Branch { entries: self.entries.clone(), index: self.index.clone() }
    }
}

/// Owning handle to one attribute tree, rooted at an unnamed branch.
#[derive(Debug)]
pub struct AttributeTree {
    root: NodeRef,
}

impl Default for AttributeTree {
    fn default() -> Self {
        Self::new()
    }
}

impl AttributeTree {
    #[must_use]
    pub fn new() -> Self {
        Self { root: Rc::new(RefCell::new(Node::new_branch())) }
    }

    #[must_use]
    pub fn root(&self) -> &NodeRef {
        &self.root
    }

    /// Walk `path` (e.g. `"hooks/event/by_id"`), resolving each segment
    /// against `interner`. Returns `None` ("none") if any segment is
    /// missing or a non-terminal segment is a leaf rather than a branch.
    #[must_use]
    pub fn find(&self, interner: &mut Interner, path: &str) -> Option<NodeRef> {
        let keys = interner.intern_path(path);
        let mut current = Rc::clone(&self.root);
        for key in keys {
            let next = {
                let node = current.borrow();
                let branch = node.as_branch()?;
                branch.find_named(key).cloned()
            };
            current = next?;
        }
        Some(current)
    }

    /// Resolve `path`, creating any missing branch segments and a final
    /// leaf of `kind` if absent. Fails with [`InternalError::AttributeTypeClash`]
    /// if a leaf of a different kind already exists at `path`.
    pub fn find_or_create(
        &self,
        interner: &mut Interner,
        path: &str,
        kind: ValueKind,
    ) -> Result<NodeRef, InternalError> {
        let keys = interner.intern_path(path);
        let mut current = Rc::clone(&self.root);
        let n = keys.len();
        for (i, key) in keys.into_iter().enumerate() {
            let is_last = i + 1 == n;
            let existing = {
                let node = current.borrow();
                node.as_branch().and_then(|b| b.find_named(key)).cloned()
            };
            current = match existing {
                Some(child) => {
                    if is_last {
                        let leaf_kind = child.borrow().as_leaf().map(AttributeValue::kind);
                        if let Some(existing_kind) = leaf_kind {
                            if existing_kind != kind {
                                return Err(InternalError::AttributeTypeClash {
                                    path: path.to_owned(),
                                    existing: existing_kind.name(),
                                    requested: kind.name(),
                                });
                            }
                        }
                    }
                    child
                }
                None => {
                    let new_node =
                        if is_last { Node::Leaf(kind.default_value()) } else { Node::new_branch() };
                    let mut node = current.borrow_mut();
                    let branch = node.as_branch_mut().expect("interior path segment is a leaf");
                    branch.insert_named(key, new_node);
                    branch.find_named(key).cloned().expect("just inserted")
                }
            };
        }
        Ok(current)
    }

    #[must_use]
    pub fn deep_copy(&self) -> AttributeTree {
        AttributeTree { root: Rc::new(RefCell::new(self.root.borrow().deep_copy())) }
    }

    #[must_use]
    pub fn shallow_copy(&self) -> AttributeTree {
        AttributeTree { root: Rc::new(RefCell::new(self.root.borrow().shallow_copy())) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn find_missing_returns_none() {
        let tree = AttributeTree::new();
        let mut interner = Interner::new();
        assert!(tree.find(&mut interner, "a/b/c").is_none());
    }

    #[test]
    fn find_or_create_then_find() {
        let tree = AttributeTree::new();
        let mut interner = Interner::new();
        let node = tree.find_or_create(&mut interner, "stats/count", ValueKind::ULong).unwrap();
        assert!(matches!(node.borrow().as_leaf(), Some(AttributeValue::ULong(0))));

        let found = tree.find(&mut interner, "stats/count").unwrap();
        assert!(Rc::ptr_eq(&node, &found));
    }

    #[test]
    fn find_or_create_rejects_type_clash() {
        let tree = AttributeTree::new();
        let mut interner = Interner::new();
        tree.find_or_create(&mut interner, "x", ValueKind::Int32).unwrap();
        let err = tree.find_or_create(&mut interner, "x", ValueKind::String).unwrap_err();
        assert!(matches!(err, InternalError::AttributeTypeClash { .. }));
    }

    #[test]
    fn duplicate_named_key_rejected_at_branch_level() {
        let mut branch = Branch::default();
        let mut interner = Interner::new();
        let k = interner.intern("dup");
        assert!(branch.insert_named(k, Node::Leaf(AttributeValue::Int32(1))));
        assert!(!branch.insert_named(k, Node::Leaf(AttributeValue::Int32(2))));
        assert_eq!(branch.len(), 1);
    }

    #[test]
    fn unnamed_entries_keep_insertion_order() {
        let mut branch = Branch::default();
        branch.append_unnamed(Node::Leaf(AttributeValue::Int32(1)));
        branch.append_unnamed(Node::Leaf(AttributeValue::Int32(2)));
        branch.append_unnamed(Node::Leaf(AttributeValue::Int32(3)));
        let values: Vec<i32> = (0..branch.len())
            .map(|i| match branch.get(i).unwrap().borrow().as_leaf().unwrap() {
                AttributeValue::Int32(v) => *v,
                _ => unreachable!(),
            })
            .collect();
        assert_eq!(values, vec![1, 2, 3]);
    }

    #[test]
    fn deep_copy_is_independent() {
        let tree = AttributeTree::new();
        let mut interner = Interner::new();
        tree.find_or_create(&mut interner, "a/b", ValueKind::Int32).unwrap();

        let copy = tree.deep_copy();
        // Mutate the original's leaf; the copy must not observe the change.
        let original_leaf = tree.find(&mut interner, "a/b").unwrap();
        *original_leaf.borrow_mut() = Node::Leaf(AttributeValue::Int32(99));

        let copied_leaf = copy.find(&mut interner, "a/b").unwrap();
        assert!(matches!(copied_leaf.borrow().as_leaf(), Some(AttributeValue::Int32(0))));
    }

    #[test]
    fn shallow_copy_aliases_children() {
        let tree = AttributeTree::new();
        let mut interner = Interner::new();
        tree.find_or_create(&mut interner, "a/b", ValueKind::Int32).unwrap();

        let copy = tree.shallow_copy();
        let original_leaf = tree.find(&mut interner, "a/b").unwrap();
        *original_leaf.borrow_mut() = Node::Leaf(AttributeValue::Int32(99));

        let copied_leaf = copy.find(&mut interner, "a/b").unwrap();
        assert!(matches!(copied_leaf.borrow().as_leaf(), Some(AttributeValue::Int32(99))));
    }
}
