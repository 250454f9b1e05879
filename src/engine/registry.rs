//! Node Registry - the arena that owns every node.
//!
//! Manages the lifecycle of node ids:
//! - Monotonic id allocation (ids are never reused)
//! - Parent/child linkage, including splicing a node above another
//! - Ancestor iteration for scoped lookups
//! - Recursive, children-first destruction
//!
//! Removal from the registry is the guard against double destruction: a node
//! that is no longer registered is reported as `Destroyed` and destroying it
//! again does nothing.

use std::collections::HashMap;

use tracing::{debug, trace};

use super::node::Node;
use crate::error::{CogError, Result};
use crate::types::{Lifecycle, NodeId};

// =============================================================================
// Tree
// =============================================================================

#[derive(Debug, Default)]
pub struct Tree {
    nodes: HashMap<NodeId, Node>,
    next_id: u64,
}

impl Tree {
    pub fn new() -> Self {
        Self::default()
    }

    // -------------------------------------------------------------------------
    // Allocation
    // -------------------------------------------------------------------------

    /// Allocate a node and link it under `parent`.
    pub fn allocate(&mut self, parent: Option<NodeId>) -> NodeId {
        self.next_id += 1;
        let id = NodeId(self.next_id);
        self.nodes.insert(id, Node::new(id, None));
        if let Some(parent) = parent {
            self.link(id, parent);
        }
        trace!(%id, ?parent, "allocated node");
        id
    }

    /// Move `child` under `parent`, detaching it from any previous parent.
    pub fn link(&mut self, child: NodeId, parent: NodeId) {
        self.unlink(child);
        if let Some(p) = self.nodes.get_mut(&parent) {
            p.children.insert(child);
        }
        if let Some(c) = self.nodes.get_mut(&child) {
            c.parent = Some(parent);
        }
    }

    /// Detach `child` from its parent's child set.
    pub fn unlink(&mut self, child: NodeId) {
        let parent = self.nodes.get_mut(&child).and_then(|c| c.parent.take());
        if let Some(parent) = parent {
            if let Some(p) = self.nodes.get_mut(&parent) {
                p.children.remove(&child);
            }
        }
    }

    /// Insert `above` between `host` and its parent.
    ///
    /// The host keeps its children, bindings and id; only its parent changes.
    pub fn splice_above(&mut self, host: NodeId, above: NodeId) -> Result<()> {
        let former = self.node(host)?.parent;
        self.node(above)?;
        if let Some(parent) = former {
            self.link(above, parent);
        } else {
            self.unlink(above);
        }
        self.link(host, above);
        debug!(%host, %above, "spliced node above host");
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Lookups
    // -------------------------------------------------------------------------

    pub fn get(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(&id)
    }

    pub fn get_mut(&mut self, id: NodeId) -> Option<&mut Node> {
        self.nodes.get_mut(&id)
    }

    pub fn node(&self, id: NodeId) -> Result<&Node> {
        self.nodes.get(&id).ok_or(CogError::UnknownNode(id))
    }

    pub fn node_mut(&mut self, id: NodeId) -> Result<&mut Node> {
        self.nodes.get_mut(&id).ok_or(CogError::UnknownNode(id))
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.nodes.contains_key(&id)
    }

    /// Lifecycle of `id`; ids no longer registered report `Destroyed`.
    pub fn state(&self, id: NodeId) -> Lifecycle {
        self.nodes
            .get(&id)
            .map(Node::state)
            .unwrap_or(Lifecycle::Destroyed)
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.nodes.get(&id).and_then(|n| n.parent)
    }

    /// Children of `id` in id order.
    pub fn children(&self, id: NodeId) -> Vec<NodeId> {
        self.nodes
            .get(&id)
            .map(|n| n.children.iter().copied().collect())
            .unwrap_or_default()
    }

    /// `id` followed by each ancestor up to the root.
    pub fn ancestors(&self, id: NodeId) -> Ancestors<'_> {
        Ancestors {
            tree: self,
            next: Some(id),
        }
    }

    /// Nearest declared path walking up from `id`.
    pub fn inherited_path(&self, id: NodeId) -> Option<&str> {
        self.ancestors(id).find_map(|n| n.path.as_deref())
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    // -------------------------------------------------------------------------
    // Destruction
    // -------------------------------------------------------------------------

    /// Destroy `id` and its whole subtree, children first.
    ///
    /// Returns the destroyed ids in destruction order. Unknown ids are a no-op.
    pub fn destroy(&mut self, id: NodeId) -> Vec<NodeId> {
        let mut destroyed = Vec::new();
        self.destroy_into(id, &mut destroyed);
        destroyed
    }

    fn destroy_into(&mut self, id: NodeId, destroyed: &mut Vec<NodeId>) {
        let Some(node) = self.nodes.get(&id) else {
            return;
        };
        let children: Vec<NodeId> = node.children.iter().copied().collect();
        for child in children {
            self.destroy_into(child, destroyed);
        }

        let Some(node) = self.nodes.get_mut(&id) else {
            return;
        };
        for stop in node.registrations.drain(..) {
            stop();
        }
        if let Some(mut behavior) = node.behavior.take() {
            behavior.destroy();
        }

        self.unlink(id);

        // The registry drops its entry; the record is cleared and marked terminal.
        if let Some(mut node) = self.nodes.remove(&id) {
            node.advance(Lifecycle::Destroyed);
            node.scope.clear();
            node.props.clear();
            node.sensors.clear();
            node.pending_hooks.clear();
            node.declarations = None;
        }
        debug!(%id, "destroyed node");
        destroyed.push(id);
    }

    /// Drop every node without running hooks (application teardown).
    pub fn clear(&mut self) {
        self.nodes.clear();
    }
}

/// Iterator over a node and its ancestors.
pub struct Ancestors<'a> {
    tree: &'a Tree,
    next: Option<NodeId>,
}

impl<'a> Iterator for Ancestors<'a> {
    type Item = &'a Node;

    fn next(&mut self) -> Option<Self::Item> {
        let node = self.tree.nodes.get(&self.next?)?;
        self.next = node.parent;
        Some(node)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    use serde_json::json;

    use crate::engine::Binding;
    use crate::state::Behavior;
    use crate::types::Namespace;

    struct Recorder {
        id: NodeId,
        log: Rc<RefCell<Vec<NodeId>>>,
    }

    impl Behavior for Recorder {
        fn destroy(&mut self) {
            self.log.borrow_mut().push(self.id);
        }
    }

    fn install(tree: &mut Tree, id: NodeId, log: &Rc<RefCell<Vec<NodeId>>>) {
        tree.node_mut(id).unwrap().behavior = Some(Box::new(Recorder {
            id,
            log: log.clone(),
        }));
    }

    #[test]
    fn test_allocate_links_parent() {
        let mut tree = Tree::new();
        let root = tree.allocate(None);
        let a = tree.allocate(Some(root));
        let b = tree.allocate(Some(root));

        assert_eq!(tree.children(root), vec![a, b]);
        assert_eq!(tree.parent(a), Some(root));
        assert_eq!(tree.state(a), Lifecycle::Created);
        assert_ne!(a, b);
    }

    #[test]
    fn test_ids_are_not_reused() {
        let mut tree = Tree::new();
        let a = tree.allocate(None);
        tree.destroy(a);
        let b = tree.allocate(None);
        assert_ne!(a, b);
        assert_eq!(tree.state(a), Lifecycle::Destroyed);
    }

    #[test]
    fn test_destroy_cascades_depth_first() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let mut tree = Tree::new();
        let root = tree.allocate(None);
        let top = tree.allocate(Some(root));
        let mid_a = tree.allocate(Some(top));
        let leaf_a = tree.allocate(Some(mid_a));
        let mid_b = tree.allocate(Some(top));
        let leaf_b = tree.allocate(Some(mid_b));
        for id in [top, mid_a, leaf_a, mid_b, leaf_b] {
            install(&mut tree, id, &log);
        }

        let destroyed = tree.destroy(top);

        let expected = vec![leaf_a, mid_a, leaf_b, mid_b, top];
        assert_eq!(destroyed, expected);
        assert_eq!(*log.borrow(), expected);
        assert!(tree.children(root).is_empty());
        assert_eq!(tree.len(), 1);
    }

    #[test]
    fn test_destroy_twice_is_noop() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let mut tree = Tree::new();
        let a = tree.allocate(None);
        install(&mut tree, a, &log);

        assert_eq!(tree.destroy(a), vec![a]);
        assert!(tree.destroy(a).is_empty());
        assert_eq!(log.borrow().len(), 1);
    }

    #[test]
    fn test_destroy_releases_registrations() {
        let released = Rc::new(RefCell::new(0));
        let mut tree = Tree::new();
        let a = tree.allocate(None);
        let counter = released.clone();
        tree.node_mut(a)
            .unwrap()
            .register(move || *counter.borrow_mut() += 1);

        tree.destroy(a);
        assert_eq!(*released.borrow(), 1);
    }

    #[test]
    fn test_splice_preserves_subtree() {
        let mut tree = Tree::new();
        let root = tree.allocate(None);
        let host = tree.allocate(Some(root));
        let kid = tree.allocate(Some(host));
        tree.define(host, "item", Binding::Config(json!("kept"))).unwrap();

        let alloy = tree.allocate(None);
        tree.splice_above(host, alloy).unwrap();

        assert_eq!(tree.parent(host), Some(alloy));
        assert_eq!(tree.parent(alloy), Some(root));
        assert_eq!(tree.children(root), vec![alloy]);
        assert_eq!(tree.children(alloy), vec![host]);
        assert_eq!(tree.children(host), vec![kid]);
        let kept = tree
            .lookup(host, "item", Namespace::Config, crate::types::Where::Local)
            .unwrap()
            .and_then(|b| b.value());
        assert_eq!(kept, Some(json!("kept")));
    }

    #[test]
    fn test_inherited_path() {
        let mut tree = Tree::new();
        let root = tree.allocate(None);
        tree.node_mut(root).unwrap().path = Some("/app/".into());
        let a = tree.allocate(Some(root));
        let b = tree.allocate(Some(a));
        assert_eq!(tree.inherited_path(b), Some("/app/"));
    }
}
