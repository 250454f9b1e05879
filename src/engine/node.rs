//! Node - one instantiated component in the tree.
//!
//! A node is a plain record owned by the [`Tree`](super::Tree) arena. Parent
//! and children are ids, never references, so the tree has no ownership cycles.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::rc::Rc;

use serde::Deserialize;
use serde_json::Value;

use super::namespace::{Binding, Scope};
use crate::loader::{Declarations, RequirementSet};
use crate::state::{Behavior, SensorState};
use crate::types::{Lifecycle, ListMeta, NodeId, NodeKind, ValueSource};

// =============================================================================
// Props
// =============================================================================

/// A named capability exposed to a node's behavior.
#[derive(Clone)]
pub enum Prop {
    /// A binding found through a `prop` declaration or flagged with `prop`.
    Binding(Binding),
    /// A plain value (item snapshots, config props).
    Value(Value),
    /// An alloy spliced above the node.
    Alloy(NodeId),
}

impl fmt::Debug for Prop {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Prop::Binding(b) => f.debug_tuple("Binding").field(b).finish(),
            Prop::Value(v) => f.debug_tuple("Value").field(v).finish(),
            Prop::Alloy(id) => f.debug_tuple("Alloy").field(id).finish(),
        }
    }
}

// =============================================================================
// Source Binding
// =============================================================================

/// How a cog's item slot is fed from a parent-resolved source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemType {
    #[default]
    Data,
    Config,
    Prop,
}

/// Source/item pair declared on a cog or chain.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceBinding {
    pub source: ValueSource,
    pub item: String,
    pub item_type: ItemType,
}

/// List configuration stored on a chain node.
#[derive(Debug, Clone, PartialEq)]
pub struct ChainSpec {
    /// Resolved URL of the per-item template.
    pub item_url: String,
    /// Field used as the item key; positional keys when absent.
    pub key_field: Option<String>,
}

/// Hook deferred until the node has a behavior.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListHook {
    Enter,
    Update,
}

// =============================================================================
// Node
// =============================================================================

pub struct Node {
    pub id: NodeId,
    pub parent: Option<NodeId>,
    pub children: BTreeSet<NodeId>,
    pub kind: NodeKind,
    pub name: Option<String>,
    /// Host node an alloy was spliced for.
    pub origin: Option<NodeId>,

    /// URL as declared (possibly relative or aliased).
    pub url: Option<String>,
    /// Absolute, normalized URL used as cache key.
    pub resolved_url: Option<String>,
    /// Directory used to resolve relative URLs of descendants.
    pub path: Option<String>,

    state: Lifecycle,
    pub scope: Scope,
    pub props: BTreeMap<String, Prop>,
    pub requirements: RequirementSet,
    pub declarations: Option<Rc<Declarations>>,
    pub behavior: Option<Box<dyn Behavior>>,

    pub source: Option<SourceBinding>,
    pub chain: Option<ChainSpec>,
    pub list: Option<ListMeta>,
    pub pending_hooks: Vec<ListHook>,
    pub sensors: Vec<SensorState>,

    /// Stop handles of reactive subscriptions owned by this node.
    pub registrations: Vec<Box<dyn FnOnce()>>,
}

impl Node {
    pub fn new(id: NodeId, parent: Option<NodeId>) -> Self {
        Self {
            id,
            parent,
            children: BTreeSet::new(),
            kind: NodeKind::Cog,
            name: None,
            origin: None,
            url: None,
            resolved_url: None,
            path: None,
            state: Lifecycle::Created,
            scope: Scope::default(),
            props: BTreeMap::new(),
            requirements: RequirementSet::default(),
            declarations: None,
            behavior: None,
            source: None,
            chain: None,
            list: None,
            pending_hooks: Vec::new(),
            sensors: Vec::new(),
            registrations: Vec::new(),
        }
    }

    pub fn state(&self) -> Lifecycle {
        self.state
    }

    /// Advance the lifecycle. Returns false (and changes nothing) when the
    /// transition would not move forward.
    pub fn advance(&mut self, next: Lifecycle) -> bool {
        if next <= self.state {
            return false;
        }
        self.state = next;
        true
    }

    pub fn is_initialized(&self) -> bool {
        self.state == Lifecycle::Initialized
    }

    pub fn is_alloy(&self) -> bool {
        self.kind == NodeKind::Alloy
    }

    pub fn is_destroyed(&self) -> bool {
        self.state == Lifecycle::Destroyed
    }

    /// Register a subscription stop handle released on destroy.
    pub fn register(&mut self, stop: impl FnOnce() + 'static) {
        self.registrations.push(Box::new(stop));
    }
}

impl fmt::Debug for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Node")
            .field("id", &self.id)
            .field("parent", &self.parent)
            .field("children", &self.children)
            .field("kind", &self.kind)
            .field("name", &self.name)
            .field("resolved_url", &self.resolved_url)
            .field("state", &self.state)
            .field("list", &self.list)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lifecycle_is_monotonic() {
        let mut node = Node::new(NodeId(1), None);
        assert_eq!(node.state(), Lifecycle::Created);

        assert!(node.advance(Lifecycle::ResolvingRequirements));
        assert!(node.advance(Lifecycle::Initialized));
        assert!(!node.advance(Lifecycle::ResolvingRequirements));
        assert_eq!(node.state(), Lifecycle::Initialized);

        assert!(node.advance(Lifecycle::Destroyed));
        assert!(!node.advance(Lifecycle::Initialized));
        assert!(node.is_destroyed());
    }

    #[test]
    fn test_skipping_forward_is_allowed() {
        // Alloys and pinions go straight from Created to Initialized
        let mut node = Node::new(NodeId(2), Some(NodeId(1)));
        assert!(node.advance(Lifecycle::Initialized));
        assert!(node.is_initialized());
    }
}
