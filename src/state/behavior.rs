//! Behaviors - user code attached to a node.
//!
//! A behavior receives lifecycle hooks and exposes named methods. Hooks get a
//! [`NodeContext`] giving scoped access to the node's bindings; the behavior
//! itself is taken out of the node for the duration of the call, so a hook can
//! read the tree freely.
//!
//! # Example
//!
//! ```ignore
//! struct Counter;
//!
//! impl Behavior for Counter {
//!     fn start(&mut self, cx: &mut NodeContext<'_>) {
//!         cx.write("count", json!(0)).ok();
//!     }
//! }
//!
//! let behaviors = BehaviorRegistry::new();
//! behaviors.register("counter", || Box::new(Counter));
//! ```

use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use serde_json::Value;
use spark_signals::Signal;

use crate::engine::{Binding, Method, Node, Prop, Tree};
use crate::error::{CogError, Result};
use crate::types::{ListMeta, Namespace, NodeId, Where};

// =============================================================================
// Behavior
// =============================================================================

/// Lifecycle hooks and methods of a node. Every hook is optional.
pub trait Behavior {
    /// After first-pass declarations, before sensors and children.
    fn init(&mut self, _cx: &mut NodeContext<'_>) {}

    /// After children and chains were created.
    fn start(&mut self, _cx: &mut NodeContext<'_>) {}

    /// The node's item changed (list reconcile or source update).
    fn update(&mut self, _cx: &mut NodeContext<'_>) {}

    /// The node entered a list.
    fn enter(&mut self, _cx: &mut NodeContext<'_>) {}

    /// The node is leaving a list; destruction follows.
    fn exit(&mut self, _cx: &mut NodeContext<'_>) {}

    /// Called once while the node is destroyed, after its children.
    fn destroy(&mut self) {}

    /// A sensor with `run: handler` fired.
    fn receive(&mut self, _handler: &str, _value: &Value, _cx: &mut NodeContext<'_>) {}

    /// Named method, used by method declarations and `run` value sources.
    fn method(&self, _name: &str) -> Option<Method> {
        None
    }
}

/// Behavior of nodes whose template provides none.
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultBehavior;

impl Behavior for DefaultBehavior {}

/// Builds a fresh behavior for each node instantiating a template.
pub type BehaviorFactory = Rc<dyn Fn() -> Box<dyn Behavior>>;

/// Named behavior factories, shared between the parser and script installers.
#[derive(Clone, Default)]
pub struct BehaviorRegistry {
    factories: Rc<RefCell<HashMap<String, BehaviorFactory>>>,
}

impl BehaviorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<F>(&self, name: impl Into<String>, factory: F)
    where
        F: Fn() -> Box<dyn Behavior> + 'static,
    {
        self.factories
            .borrow_mut()
            .insert(name.into(), Rc::new(factory));
    }

    pub fn get(&self, name: &str) -> Option<BehaviorFactory> {
        self.factories.borrow().get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.factories.borrow().contains_key(name)
    }
}

impl fmt::Debug for BehaviorRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<String> = self.factories.borrow().keys().cloned().collect();
        names.sort();
        f.debug_struct("BehaviorRegistry").field("names", &names).finish()
    }
}

// =============================================================================
// Node Context
// =============================================================================

/// Scoped view of a node handed to behavior hooks.
pub struct NodeContext<'a> {
    id: NodeId,
    tree: &'a Tree,
}

impl<'a> NodeContext<'a> {
    pub fn new(id: NodeId, tree: &'a Tree) -> Self {
        Self { id, tree }
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn node(&self) -> Option<&'a Node> {
        self.tree.get(self.id)
    }

    pub fn children(&self) -> Vec<NodeId> {
        self.tree.children(self.id)
    }

    pub fn find(&self, name: &str, ns: Namespace, mode: Where, optional: bool) -> Result<Option<Binding>> {
        self.tree.find(self.id, name, ns, mode, optional)
    }

    /// Nearest data slot named `name`.
    pub fn data(&self, name: &str) -> Option<Signal<Value>> {
        self.tree.find_data(self.id, name, Where::First)
    }

    /// Current value of the nearest data slot named `name`.
    pub fn read(&self, name: &str) -> Option<Value> {
        self.data(name).map(|slot| slot.get())
    }

    /// Set the nearest data slot named `name`.
    pub fn write(&self, name: &str, value: Value) -> Result<()> {
        let slot = self.data(name).ok_or_else(|| CogError::ResolutionFailure {
            node: self.id,
            namespace: Namespace::Data,
            name: name.to_string(),
            mode: Where::First,
        })?;
        slot.set(value);
        Ok(())
    }

    pub fn config(&self, name: &str) -> Option<Value> {
        self.tree.find_config(self.id, name, Where::First)
    }

    pub fn method(&self, name: &str) -> Option<Method> {
        self.tree.find_method(self.id, name, Where::First)
    }

    pub fn prop(&self, name: &str) -> Option<&'a Prop> {
        self.node()?.props.get(name)
    }

    /// Id of the alloy exposed as prop `name`.
    pub fn alloy(&self, name: &str) -> Option<NodeId> {
        match self.prop(name)? {
            Prop::Alloy(id) => Some(*id),
            _ => None,
        }
    }

    /// List position of the node, if it is a list item.
    pub fn item(&self) -> Option<&'a ListMeta> {
        self.node()?.list.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use spark_signals::signal;

    #[test]
    fn test_registry_shares_factories() {
        let registry = BehaviorRegistry::new();
        let clone = registry.clone();
        clone.register("plain", || Box::new(DefaultBehavior));

        assert!(registry.contains("plain"));
        assert!(registry.get("missing").is_none());
        let factory = registry.get("plain").unwrap();
        let _behavior = factory();
    }

    #[test]
    fn test_context_reads_and_writes_scope() {
        let mut tree = Tree::new();
        let root = tree.allocate(None);
        let child = tree.allocate(Some(root));
        let slot = signal(json!(1));
        tree.define(root, "count", Binding::Data(slot.clone())).unwrap();
        tree.define(root, "title", Binding::Config(json!("hi"))).unwrap();

        let cx = NodeContext::new(child, &tree);
        assert_eq!(cx.read("count"), Some(json!(1)));
        assert_eq!(cx.config("title"), Some(json!("hi")));

        cx.write("count", json!(2)).unwrap();
        assert_eq!(slot.get(), json!(2));
        assert!(matches!(
            cx.write("missing", json!(0)),
            Err(CogError::ResolutionFailure { .. })
        ));
    }
}
