//! Scoped Namespaces - per-node bindings and ancestor lookup.
//!
//! Every node owns one mapping per [`Namespace`]. Lookups walk the ancestor
//! chain under a [`Where`] policy:
//!
//! - `local` - own mapping only
//! - `first` - nearest definition, self included
//! - `outer` - walking up from the parent, skip the first definition and
//!   return the second
//! - `last` - definition closest to the root
//! - `parent` - `first`, starting at the parent
//!
//! # Valves
//!
//! A node may declare a valve (allow-list) per namespace. A valve sits at the
//! bottom of its node: it is checked whenever a lookup arrives from below,
//! before the node's own mapping is consulted, and never for the node the
//! lookup started from. A name missing from the allow-list halts the walk.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;
use std::rc::Rc;

use serde_json::Value;
use spark_signals::{signal, Signal};

use super::registry::Tree;
use crate::error::{CogError, Result};
use crate::types::{Namespace, NodeId, Where};

// =============================================================================
// Bindings
// =============================================================================

/// Callable exposed through the method namespace.
pub type Method = Rc<dyn Fn(&Value) -> Value>;

/// Declared service endpoint. Requests are issued by an external client.
#[derive(Debug, Clone, PartialEq)]
pub struct ServiceHandle {
    pub name: String,
    pub url: Option<String>,
    /// Data slot responses are written to.
    pub to: Option<String>,
    pub settings: Value,
}

/// Declared feed: a named view onto a service writing into a data slot.
#[derive(Debug, Clone, PartialEq)]
pub struct FeedHandle {
    pub name: String,
    pub service: Rc<ServiceHandle>,
    pub to: Option<String>,
}

/// A value bound to a name in one of a node's namespaces.
#[derive(Clone)]
pub enum Binding {
    Data(Signal<Value>),
    Service(Rc<ServiceHandle>),
    Feed(Rc<FeedHandle>),
    Alias(String),
    Config(Value),
    Method(Method),
}

impl Binding {
    pub fn namespace(&self) -> Namespace {
        match self {
            Binding::Data(_) => Namespace::Data,
            Binding::Service(_) => Namespace::Service,
            Binding::Feed(_) => Namespace::Feed,
            Binding::Alias(_) => Namespace::Alias,
            Binding::Config(_) => Namespace::Config,
            Binding::Method(_) => Namespace::Method,
        }
    }

    pub fn as_data(&self) -> Option<&Signal<Value>> {
        match self {
            Binding::Data(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_alias(&self) -> Option<&str> {
        match self {
            Binding::Alias(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_config(&self) -> Option<&Value> {
        match self {
            Binding::Config(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_method(&self) -> Option<&Method> {
        match self {
            Binding::Method(m) => Some(m),
            _ => None,
        }
    }

    /// Current value for value-like bindings.
    pub fn value(&self) -> Option<Value> {
        match self {
            Binding::Data(s) => Some(s.get()),
            Binding::Alias(s) => Some(Value::String(s.clone())),
            Binding::Config(v) => Some(v.clone()),
            _ => None,
        }
    }
}

impl fmt::Debug for Binding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Binding::Data(_) => f.write_str("Data(..)"),
            Binding::Service(s) => write!(f, "Service({})", s.name),
            Binding::Feed(s) => write!(f, "Feed({})", s.name),
            Binding::Alias(url) => write!(f, "Alias({url})"),
            Binding::Config(v) => write!(f, "Config({v})"),
            Binding::Method(_) => f.write_str("Method(..)"),
        }
    }
}

// =============================================================================
// Scope
// =============================================================================

/// All namespaces and valves of one node.
#[derive(Debug, Default)]
pub struct Scope {
    maps: HashMap<Namespace, BTreeMap<String, Binding>>,
    valves: HashMap<Namespace, BTreeSet<String>>,
}

impl Scope {
    pub fn get(&self, ns: Namespace, name: &str) -> Option<&Binding> {
        self.maps.get(&ns).and_then(|m| m.get(name))
    }

    pub fn contains(&self, ns: Namespace, name: &str) -> bool {
        self.get(ns, name).is_some()
    }

    /// Bind `name`. Returns the binding back if the name is already taken.
    pub fn insert(&mut self, ns: Namespace, name: &str, binding: Binding) -> Result<(), Binding> {
        let map = self.maps.entry(ns).or_default();
        if map.contains_key(name) {
            return Err(binding);
        }
        map.insert(name.to_string(), binding);
        Ok(())
    }

    /// Bind `name`, replacing any previous binding.
    pub fn set(&mut self, ns: Namespace, name: &str, binding: Binding) {
        self.maps.entry(ns).or_default().insert(name.to_string(), binding);
    }

    /// Add names to the namespace's valve, creating it if needed.
    pub fn allow(&mut self, ns: Namespace, names: &[String]) {
        let valve = self.valves.entry(ns).or_default();
        valve.extend(names.iter().cloned());
    }

    /// Whether a lookup arriving from below may see `name` here.
    pub fn passes_valve(&self, ns: Namespace, name: &str) -> bool {
        match self.valves.get(&ns) {
            Some(allowed) => allowed.contains(name),
            None => true,
        }
    }

    pub fn clear(&mut self) {
        self.maps.clear();
        self.valves.clear();
    }
}

// =============================================================================
// Lookup
// =============================================================================

impl Tree {
    /// Scoped lookup. A non-optional miss is a `ResolutionFailure`.
    pub fn find(
        &self,
        from: NodeId,
        name: &str,
        ns: Namespace,
        mode: Where,
        optional: bool,
    ) -> Result<Option<Binding>> {
        match self.lookup(from, name, ns, mode)? {
            Some(binding) => Ok(Some(binding.clone())),
            None if optional => Ok(None),
            None => Err(CogError::ResolutionFailure {
                node: from,
                namespace: ns,
                name: name.to_string(),
                mode,
            }),
        }
    }

    /// Like [`find`](Self::find) with the traversal mode given as text.
    pub fn find_str(
        &self,
        from: NodeId,
        name: &str,
        ns: Namespace,
        mode: &str,
        optional: bool,
    ) -> Result<Option<Binding>> {
        let mode: Where = mode.parse()?;
        self.find(from, name, ns, mode, optional)
    }

    /// Borrowing lookup; a miss is `Ok(None)`.
    pub fn lookup(
        &self,
        from: NodeId,
        name: &str,
        ns: Namespace,
        mode: Where,
    ) -> Result<Option<&Binding>> {
        let node = self.node(from)?;
        Ok(match mode {
            Where::Local => node.scope.get(ns, name),
            Where::First => self.find_first(from, name, ns, false),
            Where::Outer => node
                .parent
                .and_then(|parent| self.find_outer(parent, name, ns)),
            Where::Last => self.find_last(from, name, ns),
            Where::Parent => node
                .parent
                .and_then(|parent| self.find_first(parent, name, ns, true)),
        })
    }

    fn find_first(
        &self,
        start: NodeId,
        name: &str,
        ns: Namespace,
        from_child: bool,
    ) -> Option<&Binding> {
        let mut check_valve = from_child;
        for node in self.ancestors(start) {
            if check_valve && !node.scope.passes_valve(ns, name) {
                return None;
            }
            // Valves sit below their node: never checked where the walk starts
            check_valve = true;
            if let Some(binding) = node.scope.get(ns, name) {
                return Some(binding);
            }
        }
        None
    }

    // Starts at the parent, which is always reached from a child.
    fn find_outer(&self, start: NodeId, name: &str, ns: Namespace) -> Option<&Binding> {
        let mut found = false;
        for node in self.ancestors(start) {
            if !node.scope.passes_valve(ns, name) {
                return None;
            }
            if let Some(binding) = node.scope.get(ns, name) {
                if found {
                    return Some(binding);
                }
                found = true;
            }
        }
        None
    }

    fn find_last(&self, start: NodeId, name: &str, ns: Namespace) -> Option<&Binding> {
        let mut result = None;
        let mut check_valve = false;
        for node in self.ancestors(start) {
            if check_valve && !node.scope.passes_valve(ns, name) {
                return result;
            }
            check_valve = true;
            if let Some(binding) = node.scope.get(ns, name) {
                result = Some(binding);
            }
        }
        result
    }

    // -------------------------------------------------------------------------
    // Typed helpers
    // -------------------------------------------------------------------------

    pub fn find_data(&self, from: NodeId, name: &str, mode: Where) -> Option<Signal<Value>> {
        self.lookup(from, name, Namespace::Data, mode)
            .ok()
            .flatten()
            .and_then(Binding::as_data)
            .cloned()
    }

    pub fn find_config(&self, from: NodeId, name: &str, mode: Where) -> Option<Value> {
        self.lookup(from, name, Namespace::Config, mode)
            .ok()
            .flatten()
            .and_then(Binding::as_config)
            .cloned()
    }

    pub fn find_alias(&self, from: NodeId, name: &str) -> Option<String> {
        self.lookup(from, name, Namespace::Alias, Where::First)
            .ok()
            .flatten()
            .and_then(Binding::as_alias)
            .map(str::to_string)
    }

    pub fn find_method(&self, from: NodeId, name: &str, mode: Where) -> Option<Method> {
        self.lookup(from, name, Namespace::Method, mode)
            .ok()
            .flatten()
            .and_then(Binding::as_method)
            .cloned()
    }

    pub fn find_service(&self, from: NodeId, name: &str, mode: Where) -> Option<Rc<ServiceHandle>> {
        match self.lookup(from, name, Namespace::Service, mode).ok().flatten() {
            Some(Binding::Service(s)) => Some(s.clone()),
            _ => None,
        }
    }

    pub fn find_feed(&self, from: NodeId, name: &str, mode: Where) -> Option<Rc<FeedHandle>> {
        match self.lookup(from, name, Namespace::Feed, mode).ok().flatten() {
            Some(Binding::Feed(s)) => Some(s.clone()),
            _ => None,
        }
    }

    // -------------------------------------------------------------------------
    // Definition
    // -------------------------------------------------------------------------

    /// Bind `name` on `id`. A name already bound there is a `PropertyCollision`.
    pub fn define(&mut self, id: NodeId, name: &str, binding: Binding) -> Result<()> {
        let ns = binding.namespace();
        let node = self.node_mut(id)?;
        node.scope
            .insert(ns, name, binding)
            .map_err(|_| CogError::PropertyCollision {
                node: id,
                namespace: ns.as_str(),
                name: name.to_string(),
            })
    }

    /// Local data slot `name`, created with a null value if missing.
    pub fn demand_data(&mut self, id: NodeId, name: &str) -> Result<Signal<Value>> {
        let node = self.node_mut(id)?;
        if let Some(Binding::Data(existing)) = node.scope.get(Namespace::Data, name) {
            return Ok(existing.clone());
        }
        let slot = signal(Value::Null);
        self.define(id, name, Binding::Data(slot.clone()))?;
        Ok(slot)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn config(v: Value) -> Binding {
        Binding::Config(v)
    }

    fn value_of(b: Option<Binding>) -> Option<Value> {
        b.and_then(|b| b.value())
    }

    /// A -> B -> C, returning (tree, a, b, c).
    fn chain3() -> (Tree, NodeId, NodeId, NodeId) {
        let mut tree = Tree::new();
        let a = tree.allocate(None);
        let b = tree.allocate(Some(a));
        let c = tree.allocate(Some(b));
        (tree, a, b, c)
    }

    #[test]
    fn test_local_and_first() {
        let (mut tree, a, b, c) = chain3();
        tree.define(a, "x", config(json!(1))).unwrap();
        tree.define(b, "x", config(json!(2))).unwrap();

        let found = tree.find(c, "x", Namespace::Config, Where::First, false).unwrap();
        assert_eq!(value_of(found), Some(json!(2)));

        assert!(tree.find(c, "x", Namespace::Config, Where::Local, true).unwrap().is_none());
        let local = tree.find(b, "x", Namespace::Config, Where::Local, false).unwrap();
        assert_eq!(value_of(local), Some(json!(2)));
    }

    #[test]
    fn test_outer_skips_nearest() {
        let (mut tree, a, b, c) = chain3();
        tree.define(a, "x", config(json!(1))).unwrap();
        tree.define(b, "x", config(json!(2))).unwrap();

        let from_c = tree.find(c, "x", Namespace::Config, Where::Outer, false).unwrap();
        assert_eq!(value_of(from_c), Some(json!(1)));

        // Only one definition above B's own level
        assert!(tree.find(b, "x", Namespace::Config, Where::Outer, true).unwrap().is_none());
    }

    #[test]
    fn test_last_prefers_root_most() {
        let (mut tree, a, b, c) = chain3();
        tree.define(a, "x", config(json!(1))).unwrap();
        tree.define(b, "x", config(json!(2))).unwrap();
        tree.define(c, "x", config(json!(3))).unwrap();

        let found = tree.find(c, "x", Namespace::Config, Where::Last, false).unwrap();
        assert_eq!(value_of(found), Some(json!(1)));
    }

    #[test]
    fn test_parent_skips_self() {
        let (mut tree, _a, b, c) = chain3();
        tree.define(b, "x", config(json!(2))).unwrap();
        tree.define(c, "x", config(json!(3))).unwrap();

        let found = tree.find(c, "x", Namespace::Config, Where::Parent, false).unwrap();
        assert_eq!(value_of(found), Some(json!(2)));
    }

    #[test]
    fn test_valve_containment() {
        let (mut tree, a, _b, c) = chain3();
        tree.define(a, "x", config(json!("x"))).unwrap();
        tree.define(a, "y", config(json!("y"))).unwrap();
        tree.node_mut(a).unwrap().scope.allow(Namespace::Config, &["x".to_string()]);

        for mode in [Where::First, Where::Last] {
            assert!(
                tree.find(c, "y", Namespace::Config, mode, true).unwrap().is_none(),
                "valve should hide y for {mode}"
            );
            let x = tree.find(c, "x", Namespace::Config, mode, false).unwrap();
            assert_eq!(value_of(x), Some(json!("x")));
        }
    }

    #[test]
    fn test_valve_blocks_outer_and_parent() {
        let (mut tree, a, b, c) = chain3();
        tree.define(a, "x", config(json!(1))).unwrap();
        tree.define(b, "x", config(json!(2))).unwrap();
        tree.node_mut(b).unwrap().scope.allow(Namespace::Config, &["other".to_string()]);

        // B is reached from C, so its valve applies before its own mapping
        for mode in [Where::Outer, Where::Parent] {
            assert!(
                tree.find(c, "x", Namespace::Config, mode, true).unwrap().is_none(),
                "valve at B should hide x for {mode}"
            );
        }
        assert!(matches!(
            tree.find(c, "x", Namespace::Config, Where::Parent, false),
            Err(CogError::ResolutionFailure { .. })
        ));

        tree.node_mut(b).unwrap().scope.allow(Namespace::Config, &["x".to_string()]);
        let parent = tree.find(c, "x", Namespace::Config, Where::Parent, false).unwrap();
        assert_eq!(value_of(parent), Some(json!(2)));
        let outer = tree.find(c, "x", Namespace::Config, Where::Outer, false).unwrap();
        assert_eq!(value_of(outer), Some(json!(1)));
    }

    #[test]
    fn test_outer_stops_at_valve_above_first_match() {
        let (mut tree, a, b, c) = chain3();
        tree.define(a, "x", config(json!(1))).unwrap();
        tree.define(b, "x", config(json!(2))).unwrap();
        tree.node_mut(a).unwrap().scope.allow(Namespace::Config, &[]);

        assert!(tree.find(c, "x", Namespace::Config, Where::Outer, true).unwrap().is_none());
        let first = tree.find(c, "x", Namespace::Config, Where::First, false).unwrap();
        assert_eq!(value_of(first), Some(json!(2)));
    }

    #[test]
    fn test_valve_not_checked_at_local_level() {
        let (mut tree, a, _b, _c) = chain3();
        tree.define(a, "y", config(json!("y"))).unwrap();
        tree.node_mut(a).unwrap().scope.allow(Namespace::Config, &[]);

        let found = tree.find(a, "y", Namespace::Config, Where::First, false).unwrap();
        assert_eq!(value_of(found), Some(json!("y")));
    }

    #[test]
    fn test_valve_is_per_namespace() {
        let (mut tree, a, _b, c) = chain3();
        tree.define(a, "y", config(json!("y"))).unwrap();
        tree.node_mut(a).unwrap().scope.allow(Namespace::Data, &[]);

        assert!(tree.find(c, "y", Namespace::Config, Where::First, true).unwrap().is_some());
    }

    #[test]
    fn test_last_returns_match_below_valve() {
        let (mut tree, a, b, c) = chain3();
        tree.define(a, "x", config(json!(1))).unwrap();
        tree.define(b, "x", config(json!(2))).unwrap();
        tree.node_mut(a).unwrap().scope.allow(Namespace::Config, &[]);

        let found = tree.find(c, "x", Namespace::Config, Where::Last, false).unwrap();
        assert_eq!(value_of(found), Some(json!(2)));
    }

    #[test]
    fn test_required_miss_is_resolution_failure() {
        let (tree, _a, _b, c) = chain3();
        let err = tree.find(c, "nope", Namespace::Alias, Where::First, false).unwrap_err();
        assert!(matches!(err, CogError::ResolutionFailure { name, .. } if name == "nope"));
    }

    #[test]
    fn test_unknown_mode_is_invalid_option() {
        let (tree, _a, _b, c) = chain3();
        let err = tree.find_str(c, "x", Namespace::Data, "everywhere", true).unwrap_err();
        assert!(matches!(err, CogError::InvalidOption { option: "where", .. }));
    }

    #[test]
    fn test_define_collision() {
        let (mut tree, a, _b, _c) = chain3();
        tree.define(a, "x", config(json!(1))).unwrap();
        let err = tree.define(a, "x", config(json!(2))).unwrap_err();
        assert!(matches!(err, CogError::PropertyCollision { namespace: "config", .. }));
        // Same name in another namespace is fine
        tree.define(a, "x", Binding::Alias("/x/".into())).unwrap();
    }

    #[test]
    fn test_demand_data_reuses_slot() {
        let (mut tree, a, _b, c) = chain3();
        let slot = tree.demand_data(a, "items").unwrap();
        slot.set(json!([1, 2]));

        let again = tree.demand_data(a, "items").unwrap();
        assert_eq!(again.get(), json!([1, 2]));

        let seen = tree.find_data(c, "items", Where::First).unwrap();
        assert_eq!(seen.get(), json!([1, 2]));
    }
}
