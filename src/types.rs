//! Core types for spark-cogs.
//!
//! These types are shared by every layer: the node arena, the namespace
//! resolver, the loader and the runtime.

use std::fmt;
use std::str::FromStr;

use serde::Deserialize;
use serde_json::Value;

use crate::error::CogError;

// =============================================================================
// Node Identity
// =============================================================================

/// Stable identifier of a node in the tree.
///
/// Ids are allocated monotonically and never reused, so a stale id can be
/// recognized as destroyed rather than aliasing a newer node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeId(pub u64);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

// =============================================================================
// Lifecycle
// =============================================================================

/// Lifecycle of a node. Transitions only move forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub enum Lifecycle {
    #[default]
    Created,
    ResolvingRequirements,
    Initialized,
    Destroyed,
}

/// What a node is for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum NodeKind {
    /// A regular component instantiated from a template.
    #[default]
    Cog,
    /// A trait node spliced above its host.
    Alloy,
    /// A list host whose children are reconciled against a collection.
    Chain,
    /// A host whose single child follows a data-bound URL.
    Pinion,
}

// =============================================================================
// Namespaces
// =============================================================================

/// One of the per-node name-to-binding mappings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Namespace {
    Data,
    Service,
    Feed,
    Alias,
    Config,
    Method,
}

impl Namespace {
    pub const ALL: [Namespace; 6] = [
        Namespace::Data,
        Namespace::Service,
        Namespace::Feed,
        Namespace::Alias,
        Namespace::Config,
        Namespace::Method,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Namespace::Data => "data",
            Namespace::Service => "service",
            Namespace::Feed => "feed",
            Namespace::Alias => "alias",
            Namespace::Config => "config",
            Namespace::Method => "method",
        }
    }
}

impl Default for Namespace {
    fn default() -> Self {
        Namespace::Data
    }
}

impl fmt::Display for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Namespace {
    type Err = CogError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Namespace::ALL
            .into_iter()
            .find(|ns| ns.as_str() == s)
            .ok_or_else(|| CogError::InvalidOption {
                option: "is",
                value: s.to_string(),
            })
    }
}

// =============================================================================
// Traversal Modes
// =============================================================================

/// Ancestor traversal policy for scoped lookups.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Where {
    /// Only the node's own mapping.
    Local,
    /// Nearest definition walking upward from the node itself.
    #[default]
    First,
    /// Second definition walking upward (skips the nearest).
    Outer,
    /// Definition closest to the root.
    Last,
    /// `First`, starting at the parent as if arriving from a child.
    Parent,
}

impl Where {
    pub fn as_str(self) -> &'static str {
        match self {
            Where::Local => "local",
            Where::First => "first",
            Where::Outer => "outer",
            Where::Last => "last",
            Where::Parent => "parent",
        }
    }
}

impl fmt::Display for Where {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Where {
    type Err = CogError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "local" => Ok(Where::Local),
            "first" => Ok(Where::First),
            "outer" => Ok(Where::Outer),
            "last" => Ok(Where::Last),
            "parent" => Ok(Where::Parent),
            other => Err(CogError::InvalidOption {
                option: "where",
                value: other.to_string(),
            }),
        }
    }
}

// =============================================================================
// Value Sources
// =============================================================================

/// Typed description of where a declared value comes from.
///
/// Produced once by the template parser; the runtime resolves it against a
/// node's scope when the declaration is built.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(from = "Value")]
pub enum ValueSource {
    /// A plain JSON value.
    Literal(Value),
    /// Value of a config entry (`first` lookup).
    Config(String),
    /// A data slot (`first` lookup, or demanded locally).
    Data(String),
    /// Snapshot of a data slot's current value.
    Read(String),
    /// A named capability exposed to the node's behavior.
    Prop(String),
    /// Result of calling a behavior method.
    Run(String),
    /// A feed binding.
    Feed(String),
    /// A service binding.
    Service(String),
}

impl ValueSource {
    /// Tag used in blueprint documents, e.g. `{"data": "items"}`.
    pub fn tag(&self) -> &'static str {
        match self {
            ValueSource::Literal(_) => "literal",
            ValueSource::Config(_) => "config",
            ValueSource::Data(_) => "data",
            ValueSource::Read(_) => "read",
            ValueSource::Prop(_) => "prop",
            ValueSource::Run(_) => "run",
            ValueSource::Feed(_) => "feed",
            ValueSource::Service(_) => "service",
        }
    }

    pub fn is_data(&self) -> bool {
        matches!(self, ValueSource::Data(_))
    }

    /// Referenced name, or the literal as JSON text.
    pub fn label(&self) -> String {
        match self {
            ValueSource::Literal(value) => value.to_string(),
            ValueSource::Config(name)
            | ValueSource::Data(name)
            | ValueSource::Read(name)
            | ValueSource::Prop(name)
            | ValueSource::Run(name)
            | ValueSource::Feed(name)
            | ValueSource::Service(name) => name.clone(),
        }
    }

    pub fn null() -> Self {
        ValueSource::Literal(Value::Null)
    }
}

impl Default for ValueSource {
    fn default() -> Self {
        ValueSource::null()
    }
}

impl From<Value> for ValueSource {
    fn from(value: Value) -> Self {
        if let Value::Object(map) = &value {
            if map.len() == 1 {
                if let Some((tag, Value::String(name))) = map.iter().next() {
                    let name = name.clone();
                    match tag.as_str() {
                        "config" => return ValueSource::Config(name),
                        "data" => return ValueSource::Data(name),
                        "read" => return ValueSource::Read(name),
                        "prop" => return ValueSource::Prop(name),
                        "run" => return ValueSource::Run(name),
                        "feed" => return ValueSource::Feed(name),
                        "service" => return ValueSource::Service(name),
                        _ => {}
                    }
                }
                if let Some(inner) = map.get("literal") {
                    return ValueSource::Literal(inner.clone());
                }
            }
        }
        ValueSource::Literal(value)
    }
}

impl From<&str> for ValueSource {
    fn from(value: &str) -> Self {
        ValueSource::Literal(Value::String(value.to_string()))
    }
}

// =============================================================================
// List Membership
// =============================================================================

/// Key identifying a list item across reconciliation passes.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ItemKey {
    /// Positional key, used when the chain declares no key field.
    Index(usize),
    /// Value of the declared key field, rendered as a string.
    Field(String),
}

impl ItemKey {
    /// Key for `element` at `index`, reading `key_field` when given.
    pub fn for_element(element: &Value, index: usize, key_field: Option<&str>) -> Self {
        match key_field {
            None => ItemKey::Index(index),
            Some(field) => match element.get(field) {
                Some(Value::String(s)) => ItemKey::Field(s.clone()),
                Some(other) => ItemKey::Field(other.to_string()),
                None => ItemKey::Field(Value::Null.to_string()),
            },
        }
    }
}

impl fmt::Display for ItemKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ItemKey::Index(i) => write!(f, "{i}"),
            ItemKey::Field(s) => f.write_str(s),
        }
    }
}

/// List bookkeeping stored on a reconciled child.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListMeta {
    pub key: ItemKey,
    pub index: usize,
    pub odd: bool,
}

impl ListMeta {
    pub fn new(key: ItemKey, index: usize) -> Self {
        Self {
            key,
            index,
            odd: index & 1 == 1,
        }
    }
}

// =============================================================================
// Requirement Flags (bitflags)
// =============================================================================

bitflags::bitflags! {
    /// Flags carried by a requirement declaration.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct RequireFlags: u8 {
        const NONE = 0;
        /// Fetched but never executed or spliced.
        const PRELOAD = 1 << 0;
        /// Spliced as an alloy above the requiring node.
        const ALLOY = 1 << 1;
        /// The alloy's zone is a named route.
        const ROUTE = 1 << 2;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_value_source_from_tagged_object() {
        assert_eq!(
            ValueSource::from(json!({"data": "items"})),
            ValueSource::Data("items".into())
        );
        assert_eq!(
            ValueSource::from(json!({"config": "title"})),
            ValueSource::Config("title".into())
        );
        assert_eq!(
            ValueSource::from(json!({"literal": {"data": "x"}})),
            ValueSource::Literal(json!({"data": "x"}))
        );
    }

    #[test]
    fn test_value_source_plain_literals() {
        assert_eq!(ValueSource::from(json!(3)), ValueSource::Literal(json!(3)));
        // Objects that are not a single known tag stay literal
        let obj = json!({"data": "x", "other": 1});
        assert_eq!(ValueSource::from(obj.clone()), ValueSource::Literal(obj));
        assert_eq!(
            ValueSource::from(json!({"unknown": "x"})),
            ValueSource::Literal(json!({"unknown": "x"}))
        );
    }

    #[test]
    fn test_where_parsing() {
        assert_eq!("outer".parse::<Where>().unwrap(), Where::Outer);
        assert!(matches!(
            "sideways".parse::<Where>(),
            Err(CogError::InvalidOption { option: "where", .. })
        ));
    }

    #[test]
    fn test_item_key_for_element() {
        let el = json!({"id": 7, "name": "seven"});
        assert_eq!(ItemKey::for_element(&el, 3, None), ItemKey::Index(3));
        assert_eq!(ItemKey::for_element(&el, 3, Some("id")), ItemKey::Field("7".into()));
        assert_eq!(
            ItemKey::for_element(&el, 3, Some("name")),
            ItemKey::Field("seven".into())
        );
    }

    #[test]
    fn test_list_meta_parity() {
        assert!(!ListMeta::new(ItemKey::Index(0), 0).odd);
        assert!(ListMeta::new(ItemKey::Index(1), 1).odd);
    }
}
