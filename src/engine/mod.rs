//! Cog Engine - node arena, scoped namespaces and URL resolution.
//!
//! The engine manages the core data structures:
//! - Registry: id allocation, parent/child links, splicing, destruction
//! - Node: the per-component record (state, scope, requirements, behavior)
//! - Namespace: bindings, valves and the ancestor-walking resolver
//! - Path: URL resolution against inherited paths and aliases
//!
//! # Architecture
//!
//! Nodes are NOT linked objects. They live in one arena keyed by [`NodeId`]:
//!
//! ```text
//! #1 root  (parent=-,  children={#2})
//! #2 app   (parent=#1, children={#3, #4}, data={items})
//! #3 list  (parent=#2, children={...})
//! ```
//!
//! Parent links are plain ids, so walking ancestors and destroying subtrees
//! never fights the borrow checker and there are no ownership cycles.
//!
//! [`NodeId`]: crate::types::NodeId

mod namespace;
mod node;
pub mod path;
mod registry;

pub use namespace::*;
pub use node::*;
pub use registry::*;
