//! # spark-cogs
//!
//! Reactive component tree runtime for Rust.
//!
//! Built on [spark-signals](https://github.com/RLabs-Inc/spark-signals) for fine-grained reactivity.
//!
//! ## Architecture
//!
//! A component ("cog") is a node instantiated from a declarative template.
//! Templates declare data, config, services, methods, child cogs and lists,
//! and may require scripts and other templates before they can initialize.
//! Nodes live in one arena keyed by [`NodeId`]; every lookup walks the
//! ancestor chain under a scoping policy that valves can restrict.
//!
//! ```text
//! mount(url) → fetch → parse → requirements (fixpoint) → scripts + alloys
//!            → initialize (props, data, … init, sensors, cogs, chains, start)
//! ```
//!
//! Data slots are `Signal<serde_json::Value>`. Effects watching them only
//! enqueue events; [`Runtime::pump`] applies them to the tree.
//!
//! ## Modules
//!
//! - [`types`] - Core types (NodeId, Lifecycle, Namespace, Where, ValueSource)
//! - [`engine`] - Node arena, scoped namespaces, URL resolution
//! - [`loader`] - Declarations, parsing, fetching, cache, requirements, scripts
//! - [`state`] - Behaviors and the event bus
//! - [`primitives`] - Keyed list reconciliation
//! - [`runtime`] - The runtime driving it all

pub mod config;
pub mod engine;
pub mod error;
pub mod loader;
pub mod primitives;
pub mod runtime;
pub mod state;
pub mod types;

// Re-export commonly used items
pub use types::*;

pub use config::RuntimeConfig;
pub use error::{CogError, Result};

pub use engine::{Binding, FeedHandle, ItemType, Method, Node, Prop, Scope, ServiceHandle, Tree};

pub use loader::{
    BlueprintParser, ChainDef, CogDef, Declarations, DownloadStatus, FetchError, FetchFuture,
    Fetcher, ParsedTemplate, ResourceCache, ScriptHost, ScriptRegistry, StaticFetcher,
    TemplateParser,
};

pub use primitives::{reconcile, Reconciliation};

pub use runtime::{Resolved, Runtime};

pub use state::{Behavior, BehaviorFactory, BehaviorRegistry, DefaultBehavior, NodeContext};
