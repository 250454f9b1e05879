//! Runtime - owns the tree and drives it from events.
//!
//! The runtime is the single owner of every piece of mutable state: the node
//! arena, the resource cache, in-flight downloads and the event queue. All
//! mutation happens inside [`Runtime::pump`]:
//!
//! ```text
//! fetch completes ──► cache ──► waiters ──┐
//!                                          ├──► EventQueue ──► pump() ──► Tree
//! signal.set() ──► effect ─────────────────┘
//! ```
//!
//! Effects never reach into the tree; they only enqueue. This keeps every
//! handler free to create, splice and destroy nodes.
//!
//! # Example
//!
//! ```ignore
//! let behaviors = BehaviorRegistry::new();
//! behaviors.register("app", || Box::new(App::default()));
//! let fetcher = StaticFetcher::new().with("/app.html", r#"{"behavior": "app"}"#);
//! let mut runtime = Runtime::new(fetcher, BlueprintParser::new()).with_behaviors(behaviors);
//!
//! let app = runtime.mount("app.html")?;
//! futures::executor::block_on(runtime.run())?;
//! assert_eq!(runtime.state(app), Lifecycle::Initialized);
//! ```

mod children;
mod lifecycle;
mod lists;
mod loading;

use std::collections::HashMap;

use serde_json::Value;
use spark_signals::Signal;
use tracing::{debug, trace, warn};

use crate::config::RuntimeConfig;
use crate::engine::path::with_trailing_slash;
use crate::engine::{Binding, Node, Tree};
use crate::error::Result;
use crate::loader::{CogDef, DownloadStatus, Fetcher, InFlight, ResourceCache, ScriptHost, ScriptRegistry, TemplateParser};
use crate::state::{Behavior, BehaviorRegistry, Event, EventQueue, NodeContext, Waiter};
use crate::types::{Lifecycle, Namespace, NodeId, Where};

pub use lifecycle::Resolved;

pub struct Runtime {
    config: RuntimeConfig,
    tree: Tree,
    cache: ResourceCache,
    fetcher: Box<dyn Fetcher>,
    parser: Box<dyn TemplateParser>,
    scripts: Box<dyn ScriptHost>,
    behaviors: BehaviorRegistry,
    in_flight: InFlight,
    waiters: HashMap<String, Vec<Waiter>>,
    events: EventQueue,
    root: NodeId,
}

impl Runtime {
    pub fn new(fetcher: impl Fetcher + 'static, parser: impl TemplateParser + 'static) -> Self {
        let config = RuntimeConfig::default();
        let mut tree = Tree::new();
        let root = tree.allocate(None);
        if let Some(node) = tree.get_mut(root) {
            node.path = Some(with_trailing_slash(&config.root_path));
            node.advance(Lifecycle::Initialized);
        }

        Self {
            config,
            tree,
            cache: ResourceCache::new(),
            fetcher: Box::new(fetcher),
            parser: Box::new(parser),
            scripts: Box::new(ScriptRegistry::new()),
            behaviors: BehaviorRegistry::new(),
            in_flight: InFlight::default(),
            waiters: HashMap::new(),
            events: EventQueue::new(),
            root,
        }
    }

    pub fn with_config(mut self, config: RuntimeConfig) -> Self {
        if let Some(node) = self.tree.get_mut(self.root) {
            node.path = Some(with_trailing_slash(&config.root_path));
        }
        self.config = config;
        self
    }

    pub fn with_scripts(mut self, scripts: impl ScriptHost + 'static) -> Self {
        self.scripts = Box::new(scripts);
        self
    }

    /// Registry template behavior names are looked up in. Shared: scripts may
    /// keep registering into a clone of it.
    pub fn with_behaviors(mut self, behaviors: BehaviorRegistry) -> Self {
        self.behaviors = behaviors;
        self
    }

    // -------------------------------------------------------------------------
    // Accessors
    // -------------------------------------------------------------------------

    /// The implicit root every mounted cog hangs under.
    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn tree(&self) -> &Tree {
        &self.tree
    }

    pub fn cache(&self) -> &ResourceCache {
        &self.cache
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    pub fn behaviors(&self) -> &BehaviorRegistry {
        &self.behaviors
    }

    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.tree.get(id)
    }

    pub fn state(&self, id: NodeId) -> Lifecycle {
        self.tree.state(id)
    }

    pub fn children(&self, id: NodeId) -> Vec<NodeId> {
        self.tree.children(id)
    }

    /// Downloads still in flight.
    pub fn pending_downloads(&self) -> usize {
        self.in_flight.len()
    }

    // -------------------------------------------------------------------------
    // Tree operations
    // -------------------------------------------------------------------------

    /// Create a cog for `url` under the root and pump until quiescent.
    pub fn mount(&mut self, url: &str) -> Result<NodeId> {
        let id = self.create_cog(self.root, &CogDef::new(url))?;
        self.pump()?;
        Ok(id)
    }

    /// Destroy `id` and its subtree. Returns the destroyed ids, children first.
    pub fn destroy(&mut self, id: NodeId) -> Vec<NodeId> {
        let destroyed = self.tree.destroy(id);
        if !destroyed.is_empty() {
            debug!(%id, count = destroyed.len(), "destroyed subtree");
        }
        destroyed
    }

    pub fn find(&self, from: NodeId, name: &str, ns: Namespace, mode: Where, optional: bool) -> Result<Option<Binding>> {
        self.tree.find(from, name, ns, mode, optional)
    }

    /// Nearest data slot `name` seen from `from`.
    pub fn data(&self, from: NodeId, name: &str) -> Option<Signal<Value>> {
        self.tree.find_data(from, name, Where::First)
    }

    pub fn read(&self, from: NodeId, name: &str) -> Option<Value> {
        self.data(from, name).map(|slot| slot.get())
    }

    /// Set the nearest data slot `name`. Reactions run on the next pump.
    pub fn write(&self, from: NodeId, name: &str, value: Value) -> Result<()> {
        NodeContext::new(from, &self.tree).write(name, value)
    }

    /// Start a failed download again. False when `url` has not failed.
    pub fn retry(&mut self, url: &str) -> bool {
        if !matches!(self.cache.status(url), DownloadStatus::Failed { .. }) {
            return false;
        }
        debug!(url, "retrying download");
        self.request_download(url);
        true
    }

    // -------------------------------------------------------------------------
    // Event pump
    // -------------------------------------------------------------------------

    /// Handle queued events and finished downloads until nothing is ready.
    ///
    /// Never waits. Returns how many events and completions were handled.
    pub fn pump(&mut self) -> Result<usize> {
        let mut handled = 0;
        loop {
            if handled >= self.config.max_events_per_pump {
                warn!(handled, "event pump limit reached");
                break;
            }
            if let Some(event) = self.events.pop() {
                self.handle(event)?;
            } else if let Some(completion) = self.in_flight.poll_ready() {
                self.complete_fetch(completion)?;
            } else {
                break;
            }
            handled += 1;
        }
        Ok(handled)
    }

    /// Pump, waiting for downloads, until no download is in flight.
    pub async fn run(&mut self) -> Result<()> {
        loop {
            self.pump()?;
            match self.in_flight.next().await {
                Some(completion) => self.complete_fetch(completion)?,
                None => return Ok(()),
            }
        }
    }

    fn handle(&mut self, event: Event) -> Result<()> {
        if !self.tree.contains(event.node()) {
            trace!(?event, "dropping event for destroyed node");
            return Ok(());
        }
        match event {
            Event::Fetched { url, waiter } => match waiter {
                Waiter::Become(id) => self.become_url(id),
                Waiter::Requirement(id) => self.requirement_ready(id, &url),
                Waiter::Chain(id) => self.seek_list_source(id),
            },
            Event::ListChanged { chain, items } => self.refresh_list(chain, items),
            Event::SourceChanged { node, value } => self.source_changed(node, value),
            Event::UrlChanged { node, url } => self.pinion_changed(node, url),
            Event::Sensed { node, sensor, value } => self.sensed(node, sensor, value),
        }
    }

    // -------------------------------------------------------------------------
    // Behavior calls
    // -------------------------------------------------------------------------

    /// Call into the behavior of `id` with a context over the tree.
    ///
    /// The behavior is taken out of the node for the call. Returns None when
    /// the node has no behavior.
    pub(crate) fn with_behavior<R>(
        &mut self,
        id: NodeId,
        call: impl FnOnce(&mut dyn Behavior, &mut NodeContext<'_>) -> R,
    ) -> Option<R> {
        let mut behavior = self.tree.get_mut(id)?.behavior.take()?;
        let result = {
            let mut cx = NodeContext::new(id, &self.tree);
            call(behavior.as_mut(), &mut cx)
        };
        if let Some(node) = self.tree.get_mut(id) {
            node.behavior = Some(behavior);
        }
        Some(result)
    }
}
