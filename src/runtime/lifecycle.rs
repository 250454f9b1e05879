//! Initialization - turning declarations into bindings and children.
//!
//! Order matters: a node's own props are looked up before its own bindings
//! exist, behaviors see every first-pass binding in `init`, and children are
//! created only after sensors and writes.

use std::rc::Rc;

use serde_json::Value;
use spark_signals::signal;
use tracing::debug;

use super::Runtime;
use crate::engine::{Binding, FeedHandle, ListHook, Prop, ServiceHandle};
use crate::error::{CogError, Result};
use crate::loader::{AliasDef, ConfigDef, DataDef, FeedDef, MethodDef, PropDef, SensorDef, ServiceDef, WriteDef};
use crate::state::{watch, Behavior, DefaultBehavior, Event, SensorState};
use crate::types::{Lifecycle, Namespace, NodeId, ValueSource, Where};

/// A resolved [`ValueSource`].
#[derive(Clone)]
pub enum Resolved {
    Value(Value),
    Binding(Binding),
    Missing,
}

impl Resolved {
    /// Plain value; bindings yield their current value.
    pub fn into_value(self) -> Option<Value> {
        match self {
            Resolved::Value(v) => Some(v),
            Resolved::Binding(b) => b.value(),
            Resolved::Missing => None,
        }
    }
}

impl Runtime {
    // -------------------------------------------------------------------------
    // Initialize
    // -------------------------------------------------------------------------

    pub(crate) fn initialize(&mut self, id: NodeId) -> Result<()> {
        let node = self.tree.node(id)?;
        if node.state() >= Lifecycle::Initialized {
            return Ok(());
        }
        let parent_alive = node.parent.is_some_and(|p| self.tree.contains(p));
        if !parent_alive {
            debug!(%id, "parent gone, skipping initialization");
            return Ok(());
        }

        let is_alloy = node.is_alloy();
        let name = node
            .resolved_url
            .as_deref()
            .and_then(|url| self.cache.template(url))
            .and_then(|t| t.behavior.clone());

        // Looked up only now: required scripts have run and may have registered it.
        let behavior: Box<dyn Behavior> = match name {
            None => Box::new(DefaultBehavior),
            Some(name) => match self.behaviors.get(&name) {
                Some(factory) => factory(),
                None => {
                    return Err(CogError::InvalidOption {
                        option: "behavior",
                        value: name.to_string(),
                    })
                }
            },
        };
        self.tree.node_mut(id)?.behavior = Some(behavior);

        if !is_alloy {
            self.expose_alloys(id)?;
        }
        self.tree.node_mut(id)?.advance(Lifecycle::Initialized);

        if self.tree.node(id)?.source.is_some() {
            self.bind_source(id)?;
        }
        self.build_declarations(id)?;
        debug!(%id, url = ?self.tree.get(id).and_then(|n| n.resolved_url.as_deref()), "initialized");

        self.flush_list_hooks(id);
        Ok(())
    }

    /// Expose every consecutive alloy above `id` as a prop, root-most first.
    fn expose_alloys(&mut self, id: NodeId) -> Result<()> {
        let mut alloys = Vec::new();
        let mut cursor = self.tree.parent(id);
        while let Some(p) = cursor {
            match self.tree.get(p) {
                Some(n) if n.is_alloy() => {
                    alloys.push((p, n.name.clone()));
                    cursor = n.parent;
                }
                _ => break,
            }
        }
        alloys.reverse();

        for (alloy, name) in alloys {
            if let Some(name) = name {
                self.add_prop(id, &name, Prop::Alloy(alloy))?;
            }
        }
        Ok(())
    }

    fn build_declarations(&mut self, id: NodeId) -> Result<()> {
        let declarations = self.tree.node(id)?.declarations.clone().unwrap_or_default();

        for def in &declarations.props {
            self.create_prop(id, def)?;
        }
        {
            let node = self.tree.node_mut(id)?;
            for valve in &declarations.valves {
                node.scope.allow(valve.namespace, &valve.allow);
            }
        }
        for def in &declarations.aliases {
            self.create_alias(id, def)?;
        }
        for def in &declarations.data {
            self.create_data(id, def)?;
        }
        for name in &declarations.commands {
            self.tree.demand_data(id, name)?;
        }
        for def in &declarations.configs {
            self.create_config(id, def)?;
        }
        for def in &declarations.services {
            self.create_service(id, def)?;
        }
        for def in &declarations.feeds {
            self.create_feed(id, def)?;
        }
        for def in &declarations.methods {
            self.create_method(id, def)?;
        }

        self.with_behavior(id, |b, cx| b.init(cx));

        for def in &declarations.sensors {
            self.create_sensor(id, def)?;
        }
        for def in &declarations.writes {
            self.create_write(id, def)?;
        }
        for def in &declarations.cogs {
            self.create_cog(id, def)?;
        }
        for def in &declarations.chains {
            self.create_chain(id, def)?;
        }

        self.with_behavior(id, |b, cx| b.start(cx));
        self.tree.node_mut(id)?.declarations = None;
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Declarations
    // -------------------------------------------------------------------------

    pub(crate) fn add_prop(&mut self, id: NodeId, name: &str, prop: Prop) -> Result<()> {
        let node = self.tree.node_mut(id)?;
        if node.props.contains_key(name) {
            return Err(CogError::PropertyCollision {
                node: id,
                namespace: "prop",
                name: name.to_string(),
            });
        }
        node.props.insert(name.to_string(), prop);
        Ok(())
    }

    fn create_prop(&mut self, id: NodeId, def: &PropDef) -> Result<()> {
        let found = self
            .tree
            .find(id, &def.find, def.namespace, def.mode, def.optional)?;
        match found {
            Some(binding) => self.add_prop(id, def.prop_name(), Prop::Binding(binding)),
            None => Ok(()),
        }
    }

    fn create_alias(&mut self, id: NodeId, def: &AliasDef) -> Result<()> {
        let url = self
            .tree
            .resolve_url(id, &def.url, def.path.as_deref(), &self.config.root_path);
        self.tree.define(id, &def.name, Binding::Alias(url))
    }

    fn create_data(&mut self, id: NodeId, def: &DataDef) -> Result<()> {
        let inherited = if def.inherit {
            self.tree
                .find_data(id, &def.name, Where::First)
                .map(|slot| slot.get())
                .filter(|v| !v.is_null())
        } else {
            None
        };
        let value = match inherited {
            Some(value) => value,
            None => self
                .resolve_value(id, &def.value)?
                .into_value()
                .unwrap_or(Value::Null),
        };

        let slot = signal(value);
        self.tree.define(id, &def.name, Binding::Data(slot.clone()))?;
        if def.prop {
            self.add_prop(id, &def.name, Prop::Binding(Binding::Data(slot)))?;
        }
        Ok(())
    }

    fn create_config(&mut self, id: NodeId, def: &ConfigDef) -> Result<()> {
        if def.name.contains(':') {
            return Err(CogError::InvalidOption {
                option: "config",
                value: def.name.clone(),
            });
        }
        let inherited = if def.inherit {
            self.tree.find_config(id, &def.name, Where::First)
        } else {
            None
        };
        let value = match inherited {
            Some(value) => value,
            None => self
                .resolve_value(id, &def.value)?
                .into_value()
                .unwrap_or(Value::Null),
        };

        // Declarations replace config supplied at creation.
        self.tree
            .node_mut(id)?
            .scope
            .set(Namespace::Config, &def.name, Binding::Config(value.clone()));
        if def.prop {
            self.add_prop(id, &def.name, Prop::Value(value))?;
        }
        Ok(())
    }

    fn create_service(&mut self, id: NodeId, def: &ServiceDef) -> Result<()> {
        let url = def.url.as_deref().map(|url| {
            self.tree
                .resolve_url(id, url, def.path.as_deref(), &self.config.root_path)
        });
        let service = ServiceHandle {
            name: def.name.clone(),
            url,
            to: def.to.clone(),
            settings: def.settings.clone(),
        };
        self.tree.define(id, &def.name, Binding::Service(Rc::new(service)))
    }

    fn create_feed(&mut self, id: NodeId, def: &FeedDef) -> Result<()> {
        let service = self
            .tree
            .find_service(id, &def.service, Where::First)
            .ok_or_else(|| CogError::ResolutionFailure {
                node: id,
                namespace: Namespace::Service,
                name: def.service.clone(),
                mode: Where::First,
            })?;
        let feed = FeedHandle {
            name: def.feed_name().to_string(),
            service,
            to: def.to.clone(),
        };
        self.tree.define(id, def.feed_name(), Binding::Feed(Rc::new(feed)))
    }

    fn create_method(&mut self, id: NodeId, def: &MethodDef) -> Result<()> {
        let func = def.func_name();
        let method = self
            .tree
            .node(id)?
            .behavior
            .as_ref()
            .and_then(|b| b.method(func))
            .ok_or_else(|| CogError::ResolutionFailure {
                node: id,
                namespace: Namespace::Method,
                name: func.to_string(),
                mode: Where::Local,
            })?;
        self.tree.define(id, def.method_name(), Binding::Method(method))
    }

    fn create_sensor(&mut self, id: NodeId, def: &SensorDef) -> Result<()> {
        let mut slots = Vec::new();
        for name in &def.watch {
            if let Some(Binding::Data(slot)) = self.tree.find(id, name, Namespace::Data, def.mode, def.optional)? {
                slots.push((name.clone(), slot));
            }
        }
        if slots.is_empty() {
            return Ok(());
        }
        if let Some(demand) = &def.demand {
            let slot = self.tree.demand_data(id, demand)?;
            self.add_prop(id, demand, Prop::Binding(Binding::Data(slot)))?;
        }

        let watched: Vec<_> = slots.iter().map(|(_, slot)| slot.clone()).collect();
        let node = self.tree.node_mut(id)?;
        let sensor = node.sensors.len();
        node.sensors.push(SensorState::new(Rc::new(def.clone()), slots));

        for (i, slot) in watched.iter().enumerate() {
            let immediate = def.autorun && i == 0;
            let stop = watch(slot, &self.events, immediate, move |value| Event::Sensed {
                node: id,
                sensor,
                value,
            });
            self.tree.node_mut(id)?.register(stop);
        }
        Ok(())
    }

    pub(crate) fn sensed(&mut self, id: NodeId, sensor: usize, value: Value) -> Result<()> {
        let node = self.tree.node_mut(id)?;
        let Some(state) = node.sensors.get_mut(sensor) else {
            return Ok(());
        };
        let value = state.merged(value);
        if !state.accept(&value) {
            return Ok(());
        }
        let def = state.def.clone();

        if let Some(demand) = &def.demand {
            self.tree.demand_data(id, demand)?.set(value.clone());
        }
        if let Some(pipe) = &def.pipe {
            if let Some(Binding::Data(slot)) = self.tree.find(id, pipe, Namespace::Data, def.pipe_where, false)? {
                slot.set(value.clone());
            }
        }
        if let Some(handler) = &def.run {
            self.with_behavior(id, |b, cx| b.receive(handler, &value, cx));
        }
        Ok(())
    }

    fn create_write(&mut self, id: NodeId, def: &WriteDef) -> Result<()> {
        let target = self
            .tree
            .find(id, &def.name, def.namespace, def.mode, false)?;
        let value = self
            .resolve_value(id, &def.value)?
            .into_value()
            .unwrap_or(Value::Null);
        match target {
            Some(Binding::Data(slot)) => {
                slot.set(value);
                Ok(())
            }
            _ => Err(CogError::InvalidOption {
                option: "is",
                value: def.namespace.to_string(),
            }),
        }
    }

    // -------------------------------------------------------------------------
    // Values
    // -------------------------------------------------------------------------

    /// Resolve `source` as seen from `from`.
    pub fn resolve_value(&self, from: NodeId, source: &ValueSource) -> Result<Resolved> {
        let found = |binding: Option<Binding>| binding.map_or(Resolved::Missing, Resolved::Binding);
        let resolved = match source {
            ValueSource::Literal(value) => Resolved::Value(value.clone()),
            ValueSource::Config(name) => self
                .tree
                .find_config(from, name, Where::First)
                .map_or(Resolved::Missing, Resolved::Value),
            ValueSource::Data(name) => found(self.tree.find_data(from, name, Where::First).map(Binding::Data)),
            ValueSource::Read(name) => self
                .tree
                .find_data(from, name, Where::First)
                .map_or(Resolved::Missing, |slot| Resolved::Value(slot.get())),
            ValueSource::Prop(name) => match self.tree.node(from)?.props.get(name) {
                Some(Prop::Value(value)) => Resolved::Value(value.clone()),
                Some(Prop::Binding(binding)) => Resolved::Binding(binding.clone()),
                Some(Prop::Alloy(_)) | None => Resolved::Missing,
            },
            ValueSource::Run(name) => Resolved::Value(self.run_method(from, name, &Value::Null)?),
            ValueSource::Feed(name) => found(self.tree.find_feed(from, name, Where::First).map(Binding::Feed)),
            ValueSource::Service(name) => found(
                self.tree
                    .find_service(from, name, Where::First)
                    .map(Binding::Service),
            ),
        };
        Ok(resolved)
    }

    /// Call method `name`: the node's own behavior first, then the scope.
    pub fn run_method(&self, from: NodeId, name: &str, arg: &Value) -> Result<Value> {
        let own = self
            .tree
            .node(from)?
            .behavior
            .as_ref()
            .and_then(|b| b.method(name));
        let method = own
            .or_else(|| self.tree.find_method(from, name, Where::First))
            .ok_or_else(|| CogError::ResolutionFailure {
                node: from,
                namespace: Namespace::Method,
                name: name.to_string(),
                mode: Where::First,
            })?;
        Ok(method(arg))
    }

    // -------------------------------------------------------------------------
    // List hooks
    // -------------------------------------------------------------------------

    /// Fire `hook` now, or queue it until the node initializes.
    pub(crate) fn list_hook(&mut self, id: NodeId, hook: ListHook) {
        let Some(node) = self.tree.get_mut(id) else {
            return;
        };
        if !node.is_initialized() || node.behavior.is_none() {
            node.pending_hooks.push(hook);
            return;
        }
        self.with_behavior(id, |b, cx| match hook {
            ListHook::Enter => b.enter(cx),
            ListHook::Update => b.update(cx),
        });
    }

    fn flush_list_hooks(&mut self, id: NodeId) {
        let pending = match self.tree.get_mut(id) {
            Some(node) => std::mem::take(&mut node.pending_hooks),
            None => return,
        };
        for hook in pending {
            self.list_hook(id, hook);
        }
    }
}
