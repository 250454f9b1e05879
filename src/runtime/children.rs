//! Child cogs, pinions and source bindings.

use serde_json::Value;
use tracing::debug;

use super::{Resolved, Runtime};
use crate::engine::{Binding, ItemType, ListHook, Prop, SourceBinding};
use crate::error::{CogError, Result};
use crate::loader::CogDef;
use crate::state::{watch, Event};
use crate::types::{Lifecycle, Namespace, NodeId, NodeKind, ValueSource, Where};

impl Runtime {
    // -------------------------------------------------------------------------
    // Cogs
    // -------------------------------------------------------------------------

    /// Create a cog under `parent` and start loading its template.
    ///
    /// The cog initializes on a later pump, once its requirements are done.
    pub fn create_cog(&mut self, parent: NodeId, def: &CogDef) -> Result<NodeId> {
        self.tree.node(parent)?;
        let path = def
            .path
            .as_deref()
            .map(|p| self.tree.resolve_path(parent, Some(p), &self.config.root_path));
        let id = self.tree.allocate(Some(parent));

        if let Err(error) = self.setup_cog(id, def, path) {
            self.tree.destroy(id);
            return Err(error);
        }
        debug!(%id, %parent, "created cog");
        Ok(id)
    }

    fn setup_cog(&mut self, id: NodeId, def: &CogDef, path: Option<String>) -> Result<()> {
        {
            let node = self.tree.node_mut(id)?;
            node.name = def.name.clone();
            node.path = path;
            node.source = def.source.clone().map(|source| SourceBinding {
                source,
                item: def.item.clone(),
                item_type: def.item_type,
            });
        }
        for (name, value) in &def.config {
            self.tree.define(id, name, Binding::Config(value.clone()))?;
        }

        match &def.url {
            ValueSource::Data(name) => self.become_pinion(id, name),
            source => match self.resolve_value(id, source)?.into_value() {
                Some(Value::String(url)) if !url.is_empty() => self.download_url(id, &url),
                other => Err(CogError::InvalidOption {
                    option: "url",
                    value: other.unwrap_or(Value::Null).to_string(),
                }),
            },
        }
    }

    // -------------------------------------------------------------------------
    // Source binding
    // -------------------------------------------------------------------------

    /// Feed the cog's item slot from its parent-resolved source.
    pub(crate) fn bind_source(&mut self, id: NodeId) -> Result<()> {
        let node = self.tree.node(id)?;
        let Some(binding) = node.source.clone() else {
            return Ok(());
        };
        let parent = node.parent.ok_or(CogError::UnknownNode(id))?;
        let missing = || CogError::MissingSource {
            node: id,
            source_name: binding.source.label(),
        };

        let resolved = self.resolve_value(parent, &binding.source)?;
        if matches!(resolved, Resolved::Missing) {
            return Err(missing());
        }

        match (binding.source.is_data(), binding.item_type) {
            (true, ItemType::Data) => {
                let Resolved::Binding(Binding::Data(source)) = resolved else {
                    return Err(missing());
                };
                let item = self.tree.demand_data(id, &binding.item)?;
                item.set(source.get());
                let stop = watch(&source, &self.events, false, move |value| Event::SourceChanged {
                    node: id,
                    value,
                });
                self.tree.node_mut(id)?.register(stop);
                Ok(())
            }
            (true, ItemType::Config) => {
                let value = resolved.into_value().ok_or_else(missing)?;
                self.tree
                    .node_mut(id)?
                    .scope
                    .set(Namespace::Config, &binding.item, Binding::Config(value));
                Ok(())
            }
            (true, ItemType::Prop) => {
                let value = resolved.into_value().ok_or_else(missing)?;
                self.add_prop(id, &binding.item, Prop::Value(value))
            }
            (false, ItemType::Data) => {
                let value = resolved.into_value().unwrap_or(Value::Null);
                self.tree.demand_data(id, &binding.item)?.set(value);
                Ok(())
            }
            (false, item_type) => Err(CogError::InvalidOption {
                option: "item",
                value: format!("{item_type:?} item for {} source", binding.source.tag()),
            }),
        }
    }

    pub(crate) fn source_changed(&mut self, id: NodeId, value: Value) -> Result<()> {
        let Some(item) = self.tree.node(id)?.source.as_ref().map(|s| s.item.clone()) else {
            return Ok(());
        };
        if let Some(slot) = self.tree.find_data(id, &item, Where::Local) {
            slot.set(value);
        }
        self.list_hook(id, ListHook::Update);
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Pinions
    // -------------------------------------------------------------------------

    /// Make `id` host whatever cog the data slot `name` points at.
    fn become_pinion(&mut self, id: NodeId, name: &str) -> Result<()> {
        let slot = self
            .tree
            .find_data(id, name, Where::First)
            .ok_or_else(|| CogError::MissingSource {
                node: id,
                source_name: name.to_string(),
            })?;
        let stop = watch(&slot, &self.events, true, move |url| Event::UrlChanged { node: id, url });
        let node = self.tree.node_mut(id)?;
        node.kind = NodeKind::Pinion;
        node.advance(Lifecycle::Initialized);
        node.register(stop);
        Ok(())
    }

    pub(crate) fn pinion_changed(&mut self, id: NodeId, url: Value) -> Result<()> {
        let url = match url {
            Value::String(url) => url,
            Value::Null => String::new(),
            other => {
                return Err(CogError::InvalidOption {
                    option: "url",
                    value: other.to_string(),
                })
            }
        };
        let node = self.tree.node_mut(id)?;
        if node.url.as_deref() == Some(url.as_str()) {
            return Ok(());
        }
        node.url = Some(url.clone());

        for child in self.tree.children(id) {
            self.tree.destroy(child);
        }
        if url.is_empty() {
            debug!(%id, "pinion cleared");
            return Ok(());
        }
        debug!(%id, url, "pinion switching");
        self.create_cog(id, &CogDef::new(url))?;
        Ok(())
    }
}
