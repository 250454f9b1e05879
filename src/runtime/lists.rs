//! Chains - one child per element of a watched collection.
//!
//! A chain node waits for its item template, then binds to its source. Each
//! time the source changes the children are reconciled by key: survivors
//! keep their identity and receive the new element in their item slot.

use std::collections::HashMap;

use serde_json::Value;
use spark_signals::signal;
use tracing::debug;

use super::{Resolved, Runtime};
use crate::engine::{Binding, ChainSpec, ItemType, ListHook, SourceBinding};
use crate::error::{CogError, Result};
use crate::loader::ChainDef;
use crate::primitives::reconcile;
use crate::state::{watch, Event, Waiter};
use crate::types::{ItemKey, Lifecycle, ListMeta, Namespace, NodeId, NodeKind};

impl Runtime {
    /// Create a chain under `parent`. Its children appear once the item
    /// template has downloaded and the source has been read.
    pub fn create_chain(&mut self, parent: NodeId, def: &ChainDef) -> Result<NodeId> {
        self.tree.node(parent)?;
        let path = def
            .path
            .as_deref()
            .map(|p| self.tree.resolve_path(parent, Some(p), &self.config.root_path));
        let id = self.tree.allocate(Some(parent));

        if let Err(error) = self.setup_chain(id, def, path) {
            self.tree.destroy(id);
            return Err(error);
        }
        debug!(%id, %parent, url = %def.url, "created chain");
        Ok(id)
    }

    fn setup_chain(&mut self, id: NodeId, def: &ChainDef, path: Option<String>) -> Result<()> {
        self.tree.node_mut(id)?.path = path;
        let item_url = self.tree.resolve_url(id, &def.url, None, &self.config.root_path);

        let node = self.tree.node_mut(id)?;
        node.kind = NodeKind::Chain;
        node.name = def.name.clone();
        node.chain = Some(ChainSpec {
            item_url: item_url.clone(),
            key_field: def.key.clone(),
        });
        node.source = Some(SourceBinding {
            source: def.source.clone(),
            item: def.item.clone(),
            item_type: ItemType::Data,
        });
        node.advance(Lifecycle::ResolvingRequirements);

        self.request_download(&item_url);
        self.when_done(&item_url, Waiter::Chain(id));
        Ok(())
    }

    /// The item template is cached: start following the source.
    pub(crate) fn seek_list_source(&mut self, chain: NodeId) -> Result<()> {
        let node = self.tree.node(chain)?;
        if node.is_initialized() {
            return Ok(());
        }
        let parent = node.parent.ok_or(CogError::UnknownNode(chain))?;
        let source = node
            .source
            .as_ref()
            .map(|s| s.source.clone())
            .unwrap_or_default();
        self.tree.node_mut(chain)?.advance(Lifecycle::Initialized);

        match self.resolve_value(parent, &source)? {
            Resolved::Binding(Binding::Data(slot)) => {
                let stop = watch(&slot, &self.events, true, move |items| Event::ListChanged { chain, items });
                self.tree.node_mut(chain)?.register(stop);
                Ok(())
            }
            resolved => match resolved.into_value() {
                Some(items) if !source.is_data() => self.refresh_list(chain, items),
                _ => Err(CogError::MissingSource {
                    node: chain,
                    source_name: source.label(),
                }),
            },
        }
    }

    /// Reconcile the chain's children against `items`.
    pub(crate) fn refresh_list(&mut self, chain: NodeId, items: Value) -> Result<()> {
        let items = match items {
            Value::Array(items) => items,
            Value::Null => Vec::new(),
            other => {
                return Err(CogError::InvalidOption {
                    option: "source",
                    value: other.to_string(),
                })
            }
        };

        let node = self.tree.node(chain)?;
        let Some(spec) = node.chain.clone() else {
            return Ok(());
        };
        let item_name = node
            .source
            .as_ref()
            .map(|s| s.item.clone())
            .unwrap_or_default();
        // A row may sit under alloys spliced for its template; the chain's
        // child is then the topmost alloy.
        let mut tops: HashMap<NodeId, NodeId> = HashMap::with_capacity(node.children.len());
        let mut existing: Vec<(ItemKey, NodeId)> = Vec::with_capacity(node.children.len());
        for child in &node.children {
            let row = self.row_of(*child);
            if let Some(meta) = self.tree.get(row).and_then(|r| r.list.as_ref()) {
                existing.push((meta.key.clone(), row));
                tops.insert(row, *child);
            }
        }

        let plan = reconcile(existing, &items, spec.key_field.as_deref())
            .map_err(|key| CogError::DuplicateListKey { node: chain, key })?;
        debug!(
            %chain,
            entering = plan.entering.len(),
            updating = plan.updating.len(),
            exiting = plan.exiting.len(),
            "reconciling list"
        );

        let mut by_key: HashMap<ItemKey, NodeId> = HashMap::with_capacity(plan.order.len());
        for updating in &plan.updating {
            let value = items.get(updating.meta.index).cloned().unwrap_or(Value::Null);
            let node = self.tree.node_mut(updating.node)?;
            node.list = Some(updating.meta.clone());
            if let Some(slot) = node
                .scope
                .get(Namespace::Data, &item_name)
                .and_then(Binding::as_data)
            {
                slot.set(value);
            }
            by_key.insert(updating.meta.key.clone(), updating.node);
        }

        let mut entered = Vec::with_capacity(plan.entering.len());
        for entering in &plan.entering {
            let value = items.get(entering.meta.index).cloned().unwrap_or(Value::Null);
            let child = self.create_link(chain, &spec.item_url, &item_name, value, entering.meta.clone())?;
            by_key.insert(entering.meta.key.clone(), child);
            entered.push(child);
        }

        for child in entered {
            self.list_hook(child, ListHook::Enter);
        }
        for key in &plan.order {
            if let Some(child) = by_key.get(key) {
                self.list_hook(*child, ListHook::Update);
            }
        }
        for row in plan.exiting {
            self.with_behavior(row, |b, cx| b.exit(cx));
            self.tree.destroy(tops.get(&row).copied().unwrap_or(row));
        }
        Ok(())
    }

    /// The list item hosted under chain child `child`.
    fn row_of(&self, child: NodeId) -> NodeId {
        match self.tree.get(child) {
            Some(node) if node.is_alloy() => node.origin.unwrap_or(child),
            _ => child,
        }
    }

    /// Create one list item bound to `value`.
    fn create_link(&mut self, chain: NodeId, url: &str, item: &str, value: Value, meta: ListMeta) -> Result<NodeId> {
        let id = self.tree.allocate(Some(chain));
        if let Err(error) = self.setup_link(id, url, item, value, meta) {
            self.tree.destroy(id);
            return Err(error);
        }
        Ok(id)
    }

    fn setup_link(&mut self, id: NodeId, url: &str, item: &str, value: Value, meta: ListMeta) -> Result<()> {
        self.tree.node_mut(id)?.list = Some(meta);
        self.tree.define(id, item, Binding::Data(signal(value)))?;
        self.download_url(id, url)
    }
}
