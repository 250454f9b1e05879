//! Declaration records - the typed output of template parsing.
//!
//! Each record describes one blueprint entry. Value-carrying fields use
//! [`ValueSource`], so the runtime never interprets attribute strings.

use std::collections::BTreeMap;

use serde::Deserialize;
use serde_json::Value;

use crate::engine::ItemType;
use crate::types::{Namespace, RequireFlags, ValueSource, Where};

/// Everything a template declares, grouped by kind in build order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Declarations {
    pub props: Vec<PropDef>,
    pub valves: Vec<ValveDef>,
    pub aliases: Vec<AliasDef>,
    pub data: Vec<DataDef>,
    /// Names of data slots demanded locally (command targets).
    pub commands: Vec<String>,
    pub configs: Vec<ConfigDef>,
    pub services: Vec<ServiceDef>,
    pub feeds: Vec<FeedDef>,
    pub methods: Vec<MethodDef>,
    pub sensors: Vec<SensorDef>,
    pub writes: Vec<WriteDef>,
    pub cogs: Vec<CogDef>,
    pub chains: Vec<ChainDef>,
    /// Requirements in declaration order: requires, then alloys, then preloads.
    pub requires: Vec<RequireDef>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct PropDef {
    pub find: String,
    /// Prop name; defaults to `find`.
    pub name: Option<String>,
    #[serde(rename = "is")]
    pub namespace: Namespace,
    #[serde(rename = "where")]
    pub mode: Where,
    pub optional: bool,
}

impl PropDef {
    pub fn prop_name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.find)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct ValveDef {
    pub allow: Vec<String>,
    #[serde(rename = "is")]
    pub namespace: Namespace,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct AliasDef {
    pub name: String,
    pub url: String,
    pub path: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct DataDef {
    pub name: String,
    pub value: ValueSource,
    /// Start from the nearest ancestor's value when it has one.
    pub inherit: bool,
    /// Also expose the slot as a prop.
    pub prop: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct ConfigDef {
    pub name: String,
    pub value: ValueSource,
    pub inherit: bool,
    pub prop: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct ServiceDef {
    pub name: String,
    pub url: Option<String>,
    pub path: Option<String>,
    pub to: Option<String>,
    pub settings: Value,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct FeedDef {
    /// Feed name; defaults to the service name.
    pub name: Option<String>,
    pub service: String,
    pub to: Option<String>,
}

impl FeedDef {
    pub fn feed_name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.service)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct MethodDef {
    pub name: Option<String>,
    /// Behavior method backing the binding; defaults to `name`.
    pub func: Option<String>,
}

impl MethodDef {
    pub fn method_name(&self) -> &str {
        self.name.as_deref().or(self.func.as_deref()).unwrap_or_default()
    }

    pub fn func_name(&self) -> &str {
        self.func.as_deref().or(self.name.as_deref()).unwrap_or_default()
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct SensorDef {
    /// Data slots to watch; several are merged into one object.
    pub watch: Vec<String>,
    #[serde(rename = "where")]
    pub mode: Where,
    pub optional: bool,
    /// Behavior handler receiving the value.
    pub run: Option<String>,
    /// Data slot (found with `pipe_where`) receiving the value.
    pub pipe: Option<String>,
    pub pipe_where: Where,
    /// Local data slot created for the sensor and exposed as a prop.
    pub demand: Option<String>,
    pub once: bool,
    /// Skip values equal to the previous one.
    pub change: bool,
    /// Fire immediately with the current value.
    pub autorun: bool,
}

impl Default for SensorDef {
    fn default() -> Self {
        Self {
            watch: Vec::new(),
            mode: Where::First,
            optional: false,
            run: None,
            pipe: None,
            pipe_where: Where::First,
            demand: None,
            once: false,
            change: false,
            autorun: false,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct WriteDef {
    pub name: String,
    #[serde(rename = "is")]
    pub namespace: Namespace,
    #[serde(rename = "where")]
    pub mode: Where,
    pub value: ValueSource,
}

/// A child cog declaration.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct CogDef {
    /// Template URL. A `{"data": name}` source makes the cog follow that slot.
    pub url: ValueSource,
    pub path: Option<String>,
    pub name: Option<String>,
    /// Parent-resolved value fed into the item slot.
    pub source: Option<ValueSource>,
    pub item: String,
    pub item_type: ItemType,
    /// Config entries defined on the new node before its template loads.
    pub config: BTreeMap<String, Value>,
}

impl Default for CogDef {
    fn default() -> Self {
        Self {
            url: ValueSource::null(),
            path: None,
            name: None,
            source: None,
            item: "cog".to_string(),
            item_type: ItemType::Data,
            config: BTreeMap::new(),
        }
    }
}

impl CogDef {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: ValueSource::Literal(Value::String(url.into())),
            ..Default::default()
        }
    }

    /// Cog whose template URL follows the data slot `name`.
    pub fn following(name: impl Into<String>) -> Self {
        Self {
            url: ValueSource::Data(name.into()),
            ..Default::default()
        }
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_source(mut self, source: ValueSource, item: impl Into<String>, item_type: ItemType) -> Self {
        self.source = Some(source);
        self.item = item.into();
        self.item_type = item_type;
        self
    }

    pub fn with_config(mut self, name: impl Into<String>, value: Value) -> Self {
        self.config.insert(name.into(), value);
        self
    }
}

/// A list binding: one child per element of `source`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct ChainDef {
    /// Template instantiated for each element.
    pub url: String,
    pub path: Option<String>,
    pub name: Option<String>,
    pub source: ValueSource,
    /// Data slot name each element is bound to on its child.
    pub item: String,
    /// Element field used as the stable key; positional when absent.
    pub key: Option<String>,
}

impl Default for ChainDef {
    fn default() -> Self {
        Self {
            url: String::new(),
            path: None,
            name: None,
            source: ValueSource::null(),
            item: "item".to_string(),
            key: None,
        }
    }
}

impl ChainDef {
    pub fn new(url: impl Into<String>, source: ValueSource) -> Self {
        Self {
            url: url.into(),
            source,
            ..Default::default()
        }
    }

    pub fn keyed(mut self, key: impl Into<String>) -> Self {
        self.key = Some(key.into());
        self
    }

    pub fn item(mut self, item: impl Into<String>) -> Self {
        self.item = item.into();
        self
    }
}

/// An external resource needed before the declaring node may initialize.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RequireDef {
    pub url: String,
    pub path: Option<String>,
    pub name: Option<String>,
    pub flags: RequireFlags,
}
