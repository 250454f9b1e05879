//! Template parsing.
//!
//! The runtime only sees [`ParsedTemplate`]s; how a raw body becomes one is
//! up to the [`TemplateParser`]. [`BlueprintParser`] reads JSON documents:
//!
//! ```json
//! {
//!   "blueprint": {
//!     "require": ["lib/util.js", {"url": "row.html", "path": "widgets"}],
//!     "alloy": [{"url": "theme.html", "name": "theme"}],
//!     "data": [{"name": "items", "value": []}],
//!     "chain": [{"url": "row.html", "source": {"data": "items"}, "key": "id"}]
//!   },
//!   "behavior": "list",
//!   "display": "<ul></ul>"
//! }
//! ```
//!
//! `behavior` names a factory in the runtime's [`BehaviorRegistry`]. The name
//! is only looked up when a node initializes, after its required scripts ran,
//! so a script may register the behavior its own template names.
//!
//! [`BehaviorRegistry`]: crate::state::BehaviorRegistry

use serde::Deserialize;
use tracing::trace;

use super::declarations::*;
use crate::error::{CogError, Result};
use crate::types::RequireFlags;

/// Parser output: declarations, optional behavior name and display content.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParsedTemplate {
    pub declarations: Declarations,
    pub behavior: Option<String>,
    pub content: Option<String>,
}

pub trait TemplateParser {
    fn parse(&self, raw: &str, url: &str) -> Result<ParsedTemplate>;
}

// =============================================================================
// Blueprint documents
// =============================================================================

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct Document {
    blueprint: Blueprint,
    behavior: Option<String>,
    display: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct Blueprint {
    require: Vec<UrlEntry>,
    preload: Vec<UrlEntry>,
    #[serde(alias = "hoist", alias = "trait", alias = "wire")]
    alloy: Vec<UrlEntry>,
    prop: Vec<PropDef>,
    valve: Vec<ValveDef>,
    alias: Vec<AliasDef>,
    data: Vec<DataDef>,
    command: Vec<String>,
    config: Vec<ConfigDef>,
    service: Vec<ServiceDef>,
    feed: Vec<FeedDef>,
    method: Vec<MethodDef>,
    sensor: Vec<SensorDef>,
    write: Vec<WriteDef>,
    cog: Vec<CogDef>,
    chain: Vec<ChainDef>,
}

/// A requirement given as a bare URL or as an object.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum UrlEntry {
    Url(String),
    Def {
        url: String,
        #[serde(default)]
        path: Option<String>,
        #[serde(default)]
        name: Option<String>,
        #[serde(default)]
        route: bool,
    },
}

impl UrlEntry {
    fn into_require(self, flags: RequireFlags) -> RequireDef {
        match self {
            UrlEntry::Url(url) => RequireDef {
                url,
                flags,
                ..Default::default()
            },
            UrlEntry::Def {
                url,
                path,
                name,
                route,
            } => {
                let flags = if route { flags | RequireFlags::ROUTE } else { flags };
                RequireDef {
                    url,
                    path,
                    name,
                    flags,
                }
            }
        }
    }
}

impl Blueprint {
    fn into_declarations(self, url: &str) -> Result<Declarations> {
        let invalid = |message: String| CogError::Parse {
            url: url.to_string(),
            message,
        };

        if let Some(m) = self.method.iter().find(|m| m.method_name().is_empty()) {
            return Err(invalid(format!("method declaration needs a name or func: {m:?}")));
        }
        if self.sensor.iter().any(|s| s.watch.is_empty()) {
            return Err(invalid("sensor declaration watches nothing".to_string()));
        }
        if self.chain.iter().any(|c| c.url.is_empty()) {
            return Err(invalid("chain declaration needs a url".to_string()));
        }

        let requires = self
            .require
            .into_iter()
            .map(|e| e.into_require(RequireFlags::NONE))
            .chain(self.alloy.into_iter().map(|e| e.into_require(RequireFlags::ALLOY)))
            .chain(self.preload.into_iter().map(|e| e.into_require(RequireFlags::PRELOAD)))
            .collect();

        Ok(Declarations {
            props: self.prop,
            valves: self.valve,
            aliases: self.alias,
            data: self.data,
            commands: self.command,
            configs: self.config,
            services: self.service,
            feeds: self.feed,
            methods: self.method,
            sensors: self.sensor,
            writes: self.write,
            cogs: self.cog,
            chains: self.chain,
            requires,
        })
    }
}

// =============================================================================
// BlueprintParser
// =============================================================================

#[derive(Debug, Clone, Copy, Default)]
pub struct BlueprintParser;

impl BlueprintParser {
    pub fn new() -> Self {
        Self
    }
}

impl TemplateParser for BlueprintParser {
    fn parse(&self, raw: &str, url: &str) -> Result<ParsedTemplate> {
        let document: Document = if raw.trim().is_empty() {
            Document::default()
        } else {
            serde_json::from_str(raw).map_err(|e| CogError::Parse {
                url: url.to_string(),
                message: e.to_string(),
            })?
        };

        let behavior = document.behavior.filter(|name| !name.is_empty());
        let declarations = document.blueprint.into_declarations(url)?;
        trace!(url, requires = declarations.requires.len(), "parsed template");
        Ok(ParsedTemplate {
            declarations,
            behavior,
            content: document.display,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Namespace, ValueSource, Where};

    fn parse(raw: &str) -> Result<ParsedTemplate> {
        BlueprintParser::default().parse(raw, "/t.html")
    }

    #[test]
    fn test_requirements_keep_group_order() {
        let parsed = parse(
            r#"{"blueprint": {
                "preload": ["p.js"],
                "alloy": [{"url": "a.html", "name": "theme"}],
                "require": ["r.js", {"url": "w.html", "path": "widgets"}]
            }}"#,
        )
        .unwrap();

        let requires = &parsed.declarations.requires;
        let urls: Vec<&str> = requires.iter().map(|r| r.url.as_str()).collect();
        assert_eq!(urls, vec!["r.js", "w.html", "a.html", "p.js"]);
        assert_eq!(requires[1].path.as_deref(), Some("widgets"));
        assert_eq!(requires[2].name.as_deref(), Some("theme"));
        assert!(requires[2].flags.contains(RequireFlags::ALLOY));
        assert!(requires[3].flags.contains(RequireFlags::PRELOAD));
    }

    #[test]
    fn test_declarations_are_typed() {
        let parsed = parse(
            r#"{"blueprint": {
                "data": [{"name": "count", "value": 3}, {"name": "copy", "value": {"read": "count"}}],
                "prop": [{"find": "items", "is": "data", "where": "outer"}],
                "valve": [{"allow": ["items"], "is": "data"}],
                "cog": [{"url": {"data": "page"}}],
                "chain": [{"url": "row.html", "source": {"data": "items"}, "key": "id"}]
            }, "display": "<p/>"}"#,
        )
        .unwrap();

        let d = &parsed.declarations;
        assert_eq!(d.data[0].value, ValueSource::Literal(serde_json::json!(3)));
        assert_eq!(d.data[1].value, ValueSource::Read("count".into()));
        assert_eq!(d.props[0].mode, Where::Outer);
        assert_eq!(d.props[0].namespace, Namespace::Data);
        assert_eq!(d.valves[0].allow, vec!["items".to_string()]);
        assert_eq!(d.cogs[0].url, ValueSource::Data("page".into()));
        assert_eq!(d.cogs[0].item, "cog");
        assert_eq!(d.chains[0].key.as_deref(), Some("id"));
        assert_eq!(d.chains[0].item, "item");
        assert_eq!(parsed.content.as_deref(), Some("<p/>"));
        assert!(parsed.behavior.is_none());
    }

    #[test]
    fn test_empty_body_is_empty_template() {
        let parsed = parse("  ").unwrap();
        assert_eq!(parsed.declarations, Declarations::default());
    }

    #[test]
    fn test_behavior_name_kept_unresolved() {
        // Not registered anywhere yet: a required script may install it later.
        let parsed = parse(r#"{"blueprint": {"require": ["widget.js"]}, "behavior": "widget"}"#).unwrap();
        assert_eq!(parsed.behavior.as_deref(), Some("widget"));

        assert!(parse(r#"{"behavior": ""}"#).unwrap().behavior.is_none());
    }

    #[test]
    fn test_malformed_documents() {
        assert!(matches!(parse("{not json"), Err(CogError::Parse { .. })));
        assert!(matches!(
            parse(r#"{"blueprint": {"method": [{}]}}"#),
            Err(CogError::Parse { .. })
        ));
        assert!(matches!(
            parse(r#"{"blueprint": {"sensor": [{"run": "go"}]}}"#),
            Err(CogError::Parse { .. })
        ));
    }
}
