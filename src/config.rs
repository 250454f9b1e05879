//! Runtime configuration.
//!
//! Construct with struct literal syntax and `..Default::default()`, or load
//! from a JSON document with [`RuntimeConfig::from_json`]. Missing fields take
//! their defaults.

use serde::Deserialize;

use crate::error::{CogError, Result};

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Suffix marking a requirement as a nested template.
    pub template_suffix: String,
    /// Suffix marking a requirement as behavior script code.
    pub script_suffix: String,
    /// Appended to fetch URLs as `?buildNum=<n>` to defeat stale caches.
    pub build_num: Option<String>,
    /// Base path used when no ancestor declares one.
    pub root_path: String,
    /// Safety valve for the event pump: maximum events handled per `pump()`.
    pub max_events_per_pump: usize,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            template_suffix: ".html".to_string(),
            script_suffix: ".js".to_string(),
            build_num: None,
            root_path: "/".to_string(),
            max_events_per_pump: 100_000,
        }
    }
}

impl RuntimeConfig {
    pub fn from_json(text: &str) -> Result<Self> {
        serde_json::from_str(text).map_err(|e| CogError::Parse {
            url: "<config>".to_string(),
            message: e.to_string(),
        })
    }

    /// True when `url` names a nested template.
    pub fn is_template(&self, url: &str) -> bool {
        ends_with_suffix(url, &self.template_suffix)
    }

    /// True when `url` names behavior script code.
    pub fn is_script(&self, url: &str) -> bool {
        ends_with_suffix(url, &self.script_suffix)
    }

    /// URL handed to the fetch collaborator for a cache key.
    pub fn fetch_url(&self, url: &str) -> String {
        match &self.build_num {
            Some(n) => format!("{url}?buildNum={n}"),
            None => url.to_string(),
        }
    }
}

// The whole string must be longer than the suffix: ".html" alone is not a template.
fn ends_with_suffix(url: &str, suffix: &str) -> bool {
    url.len() > suffix.len() && url.ends_with(suffix)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = RuntimeConfig::default();
        assert!(config.is_template("/app/main.html"));
        assert!(config.is_script("/lib/util.js"));
        assert!(!config.is_template(".html"));
        assert_eq!(config.fetch_url("/a.html"), "/a.html");
    }

    #[test]
    fn test_from_json_partial() {
        let config = RuntimeConfig::from_json(r#"{"build_num": "42"}"#).unwrap();
        assert_eq!(config.fetch_url("/a.html"), "/a.html?buildNum=42");
        assert_eq!(config.template_suffix, ".html");
    }

    #[test]
    fn test_from_json_invalid() {
        assert!(matches!(
            RuntimeConfig::from_json("{"),
            Err(CogError::Parse { .. })
        ));
    }
}
