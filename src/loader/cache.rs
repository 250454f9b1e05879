//! Resource Cache - download status, bodies and parsed templates per URL.
//!
//! The cache is keyed by absolute URL. A URL is fetched at most once unless
//! its download failed and was explicitly retried.

use std::collections::{HashMap, HashSet};
use std::rc::Rc;

use tracing::trace;

use super::declarations::Declarations;
use super::parser::ParsedTemplate;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DownloadStatus {
    #[default]
    NotStarted,
    Active { errors: u32 },
    Done,
    Failed { errors: u32 },
}

impl DownloadStatus {
    pub fn errors(&self) -> u32 {
        match self {
            DownloadStatus::Active { errors } | DownloadStatus::Failed { errors } => *errors,
            _ => 0,
        }
    }
}

/// A parsed template as shared by every node instantiating it.
#[derive(Clone)]
pub struct CachedTemplate {
    pub declarations: Rc<Declarations>,
    /// Registered behavior name, resolved when a node initializes.
    pub behavior: Option<Rc<str>>,
    pub content: Option<Rc<str>>,
}

impl From<ParsedTemplate> for CachedTemplate {
    fn from(parsed: ParsedTemplate) -> Self {
        Self {
            declarations: Rc::new(parsed.declarations),
            behavior: parsed.behavior.map(Rc::from),
            content: parsed.content.map(Rc::from),
        }
    }
}

#[derive(Default)]
pub struct ResourceCache {
    status: HashMap<String, DownloadStatus>,
    bodies: HashMap<String, Rc<str>>,
    templates: HashMap<String, CachedTemplate>,
    executed: HashSet<String>,
    fetches: HashMap<String, u32>,
}

impl ResourceCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn status(&self, url: &str) -> DownloadStatus {
        self.status.get(url).copied().unwrap_or_default()
    }

    /// Claim a download for `url`. False when it is active or already done.
    pub fn begin(&mut self, url: &str) -> bool {
        let errors = match self.status(url) {
            DownloadStatus::Active { .. } | DownloadStatus::Done => return false,
            status => status.errors(),
        };
        self.status.insert(url.to_string(), DownloadStatus::Active { errors });
        *self.fetches.entry(url.to_string()).or_default() += 1;
        trace!(url, "download started");
        true
    }

    pub fn complete(&mut self, url: &str, body: String) -> Rc<str> {
        let body: Rc<str> = Rc::from(body);
        self.bodies.insert(url.to_string(), body.clone());
        self.status.insert(url.to_string(), DownloadStatus::Done);
        body
    }

    /// Record a failed attempt. Returns the error count so far.
    pub fn fail(&mut self, url: &str) -> u32 {
        let errors = self.status(url).errors() + 1;
        self.status.insert(url.to_string(), DownloadStatus::Failed { errors });
        errors
    }

    pub fn store_template(&mut self, url: &str, parsed: ParsedTemplate) {
        self.templates.insert(url.to_string(), parsed.into());
    }

    pub fn is_done(&self, url: &str) -> bool {
        self.status(url) == DownloadStatus::Done
    }

    pub fn body(&self, url: &str) -> Option<Rc<str>> {
        self.bodies.get(url).cloned()
    }

    pub fn template(&self, url: &str) -> Option<&CachedTemplate> {
        self.templates.get(url)
    }

    /// Record that the script at `url` ran. False if it had already run.
    pub fn mark_executed(&mut self, url: &str) -> bool {
        self.executed.insert(url.to_string())
    }

    /// Number of network fetches issued for `url`.
    pub fn fetch_count(&self, url: &str) -> u32 {
        self.fetches.get(url).copied().unwrap_or(0)
    }

    pub fn clear(&mut self) {
        self.status.clear();
        self.bodies.clear();
        self.templates.clear();
        self.executed.clear();
        self.fetches.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_download_claimed_once() {
        let mut cache = ResourceCache::new();
        assert!(cache.begin("/a.js"));
        assert!(!cache.begin("/a.js"));
        cache.complete("/a.js", "ok".into());
        assert!(!cache.begin("/a.js"));
        assert!(cache.is_done("/a.js"));
        assert_eq!(cache.fetch_count("/a.js"), 1);
        assert_eq!(cache.body("/a.js").as_deref(), Some("ok"));
    }

    #[test]
    fn test_failed_download_can_be_reclaimed() {
        let mut cache = ResourceCache::new();
        cache.begin("/a.js");
        assert_eq!(cache.fail("/a.js"), 1);
        assert_eq!(cache.status("/a.js"), DownloadStatus::Failed { errors: 1 });

        assert!(cache.begin("/a.js"));
        assert_eq!(cache.status("/a.js"), DownloadStatus::Active { errors: 1 });
        assert_eq!(cache.fail("/a.js"), 2);
        assert_eq!(cache.fetch_count("/a.js"), 2);
    }

    #[test]
    fn test_scripts_execute_once() {
        let mut cache = ResourceCache::new();
        assert!(cache.mark_executed("/lib.js"));
        assert!(!cache.mark_executed("/lib.js"));
        assert!(cache.mark_executed("/other.js"));
    }
}
