//! Requirement bookkeeping for a node waiting on external resources.
//!
//! The set keeps declaration order and never tracks a URL twice. Newly
//! discovered requirements are inserted right after the requirement that
//! revealed them, so scripts execute and alloys splice in dependency order.

use std::collections::HashSet;

use crate::types::RequireFlags;

#[derive(Debug, Clone, PartialEq)]
pub struct Requirement {
    /// Absolute URL, also the cache key.
    pub url: String,
    /// URL of the template that declared this requirement.
    pub from_url: Option<String>,
    pub flags: RequireFlags,
    /// Prop name for the alloy spliced from this requirement.
    pub name: Option<String>,
    pub ready: bool,
    /// Set once the script ran or the alloy was spliced.
    pub applied: bool,
}

impl Requirement {
    pub fn new(url: impl Into<String>, from_url: Option<String>, flags: RequireFlags, name: Option<String>) -> Self {
        Self {
            url: url.into(),
            from_url,
            flags,
            name,
            ready: false,
            applied: false,
        }
    }

    pub fn is_preload(&self) -> bool {
        self.flags.contains(RequireFlags::PRELOAD)
    }
}

#[derive(Debug, Default)]
pub struct RequirementSet {
    items: Vec<Requirement>,
    seen: HashSet<String>,
}

impl RequirementSet {
    /// Append a requirement. Returns false if its URL is already tracked.
    pub fn push(&mut self, requirement: Requirement) -> bool {
        if !self.seen.insert(requirement.url.clone()) {
            return false;
        }
        self.items.push(requirement);
        true
    }

    /// Mark the requirement for `url` ready. Returns its index, or None when
    /// it is unknown or was already ready.
    pub fn mark_ready(&mut self, url: &str) -> Option<usize> {
        let index = self.items.iter().position(|r| r.url == url && !r.ready)?;
        self.items[index].ready = true;
        Some(index)
    }

    /// Insert unseen requirements after `index`, keeping their order.
    ///
    /// Returns the URLs actually inserted.
    pub fn insert_after(&mut self, index: usize, discovered: Vec<Requirement>) -> Vec<String> {
        let mut at = (index + 1).min(self.items.len());
        let mut inserted = Vec::new();
        for requirement in discovered {
            if !self.seen.insert(requirement.url.clone()) {
                continue;
            }
            inserted.push(requirement.url.clone());
            self.items.insert(at, requirement);
            at += 1;
        }
        inserted
    }

    pub fn all_ready(&self) -> bool {
        self.items.iter().all(|r| r.ready)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Requirement> {
        self.items.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Requirement> {
        self.items.iter_mut()
    }

    pub fn urls(&self) -> Vec<String> {
        self.items.iter().map(|r| r.url.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn req(url: &str) -> Requirement {
        Requirement::new(url, None, RequireFlags::NONE, None)
    }

    #[test]
    fn test_push_dedupes() {
        let mut set = RequirementSet::default();
        assert!(set.push(req("/a.js")));
        assert!(!set.push(req("/a.js")));
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn test_insert_after_keeps_order() {
        let mut set = RequirementSet::default();
        set.push(req("/a.html"));
        set.push(req("/z.js"));

        let index = set.mark_ready("/a.html").unwrap();
        let inserted = set.insert_after(index, vec![req("/b.js"), req("/z.js"), req("/c.js")]);

        assert_eq!(inserted, vec!["/b.js", "/c.js"]);
        assert_eq!(set.urls(), vec!["/a.html", "/b.js", "/c.js", "/z.js"]);
    }

    #[test]
    fn test_mark_ready_once() {
        let mut set = RequirementSet::default();
        set.push(req("/a.js"));
        assert_eq!(set.mark_ready("/a.js"), Some(0));
        assert_eq!(set.mark_ready("/a.js"), None);
        assert_eq!(set.mark_ready("/unknown.js"), None);
        assert!(set.all_ready());
    }

    #[test]
    fn test_empty_set_is_ready() {
        assert!(RequirementSet::default().all_ready());
    }
}
