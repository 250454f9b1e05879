//! Downloads and requirement resolution.
//!
//! A node moves from `ResolvingRequirements` to `Initialized` once every
//! requirement it declared, and every requirement those reveal, has
//! downloaded. Readiness is re-checked on each completion until it holds:
//!
//! ```text
//! app.html   requires [list.html, util.js]
//! list.html  requires [row.js]            ← discovered when list.html lands
//!
//! requirements: list.html, row.js, util.js
//! ```
//!
//! When all are done, scripts run (once per URL, in that order) and
//! non-preload templates are spliced above the node as alloys.

use tracing::{debug, trace, warn};

use super::Runtime;
use crate::engine::path::dir_of;
use crate::error::{CogError, Result};
use crate::loader::{Completion, Requirement};
use crate::state::{Event, Waiter};
use crate::types::{Lifecycle, NodeId, NodeKind};

impl Runtime {
    // -------------------------------------------------------------------------
    // Downloads
    // -------------------------------------------------------------------------

    /// Start downloading `url` unless it is active or done.
    pub(crate) fn request_download(&mut self, url: &str) {
        if !self.cache.begin(url) {
            return;
        }
        let fetch_url = self.config.fetch_url(url);
        trace!(url, fetch_url, "fetching");
        let future = self.fetcher.fetch(&fetch_url);
        self.in_flight.push(url.to_string(), future);
    }

    /// Notify `waiter` once `url` is done; right away if it already is.
    pub(crate) fn when_done(&mut self, url: &str, waiter: Waiter) {
        if self.cache.is_done(url) {
            self.events.push(Event::Fetched {
                url: url.to_string(),
                waiter,
            });
        } else {
            self.waiters.entry(url.to_string()).or_default().push(waiter);
        }
    }

    pub(crate) fn complete_fetch(&mut self, completion: Completion) -> Result<()> {
        let Completion { url, result } = completion;
        let body = match result {
            Ok(body) => body,
            Err(error) => {
                let errors = self.cache.fail(&url);
                let failure = CogError::DownloadFailure {
                    url: url.clone(),
                    errors,
                };
                warn!(%error, "{failure}");
                return Ok(());
            }
        };

        if self.config.is_template(&url) {
            match self.parser.parse(&body, &url) {
                Ok(parsed) => self.cache.store_template(&url, parsed),
                Err(error) => {
                    self.cache.fail(&url);
                    warn!(url, %error, "template rejected");
                    return Err(error);
                }
            }
        }
        self.cache.complete(&url, body);
        debug!(url, "downloaded");

        for waiter in self.waiters.remove(&url).unwrap_or_default() {
            self.events.push(Event::Fetched {
                url: url.clone(),
                waiter,
            });
        }
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Own template
    // -------------------------------------------------------------------------

    /// Point `id` at `url` and record the directory it lives in.
    pub(crate) fn assign_url(&mut self, id: NodeId, url: &str) -> Result<String> {
        let resolved = self.tree.resolve_url(id, url, None, &self.config.root_path);
        let node = self.tree.node_mut(id)?;
        node.url = Some(url.to_string());
        if let Some(dir) = dir_of(&resolved) {
            node.path = Some(dir);
        }
        node.resolved_url = Some(resolved.clone());
        node.advance(Lifecycle::ResolvingRequirements);
        Ok(resolved)
    }

    /// Assign `url` and wait for its template.
    pub(crate) fn download_url(&mut self, id: NodeId, url: &str) -> Result<()> {
        let resolved = self.assign_url(id, url)?;
        self.request_download(&resolved);
        self.when_done(&resolved, Waiter::Become(id));
        Ok(())
    }

    /// The node's template is cached: adopt its declarations.
    pub(crate) fn become_url(&mut self, id: NodeId) -> Result<()> {
        let node = self.tree.node(id)?;
        if node.state() != Lifecycle::ResolvingRequirements || node.declarations.is_some() {
            return Ok(());
        }
        let is_alloy = node.is_alloy();
        let declarations = node
            .resolved_url
            .as_deref()
            .and_then(|url| self.cache.template(url))
            .map(|t| t.declarations.clone())
            .unwrap_or_default();
        self.tree.node_mut(id)?.declarations = Some(declarations);

        if is_alloy {
            self.initialize(id)
        } else {
            self.request_requirements(id)
        }
    }

    // -------------------------------------------------------------------------
    // Requirements
    // -------------------------------------------------------------------------

    fn request_requirements(&mut self, id: NodeId) -> Result<()> {
        let node = self.tree.node(id)?;
        let declarations = node.declarations.clone().unwrap_or_default();
        let from_url = node.resolved_url.clone();

        let mut urls = Vec::new();
        for def in &declarations.requires {
            let url = self
                .tree
                .resolve_url(id, &def.url, def.path.as_deref(), &self.config.root_path);
            let requirement = Requirement::new(url.clone(), from_url.clone(), def.flags, def.name.clone());
            if self.tree.node_mut(id)?.requirements.push(requirement) {
                urls.push(url);
            }
        }

        if urls.is_empty() {
            return self.initialize(id);
        }
        debug!(%id, count = urls.len(), "resolving requirements");
        for url in urls {
            self.request_download(&url);
            self.when_done(&url, Waiter::Requirement(id));
        }
        Ok(())
    }

    pub(crate) fn requirement_ready(&mut self, id: NodeId, url: &str) -> Result<()> {
        if self.tree.node(id)?.is_initialized() {
            trace!(%id, url, "requirement ready after initialization");
            return Ok(());
        }
        let Some(index) = self.tree.node_mut(id)?.requirements.mark_ready(url) else {
            return Ok(());
        };

        // A template requirement may require more; those go right after it.
        let nested = self
            .cache
            .template(url)
            .filter(|_| self.config.is_template(url))
            .map(|t| t.declarations.clone());
        if let Some(nested) = nested {
            let base = dir_of(url);
            let discovered: Vec<Requirement> = nested
                .requires
                .iter()
                .map(|def| {
                    let path = def.path.clone().or_else(|| base.clone());
                    let resolved = self
                        .tree
                        .resolve_url(id, &def.url, path.as_deref(), &self.config.root_path);
                    Requirement::new(resolved, Some(url.to_string()), def.flags, def.name.clone())
                })
                .collect();

            let inserted = self.tree.node_mut(id)?.requirements.insert_after(index, discovered);
            if !inserted.is_empty() {
                debug!(%id, from = url, count = inserted.len(), "discovered requirements");
            }
            for url in inserted {
                self.request_download(&url);
                self.when_done(&url, Waiter::Requirement(id));
            }
        }

        self.complete_requirements(id)
    }

    /// Apply requirements and initialize once every one is downloaded.
    fn complete_requirements(&mut self, id: NodeId) -> Result<()> {
        let node = self.tree.node(id)?;
        if node.is_initialized() || !node.requirements.all_ready() {
            return Ok(());
        }
        if let Some(waiting) = node.requirements.iter().find(|r| !self.cache.is_done(&r.url)) {
            trace!(%id, url = %waiting.url, "requirement not done yet");
            return Ok(());
        }

        let pending: Vec<Requirement> = node.requirements.iter().filter(|r| !r.applied).cloned().collect();
        for requirement in self.tree.node_mut(id)?.requirements.iter_mut() {
            requirement.applied = true;
        }

        for requirement in &pending {
            if requirement.is_preload() {
                continue;
            }
            if self.config.is_script(&requirement.url) {
                self.execute_script(&requirement.url);
            } else if self.config.is_template(&requirement.url) {
                self.splice_alloy(id, requirement)?;
            }
        }

        self.initialize(id)
    }

    fn execute_script(&mut self, url: &str) {
        if !self.cache.mark_executed(url) {
            return;
        }
        let source = self.cache.body(url).unwrap_or_default();
        match self.scripts.execute(url, &source) {
            Ok(()) => debug!(url, "executed script"),
            Err(error) => warn!(url, %error, "script failed"),
        }
    }

    // -------------------------------------------------------------------------
    // Alloys
    // -------------------------------------------------------------------------

    /// Splice a node for `requirement` between `host` and its parent.
    fn splice_alloy(&mut self, host: NodeId, requirement: &Requirement) -> Result<()> {
        let alloy = self.tree.allocate(None);
        {
            let node = self.tree.node_mut(alloy)?;
            node.kind = NodeKind::Alloy;
            node.name = requirement.name.clone();
            node.origin = Some(host);
        }
        self.tree.splice_above(host, alloy)?;
        self.assign_url(alloy, &requirement.url)?;
        debug!(%host, %alloy, url = %requirement.url, "spliced alloy");
        self.become_url(alloy)
    }
}
