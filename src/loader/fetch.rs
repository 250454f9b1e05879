//! Fetching - the pluggable transport for template and script bodies.
//!
//! A [`Fetcher`] turns a URL into a future of the body text. Futures in
//! flight are owned by [`InFlight`] and polled by the runtime's pump, so the
//! runtime never blocks on I/O and never holds a borrow across an await.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use futures::future::LocalBoxFuture;
use futures::stream::{FuturesUnordered, StreamExt};
use futures::FutureExt;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("transport error: {0}")]
    Transport(String),
}

pub type FetchFuture = LocalBoxFuture<'static, Result<String, FetchError>>;

pub trait Fetcher {
    /// Start fetching `url`. The URL may carry a cache-busting query.
    fn fetch(&self, url: &str) -> FetchFuture;
}

impl<F: Fetcher + ?Sized> Fetcher for Rc<F> {
    fn fetch(&self, url: &str) -> FetchFuture {
        (**self).fetch(url)
    }
}

// =============================================================================
// Static Fetcher
// =============================================================================

/// In-memory fetcher serving a fixed set of files. Query strings are ignored.
#[derive(Debug, Default)]
pub struct StaticFetcher {
    files: RefCell<HashMap<String, String>>,
    requests: RefCell<Vec<String>>,
}

impl StaticFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(self, url: impl Into<String>, body: impl Into<String>) -> Self {
        self.insert(url, body);
        self
    }

    pub fn insert(&self, url: impl Into<String>, body: impl Into<String>) {
        self.files.borrow_mut().insert(url.into(), body.into());
    }

    pub fn remove(&self, url: &str) {
        self.files.borrow_mut().remove(url);
    }

    /// Every URL requested so far, query included, in request order.
    pub fn requests(&self) -> Vec<String> {
        self.requests.borrow().clone()
    }

    /// How many times `url` (query ignored) was requested.
    pub fn request_count(&self, url: &str) -> usize {
        self.requests
            .borrow()
            .iter()
            .filter(|r| strip_query(r) == url)
            .count()
    }
}

impl Fetcher for StaticFetcher {
    fn fetch(&self, url: &str) -> FetchFuture {
        self.requests.borrow_mut().push(url.to_string());
        let key = strip_query(url);
        let result = self
            .files
            .borrow()
            .get(key)
            .cloned()
            .ok_or_else(|| FetchError::NotFound(key.to_string()));
        futures::future::ready(result).boxed_local()
    }
}

fn strip_query(url: &str) -> &str {
    url.split('?').next().unwrap_or(url)
}

// =============================================================================
// In-flight downloads
// =============================================================================

/// A finished download, keyed by the cache URL (no query).
#[derive(Debug)]
pub struct Completion {
    pub url: String,
    pub result: Result<String, FetchError>,
}

#[derive(Default)]
pub struct InFlight {
    futures: FuturesUnordered<LocalBoxFuture<'static, Completion>>,
}

impl InFlight {
    pub fn push(&mut self, url: String, future: FetchFuture) {
        self.futures.push(
            async move {
                let result = future.await;
                Completion { url, result }
            }
            .boxed_local(),
        );
    }

    /// A completion that is ready right now, without waiting.
    pub fn poll_ready(&mut self) -> Option<Completion> {
        self.futures.next().now_or_never().flatten()
    }

    /// Wait for the next completion. None when nothing is in flight.
    pub async fn next(&mut self) -> Option<Completion> {
        self.futures.next().await
    }

    pub fn len(&self) -> usize {
        self.futures.len()
    }

    pub fn is_empty(&self) -> bool {
        self.futures.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_static_fetcher_ignores_query() {
        let fetcher = StaticFetcher::new().with("/a.html", "{}");
        let body = futures::executor::block_on(fetcher.fetch("/a.html?buildNum=3"));
        assert_eq!(body.as_deref(), Ok("{}"));
        assert_eq!(fetcher.request_count("/a.html"), 1);
        assert_eq!(fetcher.requests(), vec!["/a.html?buildNum=3"]);
    }

    #[test]
    fn test_static_fetcher_missing() {
        let fetcher = StaticFetcher::new();
        let body = futures::executor::block_on(fetcher.fetch("/nope.js"));
        assert_eq!(body, Err(FetchError::NotFound("/nope.js".into())));
    }

    #[test]
    fn test_in_flight_polls_ready_futures() {
        let fetcher = StaticFetcher::new().with("/a.js", "x");
        let mut in_flight = InFlight::default();
        in_flight.push("/a.js".into(), fetcher.fetch("/a.js"));
        assert_eq!(in_flight.len(), 1);

        let done = in_flight.poll_ready().unwrap();
        assert_eq!(done.url, "/a.js");
        assert_eq!(done.result.as_deref(), Ok("x"));
        assert!(in_flight.poll_ready().is_none());
        assert!(in_flight.is_empty());
    }

    #[test]
    fn test_in_flight_waits_for_pending() {
        let (tx, rx) = futures::channel::oneshot::channel::<String>();
        let mut in_flight = InFlight::default();
        in_flight.push(
            "/slow.js".into(),
            async move { rx.await.map_err(|e| FetchError::Transport(e.to_string())) }.boxed_local(),
        );

        assert!(in_flight.poll_ready().is_none());
        tx.send("late".into()).unwrap();
        let done = futures::executor::block_on(in_flight.next()).unwrap();
        assert_eq!(done.result.as_deref(), Ok("late"));
    }
}
