//! Runtime errors.
//!
//! | Error | When | Fatal |
//! |-------|------|-------|
//! | [`PropertyCollision`](CogError::PropertyCollision) | name already bound in a target namespace | yes |
//! | [`ResolutionFailure`](CogError::ResolutionFailure) | non-optional lookup found nothing | yes |
//! | [`InvalidOption`](CogError::InvalidOption) | unknown mode, namespace or item type | yes |
//! | [`MissingSource`](CogError::MissingSource) | a cog/chain source could not be resolved | yes |
//! | [`DuplicateListKey`](CogError::DuplicateListKey) | two list elements share a key | yes |
//! | [`DownloadFailure`](CogError::DownloadFailure) | fetch failed | no, recorded |
//!
//! Structural errors are programmer errors in the declarative source. They
//! terminate the operation that hit them and are never retried.

use thiserror::Error;

use crate::types::{ItemKey, Namespace, NodeId, Where};

/// Result alias used throughout the crate.
pub type Result<T, E = CogError> = std::result::Result<T, E>;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum CogError {
    #[error("{node}: {namespace} '{name}' is already defined")]
    PropertyCollision {
        node: NodeId,
        namespace: &'static str,
        name: String,
    },

    #[error("{node}: could not resolve {namespace} '{name}' (where={mode})")]
    ResolutionFailure {
        node: NodeId,
        namespace: Namespace,
        name: String,
        mode: Where,
    },

    #[error("invalid option for [{option}]: {value}")]
    InvalidOption { option: &'static str, value: String },

    #[error("{node}: source '{source_name}' could not be resolved")]
    MissingSource { node: NodeId, source_name: String },

    #[error("{node}: duplicate list key '{key}'")]
    DuplicateListKey { node: NodeId, key: ItemKey },

    #[error("download failed for {url} ({errors} errors so far)")]
    DownloadFailure { url: String, errors: u32 },

    #[error("parse error in {url}: {message}")]
    Parse { url: String, message: String },

    #[error("script {url} failed: {message}")]
    Script { url: String, message: String },

    #[error("unknown node {0}")]
    UnknownNode(NodeId),
}

impl CogError {
    /// Whether the error is recorded rather than raised.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, CogError::DownloadFailure { .. } | CogError::Script { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages() {
        let err = CogError::ResolutionFailure {
            node: NodeId(4),
            namespace: Namespace::Config,
            name: "title".into(),
            mode: Where::Outer,
        };
        assert_eq!(
            err.to_string(),
            "#4: could not resolve config 'title' (where=outer)"
        );
        assert!(!err.is_recoverable());

        let err = CogError::DownloadFailure {
            url: "/a.html".into(),
            errors: 2,
        };
        assert!(err.is_recoverable());
    }
}
