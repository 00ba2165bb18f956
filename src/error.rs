//! Error taxonomy for context aggregation.
//!
//! Empty results (no edges, no samples, no runbooks) are not errors and never
//! show up here. Generation failures have their own type in
//! [`crate::generation`] because they are recovered before reaching callers.

use std::fmt;

use thiserror::Error;

/// Backing store a failure came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backend {
    Graph,
    Metrics,
    Runbooks,
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Backend::Graph => write!(f, "graph store"),
            Backend::Metrics => write!(f, "metrics store"),
            Backend::Runbooks => write!(f, "runbook store"),
        }
    }
}

/// Coarse classification the transport layer maps to status codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    InvalidRequest,
    BackendUnavailable,
}

#[derive(Error, Debug)]
pub enum ContextError {
    #[error("Service '{0}' not found in graph")]
    NotFound(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("{backend} unavailable: {message}")]
    BackendUnavailable { backend: Backend, message: String },
}

impl ContextError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ContextError::NotFound(_) => ErrorKind::NotFound,
            ContextError::InvalidRequest(_) => ErrorKind::InvalidRequest,
            ContextError::BackendUnavailable { .. } => ErrorKind::BackendUnavailable,
        }
    }

    /// Wrap a store adapter failure, keeping the whole cause chain in the message.
    pub fn backend(backend: Backend, err: anyhow::Error) -> Self {
        ContextError::BackendUnavailable {
            backend,
            message: format!("{:#}", err),
        }
    }
}

pub type ContextResult<T> = std::result::Result<T, ContextError>;

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;

    #[test]
    fn test_kinds_are_distinct() {
        assert_eq!(ContextError::NotFound("X".into()).kind(), ErrorKind::NotFound);
        assert_eq!(ContextError::InvalidRequest("empty".into()).kind(), ErrorKind::InvalidRequest);
        let err = ContextError::backend(Backend::Metrics, anyhow!("disk I/O error"));
        assert_eq!(err.kind(), ErrorKind::BackendUnavailable);
    }

    #[test]
    fn test_backend_message_keeps_cause_chain() {
        let err = ContextError::backend(
            Backend::Graph,
            anyhow!("connection refused").context("neo4j request failed"),
        );
        let msg = err.to_string();
        assert!(msg.starts_with("graph store unavailable"));
        assert!(msg.contains("neo4j request failed"));
        assert!(msg.contains("connection refused"));
    }
}
