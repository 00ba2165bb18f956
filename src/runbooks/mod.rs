//! Runbook Retrieval Module
//!
//! Fetches the top-K runbooks for a caller-built query string. Ranking is
//! the vector store's job; this side only bounds and unwraps the results.

pub mod chroma;
pub mod embed;

pub use chroma::ChromaRunbookStore;
pub use embed::{FastEmbedder, QueryEmbedder};

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use tracing::debug;

use crate::error::{Backend, ContextError, ContextResult};
use crate::model::RunbookDocument;

/// Failure-mode vocabulary appended to the service name to form a runbook query.
pub const FAILURE_MODES: &str = "latency error failure";

/// Listing cap for inspection tooling.
pub const LISTING_LIMIT: usize = 100;

/// `"{service} latency error failure"`
pub fn runbook_query(service_name: &str) -> String {
    format!("{} {}", service_name, FAILURE_MODES)
}

/// Read-only query contract of the vector store.
#[async_trait]
pub trait RunbookStore: Send + Sync {
    /// Up to `top_k` documents ranked by relevance to `text`. Empty when the corpus is absent.
    async fn query(&self, text: &str, top_k: usize) -> Result<Vec<RunbookDocument>>;

    /// Up to `limit` documents in storage order. Empty when the corpus is absent.
    async fn list(&self, limit: usize) -> Result<Vec<RunbookDocument>>;
}

#[derive(Clone)]
pub struct RunbookRetriever {
    store: Arc<dyn RunbookStore>,
}

impl RunbookRetriever {
    pub fn new(store: Arc<dyn RunbookStore>) -> Self {
        Self { store }
    }

    /// Text of at most `top_k` relevant runbooks.
    pub async fn retrieve(&self, query_text: &str, top_k: usize) -> ContextResult<Vec<String>> {
        if top_k == 0 {
            return Ok(Vec::new());
        }

        let docs = self
            .store
            .query(query_text, top_k)
            .await
            .map_err(|e| ContextError::backend(Backend::Runbooks, e))?;
        debug!(query = query_text, hits = docs.len(), "runbook retrieval");

        Ok(docs.into_iter().take(top_k).map(|d| d.text).collect())
    }

    /// Runbooks with ids and metadata, for inspection tooling.
    pub async fn list(&self) -> ContextResult<Vec<RunbookDocument>> {
        self.store
            .list(LISTING_LIMIT)
            .await
            .map_err(|e| ContextError::backend(Backend::Runbooks, e))
    }
}
