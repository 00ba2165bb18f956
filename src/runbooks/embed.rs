//! Query embedding for the vector store.
//!
//! The runbook corpus is indexed with all-MiniLM-L6-v2, so queries must be
//! embedded with the same model before they can be ranked.

use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use fastembed::{EmbeddingModel, InitOptions, TextEmbedding};
use tokio::sync::Mutex;
use tracing::info;

#[async_trait]
pub trait QueryEmbedder: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;
}

/// Local fastembed model, loaded on first use.
#[derive(Clone, Default)]
pub struct FastEmbedder {
    model: Arc<Mutex<Option<TextEmbedding>>>,
}

impl FastEmbedder {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl QueryEmbedder for FastEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let mut guard = self.model.lock().await;
        if guard.is_none() {
            info!("Loading query embedding model (AllMiniLML6V2)");
            *guard = Some(
                TextEmbedding::try_new(InitOptions::new(EmbeddingModel::AllMiniLML6V2))
                    .context("Failed to initialize embedding model")?,
            );
        }
        let model = guard.as_mut().context("Embedding model unavailable")?;
        let embeddings = model.embed(vec![text.to_string()], None)?;
        embeddings.into_iter().next().context("No embedding returned")
    }
}
