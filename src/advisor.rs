//! SLO Advisor
//!
//! Entry points the transport layer calls. Each one composes a fresh
//! context bundle and, where needed, hands it to the generation boundary.

use std::sync::Arc;

use anyhow::Result;
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};

use crate::config::Settings;
use crate::context::{ContextBundle, ContextComposer, ContextMode};
use crate::error::ContextResult;
use crate::generation::{
    GenerationAdapter, Instruction, LLMProvider, OllamaProvider, OpenAICompatibleProvider,
};
use crate::graph::{BlastRadius, DependencyResolver, GraphStore, Neo4jGraphStore};
use crate::metrics::{MetricsStore, MetricsWindowAggregator, SqliteMetricsStore};
use crate::model::{ChatMessage, MetricSample, Role, RunbookDocument, ServiceGraph, ServiceNode};
use crate::runbooks::{ChromaRunbookStore, FastEmbedder, RunbookRetriever, RunbookStore};

/// The recommendation text is free-form, so the structured field only points at it.
pub const RECOMMENDED_SLO_PLACEHOLDER: &str = "See detailed reasoning";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricsContext {
    /// Every sample in the summary window, before downsampling.
    pub count: usize,
    pub latest: Option<MetricSample>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SloRecommendation {
    pub service_name: String,
    pub recommended_slo: String,
    pub reasoning: String,
    pub relevant_runbooks: Vec<String>,
    pub metrics_context: MetricsContext,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatReply {
    pub role: Role,
    pub content: String,
}

#[derive(Clone)]
pub struct SloAdvisor {
    composer: ContextComposer,
    generator: GenerationAdapter,
}

impl SloAdvisor {
    pub fn new(composer: ContextComposer, generator: GenerationAdapter) -> Self {
        Self { composer, generator }
    }

    /// Wire the advisor from explicit store and provider handles.
    pub fn from_parts(
        graph: Arc<dyn GraphStore>,
        metrics: Arc<dyn MetricsStore>,
        runbooks: Arc<dyn RunbookStore>,
        provider: Arc<dyn LLMProvider>,
        settings: &Settings,
    ) -> Self {
        let composer = ContextComposer::new(
            DependencyResolver::new(graph),
            MetricsWindowAggregator::new(metrics),
            RunbookRetriever::new(runbooks),
            settings.runbook_top_k,
        );
        let generator = GenerationAdapter::new(provider, settings.llm_model.clone(), settings.generation_timeout);
        Self::new(composer, generator)
    }

    /// Connect to the configured Neo4j, SQLite, Chroma and generation backends.
    pub async fn from_settings(settings: &Settings) -> Result<Self> {
        let graph = Arc::new(Neo4jGraphStore::new(
            &settings.neo4j_uri,
            &settings.neo4j_database,
            settings.neo4j_user.clone(),
            settings.neo4j_password.clone(),
        ));
        let metrics = Arc::new(SqliteMetricsStore::open(&settings.sqlite_db_path).await?);
        let runbooks = Arc::new(ChromaRunbookStore::new(
            &settings.chroma_url,
            settings.runbook_collection.clone(),
            Arc::new(FastEmbedder::new()),
        ));

        let provider: Arc<dyn LLMProvider> = match &settings.llm_provider_url {
            Some(url) => {
                info!(url = %url, model = %settings.llm_model, "using OpenAI-compatible generation backend");
                Arc::new(OpenAICompatibleProvider::new(url.clone(), settings.llm_api_key.clone()))
            }
            None => {
                info!(url = %settings.ollama_url, model = %settings.llm_model, "using Ollama generation backend");
                Arc::new(OllamaProvider::from_url(&settings.ollama_url)?)
            }
        };

        Ok(Self::from_parts(graph, metrics, runbooks, provider, settings))
    }

    pub fn composer(&self) -> &ContextComposer {
        &self.composer
    }

    pub async fn get_service_details(&self, service_name: &str) -> ContextResult<ServiceNode> {
        self.composer.resolver().service_details(service_name).await
    }

    pub async fn get_blast_radius(&self, service_name: &str) -> ContextResult<BlastRadius> {
        self.composer.resolver().blast_radius(service_name).await
    }

    pub async fn get_summary_context(&self, service_name: &str) -> ContextResult<ContextBundle> {
        self.composer.compose(service_name, ContextMode::Summary).await
    }

    pub async fn get_blast_radius_context(&self, service_name: &str) -> ContextResult<ContextBundle> {
        self.composer.compose(service_name, ContextMode::BlastRadius).await
    }

    /// One-shot recommendation over the summary context.
    ///
    /// Only context failures are errors. A generation failure comes back as
    /// the `reasoning` text with the rest of the response intact.
    #[instrument(skip(self))]
    pub async fn recommend(&self, service_name: &str) -> ContextResult<SloRecommendation> {
        let bundle = self.get_summary_context(service_name).await?;
        let reasoning = self.generator.generate_text(&bundle, Instruction::Recommend, &[]).await;

        let metrics_context = MetricsContext {
            count: bundle.metrics_in_window,
            latest: bundle.latest_sample().cloned(),
        };
        Ok(SloRecommendation {
            service_name: bundle.service.name,
            recommended_slo: RECOMMENDED_SLO_PLACEHOLDER.to_string(),
            reasoning,
            relevant_runbooks: bundle.runbooks,
            metrics_context,
        })
    }

    /// Answer a follow-up over the blast-radius context. The caller owns the
    /// history; nothing is kept between calls.
    #[instrument(skip(self, history), fields(turns = history.len()))]
    pub async fn chat(&self, service_name: &str, history: &[ChatMessage]) -> ContextResult<ChatReply> {
        let bundle = self.get_blast_radius_context(service_name).await?;
        let content = self.generator.generate_text(&bundle, Instruction::Chat, history).await;
        Ok(ChatReply {
            role: Role::Assistant,
            content,
        })
    }

    pub async fn graph(&self) -> ContextResult<ServiceGraph> {
        self.composer.resolver().topology().await
    }

    pub async fn vectors(&self) -> ContextResult<Vec<RunbookDocument>> {
        self.composer.retriever().list().await
    }

    pub async fn latest_metrics(&self, limit: usize) -> ContextResult<Vec<MetricSample>> {
        self.composer.aggregator().latest(limit).await
    }
}
