//! Context Composition
//!
//! Fans out to the dependency resolver, runbook retriever and metrics
//! aggregator, then fans in to one bounded [`ContextBundle`]. Nothing is
//! cached: every call re-reads all three stores.

use std::collections::BTreeSet;
use std::fmt;

use serde::Serialize;
use tracing::{info, instrument};

use crate::error::ContextResult;
use crate::graph::{blast_radius_of, DependencyResolver};
use crate::metrics::{MetricsWindowAggregator, WindowPolicy};
use crate::model::{MetricSample, Neighbor, ServiceNode};
use crate::runbooks::{runbook_query, RunbookRetriever};

/// Which services the metrics window covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ContextMode {
    /// Target service only, 24h window, up to 10 samples per series.
    Summary,
    /// Whole blast radius, 3h window, up to 3 samples per series.
    BlastRadius,
}

impl ContextMode {
    pub fn window(&self) -> WindowPolicy {
        match self {
            ContextMode::Summary => WindowPolicy::SUMMARY,
            ContextMode::BlastRadius => WindowPolicy::BLAST_RADIUS,
        }
    }
}

impl fmt::Display for ContextMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ContextMode::Summary => write!(f, "summary"),
            ContextMode::BlastRadius => write!(f, "blast_radius"),
        }
    }
}

/// Everything the generation step gets to see for one request.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ContextBundle {
    pub mode: ContextMode,
    pub service: ServiceNode,
    pub downstream: Vec<Neighbor>,
    pub upstream: Vec<Neighbor>,
    /// Target plus both neighbour lists, deduplicated by name.
    pub blast_radius: BTreeSet<String>,
    /// Downsampled samples, grouped by (service, metric), ascending within a group.
    pub metrics: Vec<MetricSample>,
    /// Samples the window held before downsampling.
    pub metrics_in_window: usize,
    /// Runbook excerpts, most relevant first.
    pub runbooks: Vec<String>,
}

impl ContextBundle {
    /// Newest sample in the bundle, if any.
    pub fn latest_sample(&self) -> Option<&MetricSample> {
        self.metrics.iter().max_by_key(|s| s.timestamp)
    }
}

#[derive(Clone)]
pub struct ContextComposer {
    resolver: DependencyResolver,
    aggregator: MetricsWindowAggregator,
    retriever: RunbookRetriever,
    runbook_top_k: usize,
}

impl ContextComposer {
    pub fn new(
        resolver: DependencyResolver,
        aggregator: MetricsWindowAggregator,
        retriever: RunbookRetriever,
        runbook_top_k: usize,
    ) -> Self {
        Self {
            resolver,
            aggregator,
            retriever,
            runbook_top_k,
        }
    }

    pub fn resolver(&self) -> &DependencyResolver {
        &self.resolver
    }

    pub fn aggregator(&self) -> &MetricsWindowAggregator {
        &self.aggregator
    }

    pub fn retriever(&self) -> &RunbookRetriever {
        &self.retriever
    }

    /// Build a fresh bundle for `service_name`.
    ///
    /// An unknown service short-circuits with [`ContextError::NotFound`](crate::error::ContextError::NotFound)
    /// before any metrics or runbook query is issued. A failing store fails
    /// the whole call; no partial bundle is returned.
    #[instrument(skip(self))]
    pub async fn compose(&self, service_name: &str, mode: ContextMode) -> ContextResult<ContextBundle> {
        let service = self.resolver.service_details(service_name).await?;

        let query = runbook_query(&service.name);
        let (downstream, upstream, runbooks) = tokio::try_join!(
            self.resolver.downstream(&service.name),
            self.resolver.upstream(&service.name),
            self.retriever.retrieve(&query, self.runbook_top_k),
        )?;

        let blast_radius = blast_radius_of(&service.name, &downstream, &upstream);
        let metric_services = match mode {
            ContextMode::Summary => BTreeSet::from([service.name.clone()]),
            ContextMode::BlastRadius => blast_radius.clone(),
        };
        let window = self.aggregator.fetch_with(&metric_services, mode.window()).await?;
        let (metrics, metrics_in_window) = (window.samples, window.fetched);

        info!(
            service = %service.name,
            downstream = downstream.len(),
            upstream = upstream.len(),
            metrics = metrics.len(),
            runbooks = runbooks.len(),
            "context composed"
        );

        Ok(ContextBundle {
            mode,
            service,
            downstream,
            upstream,
            blast_radius,
            metrics,
            metrics_in_window,
            runbooks,
        })
    }
}
