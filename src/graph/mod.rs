//! Dependency Graph Module
//!
//! Resolves the immediate (one-hop) neighbourhood of a service and the
//! blast-radius set derived from it.

pub mod memory;
pub mod neo4j;

pub use memory::StaticGraph;
pub use neo4j::Neo4jGraphStore;

use std::collections::BTreeSet;
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use serde::Serialize;
use tracing::debug;

use crate::error::{Backend, ContextError, ContextResult};
use crate::model::{DependencyEdge, Neighbor, ServiceGraph, ServiceNode};

/// Read-only query contract of the graph store.
#[async_trait]
pub trait GraphStore: Send + Sync {
    /// Look up a single service. `None` means the service is not in the graph.
    async fn service(&self, name: &str) -> Result<Option<ServiceNode>>;

    /// Services `name` depends on (edges where `name` is the source).
    async fn downstream(&self, name: &str) -> Result<Vec<Neighbor>>;

    /// Services depending on `name` (edges where `name` is the target).
    async fn upstream(&self, name: &str) -> Result<Vec<Neighbor>>;

    /// Every service node.
    async fn services(&self) -> Result<Vec<ServiceNode>>;

    /// Every dependency edge.
    async fn edges(&self) -> Result<Vec<DependencyEdge>>;
}

/// Immediate blast radius of a service, as exposed to callers.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BlastRadius {
    pub service: ServiceNode,
    pub downstream: Vec<Neighbor>,
    pub upstream: Vec<Neighbor>,
    /// Target plus every neighbour, deduplicated by name.
    pub services: BTreeSet<String>,
}

/// Target name plus the names of both neighbour lists, deduplicated.
pub fn blast_radius_of(target: &str, downstream: &[Neighbor], upstream: &[Neighbor]) -> BTreeSet<String> {
    std::iter::once(target.to_string())
        .chain(downstream.iter().map(|n| n.name.clone()))
        .chain(upstream.iter().map(|n| n.name.clone()))
        .collect()
}

/// Trimmed service name; blank names are rejected before any store is queried.
pub fn service_name(raw: &str) -> ContextResult<&str> {
    let name = raw.trim();
    if name.is_empty() {
        return Err(ContextError::InvalidRequest("service name is empty".to_string()));
    }
    Ok(name)
}

/// Resolves services and their neighbours against an injected [`GraphStore`].
#[derive(Clone)]
pub struct DependencyResolver {
    store: Arc<dyn GraphStore>,
}

impl DependencyResolver {
    pub fn new(store: Arc<dyn GraphStore>) -> Self {
        Self { store }
    }

    /// Details of a service, or [`ContextError::NotFound`] when it is absent from the graph.
    /// A present service with no edges is *not* an error.
    pub async fn service_details(&self, name: &str) -> ContextResult<ServiceNode> {
        let name = service_name(name)?;
        self.store
            .service(name)
            .await
            .map_err(|e| ContextError::backend(Backend::Graph, e))?
            .ok_or_else(|| ContextError::NotFound(name.to_string()))
    }

    pub async fn downstream(&self, name: &str) -> ContextResult<Vec<Neighbor>> {
        let name = service_name(name)?;
        let deps = self
            .store
            .downstream(name)
            .await
            .map_err(|e| ContextError::backend(Backend::Graph, e))?;
        debug!(service = name, count = deps.len(), "resolved downstream dependencies");
        Ok(deps)
    }

    pub async fn upstream(&self, name: &str) -> ContextResult<Vec<Neighbor>> {
        let name = service_name(name)?;
        let deps = self
            .store
            .upstream(name)
            .await
            .map_err(|e| ContextError::backend(Backend::Graph, e))?;
        debug!(service = name, count = deps.len(), "resolved upstream dependencies");
        Ok(deps)
    }

    /// Both neighbour lists, queried concurrently.
    pub async fn neighbors(&self, name: &str) -> ContextResult<(Vec<Neighbor>, Vec<Neighbor>)> {
        tokio::try_join!(self.downstream(name), self.upstream(name))
    }

    /// Blast-radius service set for `name`. Exactly one hop in each direction.
    pub async fn compute_blast_radius(&self, name: &str) -> ContextResult<BTreeSet<String>> {
        Ok(self.blast_radius(name).await?.services)
    }

    /// Service details, both neighbour lists and the derived service set.
    pub async fn blast_radius(&self, name: &str) -> ContextResult<BlastRadius> {
        let service = self.service_details(name).await?;
        let (downstream, upstream) = self.neighbors(&service.name).await?;
        let services = blast_radius_of(&service.name, &downstream, &upstream);
        Ok(BlastRadius {
            service,
            downstream,
            upstream,
            services,
        })
    }

    /// Full topology for inspection tooling.
    pub async fn topology(&self) -> ContextResult<ServiceGraph> {
        let (nodes, edges) = tokio::try_join!(self.store.services(), self.store.edges())
            .map_err(|e| ContextError::backend(Backend::Graph, e))?;
        Ok(ServiceGraph { nodes, edges })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::model::Criticality;

    fn shop() -> DependencyResolver {
        let graph = StaticGraph::new(
            vec![
                ServiceNode::new("Frontend", "UI", "Tier-1"),
                ServiceNode::new("CartService", "Microservice", "Tier-1"),
                ServiceNode::new("CheckoutService", "Microservice", "Tier-1"),
                ServiceNode::new("PaymentService", "Microservice", "Tier-1"),
                ServiceNode::new("EmailService", "Microservice", "Tier-3"),
                ServiceNode::new("Orphan", "Batch", "Tier-3"),
            ],
            vec![
                DependencyEdge::new("Frontend", "CartService", Criticality::High),
                DependencyEdge::new("Frontend", "CheckoutService", Criticality::High),
                DependencyEdge::new("CheckoutService", "CartService", Criticality::High),
                DependencyEdge::new("CheckoutService", "PaymentService", Criticality::High),
                DependencyEdge::new("CheckoutService", "EmailService", Criticality::Low),
            ],
        );
        DependencyResolver::new(Arc::new(graph))
    }

    #[tokio::test]
    async fn test_absent_service_is_not_found() {
        let err = shop().service_details("UnknownService").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn test_service_without_edges_is_empty_not_missing() {
        let resolver = shop();
        assert!(resolver.service_details("Orphan").await.is_ok());
        assert!(resolver.downstream("Orphan").await.unwrap().is_empty());
        assert!(resolver.upstream("Orphan").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_upstream_carries_edge_criticality() {
        let upstream = shop().upstream("CartService").await.unwrap();
        let frontend = upstream.iter().find(|n| n.name == "Frontend").expect("Frontend calls CartService");
        assert_eq!(frontend.criticality, Criticality::High);
        assert_eq!(frontend.tier, "Tier-1");
    }

    #[tokio::test]
    async fn test_blast_radius_is_deduplicated_and_contains_target() {
        let resolver = shop();
        let first = resolver.compute_blast_radius("CheckoutService").await.unwrap();
        let second = resolver.compute_blast_radius("CheckoutService").await.unwrap();

        assert_eq!(first, second);
        let expected: BTreeSet<String> = ["CheckoutService", "CartService", "PaymentService", "EmailService", "Frontend"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        assert_eq!(first, expected);
    }

    #[tokio::test]
    async fn test_blast_radius_of_lonely_service_is_itself() {
        let set = shop().compute_blast_radius("Orphan").await.unwrap();
        assert_eq!(set.len(), 1);
        assert!(set.contains("Orphan"));
    }

    #[tokio::test]
    async fn test_blast_radius_is_one_hop() {
        // Frontend -> CheckoutService -> PaymentService: PaymentService is two hops away.
        let set = shop().compute_blast_radius("Frontend").await.unwrap();
        assert!(set.contains("CheckoutService"));
        assert!(!set.contains("PaymentService"));
    }

    #[tokio::test]
    async fn test_self_edge_passes_through() {
        let graph = StaticGraph::new(
            vec![ServiceNode::new("Loopy", "Microservice", "Tier-2")],
            vec![DependencyEdge::new("Loopy", "Loopy", Criticality::Low)],
        );
        let resolver = DependencyResolver::new(Arc::new(graph));
        let (down, up) = resolver.neighbors("Loopy").await.unwrap();
        assert_eq!(down.len(), 1);
        assert_eq!(up.len(), 1);
        assert_eq!(resolver.compute_blast_radius("Loopy").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_names_are_trimmed_and_blank_names_rejected() {
        let resolver = shop();
        assert_eq!(resolver.service_details(" CartService ").await.unwrap().name, "CartService");
        assert_eq!(resolver.blast_radius("\tCartService\n").await.unwrap().services.len(), 3);
        assert_eq!(resolver.upstream(" CartService").await.unwrap().len(), 2);

        for blank in ["", "   ", "\t"] {
            assert_eq!(resolver.service_details(blank).await.unwrap_err().kind(), ErrorKind::InvalidRequest);
            assert_eq!(resolver.blast_radius(blank).await.unwrap_err().kind(), ErrorKind::InvalidRequest);
            assert_eq!(resolver.downstream(blank).await.unwrap_err().kind(), ErrorKind::InvalidRequest);
        }
    }

    #[tokio::test]
    async fn test_topology_lists_everything() {
        let graph = shop().topology().await.unwrap();
        assert_eq!(graph.nodes.len(), 6);
        assert_eq!(graph.edges.len(), 5);
    }
}
