//! In-memory graph store.
//!
//! Holds a fixed topology. Used for tests and for running without a graph
//! database (the topology can be loaded from a JSON `ServiceGraph` dump).

use std::path::Path;

use anyhow::{Context, Result};
use async_trait::async_trait;

use super::GraphStore;
use crate::model::{DependencyEdge, Neighbor, ServiceGraph, ServiceNode};

#[derive(Debug, Clone, Default)]
pub struct StaticGraph {
    nodes: Vec<ServiceNode>,
    edges: Vec<DependencyEdge>,
}

impl StaticGraph {
    pub fn new(nodes: Vec<ServiceNode>, edges: Vec<DependencyEdge>) -> Self {
        Self { nodes, edges }
    }

    pub fn from_graph(graph: ServiceGraph) -> Self {
        Self::new(graph.nodes, graph.edges)
    }

    /// Load a topology previously exported as `ServiceGraph` JSON.
    pub async fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let json = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read topology file {}", path.display()))?;
        let graph: ServiceGraph = serde_json::from_str(&json).context("Failed to parse topology")?;
        Ok(Self::from_graph(graph))
    }

    fn node(&self, name: &str) -> Option<&ServiceNode> {
        self.nodes.iter().find(|n| n.name == name)
    }
}

#[async_trait]
impl GraphStore for StaticGraph {
    async fn service(&self, name: &str) -> Result<Option<ServiceNode>> {
        Ok(self.node(name).cloned())
    }

    async fn downstream(&self, name: &str) -> Result<Vec<Neighbor>> {
        Ok(self
            .edges
            .iter()
            .filter(|e| e.source == name)
            .filter_map(|e| self.node(&e.target).map(|n| Neighbor::new(n, e.criticality)))
            .collect())
    }

    async fn upstream(&self, name: &str) -> Result<Vec<Neighbor>> {
        Ok(self
            .edges
            .iter()
            .filter(|e| e.target == name)
            .filter_map(|e| self.node(&e.source).map(|n| Neighbor::new(n, e.criticality)))
            .collect())
    }

    async fn services(&self) -> Result<Vec<ServiceNode>> {
        Ok(self.nodes.clone())
    }

    async fn edges(&self) -> Result<Vec<DependencyEdge>> {
        Ok(self.edges.clone())
    }
}
