//! Domain types shared by the resolver, aggregator, retriever and composer.
//!
//! All of these are read-only views over the backing stores. Nothing here is
//! persisted by the serving path.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// The tier label that marks a service as most critical.
pub const TOP_TIER: &str = "Tier-1";

/// A service in the dependency graph.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceNode {
    pub name: String,
    #[serde(rename = "type")]
    pub service_type: String,
    /// Ordinal criticality class, e.g. `Tier-1` .. `Tier-3`.
    pub tier: String,
}

impl ServiceNode {
    pub fn new(name: impl Into<String>, service_type: impl Into<String>, tier: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            service_type: service_type.into(),
            tier: tier.into(),
        }
    }

    /// Numeric rank of the tier (`Tier-1` -> 1). `None` for labels that don't follow the pattern.
    pub fn tier_rank(&self) -> Option<u8> {
        self.tier.strip_prefix("Tier-")?.parse().ok()
    }
}

/// Importance of a dependency edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Criticality {
    High,
    Low,
}

impl Criticality {
    /// Criticality an edge gets when it points at a service of the given tier.
    pub fn for_target_tier(tier: &str) -> Self {
        if tier == TOP_TIER {
            Criticality::High
        } else {
            Criticality::Low
        }
    }
}

impl fmt::Display for Criticality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Criticality::High => write!(f, "High"),
            Criticality::Low => write!(f, "Low"),
        }
    }
}

impl FromStr for Criticality {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "high" => Ok(Criticality::High),
            "low" => Ok(Criticality::Low),
            other => Err(format!("unknown criticality '{}'", other)),
        }
    }
}

/// A directly connected service, seen from the service being resolved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Neighbor {
    pub name: String,
    #[serde(rename = "type")]
    pub service_type: String,
    pub tier: String,
    pub criticality: Criticality,
}

impl Neighbor {
    pub fn new(node: &ServiceNode, criticality: Criticality) -> Self {
        Self {
            name: node.name.clone(),
            service_type: node.service_type.clone(),
            tier: node.tier.clone(),
            criticality,
        }
    }
}

/// Directed `source -> target` dependency.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DependencyEdge {
    pub source: String,
    pub target: String,
    pub criticality: Criticality,
}

impl DependencyEdge {
    pub fn new(source: impl Into<String>, target: impl Into<String>, criticality: Criticality) -> Self {
        Self {
            source: source.into(),
            target: target.into(),
            criticality,
        }
    }
}

/// Whole topology, used by inspection tooling.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ServiceGraph {
    pub nodes: Vec<ServiceNode>,
    pub edges: Vec<DependencyEdge>,
}

/// One timestamped metric reading.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricSample {
    pub timestamp: NaiveDateTime,
    pub service_name: String,
    pub metric_name: String,
    pub value: f64,
}

impl MetricSample {
    pub fn new(
        timestamp: NaiveDateTime,
        service_name: impl Into<String>,
        metric_name: impl Into<String>,
        value: f64,
    ) -> Self {
        Self {
            timestamp,
            service_name: service_name.into(),
            metric_name: metric_name.into(),
            value,
        }
    }
}

/// An operational runbook from the vector store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunbookDocument {
    pub id: String,
    pub text: String,
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
}

/// Role of a conversation turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::System => write!(f, "system"),
            Role::User => write!(f, "user"),
            Role::Assistant => write!(f, "assistant"),
        }
    }
}

/// A single turn of conversation history supplied by the caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self { role: Role::System, content: content.into() }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self { role: Role::User, content: content.into() }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self { role: Role::Assistant, content: content.into() }
    }
}
