//! SLO Context Aggregation Engine
//!
//! Assembles a bounded, fresh operational context for one service:
//! - One-hop dependency resolution over a graph store (Neo4j)
//! - Windowed, per-series downsampling of metrics (SQLite)
//! - Top-K runbook retrieval from a vector store (Chroma + fastembed)
//! - Prompt rendering and a timeout-bounded generation boundary (Ollama / OpenAI-compatible)

pub mod advisor;
pub mod config;
pub mod context;
pub mod error;
pub mod generation;
pub mod graph;
pub mod metrics;
pub mod model;
pub mod runbooks;
pub mod server;

// Re-exports for convenience
pub use advisor::{ChatReply, SloAdvisor, SloRecommendation};
pub use config::Settings;
pub use context::{ContextBundle, ContextComposer, ContextMode};
pub use error::{ContextError, ContextResult, ErrorKind};
pub use graph::DependencyResolver;
pub use metrics::MetricsWindowAggregator;
pub use runbooks::RunbookRetriever;
