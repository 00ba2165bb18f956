//! Runtime configuration, read from the environment (and `.env` via dotenv in `main`).

use std::time::Duration;

use anyhow::{Context, Result};

/// Settings for the composition root. Every field has a default so a bare
/// local setup (Neo4j, Chroma, SQLite and Ollama on their usual ports) works.
#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub neo4j_uri: String,
    pub neo4j_user: String,
    pub neo4j_password: String,
    pub neo4j_database: String,
    pub chroma_url: String,
    pub runbook_collection: String,
    pub runbook_top_k: usize,
    pub sqlite_db_path: String,
    pub ollama_url: String,
    /// When set, generation goes to an OpenAI-compatible endpoint instead of Ollama.
    pub llm_provider_url: Option<String>,
    pub llm_api_key: Option<String>,
    pub llm_model: String,
    pub generation_timeout: Duration,
    pub server_addr: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            neo4j_uri: "http://localhost:7474".to_string(),
            neo4j_user: "neo4j".to_string(),
            neo4j_password: "password".to_string(),
            neo4j_database: "neo4j".to_string(),
            chroma_url: "http://localhost:8001".to_string(),
            runbook_collection: "runbooks".to_string(),
            runbook_top_k: 3,
            sqlite_db_path: "./metrics.db".to_string(),
            ollama_url: "http://localhost:11434".to_string(),
            llm_provider_url: None,
            llm_api_key: None,
            llm_model: "mistral".to_string(),
            generation_timeout: Duration::from_secs(120),
            server_addr: "0.0.0.0:8000".to_string(),
        }
    }
}

impl Settings {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build settings from an arbitrary key lookup. Empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let defaults = Settings::default();

        let runbook_top_k = match get("RUNBOOK_TOP_K") {
            Some(v) => v.trim().parse().with_context(|| format!("RUNBOOK_TOP_K is not a number: {}", v))?,
            None => defaults.runbook_top_k,
        };
        let generation_timeout = match get("GENERATION_TIMEOUT_SECS") {
            Some(v) => Duration::from_secs(
                v.trim().parse().with_context(|| format!("GENERATION_TIMEOUT_SECS is not a number: {}", v))?,
            ),
            None => defaults.generation_timeout,
        };

        Ok(Self {
            neo4j_uri: get("NEO4J_URI").unwrap_or(defaults.neo4j_uri),
            neo4j_user: get("NEO4J_USER").unwrap_or(defaults.neo4j_user),
            neo4j_password: get("NEO4J_PASSWORD").unwrap_or(defaults.neo4j_password),
            neo4j_database: get("NEO4J_DATABASE").unwrap_or(defaults.neo4j_database),
            chroma_url: get("CHROMA_URL").unwrap_or(defaults.chroma_url),
            runbook_collection: get("RUNBOOK_COLLECTION").unwrap_or(defaults.runbook_collection),
            runbook_top_k,
            sqlite_db_path: get("SQLITE_DB_PATH").unwrap_or(defaults.sqlite_db_path),
            ollama_url: get("OLLAMA_URL").unwrap_or(defaults.ollama_url),
            llm_provider_url: get("LLM_PROVIDER_URL"),
            llm_api_key: get("LLM_API_KEY"),
            llm_model: get("LLM_MODEL").unwrap_or(defaults.llm_model),
            generation_timeout,
            server_addr: get("SERVER_ADDR").unwrap_or(defaults.server_addr),
        })
    }
}
