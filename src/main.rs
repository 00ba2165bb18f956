//! SLO Context Aggregation Engine
//!
//! HTTP entry point: reads settings from the environment, connects the
//! graph, metrics, runbook and generation backends, and serves `/api/v1`.

use std::sync::Arc;

use anyhow::Result;
use tracing::info;
use tracing_subscriber::EnvFilter;

use slo_context::server::{run_server, AppState};
use slo_context::{Settings, SloAdvisor};

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables
    dotenv::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("slo_context=info,tower_http=info")),
        )
        .with_target(true)
        .with_file(true)
        .with_line_number(true)
        .init();

    let settings = Settings::from_env()?;
    info!(
        neo4j = %settings.neo4j_uri,
        chroma = %settings.chroma_url,
        sqlite = %settings.sqlite_db_path,
        model = %settings.llm_model,
        "starting SLO context engine"
    );

    let advisor = SloAdvisor::from_settings(&settings).await?;
    let state = AppState {
        advisor: Arc::new(advisor),
    };

    run_server(state, &settings.server_addr).await
}
