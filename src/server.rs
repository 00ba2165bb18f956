use std::sync::Arc;

use anyhow::Result;
use axum::{
    extract::{Json, Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use serde::Deserialize;
use serde_json::json;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::advisor::SloAdvisor;
use crate::error::{ContextError, ErrorKind};
use crate::model::ChatMessage;

pub const DEFAULT_METRICS_LIMIT: usize = 100;

pub struct ServerError(ContextError);

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let status = match self.0.kind() {
            ErrorKind::NotFound => StatusCode::NOT_FOUND,
            ErrorKind::InvalidRequest => StatusCode::BAD_REQUEST,
            ErrorKind::BackendUnavailable => StatusCode::SERVICE_UNAVAILABLE,
        };
        if status == StatusCode::SERVICE_UNAVAILABLE {
            warn!(error = %self.0, "backend failure");
        }
        (status, Json(json!({ "detail": self.0.to_string() }))).into_response()
    }
}

impl From<ContextError> for ServerError {
    fn from(err: ContextError) -> Self {
        Self(err)
    }
}

#[derive(Clone)]
pub struct AppState {
    pub advisor: Arc<SloAdvisor>,
}

#[derive(Deserialize)]
struct ChatRequest {
    service_name: String,
    #[serde(default)]
    messages: Vec<ChatMessage>,
}

#[derive(Deserialize)]
struct MetricsQuery {
    limit: Option<usize>,
}

pub fn router(state: AppState) -> Router {
    let api = Router::new()
        .route("/recommend/{service}", get(recommend))
        .route("/chat", post(chat))
        .route("/graph", get(graph))
        .route("/vectors", get(vectors))
        .route("/metrics/all", get(all_metrics))
        .route("/services/{service}", get(service_details))
        .route("/services/{service}/blast-radius", get(blast_radius))
        .route("/services/{service}/context/summary", get(summary_context))
        .route("/services/{service}/context/blast-radius", get(blast_radius_context));

    Router::new()
        .route("/health", get(health))
        .nest("/api/v1", api)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub async fn run_server(state: AppState, addr: &str) -> Result<()> {
    let app = router(state);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("SLO context server listening on http://{}", listener.local_addr()?);
    axum::serve(listener, app).await?;
    Ok(())
}

async fn health() -> impl IntoResponse {
    Json(json!({ "status": "healthy" }))
}

async fn recommend(
    State(state): State<AppState>,
    Path(service): Path<String>,
) -> Result<impl IntoResponse, ServerError> {
    Ok(Json(state.advisor.recommend(&service).await?))
}

async fn chat(
    State(state): State<AppState>,
    Json(request): Json<ChatRequest>,
) -> Result<impl IntoResponse, ServerError> {
    Ok(Json(state.advisor.chat(&request.service_name, &request.messages).await?))
}

async fn graph(State(state): State<AppState>) -> Result<impl IntoResponse, ServerError> {
    Ok(Json(state.advisor.graph().await?))
}

async fn vectors(State(state): State<AppState>) -> Result<impl IntoResponse, ServerError> {
    let documents = state.advisor.vectors().await?;
    Ok(Json(json!({ "documents": documents })))
}

async fn all_metrics(
    State(state): State<AppState>,
    Query(query): Query<MetricsQuery>,
) -> Result<impl IntoResponse, ServerError> {
    let limit = query.limit.unwrap_or(DEFAULT_METRICS_LIMIT);
    let metrics = state.advisor.latest_metrics(limit).await?;
    Ok(Json(json!({ "metrics": metrics })))
}

async fn service_details(
    State(state): State<AppState>,
    Path(service): Path<String>,
) -> Result<impl IntoResponse, ServerError> {
    Ok(Json(state.advisor.get_service_details(&service).await?))
}

async fn blast_radius(
    State(state): State<AppState>,
    Path(service): Path<String>,
) -> Result<impl IntoResponse, ServerError> {
    Ok(Json(state.advisor.get_blast_radius(&service).await?))
}

async fn summary_context(
    State(state): State<AppState>,
    Path(service): Path<String>,
) -> Result<impl IntoResponse, ServerError> {
    Ok(Json(state.advisor.get_summary_context(&service).await?))
}

async fn blast_radius_context(
    State(state): State<AppState>,
    Path(service): Path<String>,
) -> Result<impl IntoResponse, ServerError> {
    Ok(Json(state.advisor.get_blast_radius_context(&service).await?))
}
