//! Chroma vector store over its HTTP API.
//!
//! A missing collection is an empty corpus, not a failure. Transport errors
//! and other error statuses are failures, a missing tenant included.

use std::collections::BTreeMap;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::{json, Map, Value};
use tracing::{debug, info};

use super::{QueryEmbedder, RunbookStore};
use crate::model::RunbookDocument;

#[derive(Debug, Deserialize)]
struct CollectionInfo {
    id: String,
}

#[derive(Debug, Deserialize)]
struct QueryResponse {
    #[serde(default)]
    ids: Vec<Vec<String>>,
    #[serde(default)]
    documents: Option<Vec<Vec<Option<String>>>>,
    #[serde(default)]
    metadatas: Option<Vec<Vec<Option<Map<String, Value>>>>>,
}

#[derive(Debug, Deserialize)]
struct GetResponse {
    #[serde(default)]
    ids: Vec<String>,
    #[serde(default)]
    documents: Option<Vec<Option<String>>>,
    #[serde(default)]
    metadatas: Option<Vec<Option<Map<String, Value>>>>,
}

pub struct ChromaRunbookStore {
    client: Client,
    base_url: String,
    collection: String,
    embedder: Arc<dyn QueryEmbedder>,
}

impl ChromaRunbookStore {
    pub fn new(base_url: &str, collection: impl Into<String>, embedder: Arc<dyn QueryEmbedder>) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            collection: collection.into(),
            embedder,
        }
    }

    /// Id of the configured collection, `None` when it does not exist.
    async fn collection_id(&self) -> Result<Option<String>> {
        let resp = self
            .client
            .get(format!("{}/api/v1/collections/{}", self.base_url, self.collection))
            .send()
            .await
            .context("Chroma request failed")?;

        let status = resp.status();
        if status.is_success() {
            let info: CollectionInfo = resp.json().await.context("Malformed Chroma collection response")?;
            return Ok(Some(info.id));
        }

        let body = resp.text().await.unwrap_or_default();
        if reports_missing_collection(status, &body, &self.collection) {
            info!(collection = %self.collection, "runbook collection missing, treating corpus as empty");
            return Ok(None);
        }
        bail!("Chroma returned {}: {}", status, body)
    }
}

/// Whether an error response means the collection itself is absent.
///
/// Older servers answer a missing collection with a 500 carrying a
/// ValueError, so the message is matched as well as the status. A missing
/// tenant or database is a misconfiguration, not an empty corpus.
fn reports_missing_collection(status: StatusCode, body: &str, collection: &str) -> bool {
    if body.contains(&format!("Collection {} does not exist", collection)) {
        return true;
    }
    status == StatusCode::NOT_FOUND && !body.contains("does not exist")
}

fn metadata_strings(meta: Option<Map<String, Value>>) -> BTreeMap<String, String> {
    meta.unwrap_or_default()
        .into_iter()
        .map(|(k, v)| {
            let v = match v {
                Value::String(s) => s,
                other => other.to_string(),
            };
            (k, v)
        })
        .collect()
}

fn assemble(
    ids: Vec<String>,
    documents: Option<Vec<Option<String>>>,
    metadatas: Option<Vec<Option<Map<String, Value>>>>,
) -> Vec<RunbookDocument> {
    let mut documents = documents.unwrap_or_default().into_iter();
    let mut metadatas = metadatas.unwrap_or_default().into_iter();
    ids.into_iter()
        .map(|id| RunbookDocument {
            id,
            text: documents.next().flatten().unwrap_or_default(),
            metadata: metadata_strings(metadatas.next().flatten()),
        })
        .collect()
}

#[async_trait]
impl RunbookStore for ChromaRunbookStore {
    async fn query(&self, text: &str, top_k: usize) -> Result<Vec<RunbookDocument>> {
        let Some(id) = self.collection_id().await? else {
            return Ok(Vec::new());
        };

        let embedding = self.embedder.embed(text).await.context("Failed to embed runbook query")?;
        let body = json!({
            "query_embeddings": [embedding],
            "n_results": top_k,
            "include": ["documents", "metadatas", "distances"],
        });

        let resp: QueryResponse = self
            .client
            .post(format!("{}/api/v1/collections/{}/query", self.base_url, id))
            .json(&body)
            .send()
            .await
            .context("Chroma query failed")?
            .error_for_status()
            .context("Chroma query returned an error status")?
            .json()
            .await
            .context("Malformed Chroma query response")?;

        // One query embedding in, so one result list out.
        let docs = assemble(
            resp.ids.into_iter().next().unwrap_or_default(),
            resp.documents.and_then(|d| d.into_iter().next()),
            resp.metadatas.and_then(|m| m.into_iter().next()),
        );
        debug!(hits = docs.len(), "chroma query");
        Ok(docs)
    }

    async fn list(&self, limit: usize) -> Result<Vec<RunbookDocument>> {
        let Some(id) = self.collection_id().await? else {
            return Ok(Vec::new());
        };

        let resp: GetResponse = self
            .client
            .post(format!("{}/api/v1/collections/{}/get", self.base_url, id))
            .json(&json!({ "limit": limit, "include": ["documents", "metadatas"] }))
            .send()
            .await
            .context("Chroma get failed")?
            .error_for_status()
            .context("Chroma get returned an error status")?
            .json()
            .await
            .context("Malformed Chroma get response")?;

        Ok(assemble(resp.ids, resp.documents, resp.metadatas))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        http::StatusCode as HttpStatus,
        routing::{get, post},
        Json, Router,
    };

    struct ZeroEmbedder;

    #[async_trait]
    impl QueryEmbedder for ZeroEmbedder {
        async fn embed(&self, _text: &str) -> Result<Vec<f32>> {
            Ok(vec![0.0; 4])
        }
    }

    async fn spawn(app: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });
        format!("http://{}", addr)
    }

    fn store(base: &str) -> ChromaRunbookStore {
        ChromaRunbookStore::new(base, "runbooks", Arc::new(ZeroEmbedder))
    }

    #[tokio::test]
    async fn test_missing_collection_is_empty() {
        let app = Router::new().route(
            "/api/v1/collections/runbooks",
            get(|| async { (HttpStatus::NOT_FOUND, Json(json!({ "error": "NotFoundError" }))) }),
        );
        let store = store(&spawn(app).await);

        assert!(store.query("PaymentService latency error failure", 3).await.unwrap().is_empty());
        assert!(store.list(100).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_legacy_missing_collection_error_is_empty() {
        let app = Router::new().route(
            "/api/v1/collections/runbooks",
            get(|| async {
                (
                    HttpStatus::INTERNAL_SERVER_ERROR,
                    Json(json!({ "error": "ValueError('Collection runbooks does not exist.')" })),
                )
            }),
        );
        assert!(store(&spawn(app).await).query("x", 3).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_other_error_status_fails() {
        let app = Router::new().route(
            "/api/v1/collections/runbooks",
            get(|| async { (HttpStatus::INTERNAL_SERVER_ERROR, "disk full") }),
        );
        assert!(store(&spawn(app).await).query("x", 3).await.is_err());
    }

    #[tokio::test]
    async fn test_missing_tenant_or_database_fails() {
        let app = Router::new().route(
            "/api/v1/collections/runbooks",
            get(|| async {
                (
                    HttpStatus::INTERNAL_SERVER_ERROR,
                    Json(json!({ "error": "ValueError('Tenant default_tenant does not exist.')" })),
                )
            }),
        );
        let err = store(&spawn(app).await).list(100).await.unwrap_err();
        assert!(err.to_string().contains("Tenant default_tenant does not exist"));

        let app = Router::new().route(
            "/api/v1/collections/runbooks",
            get(|| async {
                (
                    HttpStatus::NOT_FOUND,
                    Json(json!({ "error": "Database default_database does not exist." })),
                )
            }),
        );
        assert!(store(&spawn(app).await).query("x", 3).await.is_err());
    }

    #[test]
    fn test_missing_collection_message_names_this_collection() {
        let body = "ValueError('Collection runbooks does not exist.')";
        assert!(reports_missing_collection(StatusCode::INTERNAL_SERVER_ERROR, body, "runbooks"));
        assert!(!reports_missing_collection(StatusCode::INTERNAL_SERVER_ERROR, body, "postmortems"));
        assert!(reports_missing_collection(StatusCode::NOT_FOUND, "", "runbooks"));
        assert!(!reports_missing_collection(StatusCode::BAD_GATEWAY, "", "runbooks"));
    }

    #[tokio::test]
    async fn test_query_unwraps_first_result_list() {
        let app = Router::new()
            .route(
                "/api/v1/collections/runbooks",
                get(|| async { Json(json!({ "id": "c-1", "name": "runbooks" })) }),
            )
            .route(
                "/api/v1/collections/c-1/query",
                post(|Json(body): Json<Value>| async move {
                    assert_eq!(body["n_results"], 2);
                    Json(json!({
                        "ids": [["rb_001", "rb_002"]],
                        "documents": [["PaymentService High Latency: check pool", "PaymentService Error Rate > 1%"]],
                        "metadatas": [[{ "type": "latency", "service": "PaymentService" }, null]],
                        "distances": [[0.1, 0.2]]
                    }))
                }),
            );
        let docs = store(&spawn(app).await).query("PaymentService latency error failure", 2).await.unwrap();

        assert_eq!(docs.len(), 2);
        assert_eq!(docs[0].id, "rb_001");
        assert_eq!(docs[0].metadata.get("type").map(String::as_str), Some("latency"));
        assert!(docs[1].metadata.is_empty());
    }

    #[tokio::test]
    async fn test_list_returns_ids_and_metadata() {
        let app = Router::new()
            .route(
                "/api/v1/collections/runbooks",
                get(|| async { Json(json!({ "id": "c-1", "name": "runbooks" })) }),
            )
            .route(
                "/api/v1/collections/c-1/get",
                post(|| async {
                    Json(json!({
                        "ids": ["rb_005"],
                        "documents": ["Redis High Memory Usage"],
                        "metadatas": [{ "type": "saturation", "priority": 2 }]
                    }))
                }),
            );
        let docs = store(&spawn(app).await).list(100).await.unwrap();

        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0].text, "Redis High Memory Usage");
        assert_eq!(docs[0].metadata["priority"], "2");
    }
}
