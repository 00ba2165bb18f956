//! Neo4j graph store over the HTTP transactional endpoint.
//!
//! Every statement is sent with a separate `parameters` object; service
//! names never end up inside the Cypher text.

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::debug;

use super::GraphStore;
use crate::model::{Criticality, DependencyEdge, Neighbor, ServiceNode};

const SERVICE_QUERY: &str = "\
MATCH (s:Service {name: $service_name}) \
RETURN s.name AS name, s.type AS type, s.tier AS tier";

const DOWNSTREAM_QUERY: &str = "\
MATCH (s:Service {name: $service_name})-[r:DEPENDS_ON]->(d:Service) \
RETURN d.name AS name, d.type AS type, d.tier AS tier, r.criticality AS criticality, d.tier AS target_tier";

const UPSTREAM_QUERY: &str = "\
MATCH (s:Service)-[r:DEPENDS_ON]->(d:Service {name: $service_name}) \
RETURN s.name AS name, s.type AS type, s.tier AS tier, r.criticality AS criticality, d.tier AS target_tier";

const NODES_QUERY: &str = "MATCH (n:Service) RETURN n.name AS name, n.type AS type, n.tier AS tier";

const EDGES_QUERY: &str = "\
MATCH (s:Service)-[r:DEPENDS_ON]->(t:Service) \
RETURN s.name AS source, t.name AS target, r.criticality AS criticality, t.tier AS target_tier";

#[derive(Debug, Deserialize)]
struct TxResponse {
    #[serde(default)]
    results: Vec<TxResult>,
    #[serde(default)]
    errors: Vec<TxError>,
}

#[derive(Debug, Deserialize)]
struct TxResult {
    #[serde(default)]
    data: Vec<TxRow>,
}

#[derive(Debug, Deserialize)]
struct TxRow {
    row: Vec<Value>,
}

#[derive(Debug, Deserialize)]
struct TxError {
    code: String,
    message: String,
}

pub struct Neo4jGraphStore {
    client: Client,
    endpoint: String,
    user: String,
    password: String,
}

impl Neo4jGraphStore {
    pub fn new(base_url: &str, database: &str, user: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            endpoint: format!("{}/db/{}/tx/commit", base_url.trim_end_matches('/'), database),
            user: user.into(),
            password: password.into(),
        }
    }

    async fn run(&self, statement: &str, parameters: Value) -> Result<Vec<Vec<Value>>> {
        let body = json!({
            "statements": [{ "statement": statement, "parameters": parameters }]
        });

        let resp = self
            .client
            .post(&self.endpoint)
            .basic_auth(&self.user, Some(&self.password))
            .json(&body)
            .send()
            .await
            .context("Neo4j request failed")?
            .error_for_status()
            .context("Neo4j returned an error status")?;

        let tx: TxResponse = resp.json().await.context("Malformed Neo4j response")?;
        if let Some(err) = tx.errors.first() {
            bail!("Neo4j error {}: {}", err.code, err.message);
        }

        let rows: Vec<Vec<Value>> = tx
            .results
            .into_iter()
            .next()
            .map(|r| r.data.into_iter().map(|d| d.row).collect())
            .unwrap_or_default();
        debug!(rows = rows.len(), "neo4j statement returned");
        Ok(rows)
    }

    async fn neighbors(&self, statement: &str, name: &str) -> Result<Vec<Neighbor>> {
        let rows = self.run(statement, json!({ "service_name": name })).await?;
        rows.iter().map(|row| neighbor_from_row(row)).collect()
    }
}

fn text(row: &[Value], idx: usize) -> String {
    row.get(idx).and_then(Value::as_str).unwrap_or_default().to_string()
}

/// Edge criticality from column `crit_idx`; derived from the target tier at
/// `tier_idx` when the attribute is missing.
fn criticality(row: &[Value], crit_idx: usize, tier_idx: usize) -> Result<Criticality> {
    match row.get(crit_idx).and_then(Value::as_str) {
        Some(raw) => raw.parse().map_err(anyhow::Error::msg),
        None => Ok(Criticality::for_target_tier(&text(row, tier_idx))),
    }
}

fn node_from_row(row: &[Value]) -> ServiceNode {
    ServiceNode::new(text(row, 0), text(row, 1), text(row, 2))
}

fn neighbor_from_row(row: &[Value]) -> Result<Neighbor> {
    Ok(Neighbor {
        name: text(row, 0),
        service_type: text(row, 1),
        tier: text(row, 2),
        criticality: criticality(row, 3, 4)?,
    })
}

#[async_trait]
impl GraphStore for Neo4jGraphStore {
    async fn service(&self, name: &str) -> Result<Option<ServiceNode>> {
        let rows = self.run(SERVICE_QUERY, json!({ "service_name": name })).await?;
        Ok(rows.first().map(|row| node_from_row(row)))
    }

    async fn downstream(&self, name: &str) -> Result<Vec<Neighbor>> {
        self.neighbors(DOWNSTREAM_QUERY, name).await
    }

    async fn upstream(&self, name: &str) -> Result<Vec<Neighbor>> {
        self.neighbors(UPSTREAM_QUERY, name).await
    }

    async fn services(&self) -> Result<Vec<ServiceNode>> {
        let rows = self.run(NODES_QUERY, json!({})).await?;
        Ok(rows.iter().map(|row| node_from_row(row)).collect())
    }

    async fn edges(&self) -> Result<Vec<DependencyEdge>> {
        let rows = self.run(EDGES_QUERY, json!({})).await?;
        rows.iter()
            .map(|row| {
                Ok(DependencyEdge {
                    source: text(row, 0),
                    target: text(row, 1),
                    criticality: criticality(row, 2, 3)?,
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{extract::State, routing::post, Json, Router};
    use std::sync::{Arc, Mutex};

    type Captured = Arc<Mutex<Vec<Value>>>;

    async fn fake_tx(State(captured): State<Captured>, Json(body): Json<Value>) -> Json<Value> {
        let statement = body["statements"][0]["statement"].as_str().unwrap_or_default().to_string();
        captured.lock().unwrap().push(body);

        let data = if statement.contains("RETURN s.name AS name, s.type AS type, s.tier AS tier")
            && !statement.contains("DEPENDS_ON")
        {
            json!([{ "row": ["CartService", "Microservice", "Tier-1"] }])
        } else if statement.contains("-[r:DEPENDS_ON]->(d:Service {name") {
            json!([
                { "row": ["Frontend", "UI", "Tier-1", "High", "Tier-1"] },
                { "row": ["CheckoutService", "Microservice", "Tier-1", null, "Tier-1"] }
            ])
        } else {
            json!([])
        };
        Json(json!({ "results": [{ "columns": [], "data": data }], "errors": [] }))
    }

    async fn spawn(app: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });
        format!("http://{}", addr)
    }

    #[tokio::test]
    async fn test_queries_are_parameterized() {
        let captured: Captured = Arc::default();
        let app = Router::new()
            .route("/db/neo4j/tx/commit", post(fake_tx))
            .with_state(captured.clone());
        let store = Neo4jGraphStore::new(&spawn(app).await, "neo4j", "neo4j", "password");

        let hostile = "CartService'}) DETACH DELETE s //";
        let _ = store.service(hostile).await.unwrap();

        let bodies = captured.lock().unwrap();
        let statement = bodies[0]["statements"][0]["statement"].as_str().unwrap();
        assert!(!statement.contains(hostile));
        assert_eq!(bodies[0]["statements"][0]["parameters"]["service_name"], hostile);
    }

    #[tokio::test]
    async fn test_upstream_rows_and_missing_criticality() {
        let app = Router::new()
            .route("/db/neo4j/tx/commit", post(fake_tx))
            .with_state(Captured::default());
        let store = Neo4jGraphStore::new(&spawn(app).await, "neo4j", "neo4j", "password");

        let upstream = store.upstream("CartService").await.unwrap();
        assert_eq!(upstream.len(), 2);
        assert_eq!(upstream[0].name, "Frontend");
        assert_eq!(upstream[0].criticality, Criticality::High);
        // No criticality attribute: derived from CartService being Tier-1.
        assert_eq!(upstream[1].criticality, Criticality::High);
    }

    #[tokio::test]
    async fn test_service_lookup() {
        let app = Router::new()
            .route("/db/neo4j/tx/commit", post(fake_tx))
            .with_state(Captured::default());
        let store = Neo4jGraphStore::new(&spawn(app).await, "neo4j", "neo4j", "password");

        let node = store.service("CartService").await.unwrap().unwrap();
        assert_eq!(node.tier, "Tier-1");
    }

    #[tokio::test]
    async fn test_cypher_errors_surface() {
        let app = Router::new().route(
            "/db/neo4j/tx/commit",
            post(|| async {
                Json(json!({
                    "results": [],
                    "errors": [{ "code": "Neo.ClientError.Security.Unauthorized", "message": "bad credentials" }]
                }))
            }),
        );
        let store = Neo4jGraphStore::new(&spawn(app).await, "neo4j", "neo4j", "wrong");

        let err = store.downstream("CartService").await.unwrap_err();
        assert!(err.to_string().contains("Unauthorized"));
    }

    #[tokio::test]
    async fn test_unreachable_store_is_an_error() {
        let store = Neo4jGraphStore::new("http://127.0.0.1:9", "neo4j", "neo4j", "password");
        assert!(store.service("CartService").await.is_err());
    }
}
