//! SQLite metrics store.
//!
//! Reads the `metrics(timestamp, service_name, metric_name, value)` table
//! through one read-only connection opened at startup. All identifiers are
//! bound as parameters.

use std::path::Path;
use std::sync::{Arc, Mutex};

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime};
use rusqlite::{params, params_from_iter, Connection, OpenFlags};
use tokio::task;
use tracing::{debug, warn};

use super::MetricsStore;
use crate::model::MetricSample;

/// Text form the window cutoff is bound in.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Parse the timestamp shapes found in the table.
pub fn parse_timestamp(raw: &str) -> Option<NaiveDateTime> {
    let raw = raw.trim();
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S%.f")
        .or_else(|_| NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f"))
        .ok()
        .or_else(|| DateTime::parse_from_rfc3339(raw).ok().map(|dt| dt.naive_utc()))
}

#[derive(Clone)]
pub struct SqliteMetricsStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteMetricsStore {
    /// Open the database read-only.
    pub async fn open(db_path: impl AsRef<Path>) -> Result<Self> {
        let path = db_path.as_ref().to_path_buf();
        let conn = task::spawn_blocking(move || {
            Connection::open_with_flags(
                &path,
                OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
            )
            .with_context(|| format!("Failed to open metrics database {}", path.display()))
        })
        .await??;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    async fn query(&self, sql: String, values: Vec<String>, since: NaiveDateTime) -> Result<Vec<MetricSample>> {
        let conn = self.conn.clone();
        task::spawn_blocking(move || {
            let conn = conn.lock().map_err(|_| anyhow!("metrics connection poisoned"))?;
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt.query_map(params_from_iter(values.iter()), |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, f64>(3)?,
                ))
            })?;
            collect_samples(rows, Some(since))
        })
        .await?
    }
}

/// Parse rows into samples. With `since`, parsed samples older than the
/// cutoff are dropped: mixed timestamp shapes do not compare correctly as text.
fn collect_samples<I>(rows: I, since: Option<NaiveDateTime>) -> Result<Vec<MetricSample>>
where
    I: Iterator<Item = rusqlite::Result<(String, String, String, f64)>>,
{
    let mut samples = Vec::new();
    for row in rows {
        let (ts, service_name, metric_name, value) = row?;
        match parse_timestamp(&ts) {
            Some(timestamp) if since.is_some_and(|cutoff| timestamp < cutoff) => {}
            Some(timestamp) => samples.push(MetricSample {
                timestamp,
                service_name,
                metric_name,
                value,
            }),
            None => warn!(timestamp = %ts, service = %service_name, "skipping sample with unparseable timestamp"),
        }
    }
    Ok(samples)
}

/// `?1, ?2, ... ?n`
fn placeholders(start: usize, count: usize) -> String {
    (start..start + count)
        .map(|i| format!("?{}", i))
        .collect::<Vec<_>>()
        .join(", ")
}

#[async_trait]
impl MetricsStore for SqliteMetricsStore {
    async fn samples_since(
        &self,
        services: &[String],
        since: NaiveDateTime,
        metric_name: Option<&str>,
    ) -> Result<Vec<MetricSample>> {
        if services.is_empty() {
            return Ok(Vec::new());
        }

        let mut values: Vec<String> = services.to_vec();
        let mut sql = format!(
            "SELECT timestamp, service_name, metric_name, value FROM metrics \
             WHERE service_name IN ({}) AND julianday(timestamp) >= julianday(?{})",
            placeholders(1, services.len()),
            services.len() + 1
        );
        values.push(since.format(TIMESTAMP_FORMAT).to_string());

        if let Some(metric) = metric_name {
            values.push(metric.to_string());
            sql.push_str(&format!(" AND metric_name = ?{}", values.len()));
        }
        sql.push_str(" ORDER BY timestamp ASC");

        let samples = self.query(sql, values, since).await?;
        debug!(services = services.len(), rows = samples.len(), "sqlite window query");
        Ok(samples)
    }

    async fn latest(&self, limit: usize) -> Result<Vec<MetricSample>> {
        let conn = self.conn.clone();
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        task::spawn_blocking(move || {
            let conn = conn.lock().map_err(|_| anyhow!("metrics connection poisoned"))?;
            let mut stmt = conn.prepare(
                "SELECT timestamp, service_name, metric_name, value FROM metrics \
                 ORDER BY timestamp DESC LIMIT ?1",
            )?;
            let rows = stmt.query_map(params![limit], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, f64>(3)?,
                ))
            })?;
            collect_samples(rows, None)
        })
        .await?
    }
}
