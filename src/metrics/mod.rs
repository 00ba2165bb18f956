//! Metrics Window Module
//!
//! Selects a time window of samples across a set of services and keeps only
//! the most recent samples of each (service, metric) series. This is lossy
//! downsampling for prompt size, not statistics.

pub mod sqlite;

pub use sqlite::SqliteMetricsStore;

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{Duration, NaiveDateTime, Utc};
use tracing::debug;

use crate::error::{Backend, ContextError, ContextResult};
use crate::model::MetricSample;

/// Read-only query contract of the metrics store.
#[async_trait]
pub trait MetricsStore: Send + Sync {
    /// Samples for `services` with `timestamp >= since`, optionally restricted to one metric name.
    async fn samples_since(
        &self,
        services: &[String],
        since: NaiveDateTime,
        metric_name: Option<&str>,
    ) -> Result<Vec<MetricSample>>;

    /// Newest samples across all services, newest first.
    async fn latest(&self, limit: usize) -> Result<Vec<MetricSample>>;
}

/// Window length and per-series cap chosen by a call site.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowPolicy {
    pub hours: u32,
    pub max_per_group: usize,
}

impl WindowPolicy {
    /// Single service, long window.
    pub const SUMMARY: WindowPolicy = WindowPolicy { hours: 24, max_per_group: 10 };
    /// Many services, short window and a tighter cap per series.
    pub const BLAST_RADIUS: WindowPolicy = WindowPolicy { hours: 3, max_per_group: 3 };
}

/// Keep the last `max_per_group` samples (by timestamp) of every
/// (service_name, metric_name) series.
///
/// Series keep first-seen order; samples inside a series come out ascending.
pub fn keep_most_recent(samples: Vec<MetricSample>, max_per_group: usize) -> Vec<MetricSample> {
    let mut order: Vec<(String, String)> = Vec::new();
    let mut groups: HashMap<(String, String), Vec<MetricSample>> = HashMap::new();

    for sample in samples {
        let key = (sample.service_name.clone(), sample.metric_name.clone());
        groups
            .entry(key)
            .or_insert_with_key(|k| {
                order.push(k.clone());
                Vec::new()
            })
            .push(sample);
    }

    let mut kept = Vec::new();
    for key in order {
        if let Some(mut series) = groups.remove(&key) {
            series.sort_by(|a, b| a.timestamp.cmp(&b.timestamp));
            let skip = series.len().saturating_sub(max_per_group);
            kept.extend(series.into_iter().skip(skip));
        }
    }
    kept
}

/// Downsampled window plus the raw sample count it was cut from.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MetricsWindow {
    pub samples: Vec<MetricSample>,
    /// Samples in the window before per-series truncation.
    pub fetched: usize,
}

/// Fetches and downsamples metric windows from an injected [`MetricsStore`].
#[derive(Clone)]
pub struct MetricsWindowAggregator {
    store: Arc<dyn MetricsStore>,
}

impl MetricsWindowAggregator {
    pub fn new(store: Arc<dyn MetricsStore>) -> Self {
        Self { store }
    }

    /// Samples from the last `window_hours` for every service in `services`,
    /// capped at `max_per_group` per series. An empty set returns nothing
    /// without touching the store.
    pub async fn fetch_window(
        &self,
        services: &BTreeSet<String>,
        window_hours: u32,
        max_per_group: usize,
        metric_name: Option<&str>,
    ) -> ContextResult<Vec<MetricSample>> {
        Ok(self
            .window(services, window_hours, max_per_group, metric_name)
            .await?
            .samples)
    }

    /// Like [`fetch_window`](Self::fetch_window), also reporting how many
    /// samples the window held before downsampling.
    pub async fn window(
        &self,
        services: &BTreeSet<String>,
        window_hours: u32,
        max_per_group: usize,
        metric_name: Option<&str>,
    ) -> ContextResult<MetricsWindow> {
        if services.is_empty() {
            return Ok(MetricsWindow::default());
        }

        let since = Utc::now().naive_utc() - Duration::hours(i64::from(window_hours));
        let names: Vec<String> = services.iter().cloned().collect();
        let raw = self
            .store
            .samples_since(&names, since, metric_name)
            .await
            .map_err(|e| ContextError::backend(Backend::Metrics, e))?;

        let fetched = raw.len();
        let samples = keep_most_recent(raw, max_per_group);
        debug!(services = names.len(), fetched, kept = samples.len(), window_hours, "metrics window");
        Ok(MetricsWindow { samples, fetched })
    }

    /// [`window`](Self::window) with a named policy.
    pub async fn fetch_with(
        &self,
        services: &BTreeSet<String>,
        policy: WindowPolicy,
    ) -> ContextResult<MetricsWindow> {
        self.window(services, policy.hours, policy.max_per_group, None).await
    }

    /// Newest samples across the store, for inspection tooling.
    pub async fn latest(&self, limit: usize) -> ContextResult<Vec<MetricSample>> {
        self.store
            .latest(limit)
            .await
            .map_err(|e| ContextError::backend(Backend::Metrics, e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn at(minutes: i64) -> NaiveDateTime {
        Utc::now().naive_utc() - Duration::minutes(minutes)
    }

    fn sample(minutes_ago: i64, service: &str, metric: &str, value: f64) -> MetricSample {
        MetricSample::new(at(minutes_ago), service, metric, value)
    }

    #[test]
    fn test_truncation_keeps_most_recent_ascending() {
        // Deliberately out of order.
        let samples = vec![
            sample(10, "PaymentService", "latency_p95", 3.0),
            sample(50, "PaymentService", "latency_p95", 1.0),
            sample(5, "PaymentService", "latency_p95", 4.0),
            sample(30, "PaymentService", "latency_p95", 2.0),
            sample(1, "PaymentService", "latency_p95", 5.0),
        ];

        let kept = keep_most_recent(samples, 3);
        let values: Vec<f64> = kept.iter().map(|s| s.value).collect();
        assert_eq!(values, vec![3.0, 4.0, 5.0]);
        assert!(kept.windows(2).all(|w| w[0].timestamp <= w[1].timestamp));
    }

    #[test]
    fn test_small_groups_are_untouched() {
        let samples = vec![
            sample(2, "CartService", "error_rate", 0.1),
            sample(1, "CartService", "error_rate", 0.2),
        ];
        assert_eq!(keep_most_recent(samples, 10).len(), 2);
    }

    #[test]
    fn test_groups_are_not_interleaved() {
        let samples = vec![
            sample(4, "A", "latency_p95", 1.0),
            sample(4, "B", "latency_p95", 10.0),
            sample(3, "A", "latency_p95", 2.0),
            sample(3, "A", "error_rate", 0.5),
            sample(2, "B", "latency_p95", 20.0),
        ];

        let kept = keep_most_recent(samples, 5);
        let keys: Vec<(&str, &str)> = kept
            .iter()
            .map(|s| (s.service_name.as_str(), s.metric_name.as_str()))
            .collect();
        assert_eq!(
            keys,
            vec![
                ("A", "latency_p95"),
                ("A", "latency_p95"),
                ("B", "latency_p95"),
                ("B", "latency_p95"),
                ("A", "error_rate"),
            ]
        );
    }

    #[test]
    fn test_group_key_is_service_and_metric() {
        let samples = vec![
            sample(3, "A", "latency_p95", 1.0),
            sample(2, "A", "throughput", 2.0),
            sample(1, "B", "latency_p95", 3.0),
        ];
        assert_eq!(keep_most_recent(samples, 1).len(), 3);
    }

    struct CountingStore {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl MetricsStore for CountingStore {
        async fn samples_since(&self, _: &[String], _: NaiveDateTime, _: Option<&str>) -> Result<Vec<MetricSample>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(Vec::new())
        }

        async fn latest(&self, _: usize) -> Result<Vec<MetricSample>> {
            Ok(Vec::new())
        }
    }

    #[tokio::test]
    async fn test_empty_service_set_skips_the_store() {
        let store = Arc::new(CountingStore { calls: AtomicUsize::new(0) });
        let aggregator = MetricsWindowAggregator::new(store.clone());

        let samples = aggregator.fetch_window(&BTreeSet::new(), 24, 10, None).await.unwrap();
        assert!(samples.is_empty());
        assert_eq!(store.calls.load(Ordering::SeqCst), 0);
    }

    struct Burst(usize);

    #[async_trait]
    impl MetricsStore for Burst {
        async fn samples_since(&self, _: &[String], _: NaiveDateTime, _: Option<&str>) -> Result<Vec<MetricSample>> {
            Ok((0..self.0).map(|i| sample(i as i64, "PaymentService", "latency_p95", i as f64)).collect())
        }

        async fn latest(&self, _: usize) -> Result<Vec<MetricSample>> {
            Ok(Vec::new())
        }
    }

    #[tokio::test]
    async fn test_window_reports_raw_count_before_truncation() {
        let aggregator = MetricsWindowAggregator::new(Arc::new(Burst(20)));
        let services = BTreeSet::from(["PaymentService".to_string()]);

        let window = aggregator.fetch_with(&services, WindowPolicy::SUMMARY).await.unwrap();
        assert_eq!(window.fetched, 20);
        assert_eq!(window.samples.len(), 10);
    }

    #[test]
    fn test_policies() {
        assert_eq!(WindowPolicy::SUMMARY, WindowPolicy { hours: 24, max_per_group: 10 });
        assert_eq!(WindowPolicy::BLAST_RADIUS, WindowPolicy { hours: 3, max_per_group: 3 });
    }
}
