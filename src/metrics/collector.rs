//! Metrics collector - thread-safe collection of tagged metric series

use super::types::{
    MetricKind, MetricSelector, Observation, SeriesKey, SeriesValue, SystemMetrics, Tags,
};
use crate::error::MetricError;
use parking_lot::{Mutex, RwLock};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;
use sysinfo::{CpuRefreshKind, MemoryRefreshKind, RefreshKind, System};
use tokio::time::Instant;

/// Shared registry of every metric recorded during one run.
///
/// Cloning is cheap; all clones write into the same series. Each series has
/// its own lock so concurrent virtual users only contend when they record
/// into the same series.
#[derive(Clone)]
pub struct MetricsCollector {
    kinds: Arc<RwLock<BTreeMap<String, MetricKind>>>,
    series: Arc<RwLock<HashMap<SeriesKey, Arc<Mutex<SeriesValue>>>>>,
    system: Arc<RwLock<System>>,
    system_metrics: Arc<RwLock<SystemMetrics>>,
    start_time: Instant,
}

impl MetricsCollector {
    pub fn new() -> Self {
        let system = System::new_with_specifics(
            RefreshKind::new()
                .with_cpu(CpuRefreshKind::everything())
                .with_memory(MemoryRefreshKind::everything()),
        );

        Self {
            kinds: Arc::new(RwLock::new(BTreeMap::new())),
            series: Arc::new(RwLock::new(HashMap::new())),
            system: Arc::new(RwLock::new(system)),
            system_metrics: Arc::new(RwLock::new(SystemMetrics::default())),
            start_time: Instant::now(),
        }
    }

    /// Declare a metric so it shows up (with zero samples) even if nothing
    /// ever records into it.
    pub fn register(&self, name: &str, kind: MetricKind) -> Result<(), MetricError> {
        let mut kinds = self.kinds.write();
        match kinds.get(name) {
            Some(existing) if *existing != kind => Err(MetricError::KindMismatch {
                name: name.to_string(),
                expected: existing.as_str(),
                actual: kind.as_str(),
            }),
            Some(_) => Ok(()),
            None => {
                kinds.insert(name.to_string(), kind);
                Ok(())
            }
        }
    }

    pub fn kind_of(&self, name: &str) -> Option<MetricKind> {
        self.kinds.read().get(name).copied()
    }

    /// Append one observation to the series `name{tags}`.
    ///
    /// Unregistered metrics are registered with the observation's kind.
    pub fn record(
        &self,
        name: &str,
        tags: &Tags,
        observation: Observation,
    ) -> Result<(), MetricError> {
        let kind = observation.kind();
        match self.kind_of(name) {
            Some(existing) if existing != kind => {
                return Err(MetricError::KindMismatch {
                    name: name.to_string(),
                    expected: existing.as_str(),
                    actual: kind.as_str(),
                });
            }
            Some(_) => {}
            None => self.register(name, kind)?,
        }

        let key = SeriesKey::new(name, tags.clone());
        let series = self.series.read().get(&key).cloned();
        let series = match series {
            Some(series) => series,
            None => self
                .series
                .write()
                .entry(key)
                .or_insert_with(|| Arc::new(Mutex::new(SeriesValue::empty(kind))))
                .clone(),
        };

        series.lock().apply(observation);
        Ok(())
    }

    /// Like [`record`](Self::record) but logs instead of returning the error.
    pub fn emit(&self, name: &str, tags: &Tags, observation: Observation) {
        if let Err(e) = self.record(name, tags, observation) {
            tracing::warn!("Dropped observation: {}", e);
        }
    }

    pub fn add_counter(&self, name: &str, tags: &Tags, value: f64) {
        self.emit(name, tags, Observation::Counter(value));
    }

    pub fn add_rate(&self, name: &str, tags: &Tags, value: bool) {
        self.emit(name, tags, Observation::Rate(value));
    }

    pub fn add_trend(&self, name: &str, tags: &Tags, value: f64) {
        self.emit(name, tags, Observation::Trend(value));
    }

    /// Consistent copy of every series.
    ///
    /// Each series is copied under its own lock, so no torn update is ever
    /// visible; writers to other series are not blocked.
    pub fn snapshot(&self) -> MetricsSnapshot {
        let kinds = self.kinds.read().clone();
        let handles: Vec<(SeriesKey, Arc<Mutex<SeriesValue>>)> = self
            .series
            .read()
            .iter()
            .map(|(k, v)| (k.clone(), Arc::clone(v)))
            .collect();

        let series = handles
            .into_iter()
            .map(|(key, value)| {
                let value = value.lock().clone();
                (key, value)
            })
            .collect();

        MetricsSnapshot {
            kinds,
            series,
            elapsed: self.start_time.elapsed(),
        }
    }

    /// Update system metrics (CPU, memory)
    pub fn update_system_metrics(&self) {
        let mut system = self.system.write();
        system.refresh_cpu_all();
        system.refresh_memory();

        let mut metrics = self.system_metrics.write();
        metrics.cpu_usage = system.global_cpu_usage();
        metrics.memory_used_mb = system.used_memory() / 1024 / 1024;
        metrics.memory_total_mb = system.total_memory() / 1024 / 1024;
    }

    pub fn system_metrics(&self) -> SystemMetrics {
        self.system_metrics.read().clone()
    }

    pub fn elapsed(&self) -> Duration {
        self.start_time.elapsed()
    }
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new()
    }
}

/// Frozen view of the collector at one instant.
#[derive(Debug, Clone)]
pub struct MetricsSnapshot {
    pub kinds: BTreeMap<String, MetricKind>,
    pub series: BTreeMap<SeriesKey, SeriesValue>,
    pub elapsed: Duration,
}

impl MetricsSnapshot {
    /// Merge every series matched by `selector`.
    ///
    /// Returns `None` for a metric that was never registered. A registered
    /// metric with no matching series yields an empty value.
    pub fn select(&self, selector: &MetricSelector) -> Option<SeriesValue> {
        let kind = *self.kinds.get(&selector.name)?;
        let mut merged = SeriesValue::empty(kind);
        for (key, value) in &self.series {
            if selector.matches(key) {
                merged.merge(value);
            }
        }
        Some(merged)
    }

    /// Aggregate over every tag combination of `name`.
    pub fn metric(&self, name: &str) -> Option<SeriesValue> {
        self.select(&MetricSelector {
            name: name.to_string(),
            tags: Tags::new(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::types::{rate, AggregateSummary};

    fn tags(pairs: &[(&str, &str)]) -> Tags {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_rate_is_order_independent() {
        let forward = MetricsCollector::new();
        let backward = MetricsCollector::new();
        let observations = [true, true, false, true, false, true, true];

        for v in observations {
            forward.add_rate("errors", &Tags::new(), v);
        }
        for v in observations.iter().rev() {
            backward.add_rate("errors", &Tags::new(), *v);
        }

        let read = |c: &MetricsCollector| match c.snapshot().metric("errors") {
            Some(SeriesValue::Rate { passes, total }) => rate(passes, total),
            other => panic!("unexpected {:?}", other),
        };
        assert_eq!(read(&forward), 5.0 / 7.0);
        assert_eq!(read(&forward), read(&backward));
    }

    #[test]
    fn test_kind_mismatch_is_rejected() {
        let collector = MetricsCollector::new();
        collector.register("latency", MetricKind::Trend).unwrap();

        let err = collector
            .record("latency", &Tags::new(), Observation::Rate(true))
            .unwrap_err();
        assert!(matches!(err, MetricError::KindMismatch { .. }));
        assert!(collector.register("latency", MetricKind::Counter).is_err());
    }

    #[test]
    fn test_registered_metric_without_samples_selects_empty() {
        let collector = MetricsCollector::new();
        collector.register("checkout_errors", MetricKind::Rate).unwrap();

        let snapshot = collector.snapshot();
        assert_eq!(snapshot.metric("checkout_errors").unwrap().samples(), 0);
        assert!(snapshot.metric("never_declared").is_none());
    }

    #[test]
    fn test_select_merges_matching_series() {
        let collector = MetricsCollector::new();
        collector.add_trend("http_req_duration", &tags(&[("type", "page")]), 100.0);
        collector.add_trend("http_req_duration", &tags(&[("type", "page")]), 300.0);
        collector.add_trend("http_req_duration", &tags(&[("type", "api")]), 900.0);

        let snapshot = collector.snapshot();
        let pages = snapshot
            .select(&MetricSelector::parse("http_req_duration{type:page}").unwrap())
            .unwrap();
        let all = snapshot.metric("http_req_duration").unwrap();

        assert_eq!(pages.samples(), 2);
        assert_eq!(all.samples(), 3);
        let AggregateSummary::Trend(stats) = pages.summarize(1.0) else {
            panic!("expected trend");
        };
        assert!((stats.avg - 200.0).abs() < 1.0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_writers_lose_no_updates() {
        let collector = MetricsCollector::new();
        let mut handles = Vec::new();

        for worker in 0..8 {
            let collector = collector.clone();
            handles.push(tokio::spawn(async move {
                let tags = tags(&[("vu", &worker.to_string())]);
                for i in 0..1000 {
                    collector.add_counter("http_reqs", &Tags::new(), 1.0);
                    collector.add_rate("checks", &tags, i % 2 == 0);
                }
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        let snapshot = collector.snapshot();
        assert!(matches!(
            snapshot.metric("http_reqs"),
            Some(SeriesValue::Counter { sum, samples: 8000 }) if sum == 8000.0
        ));
        assert!(matches!(
            snapshot.metric("checks"),
            Some(SeriesValue::Rate { passes: 4000, total: 8000 })
        ));
    }
}
