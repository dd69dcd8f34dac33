//! Final outcome of a run, printed at the end and optionally exported as JSON.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::metrics::names::CHECKS;
use crate::metrics::{AggregateSummary, MetricKind, MetricsSnapshot, SeriesValue, Tags};
use crate::thresholds::ThresholdOutcome;
use crate::{EXIT_OK, EXIT_THRESHOLDS_FAILED};

#[derive(Debug, Clone, Serialize)]
pub struct MetricSummary {
    pub name: String,
    pub kind: MetricKind,
    #[serde(skip_serializing_if = "Tags::is_empty")]
    pub tags: Tags,
    pub aggregate: AggregateSummary,
}

/// Pass/fail counts for one check, across every step that declared it.
#[derive(Debug, Clone, Serialize)]
pub struct CheckSummary {
    pub journey: String,
    pub step: String,
    pub check: String,
    pub passes: u64,
    pub fails: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct RunResult {
    pub run_id: Uuid,
    pub scenario: String,
    pub started_at: DateTime<Utc>,
    pub duration_secs: f64,
    pub peak_vus: usize,
    pub iterations: u64,
    /// Graceful stop expired and units were cut off mid-journey.
    pub interrupted: bool,
    /// One entry per metric, merged over all tags.
    pub metrics: Vec<MetricSummary>,
    /// One entry per recorded series.
    pub series: Vec<MetricSummary>,
    pub checks: Vec<CheckSummary>,
    pub thresholds: Vec<ThresholdOutcome>,
    pub passed: bool,
}

impl RunResult {
    pub fn exit_code(&self) -> i32 {
        if self.passed {
            EXIT_OK
        } else {
            EXIT_THRESHOLDS_FAILED
        }
    }

    pub fn failed_thresholds(&self) -> impl Iterator<Item = &ThresholdOutcome> {
        self.thresholds.iter().filter(|t| !t.passed)
    }

    pub fn metric(&self, name: &str) -> Option<&MetricSummary> {
        self.metrics.iter().find(|m| m.name == name)
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

pub(crate) fn summarize_metrics(snapshot: &MetricsSnapshot) -> Vec<MetricSummary> {
    let elapsed = snapshot.elapsed.as_secs_f64();
    snapshot
        .kinds
        .iter()
        .filter_map(|(name, kind)| {
            let value = snapshot.metric(name)?;
            Some(MetricSummary {
                name: name.clone(),
                kind: *kind,
                tags: Tags::new(),
                aggregate: value.summarize(elapsed),
            })
        })
        .collect()
}

pub(crate) fn summarize_series(snapshot: &MetricsSnapshot) -> Vec<MetricSummary> {
    let elapsed = snapshot.elapsed.as_secs_f64();
    snapshot
        .series
        .iter()
        .map(|(key, value)| MetricSummary {
            name: key.name.clone(),
            kind: value.kind(),
            tags: key.tags.clone(),
            aggregate: value.summarize(elapsed),
        })
        .collect()
}

/// Per-check totals from the tagged `checks` series.
pub(crate) fn summarize_checks(snapshot: &MetricsSnapshot) -> Vec<CheckSummary> {
    let mut totals: BTreeMap<(String, String, String), (u64, u64)> = BTreeMap::new();
    for (key, value) in &snapshot.series {
        if key.name != CHECKS {
            continue;
        }
        let SeriesValue::Rate { passes, total } = value else {
            continue;
        };
        let tag = |k: &str| key.tags.get(k).cloned().unwrap_or_default();
        let entry = totals
            .entry((tag("journey"), tag("step"), tag("check")))
            .or_default();
        entry.0 += passes;
        entry.1 += total - passes;
    }

    totals
        .into_iter()
        .map(|((journey, step, check), (passes, fails))| CheckSummary {
            journey,
            step,
            check,
            passes,
            fails,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::{names, MetricsCollector};

    fn tags(pairs: &[(&str, &str)]) -> Tags {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_check_summary_groups_by_journey_step_and_check() {
        let collector = MetricsCollector::new();
        let home = tags(&[("journey", "browse"), ("step", "home"), ("check", "ok")]);
        let cart = tags(&[
            ("journey", "browse"),
            ("step", "cart"),
            ("check", "ok"),
            ("type", "api"),
        ]);
        collector.add_rate(names::CHECKS, &home, true);
        collector.add_rate(names::CHECKS, &home, false);
        collector.add_rate(names::CHECKS, &cart, true);

        let checks = summarize_checks(&collector.snapshot());
        assert_eq!(checks.len(), 2);
        let home = checks.iter().find(|c| c.step == "home").unwrap();
        assert_eq!((home.passes, home.fails), (1, 1));
    }

    #[test]
    fn test_metric_summary_merges_tags() {
        let collector = MetricsCollector::new();
        collector.add_counter(names::HTTP_REQS, &tags(&[("step", "a")]), 1.0);
        collector.add_counter(names::HTTP_REQS, &tags(&[("step", "b")]), 1.0);

        let snapshot = collector.snapshot();
        let metrics = summarize_metrics(&snapshot);
        let reqs = metrics.iter().find(|m| m.name == names::HTTP_REQS).unwrap();
        assert!(matches!(
            reqs.aggregate,
            AggregateSummary::Counter { count, .. } if count == 2.0
        ));
        assert_eq!(summarize_series(&snapshot).len(), 2);
    }
}
