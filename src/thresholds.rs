//! Pass/fail criteria evaluated once over the final metrics.
//!
//! A threshold pairs a metric selector with an expression such as
//! `p(95)<800`, `rate<0.01` or `avg<=250`. Trend values are in milliseconds.

use std::fmt;

use serde::Serialize;

use crate::error::ConfigError;
use crate::metrics::types::{rate, trend_quantile, TREND_SCALE};
use crate::metrics::{MetricKind, MetricSelector, MetricsSnapshot, SeriesValue};

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum AggregateSelector {
    Avg,
    Min,
    Max,
    Med,
    /// Percentile in `[0, 100]`.
    Percentile(f64),
    /// Rate metrics: fraction of true observations. Counters: sum per second.
    Rate,
    /// Counter sum.
    Count,
}

impl AggregateSelector {
    fn parse(input: &str) -> Option<Self> {
        match input {
            "avg" => Some(Self::Avg),
            "min" => Some(Self::Min),
            "max" => Some(Self::Max),
            "med" => Some(Self::Med),
            "rate" => Some(Self::Rate),
            "count" => Some(Self::Count),
            _ => {
                let inner = input.strip_prefix("p(")?.strip_suffix(')')?;
                let p: f64 = inner.trim().parse().ok()?;
                (0.0..=100.0).contains(&p).then_some(Self::Percentile(p))
            }
        }
    }

    pub fn applies_to(&self, kind: MetricKind) -> bool {
        match self {
            Self::Avg | Self::Min | Self::Max | Self::Med | Self::Percentile(_) => {
                kind == MetricKind::Trend
            }
            Self::Rate => matches!(kind, MetricKind::Rate | MetricKind::Counter),
            Self::Count => kind == MetricKind::Counter,
        }
    }

    /// Read the aggregate off a series; `elapsed_secs` is the run length.
    fn observe(&self, value: &SeriesValue, elapsed_secs: f64) -> Option<f64> {
        match (self, value) {
            (Self::Rate, SeriesValue::Rate { passes, total }) => Some(rate(*passes, *total)),
            (Self::Rate, SeriesValue::Counter { sum, .. }) => {
                Some(if elapsed_secs > 0.0 { sum / elapsed_secs } else { 0.0 })
            }
            (Self::Count, SeriesValue::Counter { sum, .. }) => Some(*sum),
            (Self::Avg, SeriesValue::Trend(hist)) => Some(hist.mean() / TREND_SCALE),
            (Self::Min, SeriesValue::Trend(hist)) => Some(hist.min() as f64 / TREND_SCALE),
            (Self::Max, SeriesValue::Trend(hist)) => Some(hist.max() as f64 / TREND_SCALE),
            (Self::Med, SeriesValue::Trend(hist)) => Some(trend_quantile(hist, 0.5)),
            (Self::Percentile(p), SeriesValue::Trend(hist)) => {
                Some(trend_quantile(hist, p / 100.0))
            }
            _ => None,
        }
    }
}

impl fmt::Display for AggregateSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Avg => f.write_str("avg"),
            Self::Min => f.write_str("min"),
            Self::Max => f.write_str("max"),
            Self::Med => f.write_str("med"),
            Self::Percentile(p) => write!(f, "p({})", p),
            Self::Rate => f.write_str("rate"),
            Self::Count => f.write_str("count"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Comparison {
    Lt,
    Le,
    Gt,
    Ge,
}

impl Comparison {
    pub fn holds(&self, observed: f64, limit: f64) -> bool {
        match self {
            Comparison::Lt => observed < limit,
            Comparison::Le => observed <= limit,
            Comparison::Gt => observed > limit,
            Comparison::Ge => observed >= limit,
        }
    }

    fn symbol(&self) -> &'static str {
        match self {
            Comparison::Lt => "<",
            Comparison::Le => "<=",
            Comparison::Gt => ">",
            Comparison::Ge => ">=",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Threshold {
    pub metric: MetricSelector,
    pub aggregate: AggregateSelector,
    pub comparison: Comparison,
    pub limit: f64,
}

impl Threshold {
    /// Parse `expression` for the metric selector `metric`.
    pub fn parse(metric: &str, expression: &str) -> Result<Self, ConfigError> {
        let invalid = |reason: &str| ConfigError::InvalidThreshold {
            metric: metric.to_string(),
            expression: expression.to_string(),
            reason: reason.to_string(),
        };

        let selector = MetricSelector::parse(metric)?;

        // Two-character operators first so `<=` is not read as `<`.
        let (position, comparison, width) = [
            ("<=", Comparison::Le),
            (">=", Comparison::Ge),
            ("<", Comparison::Lt),
            (">", Comparison::Gt),
        ]
        .iter()
        .find_map(|(symbol, cmp)| expression.find(symbol).map(|i| (i, *cmp, symbol.len())))
        .ok_or_else(|| invalid("expected one of <, <=, >, >="))?;

        let left = expression[..position].trim();
        let right = expression[position + width..].trim();

        let aggregate =
            AggregateSelector::parse(left).ok_or_else(|| invalid("unknown aggregate"))?;
        let limit: f64 = right.parse().map_err(|_| invalid("limit is not a number"))?;
        if !limit.is_finite() {
            return Err(invalid("limit must be finite"));
        }

        Ok(Self {
            metric: selector,
            aggregate,
            comparison,
            limit,
        })
    }

    pub fn expression(&self) -> String {
        format!("{}{}{}", self.aggregate, self.comparison.symbol(), self.limit)
    }

    /// Reject thresholds whose aggregate does not exist for the metric kind.
    pub fn check_kind(&self, kind: MetricKind) -> Result<(), ConfigError> {
        if self.aggregate.applies_to(kind) {
            Ok(())
        } else {
            Err(ConfigError::InvalidThreshold {
                metric: self.metric.to_string(),
                expression: self.expression(),
                reason: format!("'{}' does not apply to a {} metric", self.aggregate, kind),
            })
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ThresholdFailure {
    /// The metric had no observations.
    NoData,
    /// The observed value did not satisfy the comparison.
    Breached,
}

impl fmt::Display for ThresholdFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ThresholdFailure::NoData => f.write_str("no data"),
            ThresholdFailure::Breached => f.write_str("breached"),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ThresholdOutcome {
    pub metric: String,
    pub expression: String,
    pub observed: Option<f64>,
    pub passed: bool,
    pub failure: Option<ThresholdFailure>,
}

/// Evaluate every threshold against a final snapshot.
pub fn evaluate(snapshot: &MetricsSnapshot, thresholds: &[Threshold]) -> Vec<ThresholdOutcome> {
    let elapsed_secs = snapshot.elapsed.as_secs_f64();

    thresholds
        .iter()
        .map(|threshold| {
            let value = snapshot
                .select(&threshold.metric)
                .filter(|value| value.samples() > 0);
            let observed =
                value.and_then(|value| threshold.aggregate.observe(&value, elapsed_secs));

            let (passed, failure) = match observed {
                None => (false, Some(ThresholdFailure::NoData)),
                Some(v) if threshold.comparison.holds(v, threshold.limit) => (true, None),
                Some(_) => (false, Some(ThresholdFailure::Breached)),
            };

            if let Some(failure) = failure {
                tracing::warn!(
                    "Threshold {}: {} failed ({})",
                    threshold.metric,
                    threshold.expression(),
                    failure
                );
            }

            ThresholdOutcome {
                metric: threshold.metric.to_string(),
                expression: threshold.expression(),
                observed,
                passed,
                failure,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::{MetricsCollector, Tags};
    use rstest::rstest;

    #[rstest]
    #[case("p(95)<800", AggregateSelector::Percentile(95.0), Comparison::Lt, 800.0)]
    #[case("p(99.9) <= 2000", AggregateSelector::Percentile(99.9), Comparison::Le, 2000.0)]
    #[case("rate<0.01", AggregateSelector::Rate, Comparison::Lt, 0.01)]
    #[case("rate>0.99", AggregateSelector::Rate, Comparison::Gt, 0.99)]
    #[case("avg>=10", AggregateSelector::Avg, Comparison::Ge, 10.0)]
    #[case("med<5", AggregateSelector::Med, Comparison::Lt, 5.0)]
    #[case("count>100", AggregateSelector::Count, Comparison::Gt, 100.0)]
    fn test_parse_expressions(
        #[case] expression: &str,
        #[case] aggregate: AggregateSelector,
        #[case] comparison: Comparison,
        #[case] limit: f64,
    ) {
        let threshold = Threshold::parse("m", expression).unwrap();
        assert_eq!(threshold.aggregate, aggregate);
        assert_eq!(threshold.comparison, comparison);
        assert_eq!(threshold.limit, limit);
    }

    #[rstest]
    #[case("p(95)")]
    #[case("p(101)<5")]
    #[case("avg==5")]
    #[case("mean<5")]
    #[case("rate<abc")]
    #[case("rate<inf")]
    fn test_parse_rejects(#[case] expression: &str) {
        assert!(matches!(
            Threshold::parse("m", expression),
            Err(ConfigError::InvalidThreshold { .. })
        ));
    }

    #[test]
    fn test_kind_applicability() {
        let p95 = Threshold::parse("http_req_duration", "p(95)<800").unwrap();
        assert!(p95.check_kind(MetricKind::Trend).is_ok());
        assert!(p95.check_kind(MetricKind::Rate).is_err());

        let rate = Threshold::parse("errors", "rate<0.1").unwrap();
        assert!(rate.check_kind(MetricKind::Rate).is_ok());
        assert!(rate.check_kind(MetricKind::Counter).is_ok());
        assert!(rate.check_kind(MetricKind::Trend).is_err());
    }

    fn error_rate_snapshot(failures: u64, total: u64) -> MetricsSnapshot {
        let collector = MetricsCollector::new();
        for i in 0..total {
            collector.add_rate("checkout_errors", &Tags::new(), i < failures);
        }
        collector.snapshot()
    }

    #[rstest]
    #[case(1, 100, true)]
    #[case(2, 100, false)]
    #[case(3, 100, false)]
    fn test_strict_rate_threshold_boundary(
        #[case] failures: u64,
        #[case] total: u64,
        #[case] expected: bool,
    ) {
        let threshold = Threshold::parse("checkout_errors", "rate<0.02").unwrap();
        let outcome = &evaluate(&error_rate_snapshot(failures, total), &[threshold])[0];
        assert_eq!(outcome.passed, expected);
        if !expected {
            assert_eq!(outcome.failure, Some(ThresholdFailure::Breached));
        }
    }

    #[test]
    fn test_metric_without_samples_is_no_data() {
        let collector = MetricsCollector::new();
        collector
            .register("checkout_duration", MetricKind::Trend)
            .unwrap();
        let threshold = Threshold::parse("checkout_duration", "p(95)<2000").unwrap();

        let outcome = &evaluate(&collector.snapshot(), &[threshold])[0];
        assert!(!outcome.passed);
        assert_eq!(outcome.observed, None);
        assert_eq!(outcome.failure, Some(ThresholdFailure::NoData));
    }

    #[test]
    fn test_tagged_percentile_threshold() {
        let collector = MetricsCollector::new();
        let page: Tags = [("type".to_string(), "page".to_string())].into();
        let api: Tags = [("type".to_string(), "api".to_string())].into();
        for ms in [100.0, 120.0, 140.0, 160.0] {
            collector.add_trend("http_req_duration", &page, ms);
        }
        collector.add_trend("http_req_duration", &api, 5000.0);

        let thresholds = [
            Threshold::parse("http_req_duration{type:page}", "p(99)<2000").unwrap(),
            Threshold::parse("http_req_duration", "max<2000").unwrap(),
        ];
        let outcomes = evaluate(&collector.snapshot(), &thresholds);
        assert!(outcomes[0].passed);
        assert!(!outcomes[1].passed);
    }
}
