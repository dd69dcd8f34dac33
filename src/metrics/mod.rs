// Metrics module
// Collector, metric types and console reporting

pub mod collector;
pub mod reporter;
pub mod types;

pub use collector::{MetricsCollector, MetricsSnapshot};
pub use types::{
    AggregateSummary, MetricKind, MetricSelector, Observation, SeriesKey, SeriesValue,
    SystemMetrics, Tags, TrendStats,
};

/// Names of the metrics every run records.
pub mod names {
    pub const HTTP_REQS: &str = "http_reqs";
    pub const HTTP_REQ_DURATION: &str = "http_req_duration";
    pub const HTTP_REQ_FAILED: &str = "http_req_failed";
    pub const CHECKS: &str = "checks";
    pub const ITERATIONS: &str = "iterations";
    pub const ITERATION_DURATION: &str = "iteration_duration";
    pub const JOURNEY_FAILURES: &str = "journey_failures";
}

/// Built-in metrics and their kinds.
pub const BUILTIN_METRICS: &[(&str, MetricKind)] = &[
    (names::HTTP_REQS, MetricKind::Counter),
    (names::HTTP_REQ_DURATION, MetricKind::Trend),
    (names::HTTP_REQ_FAILED, MetricKind::Rate),
    (names::CHECKS, MetricKind::Rate),
    (names::ITERATIONS, MetricKind::Counter),
    (names::ITERATION_DURATION, MetricKind::Trend),
    (names::JOURNEY_FAILURES, MetricKind::Counter),
];
