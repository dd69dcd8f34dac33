//! Metric types

use std::collections::BTreeMap;
use std::fmt;

use hdrhistogram::Histogram;
use serde::Serialize;

use crate::error::ConfigError;

/// Trend observations are stored in thousandths so sub-millisecond latencies
/// keep three decimals of precision in an integer histogram.
pub(crate) const TREND_SCALE: f64 = 1000.0;

pub type Tags = BTreeMap<String, String>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MetricKind {
    /// Monotonic sum.
    Counter,
    /// Fraction of boolean observations that were true.
    Rate,
    /// Distribution of numeric observations.
    Trend,
}

impl MetricKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MetricKind::Counter => "counter",
            MetricKind::Rate => "rate",
            MetricKind::Trend => "trend",
        }
    }
}

impl fmt::Display for MetricKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Observation {
    Counter(f64),
    Rate(bool),
    Trend(f64),
}

impl Observation {
    pub fn kind(&self) -> MetricKind {
        match self {
            Observation::Counter(_) => MetricKind::Counter,
            Observation::Rate(_) => MetricKind::Rate,
            Observation::Trend(_) => MetricKind::Trend,
        }
    }
}

/// One time series: a metric name plus the tag set it was recorded with.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SeriesKey {
    pub name: String,
    pub tags: Tags,
}

impl SeriesKey {
    pub fn new(name: impl Into<String>, tags: Tags) -> Self {
        Self {
            name: name.into(),
            tags,
        }
    }
}

impl fmt::Display for SeriesKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_tagged(f, &self.name, &self.tags)
    }
}

/// Selects every series of a metric whose tags include the given pairs.
///
/// Written as `name` or `name{key:value,key:value}`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetricSelector {
    pub name: String,
    pub tags: Tags,
}

impl MetricSelector {
    pub fn parse(input: &str) -> Result<Self, ConfigError> {
        let input = input.trim();
        let invalid = || ConfigError::InvalidSelector(input.to_string());

        let Some(open) = input.find('{') else {
            if input.is_empty() || input.contains('}') {
                return Err(invalid());
            }
            return Ok(Self {
                name: input.to_string(),
                tags: Tags::new(),
            });
        };

        let name = input[..open].trim();
        let rest = &input[open + 1..];
        let body = rest.strip_suffix('}').ok_or_else(invalid)?;
        if name.is_empty() || body.contains('{') || body.contains('}') {
            return Err(invalid());
        }

        let mut tags = Tags::new();
        for pair in body.split(',').filter(|p| !p.trim().is_empty()) {
            let (key, value) = pair.split_once(':').ok_or_else(invalid)?;
            let key = key.trim();
            if key.is_empty() {
                return Err(invalid());
            }
            tags.insert(key.to_string(), value.trim().to_string());
        }

        Ok(Self {
            name: name.to_string(),
            tags,
        })
    }

    pub fn matches(&self, key: &SeriesKey) -> bool {
        key.name == self.name
            && self
                .tags
                .iter()
                .all(|(k, v)| key.tags.get(k).is_some_and(|actual| actual == v))
    }
}

impl fmt::Display for MetricSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_tagged(f, &self.name, &self.tags)
    }
}

fn write_tagged(f: &mut fmt::Formatter<'_>, name: &str, tags: &Tags) -> fmt::Result {
    f.write_str(name)?;
    if tags.is_empty() {
        return Ok(());
    }
    f.write_str("{")?;
    for (i, (k, v)) in tags.iter().enumerate() {
        if i > 0 {
            f.write_str(",")?;
        }
        write!(f, "{}:{}", k, v)?;
    }
    f.write_str("}")
}

/// Accumulated state of one series.
#[derive(Debug, Clone)]
pub enum SeriesValue {
    Counter { sum: f64, samples: u64 },
    Rate { passes: u64, total: u64 },
    Trend(Histogram<u64>),
}

impl SeriesValue {
    pub fn empty(kind: MetricKind) -> Self {
        match kind {
            MetricKind::Counter => SeriesValue::Counter {
                sum: 0.0,
                samples: 0,
            },
            MetricKind::Rate => SeriesValue::Rate {
                passes: 0,
                total: 0,
            },
            // 3 significant digits, auto-resizing
            MetricKind::Trend => SeriesValue::Trend(
                Histogram::new(3).expect("3 significant digits is a valid histogram precision"),
            ),
        }
    }

    pub fn kind(&self) -> MetricKind {
        match self {
            SeriesValue::Counter { .. } => MetricKind::Counter,
            SeriesValue::Rate { .. } => MetricKind::Rate,
            SeriesValue::Trend(_) => MetricKind::Trend,
        }
    }

    /// Apply an observation. The caller guarantees the kinds agree.
    pub(crate) fn apply(&mut self, observation: Observation) {
        match (self, observation) {
            (SeriesValue::Counter { sum, samples }, Observation::Counter(value)) => {
                *sum += value;
                *samples += 1;
            }
            (SeriesValue::Rate { passes, total }, Observation::Rate(value)) => {
                *total += 1;
                if value {
                    *passes += 1;
                }
            }
            (SeriesValue::Trend(hist), Observation::Trend(value)) => {
                // Trends hold non-negative values; negatives clamp to zero.
                let scaled = (value.max(0.0) * TREND_SCALE).round() as u64;
                let _ = hist.record(scaled);
            }
            _ => {}
        }
    }

    /// Fold another series of the same kind into this one.
    pub(crate) fn merge(&mut self, other: &SeriesValue) {
        match (self, other) {
            (
                SeriesValue::Counter { sum, samples },
                SeriesValue::Counter {
                    sum: other_sum,
                    samples: other_samples,
                },
            ) => {
                *sum += other_sum;
                *samples += other_samples;
            }
            (
                SeriesValue::Rate { passes, total },
                SeriesValue::Rate {
                    passes: other_passes,
                    total: other_total,
                },
            ) => {
                *passes += other_passes;
                *total += other_total;
            }
            (SeriesValue::Trend(hist), SeriesValue::Trend(other)) => {
                let _ = hist.add(other);
            }
            _ => {}
        }
    }

    pub fn samples(&self) -> u64 {
        match self {
            SeriesValue::Counter { samples, .. } => *samples,
            SeriesValue::Rate { total, .. } => *total,
            SeriesValue::Trend(hist) => hist.len(),
        }
    }

    /// Summary numbers for reporting. `elapsed_secs` turns counters into
    /// per-second rates.
    pub fn summarize(&self, elapsed_secs: f64) -> AggregateSummary {
        match self {
            SeriesValue::Counter { sum, .. } => AggregateSummary::Counter {
                count: *sum,
                per_second: if elapsed_secs > 0.0 {
                    sum / elapsed_secs
                } else {
                    0.0
                },
            },
            SeriesValue::Rate { passes, total } => AggregateSummary::Rate {
                rate: rate(*passes, *total),
                passes: *passes,
                fails: total - passes,
            },
            SeriesValue::Trend(hist) => AggregateSummary::Trend(TrendStats::from_histogram(hist)),
        }
    }
}

pub(crate) fn rate(passes: u64, total: u64) -> f64 {
    if total == 0 {
        0.0
    } else {
        passes as f64 / total as f64
    }
}

/// Read a quantile (0.0..=1.0) off a trend histogram, in observation units.
pub(crate) fn trend_quantile(hist: &Histogram<u64>, quantile: f64) -> f64 {
    hist.value_at_quantile(quantile) as f64 / TREND_SCALE
}

#[derive(Debug, Clone, Serialize)]
pub struct TrendStats {
    pub count: u64,
    pub min: f64,
    pub avg: f64,
    pub med: f64,
    pub max: f64,
    pub p90: f64,
    pub p95: f64,
    pub p99: f64,
}

impl TrendStats {
    pub fn from_histogram(hist: &Histogram<u64>) -> Self {
        if hist.is_empty() {
            return Self {
                count: 0,
                min: 0.0,
                avg: 0.0,
                med: 0.0,
                max: 0.0,
                p90: 0.0,
                p95: 0.0,
                p99: 0.0,
            };
        }
        Self {
            count: hist.len(),
            min: hist.min() as f64 / TREND_SCALE,
            avg: hist.mean() / TREND_SCALE,
            med: trend_quantile(hist, 0.50),
            max: hist.max() as f64 / TREND_SCALE,
            p90: trend_quantile(hist, 0.90),
            p95: trend_quantile(hist, 0.95),
            p99: trend_quantile(hist, 0.99),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum AggregateSummary {
    Counter { count: f64, per_second: f64 },
    Rate { rate: f64, passes: u64, fails: u64 },
    Trend(TrendStats),
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct SystemMetrics {
    pub cpu_usage: f32,
    pub memory_used_mb: u64,
    pub memory_total_mb: u64,
}
