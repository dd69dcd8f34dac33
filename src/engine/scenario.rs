//! A validated, immutable description of one load test.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use super::lifecycle::{Lifecycle, NoHooks};
use super::ramp::RampProfile;
use crate::error::ConfigError;
use crate::journey::{Journey, JourneySelector};
use crate::metrics::{MetricKind, BUILTIN_METRICS};
use crate::thresholds::Threshold;

pub const DEFAULT_GRACEFUL_STOP: Duration = Duration::from_secs(30);

#[derive(Clone)]
pub struct Scenario {
    pub name: String,
    pub base_url: String,
    /// Sent with every request; step headers win on conflict.
    pub headers: BTreeMap<String, String>,
    pub journeys: Vec<Journey>,
    pub profile: RampProfile,
    pub thresholds: Vec<Threshold>,
    pub graceful_stop: Duration,
    /// Seed for journey selection and variable generators.
    pub seed: Option<u64>,
    pub lifecycle: Arc<dyn Lifecycle>,
}

impl Scenario {
    pub fn new(name: impl Into<String>, base_url: impl Into<String>, profile: RampProfile) -> Self {
        Self {
            name: name.into(),
            base_url: base_url.into(),
            headers: BTreeMap::new(),
            journeys: Vec::new(),
            profile,
            thresholds: Vec::new(),
            graceful_stop: DEFAULT_GRACEFUL_STOP,
            seed: None,
            lifecycle: Arc::new(NoHooks),
        }
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    pub fn with_journey(mut self, journey: Journey) -> Self {
        self.journeys.push(journey);
        self
    }

    pub fn with_threshold(mut self, threshold: Threshold) -> Self {
        self.thresholds.push(threshold);
        self
    }

    pub fn with_graceful_stop(mut self, graceful_stop: Duration) -> Self {
        self.graceful_stop = graceful_stop;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn with_lifecycle(mut self, lifecycle: Arc<dyn Lifecycle>) -> Self {
        self.lifecycle = lifecycle;
        self
    }

    /// Every metric this scenario records, built-in and journey-declared.
    pub fn declared_metrics(&self) -> Result<BTreeMap<String, MetricKind>, ConfigError> {
        let mut metrics: BTreeMap<String, MetricKind> = BUILTIN_METRICS
            .iter()
            .map(|(name, kind)| (name.to_string(), *kind))
            .collect();

        let custom = self.journeys.iter().flat_map(|journey| {
            journey
                .error_metric
                .iter()
                .map(|name| (name, MetricKind::Rate))
                .chain(
                    journey
                        .duration_metric
                        .iter()
                        .map(|name| (name, MetricKind::Trend)),
                )
        });

        for (name, kind) in custom {
            match metrics.get(name) {
                Some(existing) if *existing != kind => {
                    return Err(ConfigError::MetricKindConflict {
                        name: name.clone(),
                        first: existing.as_str(),
                        second: kind.as_str(),
                    });
                }
                _ => {
                    metrics.insert(name.clone(), kind);
                }
            }
        }

        Ok(metrics)
    }

    /// Reject anything that would make the run meaningless.
    pub fn validate(&self) -> Result<BTreeMap<String, MetricKind>, ConfigError> {
        let url = reqwest::Url::parse(&self.base_url).map_err(|e| ConfigError::InvalidUrl {
            url: self.base_url.clone(),
            reason: e.to_string(),
        })?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(ConfigError::InvalidUrl {
                url: self.base_url.clone(),
                reason: format!("unsupported scheme '{}'", url.scheme()),
            });
        }

        JourneySelector::new(&self.journeys)?;
        for journey in &self.journeys {
            if journey.steps.is_empty() {
                return Err(ConfigError::EmptyJourney(journey.name.clone()));
            }
            journey.pacing.validate()?;
            for (name, generator) in &journey.variables {
                generator.validate(name)?;
            }
            for step in &journey.steps {
                step.pacing.validate()?;
            }
        }

        let metrics = self.declared_metrics()?;
        for threshold in &self.thresholds {
            let kind = metrics
                .get(&threshold.metric.name)
                .ok_or_else(|| ConfigError::UnknownMetric(threshold.metric.name.clone()))?;
            threshold.check_kind(*kind)?;
        }

        Ok(metrics)
    }
}
