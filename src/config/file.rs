//! Declarative scenario files (YAML or JSON).

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::duration::HumanDuration;
use crate::engine::{HealthCheck, RampProfile, Scenario, Stage, DEFAULT_GRACEFUL_STOP};
use crate::error::ConfigError;
use crate::http::HttpMethod;
use crate::journey::{BodyTemplate, Check, Journey, Pacing, Step, VariableGenerator};
use crate::metrics::Tags;
use crate::thresholds::Threshold;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ScenarioFile {
    pub name: String,
    pub base_url: String,

    /// Sent with every request.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub headers: BTreeMap<String, String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub stages: Vec<StageSpec>,

    /// Units running when the first stage starts.
    #[serde(default)]
    pub start_vus: u64,

    /// Constant-load shorthand, used when `stages` is empty.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vus: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<HumanDuration>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub graceful_stop: Option<HumanDuration>,

    #[serde(default)]
    pub discard_response_bodies: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub setup: Option<SetupSpec>,

    pub journeys: Vec<JourneySpec>,

    /// Metric selector to one or more threshold expressions.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub thresholds: BTreeMap<String, ThresholdExprs>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StageSpec {
    pub duration: HumanDuration,
    pub target: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SetupSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub health_check: Option<HealthCheckSpec>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HealthCheckSpec {
    #[serde(default = "default_health_path")]
    pub path: String,
    #[serde(default = "default_expect_status")]
    pub expect_status: u16,
}

fn default_health_path() -> String {
    "/".to_string()
}

fn default_expect_status() -> u16 {
    200
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ThresholdExprs {
    One(String),
    Many(Vec<String>),
}

impl ThresholdExprs {
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        let slice: &[String] = match self {
            ThresholdExprs::One(expr) => std::slice::from_ref(expr),
            ThresholdExprs::Many(exprs) => exprs,
        };
        slice.iter().map(String::as_str)
    }
}

/// `2s` or `{ min: 500ms, max: 3500ms }`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PacingSpec {
    Fixed(HumanDuration),
    Range { min: HumanDuration, max: HumanDuration },
}

impl From<PacingSpec> for Pacing {
    fn from(spec: PacingSpec) -> Self {
        match spec {
            PacingSpec::Fixed(d) if d.0.is_zero() => Pacing::None,
            PacingSpec::Fixed(d) => Pacing::Fixed(d.0),
            PacingSpec::Range { min, max } => Pacing::Uniform {
                min: min.0,
                max: max.0,
            },
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct JourneySpec {
    pub name: String,
    #[serde(default = "default_weight")]
    pub weight: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_metric: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_metric: Option<String>,
    /// Think time after each iteration.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pacing: Option<PacingSpec>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub variables: BTreeMap<String, VariableGenerator>,
    pub steps: Vec<StepSpec>,
}

fn default_weight() -> f64 {
    1.0
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StepSpec {
    pub name: String,
    #[serde(default = "default_method")]
    pub method: String,
    pub url: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub headers: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub json: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub checks: Vec<CheckSpec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub acceptable_statuses: Option<Vec<u16>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pacing: Option<PacingSpec>,
    #[serde(default)]
    pub critical: bool,
    #[serde(default = "default_track_errors")]
    pub track_errors: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub when_previous_status: Option<Vec<u16>>,
    #[serde(default, skip_serializing_if = "Tags::is_empty")]
    pub tags: Tags,
}

fn default_method() -> String {
    "GET".to_string()
}

fn default_track_errors() -> bool {
    true
}

/// A named check; exactly one rule field must be set.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CheckSpec {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<Vec<u16>>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub status_acceptable: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_below: Option<HumanDuration>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body_contains: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub header_present: Option<String>,
}

impl CheckSpec {
    fn into_check(self, step: &str) -> Result<Check, ConfigError> {
        let invalid = |reason: String| ConfigError::InvalidStep {
            step: step.to_string(),
            reason,
        };

        let mut rules = Vec::new();
        if let Some(codes) = self.status {
            rules.push(Check::status(self.name.as_str(), codes));
        }
        if self.status_acceptable {
            rules.push(Check::status_acceptable(self.name.as_str()));
        }
        if let Some(limit) = self.duration_below {
            rules.push(Check::duration_below(self.name.as_str(), limit.0));
        }
        if let Some(needles) = self.body_contains {
            if needles.is_empty() {
                return Err(invalid(format!(
                    "check '{}': body_contains needs at least one value",
                    self.name
                )));
            }
            rules.push(Check::body_contains(self.name.as_str(), needles));
        }
        if let Some(header) = self.header_present {
            rules.push(Check::header_present(self.name.as_str(), header));
        }

        match rules.len() {
            1 => Ok(rules.remove(0)),
            0 => Err(invalid(format!("check '{}' has no rule", self.name))),
            _ => Err(invalid(format!(
                "check '{}' sets more than one rule",
                self.name
            ))),
        }
    }
}

/// Command-line values that take precedence over the file.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub target_url: Option<String>,
    pub seed: Option<u64>,
}

impl ScenarioFile {
    /// Read a scenario file. `.json` is parsed as JSON, anything else as YAML.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;

        let is_json = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));
        if is_json {
            Self::from_json(&contents)
        } else {
            Self::from_yaml(&contents)
        }
    }

    pub fn from_yaml(contents: &str) -> Result<Self, ConfigError> {
        serde_yaml::from_str(contents).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    pub fn from_json(contents: &str) -> Result<Self, ConfigError> {
        serde_json::from_str(contents).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    fn profile(&self) -> Result<RampProfile, ConfigError> {
        if !self.stages.is_empty() {
            if self.vus.is_some() || self.duration.is_some() {
                tracing::warn!("Both stages and vus/duration are set; using stages");
            }
            let stages = self
                .stages
                .iter()
                .enumerate()
                .map(|(index, stage)| {
                    let target = u64::try_from(stage.target).map_err(|_| {
                        ConfigError::InvalidStage {
                            index,
                            reason: format!("target must not be negative, got {}", stage.target),
                        }
                    })?;
                    Ok(Stage::new(stage.duration.0, target))
                })
                .collect::<Result<Vec<_>, ConfigError>>()?;
            return RampProfile::with_start_target(self.start_vus, stages);
        }

        match (self.vus, self.duration) {
            (Some(_), Some(duration)) if duration.0.is_zero() => {
                Err(ConfigError::InvalidDuration {
                    value: duration.to_string(),
                    reason: "constant load needs a non-zero duration".to_string(),
                })
            }
            (Some(vus), Some(duration)) => RampProfile::constant(vus, duration.0),
            _ => Err(ConfigError::NoStages),
        }
    }

    /// Build and validate the runtime [`Scenario`].
    pub fn into_scenario(self, overrides: &Overrides) -> Result<Scenario, ConfigError> {
        let profile = self.profile()?;
        if self.journeys.is_empty() {
            return Err(ConfigError::NoJourneys);
        }

        // An empty TARGET_URL counts as unset.
        let base_url = overrides
            .target_url
            .as_deref()
            .map(str::trim)
            .filter(|url| !url.is_empty())
            .map_or_else(|| self.base_url.clone(), str::to_string);

        let mut scenario = Scenario::new(self.name, base_url, profile)
            .with_graceful_stop(self.graceful_stop.map_or(DEFAULT_GRACEFUL_STOP, |d| d.0));
        scenario.headers = self.headers;
        scenario.seed = overrides.seed;

        if let Some(health) = self.setup.and_then(|setup| setup.health_check) {
            scenario = scenario.with_lifecycle(Arc::new(HealthCheck::new(
                health.path,
                health.expect_status,
            )));
        }

        for journey in self.journeys {
            scenario = scenario.with_journey(journey.into_journey()?);
        }

        for (metric, expressions) in &self.thresholds {
            for expression in expressions.iter() {
                scenario = scenario.with_threshold(Threshold::parse(metric, expression)?);
            }
        }

        scenario.validate()?;
        Ok(scenario)
    }
}

impl JourneySpec {
    fn into_journey(self) -> Result<Journey, ConfigError> {
        let mut journey = Journey::new(self.name, self.weight);
        journey.error_metric = self.error_metric;
        journey.duration_metric = self.duration_metric;
        journey.variables = self.variables;
        if let Some(pacing) = self.pacing {
            journey.pacing = pacing.into();
        }
        for step in self.steps {
            journey = journey.with_step(step.into_step()?);
        }
        Ok(journey)
    }
}

impl StepSpec {
    fn into_step(self) -> Result<Step, ConfigError> {
        let method: HttpMethod =
            self.method
                .parse()
                .map_err(|method| ConfigError::InvalidMethod {
                    step: self.name.clone(),
                    method,
                })?;

        let mut step = Step::new(self.name.as_str(), method, self.url);
        step.headers = self.headers;
        step.body = match (self.json, self.text) {
            (Some(_), Some(_)) => {
                return Err(ConfigError::InvalidStep {
                    step: self.name,
                    reason: "set either json or text, not both".to_string(),
                })
            }
            (Some(json), None) => Some(BodyTemplate::Json(json)),
            (None, Some(text)) => Some(BodyTemplate::Text(text)),
            (None, None) => None,
        };
        for check in self.checks {
            step.checks.push(check.into_check(&self.name)?);
        }
        if let Some(statuses) = self.acceptable_statuses {
            step.acceptable_statuses = statuses.into_iter().collect();
        }
        if let Some(pacing) = self.pacing {
            step.pacing = pacing.into();
        }
        step.critical = self.critical;
        step.track_errors = self.track_errors;
        step.when_previous_status = self
            .when_previous_status
            .map(|statuses| statuses.into_iter().collect());
        step.tags = self.tags;
        Ok(step)
    }
}
