//! Steps and the step executor.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::Duration;

use rand::rngs::StdRng;
use rand::Rng;
use tokio::time::Instant;

use super::check::{Check, CheckEvaluator, CheckOutcome};
use super::context::IterationContext;
use crate::error::{ConfigError, TransportError};
use crate::http::{HttpClient, HttpMethod, HttpRequest, RequestBody, Response};
use crate::metrics::{names, MetricsCollector, Tags};

/// Think time consumed after a step or an iteration.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum Pacing {
    #[default]
    None,
    Fixed(Duration),
    /// Uniformly distributed in `[min, max]`.
    Uniform { min: Duration, max: Duration },
}

impl Pacing {
    pub fn validate(&self) -> Result<(), ConfigError> {
        match self {
            Pacing::Uniform { min, max } if min > max => Err(ConfigError::InvalidPacing(format!(
                "min {:?} is greater than max {:?}",
                min, max
            ))),
            _ => Ok(()),
        }
    }

    pub fn sample(&self, rng: &mut StdRng) -> Duration {
        match *self {
            Pacing::None => Duration::ZERO,
            Pacing::Fixed(d) => d,
            Pacing::Uniform { min, max } if min == max => min,
            Pacing::Uniform { min, max } => rng.random_range(min..=max),
        }
    }

    /// Sleep cooperatively for one sampled delay.
    pub async fn wait(&self, rng: &mut StdRng) {
        let delay = self.sample(rng);
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
    }
}

/// Request body template; strings may contain `${var}` placeholders.
#[derive(Debug, Clone, PartialEq)]
pub enum BodyTemplate {
    Json(serde_json::Value),
    Text(String),
}

/// Statuses treated as success when a step does not override them.
pub fn default_acceptable_statuses() -> BTreeSet<u16> {
    (200..400).collect()
}

/// One HTTP interaction plus its checks and pacing delay.
#[derive(Debug, Clone)]
pub struct Step {
    pub name: String,
    pub method: HttpMethod,
    /// URL template. A leading `/` is resolved against `${base_url}`.
    pub url: String,
    pub headers: BTreeMap<String, String>,
    pub body: Option<BodyTemplate>,
    pub checks: Vec<Check>,
    /// Statuses that count as a successful request for `http_req_failed`.
    pub acceptable_statuses: BTreeSet<u16>,
    pub pacing: Pacing,
    /// Failing this step ends the iteration.
    pub critical: bool,
    /// Feed the journey's error metric with this step's outcome.
    pub track_errors: bool,
    /// Only run when the previous response status is in this set.
    pub when_previous_status: Option<BTreeSet<u16>>,
    pub tags: Tags,
}

impl Step {
    pub fn new(name: impl Into<String>, method: HttpMethod, url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            method,
            url: url.into(),
            headers: BTreeMap::new(),
            body: None,
            checks: Vec::new(),
            acceptable_statuses: default_acceptable_statuses(),
            pacing: Pacing::None,
            critical: false,
            track_errors: true,
            when_previous_status: None,
            tags: Tags::new(),
        }
    }

    pub fn get(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self::new(name, HttpMethod::Get, url)
    }

    pub fn post(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self::new(name, HttpMethod::Post, url)
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    pub fn with_json(mut self, body: serde_json::Value) -> Self {
        self.body = Some(BodyTemplate::Json(body));
        self
    }

    pub fn with_check(mut self, check: Check) -> Self {
        self.checks.push(check);
        self
    }

    pub fn with_acceptable_statuses(mut self, statuses: impl IntoIterator<Item = u16>) -> Self {
        self.acceptable_statuses = statuses.into_iter().collect();
        self
    }

    pub fn with_pacing(mut self, pacing: Pacing) -> Self {
        self.pacing = pacing;
        self
    }

    pub fn with_tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.tags.insert(key.into(), value.into());
        self
    }

    pub fn critical(mut self) -> Self {
        self.critical = true;
        self
    }

    pub fn untracked(mut self) -> Self {
        self.track_errors = false;
        self
    }

    pub fn when_previous_status(mut self, statuses: impl IntoIterator<Item = u16>) -> Self {
        self.when_previous_status = Some(statuses.into_iter().collect());
        self
    }

    /// Whether the step's condition holds for the current iteration.
    pub fn should_run(&self, previous_status: Option<u16>) -> bool {
        match &self.when_previous_status {
            None => true,
            Some(statuses) => previous_status.is_some_and(|s| statuses.contains(&s)),
        }
    }

    fn build_request(
        &self,
        ctx: &IterationContext<'_>,
        common_headers: &BTreeMap<String, String>,
    ) -> HttpRequest {
        let rendered = ctx.render(&self.url);
        let url = if rendered.starts_with('/') {
            let base = ctx.vars.get("base_url").map(String::as_str).unwrap_or("");
            format!("{}{}", base.trim_end_matches('/'), rendered)
        } else {
            rendered
        };

        let mut headers = common_headers.clone();
        for (name, value) in &self.headers {
            headers.insert(name.clone(), ctx.render(value));
        }

        let body = self.body.as_ref().map(|body| match body {
            BodyTemplate::Json(template) => RequestBody::Json(ctx.render_json(template)),
            BodyTemplate::Text(template) => RequestBody::Text(ctx.render(template)),
        });

        HttpRequest {
            method: self.method,
            url,
            headers,
            body,
        }
    }
}

/// What happened when a step ran.
#[derive(Debug)]
pub struct StepOutcome {
    pub response: Option<Response>,
    pub transport_error: Option<TransportError>,
    pub checks: CheckOutcome,
    pub elapsed: Duration,
}

impl StepOutcome {
    pub fn passed(&self) -> bool {
        self.checks.passed
    }
}

/// Journey-level settings a step needs while it records metrics.
#[derive(Debug, Clone, Copy)]
pub struct StepScope<'a> {
    pub journey: &'a str,
    pub error_metric: Option<&'a str>,
}

/// Performs one step: request, timing, checks, metrics and pacing.
#[derive(Clone)]
pub struct StepExecutor {
    client: Arc<dyn HttpClient>,
    collector: MetricsCollector,
    common_headers: BTreeMap<String, String>,
}

impl StepExecutor {
    pub fn new(
        client: Arc<dyn HttpClient>,
        collector: MetricsCollector,
        common_headers: BTreeMap<String, String>,
    ) -> Self {
        Self {
            client,
            collector,
            common_headers,
        }
    }

    pub fn collector(&self) -> &MetricsCollector {
        &self.collector
    }

    pub async fn execute(
        &self,
        step: &Step,
        scope: StepScope<'_>,
        ctx: &mut IterationContext<'_>,
    ) -> StepOutcome {
        let request = step.build_request(ctx, &self.common_headers);
        let mut tags = step.tags.clone();
        tags.insert("journey".to_string(), scope.journey.to_string());
        tags.insert("step".to_string(), step.name.clone());

        tracing::debug!(
            "vu={} {} {} ({}/{})",
            ctx.vu,
            request.method,
            request.url,
            scope.journey,
            step.name
        );

        let start = Instant::now();
        let result = self.client.send(request).await;
        let elapsed = start.elapsed();

        self.collector.add_counter(names::HTTP_REQS, &tags, 1.0);
        self.collector
            .add_trend(names::HTTP_REQ_DURATION, &tags, elapsed.as_secs_f64() * 1000.0);

        let evaluator = CheckEvaluator::new(&self.collector);
        let outcome = match result {
            Ok(mut response) => {
                // Checks see the time we measured around the client call.
                response.elapsed = elapsed;
                let failed = !step.acceptable_statuses.contains(&response.status);
                self.collector.add_rate(names::HTTP_REQ_FAILED, &tags, failed);

                let checks =
                    evaluator.evaluate(&response, &step.checks, &step.acceptable_statuses, &tags);
                ctx.previous_status = Some(response.status);
                StepOutcome {
                    response: Some(response),
                    transport_error: None,
                    checks,
                    elapsed,
                }
            }
            Err(error) => {
                tracing::warn!(
                    "vu={} step '{}' transport error: {}",
                    ctx.vu,
                    step.name,
                    error
                );
                self.collector.add_rate(names::HTTP_REQ_FAILED, &tags, true);
                let checks = evaluator.record_transport_error(&error, &tags);
                ctx.previous_status = None;
                StepOutcome {
                    response: None,
                    transport_error: Some(error),
                    checks,
                    elapsed,
                }
            }
        };

        if step.track_errors {
            if let Some(metric) = scope.error_metric {
                self.collector
                    .add_rate(metric, &tags, !outcome.checks.passed);
            }
        }

        step.pacing.wait(ctx.rng).await;
        outcome
    }
}
