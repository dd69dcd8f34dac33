//! Journeys and the journey runner.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::time::Instant;

use super::context::{IterationContext, VariableGenerator};
use super::step::{Pacing, Step, StepExecutor, StepScope};
use crate::metrics::{names, Tags};

/// A named, weighted sequence of steps simulating one user flow.
#[derive(Debug, Clone)]
pub struct Journey {
    pub name: String,
    pub weight: f64,
    pub steps: Vec<Step>,
    /// Drawn once at the start of every iteration.
    pub variables: BTreeMap<String, VariableGenerator>,
    /// Think time after the whole iteration.
    pub pacing: Pacing,
    /// Rate of steps that failed at least one check.
    pub error_metric: Option<String>,
    /// Trend of the whole iteration's wall-clock time, in ms.
    pub duration_metric: Option<String>,
}

impl Journey {
    pub fn new(name: impl Into<String>, weight: f64) -> Self {
        Self {
            name: name.into(),
            weight,
            steps: Vec::new(),
            variables: BTreeMap::new(),
            pacing: Pacing::None,
            error_metric: None,
            duration_metric: None,
        }
    }

    pub fn with_step(mut self, step: Step) -> Self {
        self.steps.push(step);
        self
    }

    pub fn with_variable(mut self, name: impl Into<String>, generator: VariableGenerator) -> Self {
        self.variables.insert(name.into(), generator);
        self
    }

    pub fn with_pacing(mut self, pacing: Pacing) -> Self {
        self.pacing = pacing;
        self
    }

    pub fn with_error_metric(mut self, metric: impl Into<String>) -> Self {
        self.error_metric = Some(metric.into());
        self
    }

    pub fn with_duration_metric(mut self, metric: impl Into<String>) -> Self {
        self.duration_metric = Some(metric.into());
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct JourneyOutcome {
    /// Every executed step passed its checks.
    pub passed: bool,
    pub steps_run: usize,
    pub steps_skipped: usize,
    pub failed_steps: Vec<String>,
    /// Critical step that ended the iteration early.
    pub aborted_at: Option<String>,
    /// Stopped at a step boundary by a graceful-stop interrupt.
    pub interrupted: bool,
}

/// Runs journeys step by step for one virtual user.
#[derive(Clone)]
pub struct JourneyRunner {
    executor: StepExecutor,
}

impl JourneyRunner {
    pub fn new(executor: StepExecutor) -> Self {
        Self { executor }
    }

    /// Execute every step in order, threading `ctx` between them.
    ///
    /// A failed step does not stop the journey unless it is critical.
    /// `interrupt` is only looked at between steps, never mid-request.
    pub async fn run(
        &self,
        journey: &Journey,
        ctx: &mut IterationContext<'_>,
        interrupt: &AtomicBool,
    ) -> JourneyOutcome {
        let started = Instant::now();
        let scope = StepScope {
            journey: &journey.name,
            error_metric: journey.error_metric.as_deref(),
        };
        let mut outcome = JourneyOutcome {
            passed: true,
            ..Default::default()
        };

        ctx.generate(&journey.variables);

        for step in &journey.steps {
            if interrupt.load(Ordering::Acquire) {
                tracing::debug!("vu={} interrupted before step '{}'", ctx.vu, step.name);
                outcome.interrupted = true;
                break;
            }

            if !step.should_run(ctx.previous_status) {
                outcome.steps_skipped += 1;
                continue;
            }

            let result = self.executor.execute(step, scope, ctx).await;
            outcome.steps_run += 1;

            if !result.passed() {
                outcome.passed = false;
                outcome.failed_steps.push(step.name.clone());
                if step.critical {
                    tracing::debug!(
                        "vu={} critical step '{}' failed, ending iteration",
                        ctx.vu,
                        step.name
                    );
                    outcome.aborted_at = Some(step.name.clone());
                    break;
                }
            }
        }

        let collector = self.executor.collector();
        let tags: Tags = [("journey".to_string(), journey.name.clone())].into();
        let elapsed_ms = started.elapsed().as_secs_f64() * 1000.0;

        if outcome.aborted_at.is_some() {
            collector.add_counter(names::JOURNEY_FAILURES, &tags, 1.0);
        }
        if !outcome.interrupted {
            collector.add_counter(names::ITERATIONS, &tags, 1.0);
            collector.add_trend(names::ITERATION_DURATION, &tags, elapsed_ms);
            if let Some(metric) = &journey.duration_metric {
                collector.add_trend(metric, &tags, elapsed_ms);
            }
            journey.pacing.wait(ctx.rng).await;
        }

        outcome
    }
}
