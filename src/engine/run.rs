//! Run orchestration: validate, set up, drive the stages, tear down, judge.

use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::time::Instant;
use uuid::Uuid;

use super::lifecycle::LifecycleGuard;
use super::result::{summarize_checks, summarize_metrics, summarize_series, RunResult};
use super::scenario::Scenario;
use super::scheduler::{RunProgress, Scheduler};
use super::vu::VuShared;
use crate::error::{ConfigError, MetricError, RunError};
use crate::http::HttpClient;
use crate::journey::{JourneyRunner, JourneySelector, StepExecutor};
use crate::metrics::reporter::start_periodic_reporter;
use crate::metrics::MetricsCollector;
use crate::thresholds;

/// Executes one [`Scenario`] against an [`HttpClient`].
///
/// Metrics accumulate in the runner's collector, so use a fresh runner per run.
pub struct Runner {
    client: Arc<dyn HttpClient>,
    collector: MetricsCollector,
    progress: RunProgress,
    report_interval: Option<Duration>,
    tick: Duration,
}

impl Runner {
    pub fn new(client: Arc<dyn HttpClient>) -> Self {
        Self {
            client,
            collector: MetricsCollector::new(),
            progress: RunProgress::new(),
            report_interval: None,
            tick: Duration::from_millis(100),
        }
    }

    /// Redraw the live panel at this interval while stages run.
    pub fn with_report_interval(mut self, every: Duration) -> Self {
        self.report_interval = (!every.is_zero()).then_some(every);
        self
    }

    /// Scheduler resolution.
    pub fn with_tick(mut self, tick: Duration) -> Self {
        self.tick = tick;
        self
    }

    pub fn collector(&self) -> &MetricsCollector {
        &self.collector
    }

    pub fn progress(&self) -> &RunProgress {
        &self.progress
    }

    pub async fn run(&self, scenario: &Scenario) -> Result<RunResult, RunError> {
        let metrics = scenario.validate()?;
        for (name, kind) in &metrics {
            self.collector
                .register(name, *kind)
                .map_err(|e| match e {
                    MetricError::KindMismatch {
                        name,
                        expected,
                        actual,
                    } => ConfigError::MetricKindConflict {
                        name,
                        first: expected,
                        second: actual,
                    },
                })?;
        }

        let run_id = Uuid::new_v4();
        let started_at = Utc::now();
        let clock = Instant::now();
        let seed = scenario.seed.unwrap_or_else(rand::random);
        tracing::info!("Starting scenario '{}' (run {})", scenario.name, run_id);
        tracing::info!("  Target: {}", scenario.base_url);
        tracing::info!("  Started at: {}", started_at.to_rfc3339());
        tracing::info!("  Seed: {}", seed);
        tracing::info!(
            "  Journeys: {}",
            scenario
                .journeys
                .iter()
                .map(|j| format!("{} (weight {})", j.name, j.weight))
                .collect::<Vec<_>>()
                .join(", ")
        );

        let lifecycle = LifecycleGuard::new(Arc::clone(&scenario.lifecycle));
        let mut base_vars = lifecycle
            .setup(self.client.as_ref(), &scenario.base_url)
            .await
            .inspect_err(|e| tracing::error!("Setup failed: {}", e))?;
        base_vars
            .entry("base_url".to_string())
            .or_insert_with(|| scenario.base_url.clone());

        let executor = StepExecutor::new(
            Arc::clone(&self.client),
            self.collector.clone(),
            scenario.headers.clone(),
        );
        let shared = Arc::new(VuShared {
            runner: JourneyRunner::new(executor),
            journeys: scenario.journeys.clone(),
            selector: JourneySelector::new(&scenario.journeys)?,
            base_vars: base_vars.clone(),
            seed,
            interrupt: Arc::new(AtomicBool::new(false)),
            progress: self.progress.clone(),
        });

        let reporter = self.report_interval.map(|every| {
            tokio::spawn(start_periodic_reporter(
                self.collector.clone(),
                self.progress.clone(),
                every,
            ))
        });

        let report = Scheduler::new(scenario.profile.clone(), scenario.graceful_stop)
            .with_tick(self.tick)
            .run(shared)
            .await;

        if let Some(reporter) = reporter {
            reporter.abort();
        }
        lifecycle.teardown(&base_vars).await;

        let snapshot = self.collector.snapshot();
        let outcomes = thresholds::evaluate(&snapshot, &scenario.thresholds);
        let passed = outcomes.iter().all(|t| t.passed);

        tracing::info!(
            "Scenario '{}' finished: {} iterations, peak {} virtual users, thresholds {}",
            scenario.name,
            report.iterations,
            report.peak_units,
            if passed { "passed" } else { "failed" }
        );

        Ok(RunResult {
            run_id,
            scenario: scenario.name.clone(),
            started_at,
            duration_secs: clock.elapsed().as_secs_f64(),
            peak_vus: report.peak_units,
            iterations: report.iterations,
            interrupted: report.interrupted,
            metrics: summarize_metrics(&snapshot),
            series: summarize_series(&snapshot),
            checks: summarize_checks(&snapshot),
            thresholds: outcomes,
            passed,
        })
    }
}
