mod common;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use common::FakeClient;
use journey_load::engine::{Scheduler, VuShared};
use journey_load::journey::{JourneyRunner, JourneySelector, StepExecutor, Variables};
use journey_load::metrics::AggregateSummary;
use journey_load::thresholds::ThresholdFailure;
use journey_load::{
    Check, HealthCheck, HttpClient, HttpRequest, Journey, Lifecycle, MetricsCollector, Pacing,
    RampProfile, Response, RunError, Runner, Scenario, SchedulerState, SetupError, Stage, Step,
    Threshold, TransportError,
    EXIT_SETUP_ERROR, EXIT_THRESHOLDS_FAILED,
};

fn browse() -> Journey {
    Journey::new("browse", 1.0)
        .with_step(Step::get("home", "/").with_check(Check::status("home 200", [200])))
        .with_pacing(Pacing::Fixed(Duration::from_secs(1)))
}

fn stages(spec: &[(u64, u64)]) -> RampProfile {
    RampProfile::new(
        spec.iter()
            .map(|(secs, target)| Stage::new(Duration::from_secs(*secs), *target))
            .collect(),
    )
    .unwrap()
}

#[tokio::test(start_paused = true)]
async fn scheduler_follows_ramp_and_drains_to_zero() {
    let client = Arc::new(FakeClient::new());
    let collector = MetricsCollector::new();
    let journeys = vec![browse()];
    let shared = Arc::new(VuShared {
        runner: JourneyRunner::new(StepExecutor::new(
            client.clone(),
            collector.clone(),
            Default::default(),
        )),
        selector: JourneySelector::new(&journeys).unwrap(),
        journeys,
        base_vars: Variables::from([("base_url".to_string(), "http://shop.test".to_string())]),
        seed: 42,
        interrupt: Default::default(),
        progress: Default::default(),
    });
    let progress = shared.progress.clone();

    let report = Scheduler::new(stages(&[(10, 10), (40, 50), (10, 0)]), Duration::from_secs(30))
        .run(shared)
        .await;

    assert_eq!(report.peak_units, 50);
    assert_eq!(report.final_units, 0);
    assert!(!report.interrupted);
    assert!(report.iterations > 0);
    assert_eq!(progress.state(), SchedulerState::Completed);
    assert_eq!(progress.active_units(), 0);
}

/// Client whose every call panics inside the virtual user's task.
struct PanickingClient;

#[async_trait]
impl HttpClient for PanickingClient {
    async fn send(&self, _request: HttpRequest) -> Result<Response, TransportError> {
        tokio::time::sleep(Duration::from_millis(10)).await;
        panic!("client blew up");
    }
}

#[tokio::test(start_paused = true)]
async fn panicking_units_are_not_left_active() {
    let collector = MetricsCollector::new();
    let journeys = vec![browse()];
    let shared = Arc::new(VuShared {
        runner: JourneyRunner::new(StepExecutor::new(
            Arc::new(PanickingClient),
            collector,
            Default::default(),
        )),
        selector: JourneySelector::new(&journeys).unwrap(),
        journeys,
        base_vars: Variables::from([("base_url".to_string(), "http://shop.test".to_string())]),
        seed: 1,
        interrupt: Default::default(),
        progress: Default::default(),
    });
    let progress = shared.progress.clone();

    let report = Scheduler::new(stages(&[(2, 3)]), Duration::from_secs(5))
        .run(shared)
        .await;

    assert!(report.peak_units > 0);
    assert_eq!(report.final_units, 0);
    assert_eq!(progress.active_units(), 0);
}

#[tokio::test(start_paused = true)]
async fn graceful_stop_interrupts_slow_iterations() {
    // Each request takes far longer than the graceful stop allows.
    let client = Arc::new(FakeClient::new().with_latency(Duration::from_secs(20)));
    let journey = Journey::new("slow", 1.0)
        .with_step(Step::get("one", "/one"))
        .with_step(Step::get("two", "/two"))
        .with_step(Step::get("three", "/three"));

    let scenario = Scenario::new("slow", "http://shop.test", stages(&[(5, 2)]))
        .with_journey(journey)
        .with_graceful_stop(Duration::from_secs(1));

    let result = Runner::new(client.clone()).run(&scenario).await.unwrap();

    assert!(result.interrupted);
    // Interrupted iterations never reach the third step.
    assert!(!client.paths().iter().any(|p| p == "/three"));
}

struct CountingHooks {
    setups: AtomicUsize,
    teardowns: AtomicUsize,
}

#[async_trait]
impl Lifecycle for CountingHooks {
    async fn setup(
        &self,
        _client: &dyn HttpClient,
        _base_url: &str,
    ) -> Result<Variables, SetupError> {
        self.setups.fetch_add(1, Ordering::SeqCst);
        Ok(Variables::from([("token".to_string(), "abc".to_string())]))
    }

    async fn teardown(&self, data: &Variables) {
        assert_eq!(data["token"], "abc");
        self.teardowns.fetch_add(1, Ordering::SeqCst);
    }
}

#[tokio::test(start_paused = true)]
async fn run_produces_result_and_tears_down_once() {
    let client = Arc::new(FakeClient::new());
    let hooks = Arc::new(CountingHooks {
        setups: AtomicUsize::new(0),
        teardowns: AtomicUsize::new(0),
    });
    let scenario = Scenario::new("browse", "http://shop.test", stages(&[(5, 3), (5, 0)]))
        .with_journey(
            browse().with_step(Step::get("token", "/account?t=${token}")),
        )
        .with_threshold(Threshold::parse("checks", "rate>0.99").unwrap())
        .with_threshold(Threshold::parse("http_req_failed", "rate<0.01").unwrap())
        .with_lifecycle(hooks.clone())
        .with_seed(9);

    let result = Runner::new(client.clone()).run(&scenario).await.unwrap();

    assert!(result.passed, "{:?}", result.thresholds);
    assert_eq!(result.exit_code(), 0);
    assert_eq!(result.peak_vus, 3);
    assert!(result.iterations > 0);
    assert_eq!(hooks.setups.load(Ordering::SeqCst), 1);
    assert_eq!(hooks.teardowns.load(Ordering::SeqCst), 1);
    assert!(client.paths().iter().any(|p| p == "/account?t=abc"));

    let checks = result.metric("checks").unwrap();
    assert!(matches!(checks.aggregate, AggregateSummary::Rate { fails: 0, .. }));
    assert!(result.to_json().unwrap().contains("\"scenario\": \"browse\""));
}

#[tokio::test(start_paused = true)]
async fn failing_thresholds_and_missing_data_fail_the_run() {
    let client = Arc::new(FakeClient::new().route("/", 503));
    let scenario = Scenario::new("down", "http://shop.test", stages(&[(3, 2)]))
        .with_journey(browse().with_error_metric("errors"))
        .with_journey(
            Journey::new("never", 0.0)
                .with_step(Step::get("x", "/x"))
                .with_duration_metric("never_duration"),
        )
        .with_threshold(Threshold::parse("errors", "rate<0.02").unwrap())
        .with_threshold(Threshold::parse("never_duration", "p(95)<100").unwrap());

    let result = Runner::new(client).run(&scenario).await.unwrap();

    assert!(!result.passed);
    assert_eq!(result.exit_code(), EXIT_THRESHOLDS_FAILED);
    let failures: Vec<_> = result.thresholds.iter().map(|t| t.failure).collect();
    assert_eq!(
        failures,
        vec![Some(ThresholdFailure::Breached), Some(ThresholdFailure::NoData)]
    );
}

#[tokio::test(start_paused = true)]
async fn failed_health_check_aborts_before_load() {
    let client = Arc::new(FakeClient::new().route("/health", 500));
    let scenario = Scenario::new("guarded", "http://shop.test", stages(&[(5, 5)]))
        .with_journey(browse())
        .with_lifecycle(Arc::new(HealthCheck::new("/health", 200)));

    let err = Runner::new(client.clone()).run(&scenario).await.unwrap_err();

    assert!(matches!(err, RunError::Setup(SetupError::Unhealthy { status: 500, .. })));
    assert_eq!(err.exit_code(), EXIT_SETUP_ERROR);
    assert_eq!(client.paths(), vec!["/health"]);
}

#[tokio::test]
async fn invalid_scenario_is_rejected_before_any_request() {
    let client = Arc::new(FakeClient::new());
    let scenario = Scenario::new("empty", "http://shop.test", stages(&[(5, 5)]));

    let err = Runner::new(client.clone()).run(&scenario).await.unwrap_err();

    assert!(matches!(err, RunError::Config(_)));
    assert_eq!(client.calls(), 0);
}
