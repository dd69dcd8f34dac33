mod common;

use std::collections::BTreeMap;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use common::FakeClient;
use journey_load::journey::{IterationContext, JourneyRunner, StepExecutor, Variables};
use journey_load::metrics::{names, MetricSelector, SeriesValue};
use journey_load::{Check, Journey, MetricsCollector, Step, TransportError, VariableGenerator};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde_json::json;

fn runner(client: Arc<FakeClient>, collector: &MetricsCollector) -> JourneyRunner {
    JourneyRunner::new(StepExecutor::new(client, collector.clone(), BTreeMap::new()))
}

fn base_vars() -> Variables {
    Variables::from([("base_url".to_string(), "http://shop.test".to_string())])
}

fn rate(collector: &MetricsCollector, selector: &str) -> (u64, u64) {
    let selector = MetricSelector::parse(selector).unwrap();
    match collector.snapshot().select(&selector) {
        Some(SeriesValue::Rate { passes, total }) => (passes, total),
        other => panic!("expected a rate for {}, got {:?}", selector, other),
    }
}

#[tokio::test(start_paused = true)]
async fn all_checks_pass_against_healthy_target() {
    let client = Arc::new(FakeClient::new());
    let collector = MetricsCollector::new();
    let journey = Journey::new("browse", 1.0)
        .with_step(Step::get("home", "/").with_check(Check::status("home 200", [200])))
        .with_step(
            Step::get("catalogue", "/catalogue")
                .with_check(Check::status("catalogue 200", [200]))
                .with_check(Check::body_contains("has title", ["ShopFlutter"])),
        )
        .with_error_metric("errors");

    let mut rng = StdRng::seed_from_u64(1);
    let mut ctx = IterationContext::new(1, 0, &base_vars(), &mut rng);
    let outcome = runner(client.clone(), &collector)
        .run(&journey, &mut ctx, &AtomicBool::new(false))
        .await;

    assert!(outcome.passed);
    assert_eq!(outcome.steps_run, 2);
    assert_eq!(rate(&collector, "checks"), (3, 3));
    assert_eq!(rate(&collector, "checks{step:catalogue}"), (2, 2));
    assert_eq!(rate(&collector, "errors"), (0, 2));
    assert_eq!(rate(&collector, "http_req_failed"), (0, 2));
    assert_eq!(client.paths(), vec!["/", "/catalogue"]);
}

#[tokio::test(start_paused = true)]
async fn transport_error_is_a_failed_check_and_journey_continues() {
    let client = Arc::new(
        FakeClient::new().fail("/api/cart/add", TransportError::Connect("refused".to_string())),
    );
    let collector = MetricsCollector::new();
    let journey = Journey::new("shop", 1.0)
        .with_step(Step::get("home", "/"))
        .with_step(Step::post("add", "/api/cart/add").with_json(json!({ "quantity": 1 })))
        .with_step(Step::get("cart", "/cart"));

    let mut rng = StdRng::seed_from_u64(2);
    let mut ctx = IterationContext::new(1, 0, &base_vars(), &mut rng);
    let outcome = runner(client.clone(), &collector)
        .run(&journey, &mut ctx, &AtomicBool::new(false))
        .await;

    assert!(!outcome.passed);
    assert_eq!(outcome.steps_run, 3);
    assert_eq!(outcome.failed_steps, vec!["add".to_string()]);
    assert_eq!(rate(&collector, "checks{check:TransportError}"), (0, 1));
    assert_eq!(rate(&collector, "http_req_failed"), (1, 3));
    assert_eq!(client.paths(), vec!["/", "/api/cart/add", "/cart"]);
}

#[tokio::test(start_paused = true)]
async fn critical_failure_ends_the_iteration() {
    let client = Arc::new(FakeClient::new().route("/login", 500));
    let collector = MetricsCollector::new();
    let journey = Journey::new("account", 1.0)
        .with_step(
            Step::get("login", "/login")
                .with_check(Check::status("logged in", [200]))
                .critical(),
        )
        .with_step(Step::get("orders", "/orders"));

    let mut rng = StdRng::seed_from_u64(3);
    let mut ctx = IterationContext::new(1, 0, &base_vars(), &mut rng);
    let outcome = runner(client.clone(), &collector)
        .run(&journey, &mut ctx, &AtomicBool::new(false))
        .await;

    assert_eq!(outcome.aborted_at.as_deref(), Some("login"));
    assert_eq!(outcome.steps_run, 1);
    assert_eq!(client.paths(), vec!["/login"]);
    match collector.snapshot().metric(names::JOURNEY_FAILURES) {
        Some(SeriesValue::Counter { sum, .. }) => assert_eq!(sum, 1.0),
        other => panic!("unexpected {:?}", other),
    }
}

#[tokio::test(start_paused = true)]
async fn conditional_step_follows_previous_status() {
    let client = Arc::new(FakeClient::new().route("/api/checkout", 404));
    let collector = MetricsCollector::new();
    let journey = Journey::new("checkout", 1.0)
        .with_step(Step::post("checkout", "/api/checkout").with_acceptable_statuses([200, 404]))
        .with_step(Step::get("success", "/order/success").when_previous_status([200]));

    let mut rng = StdRng::seed_from_u64(4);
    let mut ctx = IterationContext::new(1, 0, &base_vars(), &mut rng);
    let outcome = runner(client.clone(), &collector)
        .run(&journey, &mut ctx, &AtomicBool::new(false))
        .await;

    assert!(outcome.passed);
    assert_eq!(outcome.steps_skipped, 1);
    assert_eq!(client.paths(), vec!["/api/checkout"]);
    assert_eq!(rate(&collector, "http_req_failed"), (0, 1));
}

#[tokio::test(start_paused = true)]
async fn generated_variables_reach_url_and_body() {
    let client = Arc::new(FakeClient::new());
    let collector = MetricsCollector::new();
    let journey = Journey::new("product", 1.0)
        .with_variable("product", VariableGenerator::OneOf(vec![json!("456")]))
        .with_variable("quantity", VariableGenerator::Between(2, 2))
        .with_step(Step::get("detail", "/product/${product}"))
        .with_step(
            Step::post("add", "/api/cart/add")
                .with_json(json!({ "productId": "${product}", "quantity": "${quantity}" })),
        );

    let mut rng = StdRng::seed_from_u64(5);
    let mut ctx = IterationContext::new(7, 3, &base_vars(), &mut rng);
    runner(client.clone(), &collector)
        .run(&journey, &mut ctx, &AtomicBool::new(false))
        .await;

    let sent = client.sent.lock();
    assert_eq!(sent[0].url, "http://shop.test/product/456");
    match &sent[1].body {
        Some(journey_load::http::RequestBody::Json(body)) => {
            assert_eq!(body, &json!({ "productId": 456, "quantity": 2 }));
        }
        other => panic!("unexpected body {:?}", other),
    }
}

#[tokio::test(start_paused = true)]
async fn interrupt_stops_at_step_boundary() {
    let client = Arc::new(FakeClient::new());
    let collector = MetricsCollector::new();
    let journey = Journey::new("browse", 1.0)
        .with_step(Step::get("home", "/"))
        .with_step(Step::get("catalogue", "/catalogue"));

    let mut rng = StdRng::seed_from_u64(6);
    let mut ctx = IterationContext::new(1, 0, &base_vars(), &mut rng);
    let outcome = runner(client.clone(), &collector)
        .run(&journey, &mut ctx, &AtomicBool::new(true))
        .await;

    assert!(outcome.interrupted);
    assert_eq!(client.calls(), 0);
    assert!(matches!(
        collector.snapshot().metric(names::ITERATIONS),
        None | Some(SeriesValue::Counter { samples: 0, .. })
    ));
}
