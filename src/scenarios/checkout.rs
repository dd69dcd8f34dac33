//! Checkout load test - the six-step purchase flow with strict thresholds

use serde_json::json;

use super::*;
use crate::config::{HealthCheckSpec, ScenarioFile, SetupSpec};

pub fn scenario() -> ScenarioFile {
    let flow = |step: StepSpec, label: &str| {
        tagged(step, &[("flow", "checkout"), ("checkout_step", label)])
    };

    let mut homepage = paced(flow(get("homepage", "/"), "1_homepage"), 1000);
    homepage.checks = vec![
        status_is("[1/6] Homepage loaded", &[200]),
        faster_than("[1/6] Homepage fast", 1000),
    ];

    let mut catalogue = paced(flow(get("catalogue", "/catalogue"), "2_catalogue"), 2000);
    catalogue.checks = vec![
        status_is("[2/6] Catalogue reachable", &[200]),
        faster_than("[2/6] Catalogue fast", 1500),
    ];

    let mut product = paced(
        flow(get("product_detail", "/product/${product}"), "3_product_detail"),
        3000,
    );
    product.checks = vec![
        status_is("[3/6] Product detail OK", &[200]),
        faster_than("[3/6] Product detail fast", 1200),
    ];

    let mut add_to_cart = paced(
        flow(
            post_json(
                "add_to_cart",
                "/api/cart/add",
                json!({
                    "productId": "${product}",
                    "quantity": "${quantity}",
                    "variantId": "default",
                    "timestamp": "${now}",
                }),
            ),
            "4_add_to_cart",
        ),
        1000,
    );
    add_to_cart.acceptable_statuses = Some(ok_or_missing());
    add_to_cart.checks = vec![
        status_is("[4/6] Add to cart handled", &[200, 404]),
        faster_than("[4/6] Add to cart fast", 800),
    ];

    let mut cart = paced(flow(get("cart_review", "/cart"), "5_cart_review"), 2000);
    cart.checks = vec![
        status_is("[5/6] Cart page reachable", &[200]),
        faster_than("[5/6] Cart page fast", 1000),
    ];

    let mut checkout = flow(
        post_json(
            "checkout_process",
            "/api/checkout",
            json!({
                "items": [{ "productId": "${product}", "quantity": 1, "price": 29.99 }],
                "total": 29.99,
                "currency": "EUR",
                "customerEmail": "test@shopflutter.com",
                "shippingAddress": {
                    "street": "123 Test Street",
                    "city": "Test City",
                    "postalCode": "12345",
                    "country": "FR"
                },
                "paymentMethod": "stripe_test"
            }),
        ),
        "6_checkout_process",
    );
    checkout.acceptable_statuses = Some(ok_or_missing());
    checkout.checks = vec![
        status_is("[6/6] Checkout handled", &[200, 404]),
        faster_than("[6/6] Checkout acceptable", 2000),
    ];

    // Only reached when the checkout call returned 200.
    let mut success = paced(flow(get("success_page", "/order/success"), "7_success_page"), 500);
    success.when_previous_status = Some(vec![200]);
    success.track_errors = false;
    success.checks = vec![status_is("[Bonus] Success page reachable", &[200])];

    let mut purchase = journey(
        "checkout",
        1.0,
        vec![homepage, catalogue, product, add_to_cart, cart, checkout, success],
    );
    purchase.error_metric = Some("checkout_errors".to_string());
    purchase.duration_metric = Some("checkout_duration".to_string());
    // Finalisation think time, whether or not the success page ran.
    purchase.pacing = Some(PacingSpec::Fixed(HumanDuration(Duration::from_secs(1))));
    purchase.variables.insert("product".to_string(), random_product());
    purchase
        .variables
        .insert("quantity".to_string(), VariableGenerator::Between(1, 2));
    purchase
        .variables
        .insert("now".to_string(), VariableGenerator::Timestamp);

    ScenarioFile {
        name: "checkout".to_string(),
        base_url: DEFAULT_TARGET_URL.to_string(),
        headers: common_headers(),
        stages: vec![stage(20, 20), stage(90, 20), stage(20, 0)],
        start_vus: 0,
        vus: None,
        duration: None,
        graceful_stop: None,
        discard_response_bodies: false,
        setup: Some(SetupSpec {
            health_check: Some(HealthCheckSpec {
                path: "/".to_string(),
                expect_status: 200,
            }),
        }),
        journeys: vec![purchase],
        thresholds: thresholds(&[
            ("http_req_duration", "p(95)<1500"),
            ("http_req_failed", "rate<0.005"),
            ("checkout_errors", "rate<0.01"),
            ("checkout_duration", "p(95)<2000"),
            ("checks", "rate>0.99"),
        ]),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::journey::Pacing;

    #[test]
    fn test_success_page_is_conditional() {
        let file = scenario();
        let steps = &file.journeys[0].steps;
        assert_eq!(steps.len(), 7);
        assert_eq!(steps[6].when_previous_status, Some(vec![200]));
        assert!(file.setup.is_some());
    }

    #[test]
    fn test_iteration_think_time_survives_missing_checkout() {
        let scenario = scenario()
            .into_scenario(&crate::config::Overrides::default())
            .unwrap();
        let journey = &scenario.journeys[0];
        assert_eq!(journey.pacing, Pacing::Fixed(Duration::from_secs(1)));
        assert_eq!(journey.steps[5].pacing, Pacing::None);
        assert_eq!(
            journey.steps[6].pacing,
            Pacing::Fixed(Duration::from_millis(500))
        );
    }
}
