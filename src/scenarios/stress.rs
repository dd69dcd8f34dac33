//! Stress test - four weighted shopper profiles ramping to 100 virtual users

use serde_json::json;

use super::*;
use crate::config::{HealthCheckSpec, ScenarioFile, SetupSpec};

fn ok(step: StepSpec, check: &str) -> StepSpec {
    StepSpec {
        checks: vec![status_is(check, &[200])],
        ..step
    }
}

fn in_flow(step: StepSpec, flow: &str) -> StepSpec {
    tagged(step, &[("flow", flow)])
}

pub fn scenario() -> ScenarioFile {
    let basic_navigation = journey(
        "basic_navigation",
        40.0,
        vec![
            paced(in_flow(ok(get("homepage", "/"), "Homepage OK"), "basic_nav"), 500),
            in_flow(ok(get("catalogue", "/catalogue"), "Catalogue OK"), "basic_nav"),
        ],
    );

    let mut add_cart = in_flow(
        post_json(
            "add_cart",
            "/api/cart/add",
            json!({ "productId": "${product}", "quantity": 1 }),
        ),
        "product_view",
    );
    add_cart.acceptable_statuses = Some(ok_or_missing());
    add_cart.checks = vec![status_is("Add to cart handled", &[200, 404])];
    add_cart.track_errors = false;

    let mut product_consultation = journey(
        "product_consultation",
        30.0,
        vec![
            paced(
                in_flow(
                    ok(get("detail", "/product/${product}"), "Product detail OK"),
                    "product_view",
                ),
                1000,
            ),
            add_cart,
        ],
    );
    product_consultation
        .variables
        .insert("product".to_string(), random_product());

    let mut purchase_simulation = journey(
        "purchase_simulation",
        20.0,
        [
            ("catalogue", "/catalogue"),
            ("product", "/product/${product}"),
            ("cart", "/cart"),
            ("checkout", "/checkout"),
        ]
        .into_iter()
        .map(|(name, path)| {
            paced(
                in_flow(ok(get(name, path), &format!("{} accessible", name)), "purchase_flow"),
                300,
            )
        })
        .collect(),
    );
    purchase_simulation
        .variables
        .insert("product".to_string(), random_product());

    let mut intensive_stress = journey(
        "intensive_stress",
        10.0,
        [("home", "/"), ("catalogue", "/catalogue"), ("product", "/product/${product}")]
            .into_iter()
            .enumerate()
            .map(|(index, (name, path))| {
                in_flow(
                    ok(get(name, path), &format!("Intensive request {} OK", index + 1)),
                    "intensive",
                )
            })
            .collect(),
    );
    intensive_stress
        .variables
        .insert("product".to_string(), random_product());

    let mut journeys = vec![
        basic_navigation,
        product_consultation,
        purchase_simulation,
        intensive_stress,
    ];
    for journey in &mut journeys {
        journey.error_metric = Some("stress_errors".to_string());
        journey.pacing = Some(PacingSpec::Range {
            min: Duration::from_millis(500).into(),
            max: Duration::from_millis(3500).into(),
        });
    }

    ScenarioFile {
        name: "stress".to_string(),
        base_url: DEFAULT_TARGET_URL.to_string(),
        headers: BTreeMap::new(),
        stages: vec![stage(60, 10), stage(180, 50), stage(120, 100), stage(60, 0)],
        start_vus: 0,
        vus: None,
        duration: None,
        graceful_stop: None,
        discard_response_bodies: true,
        setup: Some(SetupSpec {
            health_check: Some(HealthCheckSpec {
                path: "/".to_string(),
                expect_status: 200,
            }),
        }),
        journeys,
        thresholds: thresholds(&[
            ("http_req_duration", "p(95)<3000"),
            ("http_req_failed", "rate<0.05"),
            ("stress_errors", "rate<0.1"),
        ]),
    }
}
