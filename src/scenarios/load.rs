//! General load test - one shopper journey at a steady 10 virtual users

use serde_json::json;

use super::*;
use crate::config::ScenarioFile;

pub fn scenario() -> ScenarioFile {
    let mut browse = journey(
        "shopper",
        1.0,
        vec![
            paced(
                tagged(get("homepage", "/"), &[("type", "page")]),
                1000,
            ),
            paced(
                tagged(get("catalogue", "/catalogue"), &[("type", "page")]),
                1000,
            ),
            paced(
                tagged(get("product_detail", "/product/${product}"), &[("type", "page")]),
                2000,
            ),
            paced(
                tagged(
                    post_json(
                        "add_to_cart",
                        "/api/cart/add",
                        json!({ "productId": "${product}", "quantity": "${quantity}" }),
                    ),
                    &[("type", "api")],
                ),
                1000,
            ),
            paced(tagged(get("cart", "/cart"), &[("type", "page")]), 2000),
        ],
    );
    browse.error_metric = Some("errors".to_string());
    browse.variables.insert("product".to_string(), random_product());
    browse
        .variables
        .insert("quantity".to_string(), VariableGenerator::Between(1, 3));

    let steps = &mut browse.steps;
    steps[0].checks = vec![
        status_is("Homepage status 200", &[200]),
        faster_than("Homepage loads in <2s", 2000),
        body_has("Homepage contains title", &["ShopFlutter", "shop"]),
    ];
    steps[1].checks = vec![
        status_is("Catalogue status 200", &[200]),
        faster_than("Catalogue loads in <3s", 3000),
    ];
    steps[2].checks = vec![
        status_is("Product detail status 200", &[200]),
        faster_than("Product detail loads in <2s", 2000),
    ];
    steps[3].acceptable_statuses = Some(ok_or_missing());
    steps[3].checks = vec![status_is("Add to cart success or expected 404", &[200, 404])];
    steps[4].checks = vec![status_is("Cart page accessible", &[200])];
    steps[4].track_errors = false;

    ScenarioFile {
        name: "load".to_string(),
        base_url: DEFAULT_TARGET_URL.to_string(),
        headers: common_headers(),
        stages: vec![stage(30, 10), stage(120, 10), stage(30, 0)],
        start_vus: 0,
        vus: None,
        duration: None,
        graceful_stop: None,
        discard_response_bodies: false,
        setup: None,
        journeys: vec![browse],
        thresholds: common_thresholds(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shape() {
        let file = scenario();
        assert_eq!(file.stages.len(), 3);
        assert_eq!(file.journeys[0].steps.len(), 5);
        assert!(file.thresholds.contains_key("http_req_duration{type:page}"));
    }
}
