// Scenarios module
// Built-in storefront scenarios, expressed as scenario files

pub mod checkout;
pub mod load;
pub mod smoke;
pub mod stress;

use std::collections::BTreeMap;
use std::time::Duration;

use crate::config::{
    CheckSpec, HumanDuration, JourneySpec, PacingSpec, StageSpec, StepSpec, ThresholdExprs,
};
use crate::journey::VariableGenerator;
use crate::metrics::Tags;

pub const DEFAULT_TARGET_URL: &str = "https://shopflutter.web.app";

/// Catalogue entries the journeys browse.
pub const PRODUCT_IDS: [&str; 3] = ["123", "456", "789"];

pub(crate) fn common_headers() -> BTreeMap<String, String> {
    [
        ("User-Agent", "JourneyLoad-ShopFlutter/1.0"),
        (
            "Accept",
            "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8",
        ),
        ("Accept-Language", "fr-FR,fr;q=0.9,en;q=0.8"),
        ("Connection", "keep-alive"),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v.to_string()))
    .collect()
}

/// Latency, failure and check thresholds shared by the storefront presets.
pub(crate) fn common_thresholds() -> BTreeMap<String, ThresholdExprs> {
    thresholds(&[
        ("http_req_duration", "p(95)<1000"),
        ("http_req_duration{type:page}", "p(99)<2000"),
        ("http_req_failed", "rate<0.01"),
        ("checks", "rate>0.99"),
    ])
}

pub(crate) fn thresholds(pairs: &[(&str, &str)]) -> BTreeMap<String, ThresholdExprs> {
    let mut map: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for (metric, expression) in pairs {
        map.entry(metric.to_string())
            .or_default()
            .push(expression.to_string());
    }
    map.into_iter()
        .map(|(metric, exprs)| (metric, ThresholdExprs::Many(exprs)))
        .collect()
}

pub(crate) fn random_product() -> VariableGenerator {
    VariableGenerator::OneOf(
        PRODUCT_IDS
            .iter()
            .map(|id| serde_json::Value::String(id.to_string()))
            .collect(),
    )
}

pub(crate) fn stage(secs: u64, target: i64) -> StageSpec {
    StageSpec {
        duration: Duration::from_secs(secs).into(),
        target,
    }
}

pub(crate) fn journey(name: &str, weight: f64, steps: Vec<StepSpec>) -> JourneySpec {
    JourneySpec {
        name: name.to_string(),
        weight,
        error_metric: None,
        duration_metric: None,
        pacing: None,
        variables: BTreeMap::new(),
        steps,
    }
}

pub(crate) fn get(name: &str, url: &str) -> StepSpec {
    StepSpec {
        name: name.to_string(),
        method: "GET".to_string(),
        url: url.to_string(),
        headers: BTreeMap::new(),
        json: None,
        text: None,
        checks: Vec::new(),
        acceptable_statuses: None,
        pacing: None,
        critical: false,
        track_errors: true,
        when_previous_status: None,
        tags: Tags::new(),
    }
}

pub(crate) fn post_json(name: &str, url: &str, body: serde_json::Value) -> StepSpec {
    StepSpec {
        method: "POST".to_string(),
        json: Some(body),
        ..get(name, url)
    }
}

pub(crate) fn tagged(mut step: StepSpec, pairs: &[(&str, &str)]) -> StepSpec {
    step.tags
        .extend(pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())));
    step
}

pub(crate) fn paced(mut step: StepSpec, millis: u64) -> StepSpec {
    step.pacing = Some(PacingSpec::Fixed(HumanDuration(Duration::from_millis(millis))));
    step
}

pub(crate) fn status_is(name: &str, codes: &[u16]) -> CheckSpec {
    CheckSpec {
        name: name.to_string(),
        status: Some(codes.to_vec()),
        ..Default::default()
    }
}

pub(crate) fn faster_than(name: &str, millis: u64) -> CheckSpec {
    CheckSpec {
        name: name.to_string(),
        duration_below: Some(HumanDuration(Duration::from_millis(millis))),
        ..Default::default()
    }
}

pub(crate) fn body_has(name: &str, needles: &[&str]) -> CheckSpec {
    CheckSpec {
        name: name.to_string(),
        body_contains: Some(needles.iter().map(|n| n.to_string()).collect()),
        ..Default::default()
    }
}

/// Default statuses plus 404 for endpoints that may not exist yet.
pub(crate) fn ok_or_missing() -> Vec<u16> {
    (200..400).chain([404]).collect()
}
