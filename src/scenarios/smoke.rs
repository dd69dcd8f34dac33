//! Smoke test - 50 virtual users hitting the home page and catalogue for a minute

use super::*;
use crate::config::ScenarioFile;

pub fn scenario() -> ScenarioFile {
    let mut home = get("home", "/");
    home.checks = vec![status_is("home 200", &[200])];

    let mut catalog = paced(get("catalog", "/#/catalog"), 1000);
    catalog.checks = vec![status_is("catalog 200", &[200])];

    ScenarioFile {
        name: "smoke".to_string(),
        base_url: DEFAULT_TARGET_URL.to_string(),
        headers: BTreeMap::new(),
        stages: Vec::new(),
        start_vus: 0,
        vus: Some(50),
        duration: Some(Duration::from_secs(60).into()),
        graceful_stop: None,
        discard_response_bodies: false,
        setup: None,
        journeys: vec![journey("smoke", 1.0, vec![home, catalog])],
        thresholds: thresholds(&[
            ("http_req_duration", "p(95)<800"),
            ("http_req_failed", "rate<0.01"),
        ]),
    }
}
