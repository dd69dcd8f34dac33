//! Declarative user-journey load testing for HTTP services.
//!
//! A [`Scenario`] describes weighted [`Journey`]s of HTTP [`Step`]s, a ramp
//! profile of stages and a set of pass/fail [`Threshold`]s. The [`Runner`]
//! spawns virtual users that follow the profile, records every request and
//! check into tagged metric series, and judges the thresholds at the end.

pub mod cli;
pub mod config;
pub mod engine;
pub mod error;
pub mod http;
pub mod journey;
pub mod metrics;
pub mod scenarios;
pub mod thresholds;

pub use config::{Overrides, ScenarioFile};
pub use engine::{
    HealthCheck, Lifecycle, RampProfile, RunResult, Runner, Scenario, SchedulerState, Stage,
};
pub use error::{CheckError, ConfigError, MetricError, RunError, SetupError, TransportError};
pub use http::{HttpClient, HttpMethod, HttpRequest, ReqwestClient, Response};
pub use journey::{Check, Journey, Pacing, Step, VariableGenerator};
pub use metrics::{MetricKind, MetricsCollector};
pub use thresholds::{Threshold, ThresholdOutcome};

/// Every threshold passed.
pub const EXIT_OK: i32 = 0;
/// Any failure not covered by a more specific code.
pub const EXIT_FAILURE: i32 = 1;
/// The run completed but at least one threshold failed.
pub const EXIT_THRESHOLDS_FAILED: i32 = 99;
/// The scenario was rejected before any stage ran.
pub const EXIT_CONFIG_ERROR: i32 = 104;
/// The setup hook failed.
pub const EXIT_SETUP_ERROR: i32 = 107;
