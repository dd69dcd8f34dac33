//! Error types for scenario configuration and execution.
//!
//! Only [`RunError`] aborts a run. Transport and check errors are recorded as
//! failed checks and the virtual user carries on with its journey.

use std::time::Duration;
use thiserror::Error;

/// Malformed scenario configuration, rejected before any stage starts.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read scenario file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse scenario file: {0}")]
    Parse(String),

    #[error("scenario defines no journeys")]
    NoJourneys,

    #[error("journey '{0}' has no steps")]
    EmptyJourney(String),

    #[error("journey '{journey}' has invalid weight {weight}")]
    InvalidWeight { journey: String, weight: f64 },

    #[error("journey weights sum to zero")]
    ZeroTotalWeight,

    #[error("journey weights overflow when summed")]
    TotalWeightOverflow,

    #[error("scenario defines no stages")]
    NoStages,

    #[error("stage {index}: {reason}")]
    InvalidStage { index: usize, reason: String },

    #[error("invalid duration '{value}': {reason}")]
    InvalidDuration { value: String, reason: String },

    #[error("invalid base url '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("step '{step}': {reason}")]
    InvalidStep { step: String, reason: String },

    #[error("step '{step}': unsupported HTTP method '{method}'")]
    InvalidMethod { step: String, method: String },

    #[error("variable '{name}': {reason}")]
    InvalidVariable { name: String, reason: String },

    #[error("invalid pacing: {0}")]
    InvalidPacing(String),

    #[error("invalid threshold '{expression}' on '{metric}': {reason}")]
    InvalidThreshold {
        metric: String,
        expression: String,
        reason: String,
    },

    #[error("metric '{name}' is declared as both {first} and {second}")]
    MetricKindConflict {
        name: String,
        first: &'static str,
        second: &'static str,
    },

    #[error("threshold references unknown metric '{0}'")]
    UnknownMetric(String),

    #[error("invalid metric selector '{0}'")]
    InvalidSelector(String),
}

/// Pre-flight failure in the setup hook.
#[derive(Debug, Error)]
pub enum SetupError {
    #[error("health check {url} returned status {status}, expected {expected}")]
    Unhealthy {
        url: String,
        status: u16,
        expected: u16,
    },

    #[error("health check {url} failed: {source}")]
    Unreachable {
        url: String,
        #[source]
        source: TransportError,
    },

    #[error("setup failed: {0}")]
    Hook(#[from] anyhow::Error),
}

/// Network-level failure of a single HTTP call.
#[derive(Debug, Clone, Error)]
pub enum TransportError {
    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    #[error("connection failed: {0}")]
    Connect(String),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("transport error: {0}")]
    Other(String),
}

impl TransportError {
    /// Short label used as the `error` tag on failed requests.
    pub fn kind(&self) -> &'static str {
        match self {
            TransportError::Timeout(_) => "timeout",
            TransportError::Connect(_) => "connect",
            TransportError::InvalidRequest(_) => "invalid_request",
            TransportError::Other(_) => "other",
        }
    }
}

/// A check predicate that errored instead of answering.
#[derive(Debug, Clone, Error)]
pub enum CheckError {
    #[error("check '{check}' failed to evaluate: {reason}")]
    Predicate { check: String, reason: String },

    #[error("check '{0}' panicked")]
    Panicked(String),
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum MetricError {
    #[error("metric '{name}' is a {expected}, cannot record a {actual} observation")]
    KindMismatch {
        name: String,
        expected: &'static str,
        actual: &'static str,
    },
}

/// Fatal errors that stop a run before it produces a result.
#[derive(Debug, Error)]
pub enum RunError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Setup(#[from] SetupError),
}

impl RunError {
    /// Process exit status for this failure.
    pub fn exit_code(&self) -> i32 {
        match self {
            RunError::Config(_) => crate::EXIT_CONFIG_ERROR,
            RunError::Setup(_) => crate::EXIT_SETUP_ERROR,
        }
    }
}
