//! Named response checks and their evaluation.

use std::collections::BTreeSet;
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Duration;

use crate::error::{CheckError, TransportError};
use crate::http::Response;
use crate::metrics::{names, MetricsCollector, Tags};

/// Check name recorded when the request itself never produced a response.
pub const TRANSPORT_ERROR_CHECK: &str = "TransportError";

pub type Predicate = Arc<dyn Fn(&Response) -> Result<bool, String> + Send + Sync>;

#[derive(Clone)]
pub enum CheckRule {
    /// Status is one of the listed codes.
    Status(BTreeSet<u16>),
    /// Status is in the step's acceptable set.
    StatusAcceptable,
    /// Response arrived faster than the limit.
    DurationBelow(Duration),
    /// Body contains at least one of the needles.
    BodyContains(Vec<String>),
    HeaderPresent(String),
    Custom(Predicate),
}

impl fmt::Debug for CheckRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CheckRule::Status(codes) => f.debug_tuple("Status").field(codes).finish(),
            CheckRule::StatusAcceptable => f.write_str("StatusAcceptable"),
            CheckRule::DurationBelow(limit) => f.debug_tuple("DurationBelow").field(limit).finish(),
            CheckRule::BodyContains(needles) => {
                f.debug_tuple("BodyContains").field(needles).finish()
            }
            CheckRule::HeaderPresent(name) => f.debug_tuple("HeaderPresent").field(name).finish(),
            CheckRule::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}

/// A named boolean assertion against a [`Response`].
#[derive(Debug, Clone)]
pub struct Check {
    pub name: String,
    pub rule: CheckRule,
}

impl Check {
    pub fn new(name: impl Into<String>, rule: CheckRule) -> Self {
        Self {
            name: name.into(),
            rule,
        }
    }

    pub fn status(name: impl Into<String>, codes: impl IntoIterator<Item = u16>) -> Self {
        Self::new(name, CheckRule::Status(codes.into_iter().collect()))
    }

    pub fn status_acceptable(name: impl Into<String>) -> Self {
        Self::new(name, CheckRule::StatusAcceptable)
    }

    pub fn duration_below(name: impl Into<String>, limit: Duration) -> Self {
        Self::new(name, CheckRule::DurationBelow(limit))
    }

    pub fn body_contains<S: Into<String>>(
        name: impl Into<String>,
        needles: impl IntoIterator<Item = S>,
    ) -> Self {
        Self::new(
            name,
            CheckRule::BodyContains(needles.into_iter().map(Into::into).collect()),
        )
    }

    pub fn header_present(name: impl Into<String>, header: impl Into<String>) -> Self {
        Self::new(name, CheckRule::HeaderPresent(header.into()))
    }

    pub fn custom<F>(name: impl Into<String>, predicate: F) -> Self
    where
        F: Fn(&Response) -> Result<bool, String> + Send + Sync + 'static,
    {
        Self::new(name, CheckRule::Custom(Arc::new(predicate)))
    }

    /// Run the predicate. Errors and panics surface as [`CheckError`].
    pub fn evaluate(
        &self,
        response: &Response,
        acceptable: &BTreeSet<u16>,
    ) -> Result<bool, CheckError> {
        match &self.rule {
            CheckRule::Status(codes) => Ok(codes.contains(&response.status)),
            CheckRule::StatusAcceptable => Ok(acceptable.contains(&response.status)),
            CheckRule::DurationBelow(limit) => Ok(response.elapsed < *limit),
            CheckRule::BodyContains(needles) => {
                Ok(needles.iter().any(|n| response.body.contains(n.as_str())))
            }
            CheckRule::HeaderPresent(header) => Ok(response.header(header).is_some()),
            CheckRule::Custom(predicate) => {
                match catch_unwind(AssertUnwindSafe(|| predicate(response))) {
                    Ok(Ok(passed)) => Ok(passed),
                    Ok(Err(reason)) => Err(CheckError::Predicate {
                        check: self.name.clone(),
                        reason,
                    }),
                    Err(_) => Err(CheckError::Panicked(self.name.clone())),
                }
            }
        }
    }
}

/// Result of running a step's checks.
#[derive(Debug, Clone, Default)]
pub struct CheckOutcome {
    /// AND of every check; true when there were no checks.
    pub passed: bool,
    pub failed: Vec<String>,
    pub errors: Vec<CheckError>,
}

/// Runs checks and records each outcome into the `checks` rate.
///
/// Every outcome is one observation on the series
/// `checks{journey,step,check}`, so `checks`, `checks{journey:..}` and
/// `checks{check:..}` are all views over the same observations.
pub struct CheckEvaluator<'a> {
    collector: &'a MetricsCollector,
}

impl<'a> CheckEvaluator<'a> {
    pub fn new(collector: &'a MetricsCollector) -> Self {
        Self { collector }
    }

    /// Evaluate `checks` in declaration order against `response`.
    pub fn evaluate(
        &self,
        response: &Response,
        checks: &[Check],
        acceptable: &BTreeSet<u16>,
        tags: &Tags,
    ) -> CheckOutcome {
        let mut outcome = CheckOutcome {
            passed: true,
            ..Default::default()
        };

        for check in checks {
            let passed = match check.evaluate(response, acceptable) {
                Ok(passed) => passed,
                Err(e) => {
                    tracing::warn!("{}", e);
                    outcome.errors.push(e);
                    false
                }
            };

            self.record(&check.name, tags, passed);
            if !passed {
                outcome.passed = false;
                outcome.failed.push(check.name.clone());
            }
        }

        outcome
    }

    /// Record a transport failure as a single failed check.
    pub fn record_transport_error(&self, error: &TransportError, tags: &Tags) -> CheckOutcome {
        tracing::debug!("Transport error recorded as failed check: {}", error);
        self.record(TRANSPORT_ERROR_CHECK, tags, false);
        CheckOutcome {
            passed: false,
            failed: vec![TRANSPORT_ERROR_CHECK.to_string()],
            errors: Vec::new(),
        }
    }

    fn record(&self, check: &str, tags: &Tags, passed: bool) {
        let mut tags = tags.clone();
        tags.insert("check".to_string(), check.to_string());
        self.collector.add_rate(names::CHECKS, &tags, passed);
    }
}
