//! Setup and teardown hooks run once around the stages.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;

use crate::error::SetupError;
use crate::http::{HttpClient, HttpMethod, HttpRequest};
use crate::journey::Variables;

/// User-supplied hooks around a run.
///
/// `setup` runs before the first stage; the variables it returns are copied
/// into every iteration context. An error aborts the run before any
/// virtual user starts.
#[async_trait]
pub trait Lifecycle: Send + Sync {
    async fn setup(
        &self,
        _client: &dyn HttpClient,
        _base_url: &str,
    ) -> Result<Variables, SetupError> {
        Ok(Variables::new())
    }

    async fn teardown(&self, _data: &Variables) {}
}

/// No setup, no teardown.
pub struct NoHooks;

#[async_trait]
impl Lifecycle for NoHooks {}

/// Verifies the target answers before load starts.
pub struct HealthCheck {
    pub path: String,
    pub expected_status: u16,
}

impl HealthCheck {
    pub fn new(path: impl Into<String>, expected_status: u16) -> Self {
        Self {
            path: path.into(),
            expected_status,
        }
    }
}

#[async_trait]
impl Lifecycle for HealthCheck {
    async fn setup(
        &self,
        client: &dyn HttpClient,
        base_url: &str,
    ) -> Result<Variables, SetupError> {
        let url = format!("{}{}", base_url.trim_end_matches('/'), self.path);
        let request = HttpRequest {
            method: HttpMethod::Get,
            url: url.clone(),
            headers: Default::default(),
            body: None,
        };

        let response = client
            .send(request)
            .await
            .map_err(|source| SetupError::Unreachable {
                url: url.clone(),
                source,
            })?;

        if response.status != self.expected_status {
            return Err(SetupError::Unhealthy {
                url,
                status: response.status,
                expected: self.expected_status,
            });
        }

        tracing::info!("Target reachable ({} -> {})", url, response.status);
        Ok(Variables::from([("base_url".to_string(), base_url.to_string())]))
    }

    async fn teardown(&self, _data: &Variables) {
        tracing::info!("Health-checked run finished");
    }
}

/// Runs a [`Lifecycle`]'s teardown at most once.
pub struct LifecycleGuard {
    hooks: Arc<dyn Lifecycle>,
    torn_down: AtomicBool,
}

impl LifecycleGuard {
    pub fn new(hooks: Arc<dyn Lifecycle>) -> Self {
        Self {
            hooks,
            torn_down: AtomicBool::new(false),
        }
    }

    pub async fn setup(
        &self,
        client: &dyn HttpClient,
        base_url: &str,
    ) -> Result<Variables, SetupError> {
        self.hooks.setup(client, base_url).await
    }

    /// Returns false when teardown already ran.
    pub async fn teardown(&self, data: &Variables) -> bool {
        if self.torn_down.swap(true, Ordering::AcqRel) {
            return false;
        }
        self.hooks.teardown(data).await;
        true
    }
}
