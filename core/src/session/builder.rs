//! Builder pattern for SessionOrchestrator construction

use std::sync::Arc;

use tokio::sync::broadcast;

use crate::config::SessionConfig;
use crate::error::{BenchError, BenchResult};
use crate::request::ApiKey;
use crate::traits::{ContainerRuntime, Operator};

use super::executor::SessionOrchestrator;

/// Builder for creating a SessionOrchestrator
///
/// # Example
///
/// ```ignore
/// let session = SessionBuilder::new()
///     .runtime(runtime)
///     .operator(operator)
///     .api_key(key)
///     .build()?;
/// let ready = session.prepare(&entry.image_reference, "0,1").await?;
/// ```
pub struct SessionBuilder {
    config: SessionConfig,
    runtime: Option<Arc<dyn ContainerRuntime>>,
    operator: Option<Arc<dyn Operator>>,
    api_key: Option<ApiKey>,
    shutdown: Option<broadcast::Sender<()>>,
}

impl SessionBuilder {
    /// Create a new builder with default configuration
    pub fn new() -> Self {
        Self {
            config: SessionConfig::default(),
            runtime: None,
            operator: None,
            api_key: None,
            shutdown: None,
        }
    }

    /// Set the full session configuration
    pub fn config(mut self, config: SessionConfig) -> Self {
        self.config = config;
        self
    }

    /// Set the container runtime
    pub fn runtime(mut self, runtime: Arc<dyn ContainerRuntime>) -> Self {
        self.runtime = Some(runtime);
        self
    }

    /// Set the operator consulted before cleanup
    pub fn operator(mut self, operator: Arc<dyn Operator>) -> Self {
        self.operator = Some(operator);
        self
    }

    /// Set the credential exported into the container
    pub fn api_key(mut self, api_key: ApiKey) -> Self {
        self.api_key = Some(api_key);
        self
    }

    /// Cancel readiness waits through this channel instead of a private one
    pub fn shutdown(mut self, shutdown: broadcast::Sender<()>) -> Self {
        self.shutdown = Some(shutdown);
        self
    }

    /// Build the orchestrator
    ///
    /// # Errors
    ///
    /// Returns a config error if the runtime, operator or credential are
    /// missing, or if validation fails.
    pub fn build(self) -> BenchResult<SessionOrchestrator> {
        let runtime = self
            .runtime
            .ok_or_else(|| BenchError::missing_config("runtime"))?;
        let operator = self
            .operator
            .ok_or_else(|| BenchError::missing_config("operator"))?;
        let api_key = self
            .api_key
            .ok_or_else(|| BenchError::missing_config("api key"))?;

        self.config
            .validate()
            .map_err(|e| BenchError::config(e.to_string()))?;

        Ok(match self.shutdown {
            Some(shutdown) => {
                SessionOrchestrator::with_shutdown(self.config, runtime, operator, api_key, shutdown)
            }
            None => SessionOrchestrator::new(self.config, runtime, operator, api_key),
        })
    }
}

impl Default for SessionBuilder {
    fn default() -> Self {
        Self::new()
    }
}
