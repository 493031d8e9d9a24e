//! Builder pattern for AdaptiveController construction

use std::sync::Arc;

use crate::config::ControllerConfig;
use crate::error::{BenchError, BenchResult};
use crate::request::Target;
use crate::traits::BenchmarkExecutor;

use super::executor::AdaptiveController;

/// Builder for creating an AdaptiveController with validated configuration
///
/// # Example
///
/// ```ignore
/// let controller = ControllerBuilder::new()
///     .config(ControllerConfig::default())
///     .executor(executor)
///     .target(target)
///     .build()?;
/// ```
pub struct ControllerBuilder {
    config: ControllerConfig,
    executor: Option<Arc<dyn BenchmarkExecutor>>,
    target: Option<Target>,
}

impl ControllerBuilder {
    /// Create a new builder with default configuration
    pub fn new() -> Self {
        Self {
            config: ControllerConfig::default(),
            executor: None,
            target: None,
        }
    }

    /// Set the full controller configuration
    pub fn config(mut self, config: ControllerConfig) -> Self {
        self.config = config;
        self
    }

    /// Set the throughput threshold
    pub fn threshold(mut self, threshold: f64) -> Self {
        self.config.threshold = threshold;
        self
    }

    /// Set the benchmark executor
    pub fn executor(mut self, executor: Arc<dyn BenchmarkExecutor>) -> Self {
        self.executor = Some(executor);
        self
    }

    /// Set the benchmark target
    pub fn target(mut self, target: Target) -> Self {
        self.target = Some(target);
        self
    }

    /// Build the controller
    ///
    /// # Errors
    ///
    /// Returns an error if the executor or target are not set, or if
    /// configuration validation fails.
    pub fn build(self) -> BenchResult<AdaptiveController> {
        let executor = self
            .executor
            .ok_or_else(|| BenchError::missing_config("executor"))?;

        let target = self
            .target
            .ok_or_else(|| BenchError::missing_config("target"))?;

        self.config
            .validate()
            .map_err(|e| BenchError::config(e.to_string()))?;

        Ok(AdaptiveController::new(self.config, executor, target))
    }
}

impl Default for ControllerBuilder {
    fn default() -> Self {
        Self::new()
    }
}
