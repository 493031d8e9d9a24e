//! Run configuration types

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::request::REQUESTS_PER_SLOT;

/// Fixed seed concurrency for adaptive runs
pub const DEFAULT_INITIAL_CONCURRENCY: u32 = 10;

/// Tokens-per-second floor below which an adaptive run stops
pub const DEFAULT_TPS_THRESHOLD: f64 = 12.0;

/// Container output substring that signals the server accepts requests
pub const DEFAULT_READINESS_MARKER: &str = "Uvicorn running on";

/// Port the model server is published on
pub const DEFAULT_PORT: u16 = 8000;

/// Adaptive controller configuration
///
/// Governs the probing loop: where it starts, when it stops and what each
/// executor call looks like.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ControllerConfig {
    /// Concurrency of the first adaptive iteration
    pub initial_concurrency: u32,

    /// Throughput floor (tokens per second)
    pub threshold: f64,

    /// Requests per concurrency slot in each adaptive iteration
    ///
    /// Accepted for round-tripping reports; anything other than
    /// [`REQUESTS_PER_SLOT`] fails validation.
    pub requests_per_slot: u32,

    /// Seconds over which an iteration's workers start
    pub ramp_seconds: u64,

    /// `max_tokens` sent with every completion request
    pub max_tokens: u32,

    /// Use streaming completions
    pub stream: bool,

    /// Stop after this many iterations
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_iterations: Option<u32>,

    /// Never probe beyond this concurrency
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_concurrency: Option<u32>,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            initial_concurrency: DEFAULT_INITIAL_CONCURRENCY,
            threshold: DEFAULT_TPS_THRESHOLD,
            requests_per_slot: REQUESTS_PER_SLOT,
            ramp_seconds: 30,
            max_tokens: 100,
            stream: false,
            max_iterations: Some(20),
            max_concurrency: Some(4096),
        }
    }
}

impl ControllerConfig {
    /// Set the throughput threshold
    pub fn with_threshold(mut self, threshold: f64) -> Self {
        self.threshold = threshold;
        self
    }

    /// Set the seed concurrency
    pub fn with_initial_concurrency(mut self, concurrency: u32) -> Self {
        self.initial_concurrency = concurrency;
        self
    }

    /// Set the iteration guard
    pub fn with_max_iterations(mut self, max: Option<u32>) -> Self {
        self.max_iterations = max;
        self
    }

    /// Set the concurrency guard
    pub fn with_max_concurrency(mut self, max: Option<u32>) -> Self {
        self.max_concurrency = max;
        self
    }

    /// Set the ramp window
    pub fn with_ramp_seconds(mut self, secs: u64) -> Self {
        self.ramp_seconds = secs;
        self
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.initial_concurrency == 0 {
            return Err(ConfigError::InvalidConcurrency(
                "initial concurrency must be at least 1".into(),
            ));
        }

        if !self.threshold.is_finite() || self.threshold <= 0.0 {
            return Err(ConfigError::InvalidThreshold(format!(
                "threshold must be a positive number, got {}",
                self.threshold
            )));
        }

        if self.requests_per_slot != REQUESTS_PER_SLOT {
            return Err(ConfigError::InvalidValue(format!(
                "requests_per_slot is fixed at {REQUESTS_PER_SLOT}, got {}",
                self.requests_per_slot
            )));
        }

        if self.max_tokens == 0 {
            return Err(ConfigError::InvalidValue("max_tokens must be at least 1".into()));
        }

        if self.max_iterations == Some(0) {
            return Err(ConfigError::InvalidGuard(
                "max_iterations must be at least 1".into(),
            ));
        }

        if let Some(max) = self.max_concurrency {
            if max < self.initial_concurrency {
                return Err(ConfigError::InvalidGuard(format!(
                    "max_concurrency ({max}) is below initial concurrency ({})",
                    self.initial_concurrency
                )));
            }
        }

        Ok(())
    }
}

/// Which containers the cleanup step may stop
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CleanupScope {
    /// Only containers this tool launched (label-scoped)
    #[default]
    Managed,
    /// Every container on the host
    All,
}

/// Session orchestration configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Host port the model server is published on
    pub port: u16,

    /// Host used to reach the server
    pub host: String,

    /// Model cache directory mounted into the container
    pub cache_dir: PathBuf,

    /// Substring of the container output that signals readiness
    pub readiness_marker: String,

    /// Upper bound on the readiness wait
    #[serde(with = "duration_secs")]
    pub readiness_timeout: Duration,

    /// Pause after cleanup before re-checking the port
    #[serde(with = "duration_secs")]
    pub cleanup_grace: Duration,

    /// Cleanup policy
    pub cleanup_scope: CleanupScope,

    /// Shared memory size handed to the container
    pub shm_size: String,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            host: "0.0.0.0".to_string(),
            cache_dir: default_cache_dir(),
            readiness_marker: DEFAULT_READINESS_MARKER.to_string(),
            readiness_timeout: Duration::from_secs(1800),
            cleanup_grace: Duration::from_secs(5),
            cleanup_scope: CleanupScope::Managed,
            shm_size: "16GB".to_string(),
        }
    }
}

impl SessionConfig {
    /// Root URL of the served model, e.g. `http://0.0.0.0:8000`
    pub fn server_root(&self) -> String {
        format!("http://{}:{}", self.host, self.port)
    }

    /// Set the readiness timeout
    pub fn with_readiness_timeout(mut self, timeout: Duration) -> Self {
        self.readiness_timeout = timeout;
        self
    }

    /// Set the post-cleanup grace period
    pub fn with_cleanup_grace(mut self, grace: Duration) -> Self {
        self.cleanup_grace = grace;
        self
    }

    /// Set the cleanup scope
    pub fn with_cleanup_scope(mut self, scope: CleanupScope) -> Self {
        self.cleanup_scope = scope;
        self
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.port == 0 {
            return Err(ConfigError::InvalidValue("port must be non-zero".into()));
        }
        if self.readiness_marker.trim().is_empty() {
            return Err(ConfigError::InvalidValue(
                "readiness marker must not be empty".into(),
            ));
        }
        if self.readiness_timeout.is_zero() {
            return Err(ConfigError::InvalidValue(
                "readiness timeout must be positive".into(),
            ));
        }
        Ok(())
    }
}

/// `~/.cache/nim`, or `.cache/nim` relative to the working directory when
/// `HOME` is unset
pub fn default_cache_dir() -> PathBuf {
    std::env::var_os("HOME")
        .map(PathBuf::from)
        .unwrap_or_default()
        .join(".cache")
        .join("nim")
}

/// Configuration validation errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Invalid concurrency value
    #[error("Invalid concurrency: {0}")]
    InvalidConcurrency(String),

    /// Invalid throughput threshold
    #[error("Invalid threshold: {0}")]
    InvalidThreshold(String),

    /// Invalid iteration or concurrency guard
    #[error("Invalid guard: {0}")]
    InvalidGuard(String),

    /// Any other out-of-range value
    #[error("Invalid value: {0}")]
    InvalidValue(String),
}

mod duration_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_controller_config() {
        let config = ControllerConfig::default();
        assert_eq!(config.initial_concurrency, 10);
        assert_eq!(config.threshold, 12.0);
        assert_eq!(config.requests_per_slot, 5);
        assert_eq!(config.ramp_seconds, 30);
        assert_eq!(config.max_tokens, 100);
        assert!(!config.stream);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_controller_builder_pattern() {
        let config = ControllerConfig::default()
            .with_threshold(20.0)
            .with_initial_concurrency(4)
            .with_max_iterations(None)
            .with_max_concurrency(Some(64));

        assert_eq!(config.threshold, 20.0);
        assert_eq!(config.initial_concurrency, 4);
        assert!(config.max_iterations.is_none());
        assert_eq!(config.max_concurrency, Some(64));
    }

    #[test]
    fn test_controller_validation_zero_concurrency() {
        let config = ControllerConfig::default().with_initial_concurrency(0);
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidConcurrency(_))
        ));
    }

    #[test]
    fn test_controller_validation_bad_threshold() {
        for threshold in [0.0, -1.0, f64::NAN] {
            let config = ControllerConfig::default().with_threshold(threshold);
            assert!(config.validate().is_err());
        }
    }

    #[test]
    fn test_controller_validation_guards() {
        let config = ControllerConfig::default().with_max_iterations(Some(0));
        assert!(matches!(config.validate(), Err(ConfigError::InvalidGuard(_))));

        let config = ControllerConfig::default().with_max_concurrency(Some(5));
        assert!(matches!(config.validate(), Err(ConfigError::InvalidGuard(_))));
    }

    #[test]
    fn test_controller_rejects_custom_requests_per_slot() {
        for requests_per_slot in [0, 1, 4, 6, 10] {
            let config = ControllerConfig {
                requests_per_slot,
                ..Default::default()
            };
            assert!(matches!(config.validate(), Err(ConfigError::InvalidValue(_))));
        }

        let config: ControllerConfig =
            serde_json::from_str(r#"{ "requests_per_slot": 8 }"#).unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_session_defaults() {
        let config = SessionConfig::default();
        assert_eq!(config.port, 8000);
        assert_eq!(config.server_root(), "http://0.0.0.0:8000");
        assert_eq!(config.readiness_marker, "Uvicorn running on");
        assert_eq!(config.cleanup_scope, CleanupScope::Managed);
        assert!(config.cache_dir.ends_with(".cache/nim"));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_session_validation() {
        let config = SessionConfig {
            readiness_marker: "  ".into(),
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = SessionConfig::default().with_readiness_timeout(Duration::ZERO);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_session_serialization_uses_seconds() {
        let config = SessionConfig::default()
            .with_readiness_timeout(Duration::from_secs(90))
            .with_cleanup_scope(CleanupScope::All);
        let json = serde_json::to_value(&config).unwrap();
        assert_eq!(json["readiness_timeout"], 90);
        assert_eq!(json["cleanup_scope"], "all");

        let back: SessionConfig = serde_json::from_value(json).unwrap();
        assert_eq!(back.readiness_timeout, Duration::from_secs(90));
    }

    #[test]
    fn test_partial_config_fills_defaults() {
        let config: ControllerConfig =
            serde_json::from_str(r#"{ "threshold": 8.5 }"#).unwrap();
        assert_eq!(config.threshold, 8.5);
        assert_eq!(config.initial_concurrency, 10);
    }
}
