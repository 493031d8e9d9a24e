//! Application configuration loaded from TOML

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use nim_bench_auth::DEFAULT_CREDENTIAL_PATH;
use nim_bench_core::{ControllerConfig, SessionConfig};
use nim_bench_storage::DEFAULT_REGISTRY_PATH;
use serde::{Deserialize, Serialize};

/// Everything a run needs, with defaults for every field
///
/// ```toml
/// registry_path = "nim_list.txt"
///
/// [session]
/// port = 8000
/// readiness_timeout = 1800
/// cleanup_scope = "managed"
///
/// [controller]
/// threshold = 12.0
/// initial_concurrency = 10
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Container and readiness settings
    pub session: SessionConfig,
    /// Load search settings
    pub controller: ControllerConfig,
    /// Registry file
    pub registry_path: PathBuf,
    /// Credential file
    pub credential_path: PathBuf,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            session: SessionConfig::default(),
            controller: ControllerConfig::default(),
            registry_path: PathBuf::from(DEFAULT_REGISTRY_PATH),
            credential_path: PathBuf::from(DEFAULT_CREDENTIAL_PATH),
        }
    }
}

impl AppConfig {
    /// Load from `path`, or defaults when no file is given
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config = match path {
            Some(path) => {
                let raw = std::fs::read_to_string(path)
                    .with_context(|| format!("Failed to read config file: {}", path.display()))?;
                Self::from_toml(&raw)
                    .with_context(|| format!("Failed to parse config file: {}", path.display()))?
            }
            None => Self::default(),
        };
        config.validate()?;
        Ok(config)
    }

    /// Parse TOML text
    pub fn from_toml(raw: &str) -> Result<Self> {
        Ok(toml::from_str(raw)?)
    }

    /// Validate both sections
    pub fn validate(&self) -> Result<()> {
        self.session.validate().context("Invalid [session] config")?;
        self.controller
            .validate()
            .context("Invalid [controller] config")?;
        Ok(())
    }
}
