//! Wiring of stores, runtime, session and controller for one test run

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use nim_bench_auth::{resolve, CredentialStore, KeySource, API_KEY_ENV};
use nim_bench_container::DockerRuntime;
use nim_bench_core::{
    ApiKey, ControllerBuilder, ControllerReport, GpuSpec, Interrupts, LoadLevel, Operator,
    SessionBuilder, Target,
};
use nim_bench_storage::{NimEntry, NimRegistry};
use nim_bench_vendors::{HttpConfig, OpenAiExecutor};

use crate::config::AppConfig;
use crate::report;

/// Which kind of test to run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TestMode {
    /// One iteration at a fixed load
    Manual(LoadLevel),
    /// Scale up until throughput drops below the threshold
    Auto,
}

/// Shared state for CLI commands and the interactive menu
#[derive(Debug, Clone)]
pub struct App {
    config: AppConfig,
    explicit_key: Option<String>,
    output: Option<PathBuf>,
    interrupts: Interrupts,
}

impl App {
    /// Create the application from loaded config and global flags
    pub fn new(config: AppConfig, explicit_key: Option<String>, output: Option<PathBuf>) -> Self {
        Self {
            config,
            explicit_key,
            output,
            interrupts: Interrupts::new(),
        }
    }

    /// Route Ctrl+C through a process-wide router
    pub fn with_interrupts(mut self, interrupts: Interrupts) -> Self {
        self.interrupts = interrupts;
        self
    }

    /// Loaded configuration
    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Credential file store
    pub fn credentials(&self) -> CredentialStore {
        CredentialStore::new(&self.config.credential_path)
    }

    /// Load the registry from disk
    pub fn registry(&self) -> Result<NimRegistry> {
        NimRegistry::open(&self.config.registry_path).context("Failed to load NIM registry")
    }

    /// Credential for this run and where it came from
    pub fn api_key(&self) -> Result<(ApiKey, KeySource)> {
        let env_value = std::env::var(API_KEY_ENV).ok();
        Ok(resolve(
            self.explicit_key.as_deref(),
            env_value.as_deref(),
            &self.credentials(),
        )?)
    }

    /// Launch `entry`, benchmark it and tear the container down again
    ///
    /// The report is printed, and written as JSON when an output path was
    /// given. Every failure before the first request aborts without
    /// benchmarking. Ctrl+C cancels the readiness wait, or ends an adaptive
    /// run after the iteration in flight.
    pub async fn run_test(
        &self,
        entry: &NimEntry,
        gpus: &str,
        mode: TestMode,
        operator: Arc<dyn Operator>,
    ) -> Result<ControllerReport> {
        GpuSpec::parse(gpus)?;
        let (api_key, source) = self.api_key()?;
        tracing::debug!(%source, key = %api_key.masked(), "Using API key");

        let model = entry.model_id();
        let target = Target::from_server_root(
            &self.config.session.server_root(),
            model.clone(),
            api_key.clone(),
        );
        let executor =
            OpenAiExecutor::new(&HttpConfig::default()).context("Failed to build HTTP client")?;
        let controller = ControllerBuilder::new()
            .config(self.config.controller.clone())
            .executor(Arc::new(executor))
            .target(target)
            .build()?;

        let session = SessionBuilder::new()
            .config(self.config.session.clone())
            .runtime(Arc::new(DockerRuntime::new()))
            .operator(operator)
            .api_key(api_key)
            .shutdown(self.interrupts.sender())
            .build()?;

        let _run = self.interrupts.activate();
        tracing::info!(nim = %entry.display_name(), %model, image = %entry.image, "Preparing model server");
        let ready = session.prepare(&entry.image, gpus).await?;
        println!("Model is alive and ready. Proceeding with the test.");

        let report = match mode {
            TestMode::Auto => {
                let mut shutdown = self.interrupts.subscribe();
                controller.run_auto(&mut shutdown).await
            }
            TestMode::Manual(load) => controller.run_manual(load).await,
        };

        if let Err(e) = ready.teardown().await {
            tracing::warn!(error = %e, "Failed to stop model container");
        }

        print!("{}", report::render(&report));
        if let Some(path) = &self.output {
            report::write_json(&report, path)?;
            println!("Report written to: {}", path.display());
        }
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn app(dir: &TempDir, explicit: Option<&str>) -> App {
        let config = AppConfig {
            registry_path: dir.path().join("nim_list.txt"),
            credential_path: dir.path().join(".ngc_api_key"),
            ..AppConfig::default()
        };
        App::new(config, explicit.map(str::to_string), None)
    }

    #[test]
    fn test_explicit_key_wins() {
        let dir = TempDir::new().unwrap();
        let app = app(&dir, Some("nvapi-flag"));
        app.credentials().save("nvapi-file").unwrap();

        let (key, source) = app.api_key().unwrap();
        assert_eq!(key.expose(), "nvapi-flag");
        assert_eq!(source, KeySource::Explicit);
    }

    #[test]
    fn test_registry_uses_configured_path() {
        let dir = TempDir::new().unwrap();
        let app = app(&dir, None);
        app.registry()
            .unwrap()
            .add("Llama", "nvcr.io/nim/meta/llama3-8b-instruct:latest")
            .unwrap();
        assert!(dir.path().join("nim_list.txt").exists());
        assert_eq!(app.registry().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_missing_gpus_fails_before_anything_else() {
        struct Never;
        #[async_trait::async_trait]
        impl Operator for Never {
            async fn confirm(&self, _question: &str) -> bool {
                panic!("operator must not be consulted");
            }
        }

        let dir = TempDir::new().unwrap();
        let app = app(&dir, Some("nvapi-flag"));
        let entry = NimEntry::new("Llama", "nvcr.io/nim/meta/llama3-8b-instruct:latest");

        let err = app
            .run_test(&entry, "  ", TestMode::Auto, Arc::new(Never))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("GPU selection is required"));
        assert!(!app.interrupts.is_active());
    }

    #[test]
    fn test_app_shares_interrupt_router() {
        let dir = TempDir::new().unwrap();
        let interrupts = Interrupts::new();
        let app = app(&dir, None).with_interrupts(interrupts.clone());

        let _run = app.interrupts.activate();
        assert!(interrupts.is_active());
    }
}
