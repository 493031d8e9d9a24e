//! Session setup: port check, cleanup, launch and readiness

use std::sync::Arc;

use tokio::sync::broadcast;

use crate::config::SessionConfig;
use crate::error::{BenchError, BenchResult};
use crate::request::{ApiKey, Target};
use crate::traits::{ContainerHandle, ContainerRuntime, GpuSpec, LaunchSpec, Operator};

use super::readiness::ReadinessDetector;

/// A container that has printed its readiness marker
pub struct ReadySession {
    /// Handle to the running container
    pub handle: Box<dyn ContainerHandle>,
    /// Root URL of the model server, e.g. `http://0.0.0.0:8000`
    pub server_root: String,
    /// Image the container was started from
    pub image: String,
}

impl ReadySession {
    /// Benchmark target for `model` on this server
    pub fn target(&self, model: impl Into<String>, api_key: ApiKey) -> Target {
        Target::from_server_root(&self.server_root, model, api_key)
    }

    /// Stop the container
    pub async fn teardown(mut self) -> BenchResult<()> {
        tracing::info!(container = %self.handle.id(), "Stopping model container");
        self.handle.stop().await
    }
}

impl std::fmt::Debug for ReadySession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReadySession")
            .field("container", &self.handle.id())
            .field("server_root", &self.server_root)
            .field("image", &self.image)
            .finish()
    }
}

/// Brings a model server to a ready state before any benchmarking begins
///
/// Any failure here aborts the run before a single request is sent.
pub struct SessionOrchestrator {
    /// Session configuration
    pub(crate) config: SessionConfig,

    /// Container runtime
    pub(crate) runtime: Arc<dyn ContainerRuntime>,

    /// Consulted before stopping containers that hold the port
    pub(crate) operator: Arc<dyn Operator>,

    /// Credential exported into the container
    pub(crate) api_key: ApiKey,

    /// Shutdown signal sender
    pub(crate) shutdown_tx: broadcast::Sender<()>,
}

impl SessionOrchestrator {
    /// Create a new orchestrator with its own shutdown channel
    ///
    /// Use `SessionBuilder` for validated construction.
    pub fn new(
        config: SessionConfig,
        runtime: Arc<dyn ContainerRuntime>,
        operator: Arc<dyn Operator>,
        api_key: ApiKey,
    ) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);
        Self::with_shutdown(config, runtime, operator, api_key, shutdown_tx)
    }

    /// Create an orchestrator cancelled through an existing channel
    pub fn with_shutdown(
        config: SessionConfig,
        runtime: Arc<dyn ContainerRuntime>,
        operator: Arc<dyn Operator>,
        api_key: ApiKey,
        shutdown_tx: broadcast::Sender<()>,
    ) -> Self {
        Self {
            config,
            runtime,
            operator,
            api_key,
            shutdown_tx,
        }
    }

    /// Get the session configuration
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Get a shutdown signal receiver
    pub fn shutdown_receiver(&self) -> broadcast::Receiver<()> {
        self.shutdown_tx.subscribe()
    }

    /// Cancel a readiness wait in progress
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(());
    }

    /// Make sure the serving port is free before launching
    ///
    /// If the port is bound, the operator is asked whether containers may be
    /// stopped. When the port is free, containers are stopped anyway so the
    /// launch starts from a clean slate.
    pub async fn ensure_port_available(&self) -> BenchResult<()> {
        let port = self.config.port;

        if !self.runtime.is_port_bound(port).await {
            return self.cleanup().await;
        }

        tracing::warn!(port, "Port is currently in use");
        let question = format!(
            "Port {port} is in use. Stop {} containers to free it?",
            scope_label(&self.config)
        );
        if !self.operator.confirm(&question).await {
            return Err(BenchError::port_in_use(port, "operator declined cleanup"));
        }

        self.cleanup().await?;
        tokio::time::sleep(self.config.cleanup_grace).await;

        if self.runtime.is_port_bound(port).await {
            return Err(BenchError::port_in_use(port, "still bound after cleanup"));
        }
        Ok(())
    }

    /// Start the model container without waiting for readiness
    ///
    /// GPU selection is mandatory; an empty `gpus` fails before anything is
    /// started.
    pub async fn launch(&self, image: &str, gpus: &str) -> BenchResult<Box<dyn ContainerHandle>> {
        let gpus = GpuSpec::parse(gpus)?;
        if image.trim().is_empty() {
            return Err(BenchError::missing_config("image"));
        }

        let spec = LaunchSpec {
            image: image.trim().to_string(),
            gpus,
            cache_dir: self.config.cache_dir.clone(),
            port: self.config.port,
            api_key: self.api_key.clone(),
            shm_size: self.config.shm_size.clone(),
        };

        let handle = self.runtime.start(&spec).await?;
        tracing::info!(
            container = %handle.id(),
            image = %spec.image,
            gpus = %spec.gpus,
            runtime = self.runtime.runtime_name(),
            "Container started"
        );
        Ok(handle)
    }

    /// Block until the container prints its readiness marker
    pub async fn await_ready(&self, handle: &mut dyn ContainerHandle) -> BenchResult<usize> {
        let mut shutdown = self.shutdown_tx.subscribe();
        self.await_ready_or_cancel(handle, &mut shutdown).await
    }

    async fn await_ready_or_cancel(
        &self,
        handle: &mut dyn ContainerHandle,
        shutdown: &mut broadcast::Receiver<()>,
    ) -> BenchResult<usize> {
        let detector = ReadinessDetector::new(
            self.config.readiness_marker.clone(),
            self.config.readiness_timeout,
        );
        detector.await_ready(handle, shutdown).await
    }

    /// Port check, launch and readiness in sequence
    ///
    /// The container is stopped again if it never becomes ready. Once ready,
    /// its remaining output is drained in the background.
    pub async fn prepare(&self, image: &str, gpus: &str) -> BenchResult<ReadySession> {
        // Config errors surface before any side effect
        GpuSpec::parse(gpus)?;
        // Interrupts during port cleanup or launch still cancel the wait
        let mut shutdown = self.shutdown_tx.subscribe();

        self.ensure_port_available().await?;
        let mut handle = self.launch(image, gpus).await?;

        if let Err(e) = self
            .await_ready_or_cancel(handle.as_mut(), &mut shutdown)
            .await
        {
            tracing::error!(error = %e, container = %handle.id(), "Model server never became ready");
            if let Err(stop_err) = handle.stop().await {
                tracing::warn!(error = %stop_err, "Failed to stop container after readiness failure");
            }
            return Err(e);
        }
        handle.follow_output();

        Ok(ReadySession {
            handle,
            server_root: self.config.server_root(),
            image: image.trim().to_string(),
        })
    }

    async fn cleanup(&self) -> BenchResult<()> {
        let stopped = self.runtime.stop_all(self.config.cleanup_scope).await?;
        tracing::info!(
            stopped,
            scope = ?self.config.cleanup_scope,
            "Cleaned up containers"
        );
        Ok(())
    }
}

fn scope_label(config: &SessionConfig) -> &'static str {
    match config.cleanup_scope {
        crate::config::CleanupScope::Managed => "nim-bench managed",
        crate::config::CleanupScope::All => "ALL running",
    }
}

impl std::fmt::Debug for SessionOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionOrchestrator")
            .field("config", &self.config)
            .field("runtime", &self.runtime.runtime_name())
            .finish()
    }
}
