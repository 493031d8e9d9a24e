//! Seams to the external collaborators: executor, container runtime, operator
//!
//! These traits are defined in core so the controller and session logic can be
//! exercised without Docker or a live model server. Implementations live in
//! their respective crates (vendors/, container/) and in the binary.

use crate::config::CleanupScope;
use crate::error::{BenchError, BenchResult};
use crate::request::{ApiKey, BenchmarkParams};
use crate::response::BenchmarkOutcome;
use async_trait::async_trait;
use std::path::PathBuf;

// ============================================================================
// Benchmark Executor
// ============================================================================

/// Drives one batch of requests and reports aggregate statistics
///
/// The executor owns the fan-out to `params.concurrency` simultaneous
/// requests. Failures are reported as [`BenchmarkOutcome::Error`] rather than
/// as a Rust error so that the controller can treat them as an ordinary stop
/// condition.
#[async_trait]
pub trait BenchmarkExecutor: Send + Sync {
    /// Executor identifier (e.g., "openai")
    fn executor_name(&self) -> &str;

    /// Run `params.total_requests` requests at `params.concurrency`
    async fn run(&self, params: &BenchmarkParams) -> BenchmarkOutcome;
}

// ============================================================================
// Container Runtime
// ============================================================================

/// GPU selection for a container
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GpuSpec {
    /// Every GPU on the host
    All,
    /// A device list such as `0` or `0,1`
    Devices(String),
}

impl GpuSpec {
    /// Parse an operator-supplied selection
    ///
    /// GPU selection is mandatory: an empty value is a configuration error.
    pub fn parse(raw: &str) -> BenchResult<Self> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(BenchError::config(
                "GPU selection is required (e.g. '0', '0,1', 'all')",
            ));
        }
        if trimmed.eq_ignore_ascii_case("all") {
            Ok(GpuSpec::All)
        } else {
            Ok(GpuSpec::Devices(trimmed.to_string()))
        }
    }
}

impl std::fmt::Display for GpuSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GpuSpec::All => f.write_str("all"),
            GpuSpec::Devices(devices) => f.write_str(devices),
        }
    }
}

/// Everything the runtime needs to start a model container
#[derive(Debug, Clone)]
pub struct LaunchSpec {
    /// Image reference, e.g. `nvcr.io/nim/meta/llama3-8b-instruct:latest`
    pub image: String,
    /// GPU selection
    pub gpus: GpuSpec,
    /// Host directory mounted as the model cache
    pub cache_dir: PathBuf,
    /// Host port published for the server
    pub port: u16,
    /// Credential exported into the container
    pub api_key: ApiKey,
    /// Shared memory size
    pub shm_size: String,
}

/// A started container whose output can be consumed line by line
#[async_trait]
pub trait ContainerHandle: Send {
    /// Runtime-assigned identifier or name
    fn id(&self) -> &str;

    /// Next line of combined stdout/stderr output; `None` once the stream ends
    async fn next_line(&mut self) -> Option<String>;

    /// Keep consuming output in the background after readiness
    ///
    /// Unread output eventually blocks the container's pipes, so a handle
    /// that buffers output must drain it once the caller stops reading.
    /// `next_line` returns `None` afterwards.
    fn follow_output(&mut self) {}

    /// Stop this container; calling it twice is harmless
    async fn stop(&mut self) -> BenchResult<()>;
}

/// Starts and reclaims model containers
#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    /// Runtime identifier (e.g., "docker")
    fn runtime_name(&self) -> &str;

    /// Start a container without waiting for it to become ready
    async fn start(&self, spec: &LaunchSpec) -> BenchResult<Box<dyn ContainerHandle>>;

    /// Stop and remove containers in the given scope, returning how many were stopped
    async fn stop_all(&self, scope: CleanupScope) -> BenchResult<usize>;

    /// Whether something is accepting connections on the local port
    async fn is_port_bound(&self, port: u16) -> bool;
}

// ============================================================================
// Operator
// ============================================================================

/// The person running the tool, consulted before destructive actions
#[async_trait]
pub trait Operator: Send + Sync {
    /// Ask a yes/no question; `true` means yes
    async fn confirm(&self, question: &str) -> bool;
}
