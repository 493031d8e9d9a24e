//! Docker CLI backed container runtime

use std::path::PathBuf;
use std::process::Stdio;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use nim_bench_core::{
    BenchError, BenchResult, CleanupScope, ContainerHandle, ContainerRuntime, GpuSpec, LaunchSpec,
};
use tokio::process::{Child, Command};

use crate::output::OutputLines;

/// Label attached to every container this tool starts
pub const MANAGED_LABEL: &str = "nim-bench.managed=true";

/// Environment variable the NIM container reads its credential from
const API_KEY_ENV: &str = "NGC_API_KEY";

/// Cache mount point inside the container
const CONTAINER_CACHE_DIR: &str = "/opt/nim/.cache";

/// Port the server listens on inside the container
const CONTAINER_PORT: u16 = 8000;

/// How long a port probe may take before the port counts as free
const PORT_PROBE_TIMEOUT: Duration = Duration::from_secs(1);

/// `docker run` arguments for `spec`, without the binary itself
///
/// The credential value never appears here; `-e NGC_API_KEY` forwards it
/// from the child process environment.
pub fn run_args(spec: &LaunchSpec, name: &str, user: Option<(u32, u32)>) -> Vec<String> {
    let mut args = vec![
        "run".to_string(),
        "--rm".to_string(),
        "--name".to_string(),
        name.to_string(),
        gpu_flag(&spec.gpus),
        format!("--shm-size={}", spec.shm_size),
        "-e".to_string(),
        API_KEY_ENV.to_string(),
        "-v".to_string(),
        format!("{}:{}", spec.cache_dir.display(), CONTAINER_CACHE_DIR),
    ];
    if let Some((uid, gid)) = user {
        args.push("-u".to_string());
        args.push(format!("{uid}:{gid}"));
    }
    args.extend([
        "-p".to_string(),
        format!("{}:{}", spec.port, CONTAINER_PORT),
        "--label".to_string(),
        MANAGED_LABEL.to_string(),
        spec.image.clone(),
    ]);
    args
}

/// `docker ps` arguments listing running containers in `scope`
pub fn ps_args(scope: CleanupScope) -> Vec<String> {
    let mut args = vec!["ps".to_string(), "-q".to_string()];
    if scope == CleanupScope::Managed {
        args.push("--filter".to_string());
        args.push(format!("label={MANAGED_LABEL}"));
    }
    args
}

fn gpu_flag(gpus: &GpuSpec) -> String {
    match gpus {
        GpuSpec::All => "--gpus=all".to_string(),
        // Docker parses the value as CSV, so a device list must stay quoted
        GpuSpec::Devices(devices) => format!("--gpus=\"device={devices}\""),
    }
}

#[cfg(unix)]
fn current_user() -> Option<(u32, u32)> {
    Some((
        nix::unistd::getuid().as_raw(),
        nix::unistd::getgid().as_raw(),
    ))
}

#[cfg(not(unix))]
fn current_user() -> Option<(u32, u32)> {
    None
}

fn container_name(port: u16) -> String {
    let secs = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default();
    format!("nim-bench-{port}-{secs}")
}

/// Runs model containers through the `docker` CLI
#[derive(Debug, Clone)]
pub struct DockerRuntime {
    binary: PathBuf,
}

impl DockerRuntime {
    /// Use `docker` from `PATH`
    pub fn new() -> Self {
        Self::with_binary("docker")
    }

    /// Use a specific docker-compatible binary (e.g. `podman`)
    pub fn with_binary(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    /// Run a short docker command and return its stdout
    async fn docker(&self, args: &[String]) -> BenchResult<String> {
        tracing::debug!(binary = %self.binary.display(), ?args, "Running docker command");
        let output = Command::new(&self.binary)
            .args(args)
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|e| {
                BenchError::container(format!("failed to run {}: {e}", self.binary.display()))
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(BenchError::container(format!(
                "docker {} exited with {}: {}",
                args.first().map(String::as_str).unwrap_or_default(),
                output.status,
                stderr.trim()
            )));
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

impl Default for DockerRuntime {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ContainerRuntime for DockerRuntime {
    fn runtime_name(&self) -> &str {
        "docker"
    }

    async fn start(&self, spec: &LaunchSpec) -> BenchResult<Box<dyn ContainerHandle>> {
        tokio::fs::create_dir_all(&spec.cache_dir)
            .await
            .map_err(|e| {
                BenchError::container(format!(
                    "cannot create cache directory {}: {e}",
                    spec.cache_dir.display()
                ))
            })?;

        let name = container_name(spec.port);
        let args = run_args(spec, &name, current_user());
        tracing::debug!(?args, "Starting container");

        let mut child = Command::new(&self.binary)
            .args(&args)
            .env(API_KEY_ENV, spec.api_key.expose())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                BenchError::container(format!("failed to run {}: {e}", self.binary.display()))
            })?;

        let output = OutputLines::attach(&mut child);
        Ok(Box::new(DockerContainer {
            name,
            binary: self.binary.clone(),
            child,
            output: Some(output),
            stopped: false,
        }))
    }

    async fn stop_all(&self, scope: CleanupScope) -> BenchResult<usize> {
        let listing = self.docker(&ps_args(scope)).await?;
        let ids: Vec<String> = listing
            .lines()
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .map(str::to_string)
            .collect();
        if ids.is_empty() {
            return Ok(0);
        }

        let mut stop = vec!["stop".to_string()];
        stop.extend(ids.iter().cloned());
        self.docker(&stop).await?;

        // `--rm` containers are already gone once stopped
        let mut rm = vec!["rm".to_string(), "-f".to_string()];
        rm.extend(ids.iter().cloned());
        if let Err(e) = self.docker(&rm).await {
            tracing::debug!(error = %e, "Nothing left to remove after stop");
        }

        Ok(ids.len())
    }

    async fn is_port_bound(&self, port: u16) -> bool {
        let connect = tokio::net::TcpStream::connect(("127.0.0.1", port));
        matches!(
            tokio::time::timeout(PORT_PROBE_TIMEOUT, connect).await,
            Ok(Ok(_))
        )
    }
}

/// A container started by [`DockerRuntime`]
pub struct DockerContainer {
    name: String,
    binary: PathBuf,
    child: Child,
    /// `None` once output is followed in the background
    output: Option<OutputLines>,
    stopped: bool,
}

#[async_trait]
impl ContainerHandle for DockerContainer {
    fn id(&self) -> &str {
        &self.name
    }

    async fn next_line(&mut self) -> Option<String> {
        match self.output.as_mut() {
            Some(output) => output.next().await,
            None => None,
        }
    }

    fn follow_output(&mut self) {
        if let Some(output) = self.output.take() {
            output.follow(self.name.clone());
        }
    }

    async fn stop(&mut self) -> BenchResult<()> {
        if self.stopped {
            return Ok(());
        }
        self.stopped = true;

        let status = Command::new(&self.binary)
            .args(["stop", self.name.as_str()])
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await
            .map_err(|e| BenchError::container(format!("failed to stop {}: {e}", self.name)))?;
        if !status.success() {
            tracing::warn!(container = %self.name, %status, "docker stop reported failure");
        }

        // The foreground `docker run` exits with its container
        if let Err(e) = self.child.wait().await {
            tracing::debug!(error = %e, "docker run client already reaped");
        }
        Ok(())
    }
}

impl std::fmt::Debug for DockerContainer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DockerContainer")
            .field("name", &self.name)
            .field("following", &self.output.is_none())
            .field("stopped", &self.stopped)
            .finish()
    }
}
