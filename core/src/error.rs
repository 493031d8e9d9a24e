//! Error types for nim-bench-core

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Classification of a failure
///
/// Every kind either aborts the current session or halts the current loop;
/// none of them are retried automatically.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Invalid or missing configuration (GPU selection, credential, ...)
    Config,
    /// The serving port is still bound after cleanup, or the operator declined cleanup
    PortInUse,
    /// The server did not print its readiness marker within the allowed time
    ReadinessTimeout,
    /// The container output ended before the readiness marker appeared
    ServerExited,
    /// The container runtime failed to start or stop containers
    Container,
    /// The benchmark executor could not produce an outcome
    Executor,
    /// The operation was cancelled by a shutdown signal
    Cancelled,
    /// Filesystem or process I/O failure
    Io,
}

impl ErrorKind {
    /// Whether this failure happens before any container is launched
    pub fn is_pre_launch(&self) -> bool {
        matches!(self, ErrorKind::Config | ErrorKind::PortInUse)
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ErrorKind::Config => "config",
            ErrorKind::PortInUse => "port_in_use",
            ErrorKind::ReadinessTimeout => "readiness_timeout",
            ErrorKind::ServerExited => "server_exited",
            ErrorKind::Container => "container",
            ErrorKind::Executor => "executor",
            ErrorKind::Cancelled => "cancelled",
            ErrorKind::Io => "io",
        };
        f.write_str(name)
    }
}

/// Core error type
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{kind}: {message}")]
pub struct BenchError {
    /// Failure classification
    pub kind: ErrorKind,
    /// Human-readable description
    pub message: String,
}

impl BenchError {
    /// Create an error of the given kind
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// Invalid configuration
    pub fn config(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Config, message)
    }

    /// A required configuration value was not provided
    pub fn missing_config(field: &str) -> Self {
        Self::config(format!("missing required configuration: {field}"))
    }

    /// The port could not be freed
    pub fn port_in_use(port: u16, detail: &str) -> Self {
        Self::new(ErrorKind::PortInUse, format!("port {port} is in use: {detail}"))
    }

    /// Readiness marker not seen in time
    pub fn readiness_timeout(timeout: std::time::Duration) -> Self {
        Self::new(
            ErrorKind::ReadinessTimeout,
            format!("server did not become ready within {}s", timeout.as_secs()),
        )
    }

    /// Output stream closed before readiness
    pub fn server_exited(lines_seen: usize) -> Self {
        Self::new(
            ErrorKind::ServerExited,
            format!("container output ended after {lines_seen} lines without a readiness marker"),
        )
    }

    /// Container runtime failure
    pub fn container(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Container, message)
    }

    /// Benchmark executor failure
    pub fn executor(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Executor, message)
    }

    /// Cancelled by shutdown
    pub fn cancelled() -> Self {
        Self::new(ErrorKind::Cancelled, "operation cancelled by shutdown signal")
    }
}

impl From<std::io::Error> for BenchError {
    fn from(err: std::io::Error) -> Self {
        Self::new(ErrorKind::Io, err.to_string())
    }
}

/// Result type alias
pub type BenchResult<T> = std::result::Result<T, BenchError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_includes_kind() {
        let err = BenchError::port_in_use(8000, "operator declined cleanup");
        assert_eq!(err.kind, ErrorKind::PortInUse);
        assert_eq!(
            err.to_string(),
            "port_in_use: port 8000 is in use: operator declined cleanup"
        );
    }

    #[test]
    fn test_missing_config_names_field() {
        let err = BenchError::missing_config("gpus");
        assert_eq!(err.kind, ErrorKind::Config);
        assert!(err.message.contains("gpus"));
    }

    #[test]
    fn test_timeout_distinct_from_server_exit() {
        let timeout = BenchError::readiness_timeout(std::time::Duration::from_secs(30));
        let exited = BenchError::server_exited(12);
        assert_ne!(timeout.kind, exited.kind);
        assert!(timeout.message.contains("30s"));
    }

    #[test]
    fn test_pre_launch_kinds() {
        assert!(ErrorKind::Config.is_pre_launch());
        assert!(ErrorKind::PortInUse.is_pre_launch());
        assert!(!ErrorKind::Executor.is_pre_launch());
        assert!(!ErrorKind::ReadinessTimeout.is_pre_launch());
    }

    #[test]
    fn test_io_error_conversion() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "docker not found");
        let err: BenchError = io.into();
        assert_eq!(err.kind, ErrorKind::Io);
    }

    #[test]
    fn test_error_kind_snake_case_serialization() {
        assert_eq!(
            serde_json::to_string(&ErrorKind::ReadinessTimeout).unwrap(),
            "\"readiness_timeout\""
        );
    }
}
