//! Readiness detection on a container's output stream

use std::time::Duration;

use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;

use crate::error::{BenchError, BenchResult};
use crate::traits::ContainerHandle;

/// Watches container output for the server's readiness marker
#[derive(Debug, Clone)]
pub struct ReadinessDetector {
    marker: String,
    timeout: Duration,
}

impl ReadinessDetector {
    /// Create a detector for `marker` bounded by `timeout`
    pub fn new(marker: impl Into<String>, timeout: Duration) -> Self {
        Self {
            marker: marker.into(),
            timeout,
        }
    }

    /// Get the marker this detector looks for
    pub fn marker(&self) -> &str {
        &self.marker
    }

    /// Consume output lines until one contains the marker
    ///
    /// Returns the number of lines consumed. Fails with `ReadinessTimeout` when
    /// the deadline passes, `ServerExited` when the stream ends first and
    /// `Cancelled` when a shutdown signal arrives.
    pub async fn await_ready(
        &self,
        handle: &mut dyn ContainerHandle,
        shutdown: &mut broadcast::Receiver<()>,
    ) -> BenchResult<usize> {
        let container_id = handle.id().to_string();
        tracing::info!(
            container = %container_id,
            timeout_secs = self.timeout.as_secs(),
            "Waiting for model server to start"
        );

        let scan = async {
            let mut lines_seen = 0usize;
            while let Some(line) = handle.next_line().await {
                lines_seen += 1;
                tracing::debug!(container = %container_id, "{}", line);
                if line.contains(&self.marker) {
                    return Ok(lines_seen);
                }
            }
            Err(BenchError::server_exited(lines_seen))
        };

        let cancelled = async {
            match shutdown.recv().await {
                Ok(()) | Err(RecvError::Lagged(_)) => {}
                // No sender left: nobody can cancel any more
                Err(RecvError::Closed) => std::future::pending::<()>().await,
            }
        };

        tokio::select! {
            biased;

            _ = cancelled => Err(BenchError::cancelled()),

            result = tokio::time::timeout(self.timeout, scan) => match result {
                Ok(Ok(lines)) => {
                    tracing::info!(lines, "Model server is running");
                    Ok(lines)
                }
                Ok(Err(e)) => Err(e),
                Err(_) => Err(BenchError::readiness_timeout(self.timeout)),
            },
        }
    }
}
