//! Executor outcomes and the throughput signal extracted from them

use serde::{Deserialize, Serialize};

/// Message used when an error payload carries no message
pub const UNKNOWN_ERROR: &str = "Unknown error";

/// Summary of a sampled distribution
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Distribution {
    /// Arithmetic mean
    pub average: f64,
    /// Median
    #[serde(default)]
    pub p50: f64,
    /// 90th percentile
    #[serde(default)]
    pub p90: f64,
    /// 99th percentile
    #[serde(default)]
    pub p99: f64,
    /// Smallest sample
    #[serde(default)]
    pub min: f64,
    /// Largest sample
    #[serde(default)]
    pub max: f64,
}

impl Distribution {
    /// Summarize a set of samples; `None` when empty
    pub fn from_samples(samples: &[f64]) -> Option<Self> {
        if samples.is_empty() {
            return None;
        }
        let mut sorted: Vec<f64> = samples.to_vec();
        sorted.sort_by(|a, b| a.total_cmp(b));

        let average = sorted.iter().sum::<f64>() / sorted.len() as f64;
        Some(Self {
            average,
            p50: percentile(&sorted, 50.0),
            p90: percentile(&sorted, 90.0),
            p99: percentile(&sorted, 99.0),
            min: sorted[0],
            max: sorted[sorted.len() - 1],
        })
    }
}

/// Nearest-rank percentile over sorted data
fn percentile(sorted: &[f64], p: f64) -> f64 {
    if sorted.is_empty() {
        return 0.0;
    }
    let index = (p / 100.0 * (sorted.len() - 1) as f64).round() as usize;
    sorted[index.min(sorted.len() - 1)]
}

/// Aggregate statistics for one benchmark iteration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BenchmarkStats {
    /// Requests attempted
    #[serde(default)]
    pub total_requests: u32,
    /// Requests that completed successfully
    #[serde(default)]
    pub successful_requests: u32,
    /// Requests that failed
    #[serde(default)]
    pub failed_requests: u32,
    /// Wall-clock duration of the iteration
    #[serde(default)]
    pub elapsed_secs: f64,
    /// Completed requests per second of wall-clock time
    #[serde(default)]
    pub requests_per_second: f64,
    /// Per-request output tokens per second
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tokens_per_second: Option<Distribution>,
    /// Time to first token, milliseconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ttft_ms: Option<Distribution>,
    /// End-to-end request latency, milliseconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latency_ms: Option<Distribution>,
    /// Output tokens per second across all requests
    #[serde(default)]
    pub output_throughput: f64,
}

/// What a benchmark executor reports for one iteration
#[derive(Debug, Clone, PartialEq)]
pub enum BenchmarkOutcome {
    /// The iteration ran and produced statistics
    Stats(BenchmarkStats),
    /// The executor reported a failure
    Error {
        /// Human-readable failure description
        message: String,
    },
}

impl BenchmarkOutcome {
    /// Error outcome with the given message
    pub fn error(message: impl Into<String>) -> Self {
        BenchmarkOutcome::Error {
            message: message.into(),
        }
    }

    /// Interpret a JSON payload in the executor's wire shape
    ///
    /// A payload carrying an `error` key is an error outcome regardless of any
    /// statistics present alongside it. Statistics that fail to parse are
    /// treated as lacking a throughput figure.
    pub fn from_json(value: &serde_json::Value) -> Self {
        if let Some(error) = value.get("error") {
            let message = match error {
                serde_json::Value::String(s) => s.clone(),
                other => other
                    .get("message")
                    .and_then(|m| m.as_str())
                    .unwrap_or(UNKNOWN_ERROR)
                    .to_string(),
            };
            return BenchmarkOutcome::Error { message };
        }

        match serde_json::from_value::<BenchmarkStats>(value.clone()) {
            Ok(stats) => BenchmarkOutcome::Stats(stats),
            Err(e) => {
                tracing::debug!(error = %e, "Statistics payload did not match the expected shape");
                BenchmarkOutcome::Stats(BenchmarkStats::default())
            }
        }
    }

    /// Render back to the executor's wire shape
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            BenchmarkOutcome::Stats(stats) => {
                serde_json::to_value(stats).unwrap_or(serde_json::Value::Null)
            }
            BenchmarkOutcome::Error { message } => {
                serde_json::json!({ "error": { "message": message } })
            }
        }
    }

    /// Check if the executor reported an error
    pub fn is_error(&self) -> bool {
        matches!(self, BenchmarkOutcome::Error { .. })
    }

    /// The throughput signal, or the error message
    pub fn throughput(&self) -> Result<ThroughputSample, &str> {
        match self {
            BenchmarkOutcome::Stats(stats) => Ok(ThroughputSample::from_stats(stats)),
            BenchmarkOutcome::Error { message } => Err(message),
        }
    }
}

/// Average tokens per second observed over one iteration
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ThroughputSample {
    /// `None` when the statistics lacked the figure
    pub value: Option<f64>,
}

impl ThroughputSample {
    /// A present sample
    pub fn of(value: f64) -> Self {
        Self { value: Some(value) }
    }

    /// An absent sample
    pub fn absent() -> Self {
        Self { value: None }
    }

    /// Extract the average tokens-per-second figure
    pub fn from_stats(stats: &BenchmarkStats) -> Self {
        Self {
            value: stats
                .tokens_per_second
                .map(|d| d.average)
                .filter(|v| v.is_finite()),
        }
    }
}

impl std::fmt::Display for ThroughputSample {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.value {
            Some(v) => write!(f, "{v:.2} tok/s"),
            None => f.write_str("n/a"),
        }
    }
}
