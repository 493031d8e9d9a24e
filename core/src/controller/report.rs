//! Per-run record of iterations and the reason the run ended

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::request::LoadLevel;
use crate::response::{BenchmarkOutcome, BenchmarkStats, ThroughputSample};

use super::policy::{Mode, StopReason};

/// One executor call and what the controller saw
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IterationRecord {
    /// 1-based iteration number
    pub index: u32,
    /// Load the iteration ran at
    pub load: LoadLevel,
    /// Extracted throughput signal
    pub throughput: ThroughputSample,
    /// Full statistics, when the executor produced them
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stats: Option<BenchmarkStats>,
    /// Executor error message, when it reported one
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl IterationRecord {
    /// Record an outcome observed at `load`
    pub fn new(index: u32, load: LoadLevel, outcome: &BenchmarkOutcome) -> Self {
        match outcome {
            BenchmarkOutcome::Stats(stats) => Self {
                index,
                load,
                throughput: ThroughputSample::from_stats(stats),
                stats: Some(stats.clone()),
                error: None,
            },
            BenchmarkOutcome::Error { message } => Self {
                index,
                load,
                throughput: ThroughputSample::absent(),
                stats: None,
                error: Some(message.clone()),
            },
        }
    }
}

/// Everything a finished run produced
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ControllerReport {
    /// Manual or adaptive
    pub mode: Mode,
    /// Throughput floor in effect
    pub threshold: f64,
    /// Model the run targeted
    pub model: String,
    /// When the first iteration started
    pub started_at: DateTime<Utc>,
    /// When the run ended
    pub finished_at: DateTime<Utc>,
    /// Iterations in execution order
    pub iterations: Vec<IterationRecord>,
    /// Why the run ended
    pub stop_reason: StopReason,
}

impl ControllerReport {
    /// Highest load whose throughput stayed at or above the threshold
    pub fn best(&self) -> Option<LoadLevel> {
        self.iterations
            .iter()
            .filter(|it| it.throughput.value.is_some_and(|tps| tps >= self.threshold))
            .map(|it| it.load)
            .max_by_key(|load| load.concurrency)
    }

    /// Number of iterations executed
    pub fn len(&self) -> usize {
        self.iterations.len()
    }

    /// Check if no iteration ran
    pub fn is_empty(&self) -> bool {
        self.iterations.is_empty()
    }
}
