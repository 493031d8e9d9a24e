//! Transition policy for the adaptive concurrency search

use serde::{Deserialize, Serialize};

use crate::config::ControllerConfig;
use crate::request::LoadLevel;
use crate::response::BenchmarkOutcome;

/// Throughput above which concurrency doubles
pub const DOUBLE_ABOVE_TPS: f64 = 100.0;

/// Throughput above which concurrency grows by half
pub const HALF_ABOVE_TPS: f64 = 50.0;

/// How the run chooses its load
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    /// One executor call at an operator-chosen load
    Manual,
    /// Probe upwards until a stop condition fires
    Auto,
}

/// Why a run ended
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum StopReason {
    /// The executor reported an error
    ExecutorError {
        /// Message from the executor
        message: String,
    },
    /// The statistics did not contain a tokens-per-second average
    MissingSignal,
    /// Throughput fell below the threshold
    ThresholdBreach {
        /// Observed tokens per second
        tps: f64,
        /// Concurrency at which it was observed
        concurrency: u32,
    },
    /// The iteration guard was reached
    IterationLimit {
        /// Configured maximum
        max_iterations: u32,
    },
    /// The concurrency guard was reached
    ConcurrencyCeiling {
        /// Configured maximum
        max_concurrency: u32,
    },
    /// A manual run finished without error
    Completed,
    /// A shutdown signal arrived between iterations
    Cancelled,
}

impl StopReason {
    /// Whether the run ended because something went wrong
    pub fn is_failure(&self) -> bool {
        matches!(
            self,
            StopReason::ExecutorError { .. } | StopReason::MissingSignal
        )
    }
}

impl std::fmt::Display for StopReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StopReason::ExecutorError { message } => write!(f, "executor error: {message}"),
            StopReason::MissingSignal => {
                f.write_str("failed to retrieve tokens per second from the statistics")
            }
            StopReason::ThresholdBreach { tps, concurrency } => write!(
                f,
                "throughput {tps:.2} tok/s fell below threshold at concurrency {concurrency}"
            ),
            StopReason::IterationLimit { max_iterations } => {
                write!(f, "reached the iteration limit ({max_iterations})")
            }
            StopReason::ConcurrencyCeiling { max_concurrency } => {
                write!(f, "reached the concurrency ceiling ({max_concurrency})")
            }
            StopReason::Completed => f.write_str("completed"),
            StopReason::Cancelled => f.write_str("cancelled"),
        }
    }
}

/// Result of observing one outcome
#[derive(Debug, Clone, PartialEq)]
pub enum Decision {
    /// Run another iteration at this load
    Continue(LoadLevel),
    /// Terminate the run
    Stop(StopReason),
}

/// Next concurrency for a sample at or above the threshold
///
/// Doubles above 100 tok/s, adds half above 50 tok/s and a fifth otherwise.
/// Increments round down but are never smaller than one, so growth is strictly
/// monotonic.
pub fn next_concurrency(current: u32, tps: f64) -> u32 {
    let increment = if tps > DOUBLE_ABOVE_TPS {
        current
    } else if tps > HALF_ABOVE_TPS {
        current / 2
    } else {
        current / 5
    };
    current.saturating_add(increment.max(1))
}

/// Mutable state of a single run
#[derive(Debug, Clone)]
pub struct ControllerState {
    /// Load for the next (or current) iteration
    pub load: LoadLevel,
    /// Throughput floor
    pub threshold: f64,
    /// Manual or adaptive
    pub mode: Mode,
    max_iterations: Option<u32>,
    max_concurrency: Option<u32>,
    iterations: u32,
}

impl ControllerState {
    /// State for an adaptive run seeded from the configuration
    pub fn auto(config: &ControllerConfig) -> Self {
        Self {
            load: LoadLevel::adaptive(config.initial_concurrency),
            threshold: config.threshold,
            mode: Mode::Auto,
            max_iterations: config.max_iterations,
            max_concurrency: config.max_concurrency,
            iterations: 0,
        }
    }

    /// State for a single manual call
    pub fn manual(load: LoadLevel, threshold: f64) -> Self {
        Self {
            load,
            threshold,
            mode: Mode::Manual,
            max_iterations: Some(1),
            max_concurrency: None,
            iterations: 0,
        }
    }

    /// Iterations observed so far
    pub fn iterations(&self) -> u32 {
        self.iterations
    }

    /// Observe the outcome of the iteration that ran at `self.load`
    ///
    /// On `Continue` the state has already moved to the returned load. On
    /// `Stop` the load is left untouched.
    pub fn observe(&mut self, outcome: &BenchmarkOutcome) -> Decision {
        self.iterations += 1;

        let sample = match outcome.throughput() {
            Ok(sample) => sample,
            Err(message) => {
                return Decision::Stop(StopReason::ExecutorError {
                    message: message.to_string(),
                })
            }
        };

        if self.mode == Mode::Manual {
            return Decision::Stop(StopReason::Completed);
        }

        let Some(tps) = sample.value else {
            return Decision::Stop(StopReason::MissingSignal);
        };

        if tps < self.threshold {
            return Decision::Stop(StopReason::ThresholdBreach {
                tps,
                concurrency: self.load.concurrency,
            });
        }

        if let Some(max_iterations) = self.max_iterations {
            if self.iterations >= max_iterations {
                return Decision::Stop(StopReason::IterationLimit { max_iterations });
            }
        }

        let mut next = next_concurrency(self.load.concurrency, tps);
        if let Some(max_concurrency) = self.max_concurrency {
            if self.load.concurrency >= max_concurrency {
                return Decision::Stop(StopReason::ConcurrencyCeiling { max_concurrency });
            }
            next = next.min(max_concurrency);
        }

        self.load = LoadLevel::adaptive(next);
        Decision::Continue(self.load)
    }
}
