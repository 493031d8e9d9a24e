//! Controller execution loop

use std::sync::Arc;

use chrono::Utc;
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::TryRecvError;

use crate::config::ControllerConfig;
use crate::request::{BenchmarkParams, LoadLevel, Target};
use crate::response::BenchmarkOutcome;
use crate::traits::BenchmarkExecutor;

use super::policy::{ControllerState, Decision, Mode, StopReason};
use super::report::{ControllerReport, IterationRecord};

/// Runs benchmark iterations against one target and decides when to stop
///
/// Iterations are strictly sequential: each executor call completes before
/// the next load level is computed.
pub struct AdaptiveController {
    /// Controller configuration (validated by the builder)
    pub(crate) config: ControllerConfig,

    /// Benchmark executor
    pub(crate) executor: Arc<dyn BenchmarkExecutor>,

    /// Server, model and credential under test
    pub(crate) target: Target,
}

impl AdaptiveController {
    /// Create a new controller
    ///
    /// Use `ControllerBuilder` for validated construction.
    pub fn new(
        config: ControllerConfig,
        executor: Arc<dyn BenchmarkExecutor>,
        target: Target,
    ) -> Self {
        Self {
            config,
            executor,
            target,
        }
    }

    /// Get the controller configuration
    pub fn config(&self) -> &ControllerConfig {
        &self.config
    }

    /// Get the benchmark target
    pub fn target(&self) -> &Target {
        &self.target
    }

    /// Probe upwards from the seed concurrency until a stop condition fires
    ///
    /// The shutdown receiver is polled between iterations only; an iteration
    /// that has started always runs to completion.
    pub async fn run_auto(&self, shutdown: &mut broadcast::Receiver<()>) -> ControllerReport {
        let mut state = ControllerState::auto(&self.config);
        let started_at = Utc::now();
        let mut iterations = Vec::new();

        tracing::info!(
            model = %self.target.model,
            initial_concurrency = self.config.initial_concurrency,
            threshold = self.config.threshold,
            max_iterations = ?self.config.max_iterations,
            max_concurrency = ?self.config.max_concurrency,
            "Starting adaptive run"
        );

        let stop_reason = loop {
            if shutdown_requested(shutdown) {
                tracing::info!("Shutdown requested, ending adaptive run");
                break StopReason::Cancelled;
            }

            let load = state.load;
            tracing::info!(
                iteration = state.iterations() + 1,
                concurrency = load.concurrency,
                total_requests = load.total_requests,
                "Running iteration"
            );

            let outcome = self.run_iteration(load).await;
            let record = IterationRecord::new(state.iterations() + 1, load, &outcome);
            tracing::info!(
                iteration = record.index,
                concurrency = load.concurrency,
                tps = ?record.throughput.value,
                "Iteration finished"
            );
            iterations.push(record);

            match state.observe(&outcome) {
                Decision::Continue(next) => {
                    tracing::debug!(
                        from = load.concurrency,
                        to = next.concurrency,
                        "Raising concurrency"
                    );
                }
                Decision::Stop(reason) => break reason,
            }
        };

        log_stop(&stop_reason);

        ControllerReport {
            mode: Mode::Auto,
            threshold: self.config.threshold,
            model: self.target.model.clone(),
            started_at,
            finished_at: Utc::now(),
            iterations,
            stop_reason,
        }
    }

    /// Run a single iteration at an operator-chosen load
    pub async fn run_manual(&self, load: LoadLevel) -> ControllerReport {
        let mut state = ControllerState::manual(load, self.config.threshold);
        let started_at = Utc::now();

        tracing::info!(
            model = %self.target.model,
            concurrency = load.concurrency,
            total_requests = load.total_requests,
            "Starting manual run"
        );

        let outcome = self.run_iteration(load).await;
        let record = IterationRecord::new(1, load, &outcome);

        let stop_reason = match state.observe(&outcome) {
            Decision::Stop(reason) => reason,
            Decision::Continue(_) => StopReason::Completed,
        };

        if let BenchmarkOutcome::Stats(stats) = &outcome {
            tracing::info!(
                successful = stats.successful_requests,
                failed = stats.failed_requests,
                tps = ?record.throughput.value,
                rps = stats.requests_per_second,
                "Benchmark completed successfully"
            );
        }
        log_stop(&stop_reason);

        ControllerReport {
            mode: Mode::Manual,
            threshold: self.config.threshold,
            model: self.target.model.clone(),
            started_at,
            finished_at: Utc::now(),
            iterations: vec![record],
            stop_reason,
        }
    }

    /// One executor call at the given load
    async fn run_iteration(&self, load: LoadLevel) -> BenchmarkOutcome {
        let params = BenchmarkParams::for_load(
            load,
            &self.target,
            self.config.ramp_seconds,
            self.config.max_tokens,
            self.config.stream,
        );
        self.executor.run(&params).await
    }
}

fn shutdown_requested(shutdown: &mut broadcast::Receiver<()>) -> bool {
    match shutdown.try_recv() {
        Ok(()) | Err(TryRecvError::Lagged(_)) => true,
        Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => false,
    }
}

fn log_stop(reason: &StopReason) {
    match reason {
        StopReason::ExecutorError { message } => {
            tracing::error!(error = %message, "Error during benchmark");
        }
        StopReason::MissingSignal => {
            tracing::error!("Failed to retrieve tokens per second from the statistics");
        }
        StopReason::Completed => {}
        other => tracing::warn!(reason = %other, "Run stopped"),
    }
}

impl std::fmt::Debug for AdaptiveController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdaptiveController")
            .field("config", &self.config)
            .field("executor", &self.executor.executor_name())
            .field("target", &self.target)
            .finish()
    }
}
