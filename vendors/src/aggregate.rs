//! Folding per-request samples into iteration statistics

use std::time::Duration;

use nim_bench_core::{BenchmarkOutcome, BenchmarkStats, Distribution};

/// Result of a single chat-completion request
#[derive(Debug, Clone, PartialEq)]
pub enum RequestSample {
    /// The server answered with a completion
    Completed {
        /// Time from send to the last byte of the response
        latency: Duration,
        /// Time to the first content chunk (streaming only)
        ttft: Option<Duration>,
        /// Tokens generated for this request
        completion_tokens: u32,
    },
    /// The request failed
    Failed {
        /// Error description
        message: String,
    },
}

impl RequestSample {
    /// Per-request generation rate in tokens per second
    ///
    /// `None` for failures and for zero-length latencies.
    pub fn tokens_per_second(&self) -> Option<f64> {
        match self {
            RequestSample::Completed {
                latency,
                completion_tokens,
                ..
            } => {
                let secs = latency.as_secs_f64();
                (secs > 0.0).then(|| f64::from(*completion_tokens) / secs)
            }
            RequestSample::Failed { .. } => None,
        }
    }
}

/// Build the iteration outcome from every request sample
///
/// `tokens_per_second.average` is the mean of the per-request rates. When no
/// request succeeded the outcome is an error carrying the last failure.
pub fn aggregate(samples: &[RequestSample], elapsed: Duration) -> BenchmarkOutcome {
    let mut tps = Vec::new();
    let mut ttft_ms = Vec::new();
    let mut latency_ms = Vec::new();
    let mut output_tokens = 0u64;
    let mut last_error = None;

    for sample in samples {
        match sample {
            RequestSample::Completed {
                latency,
                ttft,
                completion_tokens,
            } => {
                latency_ms.push(latency.as_secs_f64() * 1000.0);
                if let Some(ttft) = ttft {
                    ttft_ms.push(ttft.as_secs_f64() * 1000.0);
                }
                if let Some(rate) = sample.tokens_per_second() {
                    tps.push(rate);
                }
                output_tokens += u64::from(*completion_tokens);
            }
            RequestSample::Failed { message } => last_error = Some(message.as_str()),
        }
    }

    let total = samples.len() as u32;
    let successful = latency_ms.len() as u32;

    if successful == 0 {
        let message = last_error.unwrap_or("no requests were sent");
        return BenchmarkOutcome::error(format!("all {total} requests failed: {message}"));
    }

    let elapsed_secs = elapsed.as_secs_f64();
    let per_sec = |count: f64| {
        if elapsed_secs > 0.0 {
            count / elapsed_secs
        } else {
            0.0
        }
    };

    BenchmarkOutcome::Stats(BenchmarkStats {
        total_requests: total,
        successful_requests: successful,
        failed_requests: total - successful,
        elapsed_secs,
        requests_per_second: per_sec(f64::from(successful)),
        tokens_per_second: Distribution::from_samples(&tps),
        ttft_ms: Distribution::from_samples(&ttft_ms),
        latency_ms: Distribution::from_samples(&latency_ms),
        output_throughput: per_sec(output_tokens as f64),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn completed(latency_ms: u64, tokens: u32) -> RequestSample {
        RequestSample::Completed {
            latency: Duration::from_millis(latency_ms),
            ttft: None,
            completion_tokens: tokens,
        }
    }

    fn failed(message: &str) -> RequestSample {
        RequestSample::Failed {
            message: message.to_string(),
        }
    }

    #[test]
    fn test_tps_average_is_mean_of_per_request_rates() {
        // 100 tokens in 1s and 100 tokens in 2s: rates 100 and 50
        let samples = vec![completed(1000, 100), completed(2000, 100)];
        let outcome = aggregate(&samples, Duration::from_secs(2));

        let BenchmarkOutcome::Stats(stats) = outcome else {
            panic!("expected stats");
        };
        let tps = stats.tokens_per_second.expect("tps distribution");
        assert!((tps.average - 75.0).abs() < 1e-9);
        assert!((stats.output_throughput - 100.0).abs() < 1e-9);
        assert!((stats.requests_per_second - 1.0).abs() < 1e-9);
        assert_eq!(stats.successful_requests, 2);
        assert!(stats.ttft_ms.is_none());
    }

    #[test]
    fn test_partial_failures_are_counted() {
        let samples = vec![completed(500, 10), failed("HTTP 500"), completed(500, 10)];
        let outcome = aggregate(&samples, Duration::from_secs(1));

        let BenchmarkOutcome::Stats(stats) = outcome else {
            panic!("expected stats");
        };
        assert_eq!(stats.total_requests, 3);
        assert_eq!(stats.failed_requests, 1);
        let tps = stats.tokens_per_second.expect("tps distribution");
        assert!((tps.average - 20.0).abs() < 1e-9);
    }

    #[test]
    fn test_all_failed_becomes_error_outcome() {
        let samples = vec![failed("connection refused"), failed("HTTP 503")];
        let outcome = aggregate(&samples, Duration::from_secs(1));

        match outcome {
            BenchmarkOutcome::Error { message } => {
                assert_eq!(message, "all 2 requests failed: HTTP 503");
            }
            other => panic!("expected error, got {other:?}"),
        }
    }

    #[test]
    fn test_no_samples_is_an_error() {
        assert!(aggregate(&[], Duration::ZERO).is_error());
    }

    #[test]
    fn test_zero_latency_is_excluded_from_tps() {
        let samples = vec![completed(0, 10), completed(1000, 10)];
        let BenchmarkOutcome::Stats(stats) = aggregate(&samples, Duration::ZERO) else {
            panic!("expected stats");
        };
        let tps = stats.tokens_per_second.expect("tps distribution");
        assert!((tps.average - 10.0).abs() < 1e-9);
        assert_eq!(stats.requests_per_second, 0.0);
    }

    #[test]
    fn test_ttft_collected_when_present() {
        let samples = vec![RequestSample::Completed {
            latency: Duration::from_millis(800),
            ttft: Some(Duration::from_millis(120)),
            completion_tokens: 40,
        }];
        let BenchmarkOutcome::Stats(stats) = aggregate(&samples, Duration::from_secs(1)) else {
            panic!("expected stats");
        };
        let ttft = stats.ttft_ms.expect("ttft distribution");
        assert!((ttft.average - 120.0).abs() < 1e-9);
    }
}
