//! Benchmark executors for nim-bench
//!
//! This crate provides the [`BenchmarkExecutor`](nim_bench_core::BenchmarkExecutor)
//! implementation that drives an OpenAI-compatible `chat/completions`
//! endpoint, such as the one served by a NIM container:
//!
//! - [`OpenAiExecutor`]: fans requests out over `concurrency` workers
//! - [`SseParser`]: incremental parser for streamed responses
//! - [`aggregate`]: folds per-request samples into `BenchmarkStats`

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod aggregate;
pub mod openai;
pub mod streaming;

pub use aggregate::{aggregate, RequestSample};
pub use openai::{OpenAiExecutor, RequestError, DEFAULT_PROMPT};
pub use streaming::{HttpConfig, SseEvent, SseParser};
