//! OpenAI-compatible chat-completions executor

use std::io::IsTerminal;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use futures::StreamExt;
use indicatif::{ProgressBar, ProgressStyle};
use nim_bench_core::{BenchmarkExecutor, BenchmarkOutcome, BenchmarkParams};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::aggregate::{aggregate, RequestSample};
use crate::streaming::{HttpConfig, SseEvent, SseParser};

/// Prompt sent with every request unless overridden
pub const DEFAULT_PROMPT: &str =
    "Write a short story about a lighthouse keeper who discovers a message in a bottle.";

/// Failure of a single request
#[derive(Debug, Error)]
pub enum RequestError {
    /// Transport failure (connect, timeout, broken stream)
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Non-success HTTP status
    #[error("HTTP {status}: {body}")]
    Status {
        /// Status code
        status: u16,
        /// Response body, possibly truncated
        body: String,
    },

    /// Body could not be decoded
    #[error("invalid response body: {0}")]
    Decode(String),
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 1],
    max_tokens: u32,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    stream_options: Option<StreamOptions>,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct StreamOptions {
    include_usage: bool,
}

#[derive(Debug, Deserialize)]
struct Usage {
    #[serde(default)]
    completion_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
struct StreamChunk {
    #[serde(default)]
    choices: Vec<StreamChoice>,
    #[serde(default)]
    usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
struct StreamChoice {
    #[serde(default)]
    delta: Delta,
}

#[derive(Debug, Default, Deserialize)]
struct Delta {
    #[serde(default)]
    content: Option<String>,
}

/// Longest error body kept in a [`RequestError::Status`]
const MAX_ERROR_BODY: usize = 512;

/// Executor for OpenAI-compatible `chat/completions` endpoints
///
/// Each run spawns one worker per concurrency slot. Workers claim request
/// slots from a shared counter until `total_requests` have been issued, so
/// exactly that many requests are sent regardless of how fast each worker is.
#[derive(Clone)]
pub struct OpenAiExecutor {
    client: Client,
    prompt: Arc<str>,
    show_progress: bool,
}

impl OpenAiExecutor {
    /// Create an executor with the given HTTP settings
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(config: &HttpConfig) -> Result<Self, reqwest::Error> {
        Ok(Self {
            client: config.build_client()?,
            prompt: Arc::from(DEFAULT_PROMPT),
            show_progress: std::io::stdout().is_terminal(),
        })
    }

    /// Replace the prompt sent with every request
    pub fn with_prompt(mut self, prompt: impl AsRef<str>) -> Self {
        self.prompt = Arc::from(prompt.as_ref());
        self
    }

    /// Force the progress bar on or off
    pub fn with_progress(mut self, show: bool) -> Self {
        self.show_progress = show;
        self
    }

    /// The prompt sent with every request
    pub fn prompt(&self) -> &str {
        &self.prompt
    }

    fn progress_bar(&self, total: u32) -> ProgressBar {
        if !self.show_progress {
            return ProgressBar::hidden();
        }
        let pb = ProgressBar::new(u64::from(total));
        if let Ok(style) = ProgressStyle::default_bar().template(
            "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta}) {msg}",
        ) {
            pb.set_style(style.progress_chars("#>-"));
        }
        pb
    }
}

impl std::fmt::Debug for OpenAiExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiExecutor")
            .field("prompt", &self.prompt)
            .field("show_progress", &self.show_progress)
            .finish()
    }
}

/// `chat/completions` under `base_url`
pub fn chat_url(base_url: &str) -> String {
    format!("{}/chat/completions", base_url.trim_end_matches('/'))
}

/// Start delay for worker `index` of `concurrency` over a ramp window
pub fn ramp_delay(ramp_seconds: u64, index: u32, concurrency: u32) -> Duration {
    if concurrency == 0 {
        return Duration::ZERO;
    }
    Duration::from_secs_f64(ramp_seconds as f64 * f64::from(index) / f64::from(concurrency))
}

/// Everything a worker needs, shared across the iteration
struct RunContext {
    client: Client,
    url: String,
    bearer: String,
    model: String,
    prompt: Arc<str>,
    max_tokens: u32,
    stream: bool,
    total: u32,
    claimed: AtomicU32,
    progress: ProgressBar,
}

impl RunContext {
    /// Claim the next request slot; `false` once all are taken
    fn try_claim(&self) -> bool {
        self.claimed
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| {
                (n < self.total).then_some(n + 1)
            })
            .is_ok()
    }

    async fn worker(self: Arc<Self>, delay: Duration) -> Vec<RequestSample> {
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        let mut samples = Vec::new();
        while self.try_claim() {
            let sample = match self.send_one().await {
                Ok(sample) => sample,
                Err(e) => {
                    tracing::debug!(error = %e, "Request failed");
                    RequestSample::Failed {
                        message: e.to_string(),
                    }
                }
            };
            samples.push(sample);
            self.progress.inc(1);
        }
        samples
    }

    async fn send_one(&self) -> Result<RequestSample, RequestError> {
        let body = ChatRequest {
            model: &self.model,
            messages: [ChatMessage {
                role: "user",
                content: &self.prompt,
            }],
            max_tokens: self.max_tokens,
            stream: self.stream,
            stream_options: self.stream.then_some(StreamOptions {
                include_usage: true,
            }),
        };

        let start = Instant::now();
        let response = self
            .client
            .post(&self.url)
            .header("Authorization", &self.bearer)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let mut body = response.text().await.unwrap_or_default();
            if body.len() > MAX_ERROR_BODY {
                let mut cut = MAX_ERROR_BODY;
                while !body.is_char_boundary(cut) {
                    cut -= 1;
                }
                body.truncate(cut);
            }
            return Err(RequestError::Status {
                status: status.as_u16(),
                body,
            });
        }

        if self.stream {
            read_stream(response, start).await
        } else {
            let parsed: ChatResponse = response
                .json()
                .await
                .map_err(|e| RequestError::Decode(e.to_string()))?;
            let completion_tokens = parsed.usage.map(|u| u.completion_tokens).unwrap_or(0);
            Ok(RequestSample::Completed {
                latency: start.elapsed(),
                ttft: None,
                completion_tokens,
            })
        }
    }
}

async fn read_stream(
    response: reqwest::Response,
    start: Instant,
) -> Result<RequestSample, RequestError> {
    let mut parser = SseParser::new();
    let mut stream = response.bytes_stream();
    let mut ttft = None;
    let mut content_chunks = 0u32;
    let mut reported = None;

    'outer: while let Some(chunk) = stream.next().await {
        for event in parser.feed(&chunk?) {
            let data = match &event {
                SseEvent::Done => break 'outer,
                SseEvent::Data { data, .. } => data,
            };
            let chunk: StreamChunk = match serde_json::from_str(data) {
                Ok(chunk) => chunk,
                Err(e) => {
                    tracing::debug!(error = %e, "Skipping unparsable stream chunk");
                    continue;
                }
            };
            let has_content = chunk
                .choices
                .iter()
                .any(|c| c.delta.content.as_deref().is_some_and(|s| !s.is_empty()));
            if has_content {
                ttft.get_or_insert_with(|| start.elapsed());
                content_chunks += 1;
            }
            if let Some(usage) = chunk.usage {
                reported = Some(usage.completion_tokens);
            }
        }
    }

    Ok(RequestSample::Completed {
        latency: start.elapsed(),
        ttft,
        // Without a usage block, one content chunk counts as one token
        completion_tokens: reported.unwrap_or(content_chunks),
    })
}

#[async_trait]
impl BenchmarkExecutor for OpenAiExecutor {
    fn executor_name(&self) -> &str {
        "openai"
    }

    async fn run(&self, params: &BenchmarkParams) -> BenchmarkOutcome {
        if params.total_requests == 0 || params.concurrency == 0 {
            return BenchmarkOutcome::error(format!(
                "invalid load: {} requests at concurrency {}",
                params.total_requests, params.concurrency
            ));
        }

        let workers = params.concurrency.min(params.total_requests);
        let progress = self.progress_bar(params.total_requests);
        progress.set_message(format!("concurrency {}", params.concurrency));

        let ctx = Arc::new(RunContext {
            client: self.client.clone(),
            url: chat_url(&params.base_url),
            bearer: format!("Bearer {}", params.api_key.expose()),
            model: params.model.clone(),
            prompt: self.prompt.clone(),
            max_tokens: params.max_tokens,
            stream: params.stream,
            total: params.total_requests,
            claimed: AtomicU32::new(0),
            progress: progress.clone(),
        });

        tracing::debug!(
            url = %ctx.url,
            workers,
            total = params.total_requests,
            ramp_secs = params.ramp_seconds,
            "Starting benchmark iteration"
        );

        let start = Instant::now();
        let handles: Vec<_> = (0..workers)
            .map(|i| {
                let delay = ramp_delay(params.ramp_seconds, i, params.concurrency);
                tokio::spawn(ctx.clone().worker(delay))
            })
            .collect();

        let mut samples = Vec::with_capacity(params.total_requests as usize);
        for joined in futures::future::join_all(handles).await {
            match joined {
                Ok(worker_samples) => samples.extend(worker_samples),
                Err(e) => tracing::error!(error = %e, "Benchmark worker panicked"),
            }
        }
        let elapsed = start.elapsed();
        progress.finish_and_clear();

        aggregate(&samples, elapsed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nim_bench_core::{ApiKey, LoadLevel, Target};
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    #[test]
    fn test_chat_url() {
        assert_eq!(
            chat_url("http://0.0.0.0:8000/v1/"),
            "http://0.0.0.0:8000/v1/chat/completions"
        );
        assert_eq!(
            chat_url("http://localhost:8000/v1"),
            "http://localhost:8000/v1/chat/completions"
        );
    }

    #[test]
    fn test_ramp_delay_spreads_workers() {
        assert_eq!(ramp_delay(30, 0, 10), Duration::ZERO);
        assert_eq!(ramp_delay(30, 5, 10), Duration::from_secs(15));
        assert_eq!(ramp_delay(30, 9, 10), Duration::from_secs(27));
        assert_eq!(ramp_delay(0, 3, 4), Duration::ZERO);
    }

    #[test]
    fn test_request_body_shape() {
        let body = ChatRequest {
            model: "meta/llama3-8b-instruct",
            messages: [ChatMessage {
                role: "user",
                content: "hi",
            }],
            max_tokens: 100,
            stream: false,
            stream_options: None,
        };
        let json = serde_json::to_value(&body).expect("serialize");
        assert_eq!(json["model"], "meta/llama3-8b-instruct");
        assert_eq!(json["max_tokens"], 100);
        assert_eq!(json["messages"][0]["role"], "user");
        assert!(json.get("stream_options").is_none());
    }

    /// Serve `body` with `status` to every connection, one request each
    async fn spawn_server(status: &'static str, body: String) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("addr");
        tokio::spawn(async move {
            loop {
                let Ok((mut socket, _)) = listener.accept().await else {
                    break;
                };
                let body = body.clone();
                tokio::spawn(async move {
                    let mut buf = Vec::new();
                    let mut chunk = [0u8; 4096];
                    loop {
                        let n = match socket.read(&mut chunk).await {
                            Ok(0) | Err(_) => return,
                            Ok(n) => n,
                        };
                        buf.extend_from_slice(&chunk[..n]);
                        if request_complete(&buf) {
                            break;
                        }
                    }
                    let response = format!(
                        "HTTP/1.1 {status}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                        body.len()
                    );
                    let _ = socket.write_all(response.as_bytes()).await;
                    let _ = socket.shutdown().await;
                });
            }
        });
        format!("http://{addr}/v1/")
    }

    fn request_complete(buf: &[u8]) -> bool {
        let text = String::from_utf8_lossy(buf);
        let Some(head_end) = text.find("\r\n\r\n") else {
            return false;
        };
        let content_length = text[..head_end]
            .lines()
            .filter_map(|l| l.split_once(':'))
            .find(|(k, _)| k.trim().eq_ignore_ascii_case("content-length"))
            .and_then(|(_, v)| v.trim().parse::<usize>().ok())
            .unwrap_or(0);
        buf.len() >= head_end + 4 + content_length
    }

    fn params(base_url: String, load: LoadLevel) -> BenchmarkParams {
        let target = Target {
            base_url,
            model: "meta/llama3-8b-instruct".to_string(),
            api_key: ApiKey::new("nvapi-test").expect("key"),
        };
        BenchmarkParams::for_load(load, &target, 0, 100, false)
    }

    #[tokio::test]
    async fn test_run_issues_exactly_total_requests() {
        let url = spawn_server(
            "200 OK",
            r#"{"id":"x","choices":[],"usage":{"prompt_tokens":5,"completion_tokens":20,"total_tokens":25}}"#
                .to_string(),
        )
        .await;
        let executor = OpenAiExecutor::new(&HttpConfig::default())
            .expect("client")
            .with_progress(false);

        let outcome = executor.run(&params(url, LoadLevel::adaptive(2))).await;

        let BenchmarkOutcome::Stats(stats) = outcome else {
            panic!("expected stats, got {outcome:?}");
        };
        assert_eq!(stats.total_requests, 10);
        assert_eq!(stats.successful_requests, 10);
        assert!(stats.tokens_per_second.is_some_and(|d| d.average > 0.0));
    }

    #[tokio::test]
    async fn test_http_errors_become_error_outcome() {
        let url = spawn_server("503 Service Unavailable", r#"{"error":"busy"}"#.to_string()).await;
        let executor = OpenAiExecutor::new(&HttpConfig::default())
            .expect("client")
            .with_progress(false);

        let outcome = executor.run(&params(url, LoadLevel::manual(3, 3))).await;

        match outcome {
            BenchmarkOutcome::Error { message } => {
                assert!(message.contains("all 3 requests failed"), "{message}");
                assert!(message.contains("503"), "{message}");
            }
            other => panic!("expected error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_unreachable_server_is_error_outcome() {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("addr");
        drop(listener);

        let executor = OpenAiExecutor::new(
            &HttpConfig::default().with_connect_timeout(Duration::from_secs(2)),
        )
        .expect("client")
        .with_progress(false);
        let outcome = executor
            .run(&params(format!("http://{addr}/v1/"), LoadLevel::manual(2, 1)))
            .await;

        assert!(outcome.is_error());
    }

    #[tokio::test]
    async fn test_zero_load_is_rejected() {
        let executor = OpenAiExecutor::new(&HttpConfig::default())
            .expect("client")
            .with_progress(false);
        let outcome = executor
            .run(&params("http://127.0.0.1:1/v1/".to_string(), LoadLevel::manual(0, 4)))
            .await;
        assert!(outcome.is_error());
    }
}
