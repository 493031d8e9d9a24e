//! Request-side types: load levels, credentials and executor parameters

use serde::{Deserialize, Serialize};

/// Number of requests issued per concurrency slot in an adaptive iteration
pub const REQUESTS_PER_SLOT: u32 = 5;

/// API credential passed to the model container and to every benchmark request
///
/// The value never appears in `Debug` output.
#[derive(Clone, PartialEq, Eq)]
pub struct ApiKey(String);

impl ApiKey {
    /// Wrap a raw key, trimming surrounding whitespace
    ///
    /// Returns `None` for an empty or blank key.
    pub fn new(raw: impl AsRef<str>) -> Option<Self> {
        let trimmed = raw.as_ref().trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(Self(trimmed.to_string()))
        }
    }

    /// The raw secret
    pub fn expose(&self) -> &str {
        &self.0
    }

    /// A short masked form suitable for display (`nvap...9f2c`)
    pub fn masked(&self) -> String {
        let chars: Vec<char> = self.0.chars().collect();
        if chars.len() <= 8 {
            return "*".repeat(chars.len());
        }
        let head: String = chars[..4].iter().collect();
        let tail: String = chars[chars.len() - 4..].iter().collect();
        format!("{head}...{tail}")
    }
}

impl std::fmt::Debug for ApiKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("ApiKey(<redacted>)")
    }
}

/// The load applied during one benchmark iteration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoadLevel {
    /// Simultaneous in-flight requests
    pub concurrency: u32,
    /// Requests issued over the whole iteration
    pub total_requests: u32,
}

impl LoadLevel {
    /// Load level for an adaptive iteration: `total_requests` is always
    /// [`REQUESTS_PER_SLOT`] times the concurrency.
    pub fn adaptive(concurrency: u32) -> Self {
        Self {
            concurrency,
            total_requests: concurrency.saturating_mul(REQUESTS_PER_SLOT),
        }
    }

    /// Load level with independently chosen values (manual runs)
    pub fn manual(total_requests: u32, concurrency: u32) -> Self {
        Self {
            concurrency,
            total_requests,
        }
    }
}

impl std::fmt::Display for LoadLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "concurrency={} total_requests={}",
            self.concurrency, self.total_requests
        )
    }
}

/// The server a benchmark is pointed at
#[derive(Debug, Clone)]
pub struct Target {
    /// Base URL of the OpenAI-compatible API, e.g. `http://0.0.0.0:8000/v1/`
    pub base_url: String,
    /// Model identifier sent in the request body
    pub model: String,
    /// Credential for the `Authorization` header
    pub api_key: ApiKey,
}

impl Target {
    /// Build a target from the server root (`http://host:port`)
    pub fn from_server_root(server_root: &str, model: impl Into<String>, api_key: ApiKey) -> Self {
        Self {
            base_url: format!("{}/v1/", server_root.trim_end_matches('/')),
            model: model.into(),
            api_key,
        }
    }
}

/// Full argument set for one executor call
#[derive(Debug, Clone)]
pub struct BenchmarkParams {
    /// Requests to issue in total
    pub total_requests: u32,
    /// Simultaneous in-flight requests
    pub concurrency: u32,
    /// Window over which workers start
    pub ramp_seconds: u64,
    /// `max_tokens` for every completion
    pub max_tokens: u32,
    /// API base URL
    pub base_url: String,
    /// Request credential
    pub api_key: ApiKey,
    /// Use server-sent-event streaming
    pub stream: bool,
    /// Model identifier
    pub model: String,
}

impl BenchmarkParams {
    /// Parameters for a given load against a target
    pub fn for_load(
        load: LoadLevel,
        target: &Target,
        ramp_seconds: u64,
        max_tokens: u32,
        stream: bool,
    ) -> Self {
        Self {
            total_requests: load.total_requests,
            concurrency: load.concurrency,
            ramp_seconds,
            max_tokens,
            base_url: target.base_url.clone(),
            api_key: target.api_key.clone(),
            stream,
            model: target.model.clone(),
        }
    }

    /// The load level these parameters describe
    pub fn load(&self) -> LoadLevel {
        LoadLevel::manual(self.total_requests, self.concurrency)
    }
}
