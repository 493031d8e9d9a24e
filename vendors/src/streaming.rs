//! Streaming response parsing and HTTP client settings.

use std::time::Duration;

use reqwest::Client;

// ============================================================================
// SSE Parser
// ============================================================================

/// Maximum buffer size (1MB) to prevent unbounded memory growth from malformed streams.
const MAX_BUFFER_SIZE: usize = 1024 * 1024;

/// Server-Sent Events parser for `chat/completions` streams.
///
/// Buffers incoming bytes and yields complete events. Events are separated
/// by a blank line; only `data:` and `event:` fields are kept.
///
/// ```text
/// data: {"choices":[{"delta":{"content":"Hello"}}]}
///
/// data: [DONE]
/// ```
#[derive(Debug, Default)]
pub struct SseParser {
    buffer: Vec<u8>,
    truncated: bool,
}

impl SseParser {
    /// Create a new SSE parser.
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed bytes into the parser and return any complete events.
    ///
    /// Incomplete events stay buffered as raw bytes for the next call, so a
    /// character split across chunks is decoded intact. A buffer beyond 1MB
    /// is cut back at a newline boundary and a warning is logged once.
    pub fn feed(&mut self, bytes: &[u8]) -> Vec<SseEvent> {
        // Servers may send CRLF line endings, possibly split across chunks
        self.buffer.extend(bytes.iter().copied().filter(|&b| b != b'\r'));

        if self.buffer.len() > MAX_BUFFER_SIZE {
            if !self.truncated {
                tracing::warn!(
                    limit = MAX_BUFFER_SIZE,
                    "SSE buffer overflow, truncating malformed stream"
                );
                self.truncated = true;
            }
            let mut target_start = self.buffer.len() - MAX_BUFFER_SIZE / 2;
            // Skip UTF-8 continuation bytes
            while target_start < self.buffer.len() && self.buffer[target_start] & 0xC0 == 0x80 {
                target_start += 1;
            }
            let start = self.buffer[target_start..]
                .iter()
                .position(|&b| b == b'\n')
                .map(|pos| target_start + pos + 1)
                .unwrap_or(target_start);
            self.buffer.drain(..start);
        }

        let mut events = Vec::new();
        while let Some(pos) = find_separator(&self.buffer) {
            let raw: Vec<u8> = self.buffer.drain(..pos + 2).collect();
            if let Some(event) = parse_event(&String::from_utf8_lossy(&raw)) {
                events.push(event);
            }
            self.truncated = false;
        }
        events
    }

    /// Check if the parser has buffered data.
    pub fn has_buffered_data(&self) -> bool {
        self.buffer.iter().any(|b| !b.is_ascii_whitespace())
    }
}

/// Offset of the first blank-line event separator
fn find_separator(buffer: &[u8]) -> Option<usize> {
    buffer.windows(2).position(|pair| pair == b"\n\n")
}

fn parse_event(raw: &str) -> Option<SseEvent> {
    let mut data_lines = Vec::new();
    let mut event_type = None;

    for line in raw.lines() {
        if let Some(value) = line.strip_prefix("data:") {
            data_lines.push(value.strip_prefix(' ').unwrap_or(value));
        } else if let Some(value) = line.strip_prefix("event:") {
            event_type = Some(value.trim().to_string());
        }
    }

    if data_lines.is_empty() {
        return None;
    }

    let data = data_lines.join("\n");
    if data.trim() == "[DONE]" {
        return Some(SseEvent::Done);
    }

    Some(SseEvent::Data { data, event_type })
}

/// A single Server-Sent Event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SseEvent {
    /// Data event, usually a JSON chunk
    Data {
        /// The event payload
        data: String,
        /// Optional event type
        event_type: Option<String>,
    },
    /// End of stream marker (`[DONE]`)
    Done,
}

impl SseEvent {
    /// Returns the payload if this is a Data event.
    pub fn data(&self) -> Option<&str> {
        match self {
            SseEvent::Data { data, .. } => Some(data),
            SseEvent::Done => None,
        }
    }
}

// ============================================================================
// HTTP Client
// ============================================================================

/// Settings for the shared HTTP client.
#[derive(Debug, Clone)]
pub struct HttpConfig {
    /// Idle connection timeout
    pub pool_idle_timeout: Duration,

    /// Maximum idle connections per host
    pub pool_max_idle_per_host: usize,

    /// Per-request timeout
    pub request_timeout: Duration,

    /// Connection timeout
    pub connect_timeout: Duration,

    /// User agent string
    pub user_agent: String,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            pool_idle_timeout: Duration::from_secs(90),
            pool_max_idle_per_host: 256,
            request_timeout: Duration::from_secs(300),
            connect_timeout: Duration::from_secs(30),
            user_agent: format!("nim-bench/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

impl HttpConfig {
    /// Set the per-request timeout.
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Set the connection timeout.
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Build a pooled client from these settings.
    ///
    /// # Errors
    ///
    /// Returns an error if the TLS backend cannot be initialised.
    pub fn build_client(&self) -> Result<Client, reqwest::Error> {
        Client::builder()
            .pool_idle_timeout(self.pool_idle_timeout)
            .pool_max_idle_per_host(self.pool_max_idle_per_host)
            .timeout(self.request_timeout)
            .connect_timeout(self.connect_timeout)
            .user_agent(&self.user_agent)
            .build()
    }
}
