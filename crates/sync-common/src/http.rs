use std::time::{Duration, SystemTime, UNIX_EPOCH};

use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::warn;

use crate::error::ClientError;

/// Timeout and retry settings shared by the Canvas and Notion clients.
#[derive(Clone, Debug)]
pub struct RetryPolicy {
    pub default_timeout: Duration,
    pub max_retries: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    pub max_error_body_bytes: usize,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            default_timeout: Duration::from_secs(30),
            max_retries: 2,
            initial_backoff: Duration::from_millis(250),
            max_backoff: Duration::from_millis(5_000),
            max_error_body_bytes: 8 * 1024,
        }
    }
}

impl RetryPolicy {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();

        let default_timeout = lookup("HTTP_TIMEOUT_SECS")
            .and_then(|s| s.parse::<u64>().ok())
            .map(Duration::from_secs)
            .unwrap_or(defaults.default_timeout);

        let max_retries = lookup("HTTP_MAX_RETRIES")
            .and_then(|s| s.parse::<u32>().ok())
            .unwrap_or(defaults.max_retries);

        let initial_backoff = lookup("HTTP_RETRY_INITIAL_MS")
            .and_then(|s| s.parse::<u64>().ok())
            .map(Duration::from_millis)
            .unwrap_or(defaults.initial_backoff);

        let max_backoff = lookup("HTTP_RETRY_MAX_MS")
            .and_then(|s| s.parse::<u64>().ok())
            .map(Duration::from_millis)
            .unwrap_or(defaults.max_backoff);

        Self {
            default_timeout,
            max_retries,
            initial_backoff,
            max_backoff,
            max_error_body_bytes: defaults.max_error_body_bytes,
        }
    }
}

/// Whether a request may be replayed after an ambiguous failure.
///
/// Creates and appends are `Unsafe`: a timeout may hide a write that already landed, so those
/// are only retried when the server explicitly refused the request (429) or the connection was
/// never established.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Replay {
    Safe,
    Unsafe,
}

/// Thin JSON-over-HTTP wrapper with bounded retry.
#[derive(Clone)]
pub struct JsonHttp {
    http: reqwest::Client,
    policy: RetryPolicy,
}

impl JsonHttp {
    pub fn new(user_agent: &str, policy: RetryPolicy) -> Result<Self, ClientError> {
        let http = reqwest::Client::builder().user_agent(user_agent).build()?;
        Ok(Self { http, policy })
    }

    /// Send the request built by `build`, retrying transient failures.
    ///
    /// Non-2xx responses are turned into [`ClientError::Upstream`] or
    /// [`ClientError::UpstreamBody`].
    pub async fn execute<F>(&self, replay: Replay, build: F) -> Result<reqwest::Response, ClientError>
    where
        F: Fn(&reqwest::Client) -> reqwest::RequestBuilder,
    {
        let build = &build;
        self.request_with_retry(replay, || async move {
            let resp = build(&self.http)
                .timeout(self.policy.default_timeout)
                .send()
                .await?;
            if resp.status().is_success() {
                return Ok(resp);
            }
            Err(to_upstream_error(resp, self.policy.max_error_body_bytes).await)
        })
        .await
    }

    pub async fn json<T, F>(&self, replay: Replay, build: F) -> Result<T, ClientError>
    where
        T: DeserializeOwned,
        F: Fn(&reqwest::Client) -> reqwest::RequestBuilder,
    {
        let resp = self.execute(replay, build).await?;
        decode_json(resp).await
    }

    async fn request_with_retry<T, Fut, F>(&self, replay: Replay, mut f: F) -> Result<T, ClientError>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = Result<T, ClientError>>,
    {
        let mut attempt: u32 = 0;
        loop {
            attempt += 1;
            match f().await {
                Ok(v) => return Ok(v),
                Err(e) => {
                    if attempt > self.policy.max_retries || !should_retry(&e, replay) {
                        return Err(e);
                    }
                    let delay = backoff_delay(
                        self.policy.initial_backoff,
                        self.policy.max_backoff,
                        attempt - 1,
                    );
                    warn!(
                        attempt,
                        delay_ms = delay.as_millis(),
                        error = %e,
                        "upstream request failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }
}

pub async fn decode_json<T: DeserializeOwned>(resp: reqwest::Response) -> Result<T, ClientError> {
    let bytes = resp.bytes().await?;
    Ok(serde_json::from_slice(&bytes)?)
}

fn should_retry(err: &ClientError, replay: Replay) -> bool {
    match err {
        ClientError::Request(e) => match replay {
            Replay::Safe => e.is_timeout() || e.is_connect() || e.is_request() || e.is_body(),
            Replay::Unsafe => e.is_connect(),
        },
        ClientError::Upstream { status, .. } | ClientError::UpstreamBody { status, .. } => {
            match replay {
                Replay::Safe => *status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error(),
                Replay::Unsafe => *status == StatusCode::TOO_MANY_REQUESTS,
            }
        }
        ClientError::InvalidJson(_) => false,
    }
}

fn backoff_delay(initial: Duration, max: Duration, exponent: u32) -> Duration {
    let mult = 1u128.checked_shl(exponent).unwrap_or(u128::MAX);
    let base_ms = initial.as_millis().saturating_mul(mult);
    let capped_ms = std::cmp::min(base_ms, max.as_millis()) as u64;
    let jitter_cap = std::cmp::max(1, capped_ms / 4);
    let jitter_ms = pseudo_jitter_ms(jitter_cap);
    Duration::from_millis(capped_ms.saturating_add(jitter_ms))
}

fn pseudo_jitter_ms(max_inclusive: u64) -> u64 {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_else(|_| Duration::from_secs(0));
    let nanos = now.subsec_nanos() as u64;
    nanos % (max_inclusive + 1)
}

async fn to_upstream_error(resp: reqwest::Response, max_error_body_bytes: usize) -> ClientError {
    let status = resp.status();
    let body = read_limited_text(resp, max_error_body_bytes).await;
    match upstream_message(&body) {
        Some(message) => ClientError::Upstream { status, message },
        None => ClientError::UpstreamBody { status, body },
    }
}

/// Notion answers `{"message": ...}`, Canvas answers `{"errors": [{"message": ...}]}` or
/// `{"message": ...}`.
fn upstream_message(body: &str) -> Option<String> {
    let parsed: ErrorEnvelope = serde_json::from_str(body).ok()?;
    if let Some(message) = parsed.message.filter(|m| !m.is_empty()) {
        return Some(message);
    }
    match parsed.errors? {
        serde_json::Value::Array(items) => items
            .iter()
            .find_map(|e| e.get("message").and_then(|m| m.as_str()))
            .map(|m| m.to_string()),
        serde_json::Value::Object(map) => map
            .get("message")
            .and_then(|m| m.as_str())
            .map(|m| m.to_string()),
        _ => None,
    }
}

async fn read_limited_text(resp: reqwest::Response, max_bytes: usize) -> String {
    match resp.bytes().await {
        Ok(mut b) => {
            if b.len() > max_bytes {
                b.truncate(max_bytes);
            }
            String::from_utf8_lossy(&b).to_string()
        }
        Err(e) => {
            warn!(error = %e, "failed to read upstream error body");
            "<failed to read error body>".to_string()
        }
    }
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    message: Option<String>,
    errors: Option<serde_json::Value>,
}
