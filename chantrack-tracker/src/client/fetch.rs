//! Rate-limited fetch client
//!
//! Every backend call goes through [`FetchClient`], which owns the HTTP 429
//! contract:
//! - 2xx: the body is returned (and decoded as JSON by the read helpers)
//! - 429: wait `Retry-After` seconds (default 1 when missing or invalid, capped
//!   at `max_retry_after`), retry
//! - anything else, transport errors, malformed JSON: give up at once
//!
//! At most `max_attempts` requests are made. A 429 on the last attempt still
//! waits out its `Retry-After` before giving up.
//!
//! Read helpers collapse every failure to `None` ("unknown, not fetched").
//! Mutations use [`FetchClient::send`] to see the terminal status.

use async_trait::async_trait;
use chantrack_common::config::RetryConfig;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

use super::transport::{ApiRequest, RawResponse, Transport, TransportError};

/// Source of real-time delays
#[async_trait]
pub trait Sleeper: Send + Sync {
    async fn sleep(&self, duration: Duration);
}

/// Sleeps on the tokio timer
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Retry budget for HTTP 429 responses
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first
    pub max_attempts: u32,
    /// Wait used when `Retry-After` is missing or invalid
    pub default_retry_after: Duration,
    /// Longest single wait honored, whatever the backend asks for
    pub max_retry_after: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&RetryConfig::default())
    }
}

impl RetryPolicy {
    pub fn from_config(config: &RetryConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            default_retry_after: Duration::from_secs(config.default_retry_after_secs),
            max_retry_after: Duration::from_secs(config.max_retry_after_secs),
        }
    }
}

/// Parse a `Retry-After` header given in integer seconds
pub fn parse_retry_after(value: Option<&str>, default: Duration) -> Duration {
    value
        .and_then(|v| v.trim().parse::<u64>().ok())
        .map(Duration::from_secs)
        .unwrap_or(default)
}

/// Terminal failure of a request
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("Still rate limited after {attempts} attempts")]
    RateLimited { attempts: u32 },

    #[error("HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("Malformed response body: {0}")]
    Decode(String),
}

impl FetchError {
    pub fn status(&self) -> Option<u16> {
        match self {
            FetchError::Status { status, .. } => Some(*status),
            FetchError::RateLimited { .. } => Some(429),
            _ => None,
        }
    }
}

/// HTTP client applying the 429 retry contract
pub struct FetchClient {
    transport: Arc<dyn Transport>,
    sleeper: Arc<dyn Sleeper>,
    policy: RetryPolicy,
}

impl FetchClient {
    pub fn new(transport: Arc<dyn Transport>, sleeper: Arc<dyn Sleeper>, policy: RetryPolicy) -> Self {
        Self {
            transport,
            sleeper,
            policy,
        }
    }

    /// Perform `request`, retrying only on HTTP 429
    ///
    /// Returns the first 2xx response.
    pub async fn execute(&self, request: &ApiRequest) -> Result<RawResponse, FetchError> {
        let mut waited = Duration::ZERO;

        for attempt in 1..=self.policy.max_attempts {
            let response = match self.transport.execute(request).await {
                Ok(response) => response,
                Err(e) => {
                    debug!(url = %request.url, attempt, error = %e, "Request failed at transport level");
                    return Err(e.into());
                }
            };

            if response.is_success() {
                if attempt > 1 {
                    debug!(url = %request.url, attempt, waited_ms = waited.as_millis() as u64, "Request succeeded after rate limiting");
                }
                return Ok(response);
            }

            if !response.is_rate_limited() {
                debug!(url = %request.url, status = response.status, "Request returned non-success status");
                return Err(FetchError::Status {
                    status: response.status,
                    body: response.body_excerpt(),
                });
            }

            let requested = parse_retry_after(response.retry_after.as_deref(), self.policy.default_retry_after);
            let wait = requested.min(self.policy.max_retry_after);
            if wait < requested {
                debug!(url = %request.url, requested_secs = requested.as_secs(), "Retry-After capped");
            }
            warn!(
                url = %request.url,
                attempt,
                max_attempts = self.policy.max_attempts,
                retry_after_secs = wait.as_secs(),
                "Rate limited by backend"
            );
            self.sleeper.sleep(wait).await;
            waited += wait;
        }

        warn!(
            url = %request.url,
            attempts = self.policy.max_attempts,
            waited_secs = waited.as_secs(),
            "Retry budget exhausted"
        );
        Err(FetchError::RateLimited {
            attempts: self.policy.max_attempts,
        })
    }

    /// Perform a mutation and decode its (possibly empty) JSON body
    pub async fn send(&self, request: &ApiRequest) -> Result<Option<Value>, FetchError> {
        let response = self.execute(request).await?;
        if response.body.iter().all(u8::is_ascii_whitespace) {
            return Ok(None);
        }
        serde_json::from_slice(&response.body)
            .map(Some)
            .map_err(|e| FetchError::Decode(e.to_string()))
    }

    /// Perform a read and decode the body as `T`
    ///
    /// Never fails: every failure mode yields `None`.
    pub async fn fetch_json<T: DeserializeOwned>(&self, request: &ApiRequest) -> Option<T> {
        let response = match self.execute(request).await {
            Ok(response) => response,
            Err(e) => {
                debug!(url = %request.url, error = %e, "Fetch yielded no data");
                return None;
            }
        };

        match serde_json::from_slice(&response.body) {
            Ok(value) => Some(value),
            Err(e) => {
                warn!(url = %request.url, error = %e, "Malformed JSON from backend");
                None
            }
        }
    }

    /// GET `url` as untyped JSON
    pub async fn fetch_with_retry(&self, url: &str) -> Option<Value> {
        self.fetch_json(&ApiRequest::get(url)).await
    }
}
