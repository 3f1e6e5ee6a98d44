//! HTTP transport seam
//!
//! The fetch client talks to the backend through [`Transport`] so the retry
//! contract can be exercised without a network. [`ReqwestTransport`] is the
//! production implementation and carries the per-request timeout.

use async_trait::async_trait;
use chantrack_common::config::BackendConfig;
use reqwest::header::RETRY_AFTER;
use reqwest::Client;
use std::time::Duration;
use thiserror::Error;

const USER_AGENT: &str = concat!("chantrack/", env!("CARGO_PKG_VERSION"));

/// Transport-level failures (no HTTP status was received)
#[derive(Debug, Clone, Error)]
pub enum TransportError {
    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Network error: {0}")]
    Network(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
    Delete,
}

/// One backend request
#[derive(Debug, Clone)]
pub struct ApiRequest {
    pub method: Method,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Option<serde_json::Value>,
}

impl ApiRequest {
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            method: Method::Get,
            url: url.into(),
            headers: Vec::new(),
            body: None,
        }
    }

    pub fn post(url: impl Into<String>, body: serde_json::Value) -> Self {
        Self {
            method: Method::Post,
            url: url.into(),
            headers: Vec::new(),
            body: Some(body),
        }
    }

    pub fn delete(url: impl Into<String>, body: serde_json::Value) -> Self {
        Self {
            method: Method::Delete,
            url: url.into(),
            headers: Vec::new(),
            body: Some(body),
        }
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// Status, `Retry-After` and body of a completed exchange
#[derive(Debug, Clone)]
pub struct RawResponse {
    pub status: u16,
    pub retry_after: Option<String>,
    pub body: Vec<u8>,
}

impl RawResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn is_rate_limited(&self) -> bool {
        self.status == 429
    }

    /// Body as text, truncated for log and error messages
    pub fn body_excerpt(&self) -> String {
        String::from_utf8_lossy(&self.body).chars().take(200).collect()
    }
}

#[async_trait]
pub trait Transport: Send + Sync {
    /// Perform exactly one HTTP exchange
    async fn execute(&self, request: &ApiRequest) -> Result<RawResponse, TransportError>;
}

/// reqwest-backed transport
pub struct ReqwestTransport {
    client: Client,
}

impl ReqwestTransport {
    pub fn new(request_timeout: Duration, connect_timeout: Duration) -> Result<Self, TransportError> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(request_timeout)
            .connect_timeout(connect_timeout)
            .build()
            .map_err(|e| TransportError::Network(e.to_string()))?;

        Ok(Self { client })
    }

    pub fn from_config(config: &BackendConfig) -> Result<Self, TransportError> {
        Self::new(config.request_timeout(), config.connect_timeout())
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn execute(&self, request: &ApiRequest) -> Result<RawResponse, TransportError> {
        let mut builder = match request.method {
            Method::Get => self.client.get(&request.url),
            Method::Post => self.client.post(&request.url),
            Method::Delete => self.client.delete(&request.url),
        };

        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let response = builder.send().await.map_err(classify_reqwest_error)?;

        let status = response.status().as_u16();
        let retry_after = response
            .headers()
            .get(RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let body = response
            .bytes()
            .await
            .map_err(classify_reqwest_error)?
            .to_vec();

        Ok(RawResponse {
            status,
            retry_after,
            body,
        })
    }
}

fn classify_reqwest_error(e: reqwest::Error) -> TransportError {
    if e.is_timeout() {
        TransportError::Timeout(e.to_string())
    } else {
        TransportError::Network(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transport_creation() {
        let transport = ReqwestTransport::from_config(&BackendConfig::default());
        assert!(transport.is_ok());
    }

    #[test]
    fn test_header_lookup_is_case_insensitive() {
        let request = ApiRequest::get("http://example.test").with_header("X-Turnstile-Token", "abc");
        assert_eq!(request.header("x-turnstile-token"), Some("abc"));
        assert_eq!(request.header("authorization"), None);
    }

    #[test]
    fn test_status_classes() {
        let ok = RawResponse { status: 204, retry_after: None, body: Vec::new() };
        let limited = RawResponse { status: 429, retry_after: Some("3".into()), body: Vec::new() };
        assert!(ok.is_success());
        assert!(!limited.is_success());
        assert!(limited.is_rate_limited());
    }
}
