//! In-process doubles for the transport and clock seams

use async_trait::async_trait;
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

use super::fetch::Sleeper;
use super::transport::{ApiRequest, RawResponse, Transport, TransportError};

type Handler = Box<dyn Fn(&ApiRequest) -> Result<RawResponse, TransportError> + Send + Sync>;

/// Transport answering from a handler or a fixed script, recording requests
pub struct RouteTransport {
    handler: Option<Handler>,
    script: Mutex<VecDeque<Result<RawResponse, TransportError>>>,
    requests: Mutex<Vec<ApiRequest>>,
}

impl RouteTransport {
    pub fn new(
        handler: impl Fn(&ApiRequest) -> Result<RawResponse, TransportError> + Send + Sync + 'static,
    ) -> Self {
        Self {
            handler: Some(Box::new(handler)),
            script: Mutex::new(VecDeque::new()),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn sequence(responses: Vec<Result<RawResponse, TransportError>>) -> Self {
        Self {
            handler: None,
            script: Mutex::new(responses.into()),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn call_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub fn requests(&self) -> Vec<ApiRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl Transport for RouteTransport {
    async fn execute(&self, request: &ApiRequest) -> Result<RawResponse, TransportError> {
        self.requests.lock().unwrap().push(request.clone());
        match &self.handler {
            Some(handler) => handler(request),
            None => self
                .script
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(TransportError::Network("script exhausted".into()))),
        }
    }
}

/// Sleeper that records requested delays and returns immediately
#[derive(Default)]
pub struct RecordingSleeper {
    sleeps: Mutex<Vec<Duration>>,
}

impl RecordingSleeper {
    pub fn sleeps(&self) -> Vec<Duration> {
        self.sleeps.lock().unwrap().clone()
    }

    pub fn total(&self) -> Duration {
        self.sleeps().iter().sum()
    }
}

#[async_trait]
impl Sleeper for RecordingSleeper {
    async fn sleep(&self, duration: Duration) {
        self.sleeps.lock().unwrap().push(duration);
    }
}

pub fn json_response(status: u16, body: Value) -> RawResponse {
    RawResponse {
        status,
        retry_after: None,
        body: serde_json::to_vec(&body).unwrap(),
    }
}

pub fn status_response(status: u16) -> RawResponse {
    RawResponse {
        status,
        retry_after: None,
        body: Vec::new(),
    }
}

pub fn rate_limited(retry_after: Option<&str>) -> RawResponse {
    RawResponse {
        status: 429,
        retry_after: retry_after.map(str::to_string),
        body: Vec::new(),
    }
}
