//! Transport to the application under test.

pub mod fake;

use crate::errors::{EngineError, Result};
use crate::model::{HttpMethod, RequestSpec};
use async_trait::async_trait;
use serde_json::Value;
use std::time::{Duration, Instant};

/// Header carrying the per-case tracing id to the target.
pub const TRACING_HEADER: &str = "X-Litmus-Request";

#[derive(Debug, Clone, PartialEq)]
pub struct HttpExchange {
    pub status: u16,
    /// Parsed JSON, or the raw text as a JSON string when the body is not JSON.
    pub body: Value,
    pub latency_ms: u64,
}

#[async_trait]
pub trait Transport: Send + Sync {
    /// Sends `request`. Non-2xx replies are errors carrying the status and the body text.
    async fn send(&self, request: &RequestSpec, tracing_id: &str) -> Result<HttpExchange>;

    fn name(&self) -> &'static str;
}

pub(crate) fn parse_body(text: &str) -> Value {
    if text.trim().is_empty() {
        return Value::Null;
    }
    serde_json::from_str(text).unwrap_or_else(|_| Value::String(text.to_string()))
}

pub struct ReqwestTransport {
    client: reqwest::Client,
    timeout: Duration,
}

impl ReqwestTransport {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| {
                EngineError::Config(crate::errors::ConfigError(format!(
                    "failed to build http client: {e}"
                )))
            })?;
        Ok(Self { client, timeout })
    }

    fn method(m: HttpMethod) -> reqwest::Method {
        match m {
            HttpMethod::Get => reqwest::Method::GET,
            HttpMethod::Post => reqwest::Method::POST,
            HttpMethod::Put => reqwest::Method::PUT,
            HttpMethod::Patch => reqwest::Method::PATCH,
            HttpMethod::Delete => reqwest::Method::DELETE,
        }
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn send(&self, request: &RequestSpec, tracing_id: &str) -> Result<HttpExchange> {
        let mut builder = self
            .client
            .request(Self::method(request.method), &request.url)
            .header(TRACING_HEADER, tracing_id);
        for (k, v) in &request.headers {
            builder = builder.header(k.as_str(), v.as_str());
        }
        if request.method.carries_body() {
            if let Some(body) = &request.body {
                builder = builder.json(body);
            }
        }

        let start = Instant::now();
        let resp = builder.send().await.map_err(|e| {
            if e.is_timeout() {
                EngineError::Timeout {
                    operation: format!("{} {}", request.method.as_str(), request.url),
                    seconds: self.timeout.as_secs(),
                }
            } else {
                EngineError::transport(e.to_string())
            }
        })?;
        let status = resp.status();
        let text = resp
            .text()
            .await
            .map_err(|e| EngineError::transport(format!("failed to read body: {e}")))?;
        let latency_ms = start.elapsed().as_millis() as u64;

        if !status.is_success() {
            return Err(EngineError::Transport {
                message: format!("HTTP {}: {}", status.as_u16(), text),
                status: Some(status.as_u16()),
            });
        }
        Ok(HttpExchange {
            status: status.as_u16(),
            body: parse_body(&text),
            latency_ms,
        })
    }

    fn name(&self) -> &'static str {
        "reqwest"
    }
}
