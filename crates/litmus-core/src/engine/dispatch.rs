use super::Engine;
use crate::errors::{EngineError, Result};
use crate::model::{RequestSpec, Run};
use crate::providers::http::HttpExchange;
use crate::resolve::Resolver;
use std::time::Instant;
use tracing::{info, warn};
use uuid::Uuid;

/// Which hook a setup/teardown call is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Hook {
    Pre,
    Post,
}

impl Hook {
    fn wrap(self, e: EngineError) -> EngineError {
        match self {
            Hook::Pre => EngineError::PreRequest(Box::new(e)),
            Hook::Post => EngineError::PostRequest(Box::new(e)),
        }
    }

    fn as_str(self) -> &'static str {
        match self {
            Hook::Pre => "pre_request",
            Hook::Post => "post_request",
        }
    }
}

impl Engine {
    /// Sends one request under the engine's request timeout and writes the request log entry.
    pub(crate) async fn send(&self, request: &RequestSpec, tracing_id: &str) -> Result<HttpExchange> {
        let started = Instant::now();
        let call = self.transport.send(request, tracing_id);
        let result = match tokio::time::timeout(self.settings.request_timeout, call).await {
            Ok(r) => r,
            Err(_) => Err(EngineError::Timeout {
                operation: format!("{} {}", request.method.as_str(), request.url),
                seconds: self.settings.request_timeout.as_secs(),
            }),
        };
        match &result {
            Ok(ex) => info!(
                target: "litmus::requests",
                tracing_id,
                method = request.method.as_str(),
                url = %request.url,
                status = ex.status,
                latency_ms = ex.latency_ms,
                "request completed"
            ),
            Err(e) => warn!(
                target: "litmus::requests",
                tracing_id,
                method = request.method.as_str(),
                url = %request.url,
                status = ?e.status(),
                latency_ms = started.elapsed().as_millis() as u64,
                error = %e,
                "request failed"
            ),
        }
        result
    }

    /// Resolves a setup/teardown request against the run's test data and sends it.
    pub(crate) async fn run_hook(&self, hook: Hook, spec: &RequestSpec, run: &Run) -> Result<()> {
        let resolved = {
            let resolver = Resolver::new()
                .with_values(&run.test_data)
                .with_files(Some(self.files.as_ref()));
            resolver.resolve_request(spec).map_err(|e| hook.wrap(e))?
        };
        for w in &resolved.warnings {
            warn!(hook = hook.as_str(), warning = %w, "hook request has unresolved placeholders");
        }
        let tracing_id = Uuid::new_v4().to_string();
        self.send(&resolved.value, &tracing_id)
            .await
            .map(|_| ())
            .map_err(|e| hook.wrap(e))
    }
}
