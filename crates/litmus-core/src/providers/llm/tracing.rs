use crate::model::LlmResponse;
use crate::providers::llm::LlmClient;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{info_span, Instrument};

/// Wraps a client in a `gen_ai.client.request` span. Prompts are never recorded.
pub struct TracingLlmClient {
    inner: Arc<dyn LlmClient>,
    role: &'static str,
}

impl TracingLlmClient {
    /// `role` names what the model is used for: "judge", "guide", "metric".
    pub fn new(inner: Arc<dyn LlmClient>, role: &'static str) -> Self {
        Self { inner, role }
    }
}

#[async_trait]
impl LlmClient for TracingLlmClient {
    async fn complete(
        &self,
        prompt: &str,
        context: Option<&[String]>,
    ) -> anyhow::Result<LlmResponse> {
        let span = info_span!(
            "gen_ai.client.request",
            "litmus.provider" = self.inner.provider_name(),
            "litmus.role" = self.role,
            "gen_ai.request.model" = tracing::field::Empty,
            "gen_ai.usage.input_tokens" = tracing::field::Empty,
            "gen_ai.usage.output_tokens" = tracing::field::Empty,
            "latency_ms" = tracing::field::Empty,
            "error" = tracing::field::Empty,
            "error.message" = tracing::field::Empty
        );

        async move {
            let start = std::time::Instant::now();
            let result = self.inner.complete(prompt, context).await;
            let span = tracing::Span::current();
            span.record("latency_ms", start.elapsed().as_millis() as u64);

            match &result {
                Ok(resp) => {
                    span.record("gen_ai.request.model", resp.model.as_str());
                    if let Some(usage) = resp.meta.get("usage") {
                        if let Some(i) = usage.get("prompt_tokens").and_then(|v| v.as_u64()) {
                            span.record("gen_ai.usage.input_tokens", i);
                        }
                        if let Some(o) = usage.get("completion_tokens").and_then(|v| v.as_u64()) {
                            span.record("gen_ai.usage.output_tokens", o);
                        }
                    }
                }
                Err(e) => {
                    span.record("error", true);
                    span.record("error.message", e.to_string().as_str());
                    tracing::warn!(error = %e, "model call failed");
                }
            }
            result
        }
        .instrument(span)
        .await
    }

    fn provider_name(&self) -> &'static str {
        self.inner.provider_name()
    }

    fn model_id(&self) -> String {
        self.inner.model_id()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::llm::fake::{FakeClient, ScriptedClient};

    #[tokio::test]
    async fn passes_through_replies_and_identity() {
        let inner = Arc::new(FakeClient::new("gpt-4o-mini".to_string()).with_response("ok".into()));
        let client = TracingLlmClient::new(inner, "judge");
        let res = client.complete("hello", None).await.unwrap();
        assert_eq!(res.text, "ok");
        assert_eq!(client.provider_name(), "fake");
        assert_eq!(client.model_id(), "gpt-4o-mini");
    }

    #[tokio::test]
    async fn passes_through_errors() {
        let _ = tracing_subscriber::fmt().with_test_writer().try_init();
        let inner = Arc::new(ScriptedClient::new(Vec::<String>::new()));
        let client = TracingLlmClient::new(inner, "guide");
        assert!(client.complete("hello", None).await.is_err());
    }
}
