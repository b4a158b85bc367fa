use crate::model::LlmResponse;
use async_trait::async_trait;

pub mod fake;
pub mod openai;
pub mod tracing;

/// A chat-style model used as judge, mission guide or metric grader.
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// `context` entries are sent as system messages ahead of the prompt.
    async fn complete(
        &self,
        prompt: &str,
        context: Option<&[String]>,
    ) -> anyhow::Result<LlmResponse>;

    fn provider_name(&self) -> &'static str;

    /// Model identifier, used to scope cached judge replies.
    fn model_id(&self) -> String {
        self.provider_name().to_string()
    }
}
