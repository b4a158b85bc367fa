use super::LlmClient;
use crate::model::LlmResponse;
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Mutex, PoisonError};

/// Always answers with the same text.
#[derive(Debug)]
pub struct FakeClient {
    model: String,
    fixed_response: Option<String>,
}

impl FakeClient {
    pub fn new(model: String) -> Self {
        Self {
            model,
            fixed_response: None,
        }
    }

    pub fn with_response(mut self, response: String) -> Self {
        self.fixed_response = Some(response);
        self
    }
}

fn response(text: String, model: &str) -> LlmResponse {
    LlmResponse {
        text,
        provider: "fake".to_string(),
        model: model.to_string(),
        cached: false,
        meta: serde_json::json!({}),
    }
}

#[async_trait]
impl LlmClient for FakeClient {
    async fn complete(
        &self,
        _prompt: &str,
        _context: Option<&[String]>,
    ) -> anyhow::Result<LlmResponse> {
        let text = self
            .fixed_response
            .clone()
            .unwrap_or_else(|| r#"{"passed": true, "score": 1.0, "rationale": "fake judge"}"#.to_string());
        Ok(response(text, &self.model))
    }

    fn provider_name(&self) -> &'static str {
        "fake"
    }

    fn model_id(&self) -> String {
        self.model.clone()
    }
}

/// Replays queued replies in order and records every prompt it receives.
/// A queued `Err` simulates a provider failure. Once the queue is empty, calls fail.
#[derive(Debug, Default)]
pub struct ScriptedClient {
    replies: Mutex<VecDeque<Result<String, String>>>,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedClient {
    pub fn new<I, S>(replies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            replies: Mutex::new(replies.into_iter().map(|s| Ok(s.into())).collect()),
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn then_fail(self, message: &str) -> Self {
        self.replies
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push_back(Err(message.to_string()));
        self
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl LlmClient for ScriptedClient {
    async fn complete(
        &self,
        prompt: &str,
        _context: Option<&[String]>,
    ) -> anyhow::Result<LlmResponse> {
        self.prompts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(prompt.to_string());
        let next = self
            .replies
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front();
        match next {
            Some(Ok(text)) => Ok(response(text, "scripted")),
            Some(Err(message)) => anyhow::bail!(message),
            None => anyhow::bail!("scripted client has no replies left"),
        }
    }

    fn provider_name(&self) -> &'static str {
        "scripted"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn scripted_replays_in_order_then_fails() {
        let c = ScriptedClient::new(["one", "two"]).then_fail("rate limited");
        assert_eq!(c.complete("p1", None).await.unwrap().text, "one");
        assert_eq!(c.complete("p2", None).await.unwrap().text, "two");
        let err = c.complete("p3", None).await.unwrap_err();
        assert!(err.to_string().contains("rate limited"));
        assert!(c.complete("p4", None).await.is_err());
        assert_eq!(c.prompts(), vec!["p1", "p2", "p3", "p4"]);
    }
}
