mod cache;
pub mod parse;
pub mod prompt;

pub use parse::{extract_json, parse_verdict, JudgeVerdict};

use crate::errors::{EngineError, Result};
use crate::providers::llm::LlmClient;
use crate::storage::Store;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

#[derive(Clone, Debug)]
pub struct JudgeRuntimeConfig {
    pub provider: String, // "openai", "fake", "none"
    pub temperature: f32,
    pub max_tokens: u32,
    pub timeout: Duration,
    pub cache: bool,
    pub system_prompt_version: String,
}

impl Default for JudgeRuntimeConfig {
    fn default() -> Self {
        Self {
            provider: "none".into(),
            temperature: 0.0,
            max_tokens: 1000,
            timeout: Duration::from_secs(60),
            cache: true,
            system_prompt_version: "v1".into(),
        }
    }
}

/// Judging model plus an optional reply cache in the store.
#[derive(Clone)]
pub struct JudgeService {
    config: JudgeRuntimeConfig,
    client: Arc<dyn LlmClient>,
    store: Option<Store>,
}

impl JudgeService {
    pub fn new(config: JudgeRuntimeConfig, client: Arc<dyn LlmClient>) -> Self {
        Self {
            config,
            client,
            store: None,
        }
    }

    pub fn with_cache(mut self, store: Store) -> Self {
        self.store = Some(store);
        self
    }

    pub fn client(&self) -> &Arc<dyn LlmClient> {
        &self.client
    }

    /// Sends `prompt` under `system` instructions and hands the first JSON object of the reply
    /// to `parse`. Only replies that `parse` accepts are cached.
    pub async fn ask_parsed<T>(
        &self,
        system: &str,
        prompt: &str,
        parse: impl Fn(Value) -> Result<T>,
    ) -> Result<T> {
        let store = self.store.as_ref().filter(|_| self.config.cache);
        let key = cache::cache_key(self, system, prompt);
        if let Some(store) = store {
            if let Some(hit) = store.judge_cache_get(&key)? {
                match parse(hit) {
                    Ok(parsed) => {
                        debug!(key = %key, "judge cache hit");
                        return Ok(parsed);
                    }
                    Err(e) => debug!(key = %key, error = %e, "ignoring unusable cached reply"),
                }
            }
        }

        let context = [system.to_string()];
        let call = self.client.complete(prompt, Some(&context));
        let resp = match tokio::time::timeout(self.config.timeout, call).await {
            Ok(Ok(resp)) => resp,
            Ok(Err(e)) => return Err(EngineError::Evaluator(format!("judge call failed: {e}"))),
            Err(_) => {
                return Err(EngineError::Timeout {
                    operation: "judge call".into(),
                    seconds: self.config.timeout.as_secs(),
                })
            }
        };

        let value = extract_json(&resp.text).ok_or_else(|| {
            EngineError::JudgeParse(format!("no JSON object in reply: {}", clip(&resp.text)))
        })?;
        let parsed = parse(value.clone())?;

        if let Some(store) = store {
            if let Err(e) = store.judge_cache_put(&key, &resp.model, &value) {
                warn!(error = %e, "failed to cache judge reply");
            }
        }
        Ok(parsed)
    }

    /// Asks for a pass/fail verdict on an interpolated prompt.
    pub async fn judge(&self, prompt: &str, threshold: f64) -> Result<JudgeVerdict> {
        self.ask_parsed(prompt::SYSTEM_PROMPT, prompt, |raw| {
            parse_verdict(raw, threshold)
        })
        .await
    }
}

fn clip(text: &str) -> String {
    const MAX: usize = 200;
    match text.char_indices().nth(MAX) {
        Some((idx, _)) => format!("{}...", &text[..idx]),
        None => text.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::llm::fake::ScriptedClient;

    fn service(client: Arc<ScriptedClient>, store: Option<Store>) -> JudgeService {
        let svc = JudgeService::new(JudgeRuntimeConfig::default(), client);
        match store {
            Some(s) => svc.with_cache(s),
            None => svc,
        }
    }

    #[tokio::test]
    async fn verdict_from_wrapped_reply() {
        let client = Arc::new(ScriptedClient::new([
            "Here is my verdict: {\"similarity\": 0.92, \"rationale\": \"both say Paris\"}",
        ]));
        let v = service(client, None).judge("compare", 0.5).await.unwrap();
        assert!(v.passed);
        assert_eq!(v.score, Some(0.92));
    }

    #[tokio::test]
    async fn prose_only_reply_is_parse_error() {
        let client = Arc::new(ScriptedClient::new(["I think it is fine."]));
        let err = service(client, None).judge("compare", 0.5).await.unwrap_err();
        assert!(matches!(err, EngineError::JudgeParse(_)));
    }

    #[tokio::test]
    async fn provider_failure_is_evaluator_error() {
        let client = Arc::new(ScriptedClient::new(Vec::<String>::new()).then_fail("503"));
        let err = service(client, None).judge("compare", 0.5).await.unwrap_err();
        assert!(matches!(err, EngineError::Evaluator(_)));
    }

    #[tokio::test]
    async fn second_identical_call_hits_cache() {
        let store = Store::memory().unwrap();
        store.init_schema().unwrap();
        let client = Arc::new(ScriptedClient::new(["{\"passed\": false}"]));
        let svc = service(client.clone(), Some(store));
        assert!(!svc.judge("same prompt", 0.5).await.unwrap().passed);
        // The script is exhausted, so only the cache can answer.
        assert!(!svc.judge("same prompt", 0.5).await.unwrap().passed);
        assert_eq!(client.prompts().len(), 1);
    }

    #[tokio::test]
    async fn unparseable_verdict_is_not_cached() {
        let store = Store::memory().unwrap();
        store.init_schema().unwrap();
        let client = Arc::new(ScriptedClient::new([
            "{\"rationale\": \"x\"}",
            "{\"passed\": true}",
        ]));
        let svc = service(client.clone(), Some(store));
        let err = svc.judge("same prompt", 0.5).await.unwrap_err();
        assert!(matches!(err, EngineError::JudgeParse(_)));
        assert!(svc.judge("same prompt", 0.5).await.unwrap().passed);
        assert_eq!(client.prompts().len(), 2);
        // The good reply is the one that stuck.
        assert!(svc.judge("same prompt", 0.5).await.unwrap().passed);
        assert_eq!(client.prompts().len(), 2);
    }

    #[test]
    fn clip_is_char_safe() {
        let long = "é".repeat(300);
        assert!(clip(&long).ends_with("..."));
        assert_eq!(clip("short"), "short");
    }
}
