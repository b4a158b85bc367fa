use crate::text::{content_words, cosine_similarity, token_f1};
use async_trait::async_trait;
use litmus_core::metrics_api::{Metric, MetricInput, MetricResult};
use litmus_core::providers::embedder::Embedder;
use serde_json::json;
use std::sync::Arc;

/// Closeness of the answer to the golden response.
pub struct AnswerSimilarity {
    embedder: Option<Arc<dyn Embedder>>,
}

impl AnswerSimilarity {
    pub fn new(embedder: Option<Arc<dyn Embedder>>) -> Self {
        Self { embedder }
    }
}

#[async_trait]
impl Metric for AnswerSimilarity {
    fn name(&self) -> &'static str {
        "answer_similarity"
    }

    fn applies(&self, input: &MetricInput) -> bool {
        input.golden.as_deref().is_some_and(|g| !g.trim().is_empty())
    }

    async fn evaluate(&self, input: &MetricInput) -> anyhow::Result<MetricResult> {
        let golden = input
            .golden
            .as_deref()
            .ok_or_else(|| anyhow::anyhow!("answer similarity needs a golden response"))?;
        if let Some(embedder) = &self.embedder {
            let a = embedder.embed(&input.answer).await?;
            let g = embedder.embed(golden).await?;
            return Ok(MetricResult::new(cosine_similarity(&a, &g)?)
                .with_details(json!({ "method": "embedding", "model": embedder.model_id() })));
        }
        let score = token_f1(&content_words(golden), &content_words(&input.answer));
        Ok(MetricResult::new(score).with_details(json!({ "method": "token_f1" })))
    }
}
