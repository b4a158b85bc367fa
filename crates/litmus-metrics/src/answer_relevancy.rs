use crate::text::{content_words, cosine_similarity, coverage, sentences};
use async_trait::async_trait;
use litmus_core::judge::extract_json;
use litmus_core::metrics_api::{Metric, MetricInput, MetricResult};
use litmus_core::providers::embedder::Embedder;
use litmus_core::providers::llm::LlmClient;
use serde_json::json;
use std::sync::Arc;

fn answers_something(input: &MetricInput) -> bool {
    !input.query.trim().is_empty() && !input.answer.trim().is_empty()
}

/// How directly the answer addresses the question: embedding similarity when an embedder is
/// configured, otherwise the share of question terms the answer picks up.
pub struct AnswerRelevancy {
    embedder: Option<Arc<dyn Embedder>>,
}

impl AnswerRelevancy {
    pub fn new(embedder: Option<Arc<dyn Embedder>>) -> Self {
        Self { embedder }
    }
}

#[async_trait]
impl Metric for AnswerRelevancy {
    fn name(&self) -> &'static str {
        "answer_relevancy"
    }

    fn applies(&self, input: &MetricInput) -> bool {
        answers_something(input)
    }

    async fn evaluate(&self, input: &MetricInput) -> anyhow::Result<MetricResult> {
        if let Some(embedder) = &self.embedder {
            let q = embedder.embed(&input.query).await?;
            let a = embedder.embed(&input.answer).await?;
            let score = cosine_similarity(&q, &a)?;
            return Ok(MetricResult::new(score).with_details(json!({
                "method": "embedding",
                "model": embedder.model_id(),
            })));
        }
        let query = content_words(&input.query);
        let answer = content_words(&input.answer);
        Ok(MetricResult::new(coverage(&query, &answer)).with_details(json!({
            "method": "lexical",
            "query_terms": query.len(),
        })))
    }
}

const GRADER_SYSTEM: &str = "Split the answer into statements and judge which of them address \
     the question. Output ONLY JSON: {\"score\": share of relevant statements between 0 and 1, \
     \"reason\": string naming any off-topic statements}.";

/// Statement-level relevancy: the share of answer statements that touch the question. Graded by
/// the model when one is configured, otherwise by shared question terms.
pub struct StatementRelevancy {
    grader: Option<Arc<dyn LlmClient>>,
}

impl StatementRelevancy {
    pub fn new(grader: Option<Arc<dyn LlmClient>>) -> Self {
        Self { grader }
    }

    fn lexical(input: &MetricInput) -> MetricResult {
        let query = content_words(&input.query);
        let statements = sentences(&input.answer);
        let relevant: Vec<&str> = statements
            .iter()
            .copied()
            .filter(|s| !content_words(s).is_disjoint(&query))
            .collect();
        let score = relevant.len() as f64 / statements.len().max(1) as f64;
        let irrelevant: Vec<&str> = statements
            .iter()
            .copied()
            .filter(|s| !relevant.contains(s))
            .collect();
        let reason = if irrelevant.is_empty() {
            format!("all {} statements address the question", statements.len())
        } else {
            format!(
                "{} of {} statements address the question; off-topic: {}",
                relevant.len(),
                statements.len(),
                irrelevant.join(" | ")
            )
        };
        MetricResult::new(score).with_reason(reason).with_details(json!({
            "method": "lexical",
            "statements": statements.len(),
            "relevant": relevant.len(),
        }))
    }
}

#[async_trait]
impl Metric for StatementRelevancy {
    fn name(&self) -> &'static str {
        "answer_relevancy"
    }

    fn applies(&self, input: &MetricInput) -> bool {
        answers_something(input)
    }

    async fn evaluate(&self, input: &MetricInput) -> anyhow::Result<MetricResult> {
        let Some(grader) = &self.grader else {
            return Ok(Self::lexical(input));
        };
        let prompt = format!("### Question:\n{}\n\n### Answer:\n{}", input.query, input.answer);
        let context = [GRADER_SYSTEM.to_string()];
        let resp = grader.complete(&prompt, Some(&context)).await?;
        let raw = extract_json(&resp.text)
            .ok_or_else(|| anyhow::anyhow!("relevancy grader returned no JSON"))?;
        let score = raw
            .get("score")
            .and_then(|v| v.as_f64())
            .ok_or_else(|| anyhow::anyhow!("relevancy grader returned no score"))?
            .clamp(0.0, 1.0);
        let mut out = MetricResult::new(score).with_details(json!({ "method": "llm", "model": resp.model }));
        if let Some(reason) = raw.get("reason").and_then(|v| v.as_str()) {
            out = out.with_reason(reason);
        }
        Ok(out)
    }
}
