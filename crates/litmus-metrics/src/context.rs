//! Retrieval quality: is the retrieved context on point, and does it hold what the golden
//! answer needs.

use crate::text::{content_words, coverage, sentences};
use async_trait::async_trait;
use litmus_core::metrics_api::{Metric, MetricInput, MetricResult};
use serde_json::json;
use std::collections::BTreeSet;

fn has_context(input: &MetricInput) -> bool {
    input.context.iter().any(|c| !c.trim().is_empty())
}

/// Share of context chunks that are relevant to the reference (golden, else the answer),
/// weighted toward chunks ranked first.
pub struct ContextPrecision;

#[async_trait]
impl Metric for ContextPrecision {
    fn name(&self) -> &'static str {
        "context_precision"
    }

    fn applies(&self, input: &MetricInput) -> bool {
        has_context(input)
    }

    async fn evaluate(&self, input: &MetricInput) -> anyhow::Result<MetricResult> {
        let reference = content_words(input.golden.as_deref().unwrap_or(&input.answer));
        let relevant: Vec<bool> = input
            .context
            .iter()
            .map(|chunk| !content_words(chunk).is_disjoint(&reference))
            .collect();
        // Average precision over the relevant positions.
        let mut hits = 0usize;
        let mut sum = 0.0;
        for (k, rel) in relevant.iter().enumerate() {
            if *rel {
                hits += 1;
                sum += hits as f64 / (k + 1) as f64;
            }
        }
        let score = if hits == 0 { 0.0 } else { sum / hits as f64 };
        Ok(MetricResult::new(score).with_details(json!({
            "chunks": relevant.len(),
            "relevant": hits,
        })))
    }
}

/// Share of golden-answer sentences supported by the retrieved context.
pub struct ContextRecall;

#[async_trait]
impl Metric for ContextRecall {
    fn name(&self) -> &'static str {
        "context_recall"
    }

    fn applies(&self, input: &MetricInput) -> bool {
        has_context(input) && input.golden.as_deref().is_some_and(|g| !g.trim().is_empty())
    }

    async fn evaluate(&self, input: &MetricInput) -> anyhow::Result<MetricResult> {
        let golden = input
            .golden
            .as_deref()
            .ok_or_else(|| anyhow::anyhow!("context recall needs a golden response"))?;
        let context: BTreeSet<String> = input.context.iter().flat_map(|c| content_words(c)).collect();
        let claims = sentences(golden);
        let supported = claims
            .iter()
            .filter(|s| coverage(&content_words(s), &context) >= 0.5)
            .count();
        let score = supported as f64 / claims.len().max(1) as f64;
        Ok(MetricResult::new(score).with_details(json!({
            "claims": claims.len(),
            "supported": supported,
        })))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn input(context: &[&str], golden: Option<&str>) -> MetricInput {
        MetricInput {
            query: "capital of France".into(),
            answer: "Paris".into(),
            context: context.iter().map(|s| s.to_string()).collect(),
            golden: golden.map(str::to_string),
        }
    }

    #[tokio::test]
    async fn precision_rewards_relevant_chunks_first() {
        let first = input(&["Paris is the capital.", "Bananas are yellow."], Some("Paris"));
        let last = input(&["Bananas are yellow.", "Paris is the capital."], Some("Paris"));
        let a = ContextPrecision.evaluate(&first).await.unwrap().score;
        let b = ContextPrecision.evaluate(&last).await.unwrap().score;
        assert_eq!(a, 1.0);
        assert_eq!(b, 0.5);
    }

    #[tokio::test]
    async fn recall_counts_supported_claims() {
        let i = input(
            &["Paris is the capital of France."],
            Some("Paris is the capital. It has the Louvre museum."),
        );
        assert_eq!(ContextRecall.evaluate(&i).await.unwrap().score, 0.5);
        assert!(!ContextRecall.applies(&input(&[], Some("Paris"))));
    }
}
