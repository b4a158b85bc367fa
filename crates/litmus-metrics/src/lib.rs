//! Metric suites for Litmus evaluations.
//!
//! `ragas` scores relevancy, retrieval quality, harm and similarity and only gives a verdict
//! when thresholds are configured. `deepeval` scores statement-level relevancy with a reason,
//! graded by the model when one is configured, and passes at 0.5 by default.

use std::sync::Arc;

use litmus_core::evaluator::MetricSuiteEvaluator;
use litmus_core::metrics_api::Metric;
use litmus_core::model::EvaluatorKind;
use litmus_core::providers::embedder::Embedder;
use litmus_core::providers::llm::LlmClient;

mod answer_relevancy;
mod answer_similarity;
mod context;
mod harmfulness;
mod text;

pub use answer_relevancy::{AnswerRelevancy, StatementRelevancy};
pub use answer_similarity::AnswerSimilarity;
pub use context::{ContextPrecision, ContextRecall};
pub use harmfulness::Harmfulness;

pub const DEEPEVAL_DEFAULT_THRESHOLD: f64 = 0.5;

/// Optional model backends for the metrics. Without them every metric falls back to a
/// lexical method.
#[derive(Clone, Default)]
pub struct MetricBackends {
    pub grader: Option<Arc<dyn LlmClient>>,
    pub embedder: Option<Arc<dyn Embedder>>,
}

pub fn ragas_metrics(backends: &MetricBackends) -> Vec<Arc<dyn Metric>> {
    vec![
        Arc::new(AnswerRelevancy::new(backends.embedder.clone())),
        Arc::new(ContextPrecision),
        Arc::new(ContextRecall),
        Arc::new(Harmfulness::new(backends.grader.clone())),
        Arc::new(AnswerSimilarity::new(backends.embedder.clone())),
    ]
}

pub fn deepeval_metrics(backends: &MetricBackends) -> Vec<Arc<dyn Metric>> {
    vec![Arc::new(StatementRelevancy::new(backends.grader.clone()))]
}

pub fn ragas_evaluator(backends: &MetricBackends) -> MetricSuiteEvaluator {
    MetricSuiteEvaluator::new(EvaluatorKind::Ragas, ragas_metrics(backends))
}

pub fn deepeval_evaluator(backends: &MetricBackends) -> MetricSuiteEvaluator {
    MetricSuiteEvaluator::new(EvaluatorKind::Deepeval, deepeval_metrics(backends))
        .with_default_threshold("answer_relevancy", DEEPEVAL_DEFAULT_THRESHOLD)
}
