//! Evaluator dispatch: one trait over the scoring strategies, selected by the template's
//! tagged evaluation config.

mod custom_prompt;
mod inputs;
mod metric_suite;

pub use custom_prompt::CustomPromptEvaluator;
pub use inputs::metric_input;
pub use metric_suite::MetricSuiteEvaluator;

use crate::errors::{EngineError, ErrorKind, ErrorRecord, Result};
use crate::model::{EvaluationConfig, EvaluationOutcome, EvaluatorKind, FieldMap, Values};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

/// Everything an evaluator may look at. Evaluators only read it.
#[derive(Debug, Clone, Copy)]
pub struct EvaluationContext<'a> {
    pub request: &'a Value,
    pub response: &'a Value,
    pub golden: Option<&'a Value>,
    pub fields: &'a FieldMap,
    pub case_values: &'a Values,
}

#[async_trait]
pub trait Evaluator: Send + Sync {
    fn kind(&self) -> EvaluatorKind;

    async fn evaluate(
        &self,
        ctx: &EvaluationContext<'_>,
        config: &EvaluationConfig,
    ) -> Result<EvaluationOutcome>;
}

/// Registered evaluators keyed by kind, each call bounded by a timeout.
#[derive(Clone)]
pub struct EvaluatorSet {
    evaluators: HashMap<EvaluatorKind, Arc<dyn Evaluator>>,
    timeout: Duration,
}

impl EvaluatorSet {
    pub fn new(timeout: Duration) -> Self {
        Self {
            evaluators: HashMap::new(),
            timeout,
        }
    }

    pub fn with(mut self, evaluator: Arc<dyn Evaluator>) -> Self {
        self.evaluators.insert(evaluator.kind(), evaluator);
        self
    }

    pub fn supports(&self, kind: EvaluatorKind) -> bool {
        self.evaluators.contains_key(&kind)
    }

    /// Never fails: evaluator errors and timeouts become an Inconclusive outcome.
    /// Returns `None` when the template configures no evaluation.
    pub async fn dispatch(
        &self,
        ctx: &EvaluationContext<'_>,
        config: Option<&EvaluationConfig>,
    ) -> Option<EvaluationOutcome> {
        let config = config?;
        let kind = config.kind();
        let Some(evaluator) = self.evaluators.get(&kind) else {
            return Some(EvaluationOutcome::inconclusive(
                kind.as_str(),
                ErrorRecord::new(
                    ErrorKind::Evaluator,
                    format!("no evaluator registered for '{}'", kind.as_str()),
                ),
            ));
        };
        let outcome = match tokio::time::timeout(self.timeout, evaluator.evaluate(ctx, config)).await
        {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(e)) => {
                warn!(evaluator = kind.as_str(), error = %e, "evaluation failed");
                EvaluationOutcome::inconclusive(kind.as_str(), e.record())
            }
            Err(_) => {
                let e = EngineError::Timeout {
                    operation: format!("{} evaluation", kind.as_str()),
                    seconds: self.timeout.as_secs(),
                };
                warn!(evaluator = kind.as_str(), error = %e, "evaluation timed out");
                EvaluationOutcome::inconclusive(kind.as_str(), e.record())
            }
        };
        Some(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{CustomPromptConfig, MetricSuiteConfig, Verdict};
    use serde_json::json;

    struct Slow;

    #[async_trait]
    impl Evaluator for Slow {
        fn kind(&self) -> EvaluatorKind {
            EvaluatorKind::Ragas
        }
        async fn evaluate(
            &self,
            _ctx: &EvaluationContext<'_>,
            _config: &EvaluationConfig,
        ) -> Result<EvaluationOutcome> {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(EvaluationOutcome::new("ragas", Verdict::Pass))
        }
    }

    struct Broken;

    #[async_trait]
    impl Evaluator for Broken {
        fn kind(&self) -> EvaluatorKind {
            EvaluatorKind::CustomPrompt
        }
        async fn evaluate(
            &self,
            _ctx: &EvaluationContext<'_>,
            _config: &EvaluationConfig,
        ) -> Result<EvaluationOutcome> {
            Err(EngineError::Evaluator("boom".into()))
        }
    }

    fn ctx_parts() -> (Value, Value, FieldMap, Values) {
        (json!({}), json!({"answer": "x"}), FieldMap::default(), Values::new())
    }

    #[tokio::test]
    async fn no_config_means_no_outcome() {
        let (req, resp, fields, vals) = ctx_parts();
        let ctx = EvaluationContext { request: &req, response: &resp, golden: None, fields: &fields, case_values: &vals };
        assert!(EvaluatorSet::new(Duration::from_secs(1)).dispatch(&ctx, None).await.is_none());
    }

    #[tokio::test]
    async fn errors_and_timeouts_are_inconclusive() {
        let (req, resp, fields, vals) = ctx_parts();
        let ctx = EvaluationContext { request: &req, response: &resp, golden: None, fields: &fields, case_values: &vals };
        let set = EvaluatorSet::new(Duration::from_millis(50))
            .with(Arc::new(Slow))
            .with(Arc::new(Broken));

        let cp = EvaluationConfig::CustomPrompt(CustomPromptConfig { prompt: "p".into(), threshold: None });
        let out = set.dispatch(&ctx, Some(&cp)).await.unwrap();
        assert_eq!(out.verdict, Verdict::Inconclusive);
        assert_eq!(out.error.unwrap().kind, ErrorKind::Evaluator);

        let ragas = EvaluationConfig::Ragas(MetricSuiteConfig::default());
        let out = set.dispatch(&ctx, Some(&ragas)).await.unwrap();
        assert_eq!(out.verdict, Verdict::Inconclusive);
        assert_eq!(out.error.unwrap().kind, ErrorKind::Timeout);

        let deepeval = EvaluationConfig::Deepeval(MetricSuiteConfig::default());
        let out = set.dispatch(&ctx, Some(&deepeval)).await.unwrap();
        assert!(out.error.unwrap().message.contains("no evaluator registered"));
    }
}
