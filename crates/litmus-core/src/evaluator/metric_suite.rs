use super::{metric_input, EvaluationContext, Evaluator};
use crate::errors::{EngineError, ErrorKind, ErrorRecord, Result};
use crate::metrics_api::{Direction, Metric};
use crate::model::{EvaluationConfig, EvaluationOutcome, EvaluatorKind, MetricScore, Verdict};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

/// Runs a set of metrics over one exchange and folds them into a single outcome.
///
/// The outcome score is the mean "goodness" of the computed metrics (`v` for higher-is-better,
/// `1 - v` for lower-is-better). A pass/fail verdict exists only when at least one computed
/// metric has a threshold.
pub struct MetricSuiteEvaluator {
    kind: EvaluatorKind,
    metrics: Vec<Arc<dyn Metric>>,
    default_thresholds: BTreeMap<String, f64>,
    metric_timeout: Duration,
}

impl MetricSuiteEvaluator {
    pub fn new(kind: EvaluatorKind, metrics: Vec<Arc<dyn Metric>>) -> Self {
        Self {
            kind,
            metrics,
            default_thresholds: BTreeMap::new(),
            metric_timeout: Duration::from_secs(60),
        }
    }

    pub fn with_default_threshold(mut self, metric: &str, threshold: f64) -> Self {
        self.default_thresholds.insert(metric.to_string(), threshold);
        self
    }

    pub fn with_metric_timeout(mut self, timeout: Duration) -> Self {
        self.metric_timeout = timeout;
        self
    }
}

#[async_trait]
impl Evaluator for MetricSuiteEvaluator {
    fn kind(&self) -> EvaluatorKind {
        self.kind
    }

    async fn evaluate(
        &self,
        ctx: &EvaluationContext<'_>,
        config: &EvaluationConfig,
    ) -> Result<EvaluationOutcome> {
        let cfg = match config {
            EvaluationConfig::Ragas(c) | EvaluationConfig::Deepeval(c)
                if config.kind() == self.kind =>
            {
                c
            }
            other => {
                return Err(EngineError::Evaluator(format!(
                    "{} evaluator got a '{}' config",
                    self.kind.as_str(),
                    other.kind().as_str()
                )))
            }
        };
        let input = metric_input(ctx);
        let mut scores = BTreeMap::new();

        for name in &cfg.metrics {
            if !self.metrics.iter().any(|m| m.name() == name) {
                scores.insert(
                    name.clone(),
                    MetricScore {
                        error: Some(format!("unknown metric '{name}'")),
                        ..Default::default()
                    },
                );
            }
        }

        let mut goodness = Vec::new();
        let mut errored = 0usize;
        let mut threshold_errors = false;
        for metric in &self.metrics {
            let name = metric.name();
            if !cfg.metrics.is_empty() && !cfg.metrics.iter().any(|m| m == name) {
                continue;
            }
            let threshold = cfg
                .thresholds
                .get(name)
                .or_else(|| self.default_thresholds.get(name))
                .copied();
            if !metric.applies(&input) {
                scores.insert(
                    name.to_string(),
                    MetricScore {
                        threshold,
                        reason: Some("skipped: required inputs are missing".into()),
                        ..Default::default()
                    },
                );
                continue;
            }
            let direction = metric.direction();
            let result = tokio::time::timeout(self.metric_timeout, metric.evaluate(&input)).await;
            let entry = match result {
                Ok(Ok(r)) => {
                    goodness.push(match direction {
                        Direction::HigherIsBetter => r.score,
                        Direction::LowerIsBetter => 1.0 - r.score,
                    });
                    MetricScore {
                        value: Some(r.score),
                        threshold,
                        passed: threshold.map(|t| direction.passes(r.score, t)),
                        reason: r.reason,
                        error: None,
                    }
                }
                Ok(Err(e)) => {
                    errored += 1;
                    threshold_errors |= threshold.is_some();
                    MetricScore {
                        threshold,
                        error: Some(e.to_string()),
                        ..Default::default()
                    }
                }
                Err(_) => {
                    errored += 1;
                    threshold_errors |= threshold.is_some();
                    MetricScore {
                        threshold,
                        error: Some(format!(
                            "timed out after {}s",
                            self.metric_timeout.as_secs()
                        )),
                        ..Default::default()
                    }
                }
            };
            scores.insert(name.to_string(), entry);
        }

        let evaluator = self.kind.as_str();
        if goodness.is_empty() {
            let mut out = if errored > 0 {
                EvaluationOutcome::inconclusive(
                    evaluator,
                    ErrorRecord::new(ErrorKind::Evaluator, "every metric failed"),
                )
            } else {
                EvaluationOutcome::new(evaluator, Verdict::Unscored)
                    .with_explanation("no applicable metrics")
            };
            out.metrics = scores;
            return Ok(out);
        }

        let judged: Vec<bool> = scores.values().filter_map(|s| s.passed).collect();
        let verdict = if judged.is_empty() {
            Verdict::Unscored
        } else if judged.iter().any(|p| !p) {
            Verdict::Fail
        } else if threshold_errors {
            Verdict::Inconclusive
        } else {
            Verdict::Pass
        };

        let explanation: Vec<String> = scores
            .iter()
            .filter_map(|(name, s)| {
                s.reason
                    .as_ref()
                    .or(s.error.as_ref())
                    .map(|r| format!("{name}: {r}"))
            })
            .collect();

        let mut out = EvaluationOutcome::new(evaluator, verdict)
            .with_score(Some(goodness.iter().sum::<f64>() / goodness.len() as f64));
        if !explanation.is_empty() {
            out.explanation = Some(explanation.join("\n"));
        }
        out.metrics = scores;
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics_api::{MetricInput, MetricResult};
    use crate::model::{FieldMap, MetricSuiteConfig, Values};
    use serde_json::{json, Value};

    struct Fixed(&'static str, f64, Direction);

    #[async_trait]
    impl Metric for Fixed {
        fn name(&self) -> &'static str {
            self.0
        }
        fn direction(&self) -> Direction {
            self.2
        }
        async fn evaluate(&self, _input: &MetricInput) -> anyhow::Result<MetricResult> {
            Ok(MetricResult::new(self.1).with_reason(format!("fixed {}", self.1)))
        }
    }

    struct Failing;

    #[async_trait]
    impl Metric for Failing {
        fn name(&self) -> &'static str {
            "failing"
        }
        async fn evaluate(&self, _input: &MetricInput) -> anyhow::Result<MetricResult> {
            anyhow::bail!("grader unavailable")
        }
    }

    async fn run(
        suite: &MetricSuiteEvaluator,
        cfg: MetricSuiteConfig,
    ) -> EvaluationOutcome {
        let (req, resp, golden) = (json!({}), json!("answer"), Value::from("gold"));
        let fields = FieldMap::default();
        let vals = Values::new();
        let ctx = EvaluationContext { request: &req, response: &resp, golden: Some(&golden), fields: &fields, case_values: &vals };
        suite.evaluate(&ctx, &EvaluationConfig::Ragas(cfg)).await.unwrap()
    }

    #[tokio::test]
    async fn no_thresholds_means_unscored_with_values() {
        let suite = MetricSuiteEvaluator::new(
            EvaluatorKind::Ragas,
            vec![
                Arc::new(Fixed("relevancy", 0.75, Direction::HigherIsBetter)),
                Arc::new(Fixed("harmfulness", 0.25, Direction::LowerIsBetter)),
                Arc::new(Failing),
            ],
        );
        let out = run(&suite, MetricSuiteConfig::default()).await;
        assert_eq!(out.verdict, Verdict::Unscored);
        assert_eq!(out.score, Some(0.75));
        assert_eq!(out.metrics["relevancy"].value, Some(0.75));
        assert!(out.metrics["failing"].error.as_deref().unwrap().contains("grader unavailable"));
    }

    #[tokio::test]
    async fn thresholds_respect_direction() {
        let suite = MetricSuiteEvaluator::new(
            EvaluatorKind::Ragas,
            vec![
                Arc::new(Fixed("relevancy", 0.8, Direction::HigherIsBetter)),
                Arc::new(Fixed("harmfulness", 0.7, Direction::LowerIsBetter)),
            ],
        );
        let mut cfg = MetricSuiteConfig::default();
        cfg.thresholds.insert("relevancy".into(), 0.5);
        let out = run(&suite, cfg.clone()).await;
        assert_eq!(out.verdict, Verdict::Pass);

        cfg.thresholds.insert("harmfulness".into(), 0.5);
        let out = run(&suite, cfg).await;
        assert_eq!(out.verdict, Verdict::Fail);
        assert_eq!(out.metrics["harmfulness"].passed, Some(false));
    }

    #[tokio::test]
    async fn all_metrics_failing_is_inconclusive() {
        let suite = MetricSuiteEvaluator::new(EvaluatorKind::Ragas, vec![Arc::new(Failing)]);
        let out = run(&suite, MetricSuiteConfig::default()).await;
        assert_eq!(out.verdict, Verdict::Inconclusive);
        assert_eq!(out.error.unwrap().kind, ErrorKind::Evaluator);
    }

    #[tokio::test]
    async fn default_threshold_applies_and_selection_filters() {
        let suite = MetricSuiteEvaluator::new(
            EvaluatorKind::Ragas,
            vec![
                Arc::new(Fixed("relevancy", 0.3, Direction::HigherIsBetter)),
                Arc::new(Failing),
            ],
        )
        .with_default_threshold("relevancy", 0.5);
        let cfg = MetricSuiteConfig {
            metrics: vec!["relevancy".into(), "bogus".into()],
            thresholds: BTreeMap::new(),
        };
        let out = run(&suite, cfg).await;
        assert_eq!(out.verdict, Verdict::Fail);
        assert!(!out.metrics.contains_key("failing"));
        assert!(out.metrics["bogus"].error.is_some());
    }
}
