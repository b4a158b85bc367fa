use super::{metric_input, EvaluationContext, Evaluator};
use crate::errors::{EngineError, Result};
use crate::json_path::value_to_text;
use crate::judge::prompt::build_prompt;
use crate::judge::JudgeService;
use crate::model::{
    EvaluationConfig, EvaluationOutcome, EvaluatorKind, Values, Verdict, DEFAULT_JUDGE_THRESHOLD,
};
use async_trait::async_trait;
use serde_json::{json, Value};

pub const NO_GOLDEN_NOTE: &str = "No golden response available";

/// Sends the template's prompt to the judging model and reads back a verdict.
pub struct CustomPromptEvaluator {
    judge: JudgeService,
    default_threshold: f64,
}

impl CustomPromptEvaluator {
    pub fn new(judge: JudgeService) -> Self {
        Self {
            judge,
            default_threshold: DEFAULT_JUDGE_THRESHOLD,
        }
    }

    /// Threshold for templates that do not set one.
    pub fn with_default_threshold(mut self, threshold: f64) -> Self {
        self.default_threshold = threshold;
        self
    }
}

#[async_trait]
impl Evaluator for CustomPromptEvaluator {
    fn kind(&self) -> EvaluatorKind {
        EvaluatorKind::CustomPrompt
    }

    async fn evaluate(
        &self,
        ctx: &EvaluationContext<'_>,
        config: &EvaluationConfig,
    ) -> Result<EvaluationOutcome> {
        let EvaluationConfig::CustomPrompt(cfg) = config else {
            return Err(EngineError::Evaluator(format!(
                "custom prompt evaluator got a '{}' config",
                config.kind().as_str()
            )));
        };
        let Some(golden) = ctx.golden else {
            return Ok(EvaluationOutcome::new(self.kind().as_str(), Verdict::Unscored)
                .with_explanation(NO_GOLDEN_NOTE));
        };

        let input = metric_input(ctx);
        let mut vars = Values::new();
        vars.insert("query".into(), Value::String(input.query));
        vars.insert("answer".into(), Value::String(input.answer));
        vars.insert("golden".into(), Value::String(value_to_text(golden)));
        vars.insert("request".into(), Value::String(value_to_text(ctx.request)));
        vars.insert("response".into(), Value::String(value_to_text(ctx.response)));
        let (prompt, warnings) = build_prompt(&cfg.prompt, &vars)?;

        let threshold = cfg.threshold.unwrap_or(self.default_threshold);
        let verdict = self.judge.judge(&prompt, threshold).await?;
        let mut outcome = EvaluationOutcome::new(
            self.kind().as_str(),
            if verdict.passed {
                Verdict::Pass
            } else {
                Verdict::Fail
            },
        )
        .with_score(verdict.score);
        outcome.explanation = verdict.explanation;
        outcome.details = json!({ "judge": verdict.raw, "prompt_warnings": warnings });
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::judge::JudgeRuntimeConfig;
    use crate::model::{CustomPromptConfig, FieldMap};
    use crate::providers::llm::fake::ScriptedClient;
    use std::sync::Arc;

    fn config() -> EvaluationConfig {
        EvaluationConfig::CustomPrompt(CustomPromptConfig {
            prompt: "Does '{{answer}}' match '{{golden}}'?".into(),
            threshold: None,
        })
    }

    #[tokio::test]
    async fn judge_sees_interpolated_prompt() {
        let client = Arc::new(ScriptedClient::new([r#"{"similarity": 1.0, "rationale": "identical"}"#]));
        let eval = CustomPromptEvaluator::new(JudgeService::new(JudgeRuntimeConfig::default(), client.clone()));
        let (req, resp, golden) = (json!({}), json!({"answer": "Paris"}), json!("Paris"));
        let fields = FieldMap { output: Some("answer".into()), ..Default::default() };
        let vals = Values::new();
        let ctx = EvaluationContext { request: &req, response: &resp, golden: Some(&golden), fields: &fields, case_values: &vals };

        let out = eval.evaluate(&ctx, &config()).await.unwrap();
        assert_eq!(out.verdict, Verdict::Pass);
        assert_eq!(out.score, Some(1.0));
        assert_eq!(out.explanation.as_deref(), Some("identical"));
        assert_eq!(client.prompts(), vec!["Does 'Paris' match 'Paris'?"]);
    }

    #[tokio::test]
    async fn missing_golden_is_unscored_without_calling_judge() {
        let client = Arc::new(ScriptedClient::new(Vec::<String>::new()));
        let eval = CustomPromptEvaluator::new(JudgeService::new(JudgeRuntimeConfig::default(), client.clone()));
        let (req, resp) = (json!({}), json!({"answer": "Paris"}));
        let fields = FieldMap::default();
        let vals = Values::new();
        let ctx = EvaluationContext { request: &req, response: &resp, golden: None, fields: &fields, case_values: &vals };

        let out = eval.evaluate(&ctx, &config()).await.unwrap();
        assert_eq!(out.verdict, Verdict::Unscored);
        assert_eq!(out.explanation.as_deref(), Some(NO_GOLDEN_NOTE));
        assert!(client.prompts().is_empty());
    }
}
