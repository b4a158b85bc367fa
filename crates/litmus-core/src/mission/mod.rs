//! Goal-directed multi-turn runs: a guiding model picks each next request until it decides
//! the goal is reached, the turn budget is spent, or something breaks.

mod parse;
mod prompt;

pub use parse::parse_decision;

use crate::errors::{EngineError, Result};
use crate::judge::JudgeService;
use crate::model::{EvaluationOutcome, MissionSettings, TurnRecord, Verdict};
use crate::providers::llm::LlmClient;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

pub const DEFAULT_MAX_TURNS: u32 = 10;
pub const MAX_TURNS_CEILING: u32 = 100;

/// Submit override, then template setting, then engine default; clamped to `1..=MAX_TURNS_CEILING`.
pub fn effective_max_turns(requested: Option<u32>, template: Option<u32>, default: u32) -> u32 {
    requested
        .or(template)
        .unwrap_or(default)
        .clamp(1, MAX_TURNS_CEILING)
}

/// Why a mission stopped. Not an error: every mission ends with one of these.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "reason", content = "detail", rename_all = "snake_case")]
pub enum TerminationReason {
    GuideTerminated(String),
    MaxTurnsExceeded,
    ParseError(String),
    GuideUnavailable(String),
    TargetFailed(String),
    Cancelled,
}

impl TerminationReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            TerminationReason::GuideTerminated(_) => "guide_terminated",
            TerminationReason::MaxTurnsExceeded => "max_turns_exceeded",
            TerminationReason::ParseError(_) => "parse_error",
            TerminationReason::GuideUnavailable(_) => "guide_unavailable",
            TerminationReason::TargetFailed(_) => "target_failed",
            TerminationReason::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for TerminationReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TerminationReason::GuideTerminated(d)
            | TerminationReason::ParseError(d)
            | TerminationReason::GuideUnavailable(d)
            | TerminationReason::TargetFailed(d) => write!(f, "{}: {}", self.as_str(), d),
            _ => f.write_str(self.as_str()),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum MissionDecision {
    /// Payload for the next turn, bound to the `query` placeholder.
    Continue(Value),
    Terminate(TerminationReason),
}

pub struct MissionDriver {
    guide: Arc<dyn LlmClient>,
    timeout: Duration,
    assessor: Option<JudgeService>,
}

impl MissionDriver {
    pub fn new(guide: Arc<dyn LlmClient>, timeout: Duration) -> Self {
        Self {
            guide,
            timeout,
            assessor: None,
        }
    }

    pub fn with_assessor(mut self, judge: JudgeService) -> Self {
        self.assessor = Some(judge);
        self
    }

    /// Asks the guide for the next step. The turn bound is checked before the guide is called,
    /// so a guide that always continues still ends at `max_turns`.
    pub async fn next(&self, settings: &MissionSettings, history: &[TurnRecord]) -> MissionDecision {
        if history.len() as u32 >= settings.max_turns {
            return MissionDecision::Terminate(TerminationReason::MaxTurnsExceeded);
        }
        let prompt = prompt::guide_prompt(settings, history);
        let context = [prompt::GUIDE_SYSTEM.to_string()];
        let call = self.guide.complete(&prompt, Some(&context));
        match tokio::time::timeout(self.timeout, call).await {
            Ok(Ok(resp)) => {
                let decision = parse_decision(&resp.text);
                debug!(turn = history.len() + 1, ?decision, "guide decided");
                decision
            }
            Ok(Err(e)) => {
                warn!(error = %e, "guide call failed");
                MissionDecision::Terminate(TerminationReason::GuideUnavailable(e.to_string()))
            }
            Err(_) => MissionDecision::Terminate(TerminationReason::GuideUnavailable(format!(
                "guide call timed out after {}s",
                self.timeout.as_secs()
            ))),
        }
    }

    /// Judges the whole conversation once it has ended. `None` when no assessor is configured.
    pub async fn assess(
        &self,
        settings: &MissionSettings,
        history: &[TurnRecord],
        golden: Option<&Value>,
        termination: &TerminationReason,
    ) -> Option<EvaluationOutcome> {
        let judge = self.assessor.as_ref()?;
        let prompt = prompt::assessment_prompt(settings, history, golden, termination);
        let outcome = match judge
            .ask_parsed(prompt::ASSESSMENT_SYSTEM, &prompt, assessment_outcome)
            .await
        {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!(error = %e, "mission assessment failed");
                EvaluationOutcome::inconclusive(ASSESSOR, e.record())
            }
        };
        Some(outcome)
    }
}

const ASSESSOR: &str = "mission_assessment";

fn string_list(raw: &Value, key: &str) -> Vec<String> {
    match raw.get(key) {
        Some(Value::Array(items)) => items
            .iter()
            .map(crate::json_path::value_to_text)
            .collect(),
        Some(Value::String(s)) if !s.is_empty() => vec![s.clone()],
        _ => Vec::new(),
    }
}

fn assessment_outcome(raw: Value) -> Result<EvaluationOutcome> {
    let label = raw
        .get("overall_success")
        .and_then(Value::as_str)
        .map(|s| s.trim().to_ascii_lowercase());
    let (verdict, score) = match label.as_deref() {
        Some("successful") => (Verdict::Pass, 1.0),
        Some("partially successful") | Some("partially_successful") => (Verdict::Fail, 0.5),
        Some("failed") => (Verdict::Fail, 0.0),
        _ => {
            return Err(EngineError::JudgeParse(
                "assessment reply has no recognised overall_success".into(),
            ))
        }
    };
    let positives = string_list(&raw, "positive_observations");
    let improvements = string_list(&raw, "areas_for_improvement");
    let mut out = EvaluationOutcome::new(ASSESSOR, verdict).with_score(Some(score));
    if !improvements.is_empty() {
        out = out.with_explanation(improvements.join("; "));
    }
    out.details = json!({
        "overall_success": raw.get("overall_success"),
        "positive_observations": positives,
        "areas_for_improvement": improvements,
    });
    Ok(out)
}
