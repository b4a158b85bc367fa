use crate::errors::{EngineError, ErrorRecord};
use crate::mission::TerminationReason;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;

/// Key/value data used to fill `{{name}}` placeholders.
pub type Values = Map<String, Value>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TemplateKind {
    #[default]
    #[serde(alias = "Test Run")]
    Run,
    #[serde(alias = "Test Mission")]
    Mission,
}

impl TemplateKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TemplateKind::Run => "run",
            TemplateKind::Mission => "mission",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "run" => Some(TemplateKind::Run),
            "mission" => Some(TemplateKind::Mission),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    Get,
    #[default]
    Post,
    Put,
    Patch,
    Delete,
}

impl HttpMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
            HttpMethod::Put => "PUT",
            HttpMethod::Patch => "PATCH",
            HttpMethod::Delete => "DELETE",
        }
    }

    /// GET and DELETE requests are sent without a body.
    pub fn carries_body(&self) -> bool {
        !matches!(self, HttpMethod::Get | HttpMethod::Delete)
    }
}

/// An HTTP request description. Any string inside it may carry placeholders.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestSpec {
    pub url: String,
    #[serde(default)]
    pub method: HttpMethod,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub headers: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<Value>,
}

impl RequestSpec {
    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

/// One static test case of a run template.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct CaseDef {
    /// Per-case placeholder values. These win over run-level test data.
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub values: Values,
    /// Request for this case; falls back to the template's default request.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request: Option<RequestSpec>,
    #[serde(default, alias = "golden_response", skip_serializing_if = "Option::is_none")]
    pub golden: Option<Value>,
}

impl CaseDef {
    /// Explicit golden answer, else the `response` entry of the case values.
    pub fn golden_value(&self) -> Option<&Value> {
        self.golden
            .as_ref()
            .or_else(|| self.values.get("response"))
            .filter(|v| !v.is_null())
    }
}

/// Dot paths (`a.b[0].c`, comma separated) into request/response documents.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct FieldMap {
    /// Where the user question sits in the request body.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input: Option<String>,
    /// Which parts of the response count as the answer.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
    /// Retrieved context inside the response, for metric suites.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EvaluatorKind {
    CustomPrompt,
    Ragas,
    Deepeval,
}

impl EvaluatorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EvaluatorKind::CustomPrompt => "custom_prompt",
            EvaluatorKind::Ragas => "ragas",
            EvaluatorKind::Deepeval => "deepeval",
        }
    }
}

pub const DEFAULT_JUDGE_THRESHOLD: f64 = 0.5;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CustomPromptConfig {
    pub prompt: String,
    /// Score needed to pass when the judge does not return an explicit verdict.
    /// Falls back to the configured judge threshold.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub threshold: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct MetricSuiteConfig {
    /// Restrict the suite to these metrics; empty means all.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub metrics: Vec<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub thresholds: BTreeMap<String, f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "strategy", rename_all = "snake_case")]
pub enum EvaluationConfig {
    #[serde(alias = "custom")]
    CustomPrompt(CustomPromptConfig),
    Ragas(MetricSuiteConfig),
    Deepeval(MetricSuiteConfig),
}

impl EvaluationConfig {
    pub fn kind(&self) -> EvaluatorKind {
        match self {
            EvaluationConfig::CustomPrompt(_) => EvaluatorKind::CustomPrompt,
            EvaluationConfig::Ragas(_) => EvaluatorKind::Ragas,
            EvaluationConfig::Deepeval(_) => EvaluatorKind::Deepeval,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct MissionSpec {
    /// Goal handed to the guiding model. Falls back to the first case's `query` value.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub goal: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_turns: Option<u32>,
    /// Extra instructions for the guiding model (persona, constraints).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub guide_prompt: Option<String>,
}

/// A reusable test definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Template {
    pub id: String,
    #[serde(default)]
    pub kind: TemplateKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request: Option<RequestSpec>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub cases: Vec<CaseDef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pre_request: Option<RequestSpec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub post_request: Option<RequestSpec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub evaluation: Option<EvaluationConfig>,
    #[serde(default)]
    pub fields: FieldMap,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mission: Option<MissionSpec>,
}

impl Template {
    pub fn validate(&self) -> Result<(), EngineError> {
        if self.id.trim().is_empty() {
            return Err(EngineError::InvalidState(
                "template id must not be empty".into(),
            ));
        }
        match self.kind {
            TemplateKind::Run => {
                if self.cases.is_empty() {
                    return Err(EngineError::InvalidState(format!(
                        "template '{}' has no test cases",
                        self.id
                    )));
                }
                for (idx, case) in self.cases.iter().enumerate() {
                    if case.request.is_none() && self.request.is_none() {
                        return Err(EngineError::InvalidState(format!(
                            "template '{}' case {} has no request and no default request is set",
                            self.id,
                            idx + 1
                        )));
                    }
                }
            }
            TemplateKind::Mission => {
                if self.request.is_none() {
                    return Err(EngineError::InvalidState(format!(
                        "mission template '{}' needs a request",
                        self.id
                    )));
                }
                // One conversation per run: a single goal, golden and assessment.
                if self.cases.len() > 1 {
                    return Err(EngineError::InvalidState(format!(
                        "mission template '{}' has {} cases; a mission takes at most one",
                        self.id,
                        self.cases.len()
                    )));
                }
            }
        }
        Ok(())
    }

    pub fn case_request<'a>(&'a self, case: &'a CaseDef) -> Option<&'a RequestSpec> {
        case.request.as_ref().or(self.request.as_ref())
    }

    /// Goal stated by the template, if any.
    pub fn mission_goal(&self) -> Option<String> {
        self.mission
            .as_ref()
            .and_then(|m| m.goal.clone())
            .or_else(|| {
                self.cases
                    .first()
                    .and_then(|c| c.values.get("query"))
                    .map(crate::json_path::value_to_text)
            })
            .filter(|g| !g.trim().is_empty())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunStatus {
    Queued,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Queued => "Queued",
            RunStatus::Running => "Running",
            RunStatus::Completed => "Completed",
            RunStatus::Failed => "Failed",
            RunStatus::Cancelled => "Cancelled",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "Queued" => Some(RunStatus::Queued),
            "Running" => Some(RunStatus::Running),
            "Completed" => Some(RunStatus::Completed),
            "Failed" => Some(RunStatus::Failed),
            "Cancelled" => Some(RunStatus::Cancelled),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            RunStatus::Completed | RunStatus::Failed | RunStatus::Cancelled
        )
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Completed results over planned total. Missions have no total until they end.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Progress {
    pub completed: u32,
    pub total: Option<u32>,
}

impl Progress {
    pub fn fraction(&self) -> Option<f64> {
        match self.total {
            Some(0) => Some(1.0),
            Some(t) => Some(f64::from(self.completed.min(t)) / f64::from(t)),
            None => None,
        }
    }
}

impl fmt::Display for Progress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.total {
            Some(t) => write!(f, "{}/{}", self.completed, t),
            None => write!(f, "{}/?", self.completed),
        }
    }
}

/// Mission parameters fixed at submission.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MissionSettings {
    pub goal: String,
    pub max_turns: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub guide_prompt: Option<String>,
}

/// One execution of a template.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Run {
    pub id: String,
    pub template_id: String,
    pub kind: TemplateKind,
    pub status: RunStatus,
    pub progress: Progress,
    pub submitted_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
    pub test_data: Values,
    pub pre_request: Option<RequestSpec>,
    pub post_request: Option<RequestSpec>,
    /// Template as it was when the run was submitted.
    pub template: Template,
    pub mission: Option<MissionSettings>,
    pub error: Option<ErrorRecord>,
    pub post_request_error: Option<ErrorRecord>,
    pub termination: Option<TerminationReason>,
    pub mission_assessment: Option<EvaluationOutcome>,
    pub cancel_requested: bool,
}

impl Run {
    /// Planned number of results: case count for runs, unknown for missions.
    pub fn planned_total(&self) -> Option<u32> {
        match self.kind {
            TemplateKind::Run => Some(self.template.cases.len() as u32),
            TemplateKind::Mission => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CaseStatus {
    Passed,
    Failed,
    Inconclusive,
    Unscored,
}

impl CaseStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CaseStatus::Passed => "Passed",
            CaseStatus::Failed => "Failed",
            CaseStatus::Inconclusive => "Inconclusive",
            CaseStatus::Unscored => "Unscored",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    Pass,
    Fail,
    Inconclusive,
    Unscored,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct MetricScore {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub threshold: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub passed: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// What an evaluator concluded about one reply.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationOutcome {
    pub evaluator: String,
    pub verdict: Verdict,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<f64>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metrics: BTreeMap<String, MetricScore>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub explanation: Option<String>,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub details: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorRecord>,
}

impl EvaluationOutcome {
    pub fn new(evaluator: impl Into<String>, verdict: Verdict) -> Self {
        Self {
            evaluator: evaluator.into(),
            verdict,
            score: None,
            metrics: BTreeMap::new(),
            explanation: None,
            details: Value::Null,
            error: None,
        }
    }

    /// Outcome for an evaluator that could not reach a conclusion.
    pub fn inconclusive(evaluator: impl Into<String>, error: ErrorRecord) -> Self {
        let mut out = Self::new(evaluator, Verdict::Inconclusive);
        out.error = Some(error);
        out
    }

    pub fn with_score(mut self, score: Option<f64>) -> Self {
        self.score = score;
        self
    }

    pub fn with_explanation(mut self, explanation: impl Into<String>) -> Self {
        self.explanation = Some(explanation.into());
        self
    }
}

/// One exchange of a mission conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TurnRecord {
    /// Payload chosen by the guiding model.
    pub input: Value,
    /// Target reply, filtered by the template's output fields.
    pub reply: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct Annotation {
    #[serde(default)]
    pub flagged: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rating: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
}

/// Outcome of one case (or one mission turn) within a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestCaseResult {
    pub case_id: String,
    pub ordinal: u32,
    pub status: CaseStatus,
    pub tracing_id: String,
    pub request: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub golden: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub evaluation: Option<EvaluationOutcome>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorRecord>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latency_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub turn: Option<TurnRecord>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub annotation: Option<Annotation>,
    pub recorded_at: DateTime<Utc>,
}

pub fn case_id(ordinal: u32) -> String {
    format!("case_{ordinal}")
}

pub fn turn_id(ordinal: u32) -> String {
    format!("turn_{ordinal}")
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LlmResponse {
    pub text: String,
    pub provider: String,
    pub model: String,
    #[serde(default)]
    pub cached: bool,
    #[serde(default)]
    pub meta: Value,
}
