//! Turns per-case outputs into persisted results and answers read-side queries.

pub mod query;

pub use query::{
    cross_run_groups, project_result, CrossRunEntry, CrossRunGroup, ProjectedResult,
    ResultFilters, MISSING_GROUP,
};

use crate::errors::ErrorRecord;
use crate::model::{CaseStatus, EvaluationOutcome, TestCaseResult, TurnRecord, Verdict};
use chrono::Utc;
use serde_json::Value;

/// Errors win over evaluation; a missing evaluation leaves the case Unscored.
pub fn derive_status(
    error: Option<&ErrorRecord>,
    evaluation: Option<&EvaluationOutcome>,
) -> CaseStatus {
    if error.is_some() {
        return CaseStatus::Failed;
    }
    match evaluation.map(|e| e.verdict) {
        Some(Verdict::Pass) => CaseStatus::Passed,
        Some(Verdict::Fail) => CaseStatus::Failed,
        Some(Verdict::Inconclusive) => CaseStatus::Inconclusive,
        Some(Verdict::Unscored) | None => CaseStatus::Unscored,
    }
}

/// Everything the runner learned about one case.
#[derive(Debug, Clone)]
pub struct CaseOutcome {
    pub case_id: String,
    pub ordinal: u32,
    pub tracing_id: String,
    pub request: Value,
    pub response: Option<Value>,
    pub golden: Option<Value>,
    pub evaluation: Option<EvaluationOutcome>,
    pub error: Option<ErrorRecord>,
    pub warnings: Vec<String>,
    pub latency_ms: Option<u64>,
    pub turn: Option<TurnRecord>,
}

impl CaseOutcome {
    pub fn new(case_id: String, ordinal: u32, tracing_id: String, request: Value) -> Self {
        Self {
            case_id,
            ordinal,
            tracing_id,
            request,
            response: None,
            golden: None,
            evaluation: None,
            error: None,
            warnings: Vec::new(),
            latency_ms: None,
            turn: None,
        }
    }

    pub fn into_result(self) -> TestCaseResult {
        let status = derive_status(self.error.as_ref(), self.evaluation.as_ref());
        TestCaseResult {
            case_id: self.case_id,
            ordinal: self.ordinal,
            status,
            tracing_id: self.tracing_id,
            // A persisted result always carries a request.
            request: if self.request.is_null() {
                Value::Object(Default::default())
            } else {
                self.request
            },
            response: self.response,
            golden: self.golden,
            evaluation: self.evaluation,
            error: self.error,
            warnings: self.warnings,
            latency_ms: self.latency_ms,
            turn: self.turn,
            annotation: None,
            recorded_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ErrorKind;
    use serde_json::json;

    #[test]
    fn status_derivation() {
        let err = ErrorRecord::new(ErrorKind::Transport, "HTTP 502: bad gateway");
        let pass = EvaluationOutcome::new("custom_prompt", Verdict::Pass);
        let fail = EvaluationOutcome::new("custom_prompt", Verdict::Fail);
        let inc = EvaluationOutcome::new("ragas", Verdict::Inconclusive);
        assert_eq!(derive_status(Some(&err), Some(&pass)), CaseStatus::Failed);
        assert_eq!(derive_status(None, Some(&pass)), CaseStatus::Passed);
        assert_eq!(derive_status(None, Some(&fail)), CaseStatus::Failed);
        assert_eq!(derive_status(None, Some(&inc)), CaseStatus::Inconclusive);
        assert_eq!(derive_status(None, None), CaseStatus::Unscored);
    }

    #[test]
    fn result_never_has_null_request() {
        let r = CaseOutcome::new("case_1".into(), 1, "t".into(), Value::Null).into_result();
        assert_eq!(r.request, json!({}));
        assert_eq!(r.status, CaseStatus::Unscored);
    }
}
