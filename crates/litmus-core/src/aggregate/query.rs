//! Declarative field-path projection over stored results, applied at read time.

use crate::errors::ErrorRecord;
use crate::json_path::{project, value_to_text};
use crate::model::{Annotation, CaseStatus, EvaluationOutcome, Run, TestCaseResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Group key for results whose request lacks the grouping field.
pub const MISSING_GROUP: &str = "(missing)";

/// Comma separated JSON paths per document. Empty or absent means unfiltered.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResultFilters {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub golden: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectedResult {
    pub case_id: String,
    pub ordinal: u32,
    pub status: CaseStatus,
    pub tracing_id: String,
    pub request: Value,
    pub response: Option<Value>,
    pub golden: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub evaluation: Option<EvaluationOutcome>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorRecord>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub annotation: Option<Annotation>,
}

pub fn project_result(r: &TestCaseResult, filters: &ResultFilters) -> ProjectedResult {
    ProjectedResult {
        case_id: r.case_id.clone(),
        ordinal: r.ordinal,
        status: r.status,
        tracing_id: r.tracing_id.clone(),
        request: project(&r.request, filters.request.as_deref()),
        response: r
            .response
            .as_ref()
            .map(|v| project(v, filters.response.as_deref())),
        golden: r
            .golden
            .as_ref()
            .map(|v| project(v, filters.golden.as_deref())),
        evaluation: r.evaluation.clone(),
        error: r.error.clone(),
        warnings: r.warnings.clone(),
        annotation: r.annotation.clone(),
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CrossRunEntry {
    pub run_id: String,
    pub started_at: Option<DateTime<Utc>>,
    pub case_id: String,
    pub status: CaseStatus,
    pub response: Option<Value>,
    pub golden: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CrossRunGroup {
    /// Projected request text, or `(missing)`.
    pub key: String,
    pub entries: Vec<CrossRunEntry>,
}

/// Text used to group a request. `None` when the filter selects nothing.
fn group_key(request: &Value, filter: Option<&str>) -> Option<String> {
    let projected = project(request, filter);
    match &projected {
        Value::Object(map) if filter.is_some_and(|f| !f.trim().is_empty()) => {
            if map.is_empty() {
                return None;
            }
            if map.len() == 1 {
                return map.values().next().map(value_to_text);
            }
            Some(value_to_text(&projected))
        }
        other => Some(value_to_text(other)),
    }
}

/// Groups every result of `runs` by projected request. Groups are ordered by key, entries by
/// run start time (runs that never started sort last).
pub fn cross_run_groups(
    runs: &[(Run, Vec<TestCaseResult>)],
    filters: &ResultFilters,
) -> Vec<CrossRunGroup> {
    let mut groups: BTreeMap<String, Vec<CrossRunEntry>> = BTreeMap::new();
    for (run, results) in runs {
        for r in results {
            let key = group_key(&r.request, filters.request.as_deref())
                .unwrap_or_else(|| MISSING_GROUP.to_string());
            groups.entry(key).or_default().push(CrossRunEntry {
                run_id: run.id.clone(),
                started_at: run.started_at,
                case_id: r.case_id.clone(),
                status: r.status,
                response: r
                    .response
                    .as_ref()
                    .map(|v| project(v, filters.response.as_deref())),
                golden: r
                    .golden
                    .as_ref()
                    .map(|v| project(v, filters.golden.as_deref())),
            });
        }
    }
    groups
        .into_iter()
        .map(|(key, mut entries)| {
            entries.sort_by(|a, b| match (a.started_at, b.started_at) {
                (Some(x), Some(y)) => x.cmp(&y).then_with(|| a.run_id.cmp(&b.run_id)),
                (Some(_), None) => std::cmp::Ordering::Less,
                (None, Some(_)) => std::cmp::Ordering::Greater,
                (None, None) => a.run_id.cmp(&b.run_id),
            });
            CrossRunGroup { key, entries }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregate::CaseOutcome;
    use chrono::TimeZone;
    use serde_json::json;

    fn run(id: &str, started_min: Option<u32>) -> Run {
        serde_json::from_value(json!({
            "id": id,
            "template_id": "t1",
            "kind": "run",
            "status": "Completed",
            "progress": {"completed": 1, "total": 1},
            "submitted_at": Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap(),
            "started_at": started_min.map(|m| Utc.with_ymd_and_hms(2025, 1, 1, 0, m, 0).unwrap()),
            "ended_at": null,
            "test_data": {},
            "pre_request": null,
            "post_request": null,
            "template": {"id": "t1", "request": {"url": "http://svc"}, "cases": [{}]},
            "mission": null,
            "error": null,
            "post_request_error": null,
            "termination": null,
            "mission_assessment": null,
            "cancel_requested": false
        }))
        .unwrap()
    }

    fn result(request: Value, answer: &str) -> TestCaseResult {
        let mut c = CaseOutcome::new("case_1".into(), 1, "t".into(), request);
        c.response = Some(json!({"answer": answer, "debug": {"tokens": 12}}));
        c.into_result()
    }

    #[test]
    fn projection_by_paths_and_unfiltered() {
        let r = result(json!({"body": {"q": "capital?"}, "url": "http://svc"}), "Paris");
        let f = ResultFilters {
            request: Some("body.q".into()),
            response: Some("answer".into()),
            golden: None,
        };
        let p = project_result(&r, &f);
        assert_eq!(p.request, json!({"body.q": "capital?"}));
        assert_eq!(p.response, Some(json!({"answer": "Paris"})));
        let p = project_result(&r, &ResultFilters::default());
        assert_eq!(p.response, r.response);
    }

    #[test]
    fn groups_by_request_and_orders_by_start() {
        let q = |s: &str| json!({"body": {"q": s}});
        let runs = vec![
            (run("late", Some(30)), vec![result(q("capital?"), "Paris")]),
            (run("early", Some(5)), vec![result(q("capital?"), "paris"), result(json!({"url": "x"}), "?")]),
        ];
        let f = ResultFilters {
            request: Some("body.q".into()),
            response: Some("answer".into()),
            golden: None,
        };
        let groups = cross_run_groups(&runs, &f);
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].key, MISSING_GROUP);
        assert_eq!(groups[1].key, "capital?");
        let order: Vec<_> = groups[1].entries.iter().map(|e| e.run_id.as_str()).collect();
        assert_eq!(order, ["early", "late"]);
        assert_eq!(groups[1].entries[0].response, Some(json!({"answer": "paris"})));
    }
}
