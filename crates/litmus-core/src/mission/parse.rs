use super::{MissionDecision, TerminationReason};
use crate::judge::extract_json;
use crate::json_path::value_to_text;
use serde_json::Value;

fn reason_text(obj: &Value) -> String {
    obj.get("reason")
        .filter(|r| !r.is_null())
        .map(value_to_text)
        .unwrap_or_else(|| "guide ended the mission".to_string())
}

fn payload(obj: &Value) -> Option<Value> {
    obj.get("request").filter(|r| !r.is_null()).cloned()
}

/// Reads a guide reply. Accepted shapes:
/// `{"action":"continue","request":..}`, `{"action":"terminate","reason":..}`,
/// `{"request":..}` and `{"done":true,"reason":..}`, optionally wrapped in prose.
pub fn parse_decision(text: &str) -> MissionDecision {
    let Some(obj) = extract_json(text) else {
        return MissionDecision::Terminate(TerminationReason::ParseError(
            "no JSON object in guide reply".into(),
        ));
    };

    if let Some(action) = obj.get("action") {
        let action = value_to_text(action).trim().to_ascii_lowercase();
        return match action.as_str() {
            "continue" => match payload(&obj) {
                Some(p) => MissionDecision::Continue(p),
                None => MissionDecision::Terminate(TerminationReason::ParseError(
                    "continue without a request".into(),
                )),
            },
            "terminate" | "stop" | "done" => {
                MissionDecision::Terminate(TerminationReason::GuideTerminated(reason_text(&obj)))
            }
            other => MissionDecision::Terminate(TerminationReason::ParseError(format!(
                "unknown action '{other}'"
            ))),
        };
    }

    if obj.get("done").and_then(Value::as_bool) == Some(true) {
        return MissionDecision::Terminate(TerminationReason::GuideTerminated(reason_text(&obj)));
    }
    match payload(&obj) {
        Some(p) => MissionDecision::Continue(p),
        None => MissionDecision::Terminate(TerminationReason::ParseError(
            "reply has neither an action nor a request".into(),
        )),
    }
}
