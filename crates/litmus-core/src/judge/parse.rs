use crate::errors::{EngineError, Result};
use serde_json::Value;

/// A structured judge verdict.
#[derive(Debug, Clone, PartialEq)]
pub struct JudgeVerdict {
    pub passed: bool,
    pub score: Option<f64>,
    pub explanation: Option<String>,
    pub raw: Value,
}

const MAX_JSON_CANDIDATES: usize = 8;

/// First JSON object found in a model reply. Tolerates prose and code fences around it.
pub fn extract_json(text: &str) -> Option<Value> {
    let text = text.trim();
    let mut from = 0;
    for _ in 0..MAX_JSON_CANDIDATES {
        let start = from + text[from..].find('{')?;
        let segment = &text[start..];
        if let Some(Ok(val)) = serde_json::Deserializer::from_str(segment)
            .into_iter::<Value>()
            .next()
        {
            if val.is_object() {
                return Some(val);
            }
        }
        from = start + 1;
    }
    None
}

pub(crate) fn number(v: &Value) -> Option<f64> {
    match v {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn verdict_word(v: &Value) -> Option<bool> {
    match v {
        Value::Bool(b) => Some(*b),
        Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
            "pass" | "passed" | "yes" | "true" | "correct" => Some(true),
            "fail" | "failed" | "no" | "false" | "incorrect" => Some(false),
            _ => None,
        },
        _ => None,
    }
}

fn first<'a>(v: &'a Value, keys: &[&str]) -> Option<&'a Value> {
    keys.iter().find_map(|k| v.get(*k)).filter(|x| !x.is_null())
}

/// Reads `passed`/`verdict` and `similarity`/`score`. Without an explicit verdict the
/// reply passes when the score is strictly above `threshold`.
pub fn parse_verdict(raw: Value, threshold: f64) -> Result<JudgeVerdict> {
    if !raw.is_object() {
        return Err(EngineError::JudgeParse("judge reply is not a JSON object".into()));
    }
    let score = match first(&raw, &["similarity", "score"]) {
        Some(v) => {
            let s = number(v).ok_or_else(|| {
                EngineError::JudgeParse(format!("score is not numeric: {v}"))
            })?;
            if !(0.0..=1.0).contains(&s) {
                return Err(EngineError::JudgeParse(format!(
                    "score {s} outside [0, 1]"
                )));
            }
            Some(s)
        }
        None => None,
    };
    let explicit = match first(&raw, &["passed", "verdict"]) {
        Some(v) => Some(verdict_word(v).ok_or_else(|| {
            EngineError::JudgeParse(format!("unrecognised verdict: {v}"))
        })?),
        None => None,
    };
    let passed = match (explicit, score) {
        (Some(p), _) => p,
        (None, Some(s)) => s > threshold,
        (None, None) => {
            return Err(EngineError::JudgeParse(
                "reply has neither a verdict nor a score".into(),
            ))
        }
    };
    let explanation = first(
        &raw,
        &["rationale", "explanation", "similarity_explanation", "reason"],
    )
    .map(crate::json_path::value_to_text);

    Ok(JudgeVerdict {
        passed,
        score,
        explanation,
        raw,
    })
}
