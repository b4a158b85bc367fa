use super::TerminationReason;
use crate::json_path::value_to_text;
use crate::model::{MissionSettings, TurnRecord};
use serde_json::Value;
use std::fmt::Write;

pub(crate) const GUIDE_SYSTEM: &str = "You play the user of an application in order to reach a \
     goal. Decide the next message to send, or end the conversation when the goal is reached or \
     cannot be reached. Output ONLY JSON: {\"action\": \"continue\", \"request\": <next message>} \
     or {\"action\": \"terminate\", \"reason\": <why>}.";

pub(crate) const ASSESSMENT_SYSTEM: &str = "You assess whether a conversation between a user \
     and an application achieved the user's goal. Output ONLY JSON with { \"overall_success\": \
     \"Successful\" | \"Partially Successful\" | \"Failed\", \"positive_observations\": [string], \
     \"areas_for_improvement\": [string] }.";

fn transcript(history: &[TurnRecord]) -> String {
    if history.is_empty() {
        return "(no messages yet)\n".to_string();
    }
    let mut out = String::new();
    for (i, turn) in history.iter().enumerate() {
        let _ = writeln!(out, "Turn {}", i + 1);
        let _ = writeln!(out, "user: {}", value_to_text(&turn.input));
        let _ = writeln!(out, "assistant: {}", value_to_text(&turn.reply));
    }
    out
}

pub(crate) fn guide_prompt(settings: &MissionSettings, history: &[TurnRecord]) -> String {
    let mut out = format!("### Goal:\n{}\n\n", settings.goal);
    if let Some(extra) = settings.guide_prompt.as_deref().filter(|s| !s.trim().is_empty()) {
        let _ = write!(out, "### Instructions:\n{extra}\n\n");
    }
    let _ = write!(
        out,
        "### Conversation so far:\n{}\n### Turns used: {} of {}\n",
        transcript(history),
        history.len(),
        settings.max_turns
    );
    out
}

pub(crate) fn assessment_prompt(
    settings: &MissionSettings,
    history: &[TurnRecord],
    golden: Option<&Value>,
    termination: &TerminationReason,
) -> String {
    let mut out = format!(
        "### Goal:\n{}\n\n### Conversation:\n{}\n### Ended because: {}\n",
        settings.goal,
        transcript(history),
        termination
    );
    if let Some(g) = golden {
        let _ = write!(out, "\n### Expected outcome:\n{}\n", value_to_text(g));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn guide_prompt_carries_goal_history_and_budget() {
        let settings = MissionSettings {
            goal: "Book a table".into(),
            max_turns: 5,
            guide_prompt: Some("Be polite".into()),
        };
        let history = vec![TurnRecord { input: json!("Hi"), reply: json!("Hello! How can I help?") }];
        let p = guide_prompt(&settings, &history);
        assert!(p.contains("Book a table"));
        assert!(p.contains("Be polite"));
        assert!(p.contains("user: Hi"));
        assert!(p.contains("assistant: Hello! How can I help?"));
        assert!(p.contains("Turns used: 1 of 5"));
    }
}
