use crate::model::{CaseStatus, Run, TestCaseResult};
use crate::report::progress::{ProgressEvent, ProgressSink};
use crate::report::summary::RunSummary;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

/// Format a single progress line for display.
#[must_use]
pub fn format_progress_line(ev: &ProgressEvent) -> String {
    match ev.total {
        Some(total) => format!("[{}] case {}/{}", ev.run_id, ev.completed, total),
        None => format!("[{}] turn {}", ev.run_id, ev.completed),
    }
}

/// Minimum interval between progress updates to avoid log spam.
const PROGRESS_MIN_INTERVAL_MS: u64 = 200;

struct ThrottleState {
    last_emit: Option<Instant>,
}

/// Progress sink that prints to stderr, throttled. The final case of a run is always shown.
pub fn default_progress_sink() -> ProgressSink {
    let state = Arc::new(Mutex::new(ThrottleState { last_emit: None }));
    Arc::new(move |ev: ProgressEvent| {
        let now = Instant::now();
        let should_emit = {
            let mut g = state.lock().unwrap_or_else(PoisonError::into_inner);
            let is_final = ev.total == Some(ev.completed);
            let interval_ok = g
                .last_emit
                .map(|t| {
                    now.saturating_duration_since(t)
                        >= Duration::from_millis(PROGRESS_MIN_INTERVAL_MS)
                })
                .unwrap_or(true);
            if is_final || interval_ok {
                g.last_emit = Some(now);
                true
            } else {
                false
            }
        };
        if should_emit {
            eprintln!("{}", format_progress_line(&ev));
        }
    })
}

fn icon(status: CaseStatus) -> &'static str {
    match status {
        CaseStatus::Passed => "✅",
        CaseStatus::Failed => "❌",
        CaseStatus::Inconclusive => "❓",
        CaseStatus::Unscored => "➖",
    }
}

/// One line per result plus a totals footer, for terminal use.
pub fn render_results(run: &Run, results: &[TestCaseResult]) -> String {
    let mut out = format!(
        "Run {} ({}) {} {}\n",
        run.id,
        run.template_id,
        run.status,
        run.progress
    );
    for r in results {
        let score = r
            .evaluation
            .as_ref()
            .and_then(|e| e.score)
            .map(|s| format!("{s:.2}"))
            .unwrap_or_else(|| "-".into());
        let latency = r
            .latency_ms
            .map(|ms| format!("({ms}ms)"))
            .unwrap_or_default();
        out.push_str(&format!(
            "{} {:<10} {:<12} {:>5} {}\n",
            icon(r.status),
            r.case_id,
            r.status.as_str(),
            score,
            latency
        ));
        if let Some(err) = &r.error {
            out.push_str(&format!("    error: {err}\n"));
        }
        for w in &r.warnings {
            out.push_str(&format!("    warning: {w}\n"));
        }
    }
    if let Some(err) = &run.error {
        out.push_str(&format!("Run error: {err}\n"));
    }
    if let Some(err) = &run.post_request_error {
        out.push_str(&format!("Post-request error: {err}\n"));
    }
    if let Some(reason) = &run.termination {
        out.push_str(&format!("Mission ended: {reason}\n"));
    }
    let s = RunSummary::from_results(results);
    out.push_str(&format!(
        "Summary: {} passed, {} failed, {} inconclusive, {} unscored\n",
        s.passed, s.failed, s.inconclusive, s.unscored
    ));
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn progress_lines() {
        let ev = ProgressEvent {
            run_id: "r1".into(),
            completed: 2,
            total: Some(5),
        };
        assert_eq!(format_progress_line(&ev), "[r1] case 2/5");
        let ev = ProgressEvent {
            run_id: "m1".into(),
            completed: 3,
            total: None,
        };
        assert_eq!(format_progress_line(&ev), "[m1] turn 3");
    }
}
