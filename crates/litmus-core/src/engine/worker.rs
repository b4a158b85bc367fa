use super::Engine;
use crate::errors::{EngineError, Result};
use crate::model::{Run, RunStatus};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{info, warn};

impl Engine {
    /// Executes runs concurrently, at most `max_concurrent_runs` at a time. Each run is its own
    /// task; cases inside a run stay sequential. Outcomes come back in input order.
    pub async fn execute_many(&self, run_ids: &[String]) -> Vec<(String, Result<Run>)> {
        let sem = Arc::new(Semaphore::new(self.settings.max_concurrent_runs.max(1)));
        let mut join_set = JoinSet::new();
        for (idx, run_id) in run_ids.iter().enumerate() {
            let engine = self.clone();
            let sem = sem.clone();
            let run_id = run_id.clone();
            join_set.spawn(async move {
                let _permit = sem.acquire_owned().await;
                let outcome = engine.execute(&run_id).await;
                (idx, outcome)
            });
        }

        let mut slots: Vec<Option<Result<Run>>> = run_ids.iter().map(|_| None).collect();
        while let Some(joined) = join_set.join_next().await {
            match joined {
                Ok((idx, outcome)) => {
                    if let Some(slot) = slots.get_mut(idx) {
                        *slot = Some(outcome);
                    }
                }
                Err(e) => warn!(error = %e, "run task did not complete"),
            }
        }
        run_ids
            .iter()
            .cloned()
            .zip(slots)
            .map(|(run_id, outcome)| {
                let outcome = outcome.unwrap_or_else(|| {
                    Err(EngineError::InvalidState(format!(
                        "worker task for run {run_id} aborted"
                    )))
                });
                (run_id, outcome)
            })
            .collect()
    }

    /// Ids of queued runs, oldest submission first.
    pub fn queued_run_ids(&self) -> Result<Vec<String>> {
        let mut runs = self.store.list_runs(None)?;
        runs.retain(|r| r.status == RunStatus::Queued);
        runs.sort_by(|a, b| a.submitted_at.cmp(&b.submitted_at).then_with(|| a.id.cmp(&b.id)));
        Ok(runs.into_iter().map(|r| r.id).collect())
    }

    /// Worker mode: executes every queued run once and reports how many reached a terminal status.
    pub async fn drain_queue(&self) -> Result<usize> {
        let ids = self.queued_run_ids()?;
        if ids.is_empty() {
            return Ok(0);
        }
        info!(count = ids.len(), "draining queued runs");
        let outcomes = self.execute_many(&ids).await;
        let mut finished = 0;
        for (run_id, outcome) in outcomes {
            match outcome {
                Ok(run) if run.status.is_terminal() => finished += 1,
                Ok(run) => warn!(run_id, status = %run.status, "run left in a non-terminal status"),
                Err(e) => warn!(run_id, error = %e, "run could not be executed"),
            }
        }
        Ok(finished)
    }
}
