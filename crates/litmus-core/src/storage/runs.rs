use super::leases::is_live;
use super::store::{json_col, opt_json_col, to_json, to_opt_json, ts_col, Store};
use super::{now_ts, ts};
use crate::errors::{EngineError, ErrorRecord, Result};
use crate::mission::TerminationReason;
use crate::model::{EvaluationOutcome, Progress, Run, RunStatus, TemplateKind};
use chrono::{DateTime, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row, TransactionBehavior};
use std::time::Duration;

const RUN_COLUMNS: &str = "id, template_id, kind, status, completed, total, submitted_at,
    started_at, ended_at, test_data_json, pre_request_json, post_request_json, template_json,
    mission_json, error_json, post_error_json, termination_json, assessment_json, cancel_requested";

fn bad_text(idx: usize, what: &str, value: &str) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(
        idx,
        Type::Text,
        format!("unknown {what} '{value}'").into(),
    )
}

fn row_to_run(row: &Row<'_>) -> rusqlite::Result<Run> {
    let kind: String = row.get(2)?;
    let status: String = row.get(3)?;
    let completed: u32 = row.get(4)?;
    let total: Option<u32> = row.get(5)?;
    let submitted_at = ts_col(row, 6)?.unwrap_or_else(Utc::now);
    Ok(Run {
        id: row.get(0)?,
        template_id: row.get(1)?,
        kind: TemplateKind::parse(&kind).ok_or_else(|| bad_text(2, "kind", &kind))?,
        status: RunStatus::parse(&status).ok_or_else(|| bad_text(3, "status", &status))?,
        progress: Progress { completed, total },
        submitted_at,
        started_at: ts_col(row, 7)?,
        ended_at: ts_col(row, 8)?,
        test_data: json_col(row, 9)?,
        pre_request: opt_json_col(row, 10)?,
        post_request: opt_json_col(row, 11)?,
        template: json_col(row, 12)?,
        mission: opt_json_col(row, 13)?,
        error: opt_json_col(row, 14)?,
        post_request_error: opt_json_col(row, 15)?,
        termination: opt_json_col(row, 16)?,
        mission_assessment: opt_json_col(row, 17)?,
        cancel_requested: row.get::<_, i64>(18)? != 0,
    })
}

pub(crate) fn status_of(conn: &Connection, run_id: &str) -> Result<RunStatus> {
    let status: Option<String> = conn
        .query_row(
            "SELECT status FROM runs WHERE id = ?1",
            params![run_id],
            |row| row.get(0),
        )
        .optional()?;
    let status = status.ok_or_else(|| EngineError::not_found("run", run_id))?;
    RunStatus::parse(&status)
        .ok_or_else(|| EngineError::Store(format!("run {run_id} has unknown status '{status}'")))
}

impl Store {
    pub fn insert_run(&self, run: &Run) -> Result<()> {
        let conn = self.conn()?;
        let exists: Option<String> = conn
            .query_row("SELECT id FROM runs WHERE id = ?1", params![run.id], |row| {
                row.get(0)
            })
            .optional()?;
        if exists.is_some() {
            return Err(EngineError::Conflict(format!("run '{}' already exists", run.id)));
        }
        conn.execute(
            &format!(
                "INSERT INTO runs ({RUN_COLUMNS}) VALUES
                 (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18, ?19)"
            ),
            params![
                run.id,
                run.template_id,
                run.kind.as_str(),
                run.status.as_str(),
                run.progress.completed,
                run.progress.total,
                ts(&run.submitted_at),
                run.started_at.as_ref().map(ts),
                run.ended_at.as_ref().map(ts),
                to_json(&run.test_data)?,
                to_opt_json(run.pre_request.as_ref())?,
                to_opt_json(run.post_request.as_ref())?,
                to_json(&run.template)?,
                to_opt_json(run.mission.as_ref())?,
                to_opt_json(run.error.as_ref())?,
                to_opt_json(run.post_request_error.as_ref())?,
                to_opt_json(run.termination.as_ref())?,
                to_opt_json(run.mission_assessment.as_ref())?,
                i64::from(run.cancel_requested),
            ],
        )?;
        Ok(())
    }

    pub fn get_run(&self, run_id: &str) -> Result<Run> {
        let conn = self.conn()?;
        conn.query_row(
            &format!("SELECT {RUN_COLUMNS} FROM runs WHERE id = ?1"),
            params![run_id],
            row_to_run,
        )
        .optional()?
        .ok_or_else(|| EngineError::not_found("run", run_id))
    }

    /// Runs sorted by start time, newest first. Runs that never started sort by submission.
    pub fn list_runs(&self, kind: Option<TemplateKind>) -> Result<Vec<Run>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {RUN_COLUMNS} FROM runs
             WHERE (?1 IS NULL OR kind = ?1)
             ORDER BY COALESCE(started_at, submitted_at) DESC, id"
        ))?;
        let rows = stmt.query_map(params![kind.map(|k| k.as_str())], row_to_run)?;
        let mut out = Vec::new();
        for r in rows {
            out.push(r?);
        }
        Ok(out)
    }

    /// Runs of one template sorted by start time, oldest first.
    pub fn runs_for_template(&self, template_id: &str) -> Result<Vec<Run>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {RUN_COLUMNS} FROM runs WHERE template_id = ?1
             ORDER BY COALESCE(started_at, submitted_at) ASC, id"
        ))?;
        let rows = stmt.query_map(params![template_id], row_to_run)?;
        let mut out = Vec::new();
        for r in rows {
            out.push(r?);
        }
        Ok(out)
    }

    /// Queued -> Running. Fails when the run left Queued in the meantime (e.g. cancelled).
    pub fn mark_running(&self, run_id: &str) -> Result<DateTime<Utc>> {
        let conn = self.conn()?;
        let now = Utc::now();
        let n = conn.execute(
            "UPDATE runs SET status = 'Running', started_at = ?2 WHERE id = ?1 AND status = 'Queued'",
            params![run_id, ts(&now)],
        )?;
        if n == 0 {
            let status = status_of(&conn, run_id)?;
            return Err(EngineError::InvalidState(format!(
                "run {run_id} cannot start from {status}"
            )));
        }
        Ok(now)
    }

    /// Running -> terminal. Exactly one caller can win this transition.
    pub fn finish_run(
        &self,
        run_id: &str,
        status: RunStatus,
        error: Option<&ErrorRecord>,
    ) -> Result<()> {
        if !status.is_terminal() {
            return Err(EngineError::InvalidState(format!(
                "{status} is not a terminal status"
            )));
        }
        let conn = self.conn()?;
        let n = conn.execute(
            "UPDATE runs SET status = ?2, ended_at = ?3, error_json = COALESCE(?4, error_json)
             WHERE id = ?1 AND status = 'Running'",
            params![run_id, status.as_str(), now_ts(), to_opt_json(error)?],
        )?;
        if n == 0 {
            let current = status_of(&conn, run_id)?;
            return Err(EngineError::InvalidState(format!(
                "run {run_id} is {current}, cannot move to {status}"
            )));
        }
        Ok(())
    }

    pub fn set_post_request_error(&self, run_id: &str, error: &ErrorRecord) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            "UPDATE runs SET post_error_json = ?2 WHERE id = ?1",
            params![run_id, to_json(error)?],
        )?;
        Ok(())
    }

    /// Records how a mission ended and fixes its total to the turns executed.
    pub fn set_mission_outcome(
        &self,
        run_id: &str,
        termination: &TerminationReason,
        assessment: Option<&EvaluationOutcome>,
    ) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            "UPDATE runs SET termination_json = ?2, assessment_json = ?3, total = completed
             WHERE id = ?1",
            params![run_id, to_json(termination)?, to_opt_json(assessment)?],
        )?;
        Ok(())
    }

    /// Queued runs are cancelled on the spot; running ones get the flag the worker polls.
    pub fn request_cancel(&self, run_id: &str) -> Result<RunStatus> {
        let mut conn = self.conn()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let status = status_of(&tx, run_id)?;
        let next = match status {
            RunStatus::Queued => {
                tx.execute(
                    "UPDATE runs SET status = 'Cancelled', ended_at = ?2 WHERE id = ?1",
                    params![run_id, now_ts()],
                )?;
                RunStatus::Cancelled
            }
            RunStatus::Running => {
                tx.execute(
                    "UPDATE runs SET cancel_requested = 1 WHERE id = ?1",
                    params![run_id],
                )?;
                RunStatus::Running
            }
            terminal => {
                return Err(EngineError::InvalidState(format!(
                    "run {run_id} is already {terminal}"
                )))
            }
        };
        tx.commit()?;
        Ok(next)
    }

    pub fn is_cancel_requested(&self, run_id: &str) -> Result<bool> {
        let conn = self.conn()?;
        let flag: Option<i64> = conn
            .query_row(
                "SELECT cancel_requested FROM runs WHERE id = ?1",
                params![run_id],
                |row| row.get(0),
            )
            .optional()?;
        match flag {
            Some(f) => Ok(f != 0),
            None => Err(EngineError::not_found("run", run_id)),
        }
    }

    /// Puts a run back to Queued with no results. Refused while a worker holds a live lease.
    pub fn reset_run(&self, run_id: &str, total: Option<u32>, ttl: Duration) -> Result<()> {
        let mut conn = self.conn()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        status_of(&tx, run_id)?;
        if is_live(&tx, run_id, ttl)? {
            return Err(EngineError::RunLocked(run_id.to_string()));
        }
        tx.execute("DELETE FROM results WHERE run_id = ?1", params![run_id])?;
        tx.execute(
            "UPDATE runs SET status = 'Queued', completed = 0, total = ?2, started_at = NULL,
                 ended_at = NULL, error_json = NULL, post_error_json = NULL,
                 termination_json = NULL, assessment_json = NULL, cancel_requested = 0
             WHERE id = ?1",
            params![run_id, total],
        )?;
        tx.commit()?;
        Ok(())
    }

    pub fn delete_run(&self, run_id: &str, ttl: Duration) -> Result<()> {
        let mut conn = self.conn()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        status_of(&tx, run_id)?;
        if is_live(&tx, run_id, ttl)? {
            return Err(EngineError::RunLocked(run_id.to_string()));
        }
        tx.execute("DELETE FROM results WHERE run_id = ?1", params![run_id])?;
        tx.execute("DELETE FROM run_leases WHERE run_id = ?1", params![run_id])?;
        tx.execute("DELETE FROM runs WHERE id = ?1", params![run_id])?;
        tx.commit()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Template;
    use serde_json::{json, Map};

    fn queued_run(id: &str) -> Run {
        let template: Template = serde_json::from_value(json!({
            "id": "t1",
            "request": {"url": "http://svc"},
            "cases": [{}, {}]
        }))
        .unwrap();
        Run {
            id: id.into(),
            template_id: "t1".into(),
            kind: TemplateKind::Run,
            status: RunStatus::Queued,
            progress: Progress {
                completed: 0,
                total: Some(2),
            },
            submitted_at: Utc::now(),
            started_at: None,
            ended_at: None,
            test_data: Map::new(),
            pre_request: None,
            post_request: None,
            template,
            mission: None,
            error: None,
            post_request_error: None,
            termination: None,
            mission_assessment: None,
            cancel_requested: false,
        }
    }

    fn store() -> Store {
        let s = Store::memory().unwrap();
        s.init_schema().unwrap();
        s
    }

    #[test]
    fn insert_twice_conflicts() {
        let s = store();
        s.insert_run(&queued_run("r1")).unwrap();
        assert!(matches!(
            s.insert_run(&queued_run("r1")),
            Err(EngineError::Conflict(_))
        ));
        let back = s.get_run("r1").unwrap();
        assert_eq!(back.status, RunStatus::Queued);
        assert_eq!(back.progress.total, Some(2));
    }

    #[test]
    fn terminal_transition_happens_once() {
        let s = store();
        s.insert_run(&queued_run("r1")).unwrap();
        s.mark_running("r1").unwrap();
        s.finish_run("r1", RunStatus::Completed, None).unwrap();
        let err = s.finish_run("r1", RunStatus::Failed, None).unwrap_err();
        assert!(matches!(err, EngineError::InvalidState(_)));
        let run = s.get_run("r1").unwrap();
        assert_eq!(run.status, RunStatus::Completed);
        assert!(run.started_at.is_some() && run.ended_at.is_some());
    }

    #[test]
    fn cancel_queued_is_immediate_and_blocks_start() {
        let s = store();
        s.insert_run(&queued_run("r1")).unwrap();
        assert_eq!(s.request_cancel("r1").unwrap(), RunStatus::Cancelled);
        assert!(matches!(
            s.mark_running("r1"),
            Err(EngineError::InvalidState(_))
        ));
        assert!(s.request_cancel("r1").is_err());
    }

    #[test]
    fn cancel_running_sets_flag() {
        let s = store();
        s.insert_run(&queued_run("r1")).unwrap();
        s.mark_running("r1").unwrap();
        assert_eq!(s.request_cancel("r1").unwrap(), RunStatus::Running);
        assert!(s.is_cancel_requested("r1").unwrap());
    }

    #[test]
    fn reset_and_delete_respect_live_lease() {
        let s = store();
        let ttl = Duration::from_secs(60);
        s.insert_run(&queued_run("r1")).unwrap();
        let lease = s.acquire_lease("r1", ttl).unwrap();
        assert!(matches!(
            s.reset_run("r1", Some(2), ttl),
            Err(EngineError::RunLocked(_))
        ));
        assert!(matches!(
            s.delete_run("r1", ttl),
            Err(EngineError::RunLocked(_))
        ));
        s.release_lease(&lease).unwrap();
        s.delete_run("r1", ttl).unwrap();
        assert!(matches!(
            s.get_run("r1"),
            Err(EngineError::NotFound { .. })
        ));
    }

    #[test]
    fn reset_clears_outcome_and_progress() {
        let s = store();
        let ttl = Duration::from_secs(60);
        s.insert_run(&queued_run("r1")).unwrap();
        s.mark_running("r1").unwrap();
        let rec = ErrorRecord::new(crate::errors::ErrorKind::Store, "disk full");
        s.finish_run("r1", RunStatus::Failed, Some(&rec)).unwrap();
        s.reset_run("r1", Some(2), ttl).unwrap();
        let run = s.get_run("r1").unwrap();
        assert_eq!(run.status, RunStatus::Queued);
        assert!(run.error.is_none() && run.ended_at.is_none() && run.started_at.is_none());
        assert_eq!(run.progress.completed, 0);
        assert_eq!(run.progress.total, Some(2));
    }

    #[test]
    fn list_filters_by_kind() {
        let s = store();
        s.insert_run(&queued_run("a")).unwrap();
        let mut m = queued_run("b");
        m.kind = TemplateKind::Mission;
        m.progress.total = None;
        s.insert_run(&m).unwrap();
        assert_eq!(s.list_runs(None).unwrap().len(), 2);
        let missions = s.list_runs(Some(TemplateKind::Mission)).unwrap();
        assert_eq!(missions.len(), 1);
        assert_eq!(missions[0].progress.total, None);
    }
}
