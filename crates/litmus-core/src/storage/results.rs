use super::leases::{heartbeat_on, Lease};
use super::runs::status_of;
use super::store::{json_col, opt_json_col, to_json, Store};
use super::ts;
use crate::errors::{EngineError, Result};
use crate::model::{Annotation, Progress, RunStatus, TestCaseResult};
use rusqlite::{params, TransactionBehavior};
use std::collections::HashSet;

impl Store {
    /// Upserts one result and recomputes the run's progress in the same transaction.
    ///
    /// The write is refused unless the caller still holds the run's lease and the run is
    /// Running, so nothing is appended after a terminal status.
    pub fn record_result(
        &self,
        lease: &Lease,
        result: &TestCaseResult,
    ) -> Result<Progress> {
        let run_id = lease.run_id.as_str();
        let mut conn = self.conn()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        heartbeat_on(&tx, lease)?;
        let status = status_of(&tx, run_id)?;
        if status != RunStatus::Running {
            return Err(EngineError::InvalidState(format!(
                "run {run_id} is {status}, results are closed"
            )));
        }
        tx.execute(
            "INSERT INTO results (run_id, case_id, ordinal, status, doc_json, recorded_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT(run_id, case_id) DO UPDATE SET ordinal = excluded.ordinal,
                 status = excluded.status, doc_json = excluded.doc_json,
                 recorded_at = excluded.recorded_at",
            params![
                run_id,
                result.case_id,
                result.ordinal,
                result.status.as_str(),
                to_json(result)?,
                ts(&result.recorded_at),
            ],
        )?;
        tx.execute(
            "UPDATE runs SET completed = MAX(completed, MIN(
                 (SELECT COUNT(*) FROM results WHERE run_id = ?1),
                 COALESCE(total, (SELECT COUNT(*) FROM results WHERE run_id = ?1))))
             WHERE id = ?1",
            params![run_id],
        )?;
        let progress = tx.query_row(
            "SELECT completed, total FROM runs WHERE id = ?1",
            params![run_id],
            |row| {
                Ok(Progress {
                    completed: row.get(0)?,
                    total: row.get(1)?,
                })
            },
        )?;
        tx.commit()?;
        Ok(progress)
    }

    /// Results of a run in ordinal order, annotations merged in.
    pub fn list_results(&self, run_id: &str) -> Result<Vec<TestCaseResult>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT doc_json, annotation_json FROM results WHERE run_id = ?1 ORDER BY ordinal",
        )?;
        let rows = stmt.query_map(params![run_id], |row| {
            let mut result: TestCaseResult = json_col(row, 0)?;
            if let Some(annotation) = opt_json_col::<Annotation>(row, 1)? {
                result.annotation = Some(annotation);
            }
            Ok(result)
        })?;
        let mut out = Vec::new();
        for r in rows {
            out.push(r?);
        }
        Ok(out)
    }

    pub fn completed_ordinals(&self, run_id: &str) -> Result<HashSet<u32>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare("SELECT ordinal FROM results WHERE run_id = ?1")?;
        let rows = stmt.query_map(params![run_id], |row| row.get::<_, u32>(0))?;
        let mut out = HashSet::new();
        for r in rows {
            out.insert(r?);
        }
        Ok(out)
    }

    /// Annotations are only accepted once the run has reached a terminal status.
    pub fn annotate(&self, run_id: &str, case_id: &str, annotation: &Annotation) -> Result<()> {
        let conn = self.conn()?;
        let status = status_of(&conn, run_id)?;
        if !status.is_terminal() {
            return Err(EngineError::InvalidState(format!(
                "run {run_id} is {status}; annotate after it finishes"
            )));
        }
        let n = conn.execute(
            "UPDATE results SET annotation_json = ?3 WHERE run_id = ?1 AND case_id = ?2",
            params![run_id, case_id, to_json(annotation)?],
        )?;
        if n == 0 {
            return Err(EngineError::not_found("result", format!("{run_id}/{case_id}")));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{case_id, CaseStatus, Run, RunStatus};
    use chrono::Utc;
    use serde_json::json;
    use std::time::Duration;

    fn seeded() -> (Store, Lease) {
        let s = Store::memory().unwrap();
        s.init_schema().unwrap();
        let run: Run = serde_json::from_value(json!({
            "id": "r1",
            "template_id": "t1",
            "kind": "run",
            "status": "Queued",
            "progress": {"completed": 0, "total": 2},
            "submitted_at": Utc::now(),
            "started_at": null,
            "ended_at": null,
            "test_data": {},
            "pre_request": null,
            "post_request": null,
            "template": {"id": "t1", "request": {"url": "http://svc"}, "cases": [{}, {}]},
            "mission": null,
            "error": null,
            "post_request_error": null,
            "termination": null,
            "mission_assessment": null,
            "cancel_requested": false
        }))
        .unwrap();
        s.insert_run(&run).unwrap();
        s.mark_running("r1").unwrap();
        let lease = s.acquire_lease("r1", Duration::from_secs(60)).unwrap();
        (s, lease)
    }

    fn result(ordinal: u32) -> TestCaseResult {
        TestCaseResult {
            case_id: case_id(ordinal),
            ordinal,
            status: CaseStatus::Unscored,
            tracing_id: format!("trace-{ordinal}"),
            request: json!({"url": "http://svc"}),
            response: Some(json!({"ok": true})),
            golden: None,
            evaluation: None,
            error: None,
            warnings: vec![],
            latency_ms: Some(3),
            turn: None,
            annotation: None,
            recorded_at: Utc::now(),
        }
    }

    #[test]
    fn upsert_is_idempotent_and_progress_bounded() {
        let (s, lease) = seeded();
        assert_eq!(s.record_result(&lease, &result(1)).unwrap().completed, 1);
        assert_eq!(s.record_result(&lease, &result(1)).unwrap().completed, 1);
        let p = s.record_result(&lease, &result(2)).unwrap();
        assert_eq!(p, Progress { completed: 2, total: Some(2) });
        // A stray third ordinal never pushes progress past the total.
        let p = s.record_result(&lease, &result(3)).unwrap();
        assert_eq!(p.completed, 2);
        assert_eq!(s.completed_ordinals("r1").unwrap().len(), 3);
    }

    #[test]
    fn writes_are_refused_after_terminal_status() {
        let (s, lease) = seeded();
        s.record_result(&lease, &result(1)).unwrap();
        s.finish_run("r1", RunStatus::Completed, None).unwrap();
        assert!(matches!(
            s.record_result(&lease, &result(2)),
            Err(EngineError::InvalidState(_))
        ));
        assert_eq!(s.list_results("r1").unwrap().len(), 1);
    }

    #[test]
    fn writes_need_the_lease() {
        let (s, lease) = seeded();
        s.release_lease(&lease).unwrap();
        assert!(matches!(
            s.record_result(&lease, &result(1)),
            Err(EngineError::RunLocked(_))
        ));
    }

    #[test]
    fn annotate_after_completion() {
        let (s, lease) = seeded();
        s.record_result(&lease, &result(1)).unwrap();
        let note = Annotation {
            flagged: true,
            rating: Some(4),
            comment: Some("slightly verbose".into()),
        };
        assert!(matches!(
            s.annotate("r1", "case_1", &note),
            Err(EngineError::InvalidState(_))
        ));
        s.finish_run("r1", RunStatus::Completed, None).unwrap();
        s.annotate("r1", "case_1", &note).unwrap();
        assert!(s.annotate("r1", "case_9", &note).is_err());
        let back = s.list_results("r1").unwrap();
        assert_eq!(back[0].annotation.as_ref(), Some(&note));
    }
}
