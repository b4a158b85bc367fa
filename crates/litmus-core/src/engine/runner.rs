use super::dispatch::Hook;
use super::Engine;
use crate::aggregate::CaseOutcome;
use crate::errors::{ConfigError, EngineError, ErrorRecord, Result};
use crate::evaluator::EvaluationContext;
use crate::json_path::extract_text;
use crate::mission::{MissionDecision, TerminationReason};
use crate::model::{
    case_id, turn_id, CaseDef, EvaluationOutcome, Progress, RequestSpec, Run, RunStatus,
    TemplateKind, TurnRecord, Values,
};
use crate::report::ProgressEvent;
use crate::resolve::Resolver;
use crate::storage::Lease;
use serde_json::Value;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, info_span, warn, Instrument, Span};
use uuid::Uuid;

const MIN_KEEPALIVE: Duration = Duration::from_millis(50);

/// Aborts the lease keepalive task when dropped.
struct Keepalive(JoinHandle<()>);

impl Drop for Keepalive {
    fn drop(&mut self) {
        self.0.abort();
    }
}

/// How the body of a run ended, when nothing went wrong internally.
enum RunEnd {
    Completed,
    Cancelled,
    PreRequestFailed(ErrorRecord),
}

impl Engine {
    /// Drives a run to a terminal status and returns it.
    ///
    /// Fails with `RunLocked` when another worker holds the run, and with `InvalidState` for
    /// runs that already finished (use [`Engine::restart`] for those). A run picked up in
    /// Running state belonged to a crashed worker and resumes after its persisted results.
    pub async fn execute(&self, run_id: &str) -> Result<Run> {
        let lease = self.store.acquire_lease(run_id, self.settings.lease_ttl)?;
        let span = info_span!("run", run_id = %run_id, holder = %lease.holder);
        let keepalive = self.spawn_keepalive(&lease, span.clone());
        let outcome = self.drive(&lease).instrument(span).await;
        drop(keepalive);
        if let Err(e) = self.store.release_lease(&lease) {
            warn!(run_id, error = %e, "failed to release run lease");
        }
        outcome
    }

    /// Renews the lease on a timer for as long as the returned guard lives, so a single
    /// slow case cannot outlast the TTL.
    fn spawn_keepalive(&self, lease: &Lease, span: Span) -> Keepalive {
        let store = self.store.clone();
        let lease = lease.clone();
        let every = (self.settings.lease_ttl / 3).max(MIN_KEEPALIVE);
        let task = tokio::spawn(
            async move {
                let mut tick = tokio::time::interval(every);
                tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
                // The first tick completes immediately; acquiring just stamped the lease.
                tick.tick().await;
                loop {
                    tick.tick().await;
                    if let Err(e) = store.heartbeat(&lease) {
                        warn!(error = %e, "lease keepalive stopped");
                        break;
                    }
                }
            }
            .instrument(span),
        );
        Keepalive(task)
    }

    async fn drive(&self, lease: &Lease) -> Result<Run> {
        let run_id = lease.run_id.as_str();
        let mut run = self.store.get_run(run_id)?;
        let fresh = match run.status {
            RunStatus::Queued => {
                run.started_at = Some(self.store.mark_running(run_id)?);
                run.status = RunStatus::Running;
                run.progress.completed == 0
            }
            RunStatus::Running => {
                info!(completed = run.progress.completed, "resuming interrupted run");
                false
            }
            terminal => {
                return Err(EngineError::InvalidState(format!(
                    "run {run_id} is already {terminal}; restart it to run again"
                )))
            }
        };
        info!(
            template_id = %run.template_id,
            kind = run.kind.as_str(),
            fresh,
            "run started"
        );

        let (status, error) = match self.run_body(lease, &run, fresh).await {
            Ok(RunEnd::Completed) => (RunStatus::Completed, None),
            Ok(RunEnd::Cancelled) => (RunStatus::Cancelled, None),
            Ok(RunEnd::PreRequestFailed(rec)) => (RunStatus::Failed, Some(rec)),
            Err(e @ EngineError::RunLocked(_)) => {
                // Someone else took the run over; it is theirs to finish.
                return Err(e);
            }
            Err(e) => {
                error!(error = %e, "run aborted");
                (RunStatus::Failed, Some(e.record()))
            }
        };
        self.store.finish_run(run_id, status, error.as_ref())?;
        info!(status = %status, "run finished");
        self.store.get_run(run_id)
    }

    async fn run_body(&self, lease: &Lease, run: &Run, fresh: bool) -> Result<RunEnd> {
        if fresh {
            if let Some(pre) = &run.pre_request {
                if let Err(e) = self.run_hook(Hook::Pre, pre, run).await {
                    warn!(error = %e, "pre-request failed, no cases will run");
                    return Ok(RunEnd::PreRequestFailed(e.record()));
                }
            }
        }

        let cancelled = if run.kind == TemplateKind::Mission {
            self.run_mission(lease, run).await?
        } else {
            self.run_cases(lease, run).await?
        };

        if let Some(post) = &run.post_request {
            if let Err(e) = self.run_hook(Hook::Post, post, run).await {
                warn!(error = %e, "post-request failed");
                self.store.set_post_request_error(&run.id, &e.record())?;
            }
        }
        Ok(if cancelled {
            RunEnd::Cancelled
        } else {
            RunEnd::Completed
        })
    }

    /// Case boundary: confirms the lease is still ours and reports whether cancellation was
    /// requested.
    fn checkpoint(&self, lease: &Lease) -> Result<bool> {
        self.store.heartbeat(lease)?;
        let cancelled = self.store.is_cancel_requested(&lease.run_id)?;
        if cancelled {
            info!("cancellation observed");
        }
        Ok(cancelled)
    }

    fn emit(&self, run_id: &str, progress: Progress) {
        if let Some(sink) = &self.progress {
            sink(ProgressEvent {
                run_id: run_id.to_string(),
                completed: progress.completed,
                total: progress.total,
            });
        }
    }

    /// Static cases in order, skipping those already persisted. Returns true when cancelled.
    async fn run_cases(&self, lease: &Lease, run: &Run) -> Result<bool> {
        let done = self.store.completed_ordinals(&run.id)?;
        for (idx, case) in run.template.cases.iter().enumerate() {
            let ordinal = idx as u32 + 1;
            if done.contains(&ordinal) {
                continue;
            }
            if self.checkpoint(lease)? {
                return Ok(true);
            }
            let result = self.run_case(run, case, ordinal).await.into_result();
            debug!(case_id = %result.case_id, status = result.status.as_str(), "case finished");
            let progress = self.store.record_result(lease, &result)?;
            self.emit(&run.id, progress);
        }
        Ok(false)
    }

    async fn run_case(&self, run: &Run, case: &CaseDef, ordinal: u32) -> CaseOutcome {
        let tracing_id = Uuid::new_v4().to_string();
        let Some(spec) = run.template.case_request(case) else {
            let mut out = CaseOutcome::new(case_id(ordinal), ordinal, tracing_id, Value::Null);
            out.error = Some(
                EngineError::InvalidState(format!("case {ordinal} has no request")).record(),
            );
            return out;
        };
        let mut out = CaseOutcome::new(case_id(ordinal), ordinal, tracing_id, spec.to_value());

        // Case values win over run-level test data.
        let resolved = {
            let resolver = Resolver::new()
                .with_values(&case.values)
                .with_values(&run.test_data)
                .with_files(Some(self.files.as_ref()));
            resolver.resolve_request(spec).and_then(|req| {
                let golden = case
                    .golden_value()
                    .map(|g| resolver.resolve_value(g))
                    .transpose()?;
                Ok((req, golden))
            })
        };
        let (request, golden) = match resolved {
            Ok(pair) => pair,
            Err(e) => {
                warn!(case = ordinal, error = %e, "case could not be resolved");
                out.error = Some(e.record());
                return out;
            }
        };
        out.request = request.value.to_value();
        out.warnings = request.warnings;
        if let Some(g) = golden {
            out.warnings.extend(g.warnings);
            out.golden = Some(g.value);
        }

        match self.send(&request.value, &out.tracing_id).await {
            Ok(exchange) => {
                out.latency_ms = Some(exchange.latency_ms);
                out.response = Some(exchange.body);
            }
            Err(e) => {
                out.error = Some(e.record());
                return out;
            }
        }

        out.evaluation = self.evaluate(run, &out, &case.values).await;
        out
    }

    async fn evaluate(
        &self,
        run: &Run,
        out: &CaseOutcome,
        case_values: &Values,
    ) -> Option<EvaluationOutcome> {
        let response = out.response.as_ref()?;
        let ctx = EvaluationContext {
            request: &out.request,
            response,
            golden: out.golden.as_ref(),
            fields: &run.template.fields,
            case_values,
        };
        self.evaluators
            .dispatch(&ctx, run.template.evaluation.as_ref())
            .await
    }

    /// Guide-driven turns until the mission ends. Returns true when cancelled.
    async fn run_mission(&self, lease: &Lease, run: &Run) -> Result<bool> {
        let driver = self.mission.as_ref().ok_or_else(|| {
            EngineError::Config(ConfigError(
                "mission runs need a guide model but none is configured".into(),
            ))
        })?;
        let settings = run.mission.as_ref().ok_or_else(|| {
            EngineError::InvalidState(format!("run {} has no mission settings", run.id))
        })?;
        let spec = run.template.request.as_ref().ok_or_else(|| {
            EngineError::InvalidState(format!("mission template '{}' has no request", run.template.id))
        })?;
        let golden = run
            .template
            .cases
            .first()
            .and_then(|c| c.golden_value())
            .cloned();

        let prior = self.store.list_results(&run.id)?;
        let mut history: Vec<TurnRecord> = prior.iter().filter_map(|r| r.turn.clone()).collect();
        let mut ordinal = prior.iter().map(|r| r.ordinal).max().unwrap_or(0);
        // A mission whose last turn failed had already ended before the interruption.
        let mut ended = prior.last().and_then(|r| {
            r.error
                .as_ref()
                .map(|e| TerminationReason::TargetFailed(e.message.clone()))
        });

        let mut cancelled = false;
        let termination = loop {
            if let Some(reason) = ended.take() {
                break reason;
            }
            if self.checkpoint(lease)? {
                cancelled = true;
                break TerminationReason::Cancelled;
            }
            let payload = match driver.next(settings, &history).await {
                MissionDecision::Continue(p) => p,
                MissionDecision::Terminate(reason) => break reason,
            };
            ordinal += 1;
            let out = self.run_turn(run, spec, payload, ordinal).await;
            if let Some(e) = &out.error {
                ended = Some(TerminationReason::TargetFailed(e.message.clone()));
            }
            let result = out.into_result();
            if let Some(turn) = &result.turn {
                history.push(turn.clone());
            }
            let progress = self.store.record_result(lease, &result)?;
            self.emit(&run.id, progress);
        };

        info!(reason = %termination, turns = history.len(), "mission ended");
        let assessment = driver
            .assess(settings, &history, golden.as_ref(), &termination)
            .await;
        self.store
            .set_mission_outcome(&run.id, &termination, assessment.as_ref())?;
        Ok(cancelled)
    }

    async fn run_turn(
        &self,
        run: &Run,
        spec: &RequestSpec,
        payload: Value,
        ordinal: u32,
    ) -> CaseOutcome {
        let tracing_id = Uuid::new_v4().to_string();
        let mut out = CaseOutcome::new(turn_id(ordinal), ordinal, tracing_id, spec.to_value());
        out.turn = Some(TurnRecord {
            input: payload.clone(),
            reply: Value::Null,
        });

        let mut turn_values = Values::new();
        turn_values.insert("query".into(), payload);
        let resolved = {
            let resolver = Resolver::new()
                .with_values(&turn_values)
                .with_values(&run.test_data)
                .with_files(Some(self.files.as_ref()));
            resolver.resolve_request(spec)
        };
        let request = match resolved {
            Ok(r) => r,
            Err(e) => {
                out.error = Some(e.record());
                return out;
            }
        };
        out.request = request.value.to_value();
        out.warnings = request.warnings;

        match self.send(&request.value, &out.tracing_id).await {
            Ok(exchange) => {
                let reply = extract_text(&exchange.body, run.template.fields.output.as_deref())
                    .map(Value::String)
                    .unwrap_or(Value::Null);
                out.turn = out.turn.take().map(|t| TurnRecord { reply, ..t });
                out.latency_ms = Some(exchange.latency_ms);
                out.response = Some(exchange.body);
            }
            Err(e) => {
                out.error = Some(e.record());
                return out;
            }
        }
        out.evaluation = self.evaluate(run, &out, &turn_values).await;
        out
    }
}
