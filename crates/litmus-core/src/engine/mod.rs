//! The public face of the core: submit, drive and inspect test runs.

mod dispatch;
mod runner;
mod worker;

use crate::aggregate::{
    cross_run_groups, project_result, CrossRunGroup, ProjectedResult, ResultFilters,
};
use crate::errors::{EngineError, ErrorRecord, Result};
use crate::evaluator::EvaluatorSet;
use crate::mission::{effective_max_turns, MissionDriver, TerminationReason, DEFAULT_MAX_TURNS};
use crate::model::{
    Annotation, EvaluationOutcome, MissionSettings, Progress, RequestSpec, Run, RunStatus,
    TemplateKind, Values,
};
use crate::providers::http::Transport;
use crate::report::{ProgressSink, RunSummary};
use crate::resolve::FileStore;
use crate::storage::Store;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

#[derive(Debug, Clone, PartialEq)]
pub struct EngineSettings {
    /// Bound on every call to the target, pre/post requests included.
    pub request_timeout: Duration,
    pub evaluation_timeout: Duration,
    pub default_max_turns: u32,
    pub lease_ttl: Duration,
    pub max_concurrent_runs: usize,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(30),
            evaluation_timeout: Duration::from_secs(120),
            default_max_turns: DEFAULT_MAX_TURNS,
            lease_ttl: Duration::from_secs(60),
            max_concurrent_runs: 4,
        }
    }
}

/// Per-submission mission settings; each one wins over the template's.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MissionOverrides {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub goal: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_turns: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub guide_prompt: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SubmitRequest {
    pub run_id: String,
    pub template_id: String,
    #[serde(default)]
    pub test_data: Values,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pre_request: Option<RequestSpec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub post_request: Option<RequestSpec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mission: Option<MissionOverrides>,
}

impl SubmitRequest {
    /// Submission that relies entirely on the template's defaults.
    pub fn simple(run_id: impl Into<String>, template_id: impl Into<String>) -> Self {
        Self {
            run_id: run_id.into(),
            template_id: template_id.into(),
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusReport {
    pub run_id: String,
    pub template_id: String,
    pub kind: TemplateKind,
    pub status: RunStatus,
    pub progress: Progress,
    /// Share of planned cases done; absent while a mission is still going.
    pub fraction: Option<f64>,
    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
    pub summary: RunSummary,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorRecord>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub post_request_error: Option<ErrorRecord>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub termination: Option<TerminationReason>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mission_assessment: Option<EvaluationOutcome>,
    pub cancel_requested: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunListing {
    pub run_id: String,
    pub template_id: String,
    pub kind: TemplateKind,
    pub status: RunStatus,
    pub progress: Progress,
    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
}

impl From<&Run> for RunListing {
    fn from(run: &Run) -> Self {
        Self {
            run_id: run.id.clone(),
            template_id: run.template_id.clone(),
            kind: run.kind,
            status: run.status,
            progress: run.progress,
            started_at: run.started_at,
            ended_at: run.ended_at,
        }
    }
}

#[derive(Clone)]
pub struct Engine {
    pub(crate) store: Store,
    pub(crate) transport: Arc<dyn Transport>,
    pub(crate) evaluators: Arc<EvaluatorSet>,
    pub(crate) mission: Option<Arc<MissionDriver>>,
    pub(crate) files: Arc<dyn FileStore>,
    pub(crate) settings: EngineSettings,
    pub(crate) progress: Option<ProgressSink>,
}

impl Engine {
    /// Engine with no evaluators and no mission guide. Files resolve from the store.
    pub fn new(store: Store, transport: Arc<dyn Transport>) -> Self {
        let settings = EngineSettings::default();
        Self {
            files: Arc::new(store.clone()),
            store,
            transport,
            evaluators: Arc::new(EvaluatorSet::new(settings.evaluation_timeout)),
            mission: None,
            settings,
            progress: None,
        }
    }

    pub fn with_settings(mut self, settings: EngineSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn with_evaluators(mut self, evaluators: EvaluatorSet) -> Self {
        self.evaluators = Arc::new(evaluators);
        self
    }

    pub fn with_mission_driver(mut self, driver: MissionDriver) -> Self {
        self.mission = Some(Arc::new(driver));
        self
    }

    pub fn with_files(mut self, files: Arc<dyn FileStore>) -> Self {
        self.files = files;
        self
    }

    pub fn with_progress(mut self, sink: ProgressSink) -> Self {
        self.progress = Some(sink);
        self
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    /// Validates the submission against the template and queues the run.
    /// The template is snapshotted into the run, so later edits do not affect it.
    pub fn submit(&self, req: SubmitRequest) -> Result<Run> {
        if req.run_id.trim().is_empty() {
            return Err(EngineError::InvalidState("run id must not be empty".into()));
        }
        let template = self.store.get_template(&req.template_id)?;
        template.validate()?;

        let mission = match template.kind {
            TemplateKind::Mission => {
                let overrides = req.mission.clone().unwrap_or_default();
                let spec = template.mission.clone().unwrap_or_default();
                let goal = overrides
                    .goal
                    .filter(|g| !g.trim().is_empty())
                    .or_else(|| template.mission_goal())
                    .ok_or_else(|| {
                        EngineError::InvalidState(format!(
                            "mission template '{}' has no goal; pass one at submission",
                            template.id
                        ))
                    })?;
                Some(MissionSettings {
                    goal,
                    max_turns: effective_max_turns(
                        overrides.max_turns,
                        spec.max_turns,
                        self.settings.default_max_turns,
                    ),
                    guide_prompt: overrides.guide_prompt.or(spec.guide_prompt),
                })
            }
            TemplateKind::Run => {
                if req.mission.is_some() {
                    return Err(EngineError::InvalidState(format!(
                        "template '{}' is not a mission template",
                        template.id
                    )));
                }
                None
            }
        };

        let mut run = Run {
            id: req.run_id,
            template_id: template.id.clone(),
            kind: template.kind,
            status: RunStatus::Queued,
            progress: Progress::default(),
            submitted_at: Utc::now(),
            started_at: None,
            ended_at: None,
            test_data: req.test_data,
            pre_request: req.pre_request.or_else(|| template.pre_request.clone()),
            post_request: req.post_request.or_else(|| template.post_request.clone()),
            template,
            mission,
            error: None,
            post_request_error: None,
            termination: None,
            mission_assessment: None,
            cancel_requested: false,
        };
        run.progress.total = run.planned_total();
        self.store.insert_run(&run)?;
        info!(
            run_id = %run.id,
            template_id = %run.template_id,
            kind = run.kind.as_str(),
            total = ?run.progress.total,
            "run submitted"
        );
        Ok(run)
    }

    pub fn status(&self, run_id: &str) -> Result<StatusReport> {
        let run = self.store.get_run(run_id)?;
        let results = self.store.list_results(run_id)?;
        Ok(StatusReport {
            fraction: run.progress.fraction(),
            summary: RunSummary::from_results(&results),
            run_id: run.id,
            template_id: run.template_id,
            kind: run.kind,
            status: run.status,
            progress: run.progress,
            started_at: run.started_at,
            ended_at: run.ended_at,
            error: run.error,
            post_request_error: run.post_request_error,
            termination: run.termination,
            mission_assessment: run.mission_assessment,
            cancel_requested: run.cancel_requested,
        })
    }

    pub fn run(&self, run_id: &str) -> Result<Run> {
        self.store.get_run(run_id)
    }

    pub fn results(&self, run_id: &str, filters: &ResultFilters) -> Result<Vec<ProjectedResult>> {
        self.store.get_run(run_id)?;
        Ok(self
            .store
            .list_results(run_id)?
            .iter()
            .map(|r| project_result(r, filters))
            .collect())
    }

    pub fn cross_run_results(
        &self,
        template_id: &str,
        filters: &ResultFilters,
    ) -> Result<Vec<CrossRunGroup>> {
        let runs = self.store.runs_for_template(template_id)?;
        if runs.is_empty() {
            // Distinguish "no runs yet" from an unknown template.
            self.store.get_template(template_id)?;
        }
        let mut loaded = Vec::with_capacity(runs.len());
        for run in runs {
            let results = self.store.list_results(&run.id)?;
            loaded.push((run, results));
        }
        Ok(cross_run_groups(&loaded, filters))
    }

    pub fn list_runs(&self, kind: Option<TemplateKind>) -> Result<Vec<RunListing>> {
        Ok(self
            .store
            .list_runs(kind)?
            .iter()
            .map(RunListing::from)
            .collect())
    }

    /// Queued runs are cancelled at once; running ones stop at the next case boundary.
    pub fn cancel(&self, run_id: &str) -> Result<RunStatus> {
        let status = self.store.request_cancel(run_id)?;
        info!(run_id, status = %status, "cancellation requested");
        Ok(status)
    }

    pub fn delete(&self, run_id: &str) -> Result<()> {
        self.store.delete_run(run_id, self.settings.lease_ttl)?;
        info!(run_id, "run deleted");
        Ok(())
    }

    /// Discards every result of the run, re-queues it and executes it from scratch.
    /// A run interrupted mid-flight is resumed by [`Engine::execute`] instead.
    pub async fn restart(&self, run_id: &str) -> Result<Run> {
        let run = self.store.get_run(run_id)?;
        self.store
            .reset_run(run_id, run.planned_total(), self.settings.lease_ttl)?;
        info!(run_id, "run restarted");
        self.execute(run_id).await
    }

    pub fn annotate(&self, run_id: &str, case_id: &str, annotation: &Annotation) -> Result<()> {
        if let Some(rating) = annotation.rating {
            if !(1..=5).contains(&rating) {
                return Err(EngineError::InvalidState(format!(
                    "rating must be between 1 and 5, got {rating}"
                )));
            }
        }
        self.store.annotate(run_id, case_id, annotation)
    }
}
