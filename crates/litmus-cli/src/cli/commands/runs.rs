use super::super::args::{GlobalArgs, RestartArgs, SubmitArgs};
use super::engine_builder::{build_engine, load};
use crate::exit_codes::{RUN_NOT_CLEAN, SUCCESS};
use anyhow::Context;
use litmus_core::engine::{Engine, MissionOverrides, SubmitRequest};
use litmus_core::model::{RequestSpec, Run, RunStatus, Values};
use litmus_core::report::console::render_results;
use litmus_core::report::RunSummary;
use serde::de::DeserializeOwned;

fn parse_json<T: DeserializeOwned>(raw: &str, what: &str) -> anyhow::Result<T> {
    serde_json::from_str(raw).map_err(|e| {
        anyhow::Error::new(litmus_core::errors::ConfigError(format!(
            "--{what} is not valid: {e}"
        )))
    })
}

fn submit_request(args: &SubmitArgs) -> anyhow::Result<SubmitRequest> {
    let run_id = args
        .run_id
        .clone()
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
    let mut req = SubmitRequest::simple(run_id, args.template_id.clone());
    if let Some(raw) = &args.data {
        req.test_data = parse_json::<Values>(raw, "data")?;
    }
    if let Some(raw) = &args.pre_request {
        req.pre_request = Some(parse_json::<RequestSpec>(raw, "pre-request")?);
    }
    if let Some(raw) = &args.post_request {
        req.post_request = Some(parse_json::<RequestSpec>(raw, "post-request")?);
    }
    if args.goal.is_some() || args.max_turns.is_some() || args.guide_prompt.is_some() {
        req.mission = Some(MissionOverrides {
            goal: args.goal.clone(),
            max_turns: args.max_turns,
            guide_prompt: args.guide_prompt.clone(),
        });
    }
    Ok(req)
}

/// Prints the run's results and maps its outcome to an exit code.
fn report(engine: &Engine, run: &Run) -> anyhow::Result<i32> {
    let results = engine.store().list_results(&run.id)?;
    print!("{}", render_results(run, &results));
    let summary = RunSummary::from_results(&results);
    if run.status == RunStatus::Completed && summary.failed == 0 {
        Ok(SUCCESS)
    } else {
        Ok(RUN_NOT_CLEAN)
    }
}

pub(crate) async fn submit(global: &GlobalArgs, args: SubmitArgs) -> anyhow::Result<i32> {
    let engine = build_engine(&load(global)?)?;
    let run = engine.submit(submit_request(&args)?)?;
    if !args.execute {
        println!("{}", run.id);
        return Ok(SUCCESS);
    }
    let run = engine.execute(&run.id).await?;
    report(&engine, &run)
}

pub(crate) async fn execute(global: &GlobalArgs, run_id: &str) -> anyhow::Result<i32> {
    let engine = build_engine(&load(global)?)?;
    let run = engine.execute(run_id).await?;
    report(&engine, &run)
}

pub(crate) async fn restart(global: &GlobalArgs, args: RestartArgs) -> anyhow::Result<i32> {
    let engine = build_engine(&load(global)?)?;
    let run = engine.restart(&args.run_id).await?;
    report(&engine, &run)
}

/// Drains the queue once. Exit code reflects whether every drained run completed.
pub(crate) async fn worker(global: &GlobalArgs) -> anyhow::Result<i32> {
    let engine = build_engine(&load(global)?)?;
    let ids = engine.queued_run_ids()?;
    if ids.is_empty() {
        println!("no queued runs");
        return Ok(SUCCESS);
    }
    let mut code = SUCCESS;
    for (run_id, outcome) in engine.execute_many(&ids).await {
        match outcome {
            Ok(run) => {
                println!("{run_id}: {}", run.status);
                if run.status != RunStatus::Completed {
                    code = RUN_NOT_CLEAN;
                }
            }
            Err(e) => {
                eprintln!("{run_id}: {e}");
                code = RUN_NOT_CLEAN;
            }
        }
    }
    Ok(code)
}

pub(crate) fn cancel(global: &GlobalArgs, run_id: &str) -> anyhow::Result<i32> {
    let engine = build_engine(&load(global)?)?;
    let status = engine.cancel(run_id)?;
    println!("{run_id}: {status}");
    Ok(SUCCESS)
}

pub(crate) fn delete(global: &GlobalArgs, run_id: &str) -> anyhow::Result<i32> {
    let engine = build_engine(&load(global)?)?;
    engine
        .delete(run_id)
        .with_context(|| format!("failed to delete run {run_id}"))?;
    println!("deleted {run_id}");
    Ok(SUCCESS)
}
