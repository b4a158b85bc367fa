use super::super::args::{AllResultsArgs, AnnotateArgs, FilterArgs, GlobalArgs, ListArgs, ResultsArgs};
use super::engine_builder::{build_engine, load};
use super::print_json;
use crate::exit_codes::SUCCESS;
use litmus_core::aggregate::ResultFilters;
use litmus_core::errors::ConfigError;
use litmus_core::model::{Annotation, TemplateKind};
use litmus_core::report::console::render_results;

impl From<FilterArgs> for ResultFilters {
    fn from(f: FilterArgs) -> Self {
        ResultFilters {
            request: f.request,
            response: f.response,
            golden: f.golden,
        }
    }
}

pub(crate) fn status(global: &GlobalArgs, run_id: &str) -> anyhow::Result<i32> {
    let engine = build_engine(&load(global)?)?;
    print_json(&engine.status(run_id)?)?;
    Ok(SUCCESS)
}

pub(crate) fn results(global: &GlobalArgs, args: ResultsArgs) -> anyhow::Result<i32> {
    let engine = build_engine(&load(global)?)?;
    if args.table {
        let run = engine.run(&args.run_id)?;
        let results = engine.store().list_results(&run.id)?;
        print!("{}", render_results(&run, &results));
    } else {
        print_json(&engine.results(&args.run_id, &args.filters.into())?)?;
    }
    Ok(SUCCESS)
}

pub(crate) fn all_results(global: &GlobalArgs, args: AllResultsArgs) -> anyhow::Result<i32> {
    let engine = build_engine(&load(global)?)?;
    print_json(&engine.cross_run_results(&args.template_id, &args.filters.into())?)?;
    Ok(SUCCESS)
}

pub(crate) fn list(global: &GlobalArgs, args: ListArgs) -> anyhow::Result<i32> {
    let kind = match args.kind.as_deref() {
        None => None,
        Some(raw) => Some(TemplateKind::parse(raw).ok_or_else(|| {
            ConfigError(format!("unknown run kind '{raw}' (expected run or mission)"))
        })?),
    };
    let engine = build_engine(&load(global)?)?;
    print_json(&engine.list_runs(kind)?)?;
    Ok(SUCCESS)
}

pub(crate) fn annotate(global: &GlobalArgs, args: AnnotateArgs) -> anyhow::Result<i32> {
    let engine = build_engine(&load(global)?)?;
    let annotation = Annotation {
        flagged: args.flag,
        rating: args.rating,
        comment: args.comment,
    };
    engine.annotate(&args.run_id, &args.case_id, &annotation)?;
    println!("annotated {} {}", args.run_id, args.case_id);
    Ok(SUCCESS)
}
