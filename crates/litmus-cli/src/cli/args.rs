use crate::logging::LogFormat;
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "litmus",
    version,
    about = "Run test suites and goal-driven missions against HTTP-served LLM applications"
)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalArgs,

    #[command(subcommand)]
    pub cmd: Command,
}

#[derive(Args, Debug, Clone)]
pub struct GlobalArgs {
    /// Config file; a missing file means defaults
    #[arg(long, global = true, env = "LITMUS_CONFIG", default_value = "litmus.yaml")]
    pub config: PathBuf,

    /// Store database, overrides `store.db`
    #[arg(long, global = true, env = "LITMUS_DB")]
    pub db: Option<PathBuf>,

    /// Judge provider, overrides `judge.provider` (openai, fake, none)
    #[arg(long, global = true, env = "LITMUS_JUDGE")]
    pub judge: Option<String>,

    #[arg(long, global = true, value_enum, default_value_t, env = "LITMUS_LOG_FORMAT")]
    pub log_format: LogFormat,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Manage test templates
    Template(TemplateArgs),
    /// Manage files referenced as `[FILE: name]`
    File(FileArgs),
    /// Queue a run, optionally executing it right away
    Submit(SubmitArgs),
    /// Execute a queued (or interrupted) run
    Execute(RunIdArgs),
    /// Execute every queued run, several at a time
    Worker,
    Status(RunIdArgs),
    /// Per-case results of one run
    Results(ResultsArgs),
    /// Results of every run of a template, grouped by request
    AllResults(AllResultsArgs),
    List(ListArgs),
    Cancel(RunIdArgs),
    Delete(RunIdArgs),
    Restart(RestartArgs),
    /// Flag, rate or comment on one case result
    Annotate(AnnotateArgs),
    Version,
}

#[derive(Args, Debug)]
pub struct TemplateArgs {
    #[command(subcommand)]
    pub cmd: TemplateSub,
}

#[derive(Subcommand, Debug)]
pub enum TemplateSub {
    /// Store a template from a YAML or JSON file, replacing one with the same id
    Add { path: PathBuf },
    List,
    Show { id: String },
    Delete { id: String },
}

#[derive(Args, Debug)]
pub struct FileArgs {
    #[command(subcommand)]
    pub cmd: FileSub,
}

#[derive(Subcommand, Debug)]
pub enum FileSub {
    Add {
        path: PathBuf,
        /// Name used in `[FILE: name]`; defaults to the file name
        #[arg(long)]
        name: Option<String>,
    },
}

#[derive(Args, Debug)]
pub struct RunIdArgs {
    pub run_id: String,
}

#[derive(Args, Debug)]
pub struct SubmitArgs {
    pub template_id: String,

    /// Run id; a fresh UUID when omitted
    #[arg(long)]
    pub run_id: Option<String>,

    /// Run-wide test data as a JSON object
    #[arg(long, conflicts_with = "simple")]
    pub data: Option<String>,

    /// Pre-request spec as JSON
    #[arg(long, conflicts_with = "simple")]
    pub pre_request: Option<String>,

    /// Post-request spec as JSON
    #[arg(long, conflicts_with = "simple")]
    pub post_request: Option<String>,

    /// Use the template's defaults only
    #[arg(long)]
    pub simple: bool,

    /// Mission goal override
    #[arg(long)]
    pub goal: Option<String>,

    #[arg(long)]
    pub max_turns: Option<u32>,

    /// Mission guide instructions override
    #[arg(long)]
    pub guide_prompt: Option<String>,

    /// Execute after queueing instead of leaving it for a worker
    #[arg(long)]
    pub execute: bool,
}

#[derive(Args, Debug, Default)]
pub struct FilterArgs {
    /// Request field to project (`request.` may be omitted)
    #[arg(long)]
    pub request: Option<String>,
    /// Response field to project
    #[arg(long)]
    pub response: Option<String>,
    /// Golden field to project
    #[arg(long)]
    pub golden: Option<String>,
}

#[derive(Args, Debug)]
pub struct ResultsArgs {
    pub run_id: String,
    #[command(flatten)]
    pub filters: FilterArgs,
    /// Human-readable table instead of JSON
    #[arg(long)]
    pub table: bool,
}

#[derive(Args, Debug)]
pub struct AllResultsArgs {
    pub template_id: String,
    #[command(flatten)]
    pub filters: FilterArgs,
}

#[derive(Args, Debug)]
pub struct ListArgs {
    /// Only runs of this kind (run, mission)
    #[arg(long)]
    pub kind: Option<String>,
}

#[derive(Args, Debug)]
pub struct RestartArgs {
    /// Run to wipe and execute again
    pub run_id: String,
}

#[derive(Args, Debug)]
pub struct AnnotateArgs {
    pub run_id: String,
    pub case_id: String,
    #[arg(long)]
    pub flag: bool,
    /// 1 to 5
    #[arg(long)]
    pub rating: Option<u8>,
    #[arg(long)]
    pub comment: Option<String>,
}
