use super::args::*;

pub(crate) mod engine_builder;
pub(crate) mod inspect;
pub(crate) mod runs;
pub(crate) mod templates;

use crate::exit_codes::SUCCESS;
use serde::Serialize;

pub async fn dispatch(cli: Cli) -> anyhow::Result<i32> {
    let global = cli.global;
    match cli.cmd {
        Command::Template(args) => templates::run(&global, args),
        Command::File(args) => templates::run_file(&global, args),
        Command::Submit(args) => runs::submit(&global, args).await,
        Command::Execute(args) => runs::execute(&global, &args.run_id).await,
        Command::Worker => runs::worker(&global).await,
        Command::Restart(args) => runs::restart(&global, args).await,
        Command::Cancel(args) => runs::cancel(&global, &args.run_id),
        Command::Delete(args) => runs::delete(&global, &args.run_id),
        Command::Status(args) => inspect::status(&global, &args.run_id),
        Command::Results(args) => inspect::results(&global, args),
        Command::AllResults(args) => inspect::all_results(&global, args),
        Command::List(args) => inspect::list(&global, args),
        Command::Annotate(args) => inspect::annotate(&global, args),
        Command::Version => {
            println!("{}", env!("CARGO_PKG_VERSION"));
            Ok(SUCCESS)
        }
    }
}

pub(crate) fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
