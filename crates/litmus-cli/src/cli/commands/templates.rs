use super::super::args::{FileArgs, FileSub, GlobalArgs, TemplateArgs, TemplateSub};
use super::engine_builder::{load, open_store};
use super::print_json;
use crate::exit_codes::SUCCESS;
use anyhow::Context;
use litmus_core::config::load_template;
use serde_json::json;

pub(crate) fn run(global: &GlobalArgs, args: TemplateArgs) -> anyhow::Result<i32> {
    let store = open_store(&load(global)?)?;
    match args.cmd {
        TemplateSub::Add { path } => {
            let template = load_template(&path)?;
            store.put_template(&template)?;
            tracing::info!(template_id = %template.id, kind = template.kind.as_str(), "template stored");
            println!("{}", template.id);
        }
        TemplateSub::List => {
            let listing: Vec<_> = store
                .list_templates()?
                .iter()
                .map(|t| {
                    json!({
                        "id": t.id,
                        "kind": t.kind.as_str(),
                        "cases": t.cases.len(),
                    })
                })
                .collect();
            print_json(&listing)?;
        }
        TemplateSub::Show { id } => print_json(&store.get_template(&id)?)?,
        TemplateSub::Delete { id } => {
            store.delete_template(&id)?;
            println!("deleted {id}");
        }
    }
    Ok(SUCCESS)
}

pub(crate) fn run_file(global: &GlobalArgs, args: FileArgs) -> anyhow::Result<i32> {
    let store = open_store(&load(global)?)?;
    match args.cmd {
        FileSub::Add { path, name } => {
            let content =
                std::fs::read(&path).with_context(|| format!("failed to read {}", path.display()))?;
            let name = match name {
                Some(n) => n,
                None => path
                    .file_name()
                    .and_then(|n| n.to_str())
                    .map(str::to_string)
                    .ok_or_else(|| anyhow::anyhow!("cannot derive a name from {}", path.display()))?,
            };
            let digest = store.put_file(&name, &content)?;
            println!("{name} {digest}");
        }
    }
    Ok(SUCCESS)
}
