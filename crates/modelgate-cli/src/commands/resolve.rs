use anyhow::Result;
use comfy_table::{Cell, Table};
use modelgate_ai::{ModelResolver, TaskResolutionRequest};
use serde_json::json;

use crate::cli::ResolveArgs;
use crate::config::CliConfig;
use crate::output::{OutputFormat, json::print_json, table::print_table};
use crate::setup::resolver_config;

pub fn run(config: &CliConfig, args: ResolveArgs, format: OutputFormat) -> Result<()> {
    let resolver = ModelResolver::new(resolver_config(config));
    let request = TaskResolutionRequest {
        task: args.task,
        explicit_override: args.model,
        selected_provider: args.provider,
    };
    let candidates = resolver.resolve(&request)?;

    if format.is_json() {
        return print_json(&json!({
            "task": args.task.as_str(),
            "candidates": candidates
                .iter()
                .map(|c| json!({
                    "modelKey": c.model_key(),
                    "candidate": c,
                }))
                .collect::<Vec<_>>(),
        }));
    }

    let mut table = Table::new();
    table.set_header(vec![
        "#",
        "Model",
        "Temperature",
        "Max Tokens",
        "Thinking Budget",
        "Corrected From",
    ]);
    for (position, candidate) in candidates.iter().enumerate() {
        table.add_row(vec![
            Cell::new(position + 1),
            Cell::new(candidate.model_key()),
            Cell::new(display_opt(candidate.temperature)),
            Cell::new(display_opt(candidate.max_tokens)),
            Cell::new(display_opt(candidate.thinking_budget_tokens)),
            Cell::new(candidate.corrected_from.as_deref().unwrap_or("-")),
        ]);
    }
    print_table(table)
}

fn display_opt<T: ToString>(value: Option<T>) -> String {
    value.map(|v| v.to_string()).unwrap_or_else(|| "-".to_string())
}
