use std::time::Duration;

use anyhow::Result;
use modelgate_ai::InvokeOptions;
use modelgate_ai::llm::Message;
use serde_json::json;

use crate::cli::InvokeArgs;
use crate::config::CliConfig;
use crate::output::{OutputFormat, json::print_json};
use crate::setup::prepare_gateway;

pub async fn run(config: &CliConfig, args: InvokeArgs, format: OutputFormat) -> Result<()> {
    let timeout = Duration::from_secs(args.timeout_secs.max(1));
    let gateway = prepare_gateway(config, timeout).await;

    let mut messages = Vec::new();
    if let Some(system) = args.system {
        messages.push(Message::system(system));
    }
    messages.push(Message::user(args.prompt));

    let mut options = InvokeOptions::new();
    options.model_override = args.model;
    options.selected_provider = args.provider;

    let invocation = gateway
        .orchestrator
        .invoke(args.task, &messages, options)
        .await?;

    if format.is_json() {
        return print_json(&json!({
            "task": args.task.as_str(),
            "modelKey": invocation.model_key,
            "attempts": invocation.attempts,
            "usage": invocation.usage,
            "message": invocation.message,
        }));
    }

    println!("{}", invocation.message.content);
    for call in invocation.message.requested_tool_calls() {
        println!("→ tool_call: {}({})", call.name, call.arguments);
    }
    Ok(())
}
