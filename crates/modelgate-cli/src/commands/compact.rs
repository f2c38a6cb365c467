use std::time::Duration;

use anyhow::{Context, Result};
use modelgate_ai::history::{CompactionOutcome, ConversationLog};
use modelgate_ai::llm::ingest::ingest_transcript;
use serde_json::json;

use crate::cli::CompactArgs;
use crate::config::CliConfig;
use crate::output::{OutputFormat, json::print_json};
use crate::setup::prepare_gateway;

pub async fn run(config: &CliConfig, args: CompactArgs, format: OutputFormat) -> Result<()> {
    let raw = std::fs::read_to_string(&args.transcript)
        .with_context(|| format!("Failed to read {}", args.transcript.display()))?;
    let value: serde_json::Value = serde_json::from_str(&raw)
        .with_context(|| format!("{} is not valid JSON", args.transcript.display()))?;
    let messages = ingest_transcript(&value)?;

    let mut log = ConversationLog::from_messages(messages);
    if let Some(tokens) = args.tokens {
        log.set_token_count(tokens);
    }

    let mut config = config.clone();
    if let Some(ceiling) = args.ceiling {
        config.compaction.token_ceiling = ceiling;
    }

    let gateway = prepare_gateway(&config, Duration::from_secs(120)).await;
    let report = gateway.compactor(&config).monitor_and_compact(&mut log).await?;

    if let Some(path) = &args.output {
        let transcript = serde_json::to_string_pretty(&log.messages())?;
        std::fs::write(path, transcript)
            .with_context(|| format!("Failed to write {}", path.display()))?;
    }

    if format.is_json() {
        return print_json(&json!({
            "report": report,
            "entries": log.len(),
            "messages": log.messages(),
        }));
    }

    match report.outcome {
        CompactionOutcome::UnderBudget => println!(
            "Under budget ({} < {} tokens), nothing to do",
            report.tokens_before, config.compaction.token_ceiling
        ),
        CompactionOutcome::NothingToCompact => {
            println!("Over budget but every entry is within the preserved tail")
        }
        CompactionOutcome::EmptySummary => {
            println!("Summarizer returned an empty summary, transcript unchanged")
        }
        CompactionOutcome::Compacted => println!(
            "Compacted {} entries: {} -> {} tokens, {} entries remain",
            report.entries_replaced,
            report.tokens_before,
            report.tokens_after,
            log.len()
        ),
    }
    Ok(())
}
