//! Budget-triggered history compaction.
//!
//! When a log's token count reaches the ceiling, the entries between the
//! compaction marker and the preserved tail are summarized through the
//! summarizer task and replaced by a notice/summary pair. The tail is never
//! touched.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::log::ConversationLog;
use super::tokens::{CHARS_PER_TOKEN, middle_truncate};
use crate::error::Result;
use crate::llm::{Message, Role};

const COMPACTION_PROMPT: &str = include_str!("../../assets/compaction_prompt.md");
/// Per-message cap when rendering the span for the summarizer.
const SUMMARY_INPUT_TRUNCATE_CHARS: usize = 4_000;
const TOOL_ARGS_TRUNCATE_CHARS: usize = 200;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CompactionConfig {
    /// Token count at or above which compaction runs. A policy value, not a
    /// provider context window.
    pub token_ceiling: usize,
    /// Most recent entries that are never compacted.
    pub preserve_recent: usize,
    /// Upper bound on the stored summary.
    pub max_summary_tokens: usize,
}

impl Default for CompactionConfig {
    fn default() -> Self {
        Self {
            token_ceiling: 80_000,
            preserve_recent: 20,
            max_summary_tokens: 4_000,
        }
    }
}

/// Produces summary text from a prepared prompt. The orchestrator implements
/// this by routing through the summarizer task.
#[async_trait]
pub trait Summarizer: Send + Sync {
    async fn summarize(&self, prompt: Vec<Message>) -> Result<String>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompactionOutcome {
    /// Below the ceiling; nothing was done.
    UnderBudget,
    /// Over the ceiling but no eligible span.
    NothingToCompact,
    /// The summarizer returned nothing usable; the log is unchanged.
    EmptySummary,
    Compacted,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompactionReport {
    pub outcome: CompactionOutcome,
    pub entries_replaced: usize,
    pub tokens_before: usize,
    pub tokens_after: usize,
}

impl CompactionReport {
    fn unchanged(outcome: CompactionOutcome, tokens: usize) -> Self {
        Self {
            outcome,
            entries_replaced: 0,
            tokens_before: tokens,
            tokens_after: tokens,
        }
    }
}

pub struct HistoryCompactor {
    config: CompactionConfig,
    summarizer: Arc<dyn Summarizer>,
}

impl HistoryCompactor {
    pub fn new(config: CompactionConfig, summarizer: Arc<dyn Summarizer>) -> Self {
        Self { config, summarizer }
    }

    pub fn config(&self) -> &CompactionConfig {
        &self.config
    }

    pub fn over_budget(&self, log: &ConversationLog) -> bool {
        log.token_count() >= self.config.token_ceiling
    }

    /// Compact `log` in place if it is over budget.
    ///
    /// A no-op under budget. On summarizer failure the log is left untouched
    /// and the error is returned.
    pub async fn monitor_and_compact(&self, log: &mut ConversationLog) -> Result<CompactionReport> {
        let tokens_before = log.token_count();
        if !self.over_budget(log) {
            return Ok(CompactionReport::unchanged(
                CompactionOutcome::UnderBudget,
                tokens_before,
            ));
        }

        let span = log.compactable_span(self.config.preserve_recent);
        // Replacing a single entry with two would grow the log.
        if span.len() < 2 {
            info!(
                tokens = tokens_before,
                ceiling = self.config.token_ceiling,
                "History over budget but nothing eligible to compact"
            );
            return Ok(CompactionReport::unchanged(
                CompactionOutcome::NothingToCompact,
                tokens_before,
            ));
        }

        info!(
            tokens = tokens_before,
            ceiling = self.config.token_ceiling,
            span_start = span.start,
            span_end = span.end,
            "Compacting history"
        );

        let prompt = build_prompt(log, span.clone());
        let summary = self.summarizer.summarize(prompt).await?;
        if summary.trim().is_empty() {
            warn!("Summarizer returned an empty summary, skipping compaction");
            return Ok(CompactionReport::unchanged(
                CompactionOutcome::EmptySummary,
                tokens_before,
            ));
        }
        let summary = middle_truncate(
            summary.trim(),
            self.config.max_summary_tokens * CHARS_PER_TOKEN,
        );

        let notice = format!(
            "Earlier conversation history ({} messages) was condensed due to space constraints. \
             The summary of what was learned follows.",
            span.len()
        );
        let replaced = log.splice_summary(span, notice, summary);

        let tokens_after = log.token_count();
        info!(
            entries_replaced = replaced,
            tokens_before, tokens_after, "History compaction completed"
        );
        Ok(CompactionReport {
            outcome: CompactionOutcome::Compacted,
            entries_replaced: replaced,
            tokens_before,
            tokens_after,
        })
    }
}

fn build_prompt(log: &ConversationLog, span: std::ops::Range<usize>) -> Vec<Message> {
    let mut request = String::new();

    let prior: Vec<&str> = log.prior_summaries().collect();
    if !prior.is_empty() {
        request.push_str("# Already captured\n\n");
        for summary in prior {
            request.push_str(summary);
            request.push_str("\n\n");
        }
    }

    request.push_str("# Conversation to condense\n\n");
    let messages: Vec<Message> = log.entries()[span]
        .iter()
        .map(|e| e.message.clone())
        .collect();
    request.push_str(&format_transcript(&messages));

    vec![Message::system(COMPACTION_PROMPT), Message::user(request)]
}

fn format_transcript(messages: &[Message]) -> String {
    let mut out = String::new();
    for message in messages {
        let label = match message.role {
            Role::System => "SYSTEM",
            Role::User => "USER",
            Role::Assistant => "ASSISTANT",
            Role::Tool => "TOOL",
        };
        out.push_str(&format!(
            "[{label}] {}\n\n",
            middle_truncate(&message.content, SUMMARY_INPUT_TRUNCATE_CHARS)
        ));
        for call in message.requested_tool_calls() {
            let args = middle_truncate(&call.arguments.to_string(), TOOL_ARGS_TRUNCATE_CHARS);
            out.push_str(&format!("  → tool_call: {}({args})\n", call.name));
        }
    }
    out
}
