//! Session conversation log.

use std::ops::Range;

use serde::{Deserialize, Serialize};
use serde_json::json;

use super::tokens::{estimate_message_tokens, estimate_tokens};
use crate::llm::{Message, Role, TokenUsage, ToolCall};

/// Tool name carried by the synthetic notice so the summary that follows it
/// is a well-formed tool result on the wire.
pub const COMPACTION_TOOL_NAME: &str = "condense_history";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryKind {
    Original,
    CompactionNotice,
    CompactionSummary,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    /// Position in the session, starting at 1. Strictly increasing along the
    /// log; synthetic entries reuse indices from the span they replaced.
    pub index: u64,
    pub kind: EntryKind,
    pub message: Message,
}

/// Ordered conversation history with a running token estimate and the
/// compaction marker.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConversationLog {
    entries: Vec<LogEntry>,
    token_count: usize,
    /// Entries before this position are already compacted or summaries.
    compacted_until: usize,
    next_index: u64,
}

impl ConversationLog {
    pub fn new() -> Self {
        Self {
            next_index: 1,
            ..Self::default()
        }
    }

    pub fn from_messages(messages: impl IntoIterator<Item = Message>) -> Self {
        let mut log = Self::new();
        for message in messages {
            log.push(message);
        }
        log
    }

    /// Append a message; returns its index.
    pub fn push(&mut self, message: Message) -> u64 {
        let index = self.next_index.max(1);
        self.next_index = index + 1;
        self.token_count += estimate_message_tokens(&message);
        self.entries.push(LogEntry {
            index,
            kind: EntryKind::Original,
            message,
        });
        index
    }

    /// Replace the running estimate with what the provider actually counted.
    pub fn record_usage(&mut self, usage: &TokenUsage) {
        self.token_count = usage.total_tokens as usize;
    }

    pub fn set_token_count(&mut self, tokens: usize) {
        self.token_count = tokens;
    }

    pub fn token_count(&self) -> usize {
        self.token_count
    }

    /// Recompute the estimate from scratch, discarding reported usage.
    pub fn reestimate(&mut self) -> usize {
        self.token_count = estimate_tokens(self.entries.iter().map(|e| &e.message));
        self.token_count
    }

    pub fn entries(&self) -> &[LogEntry] {
        &self.entries
    }

    pub fn messages(&self) -> Vec<Message> {
        self.entries.iter().map(|e| e.message.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn compaction_marker(&self) -> usize {
        self.compacted_until
    }

    /// Summaries produced by earlier compactions, oldest first.
    pub fn prior_summaries(&self) -> impl Iterator<Item = &str> {
        self.entries
            .iter()
            .filter(|e| e.kind == EntryKind::CompactionSummary)
            .map(|e| e.message.content.as_str())
    }

    /// Entries strictly after the compaction marker and strictly before the
    /// last `preserve_recent` entries.
    ///
    /// The end is pulled back so a preserved tool result never loses the
    /// assistant turn that requested it.
    pub fn compactable_span(&self, preserve_recent: usize) -> Range<usize> {
        let start = self.compacted_until;
        let mut end = self.entries.len().saturating_sub(preserve_recent);
        while end > start && self.entries.get(end).is_some_and(|e| e.message.role == Role::Tool) {
            end -= 1;
        }
        if end <= start { start..start } else { start..end }
    }

    /// Replace `span` with a notice and a summary entry and move the marker
    /// past them. Returns the number of entries removed.
    pub(crate) fn splice_summary(&mut self, span: Range<usize>, notice: String, summary: String) -> usize {
        let replaced = span.len();
        let first_index = self.entries[span.start].index;
        let last_index = self.entries[span.end - 1].index;

        let call_id = format!("compaction-{first_index}-{last_index}");
        let notice = Message::assistant_with_tool_calls(
            Some(notice),
            vec![ToolCall {
                id: call_id.clone(),
                name: COMPACTION_TOOL_NAME.to_string(),
                arguments: json!({ "from": first_index, "to": last_index }),
            }],
        );
        let summary = Message::tool_result(call_id, summary);

        let removed_tokens =
            estimate_tokens(self.entries[span.clone()].iter().map(|e| &e.message));
        let added_tokens = estimate_message_tokens(&notice) + estimate_message_tokens(&summary);

        let synthetic = [
            LogEntry {
                index: first_index,
                kind: EntryKind::CompactionNotice,
                message: notice,
            },
            LogEntry {
                index: last_index,
                kind: EntryKind::CompactionSummary,
                message: summary,
            },
        ];
        self.entries.splice(span.clone(), synthetic);
        self.compacted_until = span.start + 2;
        self.token_count = self.token_count.saturating_sub(removed_tokens) + added_tokens;
        replaced
    }
}
