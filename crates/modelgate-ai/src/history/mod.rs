//! Conversation history budget: token accounting and compaction.

mod compactor;
mod log;
mod session;
mod tokens;

pub use compactor::{
    CompactionConfig, CompactionOutcome, CompactionReport, HistoryCompactor, Summarizer,
};
pub use log::{COMPACTION_TOOL_NAME, ConversationLog, EntryKind, LogEntry};
pub use session::{BudgetPhase, SessionHistory};
pub use tokens::{estimate_message_tokens, estimate_tokens, middle_truncate};
