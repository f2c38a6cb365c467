//! Per-session ownership of the conversation log.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::Mutex;
use uuid::Uuid;

use super::compactor::{CompactionReport, HistoryCompactor};
use super::log::ConversationLog;
use crate::error::Result;
use crate::llm::{Message, TokenUsage};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BudgetPhase {
    WithinBudget,
    Compacting,
}

/// A session's log behind a single async lock.
///
/// Compaction holds the lock from span selection until the splice, so reads
/// and appends for the same session wait for it. A second compaction trigger
/// queues on the lock and then re-checks the budget against the compacted log.
pub struct SessionHistory {
    id: Uuid,
    log: Mutex<ConversationLog>,
    compactor: Arc<HistoryCompactor>,
    compacting: AtomicBool,
}

impl SessionHistory {
    pub fn new(compactor: Arc<HistoryCompactor>) -> Self {
        Self::with_log(ConversationLog::new(), compactor)
    }

    pub fn with_log(log: ConversationLog, compactor: Arc<HistoryCompactor>) -> Self {
        Self {
            id: Uuid::new_v4(),
            log: Mutex::new(log),
            compactor,
            compacting: AtomicBool::new(false),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub async fn append(&self, message: Message) -> u64 {
        self.log.lock().await.push(message)
    }

    pub async fn record_usage(&self, usage: &TokenUsage) {
        self.log.lock().await.record_usage(usage);
    }

    pub async fn messages(&self) -> Vec<Message> {
        self.log.lock().await.messages()
    }

    pub async fn token_count(&self) -> usize {
        self.log.lock().await.token_count()
    }

    pub async fn snapshot(&self) -> ConversationLog {
        self.log.lock().await.clone()
    }

    pub fn phase(&self) -> BudgetPhase {
        if self.compacting.load(Ordering::Acquire) {
            BudgetPhase::Compacting
        } else {
            BudgetPhase::WithinBudget
        }
    }

    /// Run the budget check and compact if needed. Call after every agent step.
    pub async fn monitor_and_compact(&self) -> Result<CompactionReport> {
        let mut log = self.log.lock().await;
        self.compacting.store(true, Ordering::Release);
        let report = self.compactor.monitor_and_compact(&mut log).await;
        self.compacting.store(false, Ordering::Release);
        report
    }
}
