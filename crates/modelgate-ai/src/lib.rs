//! ModelGate AI - resilient LLM invocation for agent tasks
//!
//! This crate provides:
//! - Multi-provider LLM clients (OpenAI, Anthropic, DeepSeek) with SDK-level retry
//! - Task-to-model resolution with a static correction table
//! - Per-model circuit breaking backed by a shared key-value store
//! - An invocation orchestrator that classifies failures once
//! - Token-budgeted history compaction

#![allow(dead_code)]

pub mod error;
pub mod health;
pub mod history;
mod http_client;
pub mod invoke;
pub mod llm;
pub mod routing;

// Re-export commonly used types
pub use error::{AiError, Result};
pub use health::{
    BreakerStatus, CircuitBreaker, CircuitBreakerConfig, CircuitBreakerState, CircuitState,
};
pub use history::{
    CompactionConfig, CompactionOutcome, CompactionReport, ConversationLog, HistoryCompactor,
    SessionHistory, Summarizer,
};
pub use invoke::{FailureClass, Invocation, InvocationOutcome, InvokeOptions, Orchestrator};
pub use llm::{
    DefaultLlmClientFactory, LlmClient, LlmClientFactory, Message, Role, ToolCall, ToolSchema,
};
pub use routing::{
    AgentTask, ModelCandidate, ModelResolver, Provider, ResolverConfig, TaskResolutionRequest,
};
