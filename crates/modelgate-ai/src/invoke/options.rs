use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::llm::ToolSchema;
use crate::routing::Provider;

/// Per-call options for [`Orchestrator::resolve_and_invoke`](super::Orchestrator::resolve_and_invoke).
#[derive(Debug, Clone, Default)]
pub struct InvokeOptions {
    /// Explicit `provider:model[:variant]` for this call only.
    pub model_override: Option<String>,
    /// Provider pinned for the session.
    pub selected_provider: Option<Provider>,
    pub tools: Vec<ToolSchema>,
    /// `None` leaves the provider default.
    pub parallel_tool_calls: Option<bool>,
    /// Per-attempt timeout. Falls back to the orchestrator default.
    pub timeout: Option<Duration>,
    /// Caller cancellation. Aborts the in-flight attempt.
    pub cancel: Option<CancellationToken>,
}

impl InvokeOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model_override = Some(model.into());
        self
    }

    pub fn with_provider(mut self, provider: Provider) -> Self {
        self.selected_provider = Some(provider);
        self
    }

    pub fn with_tools(mut self, tools: Vec<ToolSchema>) -> Self {
        self.tools = tools;
        self
    }

    pub fn with_parallel_tool_calls(mut self, parallel: bool) -> Self {
        self.parallel_tool_calls = Some(parallel);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_cancel(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }
}
