//! Deterministic mock LLM client for orchestration and compaction tests.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex as SyncMutex;
use tokio::sync::Mutex;
use tokio::time::{Duration, sleep};

use crate::error::{AiError, Result};
use crate::routing::ModelCandidate;

use super::{
    CompletionRequest, CompletionResponse, FinishReason, LlmClient, LlmClientFactory, TokenUsage,
    ToolCall,
};

/// Deterministic step for scripted mock completions.
#[derive(Debug, Clone)]
pub enum MockStepKind {
    /// Return a plain assistant message.
    Text(String),
    /// Return a tool call response.
    ToolCall {
        id: String,
        name: String,
        arguments: serde_json::Value,
    },
    /// Return an LLM error.
    Error(String),
    /// Return a provider HTTP error.
    HttpError { status: u16, message: String },
    /// Return a timeout error after the step delay.
    Timeout,
    /// Never complete; only useful with cancellation or an outer timeout.
    Hang,
}

/// Scripted completion step with optional delay.
#[derive(Debug, Clone)]
pub struct MockStep {
    pub delay_ms: u64,
    pub kind: MockStepKind,
}

impl MockStep {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            delay_ms: 0,
            kind: MockStepKind::Text(content.into()),
        }
    }

    pub fn tool_call(
        id: impl Into<String>,
        name: impl Into<String>,
        arguments: serde_json::Value,
    ) -> Self {
        Self {
            delay_ms: 0,
            kind: MockStepKind::ToolCall {
                id: id.into(),
                name: name.into(),
                arguments,
            },
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            delay_ms: 0,
            kind: MockStepKind::Error(message.into()),
        }
    }

    pub fn http_error(status: u16, message: impl Into<String>) -> Self {
        Self {
            delay_ms: 0,
            kind: MockStepKind::HttpError {
                status,
                message: message.into(),
            },
        }
    }

    pub fn timeout(delay_ms: u64) -> Self {
        Self {
            delay_ms,
            kind: MockStepKind::Timeout,
        }
    }

    pub fn hang() -> Self {
        Self {
            delay_ms: 0,
            kind: MockStepKind::Hang,
        }
    }

    pub fn with_delay(mut self, delay_ms: u64) -> Self {
        self.delay_ms = delay_ms;
        self
    }
}

/// A deterministic mock LLM client driven by scripted steps.
///
/// Every request is recorded so tests can assert on what reached the
/// provider boundary (sanitized history, normalized parameters).
#[derive(Debug, Clone, Default)]
pub struct MockLlmClient {
    provider: String,
    model: String,
    script: Arc<Mutex<VecDeque<MockStep>>>,
    requests: Arc<SyncMutex<Vec<CompletionRequest>>>,
}

impl MockLlmClient {
    pub fn new(model: impl Into<String>) -> Self {
        Self::from_steps(model, Vec::new())
    }

    pub fn from_steps(model: impl Into<String>, steps: Vec<MockStep>) -> Self {
        Self {
            provider: "mock".to_string(),
            model: model.into(),
            script: Arc::new(Mutex::new(VecDeque::from(steps))),
            requests: Arc::new(SyncMutex::new(Vec::new())),
        }
    }

    pub fn with_provider(mut self, provider: impl Into<String>) -> Self {
        self.provider = provider.into();
        self
    }

    pub async fn push_step(&self, step: MockStep) {
        self.script.lock().await.push_back(step);
    }

    /// Requests received so far, in order.
    pub fn recorded_requests(&self) -> Vec<CompletionRequest> {
        self.requests.lock().clone()
    }

    pub fn call_count(&self) -> usize {
        self.requests.lock().len()
    }

    async fn next_step(&self) -> Option<MockStep> {
        self.script.lock().await.pop_front()
    }

    fn usage_for(content_len: usize) -> TokenUsage {
        let completion_tokens = content_len as u32;
        TokenUsage {
            prompt_tokens: 1,
            completion_tokens,
            total_tokens: 1 + completion_tokens,
        }
    }

    fn fallback_response(request: &CompletionRequest) -> CompletionResponse {
        let text = request
            .messages
            .iter()
            .rev()
            .find(|msg| matches!(msg.role, super::Role::User))
            .map(|msg| format!("mock-echo: {}", msg.content))
            .unwrap_or_else(|| "mock-ok".to_string());

        CompletionResponse {
            content: Some(text.clone()),
            tool_calls: Vec::new(),
            finish_reason: FinishReason::Stop,
            usage: Some(Self::usage_for(text.len())),
        }
    }
}

#[async_trait]
impl LlmClient for MockLlmClient {
    fn provider(&self) -> &str {
        &self.provider
    }

    fn model(&self) -> &str {
        &self.model
    }

    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse> {
        self.requests.lock().push(request.clone());

        let Some(step) = self.next_step().await else {
            return Ok(Self::fallback_response(&request));
        };

        if step.delay_ms > 0 {
            sleep(Duration::from_millis(step.delay_ms)).await;
        }

        match step.kind {
            MockStepKind::Text(content) => Ok(CompletionResponse {
                usage: Some(Self::usage_for(content.len())),
                content: Some(content),
                tool_calls: Vec::new(),
                finish_reason: FinishReason::Stop,
            }),
            MockStepKind::ToolCall {
                id,
                name,
                arguments,
            } => Ok(CompletionResponse {
                usage: Some(Self::usage_for(0)),
                content: None,
                tool_calls: vec![ToolCall {
                    id,
                    name,
                    arguments,
                }],
                finish_reason: FinishReason::ToolCalls,
            }),
            MockStepKind::Error(message) => Err(AiError::Llm(message)),
            MockStepKind::HttpError { status, message } => Err(AiError::LlmHttp {
                provider: self.provider.clone(),
                status,
                message,
                retry_after_secs: None,
            }),
            MockStepKind::Timeout => Err(AiError::Timeout {
                provider: self.provider.clone(),
                timeout_ms: step.delay_ms,
            }),
            MockStepKind::Hang => std::future::pending().await,
        }
    }
}

/// Factory handing out pre-registered mock clients by model key.
///
/// Unregistered keys fail with a configuration-style error so a test that
/// forgets to register a candidate fails loudly.
#[derive(Debug, Clone, Default)]
pub struct MockLlmClientFactory {
    clients: Arc<SyncMutex<HashMap<String, MockLlmClient>>>,
    created: Arc<SyncMutex<Vec<String>>>,
}

impl MockLlmClientFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a client for `provider:model`.
    pub fn register(&self, model_key: impl Into<String>, client: MockLlmClient) {
        self.clients.lock().insert(model_key.into(), client);
    }

    pub fn client(&self, model_key: &str) -> Option<MockLlmClient> {
        self.clients.lock().get(model_key).cloned()
    }

    /// Model keys for which a client was created, in order.
    pub fn created(&self) -> Vec<String> {
        self.created.lock().clone()
    }
}

impl LlmClientFactory for MockLlmClientFactory {
    fn create_client(&self, candidate: &ModelCandidate) -> Result<Arc<dyn LlmClient>> {
        let key = candidate.model_key();
        self.created.lock().push(key.clone());
        let client = self.client(&key).ok_or_else(|| AiError::LlmHttp {
            provider: "mock".to_string(),
            status: 404,
            message: format!("model '{key}' is not supported"),
            retry_after_secs: None,
        })?;
        Ok(Arc::new(client))
    }
}
