//! Invocation orchestrator.
//!
//! Walks the resolver's candidate list, gates each attempt on the circuit
//! breaker, classifies failures once, and decides between returning, moving
//! to the next candidate, and aborting.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, info, warn};

use super::classify::{FailureClass, InvocationOutcome};
use super::options::InvokeOptions;
use super::sanitize::repair_pending_tool_calls;
use crate::error::{AiError, Result};
use crate::health::CircuitBreaker;
use crate::history::Summarizer;
use crate::llm::{
    CompletionRequest, CompletionResponse, LlmClientFactory, Message, ModelParams, ParamPipeline, TokenUsage,
};
use crate::routing::{AgentTask, ModelCandidate, ModelResolver, TaskResolutionRequest};

pub const DEFAULT_INVOKE_TIMEOUT: Duration = Duration::from_secs(120);

/// Successful invocation with the bookkeeping callers may want.
#[derive(Debug, Clone)]
pub struct Invocation {
    pub message: Message,
    pub usage: Option<TokenUsage>,
    pub model_key: String,
    /// Attempts made, including the successful one.
    pub attempts: usize,
}

pub struct Orchestrator {
    resolver: ModelResolver,
    breaker: Arc<CircuitBreaker>,
    factory: Arc<dyn LlmClientFactory>,
    default_timeout: Duration,
}

impl Orchestrator {
    pub fn new(
        resolver: ModelResolver,
        breaker: Arc<CircuitBreaker>,
        factory: Arc<dyn LlmClientFactory>,
    ) -> Self {
        Self {
            resolver,
            breaker,
            factory,
            default_timeout: DEFAULT_INVOKE_TIMEOUT,
        }
    }

    pub fn with_default_timeout(mut self, timeout: Duration) -> Self {
        self.default_timeout = timeout;
        self
    }

    pub fn resolver(&self) -> &ModelResolver {
        &self.resolver
    }

    pub fn breaker(&self) -> &Arc<CircuitBreaker> {
        &self.breaker
    }

    /// Resolve candidates for `task` and invoke them until one succeeds.
    pub async fn resolve_and_invoke(
        &self,
        task: AgentTask,
        messages: &[Message],
        options: InvokeOptions,
    ) -> Result<Message> {
        self.invoke(task, messages, options)
            .await
            .map(|invocation| invocation.message)
    }

    /// Like [`resolve_and_invoke`](Self::resolve_and_invoke) but returns usage
    /// and attempt bookkeeping.
    pub async fn invoke(
        &self,
        task: AgentTask,
        messages: &[Message],
        options: InvokeOptions,
    ) -> Result<Invocation> {
        let mut request = TaskResolutionRequest::new(task);
        request.explicit_override = options.model_override.clone();
        request.selected_provider = options.selected_provider;

        let candidates = self.resolver.resolve(&request).map_err(|e| AiError::Configuration {
            task: task.to_string(),
            model_key: request.explicit_override.clone().unwrap_or_default(),
            detail: e.to_string(),
        })?;

        self.invoke_candidates(task, &candidates, messages, &options)
            .await
    }

    /// Attempt `candidates` in order.
    ///
    /// Breaker-unavailable candidates are skipped without counting as an
    /// attempt. Each attempt mutates breaker state at most once.
    pub async fn invoke_candidates(
        &self,
        task: AgentTask,
        candidates: &[ModelCandidate],
        messages: &[Message],
        options: &InvokeOptions,
    ) -> Result<Invocation> {
        let mut history = messages.to_vec();
        let repaired = repair_pending_tool_calls(&mut history);
        if repaired > 0 {
            debug!(task = %task, repaired, "Sanitized tool-call history");
        }

        let timeout = options.timeout.unwrap_or(self.default_timeout);
        let mut attempts = 0usize;
        let mut rejected_keys: HashSet<String> = HashSet::new();
        let mut last_failure: Option<(FailureClass, String, String)> = None;
        let mut usage = None;

        for candidate in candidates {
            let model_key = candidate.model_key();

            if rejected_keys.contains(&model_key) {
                continue;
            }
            if !self.breaker.is_available(&model_key).await {
                debug!(task = %task, model_key = %model_key, "Skipping candidate, circuit open");
                continue;
            }
            if let Some(token) = &options.cancel
                && token.is_cancelled()
            {
                return Err(AiError::Cancelled {
                    task: task.to_string(),
                });
            }

            attempts += 1;
            debug!(task = %task, model_key = %model_key, attempt = attempts, "Invoking candidate");

            let outcome = match self.attempt(candidate, &history, options, timeout).await {
                Ok(Attempt::Completed(response)) => {
                    usage = response.usage.clone();
                    InvocationOutcome::Success {
                        message: response.into_message(),
                    }
                }
                Ok(Attempt::Cancelled) => {
                    info!(task = %task, model_key = %model_key, "Invocation cancelled by caller");
                    return Err(AiError::Cancelled {
                        task: task.to_string(),
                    });
                }
                Err(error) => InvocationOutcome::from_error(&error),
            };

            match outcome {
                InvocationOutcome::Success { message } => {
                    self.breaker.record_success(&model_key).await;
                    info!(task = %task, model_key = %model_key, attempts, "Invocation succeeded");
                    return Ok(Invocation {
                        message,
                        usage,
                        model_key,
                        attempts,
                    });
                }
                InvocationOutcome::Fatal {
                    kind: FailureClass::Authentication,
                    detail,
                } => {
                    warn!(task = %task, model_key = %model_key, error = %detail, "Authentication failure, aborting");
                    return Err(AiError::Authentication {
                        task: task.to_string(),
                        model_key,
                        detail,
                    });
                }
                InvocationOutcome::Fatal { kind, detail } => {
                    // Not a health signal: the same request would fail on any
                    // healthy deployment of this model.
                    warn!(task = %task, model_key = %model_key, error = %detail, "Request rejected as misconfigured");
                    rejected_keys.insert(model_key.clone());
                    last_failure = Some((kind, model_key, detail));
                }
                InvocationOutcome::Retryable { detail } => {
                    warn!(task = %task, model_key = %model_key, attempt = attempts, error = %detail, "Transient failure");
                    self.breaker.record_failure(&model_key).await;
                    last_failure = Some((FailureClass::Transient, model_key, detail));
                }
            }
        }

        match last_failure {
            Some((FailureClass::Configuration, model_key, detail)) => Err(AiError::Configuration {
                task: task.to_string(),
                model_key,
                detail,
            }),
            Some((_, _, detail)) => Err(AiError::Exhausted {
                task: task.to_string(),
                attempts,
                last_error: detail,
            }),
            None => Err(AiError::Exhausted {
                task: task.to_string(),
                attempts,
                last_error: "all candidates unavailable (circuit open)".to_string(),
            }),
        }
    }

    async fn attempt(
        &self,
        candidate: &ModelCandidate,
        history: &[Message],
        options: &InvokeOptions,
        timeout: Duration,
    ) -> Result<Attempt> {
        let client = self.factory.create_client(candidate)?;

        let base = ModelParams {
            parallel_tool_calls: options.parallel_tool_calls,
            ..ModelParams::default()
        };
        let params = ParamPipeline::for_provider(candidate.provider).apply(candidate, base);
        let request = CompletionRequest::new(history.to_vec())
            .with_tools(options.tools.clone())
            .with_params(params);

        let call = async {
            tokio::time::timeout(timeout, client.complete(request))
                .await
                .map_err(|_| AiError::Timeout {
                    provider: candidate.provider.display_name().to_string(),
                    timeout_ms: timeout.as_millis() as u64,
                })?
        };

        match &options.cancel {
            Some(token) => tokio::select! {
                _ = token.cancelled() => Ok(Attempt::Cancelled),
                result = call => result.map(Attempt::Completed),
            },
            None => call.await.map(Attempt::Completed),
        }
    }
}

enum Attempt {
    Completed(CompletionResponse),
    Cancelled,
}

#[async_trait]
impl Summarizer for Orchestrator {
    async fn summarize(&self, prompt: Vec<Message>) -> Result<String> {
        let message = self
            .resolve_and_invoke(AgentTask::Summarizer, &prompt, InvokeOptions::default())
            .await?;
        Ok(message.content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::health::{CircuitBreakerConfig, CircuitState};
    use crate::llm::{MockLlmClient, MockLlmClientFactory, MockStep};
    use crate::routing::ResolverConfig;
    use modelgate_state::StateAdapter;

    const PLANNER_KEY: &str = "openai:o3";

    fn orchestrator(factory: &MockLlmClientFactory) -> Orchestrator {
        let breaker = CircuitBreaker::new(
            Arc::new(StateAdapter::in_memory()),
            CircuitBreakerConfig::default(),
        );
        Orchestrator::new(
            ModelResolver::new(ResolverConfig::default()),
            Arc::new(breaker),
            Arc::new(factory.clone()),
        )
    }

    #[tokio::test]
    async fn test_configuration_failure_is_surfaced_verbatim() {
        let factory = MockLlmClientFactory::new();
        factory.register(
            PLANNER_KEY,
            MockLlmClient::from_steps(
                "o3",
                vec![MockStep::http_error(400, "Unsupported parameter: 'temperature'")],
            ),
        );
        let orchestrator = orchestrator(&factory);

        let err = orchestrator
            .resolve_and_invoke(AgentTask::Planner, &[Message::user("plan")], InvokeOptions::new())
            .await
            .unwrap_err();

        assert_eq!(err.to_string(), "Unsupported parameter: 'temperature'");
        // Repeats of the rejected configuration are not attempted.
        assert_eq!(factory.client(PLANNER_KEY).unwrap().call_count(), 1);
        let status = orchestrator.breaker().status(PLANNER_KEY).await;
        assert_eq!(status.failure_count, 0);
    }

    #[tokio::test]
    async fn test_invalid_override_is_configuration_error() {
        let factory = MockLlmClientFactory::new();
        let err = orchestrator(&factory)
            .resolve_and_invoke(
                AgentTask::Planner,
                &[Message::user("plan")],
                InvokeOptions::new().with_model("mystery:model"),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, AiError::Configuration { .. }));
        assert!(factory.created().is_empty());
    }

    #[tokio::test]
    async fn test_repeated_transient_failures_open_circuit() {
        let factory = MockLlmClientFactory::new();
        factory.register(
            PLANNER_KEY,
            MockLlmClient::from_steps(
                "o3",
                vec![
                    MockStep::http_error(503, "unavailable"),
                    MockStep::http_error(503, "unavailable"),
                    MockStep::text("never reached"),
                ],
            ),
        );
        let orchestrator = orchestrator(&factory);

        let err = orchestrator
            .invoke(AgentTask::Planner, &[Message::user("plan")], InvokeOptions::new())
            .await
            .unwrap_err();

        match err {
            AiError::Exhausted {
                attempts,
                last_error,
                ..
            } => {
                assert_eq!(attempts, 2);
                assert!(last_error.contains("unavailable"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(
            orchestrator.breaker().status(PLANNER_KEY).await.state,
            CircuitState::Open
        );
    }

    #[tokio::test]
    async fn test_params_are_normalized_before_dispatch() {
        let factory = MockLlmClientFactory::new();
        factory.register("anthropic:claude-sonnet-4-5", MockLlmClient::new("claude-sonnet-4-5"));
        let orchestrator = orchestrator(&factory);

        orchestrator
            .resolve_and_invoke(
                AgentTask::Programmer,
                &[Message::user("code")],
                InvokeOptions::new().with_model("anthropic:claude-sonnet-4-5"),
            )
            .await
            .unwrap();

        let requests = factory
            .client("anthropic:claude-sonnet-4-5")
            .unwrap()
            .recorded_requests();
        assert_eq!(requests[0].params.temperature, None);
        assert_eq!(requests[0].params.top_p, Some(0.1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_attempt_timeout_is_transient() {
        let factory = MockLlmClientFactory::new();
        factory.register(
            PLANNER_KEY,
            MockLlmClient::from_steps("o3", vec![MockStep::hang(), MockStep::text("second try")]),
        );
        let orchestrator = orchestrator(&factory);

        let invocation = orchestrator
            .invoke(
                AgentTask::Planner,
                &[Message::user("plan")],
                InvokeOptions::new().with_timeout(Duration::from_secs(5)),
            )
            .await
            .unwrap();

        assert_eq!(invocation.message.content, "second try");
        assert_eq!(invocation.attempts, 2);
    }
}
