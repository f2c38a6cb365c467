//! Model Config Resolver
//!
//! Turns a task plus layered configuration into an ordered, non-empty list of
//! candidates. Resolution is a pure function of the request and the
//! [`ResolverConfig`] snapshot: the environment is read once, in
//! [`ResolverConfig::from_env`], never during `resolve`.
//!
//! Precedence for the primary candidate:
//! 1. explicit per-call model string (`provider:model[:variant]`)
//! 2. session override `<task>ModelName`
//! 3. pinned provider: `FALLBACK_<PROVIDER>_<TASK>_MODEL` or that provider's
//!    built-in default for the task
//! 4. `DEFAULT_<TASK>_MODEL`
//! 5. built-in task default

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{AiError, Result};
use crate::llm::params::{DEFAULT_MAX_TOKENS, DEFAULT_THINKING_BUDGET_TOKENS};

use super::candidate::{ModelCandidate, ModelSpec, Provider};
use super::corrections::corrected_model_name;

/// Total entries in the candidate list when alternate providers are disabled.
pub const DEFAULT_REPEAT_ATTEMPTS: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentTask {
    Planner,
    Programmer,
    Reviewer,
    Router,
    Summarizer,
}

impl AgentTask {
    pub const ALL: [AgentTask; 5] = [
        AgentTask::Planner,
        AgentTask::Programmer,
        AgentTask::Reviewer,
        AgentTask::Router,
        AgentTask::Summarizer,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Planner => "planner",
            Self::Programmer => "programmer",
            Self::Reviewer => "reviewer",
            Self::Router => "router",
            Self::Summarizer => "summarizer",
        }
    }

    fn env_segment(&self) -> String {
        self.as_str().to_uppercase()
    }

    /// `DEFAULT_<TASK>_MODEL`
    pub fn default_model_env(&self) -> String {
        format!("DEFAULT_{}_MODEL", self.env_segment())
    }

    /// `FALLBACK_<PROVIDER>_<TASK>_MODEL`
    pub fn fallback_model_env(&self, provider: Provider) -> String {
        format!(
            "FALLBACK_{}_{}_MODEL",
            provider.env_segment(),
            self.env_segment()
        )
    }

    /// `<task>ModelName`
    pub fn session_model_key(&self) -> String {
        format!("{}ModelName", self.as_str())
    }

    /// `<task>Temperature`
    pub fn session_temperature_key(&self) -> String {
        format!("{}Temperature", self.as_str())
    }

    /// Built-in model when nothing else is configured.
    pub fn builtin_default(&self) -> (Provider, &'static str) {
        match self {
            Self::Planner => (Provider::OpenAI, "o3"),
            Self::Programmer | Self::Reviewer => (Provider::Anthropic, "claude-sonnet-4-5"),
            Self::Router | Self::Summarizer => (Provider::OpenAI, "gpt-4.1-mini"),
        }
    }

    /// Built-in model for this task on a specific provider.
    pub fn provider_default(&self, provider: Provider) -> &'static str {
        match (provider, self) {
            (Provider::OpenAI, Self::Planner) => "o3",
            (Provider::OpenAI, Self::Programmer | Self::Reviewer) => "gpt-4.1",
            (Provider::OpenAI, Self::Router | Self::Summarizer) => "gpt-4.1-mini",
            (Provider::Anthropic, Self::Planner) => "claude-opus-4-1",
            (Provider::Anthropic, Self::Programmer | Self::Reviewer) => "claude-sonnet-4-5",
            (Provider::Anthropic, Self::Router | Self::Summarizer) => "claude-3-5-haiku-latest",
            (Provider::DeepSeek, Self::Planner) => "deepseek-reasoner",
            (Provider::DeepSeek, _) => "deepseek-chat",
        }
    }
}

impl fmt::Display for AgentTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AgentTask {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let lower = s.trim().to_lowercase();
        Self::ALL
            .into_iter()
            .find(|task| task.as_str() == lower)
            .ok_or_else(|| {
                format!(
                    "unknown task '{s}' (expected one of: planner, programmer, reviewer, router, summarizer)"
                )
            })
    }
}

/// Input to a single resolution.
#[derive(Debug, Clone, PartialEq)]
pub struct TaskResolutionRequest {
    pub task: AgentTask,
    pub explicit_override: Option<String>,
    pub selected_provider: Option<Provider>,
}

impl TaskResolutionRequest {
    pub fn new(task: AgentTask) -> Self {
        Self {
            task,
            explicit_override: None,
            selected_provider: None,
        }
    }

    pub fn with_override(mut self, model: impl Into<String>) -> Self {
        self.explicit_override = Some(model.into());
        self
    }

    pub fn with_provider(mut self, provider: Provider) -> Self {
        self.selected_provider = Some(provider);
        self
    }
}

/// Snapshot of everything resolution depends on.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ResolverConfig {
    /// `DEFAULT_*_MODEL` / `FALLBACK_*_MODEL` variables.
    pub env: BTreeMap<String, String>,
    /// Per-session `<task>ModelName` / `<task>Temperature` values.
    pub session_overrides: BTreeMap<String, String>,
    /// Provider pinned for the whole session.
    pub pinned_provider: Option<Provider>,
    /// Append other providers' defaults instead of repeating the primary.
    pub fallback_enabled: bool,
    pub repeat_attempts: usize,
    pub default_max_tokens: u32,
    pub default_thinking_budget_tokens: u32,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            env: BTreeMap::new(),
            session_overrides: BTreeMap::new(),
            pinned_provider: None,
            fallback_enabled: false,
            repeat_attempts: DEFAULT_REPEAT_ATTEMPTS,
            default_max_tokens: DEFAULT_MAX_TOKENS,
            default_thinking_budget_tokens: DEFAULT_THINKING_BUDGET_TOKENS,
        }
    }
}

impl ResolverConfig {
    /// Capture the model-routing variables from the process environment.
    pub fn from_env() -> Self {
        Self::default().with_env_vars(std::env::vars())
    }

    /// Keep only variables that participate in routing.
    pub fn with_env_vars(mut self, vars: impl IntoIterator<Item = (String, String)>) -> Self {
        self.env.extend(vars.into_iter().filter(|(name, _)| {
            (name.starts_with("DEFAULT_") || name.starts_with("FALLBACK_")) && name.ends_with("_MODEL")
        }));
        self
    }

    pub fn with_env(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(name.into(), value.into());
        self
    }

    pub fn with_session_override(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.session_overrides.insert(key.into(), value.into());
        self
    }

    fn env_value(&self, name: &str) -> Option<&str> {
        self.env
            .get(name)
            .map(|v| v.trim())
            .filter(|v| !v.is_empty())
    }

    fn session_value(&self, key: &str) -> Option<&str> {
        self.session_overrides
            .get(key)
            .map(|v| v.trim())
            .filter(|v| !v.is_empty())
    }
}

/// Resolves task requests into ordered candidate lists.
#[derive(Debug, Clone, Default)]
pub struct ModelResolver {
    config: ResolverConfig,
}

impl ModelResolver {
    pub fn new(config: ResolverConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ResolverConfig {
        &self.config
    }

    /// Ordered candidate list; the first entry is the primary.
    pub fn resolve(&self, request: &TaskResolutionRequest) -> Result<Vec<ModelCandidate>> {
        let task = request.task;
        let primary = self.primary(request)?;

        let mut candidates = vec![primary.clone()];
        if self.config.fallback_enabled {
            for provider in Provider::ALL {
                if provider == primary.provider {
                    continue;
                }
                let candidate = self.provider_default(task, provider);
                if candidates
                    .iter()
                    .all(|c| c.model_key() != candidate.model_key())
                {
                    candidates.push(candidate);
                }
            }
        } else {
            let repeats = self.config.repeat_attempts.max(1);
            candidates.resize(repeats, primary);
        }

        debug!(
            task = %task,
            candidates = ?candidates.iter().map(ModelCandidate::model_key).collect::<Vec<_>>(),
            "Resolved model candidates"
        );
        Ok(candidates)
    }

    fn primary(&self, request: &TaskResolutionRequest) -> Result<ModelCandidate> {
        let task = request.task;

        if let Some(explicit) = request.explicit_override.as_deref() {
            return Ok(self.build(task, explicit.parse()?));
        }

        if let Some(session) = self.config.session_value(&task.session_model_key()) {
            return Ok(self.build(task, session.parse()?));
        }

        if let Some(provider) = request.selected_provider.or(self.config.pinned_provider) {
            return Ok(self.provider_default(task, provider));
        }

        let env_name = task.default_model_env();
        if let Some(value) = self.config.env_value(&env_name) {
            match value.parse::<ModelSpec>() {
                Ok(spec) => return Ok(self.build(task, spec)),
                Err(e) => warn!(variable = %env_name, error = %e, "Ignoring invalid model override"),
            }
        }

        let (provider, model_name) = task.builtin_default();
        Ok(self.build(
            task,
            ModelSpec {
                provider,
                model_name: model_name.to_string(),
                thinking: false,
            },
        ))
    }

    fn provider_default(&self, task: AgentTask, provider: Provider) -> ModelCandidate {
        let model_name = self
            .config
            .env_value(&task.fallback_model_env(provider))
            .unwrap_or_else(|| task.provider_default(provider));
        self.build(
            task,
            ModelSpec {
                provider,
                model_name: model_name.to_string(),
                thinking: false,
            },
        )
    }

    fn build(&self, task: AgentTask, spec: ModelSpec) -> ModelCandidate {
        let mut candidate = ModelCandidate::new(spec.provider, spec.model_name);

        if let Some(corrected) = corrected_model_name(candidate.provider, &candidate.model_name) {
            warn!(
                task = %task,
                from = %candidate.model_name,
                to = corrected,
                "Corrected deprecated model identifier"
            );
            candidate.corrected_from = Some(std::mem::replace(
                &mut candidate.model_name,
                corrected.to_string(),
            ));
        }

        candidate.temperature = Some(self.session_temperature(task).unwrap_or(0.0));
        candidate.max_tokens = Some(self.config.default_max_tokens);
        if spec.thinking {
            candidate.thinking_enabled = true;
            candidate.thinking_budget_tokens = Some(self.config.default_thinking_budget_tokens);
        }
        candidate
    }

    fn session_temperature(&self, task: AgentTask) -> Option<f32> {
        let key = task.session_temperature_key();
        let raw = self.config.session_value(&key)?;
        match raw.parse::<f32>() {
            Ok(t) if t.is_finite() && t >= 0.0 => Some(t),
            _ => {
                warn!(key = %key, value = raw, "Ignoring invalid temperature override");
                None
            }
        }
    }
}

impl From<AgentTask> for TaskResolutionRequest {
    fn from(task: AgentTask) -> Self {
        Self::new(task)
    }
}
