//! Provider parameter middleware.
//!
//! Each provider accepts a different subset of sampling parameters. Instead of
//! patching clients at call time, a candidate's parameters are pushed through
//! an ordered list of [`ParamTransform`]s before dispatch. Every transform is a
//! pure `(candidate, params) -> params` function and can be tested on its own.

use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::routing::{ModelCandidate, Provider};

pub const DEFAULT_TEMPERATURE: f32 = 0.0;
pub const DEFAULT_MAX_TOKENS: u32 = 10_000;
pub const DEFAULT_THINKING_BUDGET_TOKENS: u32 = 5_000;
/// Reasoning-class models reject anything but their native temperature.
pub const REASONING_TEMPERATURE: f32 = 1.0;
/// Nucleus value used in place of a zero temperature on Anthropic.
pub const ANTHROPIC_DETERMINISTIC_TOP_P: f32 = 0.1;
/// Output headroom kept above the thinking budget.
const THINKING_OUTPUT_HEADROOM: u32 = 1_024;

/// Normalized request parameters. `None` means "do not send".
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModelParams {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_completion_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thinking_budget_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parallel_tool_calls: Option<bool>,
}

/// A single parameter rewrite step.
pub trait ParamTransform: Send + Sync {
    fn name(&self) -> &'static str;

    fn apply(&self, candidate: &ModelCandidate, params: ModelParams) -> ModelParams;
}

/// Returns true for model names carrying a reasoning-class marker.
pub fn is_reasoning_model(model_name: &str) -> bool {
    let name = model_name.to_lowercase();
    name.starts_with("o1")
        || name.starts_with("o3")
        || name.starts_with("o4")
        || name.contains("gpt-5")
        || name.contains("reasoner")
}

/// Temperature and output bound from the candidate.
pub struct BaseSampling;

impl ParamTransform for BaseSampling {
    fn name(&self) -> &'static str {
        "base_sampling"
    }

    fn apply(&self, candidate: &ModelCandidate, mut params: ModelParams) -> ModelParams {
        params.temperature = Some(candidate.temperature.unwrap_or(DEFAULT_TEMPERATURE));
        params.max_tokens = Some(candidate.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS));
        params
    }
}

/// Fixed temperature for reasoning models; OpenAI additionally wants
/// `max_completion_tokens` instead of `max_tokens`.
pub struct ReasoningModel;

impl ParamTransform for ReasoningModel {
    fn name(&self) -> &'static str {
        "reasoning_model"
    }

    fn apply(&self, candidate: &ModelCandidate, mut params: ModelParams) -> ModelParams {
        if !is_reasoning_model(&candidate.model_name) {
            return params;
        }
        params.temperature = Some(REASONING_TEMPERATURE);
        params.top_p = None;
        if candidate.provider == Provider::OpenAI {
            params.max_completion_tokens = params.max_tokens.take().or(params.max_completion_tokens);
        }
        params
    }
}

/// Reasoning budget for thinking-enabled candidates. Sampling controls are
/// dropped because providers reject them alongside a budget.
pub struct ThinkingBudget;

impl ParamTransform for ThinkingBudget {
    fn name(&self) -> &'static str {
        "thinking_budget"
    }

    fn apply(&self, candidate: &ModelCandidate, mut params: ModelParams) -> ModelParams {
        if !candidate.thinking_enabled {
            return params;
        }
        let budget = candidate
            .thinking_budget_tokens
            .unwrap_or(DEFAULT_THINKING_BUDGET_TOKENS);
        params.thinking_budget_tokens = Some(budget);
        params.temperature = None;
        params.top_p = None;

        let floor = budget + THINKING_OUTPUT_HEADROOM;
        if candidate.provider == Provider::OpenAI {
            let current = params.max_completion_tokens.or(params.max_tokens.take());
            params.max_completion_tokens = Some(current.unwrap_or(floor).max(floor));
        } else {
            params.max_tokens = Some(params.max_tokens.unwrap_or(floor).max(floor));
        }
        params
    }
}

/// Anthropic rejects `temperature` and `top_p` together and rejects a
/// "default" nucleus value at zero temperature, so exactly one is sent.
pub struct AnthropicSampling;

impl ParamTransform for AnthropicSampling {
    fn name(&self) -> &'static str {
        "anthropic_sampling"
    }

    fn apply(&self, _candidate: &ModelCandidate, mut params: ModelParams) -> ModelParams {
        if params.thinking_budget_tokens.is_some() {
            return params;
        }
        match params.temperature {
            Some(t) if t <= 0.0 => {
                params.temperature = None;
                params.top_p = Some(ANTHROPIC_DETERMINISTIC_TOP_P);
            }
            Some(_) => params.top_p = None,
            None => {}
        }
        params
    }
}

/// Ordered transform chain applied before every provider call.
#[derive(Default)]
pub struct ParamPipeline {
    transforms: Vec<Box<dyn ParamTransform>>,
}

impl ParamPipeline {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, transform: impl ParamTransform + 'static) -> Self {
        self.transforms.push(Box::new(transform));
        self
    }

    /// The standard chain for a provider family.
    pub fn for_provider(provider: Provider) -> Self {
        let pipeline = Self::new()
            .with(BaseSampling)
            .with(ReasoningModel)
            .with(ThinkingBudget);
        match provider {
            Provider::Anthropic => pipeline.with(AnthropicSampling),
            Provider::OpenAI | Provider::DeepSeek => pipeline,
        }
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.transforms.iter().map(|t| t.name()).collect()
    }

    pub fn apply(&self, candidate: &ModelCandidate, params: ModelParams) -> ModelParams {
        self.transforms.iter().fold(params, |params, transform| {
            let next = transform.apply(candidate, params);
            trace!(transform = transform.name(), params = ?next, "Applied parameter transform");
            next
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidate(provider: Provider, model: &str) -> ModelCandidate {
        ModelCandidate::new(provider, model)
    }

    #[test]
    fn test_reasoning_markers() {
        assert!(is_reasoning_model("o3"));
        assert!(is_reasoning_model("o4-mini"));
        assert!(is_reasoning_model("gpt-5"));
        assert!(is_reasoning_model("deepseek-reasoner"));
        assert!(!is_reasoning_model("gpt-4.1"));
        assert!(!is_reasoning_model("claude-sonnet-4-5"));
    }

    #[test]
    fn test_plain_openai_model() {
        let params = ParamPipeline::for_provider(Provider::OpenAI)
            .apply(&candidate(Provider::OpenAI, "gpt-4.1"), ModelParams::default());
        assert_eq!(params.temperature, Some(0.0));
        assert_eq!(params.max_tokens, Some(DEFAULT_MAX_TOKENS));
        assert_eq!(params.max_completion_tokens, None);
        assert_eq!(params.top_p, None);
    }

    #[test]
    fn test_openai_reasoning_model_uses_completion_tokens() {
        let params = ParamPipeline::for_provider(Provider::OpenAI)
            .apply(&candidate(Provider::OpenAI, "o3"), ModelParams::default());
        assert_eq!(params.temperature, Some(REASONING_TEMPERATURE));
        assert_eq!(params.max_tokens, None);
        assert_eq!(params.max_completion_tokens, Some(DEFAULT_MAX_TOKENS));
    }

    #[test]
    fn test_deepseek_reasoner_keeps_max_tokens() {
        let params = ParamPipeline::for_provider(Provider::DeepSeek).apply(
            &candidate(Provider::DeepSeek, "deepseek-reasoner"),
            ModelParams::default(),
        );
        assert_eq!(params.temperature, Some(REASONING_TEMPERATURE));
        assert_eq!(params.max_tokens, Some(DEFAULT_MAX_TOKENS));
    }

    #[test]
    fn test_anthropic_zero_temperature_becomes_top_p() {
        let params = ParamPipeline::for_provider(Provider::Anthropic).apply(
            &candidate(Provider::Anthropic, "claude-sonnet-4-5"),
            ModelParams::default(),
        );
        assert_eq!(params.temperature, None);
        assert_eq!(params.top_p, Some(ANTHROPIC_DETERMINISTIC_TOP_P));
    }

    #[test]
    fn test_anthropic_positive_temperature_drops_top_p() {
        let mut c = candidate(Provider::Anthropic, "claude-sonnet-4-5");
        c.temperature = Some(0.7);
        let params = ParamPipeline::for_provider(Provider::Anthropic).apply(
            &c,
            ModelParams {
                top_p: Some(0.9),
                ..Default::default()
            },
        );
        assert_eq!(params.temperature, Some(0.7));
        assert_eq!(params.top_p, None);
    }

    #[test]
    fn test_anthropic_thinking_omits_sampling() {
        let mut c = candidate(Provider::Anthropic, "claude-sonnet-4-5");
        c.thinking_enabled = true;
        c.thinking_budget_tokens = Some(12_000);
        let params = ParamPipeline::for_provider(Provider::Anthropic).apply(&c, ModelParams::default());

        assert_eq!(params.thinking_budget_tokens, Some(12_000));
        assert_eq!(params.temperature, None);
        assert_eq!(params.top_p, None);
        assert_eq!(params.max_tokens, Some(12_000 + 1_024));
    }

    #[test]
    fn test_parallel_tool_calls_passes_through() {
        let params = ParamPipeline::for_provider(Provider::OpenAI).apply(
            &candidate(Provider::OpenAI, "gpt-4.1"),
            ModelParams {
                parallel_tool_calls: Some(false),
                ..Default::default()
            },
        );
        assert_eq!(params.parallel_tool_calls, Some(false));
    }

    #[test]
    fn test_pipeline_order() {
        assert_eq!(
            ParamPipeline::for_provider(Provider::Anthropic).names(),
            vec![
                "base_sampling",
                "reasoning_model",
                "thinking_budget",
                "anthropic_sampling"
            ]
        );
        assert_eq!(ParamPipeline::for_provider(Provider::DeepSeek).names().len(), 3);
    }
}
