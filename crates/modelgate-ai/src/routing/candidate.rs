use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::AiError;

/// Variant suffix that turns on the reasoning budget.
pub const EXTENDED_THINKING_VARIANT: &str = "extended-thinking";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    #[serde(rename = "openai")]
    OpenAI,
    Anthropic,
    #[serde(rename = "deepseek")]
    DeepSeek,
}

impl Provider {
    pub const ALL: [Provider; 3] = [Provider::OpenAI, Provider::Anthropic, Provider::DeepSeek];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::OpenAI => "openai",
            Self::Anthropic => "anthropic",
            Self::DeepSeek => "deepseek",
        }
    }

    /// Segment used in environment variable names.
    pub fn env_segment(&self) -> &'static str {
        match self {
            Self::OpenAI => "OPENAI",
            Self::Anthropic => "ANTHROPIC",
            Self::DeepSeek => "DEEPSEEK",
        }
    }

    pub fn api_key_env(&self) -> &'static str {
        match self {
            Self::OpenAI => "OPENAI_API_KEY",
            Self::Anthropic => "ANTHROPIC_API_KEY",
            Self::DeepSeek => "DEEPSEEK_API_KEY",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            Self::OpenAI => "OpenAI",
            Self::Anthropic => "Anthropic",
            Self::DeepSeek => "DeepSeek",
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Provider {
    type Err = AiError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "openai" => Ok(Self::OpenAI),
            "anthropic" => Ok(Self::Anthropic),
            "deepseek" => Ok(Self::DeepSeek),
            other => Err(AiError::InvalidModel(format!("unknown provider '{other}'"))),
        }
    }
}

/// One concrete configuration eligible for an invocation attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelCandidate {
    pub provider: Provider,
    pub model_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    #[serde(default)]
    pub thinking_enabled: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thinking_budget_tokens: Option<u32>,
    /// Original identifier when the correction table rewrote the name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub corrected_from: Option<String>,
}

impl ModelCandidate {
    pub fn new(provider: Provider, model_name: impl Into<String>) -> Self {
        Self {
            provider,
            model_name: model_name.into(),
            temperature: None,
            max_tokens: None,
            thinking_enabled: false,
            thinking_budget_tokens: None,
            corrected_from: None,
        }
    }

    /// `provider:modelName`, the unit of identity for health tracking.
    pub fn model_key(&self) -> String {
        format!("{}:{}", self.provider, self.model_name)
    }
}

/// A parsed `provider:modelName[:variant]` string.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelSpec {
    pub provider: Provider,
    pub model_name: String,
    pub thinking: bool,
}

impl FromStr for ModelSpec {
    type Err = AiError;

    fn from_str(spec: &str) -> Result<Self, Self::Err> {
        let invalid = |reason: &str| AiError::InvalidModel(format!("'{spec}': {reason}"));

        let mut parts = spec.trim().splitn(3, ':');
        let provider = parts
            .next()
            .filter(|p| !p.is_empty())
            .ok_or_else(|| invalid("missing provider"))?;
        let model_name = parts
            .next()
            .map(str::trim)
            .filter(|m| !m.is_empty())
            .ok_or_else(|| invalid("expected provider:modelName"))?;
        let thinking = match parts.next().map(str::trim) {
            None => false,
            Some(EXTENDED_THINKING_VARIANT) => true,
            Some(other) => return Err(invalid(&format!("unknown variant '{other}'"))),
        };

        Ok(Self {
            provider: provider
                .parse()
                .map_err(|_| invalid(&format!("unknown provider '{provider}'")))?,
            model_name: model_name.to_string(),
            thinking,
        })
    }
}
