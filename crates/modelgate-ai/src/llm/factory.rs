//! LLM client factory for dynamic model creation

use std::collections::HashMap;
use std::sync::Arc;

use crate::error::{AiError, Result};
use crate::llm::retry::LlmRetryConfig;
use crate::llm::{AnthropicClient, LlmClient, OpenAIClient};
use crate::routing::{ModelCandidate, Provider};

const DEEPSEEK_BASE_URL: &str = "https://api.deepseek.com/v1";

/// Builds a client for one candidate. Injected into the orchestrator so tests
/// can substitute scripted clients.
pub trait LlmClientFactory: Send + Sync {
    fn create_client(&self, candidate: &ModelCandidate) -> Result<Arc<dyn LlmClient>>;
}

#[derive(Debug, Clone, Default)]
pub struct DefaultLlmClientFactory {
    api_keys: HashMap<Provider, String>,
    base_urls: HashMap<Provider, String>,
    retry_config: LlmRetryConfig,
}

impl DefaultLlmClientFactory {
    pub fn new(api_keys: HashMap<Provider, String>) -> Self {
        Self {
            api_keys,
            ..Self::default()
        }
    }

    /// Keys from `OPENAI_API_KEY`, `ANTHROPIC_API_KEY` and `DEEPSEEK_API_KEY`.
    pub fn from_env() -> Self {
        let api_keys = Provider::ALL
            .into_iter()
            .filter_map(|provider| {
                std::env::var(provider.api_key_env())
                    .ok()
                    .filter(|key| !key.trim().is_empty())
                    .map(|key| (provider, key))
            })
            .collect();
        Self::new(api_keys)
    }

    pub fn with_api_key(mut self, provider: Provider, key: impl Into<String>) -> Self {
        self.api_keys.insert(provider, key.into());
        self
    }

    pub fn with_base_url(mut self, provider: Provider, url: impl Into<String>) -> Self {
        self.base_urls.insert(provider, url.into());
        self
    }

    pub fn with_retry_config(mut self, config: LlmRetryConfig) -> Self {
        self.retry_config = config;
        self
    }

    pub fn has_api_key(&self, provider: Provider) -> bool {
        self.api_keys.contains_key(&provider)
    }

    fn api_key(&self, provider: Provider) -> Result<&str> {
        self.api_keys
            .get(&provider)
            .map(String::as_str)
            .ok_or_else(|| AiError::Llm(format!("{} API key is required", provider.display_name())))
    }
}

impl LlmClientFactory for DefaultLlmClientFactory {
    fn create_client(&self, candidate: &ModelCandidate) -> Result<Arc<dyn LlmClient>> {
        let key = self.api_key(candidate.provider)?;
        let base_url = self.base_urls.get(&candidate.provider);

        match candidate.provider {
            Provider::OpenAI => {
                let mut client = OpenAIClient::new(key)
                    .with_model(&candidate.model_name)
                    .with_retry_config(self.retry_config.clone());
                if let Some(url) = base_url {
                    client = client.with_base_url(url);
                }
                Ok(Arc::new(client))
            }
            Provider::Anthropic => {
                let mut client = AnthropicClient::new(key)
                    .with_model(&candidate.model_name)
                    .with_retry_config(self.retry_config.clone());
                if let Some(url) = base_url {
                    client = client.with_base_url(url);
                }
                Ok(Arc::new(client))
            }
            Provider::DeepSeek => {
                let client = OpenAIClient::new(key)
                    .with_model(&candidate.model_name)
                    .with_base_url(base_url.map(String::as_str).unwrap_or(DEEPSEEK_BASE_URL))
                    .with_provider_name("deepseek")
                    .with_retry_config(self.retry_config.clone());
                Ok(Arc::new(client))
            }
        }
    }
}
