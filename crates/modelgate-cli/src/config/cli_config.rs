//! CLI configuration file support
//!
//! Loads configuration from ~/.config/modelgate/config.toml

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use modelgate_ai::{CircuitBreakerConfig, CompactionConfig, Provider};
use modelgate_state::StateConfig;
use serde::{Deserialize, Serialize};
use tracing::warn;

/// CLI configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CliConfig {
    #[serde(default)]
    pub breaker: CircuitBreakerConfig,
    #[serde(default)]
    pub compaction: CompactionConfig,
    #[serde(default)]
    pub state: StateConfig,
    #[serde(default)]
    pub api_keys: ApiKeysConfig,
    #[serde(default)]
    pub routing: RoutingConfig,
}

/// API key configuration. Environment variables win over the file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ApiKeysConfig {
    pub anthropic: Option<String>,
    pub openai: Option<String>,
    pub deepseek: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RoutingConfig {
    /// Try other providers' defaults instead of repeating the primary
    pub fallback_enabled: bool,
    pub pinned_provider: Option<Provider>,
}

impl CliConfig {
    /// Load configuration from `path`, or the default location
    pub fn load(path: Option<&Path>) -> Self {
        match path {
            Some(path) => Self::load_from_path(Some(path.to_path_buf())),
            None => Self::load_from_path(Self::default_path()),
        }
    }

    /// Load configuration from a specific path. A missing or unreadable file
    /// yields defaults.
    pub fn load_from_path(path: Option<PathBuf>) -> Self {
        let Some(path) = path else {
            return Self::default();
        };

        if !path.exists() {
            return Self::default();
        }

        match std::fs::read_to_string(&path) {
            Ok(content) => toml::from_str(&content).unwrap_or_else(|e| {
                warn!(path = %path.display(), error = %e, "Ignoring invalid config file");
                Self::default()
            }),
            Err(_) => Self::default(),
        }
    }

    /// Get the default configuration file path
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("modelgate").join("config.toml"))
    }

    /// Provider keys: `<PROVIDER>_API_KEY` first, then the file.
    pub fn api_keys(&self) -> HashMap<Provider, String> {
        Provider::ALL
            .into_iter()
            .filter_map(|provider| {
                let from_file = match provider {
                    Provider::Anthropic => self.api_keys.anthropic.as_ref(),
                    Provider::OpenAI => self.api_keys.openai.as_ref(),
                    Provider::DeepSeek => self.api_keys.deepseek.as_ref(),
                };
                std::env::var(provider.api_key_env())
                    .ok()
                    .or_else(|| from_file.cloned())
                    .filter(|key| !key.trim().is_empty())
                    .map(|key| (provider, key))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_full_config() {
        let config: CliConfig = toml::from_str(
            r#"
            [breaker]
            failure_threshold = 3
            timeout_ms = 60000

            [compaction]
            token_ceiling = 50000

            [state]
            redis_url = "redis://127.0.0.1:6379"

            [api_keys]
            deepseek = "sk-ds"

            [routing]
            fallback_enabled = true
            pinned_provider = "anthropic"
            "#,
        )
        .unwrap();

        assert_eq!(config.breaker.failure_threshold, 3);
        assert_eq!(config.breaker.key_prefix, "circuit_breaker");
        assert_eq!(config.compaction.token_ceiling, 50_000);
        assert_eq!(config.compaction.preserve_recent, 20);
        assert_eq!(config.state.redis_url.as_deref(), Some("redis://127.0.0.1:6379"));
        assert_eq!(config.state.operation_timeout_ms, 2_000);
        assert!(config.routing.fallback_enabled);
        assert_eq!(config.routing.pinned_provider, Some(Provider::Anthropic));
    }

    #[test]
    fn test_missing_file_yields_defaults() {
        let config = CliConfig::load_from_path(Some(PathBuf::from("/nonexistent/modelgate.toml")));
        assert_eq!(config.compaction.token_ceiling, 80_000);
        assert!(!config.routing.fallback_enabled);
    }
}
