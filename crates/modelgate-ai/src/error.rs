//! Error types for the AI module

use thiserror::Error;

/// AI module error types
#[derive(Error, Debug)]
pub enum AiError {
    #[error("LLM error: {0}")]
    Llm(String),

    #[error("{provider} API error (HTTP {status}): {message}")]
    LlmHttp {
        provider: String,
        status: u16,
        message: String,
        retry_after_secs: Option<u64>,
    },

    #[error("{provider} request timed out after {timeout_ms}ms")]
    Timeout { provider: String, timeout_ms: u64 },

    #[error("Invalid model identifier: {0}")]
    InvalidModel(String),

    #[error("Invalid message format: {0}")]
    InvalidFormat(String),

    #[error(
        "Authentication failed for {model_key} while running the {task} task: {detail}. \
         Fix the API key configured for this provider and retry."
    )]
    Authentication {
        task: String,
        model_key: String,
        detail: String,
    },

    /// Provider rejected the request shape. `detail` is the provider's text.
    #[error("{detail}")]
    Configuration {
        task: String,
        model_key: String,
        detail: String,
    },

    #[error("All model candidates for the {task} task failed after {attempts} attempt(s): {last_error}")]
    Exhausted {
        task: String,
        attempts: usize,
        last_error: String,
    },

    #[error("Invocation of the {task} task was cancelled")]
    Cancelled { task: String },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl AiError {
    /// Whether the SDK layer should retry the same request.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::LlmHttp { status, .. } => {
                matches!(status, 408 | 429) || (500..=599).contains(status)
            }
            Self::Timeout { .. } => true,
            Self::Http(e) => e.is_timeout() || e.is_connect(),
            Self::Llm(message) => {
                let lower = message.to_lowercase();
                lower.contains("rate limit")
                    || lower.contains("timeout")
                    || lower.contains("timed out")
                    || lower.contains("overloaded")
            }
            _ => false,
        }
    }

    /// HTTP status reported by the provider, if any.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::LlmHttp { status, .. } => Some(*status),
            Self::Http(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }

    pub fn retry_after_secs(&self) -> Option<u64> {
        match self {
            Self::LlmHttp {
                retry_after_secs, ..
            } => *retry_after_secs,
            _ => None,
        }
    }
}

/// Result type alias for AI operations
pub type Result<T> = std::result::Result<T, AiError>;
