//! Failure classification at the orchestrator boundary.
//!
//! Every provider error is sorted into exactly one [`FailureClass`] here,
//! from its raw shape. Credential problems win over everything else: an
//! auth signature in the text or a 401/403 is Authentication whatever the
//! status range says. Then status ranges, then configuration signatures.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::AiError;
use crate::llm::Message;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureClass {
    /// Credentials invalid or missing. Fatal for the whole invocation.
    Authentication,
    /// Request shape rejected by the provider. Fatal for this candidate.
    Configuration,
    /// Anything else. Counted against the breaker, next candidate is tried.
    Transient,
}

/// Result of one attempt.
#[derive(Debug, Clone)]
pub enum InvocationOutcome {
    Success { message: Message },
    Fatal { kind: FailureClass, detail: String },
    Retryable { detail: String },
}

impl InvocationOutcome {
    /// Classify a failed attempt. Configuration failures keep the
    /// provider's own text so it can be surfaced verbatim.
    pub fn from_error(error: &AiError) -> Self {
        match classify(error) {
            FailureClass::Transient => Self::Retryable {
                detail: error.to_string(),
            },
            FailureClass::Configuration => Self::Fatal {
                kind: FailureClass::Configuration,
                detail: provider_text(error),
            },
            FailureClass::Authentication => Self::Fatal {
                kind: FailureClass::Authentication,
                detail: error.to_string(),
            },
        }
    }
}

fn provider_text(error: &AiError) -> String {
    match error {
        AiError::LlmHttp { message, .. } if !message.is_empty() => message.clone(),
        AiError::Llm(message) => message.clone(),
        AiError::Configuration { detail, .. } => detail.clone(),
        other => other.to_string(),
    }
}

static AUTH_SIGNATURES: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)(api[ _-]?key|authentication|unauthori[sz]ed|invalid x-api-key|permission denied|incorrect api key)",
    )
    .expect("auth signature regex is valid")
});

static CONFIG_SIGNATURES: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)(invalid_request_error|validation error|unsupported (parameter|value)|invalid parameter|is not supported|does not support|cannot both be specified)",
    )
    .expect("config signature regex is valid")
});

pub fn classify(error: &AiError) -> FailureClass {
    match error {
        AiError::Authentication { .. } => return FailureClass::Authentication,
        AiError::Configuration { .. } | AiError::InvalidModel(_) | AiError::InvalidFormat(_) => {
            return FailureClass::Configuration;
        }
        AiError::Timeout { .. } => return FailureClass::Transient,
        AiError::Http(e) if e.is_timeout() || e.is_connect() => return FailureClass::Transient,
        _ => {}
    }

    let text = error.to_string();
    let status = error.status();
    if AUTH_SIGNATURES.is_match(&text) || matches!(status, Some(401 | 403)) {
        return FailureClass::Authentication;
    }

    match status {
        Some(408 | 429 | 500..=599) => FailureClass::Transient,
        Some(400 | 404 | 422) => FailureClass::Configuration,
        _ => classify_text(&text),
    }
}

/// Signature match on free-form error text.
pub fn classify_text(text: &str) -> FailureClass {
    if AUTH_SIGNATURES.is_match(text) {
        FailureClass::Authentication
    } else if CONFIG_SIGNATURES.is_match(text) {
        FailureClass::Configuration
    } else {
        FailureClass::Transient
    }
}
