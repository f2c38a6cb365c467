use std::time::Duration;

use reqwest::{RequestBuilder, Response};
use tracing::warn;

use crate::error::{AiError, Result};

/// Error bodies longer than this are cut before they reach logs or callers.
const MAX_ERROR_BODY: usize = 512;

#[derive(Debug, Clone)]
pub struct LlmRetryConfig {
    pub max_retries: u32,
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
    pub backoff_multiplier: f64,
}

impl Default for LlmRetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay_ms: 200,
            max_delay_ms: 5_000,
            backoff_multiplier: 2.0,
        }
    }
}

impl LlmRetryConfig {
    /// No SDK-level retries; every failure goes straight to the caller.
    pub fn disabled() -> Self {
        Self {
            max_retries: 0,
            ..Self::default()
        }
    }

    pub fn delay_for(&self, attempt: u32, retry_after_secs: Option<u64>) -> Duration {
        if let Some(seconds) = retry_after_secs {
            let requested = seconds.saturating_mul(1_000);
            return Duration::from_millis(requested.min(self.max_delay_ms));
        }

        let multiplier = self
            .backoff_multiplier
            .powi(attempt.saturating_sub(1) as i32);
        let delay = (self.initial_delay_ms as f64 * multiplier) as u64;
        Duration::from_millis(delay.min(self.max_delay_ms))
    }
}

pub fn parse_retry_after(response: &Response) -> Option<u64> {
    response
        .headers()
        .get("retry-after")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.trim().parse::<u64>().ok())
}

pub async fn response_to_error(response: Response, provider: &str) -> AiError {
    let status = response.status().as_u16();
    let retry_after = parse_retry_after(&response);
    let body = response.text().await.unwrap_or_default();

    AiError::LlmHttp {
        provider: provider.to_string(),
        status,
        message: truncate_body(body),
        retry_after_secs: retry_after,
    }
}

fn truncate_body(body: String) -> String {
    if body.len() <= MAX_ERROR_BODY {
        return body;
    }
    let mut end = MAX_ERROR_BODY;
    while end > 0 && !body.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}... [truncated]", &body[..end])
}

/// Send a request, retrying retryable failures with backoff.
///
/// `build` is called once per attempt because a `RequestBuilder` is consumed
/// by `send`.
pub async fn send_with_retry<F>(
    config: &LlmRetryConfig,
    provider: &str,
    mut build: F,
) -> Result<Response>
where
    F: FnMut() -> RequestBuilder,
{
    let mut attempt = 0;
    loop {
        let error = match build().send().await {
            Ok(response) if response.status().is_success() => return Ok(response),
            Ok(response) => response_to_error(response, provider).await,
            Err(e) => AiError::Http(e),
        };

        if !error.is_retryable() || attempt >= config.max_retries {
            return Err(error);
        }

        attempt += 1;
        let delay = config.delay_for(attempt, error.retry_after_secs());
        warn!(
            provider,
            attempt,
            delay_ms = delay.as_millis() as u64,
            error = %error,
            "Retrying LLM request"
        );
        tokio::time::sleep(delay).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::method;
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn test_delay_progression() {
        let config = LlmRetryConfig::default();
        assert_eq!(config.delay_for(1, None), Duration::from_millis(200));
        assert_eq!(config.delay_for(2, None), Duration::from_millis(400));
        assert_eq!(config.delay_for(3, None), Duration::from_millis(800));
        assert_eq!(config.delay_for(6, None), Duration::from_millis(5000));
    }

    #[test]
    fn test_retry_after_overrides_backoff() {
        let config = LlmRetryConfig::default();
        assert_eq!(config.delay_for(1, Some(2)), Duration::from_secs(2));
    }

    #[test]
    fn test_retry_after_is_capped_by_max_delay() {
        let config = LlmRetryConfig::default();
        assert_eq!(config.delay_for(1, Some(3600)), Duration::from_millis(5_000));
        assert_eq!(config.delay_for(1, Some(u64::MAX)), Duration::from_millis(5_000));
    }

    #[test]
    fn test_truncate_body_respects_char_boundaries() {
        let body = "é".repeat(400);
        let truncated = truncate_body(body);
        assert!(truncated.ends_with("... [truncated]"));
        assert!(truncated.len() <= MAX_ERROR_BODY + "... [truncated]".len());
    }

    #[tokio::test]
    async fn test_send_with_retry_recovers_from_server_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503))
            .up_to_n_times(2)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_string("ok"))
            .mount(&server)
            .await;

        let config = LlmRetryConfig {
            initial_delay_ms: 1,
            ..LlmRetryConfig::default()
        };
        let client = crate::http_client::build_http_client();
        let url = server.uri();
        let response = send_with_retry(&config, "Test", || client.post(&url))
            .await
            .unwrap();
        assert_eq!(response.status().as_u16(), 200);
        assert_eq!(server.received_requests().await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_send_with_retry_gives_up_after_max_retries() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(429).insert_header("retry-after", "0"))
            .mount(&server)
            .await;

        let client = crate::http_client::build_http_client();
        let url = server.uri();
        let err = send_with_retry(&LlmRetryConfig::default(), "Test", || client.post(&url))
            .await
            .unwrap_err();
        assert_eq!(err.status(), Some(429));
        assert_eq!(server.received_requests().await.unwrap().len(), 4);
    }

    #[tokio::test]
    async fn test_send_with_retry_does_not_retry_client_errors() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(401).set_body_string("invalid x-api-key"))
            .mount(&server)
            .await;

        let client = crate::http_client::build_http_client();
        let url = server.uri();
        let err = send_with_retry(&LlmRetryConfig::default(), "Anthropic", || client.post(&url))
            .await
            .unwrap_err();
        assert!(matches!(err, AiError::LlmHttp { status: 401, .. }));
        assert_eq!(server.received_requests().await.unwrap().len(), 1);
    }
}
