//! Anthropic LLM provider

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::Result;
use crate::http_client::build_http_client;
use crate::llm::client::{
    CompletionRequest, CompletionResponse, FinishReason, LlmClient, Message, Role, TokenUsage,
    ToolCall,
};
use crate::llm::retry::{LlmRetryConfig, send_with_retry};

const DEFAULT_BASE_URL: &str = "https://api.anthropic.com/v1";
const ANTHROPIC_VERSION: &str = "2023-06-01";
/// Anthropic requires `max_tokens`; used when the request carries none.
const FALLBACK_MAX_TOKENS: u32 = 4096;

/// Anthropic client
pub struct AnthropicClient {
    client: Client,
    api_key: String,
    model: String,
    base_url: String,
    retry_config: LlmRetryConfig,
}

impl AnthropicClient {
    /// Create a new Anthropic client
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            client: build_http_client(),
            api_key: api_key.into(),
            model: "claude-sonnet-4-5".to_string(),
            base_url: DEFAULT_BASE_URL.to_string(),
            retry_config: LlmRetryConfig::default(),
        }
    }

    /// Set the model to use
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_retry_config(mut self, config: LlmRetryConfig) -> Self {
        self.retry_config = config;
        self
    }
}

#[derive(Serialize)]
struct AnthropicRequest {
    model: String,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
    messages: Vec<AnthropicMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<Vec<AnthropicTool>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_choice: Option<AnthropicToolChoice>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_p: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    thinking: Option<AnthropicThinking>,
}

#[derive(Serialize)]
struct AnthropicMessage {
    role: &'static str,
    content: AnthropicContent,
}

#[derive(Serialize)]
#[serde(untagged)]
enum AnthropicContent {
    Text(String),
    Blocks(Vec<AnthropicContentBlock>),
}

#[derive(Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum AnthropicContentBlock {
    Text {
        text: String,
    },
    ToolUse {
        id: String,
        name: String,
        input: Value,
    },
    ToolResult {
        tool_use_id: String,
        content: String,
    },
}

#[derive(Serialize)]
struct AnthropicTool {
    name: String,
    description: String,
    input_schema: Value,
}

#[derive(Serialize)]
struct AnthropicToolChoice {
    r#type: &'static str,
    disable_parallel_tool_use: bool,
}

#[derive(Serialize)]
struct AnthropicThinking {
    r#type: &'static str,
    budget_tokens: u32,
}

#[derive(Deserialize)]
struct AnthropicResponse {
    content: Vec<AnthropicResponseContent>,
    stop_reason: Option<String>,
    usage: AnthropicUsage,
}

#[derive(Deserialize)]
struct AnthropicResponseContent {
    r#type: String,
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    input: Option<Value>,
}

#[derive(Deserialize)]
struct AnthropicUsage {
    input_tokens: u32,
    output_tokens: u32,
}

fn to_anthropic_message(m: &Message) -> AnthropicMessage {
    match m.role {
        Role::Tool => AnthropicMessage {
            role: "user",
            content: AnthropicContent::Blocks(vec![AnthropicContentBlock::ToolResult {
                tool_use_id: m.tool_call_id.clone().unwrap_or_default(),
                content: m.content.clone(),
            }]),
        },
        Role::Assistant if !m.requested_tool_calls().is_empty() => {
            let mut blocks = Vec::new();
            if !m.content.is_empty() {
                blocks.push(AnthropicContentBlock::Text {
                    text: m.content.clone(),
                });
            }
            for tc in m.requested_tool_calls() {
                blocks.push(AnthropicContentBlock::ToolUse {
                    id: tc.id.clone(),
                    name: tc.name.clone(),
                    input: tc.arguments.clone(),
                });
            }
            AnthropicMessage {
                role: "assistant",
                content: AnthropicContent::Blocks(blocks),
            }
        }
        Role::Assistant => AnthropicMessage {
            role: "assistant",
            content: AnthropicContent::Text(m.content.clone()),
        },
        Role::User | Role::System => AnthropicMessage {
            role: "user",
            content: AnthropicContent::Text(m.content.clone()),
        },
    }
}

impl AnthropicClient {
    fn build_body(&self, request: &CompletionRequest) -> AnthropicRequest {
        let system_parts: Vec<&str> = request
            .messages
            .iter()
            .filter(|m| m.role == Role::System)
            .map(|m| m.content.as_str())
            .collect();
        let system = (!system_parts.is_empty()).then(|| system_parts.join("\n\n"));

        let messages = request
            .messages
            .iter()
            .filter(|m| m.role != Role::System)
            .map(to_anthropic_message)
            .collect();

        let tools: Option<Vec<AnthropicTool>> = if request.tools.is_empty() {
            None
        } else {
            Some(
                request
                    .tools
                    .iter()
                    .map(|t| AnthropicTool {
                        name: t.name.clone(),
                        description: t.description.clone(),
                        input_schema: t.parameters.clone(),
                    })
                    .collect(),
            )
        };

        let params = &request.params;
        let tool_choice = match (&tools, params.parallel_tool_calls) {
            (Some(_), Some(false)) => Some(AnthropicToolChoice {
                r#type: "auto",
                disable_parallel_tool_use: true,
            }),
            _ => None,
        };

        AnthropicRequest {
            model: self.model.clone(),
            max_tokens: params.max_tokens.unwrap_or(FALLBACK_MAX_TOKENS),
            system,
            messages,
            tools,
            tool_choice,
            temperature: params.temperature,
            top_p: params.top_p,
            thinking: params
                .thinking_budget_tokens
                .map(|budget_tokens| AnthropicThinking {
                    r#type: "enabled",
                    budget_tokens,
                }),
        }
    }
}

#[async_trait]
impl LlmClient for AnthropicClient {
    fn provider(&self) -> &str {
        "anthropic"
    }

    fn model(&self) -> &str {
        &self.model
    }

    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse> {
        let body = self.build_body(&request);
        let url = format!("{}/messages", self.base_url);

        let response = send_with_retry(&self.retry_config, "Anthropic", || {
            self.client
                .post(&url)
                .header("x-api-key", &self.api_key)
                .header("anthropic-version", ANTHROPIC_VERSION)
                .header("Content-Type", "application/json")
                .json(&body)
        })
        .await?;

        let data: AnthropicResponse = response.json().await?;

        let mut text_parts = Vec::new();
        let mut tool_calls = vec![];

        for block in data.content {
            match block.r#type.as_str() {
                "text" => text_parts.extend(block.text),
                "tool_use" => {
                    if let (Some(id), Some(name), Some(input)) = (block.id, block.name, block.input)
                    {
                        tool_calls.push(ToolCall {
                            id,
                            name,
                            arguments: input,
                        });
                    }
                }
                // Thinking blocks are not part of the visible turn.
                _ => {}
            }
        }

        let finish_reason = match data.stop_reason.as_deref() {
            Some("end_turn") => FinishReason::Stop,
            Some("tool_use") => FinishReason::ToolCalls,
            Some("max_tokens") => FinishReason::MaxTokens,
            _ => FinishReason::Stop,
        };

        Ok(CompletionResponse {
            content: (!text_parts.is_empty()).then(|| text_parts.join("")),
            tool_calls,
            finish_reason,
            usage: Some(TokenUsage {
                prompt_tokens: data.usage.input_tokens,
                completion_tokens: data.usage.output_tokens,
                total_tokens: data.usage.input_tokens + data.usage.output_tokens,
            }),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AiError;
    use crate::llm::client::ToolSchema;
    use crate::llm::params::ModelParams;
    use serde_json::json;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client_for(server: &MockServer) -> AnthropicClient {
        AnthropicClient::new("test-key")
            .with_model("claude-sonnet-4-5")
            .with_base_url(server.uri())
            .with_retry_config(LlmRetryConfig::disabled())
    }

    #[tokio::test]
    async fn test_complete_parses_text_and_tool_use() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/messages"))
            .and(header("x-api-key", "test-key"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "content": [
                    {"type": "thinking", "thinking": "hidden"},
                    {"type": "text", "text": "Reading the file."},
                    {"type": "tool_use", "id": "toolu_1", "name": "read_file", "input": {"path": "a.rs"}}
                ],
                "stop_reason": "tool_use",
                "usage": {"input_tokens": 10, "output_tokens": 5}
            })))
            .mount(&server)
            .await;

        let response = client_for(&server)
            .complete(CompletionRequest::new(vec![Message::user("go")]))
            .await
            .unwrap();

        assert_eq!(response.content.as_deref(), Some("Reading the file."));
        assert_eq!(response.finish_reason, FinishReason::ToolCalls);
        assert_eq!(response.tool_calls[0].id, "toolu_1");
        assert_eq!(response.usage.unwrap().total_tokens, 15);
    }

    #[tokio::test]
    async fn test_request_body_carries_normalized_params() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "content": [{"type": "text", "text": "ok"}],
                "stop_reason": "end_turn",
                "usage": {"input_tokens": 1, "output_tokens": 1}
            })))
            .mount(&server)
            .await;

        let request = CompletionRequest::new(vec![
            Message::system("be terse"),
            Message::user("hi"),
            Message::assistant_with_tool_calls(
                None,
                vec![ToolCall {
                    id: "t1".to_string(),
                    name: "ls".to_string(),
                    arguments: json!({}),
                }],
            ),
            Message::tool_result("t1", "a.rs"),
        ])
        .with_tools(vec![ToolSchema {
            name: "ls".to_string(),
            description: "List files".to_string(),
            parameters: json!({"type": "object"}),
        }])
        .with_params(ModelParams {
            top_p: Some(0.1),
            max_tokens: Some(2048),
            parallel_tool_calls: Some(false),
            ..Default::default()
        });

        client_for(&server).complete(request).await.unwrap();

        let received = server.received_requests().await.unwrap();
        let body: Value = serde_json::from_slice(&received[0].body).unwrap();
        assert_eq!(body["system"], "be terse");
        assert_eq!(body["max_tokens"], 2048);
        assert!(body.get("temperature").is_none());
        assert!((body["top_p"].as_f64().unwrap() - 0.1).abs() < 1e-6);
        assert_eq!(body["tool_choice"]["disable_parallel_tool_use"], true);
        assert_eq!(body["messages"][1]["content"][0]["type"], "tool_use");
        assert_eq!(body["messages"][2]["role"], "user");
        assert_eq!(body["messages"][2]["content"][0]["type"], "tool_result");
        assert_eq!(body["messages"][2]["content"][0]["tool_use_id"], "t1");
    }

    #[tokio::test]
    async fn test_thinking_budget_serialized() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "content": [{"type": "text", "text": "ok"}],
                "stop_reason": "end_turn",
                "usage": {"input_tokens": 1, "output_tokens": 1}
            })))
            .mount(&server)
            .await;

        let request = CompletionRequest::new(vec![Message::user("think")]).with_params(ModelParams {
            max_tokens: Some(6_024),
            thinking_budget_tokens: Some(5_000),
            ..Default::default()
        });
        client_for(&server).complete(request).await.unwrap();

        let received = server.received_requests().await.unwrap();
        let body: Value = serde_json::from_slice(&received[0].body).unwrap();
        assert_eq!(body["thinking"], json!({"type": "enabled", "budget_tokens": 5000}));
        assert!(body.get("top_p").is_none());
    }

    #[tokio::test]
    async fn test_error_status_becomes_llm_http() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(401).set_body_json(json!({
                "type": "error",
                "error": {"type": "authentication_error", "message": "invalid x-api-key"}
            })))
            .mount(&server)
            .await;

        let err = client_for(&server)
            .complete(CompletionRequest::new(vec![Message::user("hi")]))
            .await
            .unwrap_err();

        match err {
            AiError::LlmHttp {
                provider,
                status,
                message,
                ..
            } => {
                assert_eq!(provider, "Anthropic");
                assert_eq!(status, 401);
                assert!(message.contains("invalid x-api-key"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
