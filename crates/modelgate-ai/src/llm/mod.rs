//! LLM module - Multi-provider LLM client abstraction

mod anthropic;
mod client;
mod factory;
pub mod ingest;
mod mock_client;
pub mod params;
pub mod retry;
mod openai;

pub use anthropic::AnthropicClient;
pub use client::{
    CompletionRequest, CompletionResponse, FinishReason, LlmClient, Message, Role, TokenUsage,
    ToolCall, ToolSchema,
};
pub use factory::{DefaultLlmClientFactory, LlmClientFactory};
pub use mock_client::{MockLlmClient, MockLlmClientFactory, MockStep, MockStepKind};
pub use openai::OpenAIClient;
pub use params::{ModelParams, ParamPipeline, ParamTransform};
pub use retry::LlmRetryConfig;
