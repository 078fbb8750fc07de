//! `OpenAI`-compatible provider on top of `async-openai`.
//!
//! Works against `OpenAI` itself and anything speaking the same chat
//! completions API (Azure, local proxies, Ollama's `/v1` endpoint) through
//! [`AgentConfig::base_url`].

use std::time::Duration;

use async_openai::Client;
use async_openai::config::OpenAIConfig;
use async_openai::error::OpenAIError;
use async_openai::types::{
    ChatCompletionRequestMessage, ChatCompletionRequestSystemMessage,
    ChatCompletionRequestSystemMessageContent, ChatCompletionRequestUserMessage,
    ChatCompletionRequestUserMessageContent, CompletionUsage, CreateChatCompletionRequest,
    CreateChatCompletionResponse, ResponseFormat,
};
use async_trait::async_trait;

use crate::agent::config::AgentConfig;
use crate::agent::message::{ChatMessage, ChatRequest, ChatResponse, Role, TokenUsage};
use crate::agent::provider::LlmProvider;
use crate::error::AgentError;

/// Chat completions client with a per-call deadline.
pub struct OpenAiProvider {
    client: Client<OpenAIConfig>,
    timeout: Duration,
}

impl OpenAiProvider {
    /// Builds a client from the API key and optional base URL.
    #[must_use]
    pub fn new(config: &AgentConfig) -> Self {
        let base = OpenAIConfig::new().with_api_key(&config.api_key);
        let openai_config = match config.base_url.as_deref() {
            Some(url) => base.with_api_base(url),
            None => base,
        };

        Self {
            client: Client::with_config(openai_config),
            timeout: config.timeout,
        }
    }
}

impl std::fmt::Debug for OpenAiProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiProvider")
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl LlmProvider for OpenAiProvider {
    fn name(&self) -> &'static str {
        "openai"
    }

    async fn chat(&self, request: &ChatRequest) -> Result<ChatResponse, AgentError> {
        let chat = self.client.chat();
        let call = chat.create(to_openai_request(request));
        let response = tokio::time::timeout(self.timeout, call)
            .await
            .map_err(|_| AgentError::Timeout {
                secs: self.timeout.as_secs(),
            })?
            .map_err(api_error)?;

        Ok(from_openai_response(response))
    }
}

fn to_openai_message(message: &ChatMessage) -> ChatCompletionRequestMessage {
    let text = message.content.clone();
    match message.role {
        Role::System => {
            ChatCompletionRequestMessage::System(ChatCompletionRequestSystemMessage {
                content: ChatCompletionRequestSystemMessageContent::Text(text),
                name: None,
            })
        }
        Role::User => ChatCompletionRequestMessage::User(ChatCompletionRequestUserMessage {
            content: ChatCompletionRequestUserMessageContent::Text(text),
            name: None,
        }),
    }
}

/// Zero temperature is sent unset.
fn to_openai_request(request: &ChatRequest) -> CreateChatCompletionRequest {
    CreateChatCompletionRequest {
        model: request.model.clone(),
        messages: request.messages.iter().map(to_openai_message).collect(),
        temperature: request.temperature.filter(|&t| t > 0.0),
        max_completion_tokens: request.max_tokens,
        response_format: request.json_mode.then_some(ResponseFormat::JsonObject),
        ..Default::default()
    }
}

fn from_openai_response(response: CreateChatCompletionResponse) -> ChatResponse {
    let usage = response.usage.map_or_else(TokenUsage::default, to_usage);
    let Some(choice) = response.choices.into_iter().next() else {
        return ChatResponse {
            content: String::new(),
            usage,
            finish_reason: None,
        };
    };

    ChatResponse {
        content: choice.message.content.unwrap_or_default(),
        usage,
        finish_reason: choice
            .finish_reason
            .map(|reason| format!("{reason:?}").to_lowercase()),
    }
}

fn to_usage(usage: CompletionUsage) -> TokenUsage {
    TokenUsage {
        prompt_tokens: usage.prompt_tokens,
        completion_tokens: usage.completion_tokens,
        total_tokens: usage.total_tokens,
    }
}

fn api_error(error: OpenAIError) -> AgentError {
    let status = match &error {
        OpenAIError::Reqwest(e) => e.status().map(|s| s.as_u16()),
        _ => None,
    };
    AgentError::ApiRequest {
        message: error.to_string(),
        status,
    }
}
