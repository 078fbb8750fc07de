//! The [`Agent`] trait shared by every LM-backed stage.
//!
//! An agent is a fixed system prompt plus sampling settings. The router,
//! query generator and both synthesizers implement it and only override
//! what differs from the defaults.

use async_trait::async_trait;

use super::message::{ChatRequest, ChatResponse, TokenUsage};
use super::provider::LlmProvider;
use crate::error::AgentError;

/// Raw reply of one agent call.
#[derive(Debug, Clone)]
pub struct AgentResponse {
    /// Agent that produced the reply.
    pub agent: &'static str,
    /// Reply text.
    pub content: String,
    /// Tokens used.
    pub usage: TokenUsage,
    /// Whether the reply hit the token cap.
    pub truncated: bool,
}

impl AgentResponse {
    fn from_chat(agent: &'static str, response: ChatResponse) -> Self {
        Self {
            agent,
            truncated: response.truncated(),
            content: response.content,
            usage: response.usage,
        }
    }
}

/// An LM-backed stage.
#[async_trait]
pub trait Agent: Send + Sync {
    /// Stage name used in logs.
    fn name(&self) -> &'static str;

    /// Model identifier.
    fn model(&self) -> &str;

    /// Stage instructions.
    fn system_prompt(&self) -> &str;

    /// Whether to ask for a JSON object reply.
    fn json_mode(&self) -> bool {
        false
    }

    /// Sampling temperature.
    fn temperature(&self) -> f32 {
        0.0
    }

    /// Completion token cap.
    fn max_tokens(&self) -> u32 {
        1024
    }

    /// Builds the request for `user_msg`.
    fn request(&self, user_msg: &str) -> ChatRequest {
        ChatRequest::new(self.model(), self.system_prompt(), user_msg)
            .with_temperature(self.temperature())
            .with_max_tokens(self.max_tokens())
            .with_json(self.json_mode())
    }

    /// Sends `user_msg` to the provider.
    ///
    /// # Errors
    ///
    /// Propagates provider failures unchanged.
    async fn execute(
        &self,
        provider: &dyn LlmProvider,
        user_msg: &str,
    ) -> Result<AgentResponse, AgentError> {
        let request = self.request(user_msg);
        tracing::debug!(
            agent = self.name(),
            model = %request.model,
            prompt_chars = request.prompt_chars(),
            "calling model"
        );

        let response = AgentResponse::from_chat(self.name(), provider.chat(&request).await?);
        if response.truncated {
            tracing::warn!(
                agent = self.name(),
                max_tokens = self.max_tokens(),
                "reply truncated at token cap"
            );
        }
        tracing::debug!(
            agent = self.name(),
            tokens = response.usage.total_tokens,
            "model replied"
        );
        Ok(response)
    }
}
