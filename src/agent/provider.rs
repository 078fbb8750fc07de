//! The LM collaborator seam.
//!
//! Stages never talk to an SDK directly; they hand a [`ChatRequest`] to an
//! [`LlmProvider`]. Tests substitute scripted providers here.

use async_trait::async_trait;

use super::message::{ChatRequest, ChatResponse};
use crate::error::AgentError;

/// A chat completion backend.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Short backend name for logs.
    fn name(&self) -> &'static str;

    /// Sends one request and returns the reply.
    ///
    /// # Errors
    ///
    /// Returns [`AgentError::ApiRequest`] or [`AgentError::Timeout`] when
    /// the backend fails or does not answer in time.
    async fn chat(&self, request: &ChatRequest) -> Result<ChatResponse, AgentError>;
}
