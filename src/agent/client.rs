//! Provider selection.

use std::sync::Arc;

use crate::agent::config::AgentConfig;
use crate::agent::provider::LlmProvider;
use crate::agent::providers::OpenAiProvider;
use crate::error::AgentError;

/// Supported backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderKind {
    /// `OpenAI` or any compatible endpoint.
    OpenAi,
    /// Local Ollama through its `OpenAI`-compatible `/v1` endpoint.
    Ollama,
}

impl ProviderKind {
    /// Parses a configured provider name, ignoring case.
    ///
    /// # Errors
    ///
    /// Returns [`AgentError::UnsupportedProvider`] for unknown names.
    pub fn parse(name: &str) -> Result<Self, AgentError> {
        match name.trim().to_lowercase().as_str() {
            "openai" => Ok(Self::OpenAi),
            "ollama" => Ok(Self::Ollama),
            _ => Err(AgentError::UnsupportedProvider {
                name: name.to_string(),
            }),
        }
    }
}

/// Creates the provider named by [`AgentConfig::provider`].
///
/// Ollama shares the `OpenAI` client; without a base URL it will talk to
/// the public `OpenAI` endpoint, so a warning is logged.
///
/// # Errors
///
/// Returns [`AgentError::UnsupportedProvider`] for unknown provider names.
pub fn create_provider(config: &AgentConfig) -> Result<Arc<dyn LlmProvider>, AgentError> {
    let kind = ProviderKind::parse(&config.provider)?;
    if kind == ProviderKind::Ollama && config.base_url.is_none() {
        tracing::warn!("provider is ollama but no base URL is set");
    }
    Ok(Arc::new(OpenAiProvider::new(config)))
}
