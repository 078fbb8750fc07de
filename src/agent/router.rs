//! Router agent.
//!
//! Classifies a question into a [`Strategy`]. The model's label is
//! normalized before it reaches any branching logic.

use async_trait::async_trait;

use super::config::{AgentConfig, Stage};
use super::prompt::build_router_prompt;
use super::provider::LlmProvider;
use super::signature::ROUTER;
use super::traits::{Agent, AgentResponse};
use crate::core::Strategy;
use crate::error::AgentError;

/// A normalized routing decision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteDecision {
    /// Strategy to follow.
    pub strategy: Strategy,
    /// The model's stated reasoning, if any.
    pub reasoning: String,
    /// False when the label was unrecognized and the default was used.
    pub recognized: bool,
}

/// Agent that picks the answering strategy for a question.
pub struct RouterAgent {
    model: String,
    max_tokens: u32,
    system_prompt: String,
}

impl RouterAgent {
    /// Creates a new router agent with the given configuration and system prompt.
    #[must_use]
    pub fn new(config: &AgentConfig, system_prompt: String) -> Self {
        Self {
            model: config.stage(Stage::Router).model.clone(),
            max_tokens: config.stage(Stage::Router).max_tokens,
            system_prompt,
        }
    }

    /// Classifies `question`.
    ///
    /// # Errors
    ///
    /// Returns [`AgentError`] only when the provider call fails; malformed
    /// replies fall back to [`Strategy::Hybrid`].
    pub async fn classify(
        &self,
        provider: &dyn LlmProvider,
        question: &str,
    ) -> Result<(RouteDecision, AgentResponse), AgentError> {
        let response = self.execute(provider, &build_router_prompt(question)).await?;
        let decision = Self::parse_decision(&response.content);
        Ok((decision, response))
    }

    /// Normalizes the reply. A reply without a `route` field is treated as
    /// the bare label.
    fn parse_decision(content: &str) -> RouteDecision {
        let prediction = ROUTER.parse(content, &[]).unwrap_or_default();
        let label = prediction.get("route").unwrap_or(content);
        let parsed = Strategy::parse(label);

        RouteDecision {
            strategy: parsed.unwrap_or_default(),
            reasoning: prediction.get("reasoning").unwrap_or_default().to_string(),
            recognized: parsed.is_some(),
        }
    }
}

#[async_trait]
impl Agent for RouterAgent {
    fn name(&self) -> &'static str {
        "router"
    }

    fn model(&self) -> &str {
        &self.model
    }

    fn system_prompt(&self) -> &str {
        &self.system_prompt
    }

    fn json_mode(&self) -> bool {
        true
    }

    fn max_tokens(&self) -> u32 {
        self.max_tokens
    }
}
