//! Query generator agent.
//!
//! Produces SQLite text from the question, the schema description and the
//! planner's constraints. On repair, the previous execution error is fed
//! back through the prompt.

use async_trait::async_trait;

use super::config::{AgentConfig, Stage};
use super::prompt::build_sql_prompt;
use super::provider::LlmProvider;
use super::signature::{NL2SQL, strip_fences};
use super::traits::{Agent, AgentResponse};
use crate::error::AgentError;

/// Generated query text with the model's explanation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedQuery {
    /// Query text, fences removed and trimmed. Never empty.
    pub sql: String,
    /// Model explanation of the query logic.
    pub explanation: String,
}

/// Agent that writes the database query.
pub struct SqlGeneratorAgent {
    model: String,
    max_tokens: u32,
    system_prompt: String,
}

impl SqlGeneratorAgent {
    /// Creates a new query generator agent.
    #[must_use]
    pub fn new(config: &AgentConfig, system_prompt: String) -> Self {
        Self {
            model: config.stage(Stage::Sql).model.clone(),
            max_tokens: config.stage(Stage::Sql).max_tokens,
            system_prompt,
        }
    }

    /// Generates a query. `error_feedback` is `None` on the first attempt.
    ///
    /// # Errors
    ///
    /// Returns [`AgentError::EmptyQuery`] when nothing is left after
    /// cleanup, or the provider's error.
    pub async fn generate(
        &self,
        provider: &dyn LlmProvider,
        question: &str,
        schema: &str,
        constraints: &str,
        error_feedback: Option<&str>,
    ) -> Result<(GeneratedQuery, AgentResponse), AgentError> {
        let prompt = build_sql_prompt(question, schema, constraints, error_feedback);
        let response = self.execute(provider, &prompt).await?;
        let query = Self::parse_query(&response.content)?;
        Ok((query, response))
    }

    /// Extracts the query from a reply. A reply without a `sql` field is
    /// taken to be the query itself.
    fn parse_query(content: &str) -> Result<GeneratedQuery, AgentError> {
        let prediction = NL2SQL.parse(content, &[]).unwrap_or_default();
        let raw = prediction.get("sql").unwrap_or(content);
        let sql = clean_sql(raw);
        if sql.is_empty() {
            return Err(AgentError::EmptyQuery);
        }
        Ok(GeneratedQuery {
            sql,
            explanation: prediction.get("explanation").unwrap_or_default().to_string(),
        })
    }
}

/// Drops code fence lines and surrounding whitespace.
#[must_use]
pub fn clean_sql(raw: &str) -> String {
    strip_fences(raw)
}

#[async_trait]
impl Agent for SqlGeneratorAgent {
    fn name(&self) -> &'static str {
        "sql_generator"
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
