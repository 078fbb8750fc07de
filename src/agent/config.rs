//! Agent configuration.
//!
//! Every setting resolves in the order explicit value → environment
//! variable → default. The built [`AgentConfig`] is immutable and handed to
//! each stage explicitly; nothing reads the environment after startup.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::error::AgentError;

/// Default model for every stage.
const DEFAULT_MODEL: &str = "gpt-4o-mini";
/// Default provider.
const DEFAULT_PROVIDER: &str = "openai";
/// Default request timeout in seconds.
const DEFAULT_TIMEOUT_SECS: u64 = 120;
/// Default number of chunks retrieved per question.
const DEFAULT_RETRIEVAL_TOP_K: usize = 3;
/// Maximum query repairs after the first failed attempt.
pub const DEFAULT_REPAIR_LIMIT: u32 = 2;

/// An LM-backed stage with its own model settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    /// Strategy classification.
    Router,
    /// Query generation.
    Sql,
    /// Answer synthesis and its fallback.
    Synthesizer,
}

impl Stage {
    const ALL: [Self; 3] = [Self::Router, Self::Sql, Self::Synthesizer];

    const fn index(self) -> usize {
        match self {
            Self::Router => 0,
            Self::Sql => 1,
            Self::Synthesizer => 2,
        }
    }

    /// Environment variable overriding this stage's model.
    #[must_use]
    pub const fn model_env(self) -> &'static str {
        match self {
            Self::Router => "COPILOT_ROUTER_MODEL",
            Self::Sql => "COPILOT_SQL_MODEL",
            Self::Synthesizer => "COPILOT_SYNTHESIZER_MODEL",
        }
    }

    /// Default completion token cap.
    #[must_use]
    pub const fn default_max_tokens(self) -> u32 {
        match self {
            Self::Router => 256,
            Self::Sql => 1024,
            Self::Synthesizer => 1000,
        }
    }
}

/// Model settings of one stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageConfig {
    /// Model identifier.
    pub model: String,
    /// Completion token cap.
    pub max_tokens: u32,
}

/// Resolved configuration.
#[derive(Debug, Clone)]
pub struct AgentConfig {
    /// Provider name (`openai` or `ollama`).
    pub provider: String,
    /// API key for the provider.
    pub api_key: String,
    /// Optional base URL override (proxies, Ollama's `/v1` endpoint, ...).
    pub base_url: Option<String>,
    /// Per-request timeout.
    pub timeout: Duration,
    /// Chunks retrieved per question.
    pub retrieval_top_k: usize,
    /// Maximum repair iterations after a failed query.
    pub repair_limit: u32,
    /// Directory containing prompt template overrides.
    pub prompt_dir: Option<PathBuf>,
    stages: [StageConfig; 3],
}

impl AgentConfig {
    /// Creates a new builder.
    #[must_use]
    pub fn builder() -> AgentConfigBuilder {
        AgentConfigBuilder::default()
    }

    /// Builds configuration from the environment and defaults.
    ///
    /// # Errors
    ///
    /// Returns [`AgentError::ApiKeyMissing`] if no API key is found.
    pub fn from_env() -> Result<Self, AgentError> {
        Self::builder().from_env().build()
    }

    /// Settings of `stage`.
    #[must_use]
    pub const fn stage(&self, stage: Stage) -> &StageConfig {
        &self.stages[stage.index()]
    }
}

/// Builder for [`AgentConfig`].
#[derive(Debug, Clone, Default)]
pub struct AgentConfigBuilder {
    provider: Option<String>,
    api_key: Option<String>,
    base_url: Option<String>,
    models: [Option<String>; 3],
    max_tokens: [Option<u32>; 3],
    timeout: Option<Duration>,
    retrieval_top_k: Option<usize>,
    repair_limit: Option<u32>,
    prompt_dir: Option<PathBuf>,
}

/// First set, non-empty variable among `names`.
fn env_first(names: &[&str]) -> Option<String> {
    names
        .iter()
        .filter_map(|name| std::env::var(name).ok())
        .find(|value| !value.trim().is_empty())
}

/// Parsed value of `name`; unparsable values are ignored with a warning.
fn env_parse<T: FromStr>(name: &str) -> Option<T> {
    let raw = env_first(&[name])?;
    let parsed = raw.trim().parse().ok();
    if parsed.is_none() {
        tracing::warn!(variable = name, value = %raw, "ignoring unparsable setting");
    }
    parsed
}

impl AgentConfigBuilder {
    /// Fills every unset field from the environment.
    #[must_use]
    pub fn from_env(mut self) -> Self {
        self.provider = self.provider.or_else(|| env_first(&["COPILOT_PROVIDER"]));
        self.api_key = self
            .api_key
            .or_else(|| env_first(&["OPENAI_API_KEY", "COPILOT_API_KEY"]));
        self.base_url = self
            .base_url
            .or_else(|| env_first(&["OPENAI_BASE_URL", "COPILOT_BASE_URL"]));
        for stage in Stage::ALL {
            let slot = &mut self.models[stage.index()];
            if slot.is_none() {
                *slot = env_first(&[stage.model_env()]);
            }
        }
        self.timeout = self
            .timeout
            .or_else(|| env_parse("COPILOT_TIMEOUT_SECS").map(Duration::from_secs));
        self.retrieval_top_k = self.retrieval_top_k.or_else(|| env_parse("COPILOT_TOP_K"));
        self.prompt_dir = self
            .prompt_dir
            .or_else(|| env_first(&["COPILOT_PROMPT_DIR"]).map(PathBuf::from));
        self
    }

    /// Sets the provider name.
    #[must_use]
    pub fn provider(mut self, provider: impl Into<String>) -> Self {
        self.provider = Some(provider.into());
        self
    }

    /// Sets the API key.
    #[must_use]
    pub fn api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    /// Sets the base URL override.
    #[must_use]
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    /// Uses `model` for every stage.
    #[must_use]
    pub fn model(mut self, model: impl Into<String>) -> Self {
        let model = model.into();
        self.models = [Some(model.clone()), Some(model.clone()), Some(model)];
        self
    }

    /// Sets the model of one stage.
    #[must_use]
    pub fn stage_model(mut self, stage: Stage, model: impl Into<String>) -> Self {
        self.models[stage.index()] = Some(model.into());
        self
    }

    /// Sets the token cap of one stage.
    #[must_use]
    pub const fn stage_max_tokens(mut self, stage: Stage, n: u32) -> Self {
        self.max_tokens[stage.index()] = Some(n);
        self
    }

    /// Sets the request timeout.
    #[must_use]
    pub const fn timeout(mut self, duration: Duration) -> Self {
        self.timeout = Some(duration);
        self
    }

    /// Sets the number of chunks retrieved per question.
    #[must_use]
    pub const fn retrieval_top_k(mut self, n: usize) -> Self {
        self.retrieval_top_k = Some(n);
        self
    }

    /// Sets the repair limit.
    #[must_use]
    pub const fn repair_limit(mut self, n: u32) -> Self {
        self.repair_limit = Some(n);
        self
    }

    /// Sets the prompt template directory.
    #[must_use]
    pub fn prompt_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.prompt_dir = Some(dir.into());
        self
    }

    /// Builds the [`AgentConfig`].
    ///
    /// # Errors
    ///
    /// Returns [`AgentError::ApiKeyMissing`] if no API key was set and
    /// [`AgentError::InvalidConfig`] for a zero timeout or `top_k`.
    pub fn build(self) -> Result<AgentConfig, AgentError> {
        let api_key = self.api_key.ok_or(AgentError::ApiKeyMissing)?;

        let timeout = self
            .timeout
            .unwrap_or(Duration::from_secs(DEFAULT_TIMEOUT_SECS));
        if timeout.is_zero() {
            return Err(AgentError::InvalidConfig {
                message: "timeout must be positive".to_string(),
            });
        }
        let retrieval_top_k = self.retrieval_top_k.unwrap_or(DEFAULT_RETRIEVAL_TOP_K);
        if retrieval_top_k == 0 {
            return Err(AgentError::InvalidConfig {
                message: "retrieval top_k must be at least 1".to_string(),
            });
        }

        let [router, sql, synthesizer] = Stage::ALL.map(|stage| StageConfig {
            model: self.models[stage.index()]
                .clone()
                .unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            max_tokens: self.max_tokens[stage.index()].unwrap_or(stage.default_max_tokens()),
        });

        Ok(AgentConfig {
            provider: self
                .provider
                .unwrap_or_else(|| DEFAULT_PROVIDER.to_string()),
            api_key,
            base_url: self.base_url,
            timeout,
            retrieval_top_k,
            repair_limit: self.repair_limit.unwrap_or(DEFAULT_REPAIR_LIMIT),
            prompt_dir: self.prompt_dir,
            stages: [router, sql, synthesizer],
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_defaults() {
        let config = AgentConfig::builder()
            .api_key("test-key")
            .build()
            .unwrap_or_else(|_| unreachable!());
        assert_eq!(config.provider, "openai");
        assert_eq!(config.retrieval_top_k, 3);
        assert_eq!(config.repair_limit, 2);
        assert_eq!(config.timeout, Duration::from_secs(120));
        assert_eq!(config.stage(Stage::Router).model, DEFAULT_MODEL);
        assert_eq!(config.stage(Stage::Router).max_tokens, 256);
        assert_eq!(config.stage(Stage::Sql).max_tokens, 1024);
        assert_eq!(config.stage(Stage::Synthesizer).max_tokens, 1000);
    }

    #[test]
    fn test_builder_missing_api_key() {
        assert!(matches!(
            AgentConfig::builder().build(),
            Err(AgentError::ApiKeyMissing)
        ));
    }

    #[test]
    fn test_stage_overrides() {
        let config = AgentConfig::builder()
            .api_key("key")
            .model("phi3.5")
            .stage_model(Stage::Synthesizer, "llama3")
            .stage_max_tokens(Stage::Sql, 512)
            .retrieval_top_k(5)
            .repair_limit(1)
            .build()
            .unwrap_or_else(|_| unreachable!());
        assert_eq!(config.stage(Stage::Router).model, "phi3.5");
        assert_eq!(config.stage(Stage::Sql).model, "phi3.5");
        assert_eq!(config.stage(Stage::Sql).max_tokens, 512);
        assert_eq!(config.stage(Stage::Synthesizer).model, "llama3");
        assert_eq!(config.retrieval_top_k, 5);
        assert_eq!(config.repair_limit, 1);
    }

    #[test]
    fn test_rejects_zero_values() {
        let zero_k = AgentConfig::builder().api_key("k").retrieval_top_k(0).build();
        assert!(matches!(zero_k, Err(AgentError::InvalidConfig { .. })));

        let zero_timeout = AgentConfig::builder()
            .api_key("k")
            .timeout(Duration::ZERO)
            .build();
        assert!(matches!(zero_timeout, Err(AgentError::InvalidConfig { .. })));
    }

    #[test]
    fn test_explicit_wins_over_env() {
        // Explicit values are never replaced by from_env.
        let config = AgentConfig::builder()
            .api_key("explicit")
            .provider("ollama")
            .from_env()
            .build()
            .unwrap_or_else(|_| unreachable!());
        assert_eq!(config.api_key, "explicit");
        assert_eq!(config.provider, "ollama");
    }
}
