//! Answer synthesis.
//!
//! The synthesizer asks the model for a structured answer and, if that call
//! fails or the reply cannot be parsed, asks once more for three labeled
//! plain-text sections. Whatever text comes back is coerced by the format
//! hint. Confidence and citations are computed from the state, not taken
//! from the model.

use std::collections::BTreeSet;

use async_trait::async_trait;
use serde_json::Value;

use super::config::{AgentConfig, Stage};
use super::executor::QueryAttempt;
use super::message::TokenUsage;
use super::prompt::{build_fallback_prompt, build_synthesizer_prompt};
use super::provider::LlmProvider;
use super::signature::{Field, SYNTHESIZER, Signature};
use super::state::AgentState;
use super::traits::Agent;
use crate::core::{RetrievedChunk, coerce_answer};
use crate::error::AgentError;

/// Table names recognized as citations.
pub const KNOWN_TABLES: [&str; 8] = [
    "orders",
    "order_items",
    "products",
    "customers",
    "categories",
    "suppliers",
    "employees",
    "shippers",
];

/// Answer used when the fallback reply has no answer section.
pub const UNABLE_TO_DETERMINE: &str = "unable to determine";
/// Explanation used when the fallback reply has no explanation section.
pub const GENERIC_EXPLANATION: &str =
    "Answer derived from the available documents and query results.";

const BASE_CONFIDENCE: f64 = 0.5;
const RETRIEVAL_BONUS: f64 = 0.2;
const RETRIEVAL_THRESHOLD: f64 = 0.5;
const QUERY_SUCCESS_BONUS: f64 = 0.2;
const QUERY_ROWS_BONUS: f64 = 0.1;
const REPAIR_PENALTY: f64 = 0.15;

/// Labeled sections of a fallback reply.
const FALLBACK: Signature = Signature {
    name: "fallback",
    inputs: &[],
    outputs: &[
        Field {
            name: "answer",
            desc: "The answer in the requested format",
        },
        Field {
            name: "explanation",
            desc: "At most 2 sentences",
        },
        Field {
            name: "citations",
            desc: "Comma-separated table names and chunk IDs",
        },
    ],
};

/// Synthesized answer fields.
#[derive(Debug, Clone, PartialEq)]
pub struct Synthesis {
    /// Answer coerced to the format hint.
    pub final_answer: Value,
    /// Confidence in `[0, 1]`.
    pub confidence: f64,
    /// Short explanation.
    pub explanation: String,
    /// Deduplicated citations.
    pub citations: BTreeSet<String>,
    /// Whether the free-text fallback produced the answer.
    pub used_fallback: bool,
    /// Whether coercion fell back to the format default.
    pub answer_defaulted: bool,
    /// Tokens used by the synthesis calls.
    pub usage: TokenUsage,
}

/// Raw text fields before coercion.
#[derive(Debug, Clone, PartialEq, Eq)]
struct RawAnswer {
    answer: String,
    explanation: String,
}

/// Agent producing the structured answer.
pub struct SynthesizerAgent {
    model: String,
    max_tokens: u32,
    system_prompt: String,
}

impl SynthesizerAgent {
    /// Creates a new synthesizer agent.
    #[must_use]
    pub fn new(config: &AgentConfig, system_prompt: String) -> Self {
        Self {
            model: config.stage(Stage::Synthesizer).model.clone(),
            max_tokens: config.stage(Stage::Synthesizer).max_tokens,
            system_prompt,
        }
    }
}

#[async_trait]
impl Agent for SynthesizerAgent {
    fn name(&self) -> &'static str {
        "synthesizer"
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

    fn temperature(&self) -> f32 {
        0.1
    }

    fn max_tokens(&self) -> u32 {
        self.max_tokens
    }
}

/// Agent producing the labeled free-text answer.
pub struct FallbackSynthesizerAgent {
    model: String,
    max_tokens: u32,
    system_prompt: String,
}

impl FallbackSynthesizerAgent {
    /// Creates a new fallback agent.
    #[must_use]
    pub fn new(config: &AgentConfig, system_prompt: String) -> Self {
        Self {
            model: config.stage(Stage::Synthesizer).model.clone(),
            max_tokens: config.stage(Stage::Synthesizer).max_tokens,
            system_prompt,
        }
    }
}

#[async_trait]
impl Agent for FallbackSynthesizerAgent {
    fn name(&self) -> &'static str {
        "fallback_synthesizer"
    }

    fn model(&self) -> &str {
        &self.model
    }

    fn system_prompt(&self) -> &str {
        &self.system_prompt
    }

    fn max_tokens(&self) -> u32 {
        self.max_tokens
    }
}

/// Two-path synthesizer.
pub struct Synthesizer {
    primary: SynthesizerAgent,
    fallback: FallbackSynthesizerAgent,
}

impl Synthesizer {
    /// Creates a synthesizer from its two agents.
    #[must_use]
    pub const fn new(primary: SynthesizerAgent, fallback: FallbackSynthesizerAgent) -> Self {
        Self { primary, fallback }
    }

    /// Synthesizes the final answer for `state`.
    ///
    /// Never fails: provider and parse errors degrade to the fallback path
    /// and then to fixed defaults.
    pub async fn synthesize(&self, provider: &dyn LlmProvider, state: &AgentState) -> Synthesis {
        let mut usage = TokenUsage::default();
        let mut used_fallback = false;

        let raw = match self.primary_answer(provider, state, &mut usage).await {
            Ok(raw) => raw,
            Err(e) => {
                tracing::warn!(
                    id = %state.question.id,
                    error = %e,
                    "structured synthesis failed, using fallback"
                );
                used_fallback = true;
                self.fallback_answer(provider, state, &mut usage).await
            }
        };

        let coerced = coerce_answer(&raw.answer, state.format_hint());
        if coerced.defaulted {
            tracing::warn!(
                id = %state.question.id,
                hint = state.format_hint().as_str(),
                "answer coercion used format default"
            );
        }

        Synthesis {
            final_answer: coerced.value,
            confidence: confidence(state),
            explanation: raw.explanation,
            citations: citations(state.query(), &state.chunks),
            used_fallback,
            answer_defaulted: coerced.defaulted,
            usage,
        }
    }

    async fn primary_answer(
        &self,
        provider: &dyn LlmProvider,
        state: &AgentState,
        usage: &mut TokenUsage,
    ) -> Result<RawAnswer, AgentError> {
        let prompt = build_synthesizer_prompt(
            &state.question.question,
            state.format_hint(),
            &state.chunks,
            state.attempt.as_ref().map(QueryAttempt::output).as_ref(),
        );
        let response = self.primary.execute(provider, &prompt).await?;
        *usage += response.usage;

        let prediction = SYNTHESIZER.parse(&response.content, &["final_answer"])?;
        Ok(RawAnswer {
            answer: prediction.get("final_answer").unwrap_or_default().to_string(),
            explanation: prediction
                .get("explanation")
                .unwrap_or(GENERIC_EXPLANATION)
                .to_string(),
        })
    }

    async fn fallback_answer(
        &self,
        provider: &dyn LlmProvider,
        state: &AgentState,
        usage: &mut TokenUsage,
    ) -> RawAnswer {
        let prompt = build_fallback_prompt(
            &state.question.question,
            state.format_hint(),
            &state.chunks,
            state.attempt.as_ref().map(QueryAttempt::output).as_ref(),
        );
        match self.fallback.execute(provider, &prompt).await {
            Ok(response) => {
                *usage += response.usage;
                parse_fallback(&response.content)
            }
            Err(e) => {
                tracing::warn!(id = %state.question.id, error = %e, "fallback synthesis failed");
                parse_fallback("")
            }
        }
    }
}

/// Parses labeled fallback sections, filling gaps with defaults.
fn parse_fallback(content: &str) -> RawAnswer {
    let prediction = FALLBACK.parse(content, &[]).unwrap_or_default();
    RawAnswer {
        answer: prediction
            .get("answer")
            .unwrap_or(UNABLE_TO_DETERMINE)
            .to_string(),
        explanation: prediction
            .get("explanation")
            .unwrap_or(GENERIC_EXPLANATION)
            .to_string(),
    }
}

/// Heuristic confidence for `state`, clamped to `[0, 1]`.
///
/// Deterministic in the retrieval score, query outcome and repair count.
#[must_use]
pub fn confidence(state: &AgentState) -> f64 {
    confidence_from(
        state.retrieval_score,
        state.query_succeeded(),
        state.query_has_rows(),
        state.repair_count,
    )
}

/// Confidence from its individual signals.
#[must_use]
pub fn confidence_from(
    retrieval_score: f64,
    query_succeeded: bool,
    query_has_rows: bool,
    repair_count: u32,
) -> f64 {
    let mut score = BASE_CONFIDENCE;
    if retrieval_score > RETRIEVAL_THRESHOLD {
        score += RETRIEVAL_BONUS;
    }
    if query_succeeded {
        score += QUERY_SUCCESS_BONUS;
        if query_has_rows {
            score += QUERY_ROWS_BONUS;
        }
    }
    score -= REPAIR_PENALTY * f64::from(repair_count);
    score.clamp(0.0, 1.0)
}

/// Known tables mentioned in `query` plus every retrieved chunk id.
#[must_use]
pub fn citations(query: &str, chunks: &[RetrievedChunk]) -> BTreeSet<String> {
    let lowered = query.to_lowercase();
    KNOWN_TABLES
        .iter()
        .filter(|table| lowered.contains(*table))
        .map(|table| (*table).to_string())
        .chain(chunks.iter().map(|c| c.id.clone()))
        .collect()
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::agent::message::{ChatRequest, ChatResponse};
    use crate::agent::prompt::PromptSet;
    use crate::core::Question;
    use proptest::prelude::*;
    use serde_json::json;

    /// Replies with a fixed sequence of results, one per call.
    struct ScriptedProvider {
        replies: Vec<Result<String, String>>,
        calls: AtomicUsize,
    }

    impl ScriptedProvider {
        fn new(replies: Vec<Result<&str, &str>>) -> Self {
            Self {
                replies: replies
                    .into_iter()
                    .map(|r| r.map(str::to_string).map_err(str::to_string))
                    .collect(),
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl LlmProvider for ScriptedProvider {
        fn name(&self) -> &'static str {
            "scripted"
        }

        async fn chat(&self, _request: &ChatRequest) -> Result<ChatResponse, AgentError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            match self.replies.get(n) {
                Some(Ok(content)) => Ok(ChatResponse {
                    content: content.clone(),
                    usage: TokenUsage {
                        prompt_tokens: 10,
                        completion_tokens: 5,
                        total_tokens: 15,
                    },
                    finish_reason: Some("stop".to_string()),
                }),
                Some(Err(message)) => Err(AgentError::ApiRequest {
                    message: message.clone(),
                    status: None,
                }),
                None => Err(AgentError::ApiRequest {
                    message: "no reply scripted".to_string(),
                    status: None,
                }),
            }
        }
    }

    fn synthesizer() -> Synthesizer {
        let config = AgentConfig::builder()
            .api_key("test")
            .build()
            .unwrap_or_else(|_| unreachable!());
        let prompts = PromptSet::defaults();
        Synthesizer::new(
            SynthesizerAgent::new(&config, prompts.synthesizer),
            FallbackSynthesizerAgent::new(&config, prompts.fallback),
        )
    }

    fn chunk(id: &str, score: f64) -> RetrievedChunk {
        RetrievedChunk {
            id: id.to_string(),
            content: "Beverages: unopened items may be returned within 14 days.".to_string(),
            source: "product_policy.md".to_string(),
            score,
        }
    }

    fn sql_state() -> AgentState {
        let mut state = AgentState::new(Question::new(
            "q1",
            "total revenue for order 10248",
            "float",
        ));
        state.attempt = Some(QueryAttempt {
            query: "SELECT SUM(UnitPrice * Quantity) FROM order_items WHERE OrderID = 10248"
                .to_string(),
            columns: vec!["revenue".to_string()],
            rows: vec![json!({"revenue": 436.75}).as_object().cloned().unwrap_or_default()],
            error: None,
        });
        state
    }

    #[test]
    fn test_confidence_values() {
        assert!((confidence_from(0.0, false, false, 0) - 0.5).abs() < 1e-9);
        assert!((confidence_from(0.0, true, true, 1) - 0.65).abs() < 1e-9);
        assert!((confidence_from(1.2, true, true, 0) - 1.0).abs() < 1e-9);
        assert!((confidence_from(0.5, true, false, 0) - 0.7).abs() < 1e-9);
        assert!(confidence_from(0.0, false, false, 4).abs() < 1e-9);
    }

    #[test]
    fn test_citations_tables_and_chunks() {
        let chunks = [chunk("product_policy::chunk0", 1.0), chunk("product_policy::chunk0", 0.9)];
        let cited = citations(
            "SELECT * FROM Orders JOIN order_items USING (OrderID) JOIN Products",
            &chunks,
        );
        let expected: BTreeSet<String> = ["orders", "order_items", "products", "product_policy::chunk0"]
            .into_iter()
            .map(String::from)
            .collect();
        assert_eq!(cited, expected);
    }

    #[test]
    fn test_parse_fallback_sections() {
        let raw = parse_fallback("ANSWER: 14\nEXPLANATION: Policy says 14 days.\nCITATIONS: product_policy::chunk0");
        assert_eq!(raw.answer, "14");
        assert_eq!(raw.explanation, "Policy says 14 days.");
    }

    #[test]
    fn test_parse_fallback_defaults() {
        let raw = parse_fallback("no idea");
        assert_eq!(raw.answer, UNABLE_TO_DETERMINE);
        assert_eq!(raw.explanation, GENERIC_EXPLANATION);
    }

    #[tokio::test]
    async fn test_primary_path() {
        let provider = ScriptedProvider::new(vec![Ok(
            r#"{"final_answer": "436.75", "confidence": 0.99, "explanation": "Summed line items.", "citations": "order_items"}"#,
        )]);
        let synthesis = synthesizer().synthesize(&provider, &sql_state()).await;
        assert_eq!(provider.calls.load(Ordering::SeqCst), 1);
        assert!(!synthesis.used_fallback);
        assert_eq!(synthesis.final_answer, json!(436.75));
        // Model-reported confidence is ignored.
        assert!((synthesis.confidence - 0.8).abs() < 1e-9);
        assert_eq!(synthesis.explanation, "Summed line items.");
        assert!(synthesis.citations.contains("order_items"));
    }

    #[tokio::test]
    async fn test_model_citations_are_ignored() {
        let provider = ScriptedProvider::new(vec![Ok(
            r#"{"final_answer": "436.75", "explanation": "x", "citations": "customers, suppliers"}"#,
        )]);
        let synthesis = synthesizer().synthesize(&provider, &sql_state()).await;
        let expected: BTreeSet<String> = std::iter::once("order_items".to_string()).collect();
        assert_eq!(synthesis.citations, expected);
    }

    #[tokio::test]
    async fn test_fallback_on_malformed_reply() {
        let provider = ScriptedProvider::new(vec![
            Ok("I think it is about four hundred."),
            Ok("ANSWER: 436.75 dollars\nEXPLANATION: Sum of items.\nCITATIONS: order_items"),
        ]);
        let synthesis = synthesizer().synthesize(&provider, &sql_state()).await;
        assert_eq!(provider.calls.load(Ordering::SeqCst), 2);
        assert!(synthesis.used_fallback);
        assert_eq!(synthesis.final_answer, json!(436.75));
        assert_eq!(synthesis.explanation, "Sum of items.");
        assert_eq!(synthesis.usage.total_tokens, 30);
        assert_eq!(synthesis.usage.prompt_tokens, 20);
    }

    #[tokio::test]
    async fn test_fallback_on_provider_error_then_defaults() {
        let provider = ScriptedProvider::new(vec![Err("boom"), Err("boom again")]);
        let synthesis = synthesizer().synthesize(&provider, &sql_state()).await;
        assert!(synthesis.used_fallback);
        assert!(synthesis.answer_defaulted);
        assert_eq!(synthesis.final_answer, json!(0.0));
        assert_eq!(synthesis.explanation, GENERIC_EXPLANATION);
        assert!(synthesis.citations.contains("order_items"));
    }

    #[tokio::test]
    async fn test_synthesis_is_idempotent() {
        let reply = r#"{"final_answer": "436.75", "explanation": "x", "citations": ""}"#;
        let state = sql_state();
        let synth = synthesizer();
        let first = synth
            .synthesize(&ScriptedProvider::new(vec![Ok(reply)]), &state)
            .await;
        let second = synth
            .synthesize(&ScriptedProvider::new(vec![Ok(reply)]), &state)
            .await;
        assert_eq!(first.confidence.to_bits(), second.confidence.to_bits());
        assert_eq!(first.citations, second.citations);
    }

    #[test]
    fn test_agent_properties() {
        let config = AgentConfig::builder()
            .api_key("test")
            .stage_model(Stage::Synthesizer, "gpt-4o")
            .stage_max_tokens(Stage::Synthesizer, 2048)
            .build()
            .unwrap_or_else(|_| unreachable!());
        let agent = SynthesizerAgent::new(&config, String::new());
        assert_eq!(agent.model(), "gpt-4o");
        assert!(agent.json_mode());
        assert!((agent.temperature() - 0.1).abs() < f32::EPSILON);
        assert_eq!(agent.max_tokens(), 2048);

        let fallback = FallbackSynthesizerAgent::new(&config, String::new());
        assert!(!fallback.json_mode());
        assert_eq!(fallback.name(), "fallback_synthesizer");
    }

    proptest! {
        #[test]
        fn prop_confidence_in_unit_interval(
            score in 0.0f64..50.0,
            ok in any::<bool>(),
            rows in any::<bool>(),
            repairs in 0u32..100,
        ) {
            let c = confidence_from(score, ok, rows, repairs);
            prop_assert!((0.0..=1.0).contains(&c));
        }

        #[test]
        fn prop_citations_unique(ids in proptest::collection::vec("[a-z]{1,6}::chunk[0-9]", 0..12)) {
            let chunks: Vec<RetrievedChunk> = ids.iter().map(|id| chunk(id, 1.0)).collect();
            let cited = citations("select * from orders, orders", &chunks);
            let unique: BTreeSet<&String> = ids.iter().collect();
            prop_assert_eq!(cited.len(), unique.len() + 1);
        }
    }
}
