//! Orchestrator for the question-answering state machine.
//!
//! Drives one question at a time through route → retrieve → plan →
//! generate → execute → repair → synthesize. Each node catches its own
//! collaborator failures and records them in the state; only input
//! validation errors escape [`Orchestrator::run`].

use std::sync::Arc;
use std::time::Instant;

use super::config::AgentConfig;
use super::executor::{QueryAttempt, QueryExecutor};
use super::planner::plan_constraints;
use super::prompt::PromptSet;
use super::provider::LlmProvider;
use super::repair::{RepairController, RepairDecision};
use super::router::RouterAgent;
use super::sql_generator::SqlGeneratorAgent;
use super::state::{AgentState, Node, transition};
use super::synthesizer::{FallbackSynthesizerAgent, Synthesizer, SynthesizerAgent};
use crate::core::{Question, mean_score};
use crate::database::QueryBackend;
use crate::error::{AgentError, DatabaseError};
use crate::retrieval::Retriever;

/// Maximum accepted question length in bytes.
const MAX_QUESTION_LEN: usize = 10_000;

/// Runs questions through the state machine.
///
/// Holds the shared read-only context: provider, configuration, document
/// index, database and the schema description computed once at
/// construction.
pub struct Orchestrator<'a> {
    provider: Arc<dyn LlmProvider>,
    config: AgentConfig,
    retriever: &'a dyn Retriever,
    backend: &'a dyn QueryBackend,
    schema: String,
    router: RouterAgent,
    generator: SqlGeneratorAgent,
    synthesizer: Synthesizer,
    repair: RepairController,
}

impl<'a> Orchestrator<'a> {
    /// Creates a new orchestrator.
    ///
    /// Loads prompt templates from [`AgentConfig::prompt_dir`], falling back
    /// to compiled-in defaults, and reads the schema description.
    ///
    /// # Errors
    ///
    /// Returns [`DatabaseError`] if the schema cannot be introspected.
    pub fn new(
        provider: Arc<dyn LlmProvider>,
        config: AgentConfig,
        retriever: &'a dyn Retriever,
        backend: &'a dyn QueryBackend,
    ) -> Result<Self, DatabaseError> {
        let prompts = PromptSet::load(config.prompt_dir.as_deref());
        Self::with_prompts(provider, config, prompts, retriever, backend)
    }

    /// Creates a new orchestrator with an explicit prompt set.
    ///
    /// # Errors
    ///
    /// Returns [`DatabaseError`] if the schema cannot be introspected.
    pub fn with_prompts(
        provider: Arc<dyn LlmProvider>,
        config: AgentConfig,
        prompts: PromptSet,
        retriever: &'a dyn Retriever,
        backend: &'a dyn QueryBackend,
    ) -> Result<Self, DatabaseError> {
        let schema = backend.schema_description()?;
        Ok(Self {
            router: RouterAgent::new(&config, prompts.router),
            generator: SqlGeneratorAgent::new(&config, prompts.sql),
            synthesizer: Synthesizer::new(
                SynthesizerAgent::new(&config, prompts.synthesizer),
                FallbackSynthesizerAgent::new(&config, prompts.fallback),
            ),
            repair: RepairController::new(config.repair_limit),
            provider,
            config,
            retriever,
            backend,
            schema,
        })
    }

    /// Schema description handed to the query generator.
    #[must_use]
    pub fn schema(&self) -> &str {
        &self.schema
    }

    /// Answers one question.
    ///
    /// # Errors
    ///
    /// Returns [`AgentError::Orchestration`] if the question is empty or too
    /// long. Collaborator failures are recorded in
    /// [`AgentState::errors`] instead.
    #[allow(clippy::future_not_send)]
    pub async fn run(&self, question: &Question) -> Result<AgentState, AgentError> {
        if question.question.trim().is_empty() {
            return Err(AgentError::Orchestration {
                message: "Question cannot be empty".to_string(),
            });
        }
        if question.question.len() > MAX_QUESTION_LEN {
            return Err(AgentError::Orchestration {
                message: format!(
                    "Question exceeds maximum length ({} bytes, max {MAX_QUESTION_LEN})",
                    question.question.len()
                ),
            });
        }

        let start = Instant::now();
        tracing::info!(id = %question.id, hint = question.format_hint.as_str(), "question started");

        let mut state = AgentState::new(question.clone());
        let mut node = Node::Route;
        while node != Node::Done {
            tracing::debug!(id = %question.id, node = %node, "entering node");
            self.step(node, &mut state).await;
            node = transition(node, &state);
        }

        tracing::info!(
            id = %question.id,
            strategy = %state.strategy,
            repairs = state.repair_count,
            confidence = state.confidence,
            tokens = state.usage.total_tokens,
            elapsed_ms = u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX),
            "question finished"
        );
        Ok(state)
    }

    #[allow(clippy::future_not_send)]
    async fn step(&self, node: Node, state: &mut AgentState) {
        match node {
            Node::Route => self.route(state).await,
            Node::Retrieve => self.retrieve(state),
            Node::Plan => {
                state.constraints = plan_constraints(&state.question.question, &state.chunks);
            }
            Node::Generate => self.generate(state).await,
            Node::Execute => self.execute(state),
            Node::Repair => self.decide_repair(state),
            Node::Synthesize => self.synthesize(state).await,
            Node::Done => {}
        }
    }

    #[allow(clippy::future_not_send)]
    async fn route(&self, state: &mut AgentState) {
        match self
            .router
            .classify(&*self.provider, &state.question.question)
            .await
        {
            Ok((decision, response)) => {
                state.usage += response.usage;
                if !decision.recognized {
                    tracing::warn!(
                        id = %state.question.id,
                        reply = %response.content,
                        "unrecognized route, defaulting to hybrid"
                    );
                }
                state.strategy = decision.strategy;
                state.route_reasoning = decision.reasoning;
            }
            Err(e) => {
                tracing::warn!(
                    id = %state.question.id,
                    error = %e,
                    "router failed, defaulting to hybrid"
                );
                state.record_error(Node::Route, &e);
                state.strategy = crate::core::Strategy::default();
            }
        }
    }

    fn retrieve(&self, state: &mut AgentState) {
        state.chunks = self
            .retriever
            .search(&state.question.question, self.config.retrieval_top_k);
        state.retrieval_score = mean_score(&state.chunks);
        tracing::debug!(
            id = %state.question.id,
            chunks = state.chunks.len(),
            score = state.retrieval_score,
            "retrieved chunks"
        );
    }

    #[allow(clippy::future_not_send)]
    async fn generate(&self, state: &mut AgentState) {
        let feedback = state.query_error().map(str::to_string);
        let result = self
            .generator
            .generate(
                &*self.provider,
                &state.question.question,
                &self.schema,
                &state.constraints,
                feedback.as_deref(),
            )
            .await;

        state.attempt = Some(match result {
            Ok((query, response)) => {
                state.usage += response.usage;
                tracing::debug!(id = %state.question.id, sql = %query.sql, "generated query");
                QueryAttempt {
                    query: query.sql,
                    ..QueryAttempt::default()
                }
            }
            Err(e) => {
                tracing::warn!(id = %state.question.id, error = %e, "query generation failed");
                state.record_error(Node::Generate, &e);
                QueryAttempt::generation_failed(e.to_string())
            }
        });
    }

    fn execute(&self, state: &mut AgentState) {
        let attempt = match state.attempt.take() {
            Some(pending) if pending.succeeded() => {
                QueryExecutor::new(self.backend).execute(&pending.query)
            }
            Some(failed) => failed,
            None => QueryAttempt::generation_failed(AgentError::EmptyQuery.to_string()),
        };

        if let Some(error) = attempt.error.as_deref() {
            tracing::warn!(id = %state.question.id, sql = %attempt.query, error, "query failed");
            state.record_error(Node::Execute, error);
        } else {
            tracing::debug!(id = %state.question.id, rows = attempt.rows.len(), "query succeeded");
        }
        state.attempt = Some(attempt);
    }

    fn decide_repair(&self, state: &mut AgentState) {
        let decision = self
            .repair
            .decide(state.query_succeeded(), state.repair_count);
        if let RepairDecision::Retry(count) = decision {
            state.repair_count = count;
        } else if decision == RepairDecision::GiveUp {
            tracing::warn!(
                id = %state.question.id,
                repairs = state.repair_count,
                "repair limit reached"
            );
        }
        state.phase = RepairController::phase(decision);
    }

    #[allow(clippy::future_not_send)]
    async fn synthesize(&self, state: &mut AgentState) {
        let synthesis = self.synthesizer.synthesize(&*self.provider, state).await;
        state.usage += synthesis.usage;
        state.final_answer = synthesis.final_answer;
        state.confidence = synthesis.confidence;
        state.explanation = synthesis.explanation;
        state.citations = synthesis.citations;
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use serde_json::json;

    use super::*;
    use crate::agent::message::{ChatRequest, ChatResponse, Role, TokenUsage};
    use crate::agent::repair::RepairPhase;
    use crate::core::{RetrievedChunk, Strategy};
    use crate::database::sqlite::tests::fixture;

    /// Answers each agent from its own script, keyed by system prompt.
    struct MockProvider {
        prompts: PromptSet,
        route: String,
        sql: Mutex<VecDeque<String>>,
        synth: String,
        sql_prompts: Mutex<Vec<String>>,
        calls: AtomicUsize,
    }

    impl MockProvider {
        fn new(route: &str, sql: &[&str], synth: &str) -> Self {
            Self {
                prompts: PromptSet::defaults(),
                route: route.to_string(),
                sql: Mutex::new(sql.iter().map(|s| (*s).to_string()).collect()),
                synth: synth.to_string(),
                sql_prompts: Mutex::new(Vec::new()),
                calls: AtomicUsize::new(0),
            }
        }

        fn sql_prompts(&self) -> Vec<String> {
            self.sql_prompts
                .lock()
                .map(|p| p.clone())
                .unwrap_or_default()
        }
    }

    #[async_trait]
    impl LlmProvider for MockProvider {
        fn name(&self) -> &'static str {
            "mock"
        }

        async fn chat(&self, request: &ChatRequest) -> Result<ChatResponse, AgentError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let system = request.content_of(Role::System);
            let user = request.content_of(Role::User).to_string();

            let content = if system == self.prompts.router {
                self.route.clone()
            } else if system == self.prompts.sql {
                if let Ok(mut seen) = self.sql_prompts.lock() {
                    seen.push(user);
                }
                let mut queue = self.sql.lock().unwrap_or_else(|_| unreachable!());
                // The last scripted reply repeats once the queue runs dry.
                if queue.len() > 1 {
                    queue.pop_front().unwrap_or_default()
                } else {
                    queue.front().cloned().unwrap_or_default()
                }
            } else {
                self.synth.clone()
            };

            Ok(ChatResponse {
                content,
                usage: TokenUsage {
                    prompt_tokens: 10,
                    completion_tokens: 5,
                    total_tokens: 15,
                },
                finish_reason: Some("stop".to_string()),
            })
        }
    }

    /// Returns a fixed chunk list for every query.
    struct FixedRetriever(Vec<RetrievedChunk>);

    impl Retriever for FixedRetriever {
        fn search(&self, _query: &str, top_k: usize) -> Vec<RetrievedChunk> {
            self.0.iter().take(top_k).cloned().collect()
        }

        fn len(&self) -> usize {
            self.0.len()
        }
    }

    fn config() -> AgentConfig {
        AgentConfig::builder()
            .api_key("test")
            .build()
            .unwrap_or_else(|_| unreachable!())
    }

    fn chunk(id: &str, content: &str, score: f64) -> RetrievedChunk {
        RetrievedChunk {
            id: id.to_string(),
            content: content.to_string(),
            source: format!("{}.md", id.split("::").next().unwrap_or_default()),
            score,
        }
    }

    const GOOD_SQL: &str = r#"{"sql": "SELECT SUM(UnitPrice * Quantity * (1 - Discount)) AS revenue FROM order_items WHERE OrderID = 10248"}"#;
    const BAD_SQL: &str = r#"{"sql": "SELECT SUM(UnitPrize * Quantity) AS revenue FROM order_items WHERE OrderID = 10248"}"#;

    #[tokio::test]
    async fn test_sql_route_repairs_once() {
        let (_dir, db) = fixture();
        let retriever = FixedRetriever(Vec::new());
        let provider = Arc::new(MockProvider::new(
            r#"{"route": "sql", "reasoning": "order totals"}"#,
            &[BAD_SQL, GOOD_SQL],
            r#"{"final_answer": "436.75", "explanation": "Summed the order lines.", "citations": "order_items"}"#,
        ));
        let orchestrator = Orchestrator::with_prompts(
            provider.clone(),
            config(),
            PromptSet::defaults(),
            &retriever,
            &db,
        )
        .unwrap_or_else(|_| unreachable!());

        let question = Question::new("q1", "total revenue for order 10248", "float");
        let state = orchestrator
            .run(&question)
            .await
            .unwrap_or_else(|_| unreachable!());

        assert_eq!(state.strategy, Strategy::Sql);
        assert_eq!(state.repair_count, 1);
        assert!(state.query_succeeded());
        assert!(state.chunks.is_empty());
        assert!(state.retrieval_score.abs() < f64::EPSILON);
        assert!((state.confidence - 0.65).abs() < 1e-9);
        assert_eq!(state.final_answer, json!(436.75));
        assert!(state.citations.contains("order_items"));

        let sql_prompts = provider.sql_prompts();
        assert_eq!(sql_prompts.len(), 2);
        assert!(sql_prompts[0].contains("<error_feedback>\nNone\n</error_feedback>"));
        assert!(sql_prompts[0].contains("<constraints>\nNo specific constraints\n</constraints>"));
        assert!(sql_prompts[1].contains("no such column"));
        // router + 2 generations + synthesizer
        assert_eq!(provider.calls.load(Ordering::SeqCst), 4);
        assert_eq!(state.usage.total_tokens, 60);
    }

    #[tokio::test]
    async fn test_always_failing_generator_exhausts_repairs() {
        let (_dir, db) = fixture();
        let retriever = FixedRetriever(Vec::new());
        let provider = Arc::new(MockProvider::new(
            "sql",
            &[BAD_SQL],
            r#"{"final_answer": "unknown"}"#,
        ));
        let orchestrator = Orchestrator::with_prompts(
            provider.clone(),
            config(),
            PromptSet::defaults(),
            &retriever,
            &db,
        )
        .unwrap_or_else(|_| unreachable!());

        let state = orchestrator
            .run(&Question::new("q2", "total revenue for order 10248", "float"))
            .await
            .unwrap_or_else(|_| unreachable!());

        assert_eq!(state.repair_count, 2);
        assert_eq!(state.phase, RepairPhase::Exhausted);
        assert_eq!(provider.sql_prompts().len(), 3);
        assert!(state.query_error().unwrap_or_default().contains("no such column"));
        assert!((state.confidence - 0.2).abs() < 1e-9);
        assert_eq!(state.final_answer, json!(0.0));
    }

    #[tokio::test]
    async fn test_empty_generation_counts_as_failure() {
        let (_dir, db) = fixture();
        let retriever = FixedRetriever(Vec::new());
        let provider = Arc::new(MockProvider::new(
            "sql",
            &[r#"{"sql": "```sql\n```"}"#, GOOD_SQL],
            r#"{"final_answer": "436.75"}"#,
        ));
        let orchestrator = Orchestrator::with_prompts(
            provider.clone(),
            config(),
            PromptSet::defaults(),
            &retriever,
            &db,
        )
        .unwrap_or_else(|_| unreachable!());

        let state = orchestrator
            .run(&Question::new("q3", "total revenue for order 10248", "float"))
            .await
            .unwrap_or_else(|_| unreachable!());

        assert_eq!(state.repair_count, 1);
        assert!(state.query_succeeded());
        assert!(state.errors.iter().any(|e| e.starts_with("generate:")));
        assert!(provider.sql_prompts()[1].contains("empty"));
    }

    #[tokio::test]
    async fn test_rag_route_with_no_chunks() {
        let (_dir, db) = fixture();
        let retriever = FixedRetriever(Vec::new());
        let provider = Arc::new(MockProvider::new(
            "rag",
            &[],
            r#"{"final_answer": "Unopened beverages: 14 days.", "explanation": "From the policy."}"#,
        ));
        let orchestrator = Orchestrator::with_prompts(
            provider.clone(),
            config(),
            PromptSet::defaults(),
            &retriever,
            &db,
        )
        .unwrap_or_else(|_| unreachable!());

        let state = orchestrator
            .run(&Question::new("q4", "What is the return window for unopened beverages?", "str"))
            .await
            .unwrap_or_else(|_| unreachable!());

        assert_eq!(state.strategy, Strategy::Rag);
        assert!(state.retrieval_score.abs() < f64::EPSILON);
        assert!((state.confidence - 0.5).abs() < 1e-9);
        assert_eq!(state.final_answer, json!("Unopened beverages: 14 days."));
        assert!(state.attempt.is_none());
        assert!(provider.sql_prompts().is_empty());
        assert!(state.citations.is_empty());
    }

    #[tokio::test]
    async fn test_hybrid_route_uses_constraints_and_cites_chunks() {
        let (_dir, db) = fixture();
        let retriever = FixedRetriever(vec![
            chunk("marketing_calendar::chunk1", "Summer Beverages 1997: 1997-06-01 to 1997-06-30", 2.4),
            chunk("kpi_definitions::chunk1", "AOV = revenue / distinct orders", 1.1),
            chunk("product_policy::chunk2", "Beverages unopened: 14 days", 0.3),
        ]);
        let provider = Arc::new(MockProvider::new(
            "I'm not sure",
            &[GOOD_SQL],
            r#"{"final_answer": "436.75"}"#,
        ));
        let orchestrator = Orchestrator::with_prompts(
            provider.clone(),
            config(),
            PromptSet::defaults(),
            &retriever,
            &db,
        )
        .unwrap_or_else(|_| unreachable!());

        let state = orchestrator
            .run(&Question::new("q5", "Revenue during Summer Beverages 1997", "float"))
            .await
            .unwrap_or_else(|_| unreachable!());

        assert_eq!(state.strategy, Strategy::Hybrid);
        assert!(state.constraints.starts_with("Marketing calendar context:"));
        assert!(state.constraints.ends_with("Question context: Revenue during Summer Beverages 1997"));
        assert!(provider.sql_prompts()[0].contains("KPI definition: AOV"));
        // 0.5 + 0.2 retrieval + 0.2 success + 0.1 rows
        assert!((state.confidence - 1.0).abs() < 1e-9);
        assert!(state.citations.contains("marketing_calendar::chunk1"));
        assert!(state.citations.contains("product_policy::chunk2"));
        assert!(state.citations.contains("order_items"));
    }

    #[tokio::test]
    async fn test_empty_question_rejected() {
        let (_dir, db) = fixture();
        let retriever = FixedRetriever(Vec::new());
        let provider = Arc::new(MockProvider::new("sql", &[], ""));
        let orchestrator = Orchestrator::with_prompts(
            provider.clone(),
            config(),
            PromptSet::defaults(),
            &retriever,
            &db,
        )
        .unwrap_or_else(|_| unreachable!());

        let result = orchestrator.run(&Question::new("q6", "   ", "int")).await;
        assert!(matches!(result, Err(AgentError::Orchestration { .. })));
        assert_eq!(provider.calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_schema_loaded_once() {
        let (_dir, db) = fixture();
        let retriever = FixedRetriever(Vec::new());
        let provider = Arc::new(MockProvider::new("sql", &[], ""));
        let orchestrator = Orchestrator::with_prompts(
            provider,
            config(),
            PromptSet::defaults(),
            &retriever,
            &db,
        )
        .unwrap_or_else(|_| unreachable!());
        assert!(orchestrator.schema().contains("## Table: Orders"));
    }
}
