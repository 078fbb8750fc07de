//! Per-question state and the node transition table.
//!
//! [`AgentState`] is created when a question starts and owned by the
//! orchestrator until it finishes. [`transition`] is a pure function of the
//! current node and the state, so every branch of the graph can be tested
//! without a provider or a database.

use std::collections::BTreeSet;

use serde::Serialize;
use serde_json::Value;

use super::executor::QueryAttempt;
use super::message::TokenUsage;
use super::repair::RepairPhase;
use crate::core::{FormatHint, Question, RetrievedChunk, Strategy};

/// A node of the orchestration graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Node {
    /// Classify the question.
    Route,
    /// Fetch document chunks.
    Retrieve,
    /// Build query constraints.
    Plan,
    /// Generate query text.
    Generate,
    /// Run the query.
    Execute,
    /// Decide whether to regenerate after a failure.
    Repair,
    /// Produce the final answer.
    Synthesize,
    /// Terminal.
    Done,
}

impl Node {
    /// Node name for logging.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Route => "route",
            Self::Retrieve => "retrieve",
            Self::Plan => "plan",
            Self::Generate => "generate",
            Self::Execute => "execute",
            Self::Repair => "repair",
            Self::Synthesize => "synthesize",
            Self::Done => "done",
        }
    }
}

impl std::fmt::Display for Node {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Everything known about one question while it is being answered.
#[derive(Debug, Clone, Serialize)]
pub struct AgentState {
    /// The question being answered.
    pub question: Question,
    /// Normalized strategy.
    pub strategy: Strategy,
    /// Router reasoning, if the model gave any.
    pub route_reasoning: String,
    /// Retrieved chunks, highest score first.
    pub chunks: Vec<RetrievedChunk>,
    /// Mean chunk score, `0.0` with no chunks.
    pub retrieval_score: f64,
    /// Planner output for the query generator.
    pub constraints: String,
    /// Latest query attempt.
    pub attempt: Option<QueryAttempt>,
    /// Repairs performed so far.
    pub repair_count: u32,
    /// Where the query loop stands.
    pub phase: RepairPhase,
    /// Typed final answer.
    pub final_answer: Value,
    /// Confidence in `[0, 1]`.
    pub confidence: f64,
    /// Short explanation of the answer.
    pub explanation: String,
    /// Table names and chunk ids used as evidence.
    pub citations: BTreeSet<String>,
    /// Recovered node failures, in order.
    pub errors: Vec<String>,
    /// Tokens used across all model calls.
    pub usage: TokenUsage,
}

impl AgentState {
    /// Fresh state for `question`.
    #[must_use]
    pub fn new(question: Question) -> Self {
        Self {
            question,
            strategy: Strategy::default(),
            route_reasoning: String::new(),
            chunks: Vec::new(),
            retrieval_score: 0.0,
            constraints: String::new(),
            attempt: None,
            repair_count: 0,
            phase: RepairPhase::default(),
            final_answer: Value::Null,
            confidence: 0.0,
            explanation: String::new(),
            citations: BTreeSet::new(),
            errors: Vec::new(),
            usage: TokenUsage::default(),
        }
    }

    /// Declared answer format.
    #[must_use]
    pub const fn format_hint(&self) -> &FormatHint {
        &self.question.format_hint
    }

    /// Current query text, empty when none was generated.
    #[must_use]
    pub fn query(&self) -> &str {
        self.attempt.as_ref().map_or("", |a| a.query.as_str())
    }

    /// Error of the latest attempt, if it failed.
    #[must_use]
    pub fn query_error(&self) -> Option<&str> {
        self.attempt.as_ref().and_then(|a| a.error.as_deref())
    }

    /// Whether the latest attempt ran successfully.
    #[must_use]
    pub fn query_succeeded(&self) -> bool {
        self.attempt.as_ref().is_some_and(QueryAttempt::succeeded)
    }

    /// Whether the latest attempt succeeded with at least one row.
    #[must_use]
    pub fn query_has_rows(&self) -> bool {
        self.attempt.as_ref().is_some_and(QueryAttempt::has_rows)
    }

    /// Records a recovered failure from `node`.
    pub fn record_error(&mut self, node: Node, message: impl std::fmt::Display) {
        self.errors.push(format!("{node}: {message}"));
    }
}

/// Next node after `node` has run against `state`.
#[must_use]
pub fn transition(node: Node, state: &AgentState) -> Node {
    match node {
        Node::Route if state.strategy.uses_retrieval() => Node::Retrieve,
        Node::Route => Node::Plan,
        Node::Retrieve if state.strategy.uses_sql() => Node::Plan,
        Node::Retrieve => Node::Synthesize,
        Node::Plan => Node::Generate,
        Node::Generate => Node::Execute,
        Node::Execute if state.query_succeeded() => Node::Synthesize,
        Node::Execute => Node::Repair,
        Node::Repair => match state.phase {
            RepairPhase::Repairing => Node::Generate,
            RepairPhase::Executing | RepairPhase::Exhausted => Node::Synthesize,
        },
        Node::Synthesize | Node::Done => Node::Done,
    }
}
