//! Orchestration stages and the LM collaborator.
//!
//! Every stage that talks to a model goes through the [`LlmProvider`]
//! abstraction, backed by OpenAI-compatible APIs.
//!
//! # Architecture
//!
//! ```text
//! Question → Orchestrator
//!   ├── RouterAgent (rag | sql | hybrid)
//!   ├── Retriever (BM25 over docs)             [rag, hybrid]
//!   ├── Planner (calendar + KPI constraints)    [sql, hybrid]
//!   ├── SqlGeneratorAgent ─► QueryExecutor
//!   │     └── RepairController (≤ repair_limit retries with error feedback)
//!   └── Synthesizer (structured, then labeled fallback)
//!         └── coercion + confidence + citations
//! ```

pub mod client;
pub mod config;
pub mod executor;
pub mod message;
pub mod orchestrator;
pub mod planner;
pub mod prompt;
pub mod provider;
pub mod providers;
pub mod repair;
pub mod router;
pub mod signature;
pub mod sql_generator;
pub mod state;
pub mod synthesizer;
pub mod traits;

// Re-export key types
pub use client::{ProviderKind, create_provider};
pub use config::{AgentConfig, Stage, StageConfig};
pub use executor::{QueryAttempt, QueryExecutor};
pub use message::{ChatMessage, ChatRequest, ChatResponse, Role, TokenUsage};
pub use orchestrator::Orchestrator;
pub use prompt::PromptSet;
pub use provider::LlmProvider;
pub use repair::{RepairController, RepairDecision, RepairPhase};
pub use router::{RouteDecision, RouterAgent};
pub use signature::{Prediction, Signature};
pub use sql_generator::SqlGeneratorAgent;
pub use state::{AgentState, Node};
pub use synthesizer::{Synthesis, Synthesizer};
pub use traits::{Agent, AgentResponse};
