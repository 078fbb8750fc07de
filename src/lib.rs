//! # retail-copilot
//!
//! A retail analytics copilot: answers natural-language questions over a
//! markdown document corpus and a read-only SQLite database.
//!
//! Each question is routed to retrieval, query generation, or both. Query
//! generation runs under a bounded repair loop that feeds database errors
//! back to the model, and a synthesizer turns the collected evidence into
//! a typed answer with a confidence score and citations.
//!
//! ## Layout
//!
//! - [`core`]: domain values and answer coercion
//! - [`retrieval`]: BM25 document index
//! - [`database`]: read-only SQLite backend
//! - [`agent`]: LM provider, stages and the orchestrator
//! - [`batch`]: JSONL input and output records
//! - [`cli`]: command-line interface

pub mod agent;
pub mod batch;
pub mod cli;
pub mod core;
pub mod database;
pub mod error;
pub mod retrieval;

pub use agent::{AgentConfig, AgentState, Orchestrator};
pub use batch::{AnswerRecord, BatchItem, BatchSummary};
pub use crate::core::{FormatHint, Question, RetrievedChunk, Strategy};
pub use database::{QueryBackend, QueryOutput, SqliteDatabase};
pub use error::{Error, Result};
pub use retrieval::{DocumentIndex, Retriever};
