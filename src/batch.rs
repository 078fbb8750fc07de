//! JSONL batch input and output.
//!
//! Every input line yields exactly one output record. Lines that are not
//! valid questions, and questions the orchestrator rejects, produce an
//! error record instead of aborting the run.

use std::io::{BufRead, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::agent::{AgentState, Orchestrator};
use crate::core::{Question, round2};
use crate::error::Result;

/// One output line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnswerRecord {
    /// Question id.
    pub id: String,
    /// Typed answer, `null` on error.
    pub final_answer: Value,
    /// Final query text, possibly empty.
    pub sql: String,
    /// Confidence rounded to two decimals.
    pub confidence: f64,
    /// Short explanation, or the error.
    pub explanation: String,
    /// Sorted, deduplicated citations.
    pub citations: Vec<String>,
}

impl AnswerRecord {
    /// Builds the record for a finished question.
    #[must_use]
    pub fn from_state(state: &AgentState) -> Self {
        Self {
            id: state.question.id.clone(),
            final_answer: state.final_answer.clone(),
            sql: state.query().to_string(),
            confidence: round2(state.confidence),
            explanation: state.explanation.clone(),
            citations: state.citations.iter().cloned().collect(),
        }
    }

    /// Builds the record for a question that could not be answered.
    #[must_use]
    pub fn error(id: impl Into<String>, message: impl std::fmt::Display) -> Self {
        Self {
            id: id.into(),
            final_answer: Value::Null,
            sql: String::new(),
            confidence: 0.0,
            explanation: format!("Error: {message}"),
            citations: Vec::new(),
        }
    }

    /// Whether this is an error record.
    #[must_use]
    pub fn is_error(&self) -> bool {
        self.final_answer.is_null() && self.explanation.starts_with("Error: ")
    }
}

/// A parsed input line.
#[derive(Debug, Clone, PartialEq)]
pub enum BatchItem {
    /// A well-formed question.
    Question(Question),
    /// A line that could not be parsed; answered with an error record.
    Invalid {
        /// The line's `id` when recoverable, else `line-N`.
        id: String,
        /// Parse failure.
        message: String,
    },
}

/// Parses one input line. Blank lines yield `None`.
///
/// `line_no` is 1-based and only used for the fallback id.
#[must_use]
pub fn parse_line(line: &str, line_no: usize) -> Option<BatchItem> {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return None;
    }

    let fallback_id = || format!("line-{line_no}");
    let value: Value = match serde_json::from_str(trimmed) {
        Ok(value) => value,
        Err(e) => {
            return Some(BatchItem::Invalid {
                id: fallback_id(),
                message: format!("invalid JSON: {e}"),
            });
        }
    };

    let id = value
        .get("id")
        .and_then(Value::as_str)
        .map_or_else(fallback_id, str::to_string);

    Some(match serde_json::from_value::<Question>(value) {
        Ok(question) => BatchItem::Question(question),
        Err(e) => BatchItem::Invalid {
            id,
            message: format!("invalid question: {e}"),
        },
    })
}

/// Reads every non-blank line of a JSONL file.
///
/// # Errors
///
/// Returns an I/O error if the file cannot be read.
pub fn read_batch(path: &Path) -> Result<Vec<BatchItem>> {
    let file = std::fs::File::open(path)?;
    let mut items = Vec::new();
    for (idx, line) in std::io::BufReader::new(file).lines().enumerate() {
        if let Some(item) = parse_line(&line?, idx + 1) {
            items.push(item);
        }
    }
    Ok(items)
}

/// Outcome of a batch run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BatchSummary {
    /// Records written.
    pub questions: usize,
    /// Error records among them.
    pub failures: usize,
    /// Output path, when writing to a file.
    pub output: Option<PathBuf>,
}

/// Answers `item`, always producing a record.
#[allow(clippy::future_not_send)]
pub async fn answer(orchestrator: &Orchestrator<'_>, item: &BatchItem) -> AnswerRecord {
    match item {
        BatchItem::Question(question) => match orchestrator.run(question).await {
            Ok(state) => AnswerRecord::from_state(&state),
            Err(e) => {
                tracing::warn!(id = %question.id, error = %e, "question failed");
                AnswerRecord::error(&question.id, e)
            }
        },
        BatchItem::Invalid { id, message } => {
            tracing::warn!(id = %id, error = %message, "skipping malformed input line");
            AnswerRecord::error(id, message)
        }
    }
}

/// Answers every item in order, writing one JSON line per record as it
/// is produced.
///
/// # Errors
///
/// Returns an error only if writing to `out` fails.
#[allow(clippy::future_not_send)]
pub async fn run_batch<W: Write>(
    orchestrator: &Orchestrator<'_>,
    items: &[BatchItem],
    out: &mut W,
) -> Result<BatchSummary> {
    let mut summary = BatchSummary {
        questions: 0,
        failures: 0,
        output: None,
    };

    for item in items {
        let record = answer(orchestrator, item).await;
        serde_json::to_writer(&mut *out, &record)?;
        out.write_all(b"\n")?;
        out.flush()?;

        summary.questions += 1;
        if record.is_error() {
            summary.failures += 1;
        }
    }

    Ok(summary)
}
