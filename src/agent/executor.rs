//! Read-only query gate.
//!
//! Wraps a [`QueryBackend`] and refuses anything that does not start with a
//! read-only keyword before it reaches the database. This is a first line
//! check, not a parser; the SQLite backend also rejects statements that
//! would write.

use serde::Serialize;

use crate::database::{QueryBackend, QueryOutput, Row};

/// Error returned for queries that do not start with `SELECT` or `WITH`.
pub const READ_ONLY_ERROR: &str = "Only SELECT queries are allowed for safety";

/// Leading keywords accepted by the gate.
const READ_ONLY_KEYWORDS: [&str; 2] = ["select", "with"];

/// One generated query and its outcome.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct QueryAttempt {
    /// Query text; empty when generation itself failed.
    pub query: String,
    /// Column names of the result.
    pub columns: Vec<String>,
    /// Result rows, possibly empty.
    pub rows: Vec<Row>,
    /// Error message, present iff the attempt failed.
    pub error: Option<String>,
}

impl QueryAttempt {
    /// Records a generation failure; nothing was executed.
    #[must_use]
    pub fn generation_failed(message: impl Into<String>) -> Self {
        Self {
            error: Some(message.into()),
            ..Self::default()
        }
    }

    /// Whether the query ran without error.
    #[must_use]
    pub const fn succeeded(&self) -> bool {
        self.error.is_none()
    }

    /// Whether the query succeeded with at least one row.
    #[must_use]
    pub fn has_rows(&self) -> bool {
        self.succeeded() && !self.rows.is_empty()
    }

    /// Backend-shaped view of this attempt.
    #[must_use]
    pub fn output(&self) -> QueryOutput {
        QueryOutput {
            columns: self.columns.clone(),
            rows: self.rows.clone(),
            error: self.error.clone(),
        }
    }
}

/// Whether `sql` starts with a read-only keyword.
#[must_use]
pub fn is_read_only(sql: &str) -> bool {
    let first = sql
        .trim_start()
        .split(|c: char| c.is_whitespace() || c == '(')
        .next()
        .unwrap_or_default()
        .to_lowercase();
    READ_ONLY_KEYWORDS.contains(&first.as_str())
}

/// Runs gated queries against a backend.
pub struct QueryExecutor<'a> {
    backend: &'a dyn QueryBackend,
}

impl<'a> QueryExecutor<'a> {
    /// Creates an executor over `backend`.
    #[must_use]
    pub fn new(backend: &'a dyn QueryBackend) -> Self {
        Self { backend }
    }

    /// Executes `sql` if it passes the read-only gate.
    ///
    /// Backend errors are reported unchanged in [`QueryAttempt::error`].
    #[must_use]
    pub fn execute(&self, sql: &str) -> QueryAttempt {
        if !is_read_only(sql) {
            tracing::warn!(sql, "rejected non-read-only query");
            return QueryAttempt {
                query: sql.to_string(),
                error: Some(READ_ONLY_ERROR.to_string()),
                ..QueryAttempt::default()
            };
        }

        let output = self.backend.execute(sql);
        QueryAttempt {
            query: sql.to_string(),
            columns: output.columns,
            rows: output.rows,
            error: output.error,
        }
    }
}
