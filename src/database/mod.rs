//! Read-only query collaborator.
//!
//! The orchestrator talks to the database through [`QueryBackend`];
//! [`SqliteDatabase`] is the bundled implementation.

pub mod sqlite;

pub use sqlite::{DEFAULT_DB_PATH, SqliteDatabase};

use serde::Serialize;

use crate::error::DatabaseError;

/// A result row keyed by column name.
pub type Row = serde_json::Map<String, serde_json::Value>;

/// Outcome of running one query.
///
/// `error` is `None` on success; rows may still be empty.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct QueryOutput {
    /// Column names in result order.
    pub columns: Vec<String>,
    /// Result rows.
    pub rows: Vec<Row>,
    /// Error message when execution failed.
    pub error: Option<String>,
}

impl QueryOutput {
    /// Builds a failed output carrying `message`.
    #[must_use]
    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            columns: Vec::new(),
            rows: Vec::new(),
            error: Some(message.into()),
        }
    }

    /// Whether the query executed without error.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

/// Executes read-only query text against a database.
pub trait QueryBackend {
    /// Runs `sql` and reports rows or the database's error message.
    fn execute(&self, sql: &str) -> QueryOutput;

    /// Plain-text description of every table: name, columns, types and
    /// primary-key flags.
    fn schema_description(&self) -> Result<String, DatabaseError>;
}
