//! Error types for the retail copilot.
//!
//! Each layer has its own error enum; [`Error`] aggregates them for the
//! CLI and batch layers.

use std::path::PathBuf;

use thiserror::Error;

/// Crate-level result alias.
pub type Result<T> = std::result::Result<T, Error>;

/// Top-level error type.
#[derive(Debug, Error)]
pub enum Error {
    /// Database collaborator failure.
    #[error("database error: {0}")]
    Database(#[from] DatabaseError),

    /// Document retrieval failure.
    #[error("retrieval error: {0}")]
    Retrieval(#[from] RetrievalError),

    /// LM or orchestration failure.
    #[error("agent error: {0}")]
    Agent(#[from] AgentError),

    /// CLI command failure.
    #[error("command error: {0}")]
    Command(#[from] CommandError),

    /// I/O failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON (de)serialization failure.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Errors from the SQLite query collaborator.
#[derive(Debug, Error)]
pub enum DatabaseError {
    /// The database file does not exist.
    #[error("database not found at {}", path.display())]
    NotFound {
        /// Path that was checked.
        path: PathBuf,
    },

    /// The underlying SQLite call failed.
    #[error("sqlite: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

/// Errors from the document retrieval collaborator.
#[derive(Debug, Error)]
pub enum RetrievalError {
    /// The docs directory does not exist or is not a directory.
    #[error("docs directory not found at {}", path.display())]
    DocsNotFound {
        /// Path that was checked.
        path: PathBuf,
    },

    /// A document could not be read.
    #[error("failed to read {}: {source}", path.display())]
    Read {
        /// Offending file.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },
}

/// Errors from the LM collaborator and the orchestration stages.
#[derive(Debug, Error)]
pub enum AgentError {
    /// No API key configured.
    #[error("no API key configured (set OPENAI_API_KEY or COPILOT_API_KEY)")]
    ApiKeyMissing,

    /// A configuration value is out of range.
    #[error("invalid configuration: {message}")]
    InvalidConfig {
        /// What is wrong.
        message: String,
    },

    /// Provider name not recognised.
    #[error("unsupported provider: {name}")]
    UnsupportedProvider {
        /// Requested provider name.
        name: String,
    },

    /// The provider returned an error.
    #[error("API request failed: {message}")]
    ApiRequest {
        /// Provider error message.
        message: String,
        /// HTTP status, when known.
        status: Option<u16>,
    },

    /// The provider call exceeded the configured timeout.
    #[error("LM request timed out after {secs}s")]
    Timeout {
        /// Timeout in seconds.
        secs: u64,
    },

    /// Structured output could not be parsed.
    #[error("failed to parse response: {message}")]
    ResponseParse {
        /// What went wrong.
        message: String,
        /// Raw model output.
        content: String,
    },

    /// Query generation produced nothing executable.
    #[error("query generation produced an empty query")]
    EmptyQuery,

    /// Orchestration precondition failed.
    #[error("orchestration error: {message}")]
    Orchestration {
        /// Description of the failure.
        message: String,
    },
}

/// Errors raised by CLI commands.
#[derive(Debug, Error)]
pub enum CommandError {
    /// Invalid argument value.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Command failed to run.
    #[error("{0}")]
    ExecutionFailed(String),
}
