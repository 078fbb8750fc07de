//! Command-line argument parsing.
//!
//! Defines the CLI structure using clap derive macros.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Default docs directory relative to the working directory.
pub const DEFAULT_DOCS_DIR: &str = "docs";

/// Retail analytics copilot.
///
/// Answers questions over a document corpus and a read-only SQLite
/// database by routing each one through retrieval, query generation with
/// bounded repair, and answer synthesis.
#[derive(Parser, Debug)]
#[command(name = "retail-copilot")]
#[command(version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Path to the SQLite database.
    ///
    /// Defaults to `data/northwind.sqlite` in the current directory.
    #[arg(short, long, env = "COPILOT_DB_PATH", global = true)]
    pub db_path: Option<PathBuf>,

    /// Directory of markdown documents to index.
    #[arg(long, env = "COPILOT_DOCS_DIR", global = true)]
    pub docs_dir: Option<PathBuf>,

    /// Directory containing prompt template overrides.
    #[arg(long, env = "COPILOT_PROMPT_DIR", global = true)]
    pub prompt_dir: Option<PathBuf>,

    /// Enable verbose (debug) logging on stderr.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Output format (text, json).
    #[arg(long, default_value = "text", global = true)]
    pub format: String,

    /// The subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Answer every question of a JSONL file.
    ///
    /// Each input line is `{"id", "question", "format_hint"}`; each output
    /// line is `{"id", "final_answer", "sql", "confidence", "explanation",
    /// "citations"}`. Every input line yields exactly one output line.
    #[command(after_help = r#"Examples:
  retail-copilot batch --batch questions.jsonl --out answers.jsonl
  retail-copilot --docs-dir ./docs batch --batch q.jsonl --out a.jsonl
  RUST_LOG=info retail-copilot batch --batch q.jsonl --out a.jsonl
"#)]
    Batch {
        /// Input JSONL file.
        #[arg(long)]
        batch: PathBuf,

        /// Output JSONL file.
        #[arg(long)]
        out: PathBuf,
    },

    /// Answer a single question.
    #[command(after_help = r#"Examples:
  retail-copilot ask "Total revenue for order 10248?" --format-hint float
  retail-copilot ask "Top 3 products by revenue" --format-hint "list[{product:str, revenue:float}]"
  retail-copilot --format json ask "What is the return window for beverages?" | jq '.final_answer'
"#)]
    Ask {
        /// Natural-language question.
        question: String,

        /// Expected answer shape (int, float, str, `list[...]`, `{...}`).
        #[arg(short = 'H', long, default_value = "str")]
        format_hint: String,

        /// Identifier echoed in the output record.
        #[arg(long, default_value = "ask")]
        id: String,
    },

    /// Search the document index.
    ///
    /// Retrieval only; no model calls.
    #[command(after_help = r#"Examples:
  retail-copilot search "average order value"
  retail-copilot search "summer campaign" -k 5
  retail-copilot --format json search "returns policy" | jq '.results[].id'
"#)]
    Search {
        /// Search query text.
        query: String,

        /// Maximum number of results.
        #[arg(short = 'k', long, default_value = "3")]
        top_k: usize,
    },

    /// Print the database schema description.
    #[command(after_help = r#"Examples:
  retail-copilot schema
  retail-copilot schema --samples 3
"#)]
    Schema {
        /// Also print up to N sample rows per table.
        #[arg(long)]
        samples: Option<usize>,
    },

    /// Write the default prompt templates to a directory.
    ///
    /// Existing files are left untouched.
    #[command(after_help = r#"Examples:
  retail-copilot init-prompts                    # ~/.config/retail-copilot/prompts
  retail-copilot init-prompts --dir ./prompts
"#)]
    InitPrompts {
        /// Target directory.
        #[arg(long)]
        dir: Option<PathBuf>,
    },
}

impl Cli {
    /// Returns the database path, using the default if not specified.
    #[must_use]
    pub fn get_db_path(&self) -> PathBuf {
        self.db_path
            .clone()
            .unwrap_or_else(|| PathBuf::from(crate::database::DEFAULT_DB_PATH))
    }

    /// Returns the docs directory, using the default if not specified.
    #[must_use]
    pub fn get_docs_dir(&self) -> PathBuf {
        self.docs_dir
            .clone()
            .unwrap_or_else(|| PathBuf::from(DEFAULT_DOCS_DIR))
    }
}
