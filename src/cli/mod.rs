//! CLI layer for the retail copilot.
//!
//! Provides the command-line interface using clap: batch answering,
//! single questions, document search, schema inspection and prompt
//! scaffolding.

pub mod commands;
pub mod output;
pub mod parser;

pub use commands::execute;
pub use output::OutputFormat;
pub use parser::{Cli, Commands};
