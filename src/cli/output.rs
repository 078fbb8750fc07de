//! Output formatting for CLI commands.
//!
//! Text output is for humans; JSON output is pretty-printed and stable
//! enough to pipe into `jq`.

use std::fmt::Write;

use serde::Serialize;
use serde_json::Value;

use crate::batch::{AnswerRecord, BatchSummary};
use crate::core::RetrievedChunk;

/// Output format for command results.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum OutputFormat {
    /// Human-readable text.
    #[default]
    Text,
    /// Pretty-printed JSON.
    Json,
}

impl OutputFormat {
    /// Parses a format name; unknown names fall back to text.
    #[must_use]
    pub fn parse(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "json" => Self::Json,
            _ => Self::Text,
        }
    }

    /// Serializes `value` as pretty JSON followed by a newline.
    #[must_use]
    pub fn to_json<T: Serialize + ?Sized>(self, value: &T) -> String {
        serde_json::to_string_pretty(value)
            .map_or_else(|e| format!("{{\"error\": \"{e}\"}}\n"), |s| s + "\n")
    }
}

/// Formats one answer record.
#[must_use]
pub fn format_record(record: &AnswerRecord, format: OutputFormat) -> String {
    match format {
        OutputFormat::Text => {
            let mut output = String::new();
            let _ = writeln!(output, "Answer:      {}", render_value(&record.final_answer));
            let _ = writeln!(output, "Confidence:  {:.2}", record.confidence);
            if !record.sql.is_empty() {
                let _ = writeln!(output, "SQL:         {}", record.sql);
            }
            let _ = writeln!(output, "Explanation: {}", record.explanation);
            if record.citations.is_empty() {
                output.push_str("Citations:   (none)\n");
            } else {
                let _ = writeln!(output, "Citations:   {}", record.citations.join(", "));
            }
            output
        }
        OutputFormat::Json => format.to_json(record),
    }
}

/// Formats retrieval results.
#[must_use]
pub fn format_search_results(
    results: &[RetrievedChunk],
    query: &str,
    format: OutputFormat,
) -> String {
    match format {
        OutputFormat::Text => {
            if results.is_empty() {
                return format!("No results found for query: \"{query}\"\n");
            }

            let mut output = String::new();
            let _ = writeln!(
                output,
                "Search results for \"{query}\" ({} results):\n",
                results.len()
            );
            let _ = writeln!(output, "{:<40} {:<10} {:<20}", "Chunk ID", "Score", "Source");
            output.push_str(&"-".repeat(72));
            output.push('\n');

            for chunk in results {
                let _ = writeln!(
                    output,
                    "{:<40} {:<10.4} {:<20}",
                    chunk.id, chunk.score, chunk.source
                );
                let _ = writeln!(output, "  {}", preview(&chunk.content, 120));
            }
            output
        }
        OutputFormat::Json => format.to_json(&serde_json::json!({
            "query": query,
            "count": results.len(),
            "results": results,
        })),
    }
}

/// Formats a batch run summary.
#[must_use]
pub fn format_batch_summary(summary: &BatchSummary, format: OutputFormat) -> String {
    match format {
        OutputFormat::Text => {
            let mut output = format!(
                "Answered {} question(s), {} failure(s)\n",
                summary.questions, summary.failures
            );
            if let Some(ref path) = summary.output {
                let _ = writeln!(output, "Results written to: {}", path.display());
            }
            output
        }
        OutputFormat::Json => format.to_json(summary),
    }
}

/// Renders a JSON value for text output; strings lose their quotes.
fn render_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// First line of `text`, cut to `max` characters.
fn preview(text: &str, max: usize) -> String {
    let line = text.lines().next().unwrap_or_default();
    if line.chars().count() <= max {
        line.to_string()
    } else {
        let cut: String = line.chars().take(max).collect();
        format!("{cut}...")
    }
}
