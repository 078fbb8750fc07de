//! System prompts and template builders for agents.
//!
//! Prompts are the core instructions that define each stage's behavior.
//! Template builders format the user message from the question and the
//! state gathered so far.

use std::fmt::Write;
use std::path::{Path, PathBuf};

use super::signature::{self, EMPTY_FIELD};
use crate::core::{FormatHint, RetrievedChunk};
use crate::database::QueryOutput;

/// System prompt for the router agent.
pub const ROUTER_SYSTEM_PROMPT: &str = r#"You classify retail analytics questions by how they must be answered.

## Strategies

- "rag": the answer is in the policy, calendar or KPI documents alone (return windows, campaign dates, metric definitions).
- "sql": the answer needs only the Northwind database (totals, counts, rankings over orders, products, customers).
- "hybrid": the question needs document context to constrain a database query (for example revenue during a named campaign, or a KPI whose formula lives in the docs).

When unsure, answer "hybrid".

## Output Format (JSON)

```json
{"route": "rag" | "sql" | "hybrid", "reasoning": "one sentence"}
```

Return ONLY the JSON object, no surrounding text."#;

/// System prompt for the query generator agent.
pub const SQL_SYSTEM_PROMPT: &str = r#"You write SQLite queries against a Northwind retail database.

## Instructions

1. Use only tables and columns that appear in the schema. Quote names that contain spaces with double quotes, e.g. "Order Details".
2. Apply every date range, entity and formula given in the constraints.
3. Revenue is SUM(UnitPrice * Quantity * (1 - Discount)) unless the constraints define it differently.
4. Write a single read-only statement starting with SELECT or WITH. Never modify data.
5. If error feedback from a previous attempt is present, fix the cause of that error.

## Output Format (JSON)

```json
{"sql": "SELECT ...", "explanation": "one sentence"}
```

Return ONLY the JSON object, no surrounding text."#;

/// System prompt for the synthesizer agent.
pub const SYNTHESIZER_SYSTEM_PROMPT: &str = r#"You answer retail analytics questions from document excerpts and SQL results.

## Instructions

1. Use only the retrieval results and SQL results provided. Do not invent figures.
2. Match the format hint exactly:
   - int: a bare integer.
   - float: a bare number, rounded to 2 decimals.
   - {...}: a JSON object with the described keys.
   - list[...]: a JSON array of the described items.
   - anything else: a short plain-text answer.
3. Keep the explanation to at most 2 sentences.
4. Cite the database tables and document chunk IDs you relied on.

## Output Format (JSON)

```json
{"final_answer": <value>, "confidence": 0.0-1.0, "explanation": "...", "citations": "orders, kpi_definitions::chunk0"}
```

Return ONLY the JSON object, no surrounding text."#;

/// System prompt for the free-text fallback synthesizer.
pub const FALLBACK_SYSTEM_PROMPT: &str = r"You answer retail analytics questions from the data provided.

Reply in exactly three labeled sections, each on its own line:

ANSWER: <the answer in the requested format>
EXPLANATION: <at most 2 sentences>
CITATIONS: <comma-separated table names and document chunk IDs>

Do not add any other text.";

/// Default prompt directory under user config.
const DEFAULT_PROMPT_DIR: &str = ".config/retail-copilot/prompts";

/// Filename for the router prompt template.
const ROUTER_FILENAME: &str = "router.md";
/// Filename for the query generator prompt template.
const SQL_FILENAME: &str = "sql.md";
/// Filename for the synthesizer prompt template.
const SYNTHESIZER_FILENAME: &str = "synthesizer.md";
/// Filename for the fallback synthesizer prompt template.
const FALLBACK_FILENAME: &str = "fallback.md";

/// Rendered when there are no retrieved chunks.
const NO_RETRIEVAL: &str = "No retrieval results";
/// Rendered when no query ran or it failed.
const NO_SQL: &str = "No SQL results";

/// A set of system prompts for all agents.
///
/// Loaded from external template files when available, falling back to
/// compiled-in defaults. Use [`PromptSet::load`] to resolve the prompt
/// directory from CLI flags, environment variables, or the default path.
#[derive(Debug, Clone)]
pub struct PromptSet {
    /// System prompt for the router.
    pub router: String,
    /// System prompt for the query generator.
    pub sql: String,
    /// System prompt for the synthesizer.
    pub synthesizer: String,
    /// System prompt for the fallback synthesizer.
    pub fallback: String,
}

impl PromptSet {
    /// Loads prompts from the given directory, falling back to compiled-in defaults.
    ///
    /// Resolution order for `prompt_dir`:
    /// 1. Explicit `prompt_dir` argument (from `--prompt-dir` CLI flag)
    /// 2. `COPILOT_PROMPT_DIR` environment variable
    /// 3. `~/.config/retail-copilot/prompts/`
    ///
    /// Each file is loaded independently; a missing file uses its default.
    #[must_use]
    pub fn load(prompt_dir: Option<&Path>) -> Self {
        let resolved_dir = prompt_dir
            .map(PathBuf::from)
            .or_else(|| std::env::var("COPILOT_PROMPT_DIR").ok().map(PathBuf::from))
            .or_else(Self::default_dir);

        let load_file = |filename: &str, default: &str| -> String {
            resolved_dir
                .as_ref()
                .map(|dir| dir.join(filename))
                .and_then(|path| std::fs::read_to_string(&path).ok())
                .unwrap_or_else(|| default.to_string())
        };

        Self {
            router: load_file(ROUTER_FILENAME, ROUTER_SYSTEM_PROMPT),
            sql: load_file(SQL_FILENAME, SQL_SYSTEM_PROMPT),
            synthesizer: load_file(SYNTHESIZER_FILENAME, SYNTHESIZER_SYSTEM_PROMPT),
            fallback: load_file(FALLBACK_FILENAME, FALLBACK_SYSTEM_PROMPT),
        }
    }

    /// Returns compiled-in defaults without checking the filesystem.
    #[must_use]
    pub fn defaults() -> Self {
        Self {
            router: ROUTER_SYSTEM_PROMPT.to_string(),
            sql: SQL_SYSTEM_PROMPT.to_string(),
            synthesizer: SYNTHESIZER_SYSTEM_PROMPT.to_string(),
            fallback: FALLBACK_SYSTEM_PROMPT.to_string(),
        }
    }

    /// Writes the compiled-in default prompts to the given directory.
    ///
    /// Creates the directory if it does not exist. Existing files are
    /// **not** overwritten.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if directory creation or file writing fails.
    pub fn write_defaults(dir: &Path) -> std::io::Result<Vec<PathBuf>> {
        std::fs::create_dir_all(dir)?;

        let templates = [
            (ROUTER_FILENAME, ROUTER_SYSTEM_PROMPT),
            (SQL_FILENAME, SQL_SYSTEM_PROMPT),
            (SYNTHESIZER_FILENAME, SYNTHESIZER_SYSTEM_PROMPT),
            (FALLBACK_FILENAME, FALLBACK_SYSTEM_PROMPT),
        ];

        let mut written = Vec::new();
        for (filename, content) in &templates {
            let path = dir.join(filename);
            if !path.exists() {
                std::fs::write(&path, content)?;
                written.push(path);
            }
        }

        Ok(written)
    }

    /// Returns the default prompt directory under the user's home.
    ///
    /// Returns `None` if the home directory cannot be determined.
    #[must_use]
    pub fn default_dir() -> Option<PathBuf> {
        dirs::home_dir().map(|h| h.join(DEFAULT_PROMPT_DIR))
    }
}

/// Builds the user message for the router.
#[must_use]
pub fn build_router_prompt(question: &str) -> String {
    signature::ROUTER.render(&[("question", question)])
}

/// Builds the user message for the query generator.
///
/// `error_feedback` is `None` on the first attempt.
#[must_use]
pub fn build_sql_prompt(
    question: &str,
    schema: &str,
    constraints: &str,
    error_feedback: Option<&str>,
) -> String {
    signature::NL2SQL.render(&[
        ("question", question),
        ("schema", schema),
        ("constraints", constraints),
        ("error_feedback", error_feedback.unwrap_or(EMPTY_FIELD)),
    ])
}

/// Builds the user message for the synthesizer.
#[must_use]
pub fn build_synthesizer_prompt(
    question: &str,
    format_hint: &FormatHint,
    chunks: &[RetrievedChunk],
    sql: Option<&QueryOutput>,
) -> String {
    signature::SYNTHESIZER.render(&[
        ("question", question),
        ("format_hint", format_hint.as_str()),
        ("retrieval_results", &format_retrieval(chunks)),
        ("sql_results", &format_sql_results(sql)),
    ])
}

/// Builds the user message for the free-text fallback synthesizer.
#[must_use]
pub fn build_fallback_prompt(
    question: &str,
    format_hint: &FormatHint,
    chunks: &[RetrievedChunk],
    sql: Option<&QueryOutput>,
) -> String {
    format!(
        "Question: {question}\n\
         Format: {hint}\n\n\
         Document excerpts:\n{docs}\n\n\
         SQL results:\n{rows}\n\n\
         Reply with ANSWER:, EXPLANATION: and CITATIONS: lines.",
        hint = format_hint.as_str(),
        docs = format_retrieval(chunks),
        rows = format_sql_results(sql),
    )
}

/// Formats retrieved chunks with their IDs and scores.
#[must_use]
pub fn format_retrieval(chunks: &[RetrievedChunk]) -> String {
    if chunks.is_empty() {
        return NO_RETRIEVAL.to_string();
    }
    let mut out = String::new();
    for chunk in chunks {
        let _ = write!(
            out,
            "[{id}] (score: {score:.2})\n{content}\n\n",
            id = chunk.id,
            score = chunk.score,
            content = chunk.content,
        );
    }
    out.trim_end().to_string()
}

/// Serializes successful query rows as JSON.
///
/// Failed or absent queries render as a fixed placeholder.
#[must_use]
pub fn format_sql_results(sql: Option<&QueryOutput>) -> String {
    sql.filter(|out| out.is_success())
        .and_then(|out| serde_json::to_string(&out.rows).ok())
        .unwrap_or_else(|| NO_SQL.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn chunk(id: &str, score: f64) -> RetrievedChunk {
        RetrievedChunk {
            id: id.to_string(),
            content: "Summer Beverages 1997: 1997-06-01 to 1997-06-30".to_string(),
            source: "marketing_calendar.md".to_string(),
            score,
        }
    }

    #[test]
    fn test_build_router_prompt() {
        let prompt = build_router_prompt("What is the return window for beverages?");
        assert!(prompt.contains("<question>\nWhat is the return window for beverages?\n</question>"));
        assert!(prompt.contains("\"route\""));
    }

    #[test]
    fn test_build_sql_prompt_first_attempt() {
        let prompt = build_sql_prompt("q", "## Table: Orders", "No specific constraints", None);
        assert!(prompt.contains("<error_feedback>\nNone\n</error_feedback>"));
        assert!(prompt.contains("<constraints>\nNo specific constraints\n</constraints>"));
    }

    #[test]
    fn test_build_sql_prompt_repair() {
        let prompt = build_sql_prompt("q", "schema", "c", Some("no such column: UnitPrize"));
        assert!(prompt.contains("no such column: UnitPrize"));
    }

    #[test]
    fn test_build_synthesizer_prompt() {
        let rows = QueryOutput {
            columns: vec!["revenue".to_string()],
            rows: vec![
                json!({"revenue": 440.0})
                    .as_object()
                    .cloned()
                    .unwrap_or_default(),
            ],
            error: None,
        };
        let prompt = build_synthesizer_prompt(
            "total revenue",
            &FormatHint::Float,
            &[chunk("marketing_calendar::chunk0", 1.25)],
            Some(&rows),
        );
        assert!(prompt.contains("<format_hint>\nfloat\n</format_hint>"));
        assert!(prompt.contains("[marketing_calendar::chunk0] (score: 1.25)"));
        assert!(prompt.contains(r#"[{"revenue":440.0}]"#));
    }

    #[test]
    fn test_placeholders_for_missing_results() {
        assert_eq!(format_retrieval(&[]), "No retrieval results");
        assert_eq!(format_sql_results(None), "No SQL results");
        let failed = QueryOutput::failure("syntax error");
        assert_eq!(format_sql_results(Some(&failed)), "No SQL results");
    }

    #[test]
    fn test_build_fallback_prompt() {
        let prompt = build_fallback_prompt("q", &FormatHint::Int, &[], None);
        assert!(prompt.contains("Format: int"));
        assert!(prompt.contains("ANSWER:"));
    }

    #[test]
    fn test_write_defaults_does_not_overwrite() {
        let dir = tempfile::tempdir().unwrap_or_else(|_| unreachable!());
        std::fs::write(dir.path().join("router.md"), "custom").unwrap_or_else(|_| unreachable!());

        let written = PromptSet::write_defaults(dir.path()).unwrap_or_else(|_| unreachable!());
        assert_eq!(written.len(), 3);

        let loaded = PromptSet::load(Some(dir.path()));
        assert_eq!(loaded.router, "custom");
        assert_eq!(loaded.sql, SQL_SYSTEM_PROMPT);
    }

    #[test]
    fn test_prompts_not_empty() {
        let defaults = PromptSet::defaults();
        assert!(!defaults.router.is_empty());
        assert!(!defaults.sql.is_empty());
        assert!(!defaults.synthesizer.is_empty());
        assert!(!defaults.fallback.is_empty());
    }
}
