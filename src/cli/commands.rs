//! CLI command implementations.
//!
//! Every command returns its stdout text; logging goes to stderr.

use std::fmt::Write as FmtWrite;
use std::path::{Path, PathBuf};

use tracing::info;

use crate::agent::{AgentConfig, Orchestrator, PromptSet, create_provider};
use crate::batch::{self, AnswerRecord, BatchItem};
use crate::cli::output::{
    OutputFormat, format_batch_summary, format_record, format_search_results,
};
use crate::cli::parser::{Cli, Commands};
use crate::core::Question;
use crate::database::{QueryBackend, SqliteDatabase};
use crate::error::{CommandError, Result};
use crate::retrieval::{DocumentIndex, Retriever};

/// Executes the CLI command.
///
/// # Returns
///
/// Result with output string on success.
///
/// # Errors
///
/// Returns an error if startup (database, documents, provider) fails or
/// the command itself cannot complete. Per-question failures during
/// `batch` become error records instead.
pub fn execute(cli: &Cli) -> Result<String> {
    let format = OutputFormat::parse(&cli.format);

    match &cli.command {
        Commands::Batch { batch, out } => cmd_batch(cli, batch, out, format),
        Commands::Ask {
            question,
            format_hint,
            id,
        } => cmd_ask(cli, &Question::new(id.as_str(), question.as_str(), format_hint), format),
        Commands::Search { query, top_k } => cmd_search(&cli.get_docs_dir(), query, *top_k, format),
        Commands::Schema { samples } => cmd_schema(&cli.get_db_path(), *samples, format),
        Commands::InitPrompts { dir } => cmd_init_prompts(dir.as_deref(), format),
    }
}

/// Shared read-only context opened once per run.
struct Context {
    db: SqliteDatabase,
    index: DocumentIndex,
    config: AgentConfig,
}

impl Context {
    /// Opens the database and document index and resolves configuration.
    ///
    /// Any failure here aborts the run before a question is read.
    fn open(cli: &Cli) -> Result<Self> {
        let db = SqliteDatabase::open(&cli.get_db_path())?;
        let index = DocumentIndex::load(&cli.get_docs_dir())?;

        let mut builder = AgentConfig::builder();
        if let Some(ref dir) = cli.prompt_dir {
            builder = builder.prompt_dir(dir.clone());
        }
        let config = builder.from_env().build()?;

        info!(
            chunks = index.len(),
            provider = %config.provider,
            "startup complete"
        );
        Ok(Self { db, index, config })
    }

    fn orchestrator(&self) -> Result<Orchestrator<'_>> {
        let provider = create_provider(&self.config)?;
        Ok(Orchestrator::new(
            provider,
            self.config.clone(),
            &self.index,
            &self.db,
        )?)
    }
}

fn runtime() -> Result<tokio::runtime::Runtime> {
    tokio::runtime::Runtime::new().map_err(|e| {
        CommandError::ExecutionFailed(format!("Failed to create async runtime: {e}")).into()
    })
}

fn cmd_batch(cli: &Cli, input: &Path, output: &Path, format: OutputFormat) -> Result<String> {
    let context = Context::open(cli)?;
    let orchestrator = context.orchestrator()?;

    let items = batch::read_batch(input).map_err(|e| {
        CommandError::ExecutionFailed(format!(
            "Failed to read batch file {}: {e}",
            input.display()
        ))
    })?;
    info!(questions = items.len(), input = %input.display(), "batch loaded");

    if let Some(parent) = output.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    let mut writer = std::io::BufWriter::new(std::fs::File::create(output)?);

    let rt = runtime()?;
    let mut summary = rt.block_on(batch::run_batch(&orchestrator, &items, &mut writer))?;
    summary.output = Some(output.to_path_buf());

    Ok(format_batch_summary(&summary, format))
}

fn cmd_ask(cli: &Cli, question: &Question, format: OutputFormat) -> Result<String> {
    let context = Context::open(cli)?;
    let orchestrator = context.orchestrator()?;

    let rt = runtime()?;
    let record: AnswerRecord = rt.block_on(batch::answer(
        &orchestrator,
        &BatchItem::Question(question.clone()),
    ));

    Ok(format_record(&record, format))
}

fn cmd_search(docs_dir: &Path, query: &str, top_k: usize, format: OutputFormat) -> Result<String> {
    if top_k == 0 {
        return Err(CommandError::InvalidArgument("top-k must be at least 1".to_string()).into());
    }
    let index = DocumentIndex::load(docs_dir)?;
    let results = index.search(query, top_k);
    Ok(format_search_results(&results, query, format))
}

fn cmd_schema(db_path: &Path, samples: Option<usize>, format: OutputFormat) -> Result<String> {
    let db = SqliteDatabase::open(db_path)?;
    let schema = db.schema_description()?;

    let mut sampled = Vec::new();
    if let Some(limit) = samples.filter(|&n| n > 0) {
        for table in db.table_names()? {
            let rows = db.sample(&table, limit);
            sampled.push((table, rows));
        }
    }

    match format {
        OutputFormat::Text => {
            let mut output = schema;
            for (table, rows) in &sampled {
                let _ = write!(output, "\n## Sample rows: {table}\n");
                if let Some(ref error) = rows.error {
                    let _ = writeln!(output, "  (error: {error})");
                    continue;
                }
                if rows.rows.is_empty() {
                    output.push_str("  (empty)\n");
                }
                for row in &rows.rows {
                    let _ = writeln!(output, "  {}", serde_json::Value::Object(row.clone()));
                }
            }
            Ok(output)
        }
        OutputFormat::Json => {
            let samples: serde_json::Map<String, serde_json::Value> = sampled
                .into_iter()
                .map(|(table, rows)| (table, serde_json::json!(rows.rows)))
                .collect();
            let json = serde_json::json!({
                "database": db_path.to_string_lossy(),
                "schema": schema,
                "samples": samples,
            });
            Ok(format.to_json(&json))
        }
    }
}

fn cmd_init_prompts(dir: Option<&Path>, format: OutputFormat) -> Result<String> {
    let target_dir = dir
        .map(PathBuf::from)
        .or_else(PromptSet::default_dir)
        .ok_or_else(|| {
            CommandError::ExecutionFailed(
                "Could not determine home directory for default prompt path".to_string(),
            )
        })?;

    let written = PromptSet::write_defaults(&target_dir).map_err(|e| {
        CommandError::ExecutionFailed(format!("Failed to write prompt templates: {e}"))
    })?;

    match format {
        OutputFormat::Text => {
            if written.is_empty() {
                return Ok(format!(
                    "All prompt templates already exist in: {}\n",
                    target_dir.display()
                ));
            }
            let mut output = format!(
                "Wrote {} prompt template(s) to: {}\n",
                written.len(),
                target_dir.display()
            );
            for path in &written {
                let _ = writeln!(
                    output,
                    "  {}",
                    path.file_name()
                        .and_then(|n| n.to_str())
                        .unwrap_or("unknown")
                );
            }
            output.push_str("\nEdit these files to customize the stage prompts.\n");
            Ok(output)
        }
        OutputFormat::Json => {
            let json = serde_json::json!({
                "directory": target_dir.to_string_lossy(),
                "written": written
                    .iter()
                    .map(|p| p.to_string_lossy().into_owned())
                    .collect::<Vec<_>>(),
                "count": written.len()
            });
            Ok(format.to_json(&json))
        }
    }
}
