//! Retrieved document chunks.

use serde::{Deserialize, Serialize};

/// A unit of document text returned by the retriever.
///
/// Read-only to the orchestration stages.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievedChunk {
    /// Stable key, `"{file_stem}::chunk{n}"`.
    pub id: String,
    /// Paragraph text.
    pub content: String,
    /// Source file name.
    pub source: String,
    /// Relevance score (non-negative, higher is better, not normalized).
    pub score: f64,
}

/// Arithmetic mean of chunk scores, `0.0` when there are none.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn mean_score(chunks: &[RetrievedChunk]) -> f64 {
    if chunks.is_empty() {
        return 0.0;
    }
    chunks.iter().map(|c| c.score).sum::<f64>() / chunks.len() as f64
}
