//! Document retrieval collaborator.
//!
//! The orchestrator only depends on the [`Retriever`] trait. The bundled
//! implementation is an in-memory BM25 index over a directory of
//! markdown documents, built once at startup and read-only afterwards.

pub mod bm25;

pub use bm25::DocumentIndex;

use crate::core::RetrievedChunk;

/// Ranked text search over a document corpus.
pub trait Retriever {
    /// Returns up to `top_k` chunks ordered by relevance, highest first.
    fn search(&self, query: &str, top_k: usize) -> Vec<RetrievedChunk>;

    /// Number of indexed chunks.
    fn len(&self) -> usize;

    /// Whether the index holds no chunks.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
