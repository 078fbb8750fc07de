//! BM25 (Okapi) index over paragraph chunks of markdown documents.

use std::collections::HashMap;
use std::path::Path;

use tracing::debug;
use unicode_segmentation::UnicodeSegmentation;

use super::Retriever;
use crate::core::RetrievedChunk;
use crate::error::RetrievalError;

/// Term-frequency saturation.
const K1: f64 = 1.5;
/// Length normalization.
const B: f64 = 0.75;
/// Fraction of the mean IDF used for terms with negative IDF.
const EPSILON: f64 = 0.25;

/// A paragraph chunk held by the index.
#[derive(Debug, Clone)]
struct IndexedChunk {
    id: String,
    content: String,
    source: String,
    term_freqs: HashMap<String, u32>,
    len: usize,
}

/// In-memory BM25 index.
#[derive(Debug, Clone, Default)]
pub struct DocumentIndex {
    chunks: Vec<IndexedChunk>,
    idf: HashMap<String, f64>,
    avg_len: f64,
}

impl DocumentIndex {
    /// Loads every `*.md` file directly under `docs_dir` and indexes it.
    ///
    /// Files are processed in name order so chunk ids and tie-breaking
    /// are stable across runs.
    ///
    /// # Errors
    ///
    /// Returns [`RetrievalError::DocsNotFound`] if the directory is missing
    /// and [`RetrievalError::Read`] if a document cannot be read.
    pub fn load(docs_dir: &Path) -> Result<Self, RetrievalError> {
        if !docs_dir.is_dir() {
            return Err(RetrievalError::DocsNotFound {
                path: docs_dir.to_path_buf(),
            });
        }

        let entries = std::fs::read_dir(docs_dir).map_err(|source| RetrievalError::Read {
            path: docs_dir.to_path_buf(),
            source,
        })?;

        let mut paths: Vec<_> = entries
            .filter_map(Result::ok)
            .map(|e| e.path())
            .filter(|p| p.is_file() && p.extension().is_some_and(|ext| ext == "md"))
            .collect();
        paths.sort();

        let mut documents = Vec::with_capacity(paths.len());
        for path in paths {
            let content = std::fs::read_to_string(&path).map_err(|source| RetrievalError::Read {
                path: path.clone(),
                source,
            })?;
            let name = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            documents.push((name, content));
        }

        let index = Self::from_documents(documents);
        debug!(
            dir = %docs_dir.display(),
            chunks = index.chunks.len(),
            terms = index.idf.len(),
            "document index built"
        );
        Ok(index)
    }

    /// Builds an index from `(file_name, content)` pairs.
    #[must_use]
    pub fn from_documents<I, S>(documents: I) -> Self
    where
        I: IntoIterator<Item = (S, S)>,
        S: AsRef<str>,
    {
        let mut chunks = Vec::new();
        for (name, content) in documents {
            let name = name.as_ref();
            let stem = name.strip_suffix(".md").unwrap_or(name);
            for (idx, paragraph) in split_paragraphs(content.as_ref()).into_iter().enumerate() {
                let Some(paragraph) = paragraph else {
                    continue;
                };
                let tokens = tokenize(&paragraph);
                let mut term_freqs = HashMap::new();
                for token in &tokens {
                    *term_freqs.entry(token.clone()).or_insert(0) += 1;
                }
                chunks.push(IndexedChunk {
                    id: format!("{stem}::chunk{idx}"),
                    content: paragraph,
                    source: name.to_string(),
                    term_freqs,
                    len: tokens.len(),
                });
            }
        }

        let (idf, avg_len) = compute_idf(&chunks);
        Self {
            chunks,
            idf,
            avg_len,
        }
    }

    /// Looks up a chunk by id.
    #[must_use]
    pub fn chunk(&self, id: &str) -> Option<RetrievedChunk> {
        self.chunks
            .iter()
            .find(|c| c.id == id)
            .map(|c| to_retrieved(c, 0.0))
    }

    #[allow(clippy::cast_precision_loss)]
    fn score(&self, chunk: &IndexedChunk, query_tokens: &[String]) -> f64 {
        let norm = if self.avg_len > 0.0 {
            chunk.len as f64 / self.avg_len
        } else {
            0.0
        };
        query_tokens
            .iter()
            .map(|term| {
                let tf = f64::from(chunk.term_freqs.get(term).copied().unwrap_or(0));
                let idf = self.idf.get(term).copied().unwrap_or(0.0);
                idf * (tf * (K1 + 1.0)) / (K1.mul_add(1.0 - B + B * norm, tf))
            })
            .sum()
    }
}

impl Retriever for DocumentIndex {
    fn search(&self, query: &str, top_k: usize) -> Vec<RetrievedChunk> {
        if self.chunks.is_empty() || top_k == 0 {
            return Vec::new();
        }

        let query_tokens = tokenize(query);
        let mut scored: Vec<(usize, f64)> = self
            .chunks
            .iter()
            .enumerate()
            .map(|(i, c)| (i, self.score(c, &query_tokens)))
            .collect();

        // Stable sort keeps index order among equal scores.
        scored.sort_by(|a, b| b.1.total_cmp(&a.1));

        scored
            .into_iter()
            .take(top_k)
            .map(|(i, score)| to_retrieved(&self.chunks[i], score))
            .collect()
    }

    fn len(&self) -> usize {
        self.chunks.len()
    }
}

fn to_retrieved(chunk: &IndexedChunk, score: f64) -> RetrievedChunk {
    RetrievedChunk {
        id: chunk.id.clone(),
        content: chunk.content.clone(),
        source: chunk.source.clone(),
        score,
    }
}

/// Splits on blank lines. Blank paragraphs keep their index slot as `None`.
fn split_paragraphs(content: &str) -> Vec<Option<String>> {
    let normalized = content.replace("\r\n", "\n");
    let mut paragraphs = Vec::new();
    let mut current: Vec<&str> = Vec::new();
    let mut blank_run = 0usize;

    for line in normalized.trim().split('\n') {
        if line.is_empty() {
            blank_run += 1;
            continue;
        }
        if blank_run > 0 && !current.is_empty() {
            paragraphs.push(current.join("\n"));
            current.clear();
        }
        blank_run = 0;
        current.push(line);
    }
    if !current.is_empty() {
        paragraphs.push(current.join("\n"));
    }

    paragraphs
        .into_iter()
        .map(|p| {
            let trimmed = p.trim();
            (!trimmed.is_empty()).then(|| trimmed.to_string())
        })
        .collect()
}

fn tokenize(text: &str) -> Vec<String> {
    text.unicode_words().map(str::to_lowercase).collect()
}

#[allow(clippy::cast_precision_loss)]
fn compute_idf(chunks: &[IndexedChunk]) -> (HashMap<String, f64>, f64) {
    if chunks.is_empty() {
        return (HashMap::new(), 0.0);
    }

    let n = chunks.len() as f64;
    let total_len: usize = chunks.iter().map(|c| c.len).sum();
    let avg_len = total_len as f64 / n;

    let mut doc_freq: HashMap<&str, u32> = HashMap::new();
    for chunk in chunks {
        for term in chunk.term_freqs.keys() {
            *doc_freq.entry(term.as_str()).or_insert(0) += 1;
        }
    }

    let mut idf = HashMap::with_capacity(doc_freq.len());
    let mut idf_sum = 0.0;
    let mut negative = Vec::new();
    for (term, freq) in doc_freq {
        let freq = f64::from(freq);
        let value = (n - freq + 0.5).ln() - (freq + 0.5).ln();
        idf_sum += value;
        if value < 0.0 {
            negative.push(term.to_string());
        }
        idf.insert(term.to_string(), value);
    }

    let floor = (EPSILON * idf_sum / idf.len() as f64).max(0.0);
    for term in negative {
        idf.insert(term, floor);
    }

    (idf, avg_len)
}
