/// File indexing pipeline: file → chunks → symbols → embeddings.
///
/// [`core::CodeIndexer`] orchestrates the pipeline and owns the
/// incremental-indexing ledger; [`chunker`] slices files into overlapping
/// line windows; [`extractor`] pulls symbols, imports/exports, and call
/// sites out of source text with per-language patterns.
pub mod chunker;
pub mod core;
pub mod extractor;

pub use self::core::CodeIndexer;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A contiguous, possibly overlapping slice of a file's lines — the unit
/// of embedding.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chunk {
    /// Derived deterministically from (path, start_line, end_line).
    pub id: String,
    pub path: String,
    /// 1-based first line of the slice.
    pub start_line: u32,
    /// 1-based last line of the slice (inclusive).
    pub end_line: u32,
    pub content: String,
    pub content_hash: String,
    pub language: Option<String>,
    /// Names of symbols overlapping this line range.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub symbols: Vec<String>,
    /// Import names parsed from the slice.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub imports: Vec<String>,
    /// Export names parsed from the slice.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub exports: Vec<String>,
    /// Whether a vector document exists for this chunk.
    #[serde(default)]
    pub has_embedding: bool,
}

impl Chunk {
    /// Text handed to the embedder: language and symbol context ahead of
    /// the raw content.
    #[must_use]
    pub fn embedding_text(&self) -> String {
        let language = self.language.as_deref().unwrap_or("text");
        if self.symbols.is_empty() {
            format!("{language}: {}", self.content)
        } else {
            format!("{language} {}: {}", self.symbols.join(" "), self.content)
        }
    }
}

/// The incremental-indexing ledger entry for one file. Its presence with a
/// matching content hash is the sole authority for "nothing changed, skip".
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileIndexEntry {
    pub path: String,
    pub content_hash: String,
    pub indexed_at: DateTime<Utc>,
    pub chunk_count: usize,
    pub symbol_count: usize,
    /// False while any chunk still lacks its vector.
    pub embedded: bool,
}

/// Per-file outcome of an indexing attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileOutcome {
    Indexed,
    /// Content hash matched the ledger; nothing was done.
    Unchanged,
    /// Path rejected by include/exclude filters.
    Filtered,
    /// File exceeded the size cap.
    Oversized,
}

/// Aggregate outcome of a batch run.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexReport {
    pub indexed: usize,
    pub unchanged: usize,
    pub filtered: usize,
    pub oversized: usize,
}

impl IndexReport {
    pub(crate) fn record(&mut self, outcome: FileOutcome) {
        match outcome {
            FileOutcome::Indexed => self.indexed += 1,
            FileOutcome::Unchanged => self.unchanged += 1,
            FileOutcome::Filtered => self.filtered += 1,
            FileOutcome::Oversized => self.oversized += 1,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexerStats {
    pub files: usize,
    pub chunks: usize,
    pub pending_embeddings: usize,
}
