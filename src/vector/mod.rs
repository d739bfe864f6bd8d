/// Vector document model and similarity store.
///
/// A [`VectorDocument`] is a (content, embedding, metadata) triple. The
/// in-memory [`store::VectorStore`] is authoritative for queries; the
/// SQLite mirror in [`storage`] is best-effort durability only.
pub mod storage;
pub mod store;

pub use storage::{SqliteStorage, StorageError, StorageOp};
pub use store::{
    DocumentFilter, HybridParams, SearchParams, SimilarParams, VectorStore, VectorStoreStats,
};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// What kind of artifact a vector document was built from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactKind {
    Chunk,
    Symbol,
    File,
}

impl ArtifactKind {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            ArtifactKind::Chunk => "chunk",
            ArtifactKind::Symbol => "symbol",
            ArtifactKind::File => "file",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentMetadata {
    pub path: String,
    pub artifact: ArtifactKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    pub start_line: u32,
    pub end_line: u32,
    pub indexed_at: DateTime<Utc>,
    pub content_hash: String,
    /// True when the embedding came from the local fallback rather than the
    /// external service; scores across the two provenances are not
    /// meaningfully comparable.
    #[serde(default)]
    pub degraded: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VectorDocument {
    pub id: String,
    pub content: String,
    pub embedding: Vec<f32>,
    pub metadata: DocumentMetadata,
}

/// A scored document returned from a vector query.
#[derive(Debug, Clone)]
pub struct VectorSearchResult {
    pub document: VectorDocument,
    pub score: f32,
}

/// Cosine similarity of two vectors: dot(a, b) / (‖a‖·‖b‖).
///
/// Defined as 0.0 when either vector has zero magnitude or the lengths
/// differ, so the result is never NaN or infinite.
#[must_use]
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;
    for (x, y) in a.iter().zip(b) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    dot / (norm_a.sqrt() * norm_b.sqrt())
}

#[cfg(test)]
mod tests {
    use super::*;

    const TOLERANCE: f32 = 1e-5;

    #[test]
    fn test_cosine_identity() {
        let v = vec![0.3, -0.7, 0.2, 0.9];
        assert!((cosine_similarity(&v, &v) - 1.0).abs() < TOLERANCE);
    }

    #[test]
    fn test_cosine_orthogonal() {
        let a = vec![1.0, 0.0];
        let b = vec![0.0, 1.0];
        assert!(cosine_similarity(&a, &b).abs() < TOLERANCE);
    }

    #[test]
    fn test_cosine_opposite() {
        let a = vec![0.5, -0.25, 1.0];
        let b = vec![-0.5, 0.25, -1.0];
        assert!((cosine_similarity(&a, &b) + 1.0).abs() < TOLERANCE);
    }

    #[test]
    fn test_cosine_zero_magnitude_is_zero() {
        let zero = vec![0.0, 0.0, 0.0];
        let v = vec![1.0, 2.0, 3.0];
        assert_eq!(cosine_similarity(&zero, &v), 0.0);
        assert_eq!(cosine_similarity(&zero, &zero), 0.0);
    }

    #[test]
    fn test_cosine_length_mismatch_is_zero() {
        let a = vec![1.0, 2.0];
        let b = vec![1.0, 2.0, 3.0];
        assert_eq!(cosine_similarity(&a, &b), 0.0);
    }
}
