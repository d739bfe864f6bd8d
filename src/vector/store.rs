/// In-memory vector store with similarity, hybrid, and find-similar search.
///
/// The store is authoritative: every query is answered from memory, and
/// mutations are mirrored to durable storage on a channel without ever
/// blocking. Insertion order is kept so equal scores rank deterministically.
use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::warn;

use super::storage::StorageOp;
use super::{VectorDocument, VectorSearchResult, cosine_similarity};

/// Metadata constraints applied before scoring.
#[derive(Debug, Clone, Default)]
pub struct DocumentFilter {
    pub path_prefix: Option<String>,
    pub language: Option<String>,
    pub artifact: Option<super::ArtifactKind>,
}

impl DocumentFilter {
    fn matches(&self, document: &VectorDocument) -> bool {
        if let Some(prefix) = &self.path_prefix {
            let path = &document.metadata.path;
            if path != prefix && !path.starts_with(&format!("{prefix}/")) {
                return false;
            }
        }
        if let Some(language) = &self.language {
            if document.metadata.language.as_deref() != Some(language.as_str()) {
                return false;
            }
        }
        if let Some(artifact) = self.artifact {
            if document.metadata.artifact != artifact {
                return false;
            }
        }
        true
    }
}

#[derive(Debug, Clone)]
pub struct SearchParams {
    pub limit: usize,
    pub min_score: f32,
    pub filter: Option<DocumentFilter>,
}

impl Default for SearchParams {
    fn default() -> Self {
        Self {
            limit: 10,
            min_score: 0.0,
            filter: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct HybridParams {
    pub semantic_weight: f32,
    pub keyword_weight: f32,
    pub limit: usize,
    pub min_score: f32,
}

impl Default for HybridParams {
    fn default() -> Self {
        Self {
            semantic_weight: 0.6,
            keyword_weight: 0.4,
            limit: 10,
            min_score: 0.0,
        }
    }
}

#[derive(Debug, Clone)]
pub struct SimilarParams {
    pub limit: usize,
    /// Stricter than plain search so "similar" means genuinely close.
    pub min_score: f32,
    pub exclude_id: Option<String>,
    pub language: Option<String>,
}

impl Default for SimilarParams {
    fn default() -> Self {
        Self {
            limit: 10,
            min_score: 0.7,
            exclude_id: None,
            language: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VectorStoreStats {
    pub documents: usize,
    pub paths: usize,
    pub dimensions: Option<usize>,
    pub degraded_documents: usize,
}

/// Serialized snapshot for export/import.
#[derive(Debug, Serialize, Deserialize)]
struct VectorSnapshot {
    documents: Vec<VectorDocument>,
}

#[derive(Default)]
pub struct VectorStore {
    documents: HashMap<String, VectorDocument>,
    /// Insertion order; upserts keep a document's original slot.
    order: Vec<String>,
    by_path: HashMap<String, HashSet<String>>,
    dimensions: Option<usize>,
    mirror: Option<mpsc::UnboundedSender<StorageOp>>,
}

impl VectorStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Store mirroring every mutation to the given write-behind channel.
    #[must_use]
    pub fn with_mirror(mirror: mpsc::UnboundedSender<StorageOp>) -> Self {
        Self {
            mirror: Some(mirror),
            ..Self::default()
        }
    }

    // ── Mutation ─────────────────────────────────────────────────────

    /// Insert or replace a document by id. A document whose embedding
    /// dimension differs from the store's current one makes the store adopt
    /// the new dimension going forward (logged — mixed-dimension content
    /// scores 0 against each other and silently degrades recall).
    pub fn add_document(&mut self, document: VectorDocument) {
        let incoming = document.embedding.len();
        match self.dimensions {
            Some(current) if current != incoming && incoming > 0 => {
                warn!(
                    "embedding dimension changed {current} -> {incoming} (document {}); adopting",
                    document.id
                );
                self.dimensions = Some(incoming);
            }
            None if incoming > 0 => self.dimensions = Some(incoming),
            _ => {}
        }

        self.send_mirror(StorageOp::Put(Box::new(document.clone())));

        self.by_path
            .entry(document.metadata.path.clone())
            .or_default()
            .insert(document.id.clone());

        let id = document.id.clone();
        if self.documents.insert(id.clone(), document).is_none() {
            self.order.push(id);
        }
    }

    /// Insert a batch; returns the number of documents added or replaced.
    pub fn add_documents(&mut self, documents: Vec<VectorDocument>) -> usize {
        let count = documents.len();
        for document in documents {
            self.add_document(document);
        }
        count
    }

    /// Remove a document by id. Unknown ids are a no-op returning `false`.
    pub fn remove_document(&mut self, id: &str) -> bool {
        let Some(document) = self.documents.remove(id) else {
            return false;
        };
        self.order.retain(|d| d != id);
        if let Some(bucket) = self.by_path.get_mut(&document.metadata.path) {
            bucket.remove(id);
            if bucket.is_empty() {
                self.by_path.remove(&document.metadata.path);
            }
        }
        self.send_mirror(StorageOp::Delete(id.to_string()));
        true
    }

    /// Remove all documents whose path equals `path` or is nested under it
    /// as a true path-segment prefix (not a substring match). Returns the
    /// removed count.
    pub fn remove_documents_by_path(&mut self, path: &str) -> usize {
        let nested_prefix = format!("{path}/");
        let doomed: Vec<String> = self
            .by_path
            .iter()
            .filter(|(p, _)| p.as_str() == path || p.starts_with(&nested_prefix))
            .flat_map(|(_, ids)| ids.iter().cloned())
            .collect();

        let mut removed = 0;
        for id in &doomed {
            if let Some(document) = self.documents.remove(id) {
                self.by_path.remove(&document.metadata.path);
                removed += 1;
            }
        }
        if removed > 0 {
            let gone: HashSet<&String> = doomed.iter().collect();
            self.order.retain(|d| !gone.contains(d));
            self.send_mirror(StorageOp::DeleteByPath(path.to_string()));
        }
        removed
    }

    /// Bulk-load documents restored from durable storage. Not mirrored
    /// back; the rows are already durable.
    pub fn load_documents(&mut self, documents: Vec<VectorDocument>) -> usize {
        let mirror = self.mirror.take();
        let count = self.add_documents(documents);
        self.mirror = mirror;
        count
    }

    pub fn clear(&mut self) {
        self.documents.clear();
        self.order.clear();
        self.by_path.clear();
        self.dimensions = None;
        self.send_mirror(StorageOp::Clear);
    }

    // ── Query ────────────────────────────────────────────────────────

    #[must_use]
    pub fn get_document(&self, id: &str) -> Option<&VectorDocument> {
        self.documents.get(id)
    }

    /// Cosine-similarity ranking over all documents passing the filter.
    /// Sorted by score descending; equal scores keep insertion order.
    #[must_use]
    pub fn search(&self, embedding: &[f32], params: &SearchParams) -> Vec<VectorSearchResult> {
        let mut results: Vec<VectorSearchResult> = self
            .iter_in_order()
            .filter(|doc| params.filter.as_ref().is_none_or(|f| f.matches(doc)))
            .map(|doc| VectorSearchResult {
                score: cosine_similarity(embedding, &doc.embedding),
                document: doc.clone(),
            })
            .filter(|r| r.score >= params.min_score)
            .collect();

        sort_and_truncate(&mut results, params.limit);
        results
    }

    /// Weighted fusion of cosine similarity and literal keyword matching.
    /// The keyword score counts case-insensitive occurrences across all
    /// keywords, capped at the keyword count and normalized by it.
    #[must_use]
    pub fn hybrid_search(
        &self,
        embedding: &[f32],
        keywords: &[String],
        params: &HybridParams,
    ) -> Vec<VectorSearchResult> {
        let lowered: Vec<String> = keywords.iter().map(|k| k.to_lowercase()).collect();

        let mut results: Vec<VectorSearchResult> = self
            .iter_in_order()
            .map(|doc| {
                let semantic = cosine_similarity(embedding, &doc.embedding);
                let keyword = keyword_score(&doc.content, &lowered);
                VectorSearchResult {
                    score: params.semantic_weight * semantic + params.keyword_weight * keyword,
                    document: doc.clone(),
                }
            })
            .filter(|r| r.score >= params.min_score)
            .collect();

        sort_and_truncate(&mut results, params.limit);
        results
    }

    /// Stricter-threshold search with exclusion and same-language filters.
    #[must_use]
    pub fn find_similar(&self, embedding: &[f32], params: &SimilarParams) -> Vec<VectorSearchResult> {
        let mut results: Vec<VectorSearchResult> = self
            .iter_in_order()
            .filter(|doc| params.exclude_id.as_deref() != Some(doc.id.as_str()))
            .filter(|doc| {
                params
                    .language
                    .as_deref()
                    .is_none_or(|l| doc.metadata.language.as_deref() == Some(l))
            })
            .map(|doc| VectorSearchResult {
                score: cosine_similarity(embedding, &doc.embedding),
                document: doc.clone(),
            })
            .filter(|r| r.score >= params.min_score)
            .collect();

        sort_and_truncate(&mut results, params.limit);
        results
    }

    // ── Snapshot ─────────────────────────────────────────────────────

    pub fn export(&self) -> serde_json::Result<String> {
        let documents: Vec<VectorDocument> = self.iter_in_order().cloned().collect();
        serde_json::to_string(&VectorSnapshot { documents })
    }

    /// Rebuild the store from an exported snapshot. The payload is parsed
    /// as a whole first; a malformed payload leaves the prior state
    /// untouched and reports zero imported.
    pub fn import(&mut self, data: &str) -> usize {
        let snapshot: VectorSnapshot = match serde_json::from_str(data) {
            Ok(s) => s,
            Err(e) => {
                warn!("vector snapshot rejected: {e}");
                return 0;
            }
        };

        self.clear();
        self.add_documents(snapshot.documents)
    }

    #[must_use]
    pub fn get_stats(&self) -> VectorStoreStats {
        VectorStoreStats {
            documents: self.documents.len(),
            paths: self.by_path.len(),
            dimensions: self.dimensions,
            degraded_documents: self
                .documents
                .values()
                .filter(|d| d.metadata.degraded)
                .count(),
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.documents.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    // ── Internals ────────────────────────────────────────────────────

    fn iter_in_order(&self) -> impl Iterator<Item = &VectorDocument> {
        self.order.iter().filter_map(|id| self.documents.get(id))
    }

    fn send_mirror(&self, op: StorageOp) {
        if let Some(mirror) = &self.mirror {
            // Best-effort: a closed channel only means persistence is gone,
            // never that the caller's write failed.
            let _ = mirror.send(op);
        }
    }
}

/// Case-insensitive occurrence count over all keywords, capped at the
/// keyword count and normalized by it, so the score lands in [0, 1] and a
/// document containing every keyword once already reaches the ceiling.
fn keyword_score(content: &str, lowered_keywords: &[String]) -> f32 {
    let keyword_count = lowered_keywords.iter().filter(|k| !k.is_empty()).count();
    if keyword_count == 0 {
        return 0.0;
    }
    let haystack = content.to_lowercase();
    let total: usize = lowered_keywords
        .iter()
        .filter(|k| !k.is_empty())
        .map(|keyword| haystack.matches(keyword.as_str()).count())
        .sum();
    total.min(keyword_count) as f32 / keyword_count as f32
}

fn sort_and_truncate(results: &mut Vec<VectorSearchResult>, limit: usize) {
    // Stable sort: equal scores preserve insertion order.
    results.sort_by(|a, b| b.score.total_cmp(&a.score));
    results.truncate(limit);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vector::{ArtifactKind, DocumentMetadata};
    use chrono::Utc;

    fn doc(id: &str, path: &str, content: &str, embedding: Vec<f32>) -> VectorDocument {
        VectorDocument {
            id: id.to_string(),
            content: content.to_string(),
            embedding,
            metadata: DocumentMetadata {
                path: path.to_string(),
                artifact: ArtifactKind::Chunk,
                language: Some("typescript".to_string()),
                start_line: 1,
                end_line: 10,
                indexed_at: Utc::now(),
                content_hash: "hash".to_string(),
                degraded: false,
            },
        }
    }

    #[test]
    fn test_self_search_scores_one() {
        let mut store = VectorStore::new();
        let mut embedding = vec![0.0f32; 1536];
        for (i, v) in embedding.iter_mut().enumerate() {
            *v = ((i % 7) as f32) - 3.0;
        }
        store.add_document(doc("d1", "/a.ts", "alpha", embedding.clone()));
        store.add_document(doc("d2", "/b.ts", "beta", vec![1.0; 1536]));

        let results = store.search(&embedding, &SearchParams::default());
        assert_eq!(results[0].document.id, "d1");
        assert!((results[0].score - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_min_score_excludes() {
        let mut store = VectorStore::new();
        store.add_document(doc("d1", "/a.ts", "x", vec![1.0, 0.0]));
        store.add_document(doc("d2", "/b.ts", "y", vec![0.0, 1.0]));

        let results = store.search(
            &[1.0, 0.0],
            &SearchParams {
                min_score: 0.5,
                ..Default::default()
            },
        );
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].document.id, "d1");
    }

    #[test]
    fn test_equal_scores_keep_insertion_order() {
        let mut store = VectorStore::new();
        store.add_document(doc("first", "/a.ts", "x", vec![1.0, 0.0]));
        store.add_document(doc("second", "/b.ts", "y", vec![1.0, 0.0]));

        let results = store.search(&[1.0, 0.0], &SearchParams::default());
        assert_eq!(results[0].document.id, "first");
        assert_eq!(results[1].document.id, "second");
    }

    #[test]
    fn test_upsert_keeps_original_order_slot() {
        let mut store = VectorStore::new();
        store.add_document(doc("first", "/a.ts", "x", vec![1.0, 0.0]));
        store.add_document(doc("second", "/b.ts", "y", vec![1.0, 0.0]));
        store.add_document(doc("first", "/a.ts", "x2", vec![1.0, 0.0]));

        assert_eq!(store.len(), 2);
        let results = store.search(&[1.0, 0.0], &SearchParams::default());
        assert_eq!(results[0].document.id, "first");
        assert_eq!(results[0].document.content, "x2");
    }

    #[test]
    fn test_hybrid_keywords_beat_pure_similarity() {
        let mut store = VectorStore::new();
        // d1 is very close in embedding space but shares no keywords.
        store.add_document(doc("d1", "/a.ts", "completely unrelated text", vec![1.0, 0.0]));
        // d2 is further away but contains every query keyword.
        store.add_document(doc(
            "d2",
            "/b.ts",
            "parse config file and parse settings",
            vec![0.5, 0.86],
        ));

        let keywords = vec!["parse".to_string(), "config".to_string()];
        let results = store.hybrid_search(&[1.0, 0.0], &keywords, &HybridParams::default());
        assert_eq!(
            results[0].document.id, "d2",
            "keyword coverage should outrank raw similarity at 0.6/0.4"
        );
    }

    #[test]
    fn test_keyword_score_caps_and_normalizes() {
        let spam = "parse ".repeat(50);
        let score = keyword_score(&spam, &["parse".to_string()]);
        assert!((score - 1.0).abs() < 1e-6, "capped at 1.0, got {score}");

        let half = keyword_score("parse once", &["parse".to_string(), "absent".to_string()]);
        assert!((half - 0.5).abs() < 1e-6, "one of two keywords matched");

        assert_eq!(keyword_score("anything", &[]), 0.0);
    }

    #[test]
    fn test_remove_by_path_segment_boundary() {
        let mut store = VectorStore::new();
        store.add_document(doc("d1", "/a.ts", "x", vec![1.0]));
        store.add_document(doc("d2", "/a.ts-extra.ts", "y", vec![1.0]));
        store.add_document(doc("d3", "/src/a.ts", "z", vec![1.0]));
        store.add_document(doc("d4", "/src", "w", vec![1.0]));

        assert_eq!(store.remove_documents_by_path("/a.ts"), 1);
        assert!(store.get_document("d1").is_none());
        assert!(
            store.get_document("d2").is_some(),
            "suffix lookalike survives"
        );

        assert_eq!(store.remove_documents_by_path("/src"), 2);
        assert!(store.get_document("d3").is_none());
    }

    #[test]
    fn test_find_similar_excludes_self_and_filters_language() {
        let mut store = VectorStore::new();
        store.add_document(doc("d1", "/a.ts", "x", vec![1.0, 0.0]));
        let mut rust_doc = doc("d2", "/b.rs", "y", vec![0.99, 0.1]);
        rust_doc.metadata.language = Some("rust".to_string());
        store.add_document(rust_doc);
        store.add_document(doc("d3", "/c.ts", "z", vec![0.98, 0.2]));

        let params = SimilarParams {
            exclude_id: Some("d1".to_string()),
            language: Some("typescript".to_string()),
            min_score: 0.5,
            ..Default::default()
        };
        let results = store.find_similar(&[1.0, 0.0], &params);
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].document.id, "d3");
    }

    #[test]
    fn test_dimension_adoption_on_mismatch() {
        let mut store = VectorStore::new();
        store.add_document(doc("d1", "/a.ts", "x", vec![1.0, 0.0]));
        assert_eq!(store.get_stats().dimensions, Some(2));

        store.add_document(doc("d2", "/b.ts", "y", vec![1.0, 0.0, 0.0]));
        assert_eq!(
            store.get_stats().dimensions,
            Some(3),
            "store adopts the new dimension rather than rejecting"
        );
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn test_export_import_roundtrip() {
        let mut store = VectorStore::new();
        store.add_document(doc("d1", "/a.ts", "alpha", vec![1.0, 0.0]));
        store.add_document(doc("d2", "/b.ts", "beta", vec![0.0, 1.0]));

        let snapshot = store.export().unwrap();
        let mut restored = VectorStore::new();
        assert_eq!(restored.import(&snapshot), 2);
        assert_eq!(restored.get_stats().documents, store.get_stats().documents);

        let results = restored.search(&[1.0, 0.0], &SearchParams::default());
        assert_eq!(results[0].document.id, "d1");
    }

    #[test]
    fn test_import_malformed_keeps_prior_state() {
        let mut store = VectorStore::new();
        store.add_document(doc("d1", "/a.ts", "alpha", vec![1.0]));

        assert_eq!(store.import("[broken"), 0);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_filter_by_path_prefix() {
        let mut store = VectorStore::new();
        store.add_document(doc("d1", "/src/a.ts", "x", vec![1.0]));
        store.add_document(doc("d2", "/lib/b.ts", "y", vec![1.0]));

        let params = SearchParams {
            filter: Some(DocumentFilter {
                path_prefix: Some("/src".to_string()),
                ..Default::default()
            }),
            ..Default::default()
        };
        let results = store.search(&[1.0], &params);
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].document.id, "d1");
    }
}
