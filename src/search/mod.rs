/// Query-time retrieval: intent classification and fused ranking.
///
/// [`engine::SemanticSearchEngine`] reads from the symbol index and the
/// vector store and never mutates either. [`intent`] turns a free-form
/// query into a dispatchable analysis.
pub mod engine;
pub mod intent;

pub use engine::SemanticSearchEngine;
pub use intent::{QueryAnalysis, QueryIntent};

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

/// Where a fused result came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResultOrigin {
    /// Matched in the symbol index.
    Structural,
    /// Matched in the vector store.
    Semantic,
    /// A recorded reference site.
    Reference,
}

/// One ranked answer from the search engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SemanticSearchResult {
    pub title: String,
    pub path: String,
    pub line_start: u32,
    pub line_end: u32,
    pub score: f32,
    pub origin: ResultOrigin,
    pub snippet: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub symbol_id: Option<String>,
    /// Best-effort enrichment; absence never drops the result.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub explanation: Option<String>,
}

/// Caller-tunable knobs for a search.
#[derive(Debug, Clone)]
pub struct SearchOptions {
    pub limit: usize,
    pub min_score: f32,
    /// Hybrid lexical+semantic fusion for general queries; disable for
    /// pure vector search.
    pub use_hybrid: bool,
    pub language: Option<String>,
    /// Attach per-result explanations.
    pub explain: bool,
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self {
            limit: 20,
            min_score: 0.1,
            use_hybrid: true,
            language: None,
            explain: false,
        }
    }
}

/// Editor context for the low-latency structural path: open files boost
/// more than recently closed ones.
#[derive(Debug, Clone, Default)]
pub struct SearchContext {
    pub open_files: HashSet<String>,
    pub recent_files: Vec<String>,
}

/// Drop results sharing (path, line_start, line_end), keeping the first
/// occurrence, then sort by descending score.
pub(crate) fn dedup_and_rank(results: &mut Vec<SemanticSearchResult>, limit: usize) {
    let mut seen: HashSet<(String, u32, u32)> = HashSet::new();
    results.retain(|r| seen.insert((r.path.clone(), r.line_start, r.line_end)));
    results.sort_by(|a, b| b.score.total_cmp(&a.score));
    results.truncate(limit);
}
