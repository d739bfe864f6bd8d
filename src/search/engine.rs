/// The fused search engine over the symbol index and the vector store.
///
/// Classifies the query's intent, dispatches to the matching retrieval
/// strategy, and returns deduplicated, score-ranked results. Reads both
/// stores, mutates neither.
use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::debug;

use crate::config::SearchConfig;
use crate::embedder::service::EmbeddingService;
use crate::symbols::{Symbol, SymbolIndex};
use crate::vector::store::{HybridParams, SearchParams, SimilarParams};
use crate::vector::{VectorSearchResult, VectorStore};

use super::intent::{QueryAnalysis, QueryIntent, analyze};
use super::{ResultOrigin, SearchContext, SearchOptions, SemanticSearchResult, dedup_and_rank};

// Strategy scores. Exact structural matches outrank everything; graph
// neighbors rank by how directly they answer the query.
const EXACT_NAME_SCORE: f32 = 1.0;
const PREFIX_NAME_SCORE: f32 = 0.8;
const REFERENCE_SITE_SCORE: f32 = 0.9;
const REFERENCING_SYMBOL_SCORE: f32 = 0.8;
const DEPENDENCY_SCORE: f32 = 0.85;
const DEPENDENT_SCORE: f32 = 0.75;
const SNIPPET_IDENTIFIER_SCORE: f32 = 0.7;
const OPEN_FILE_BOOST: f32 = 0.25;
const RECENT_FILE_BOOST: f32 = 0.1;

const SNIPPET_CHARS: usize = 240;

pub struct SemanticSearchEngine {
    symbols: Arc<RwLock<SymbolIndex>>,
    vectors: Arc<RwLock<VectorStore>>,
    embeddings: Arc<EmbeddingService>,
    config: SearchConfig,
}

impl SemanticSearchEngine {
    pub fn new(
        symbols: Arc<RwLock<SymbolIndex>>,
        vectors: Arc<RwLock<VectorStore>>,
        embeddings: Arc<EmbeddingService>,
        config: SearchConfig,
    ) -> Self {
        Self {
            symbols,
            vectors,
            embeddings,
            config,
        }
    }

    // ── Main entry point ─────────────────────────────────────────────

    /// Classify the query, dispatch, and return ranked results.
    pub async fn search(&self, query: &str, options: &SearchOptions) -> Vec<SemanticSearchResult> {
        let analysis = analyze(query);
        debug!("query intent {:?}: {query}", analysis.intent);

        let mut results = match analysis.intent {
            QueryIntent::FindDefinition => self.find_definitions(&analysis, options).await,
            QueryIntent::FindUsage => self.find_usages(&analysis).await,
            QueryIntent::FindSimilar => self.similarity_search(query, options).await,
            QueryIntent::FindRelated => self.find_related(&analysis).await,
            QueryIntent::Explain | QueryIntent::General => {
                self.general_search(query, &analysis, options).await
            }
        };

        if let Some(language) = options.language.as_deref().or(analysis.language.as_deref()) {
            results.retain(|r| r.language.as_deref().is_none_or(|l| l == language));
        }

        dedup_and_rank(&mut results, options.limit);

        if options.explain || analysis.intent == QueryIntent::Explain {
            self.enrich(&mut results).await;
        }
        results
    }

    // ── Strategies ───────────────────────────────────────────────────

    /// Structural lookup restricted to definition-like kinds. Exact name
    /// matches score 1.0, prefix matches 0.8. Falls back to the keyword
    /// set when no entities were extracted.
    async fn find_definitions(
        &self,
        analysis: &QueryAnalysis,
        options: &SearchOptions,
    ) -> Vec<SemanticSearchResult> {
        let candidates: &[String] = if analysis.entities.is_empty() {
            &analysis.keywords
        } else {
            &analysis.entities
        };

        let symbols = self.symbols.read().await;
        let mut results = Vec::new();
        for candidate in candidates {
            for symbol in symbols.search_by_name(candidate, true, options.limit) {
                if !symbol.kind.is_definition() {
                    continue;
                }
                let score = if symbol.name.eq_ignore_ascii_case(candidate) {
                    EXACT_NAME_SCORE
                } else {
                    PREFIX_NAME_SCORE
                };
                results.push(symbol_result(&symbol, score));
            }
        }
        results
    }

    /// Recorded reference sites (0.9) plus referencing symbols (0.8) for
    /// each resolved entity.
    async fn find_usages(&self, analysis: &QueryAnalysis) -> Vec<SemanticSearchResult> {
        let symbols = self.symbols.read().await;
        let mut results = Vec::new();

        for entity in &analysis.entities {
            for symbol in symbols.search_by_name(entity, false, 10) {
                for site in symbols.get_references_to(&symbol.id) {
                    results.push(SemanticSearchResult {
                        title: format!("{} referenced", symbol.name),
                        path: site.path.clone(),
                        line_start: site.line,
                        line_end: site.line,
                        score: REFERENCE_SITE_SCORE,
                        origin: ResultOrigin::Reference,
                        snippet: format!("{} site at {}:{}", symbol.name, site.path, site.line),
                        language: Some(symbol.language.clone()),
                        symbol_id: Some(symbol.id.clone()),
                        explanation: None,
                    });
                }
                for referencing in symbols.get_symbols_that_reference(&symbol.id) {
                    results.push(symbol_result(&referencing, REFERENCING_SYMBOL_SCORE));
                }
            }
        }
        results
    }

    /// Pure vector search on the query's embedding.
    async fn similarity_search(
        &self,
        query: &str,
        options: &SearchOptions,
    ) -> Vec<SemanticSearchResult> {
        let embedded = self.embeddings.embed_query(query).await;
        let vectors = self.vectors.read().await;
        let hits = vectors.search(
            &embedded.vector,
            &SearchParams {
                limit: options.limit,
                min_score: options.min_score,
                filter: None,
            },
        );
        hits.iter().map(vector_result).collect()
    }

    /// Graph neighbors of each resolved entity: dependencies (0.85) and
    /// dependents (0.75).
    async fn find_related(&self, analysis: &QueryAnalysis) -> Vec<SemanticSearchResult> {
        let symbols = self.symbols.read().await;
        let mut results = Vec::new();

        for entity in &analysis.entities {
            for symbol in symbols.search_by_name(entity, false, 10) {
                for dependency in symbols.get_symbols_referenced_by(&symbol.id) {
                    results.push(symbol_result(&dependency, DEPENDENCY_SCORE));
                }
                for dependent in symbols.get_symbols_that_reference(&symbol.id) {
                    results.push(symbol_result(&dependent, DEPENDENT_SCORE));
                }
            }
        }
        results
    }

    /// Hybrid lexical+semantic fusion (or pure vector search when hybrid
    /// is disabled by the caller).
    async fn general_search(
        &self,
        query: &str,
        analysis: &QueryAnalysis,
        options: &SearchOptions,
    ) -> Vec<SemanticSearchResult> {
        let embedded = self.embeddings.embed_query(query).await;
        let vectors = self.vectors.read().await;

        let hits = if options.use_hybrid {
            vectors.hybrid_search(
                &embedded.vector,
                &analysis.keywords,
                &HybridParams {
                    semantic_weight: self.config.semantic_weight,
                    keyword_weight: self.config.keyword_weight,
                    limit: options.limit * 2,
                    min_score: options.min_score,
                },
            )
        } else {
            vectors.search(
                &embedded.vector,
                &SearchParams {
                    limit: options.limit * 2,
                    min_score: options.min_score,
                    filter: None,
                },
            )
        };
        hits.iter().map(vector_result).collect()
    }

    // ── Specialized entry points ─────────────────────────────────────

    /// Find code resembling a snippet: nearest vectors (optionally
    /// same-language-only) plus reference sites of identifiers parsed out
    /// of the snippet.
    pub async fn search_by_code_example(
        &self,
        snippet: &str,
        language: Option<&str>,
        limit: usize,
    ) -> Vec<SemanticSearchResult> {
        let embedded = self.embeddings.embed_one(snippet).await;
        let mut results: Vec<SemanticSearchResult> = {
            let vectors = self.vectors.read().await;
            vectors
                .find_similar(
                    &embedded.vector,
                    &SimilarParams {
                        limit,
                        min_score: self.config.min_score,
                        exclude_id: None,
                        language: language.map(str::to_string),
                    },
                )
                .iter()
                .map(vector_result)
                .collect()
        };

        let identifiers = snippet_identifiers(snippet);
        let symbols = self.symbols.read().await;
        for identifier in identifiers {
            for symbol in symbols.search_by_name(&identifier, false, 4) {
                for site in symbols.get_references_to(&symbol.id) {
                    results.push(SemanticSearchResult {
                        title: format!("{} referenced", symbol.name),
                        path: site.path.clone(),
                        line_start: site.line,
                        line_end: site.line,
                        score: SNIPPET_IDENTIFIER_SCORE,
                        origin: ResultOrigin::Reference,
                        snippet: format!("{} site at {}:{}", symbol.name, site.path, site.line),
                        language: Some(symbol.language.clone()),
                        symbol_id: Some(symbol.id.clone()),
                        explanation: None,
                    });
                }
            }
        }

        dedup_and_rank(&mut results, limit);
        results
    }

    /// Low-latency structural-only path for autocomplete. No embedding
    /// call; open files boost more than recently used ones.
    pub async fn quick_search(
        &self,
        query: &str,
        context: &SearchContext,
        limit: usize,
    ) -> Vec<SemanticSearchResult> {
        let symbols = self.symbols.read().await;
        let mut results = Vec::new();

        for symbol in symbols.search_by_name(query, true, limit * 2) {
            let base = if symbol.name.eq_ignore_ascii_case(query) {
                EXACT_NAME_SCORE
            } else {
                PREFIX_NAME_SCORE
            };
            let boost = if context.open_files.contains(&symbol.path) {
                OPEN_FILE_BOOST
            } else if context.recent_files.contains(&symbol.path) {
                RECENT_FILE_BOOST
            } else {
                0.0
            };
            results.push(symbol_result(&symbol, base + boost));
        }

        dedup_and_rank(&mut results, limit);
        results
    }

    /// Symbols enclosing the given position plus their directly-referenced
    /// neighbors, bounded by an approximate token budget (chars ÷ 4).
    pub async fn get_context_for_position(
        &self,
        path: &str,
        line: u32,
        token_budget: usize,
    ) -> Vec<Symbol> {
        let symbols = self.symbols.read().await;

        let mut enclosing: Vec<Symbol> = symbols
            .get_symbols_by_path(path)
            .into_iter()
            .filter(|s| s.line <= line && s.end_line >= line)
            .collect();
        // Innermost first: tightest span is the most relevant context.
        enclosing.sort_by_key(|s| s.end_line - s.line);

        let mut budget = token_budget;
        let mut out: Vec<Symbol> = Vec::new();

        for symbol in &enclosing {
            if !try_consume(&mut budget, symbol) {
                return out;
            }
            out.push(symbol.clone());
        }
        for symbol in &enclosing {
            for neighbor in symbols.get_symbols_referenced_by(&symbol.id) {
                if out.iter().any(|s| s.id == neighbor.id) {
                    continue;
                }
                if !try_consume(&mut budget, &neighbor) {
                    return out;
                }
                out.push(neighbor);
            }
        }
        out
    }

    // ── Enrichment ───────────────────────────────────────────────────

    /// Best-effort explanations; a failure to build one only omits it.
    async fn enrich(&self, results: &mut [SemanticSearchResult]) {
        let symbols = self.symbols.read().await;
        for result in results.iter_mut() {
            if result.explanation.is_some() {
                continue;
            }
            let Some(id) = result.symbol_id.as_deref() else {
                continue;
            };
            result.explanation = explain_symbol(&symbols, id);
        }
    }
}

fn explain_symbol(symbols: &SymbolIndex, id: &str) -> Option<String> {
    let hierarchy = symbols.get_symbol_hierarchy(id)?;
    let dependents = symbols.get_symbols_that_reference(id).len();
    let dependencies = symbols.get_symbols_referenced_by(id).len();

    let mut parts = vec![format!(
        "{} `{}` in {}",
        hierarchy.symbol.kind.as_str(),
        hierarchy.symbol.name,
        hierarchy.symbol.path
    )];
    if let Some(parent) = &hierarchy.parent {
        parts.push(format!("member of `{}`", parent.name));
    }
    if !hierarchy.children.is_empty() {
        parts.push(format!("{} members", hierarchy.children.len()));
    }
    if dependents > 0 {
        parts.push(format!("referenced by {dependents} symbols"));
    }
    if dependencies > 0 {
        parts.push(format!("references {dependencies} symbols"));
    }
    Some(parts.join(", "))
}

fn symbol_result(symbol: &Symbol, score: f32) -> SemanticSearchResult {
    let snippet = symbol
        .signature
        .clone()
        .unwrap_or_else(|| truncate(&symbol.content, SNIPPET_CHARS));
    SemanticSearchResult {
        title: symbol.name.clone(),
        path: symbol.path.clone(),
        line_start: symbol.line,
        line_end: symbol.end_line,
        score,
        origin: ResultOrigin::Structural,
        snippet,
        language: Some(symbol.language.clone()),
        symbol_id: Some(symbol.id.clone()),
        explanation: None,
    }
}

fn vector_result(hit: &VectorSearchResult) -> SemanticSearchResult {
    let metadata = &hit.document.metadata;
    let file_name = metadata.path.rsplit('/').next().unwrap_or(&metadata.path);
    SemanticSearchResult {
        title: format!("{file_name}:{}-{}", metadata.start_line, metadata.end_line),
        path: metadata.path.clone(),
        line_start: metadata.start_line,
        line_end: metadata.end_line,
        score: hit.score,
        origin: ResultOrigin::Semantic,
        snippet: truncate(&hit.document.content, SNIPPET_CHARS),
        language: metadata.language.clone(),
        symbol_id: None,
        explanation: None,
    }
}

/// Rough identifiers out of a code snippet: word characters, length > 2,
/// not a keyword in any supported language.
fn snippet_identifiers(snippet: &str) -> Vec<String> {
    const SNIPPET_KEYWORDS: &[&str] = &[
        "fn", "let", "mut", "pub", "use", "impl", "struct", "enum", "trait", "const", "function",
        "var", "class", "interface", "type", "export", "import", "return", "async", "await",
        "def", "self", "this", "new", "for", "while", "if", "else", "match", "true", "false",
        "None", "null", "undefined", "string", "number", "void",
    ];

    let mut out: Vec<String> = Vec::new();
    for token in snippet.split(|c: char| !c.is_alphanumeric() && c != '_') {
        if token.len() <= 2 || SNIPPET_KEYWORDS.contains(&token) {
            continue;
        }
        if token.chars().next().is_some_and(|c| c.is_ascii_digit()) {
            continue;
        }
        if !out.contains(&token.to_string()) {
            out.push(token.to_string());
        }
        if out.len() >= 8 {
            break;
        }
    }
    out
}

fn try_consume(budget: &mut usize, symbol: &Symbol) -> bool {
    // chars ÷ 4 approximates tokens well enough to bound payload size.
    let cost = symbol.content.chars().count() / 4;
    if cost > *budget {
        return false;
    }
    *budget -= cost;
    true
}

fn truncate(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}…", &text[..idx]),
        None => text.to_string(),
    }
}
