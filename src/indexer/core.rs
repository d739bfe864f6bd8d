/// The indexing orchestrator: file → chunks → symbols → embeddings.
///
/// `CodeIndexer` owns the incremental ledger and drives the per-file
/// pipeline. For any path there is never a window in which old and new
/// generations of chunks/symbols/vectors coexist: the old generation is
/// evicted before the new one is inserted.
use std::collections::HashMap;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::Utc;
use globset::{Glob, GlobSet, GlobSetBuilder};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::config::IndexConfig;
use crate::embedder::service::EmbeddingService;
use crate::events::{EventBus, IndexEvent, IndexPhase};
use crate::symbols::{ReferenceKind, ReferenceSite, Symbol, SymbolIndex, content_hash};
use crate::vector::{ArtifactKind, DocumentMetadata, VectorDocument, VectorStore};

use super::chunker::{chunk_file, detect_language};
use super::extractor::{CallSite, ExtractedFile, extract};
use super::{Chunk, FileIndexEntry, FileOutcome, IndexReport, IndexerStats};

/// At most this many same-named symbols receive a reference edge from one
/// call site; names shared more widely are too ambiguous to be useful.
const MAX_REFERENCE_TARGETS: usize = 4;

#[derive(Debug, Default, Serialize, Deserialize)]
struct IndexState {
    chunks: HashMap<String, Chunk>,
    file_chunks: HashMap<String, Vec<String>>,
    ledger: HashMap<String, FileIndexEntry>,
}

struct PathFilters {
    include: GlobSet,
    exclude: GlobSet,
}

impl PathFilters {
    fn build(config: &IndexConfig) -> Result<Self> {
        Ok(Self {
            include: build_globset(&config.include_patterns).context("invalid include pattern")?,
            exclude: build_globset(&config.exclude_patterns).context("invalid exclude pattern")?,
        })
    }

    fn allows(&self, path: &str) -> bool {
        let normalized = path.trim_start_matches('/');
        if self.exclude.is_match(path) || self.exclude.is_match(normalized) {
            return false;
        }
        self.include.is_match(path) || self.include.is_match(normalized)
    }
}

fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(Glob::new(pattern).with_context(|| format!("bad glob: {pattern}"))?);
    }
    Ok(builder.build()?)
}

pub struct CodeIndexer {
    symbols: Arc<RwLock<SymbolIndex>>,
    vectors: Arc<RwLock<VectorStore>>,
    embeddings: Arc<EmbeddingService>,
    events: EventBus,
    config: IndexConfig,
    filters: PathFilters,
    state: RwLock<IndexState>,
}

impl CodeIndexer {
    pub fn new(
        symbols: Arc<RwLock<SymbolIndex>>,
        vectors: Arc<RwLock<VectorStore>>,
        embeddings: Arc<EmbeddingService>,
        events: EventBus,
        config: IndexConfig,
    ) -> Result<Self> {
        let filters = PathFilters::build(&config)?;
        Ok(Self {
            symbols,
            vectors,
            embeddings,
            events,
            config,
            filters,
            state: RwLock::new(IndexState::default()),
        })
    }

    // ── Single file ──────────────────────────────────────────────────

    /// Index one file's content. Unchanged content (by hash) is a no-op;
    /// filtered and oversized files are skipped and counted, never errors.
    pub async fn index_file(&self, path: &str, content: &str, force: bool) -> FileOutcome {
        self.emit_phase(path, IndexPhase::Scanning);

        if !self.filters.allows(path) {
            debug!("skipping filtered path: {path}");
            return FileOutcome::Filtered;
        }
        if content.len() > self.config.max_file_bytes {
            debug!(
                "skipping oversized file ({} bytes > {}): {path}",
                content.len(),
                self.config.max_file_bytes
            );
            return FileOutcome::Oversized;
        }

        let hash = content_hash(content);
        if !force {
            let state = self.state.read().await;
            if state
                .ledger
                .get(path)
                .is_some_and(|entry| entry.content_hash == hash)
            {
                debug!("unchanged, skipping: {path}");
                return FileOutcome::Unchanged;
            }
        }

        // The new generation is computed up front, before anything is
        // evicted, so the eviction-then-insert window stays small.
        self.emit_phase(path, IndexPhase::Chunking);
        let mut chunks = chunk_file(
            path,
            content,
            self.config.chunk_lines,
            self.config.chunk_overlap,
        );

        self.emit_phase(path, IndexPhase::Extracting);
        let extracted = match detect_language(path) {
            Some(language) => extract(path, content, language),
            None => ExtractedFile::default(),
        };
        annotate_chunks(&mut chunks, &extracted);

        // Evict the previous generation entirely before inserting.
        self.evict_path(path).await;

        let symbol_count = extracted.symbols.len();
        {
            let mut symbols = self.symbols.write().await;
            for symbol in &extracted.symbols {
                self.events.emit(IndexEvent::SymbolAdded {
                    id: symbol.id.clone(),
                    name: symbol.name.clone(),
                });
            }
            symbols.add_symbols(extracted.symbols.clone());
            self.events.emit(IndexEvent::BatchAdded {
                count: symbol_count,
            });

            resolve_references(&mut symbols, path, &extracted.symbols, &extracted.call_sites);
        }

        let embedded = if self.config.embeddings_enabled && !chunks.is_empty() {
            self.emit_phase(path, IndexPhase::Embedding);
            self.embed_chunks(path, &mut chunks).await;
            true
        } else {
            false
        };

        {
            let mut state = self.state.write().await;
            let chunk_ids: Vec<String> = chunks.iter().map(|c| c.id.clone()).collect();
            for chunk in chunks {
                state.chunks.insert(chunk.id.clone(), chunk);
            }
            state
                .file_chunks
                .insert(path.to_string(), chunk_ids.clone());
            state.ledger.insert(
                path.to_string(),
                FileIndexEntry {
                    path: path.to_string(),
                    content_hash: hash,
                    indexed_at: Utc::now(),
                    chunk_count: chunk_ids.len(),
                    symbol_count,
                    embedded,
                },
            );
        }

        self.emit_phase(path, IndexPhase::Complete);
        FileOutcome::Indexed
    }

    /// Remove a file and every artifact derived from it.
    pub async fn remove_file(&self, path: &str) -> bool {
        let known = {
            let mut state = self.state.write().await;
            state.ledger.remove(path).is_some()
        };
        self.evict_path(path).await;
        known
    }

    // ── Batch drivers ────────────────────────────────────────────────

    /// Index files in bounded-size batches: one batch's embedding calls
    /// settle before the next batch starts. Cancellation is cooperative at
    /// batch granularity — callers stop feeding batches.
    pub async fn index_files(&self, files: &[(String, String)], force: bool) -> IndexReport {
        let mut report = IndexReport::default();
        let batch_size = self.config.batch_size.max(1);

        for batch in files.chunks(batch_size) {
            let outcomes = futures::future::join_all(
                batch
                    .iter()
                    .map(|(path, content)| self.index_file(path, content, force)),
            )
            .await;
            for outcome in outcomes {
                report.record(outcome);
            }
        }

        info!(
            "indexed {} files ({} unchanged, {} filtered, {} oversized)",
            report.indexed, report.unchanged, report.filtered, report.oversized
        );
        report
    }

    /// Re-index only what changed since the last pass.
    pub async fn incremental_index(&self, files: &[(String, String)]) -> IndexReport {
        self.index_files(files, false).await
    }

    /// Generate vectors for any chunk still lacking one (embedding was
    /// disabled or the file predates it). Returns how many caught up.
    pub async fn process_pending_embeddings(&self) -> usize {
        let pending: Vec<(String, String)> = {
            let state = self.state.read().await;
            state
                .chunks
                .values()
                .filter(|c| !c.has_embedding)
                .map(|c| (c.id.clone(), c.embedding_text()))
                .collect()
        };
        if pending.is_empty() {
            return 0;
        }

        let mut processed = 0;
        for batch in pending.chunks(self.config.batch_size.max(1) * 4) {
            let texts: Vec<String> = batch.iter().map(|(_, t)| t.clone()).collect();
            let (vectors, degraded) = self.embeddings.embed_texts(&texts).await;

            let mut state = self.state.write().await;
            let mut store = self.vectors.write().await;
            for ((chunk_id, _), vector) in batch.iter().zip(vectors) {
                let Some(chunk) = state.chunks.get_mut(chunk_id) else {
                    continue;
                };
                store.add_document(chunk_document(chunk, vector, degraded));
                chunk.has_embedding = true;
                processed += 1;
            }
        }

        info!("backfilled embeddings for {processed} chunks");
        processed
    }

    // ── Lookup ───────────────────────────────────────────────────────

    pub async fn get_file_chunks(&self, path: &str) -> Vec<Chunk> {
        let state = self.state.read().await;
        state
            .file_chunks
            .get(path)
            .map(|ids| {
                ids.iter()
                    .filter_map(|id| state.chunks.get(id))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    pub async fn get_chunk(&self, id: &str) -> Option<Chunk> {
        self.state.read().await.chunks.get(id).cloned()
    }

    pub async fn get_file_info(&self, path: &str) -> Option<FileIndexEntry> {
        self.state.read().await.ledger.get(path).cloned()
    }

    pub async fn get_indexed_files(&self) -> Vec<String> {
        let mut files: Vec<String> = self.state.read().await.ledger.keys().cloned().collect();
        files.sort();
        files
    }

    pub async fn get_stats(&self) -> IndexerStats {
        let state = self.state.read().await;
        IndexerStats {
            files: state.ledger.len(),
            chunks: state.chunks.len(),
            pending_embeddings: state.chunks.values().filter(|c| !c.has_embedding).count(),
        }
    }

    /// Drop all indexed state: chunks, ledger, symbols, and vectors.
    pub async fn clear(&self) {
        {
            let mut state = self.state.write().await;
            state.chunks.clear();
            state.file_chunks.clear();
            state.ledger.clear();
        }
        self.symbols.write().await.clear();
        self.vectors.write().await.clear();
    }

    // ── Snapshot ─────────────────────────────────────────────────────

    /// Serialize the indexer's own state (chunks and ledger). The symbol
    /// and vector stores export themselves.
    pub async fn export(&self) -> serde_json::Result<String> {
        let state = self.state.read().await;
        serde_json::to_string(&*state)
    }

    /// Restore chunks and ledger from an exported snapshot. Parsed as a
    /// whole; malformed payloads leave prior state untouched and report 0.
    pub async fn import(&self, data: &str) -> usize {
        let parsed: IndexState = match serde_json::from_str(data) {
            Ok(s) => s,
            Err(e) => {
                tracing::warn!("indexer snapshot rejected: {e}");
                return 0;
            }
        };
        let count = parsed.ledger.len();
        *self.state.write().await = parsed;
        count
    }

    // ── Internals ────────────────────────────────────────────────────

    async fn evict_path(&self, path: &str) {
        let removed = {
            let mut symbols = self.symbols.write().await;
            symbols.remove_symbols_by_path(path)
        };
        if removed > 0 {
            self.events.emit(IndexEvent::SymbolsRemoved {
                path: path.to_string(),
                count: removed,
            });
        }
        {
            let mut vectors = self.vectors.write().await;
            vectors.remove_documents_by_path(path);
        }
        {
            let mut state = self.state.write().await;
            if let Some(ids) = state.file_chunks.remove(path) {
                for id in ids {
                    state.chunks.remove(&id);
                }
            }
        }
    }

    async fn embed_chunks(&self, path: &str, chunks: &mut [Chunk]) {
        let texts: Vec<String> = chunks.iter().map(Chunk::embedding_text).collect();
        let (vectors, degraded) = self.embeddings.embed_texts(&texts).await;

        self.emit_phase(path, IndexPhase::Storing);
        let mut documents = Vec::with_capacity(chunks.len());
        for (chunk, vector) in chunks.iter_mut().zip(vectors) {
            documents.push(chunk_document(chunk, vector, degraded));
            chunk.has_embedding = true;
        }
        self.vectors.write().await.add_documents(documents);
    }

    fn emit_phase(&self, path: &str, phase: IndexPhase) {
        self.events.emit(IndexEvent::Phase {
            path: path.to_string(),
            phase,
        });
    }
}

/// Attach overlapping symbol names and per-slice import/export names to
/// each chunk.
fn annotate_chunks(chunks: &mut [Chunk], extracted: &ExtractedFile) {
    for chunk in chunks {
        for symbol in &extracted.symbols {
            let overlaps = symbol.line <= chunk.end_line && symbol.end_line >= chunk.start_line;
            if overlaps && !chunk.symbols.contains(&symbol.name) {
                chunk.symbols.push(symbol.name.clone());
            }
        }
        for import in &extracted.imports {
            if import.line >= chunk.start_line && import.line <= chunk.end_line {
                for name in &import.names {
                    if !chunk.imports.contains(name) {
                        chunk.imports.push(name.clone());
                    }
                }
            }
        }
        for export in &extracted.exports {
            let declared_here = extracted.symbols.iter().any(|s| {
                s.name == *export && s.line >= chunk.start_line && s.line <= chunk.end_line
            });
            if declared_here && !chunk.exports.contains(export) {
                chunk.exports.push(export.clone());
            }
        }
    }
}

/// Resolve call sites against the (already updated) index: each site adds
/// a reference site on its targets and, when an enclosing symbol exists, a
/// graph edge from it.
fn resolve_references(
    symbols: &mut SymbolIndex,
    path: &str,
    file_symbols: &[Symbol],
    call_sites: &[CallSite],
) {
    for site in call_sites {
        let targets: Vec<String> = symbols
            .search_by_name(&site.name, false, MAX_REFERENCE_TARGETS)
            .into_iter()
            .map(|s| s.id)
            .collect();
        if targets.is_empty() {
            continue;
        }

        let source = enclosing_symbol(file_symbols, site.line).map(|s| s.id.clone());

        for target in targets {
            symbols.add_reference_site(
                &target,
                ReferenceSite {
                    path: path.to_string(),
                    line: site.line,
                    kind: ReferenceKind::Call,
                },
            );
            if let Some(source_id) = &source {
                if source_id != &target {
                    symbols.add_reference(source_id, &target);
                }
            }
        }
    }
}

/// The innermost scope-forming symbol whose span contains `line`. Single
/// line variable/constant declarations are not scopes; a call in an
/// initializer belongs to the surrounding function.
fn enclosing_symbol(file_symbols: &[Symbol], line: u32) -> Option<&Symbol> {
    use crate::symbols::SymbolKind;
    file_symbols
        .iter()
        .filter(|s| {
            !matches!(
                s.kind,
                SymbolKind::Variable | SymbolKind::Constant | SymbolKind::TypeAlias
            )
        })
        .filter(|s| s.line <= line && s.end_line >= line)
        .min_by_key(|s| s.end_line - s.line)
}

fn chunk_document(chunk: &Chunk, vector: Vec<f32>, degraded: bool) -> VectorDocument {
    VectorDocument {
        id: chunk.id.clone(),
        content: chunk.content.clone(),
        embedding: vector,
        metadata: DocumentMetadata {
            path: chunk.path.clone(),
            artifact: ArtifactKind::Chunk,
            language: chunk.language.clone(),
            start_line: chunk.start_line,
            end_line: chunk.end_line,
            indexed_at: Utc::now(),
            content_hash: chunk.content_hash.clone(),
            degraded,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::IndexConfig;

    const SOURCE: &str = r#"import { helper } from './helper';

export function parseConfig(raw: string): Config {
    const parsed = helper(raw);
    return validate(parsed);
}

export function validate(config: Config): Config {
    return config;
}
"#;

    fn indexer() -> CodeIndexer {
        let symbols = Arc::new(RwLock::new(SymbolIndex::new()));
        let vectors = Arc::new(RwLock::new(VectorStore::new()));
        let embeddings = Arc::new(EmbeddingService::local_only(64));
        CodeIndexer::new(
            symbols,
            vectors,
            embeddings,
            EventBus::default(),
            IndexConfig::default(),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_index_file_produces_artifacts() {
        let indexer = indexer();
        let outcome = indexer.index_file("/src/config.ts", SOURCE, false).await;
        assert_eq!(outcome, FileOutcome::Indexed);

        let info = indexer.get_file_info("/src/config.ts").await.unwrap();
        assert!(info.chunk_count >= 1);
        assert!(info.symbol_count >= 2);
        assert!(info.embedded);

        let symbols = indexer.symbols.read().await;
        assert_eq!(symbols.search_by_name("parseConfig", false, 10).len(), 1);

        let vectors = indexer.vectors.read().await;
        assert_eq!(vectors.get_stats().documents, info.chunk_count);
    }

    #[tokio::test]
    async fn test_unchanged_file_is_skipped() {
        let indexer = indexer();
        assert_eq!(
            indexer.index_file("/src/config.ts", SOURCE, false).await,
            FileOutcome::Indexed
        );
        assert_eq!(
            indexer.index_file("/src/config.ts", SOURCE, false).await,
            FileOutcome::Unchanged
        );
        // Force bypasses the ledger.
        assert_eq!(
            indexer.index_file("/src/config.ts", SOURCE, true).await,
            FileOutcome::Indexed
        );
    }

    #[tokio::test]
    async fn test_reindex_replaces_generation() {
        let indexer = indexer();
        indexer.index_file("/src/config.ts", SOURCE, false).await;

        let changed = SOURCE.replace("parseConfig", "loadConfig");
        indexer.index_file("/src/config.ts", &changed, false).await;

        let symbols = indexer.symbols.read().await;
        assert!(symbols.search_by_name("parseConfig", false, 10).is_empty());
        assert_eq!(symbols.search_by_name("loadConfig", false, 10).len(), 1);

        let info = indexer.get_file_info("/src/config.ts").await.unwrap();
        let vectors = indexer.vectors.read().await;
        assert_eq!(
            vectors.get_stats().documents,
            info.chunk_count,
            "exactly one generation of vectors"
        );
    }

    #[tokio::test]
    async fn test_filters_and_size_cap() {
        let indexer = indexer();
        assert_eq!(
            indexer
                .index_file("/node_modules/pkg/index.js", "var x = 1;", false)
                .await,
            FileOutcome::Filtered
        );

        let huge = "x\n".repeat(1024 * 1024);
        assert_eq!(
            indexer.index_file("/src/huge.ts", &huge, false).await,
            FileOutcome::Oversized
        );
        assert!(indexer.get_file_info("/src/huge.ts").await.is_none());
    }

    #[tokio::test]
    async fn test_references_are_resolved() {
        let indexer = indexer();
        indexer.index_file("/src/config.ts", SOURCE, false).await;

        let symbols = indexer.symbols.read().await;
        let validate = &symbols.search_by_name("validate", false, 1)[0];
        let sites = symbols.get_references_to(&validate.id);
        assert!(!sites.is_empty(), "call inside parseConfig is recorded");
        assert_eq!(sites[0].path, "/src/config.ts");

        let dependents = symbols.get_symbols_that_reference(&validate.id);
        assert!(dependents.iter().any(|s| s.name == "parseConfig"));
    }

    #[tokio::test]
    async fn test_remove_file_evicts_everything() {
        let indexer = indexer();
        indexer.index_file("/src/config.ts", SOURCE, false).await;
        assert!(indexer.remove_file("/src/config.ts").await);

        assert!(indexer.get_file_info("/src/config.ts").await.is_none());
        assert!(indexer.get_file_chunks("/src/config.ts").await.is_empty());
        assert!(
            indexer
                .symbols
                .read()
                .await
                .get_symbols_by_path("/src/config.ts")
                .is_empty()
        );
        assert_eq!(indexer.vectors.read().await.get_stats().documents, 0);
        assert!(
            !indexer.remove_file("/src/config.ts").await,
            "second remove is a no-op"
        );
    }

    #[tokio::test]
    async fn test_batch_report() {
        let indexer = indexer();
        let files = vec![
            ("/a.ts".to_string(), "export const a = 1;".to_string()),
            ("/b.ts".to_string(), "export const b = 2;".to_string()),
            ("/node_modules/x.js".to_string(), "var x;".to_string()),
        ];

        let report = indexer.index_files(&files, false).await;
        assert_eq!(report.indexed, 2);
        assert_eq!(report.filtered, 1);

        let again = indexer.incremental_index(&files).await;
        assert_eq!(again.indexed, 0);
        assert_eq!(again.unchanged, 2);
    }

    #[tokio::test]
    async fn test_pending_embeddings_catch_up() {
        let symbols = Arc::new(RwLock::new(SymbolIndex::new()));
        let vectors = Arc::new(RwLock::new(VectorStore::new()));
        let embeddings = Arc::new(EmbeddingService::local_only(64));
        let config = IndexConfig {
            embeddings_enabled: false,
            ..IndexConfig::default()
        };
        let indexer = CodeIndexer::new(
            symbols,
            vectors.clone(),
            embeddings,
            EventBus::default(),
            config,
        )
        .unwrap();

        indexer.index_file("/src/config.ts", SOURCE, false).await;
        assert_eq!(vectors.read().await.get_stats().documents, 0);
        let stats = indexer.get_stats().await;
        assert!(stats.pending_embeddings > 0);

        let processed = indexer.process_pending_embeddings().await;
        assert_eq!(processed, stats.pending_embeddings);
        assert_eq!(vectors.read().await.get_stats().documents, stats.chunks);
        assert_eq!(indexer.get_stats().await.pending_embeddings, 0);
    }

    #[tokio::test]
    async fn test_export_import_roundtrip() {
        let first = indexer();
        first.index_file("/src/config.ts", SOURCE, false).await;
        let snapshot = first.export().await.unwrap();
        let stats = first.get_stats().await;

        let second = indexer();
        assert_eq!(second.import(&snapshot).await, 1);
        let restored = second.get_stats().await;
        assert_eq!(restored.files, stats.files);
        assert_eq!(restored.chunks, stats.chunks);

        assert_eq!(second.import("{bad json").await, 0);
        assert_eq!(second.get_stats().await.files, stats.files);
    }

    #[tokio::test]
    async fn test_events_emitted_in_phase_order() {
        let symbols = Arc::new(RwLock::new(SymbolIndex::new()));
        let vectors = Arc::new(RwLock::new(VectorStore::new()));
        let embeddings = Arc::new(EmbeddingService::local_only(64));
        let events = EventBus::new(128);
        let mut rx = events.subscribe();
        let indexer = CodeIndexer::new(
            symbols,
            vectors,
            embeddings,
            events,
            IndexConfig::default(),
        )
        .unwrap();

        indexer.index_file("/src/config.ts", SOURCE, false).await;

        let mut phases = Vec::new();
        while let Ok(event) = rx.try_recv() {
            if let IndexEvent::Phase { phase, .. } = event {
                phases.push(phase);
            }
        }
        assert_eq!(
            phases,
            vec![
                IndexPhase::Scanning,
                IndexPhase::Chunking,
                IndexPhase::Extracting,
                IndexPhase::Embedding,
                IndexPhase::Storing,
                IndexPhase::Complete,
            ]
        );
    }
}
