//! # codeintel — code intelligence engine
//!
//! Maintains a queryable model of a codebase — structural (named entities
//! and their relationships) and semantic (embedding-based similarity) — so
//! search, go-to-definition, find-usages, and AI-context features answer
//! without rescanning files.
//!
//! ## Architecture
//!
//! - **[`config`]** — Configuration loading, validation, defaults
//! - **[`symbols`]** — Symbol index: multi-key lookup, prefix trie, reference graph
//! - **[`vector`]** — In-memory vector store with cosine/hybrid search + SQLite mirror
//! - **[`indexer`]** — File → chunk → symbol → embedding pipeline with incremental ledger
//! - **[`search`]** — Intent classification and fused, ranked retrieval
//! - **[`embedder`]** — External embedding boundary with deterministic local fallback
//! - **[`events`]** — Indexing progress notifications over a broadcast bus

pub mod config;
pub mod embedder;
pub mod events;
pub mod indexer;
pub mod search;
pub mod symbols;
pub mod vector;

pub use config::Config;
pub use events::{EventBus, IndexEvent, IndexPhase};
pub use indexer::CodeIndexer;
pub use search::SemanticSearchEngine;
pub use symbols::SymbolIndex;
pub use vector::VectorStore;
