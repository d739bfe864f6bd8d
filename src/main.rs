use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use ignore::WalkBuilder;
use tokio::sync::RwLock;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use codeintel::config::Config;
use codeintel::embedder::http::HttpEmbedder;
use codeintel::embedder::service::EmbeddingService;
use codeintel::events::{EventBus, IndexEvent};
use codeintel::indexer::CodeIndexer;
use codeintel::search::{SearchOptions, SemanticSearchEngine};
use codeintel::symbols::SymbolIndex;
use codeintel::vector::{SqliteStorage, VectorStore, storage::spawn_mirror};

#[derive(Parser)]
#[command(name = "codeintel", version, about = "Code intelligence indexing and search")]
struct Cli {
    /// Path to the JSON config file.
    #[arg(long, default_value = "")]
    config: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Index a directory tree.
    Index {
        /// Root directory to index.
        dir: String,
        /// Re-index even when content hashes are unchanged.
        #[arg(long)]
        force: bool,
    },
    /// Search the index with a free-form query.
    Search {
        query: String,
        #[arg(long)]
        limit: Option<usize>,
        /// Structural-only quick search (no embedding call).
        #[arg(long)]
        quick: bool,
    },
    /// Print index statistics.
    Stats,
    /// Write a full snapshot of the symbol and vector stores.
    Export {
        /// Output file for the snapshot.
        out: String,
    },
    /// Restore a snapshot written by `export`.
    Import {
        /// Snapshot file to read.
        file: String,
    },
}

struct App {
    symbols: Arc<RwLock<SymbolIndex>>,
    vectors: Arc<RwLock<VectorStore>>,
    indexer: CodeIndexer,
    engine: SemanticSearchEngine,
    events: EventBus,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = Config::load(&cli.config)?;
    config.validate().context("invalid configuration")?;

    let app = build_app(&config).await?;

    match cli.command {
        Command::Index { dir, force } => index_directory(&app, &dir, force).await?,
        Command::Search {
            query,
            limit,
            quick,
        } => run_search(&app, &config, &query, limit, quick).await,
        Command::Stats => print_stats(&app).await,
        Command::Export { out } => export_snapshot(&app, &out).await?,
        Command::Import { file } => import_snapshot(&app, &file).await?,
    }

    Ok(())
}

async fn build_app(config: &Config) -> Result<App> {
    let embedder = HttpEmbedder::new(
        &config.embedding.endpoint,
        &config.embedding.model,
        config.embedding.dimensions,
        config.embedding.max_input_chars,
        config.embedding.timeout_secs,
    )
    .context("failed to build embedding client")?;
    let embeddings = Arc::new(EmbeddingService::new(
        Some(Arc::new(embedder)),
        config.embedding.dimensions,
        config.embedding.query_cache_size,
    ));

    // The in-memory store answers queries; SQLite mirrors them durably and
    // reloads on cold start.
    let vectors = if config.storage.persist {
        let storage =
            SqliteStorage::open(&config.storage.db_path).context("failed to open vector storage")?;
        let restored = storage.load_all().context("failed to load vector storage")?;
        let mut store = VectorStore::with_mirror(spawn_mirror(storage));
        if !restored.is_empty() {
            info!("restored {} vector documents", store.load_documents(restored));
        }
        store
    } else {
        VectorStore::new()
    };

    let symbols = Arc::new(RwLock::new(SymbolIndex::new()));
    let vectors = Arc::new(RwLock::new(vectors));
    let events = EventBus::default();

    let indexer = CodeIndexer::new(
        symbols.clone(),
        vectors.clone(),
        embeddings.clone(),
        events.clone(),
        config.index.clone(),
    )?;
    let engine = SemanticSearchEngine::new(
        symbols.clone(),
        vectors.clone(),
        embeddings,
        config.search.clone(),
    );

    Ok(App {
        symbols,
        vectors,
        indexer,
        engine,
        events,
    })
}

async fn index_directory(app: &App, dir: &str, force: bool) -> Result<()> {
    let root = Path::new(dir);
    anyhow::ensure!(root.is_dir(), "not a directory: {dir}");

    let mut files: Vec<(String, String)> = Vec::new();
    // Respects .gitignore, like any sane code scanner.
    for entry in WalkBuilder::new(root).hidden(false).build().flatten() {
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        match std::fs::read_to_string(path) {
            Ok(content) => {
                files.push((path.to_string_lossy().replace('\\', "/"), content));
            }
            Err(e) => warn!("skipping unreadable file {}: {e}", path.display()),
        }
    }
    info!("scanning {} files under {dir}", files.len());

    // Progress listener: one line per completed file.
    let mut rx = app.events.subscribe();
    let progress = tokio::spawn(async move {
        while let Ok(event) = rx.recv().await {
            if let IndexEvent::Phase { path, phase } = event {
                if phase == codeintel::IndexPhase::Complete {
                    info!("indexed {path}");
                }
            }
        }
    });

    let report = app.indexer.index_files(&files, force).await;
    progress.abort();

    println!(
        "indexed {} files ({} unchanged, {} filtered, {} oversized)",
        report.indexed, report.unchanged, report.filtered, report.oversized
    );
    Ok(())
}

async fn run_search(app: &App, config: &Config, query: &str, limit: Option<usize>, quick: bool) {
    let limit = limit.unwrap_or(config.search.default_limit);

    let results = if quick {
        app.engine
            .quick_search(query, &Default::default(), limit)
            .await
    } else {
        let options = SearchOptions {
            limit,
            min_score: config.search.min_score,
            ..Default::default()
        };
        app.engine.search(query, &options).await
    };

    if results.is_empty() {
        println!("no results");
        return;
    }
    for result in results {
        println!(
            "{:.3}  {}:{}-{}  {}",
            result.score, result.path, result.line_start, result.line_end, result.title
        );
        if !result.snippet.is_empty() {
            println!("       {}", first_line(&result.snippet));
        }
        if let Some(explanation) = &result.explanation {
            println!("       {explanation}");
        }
    }
}

async fn print_stats(app: &App) {
    let symbol_stats = app.symbols.read().await.get_stats();
    let vector_stats = app.vectors.read().await.get_stats();
    let index_stats = app.indexer.get_stats().await;

    println!(
        "files: {}  chunks: {}  pending embeddings: {}",
        index_stats.files, index_stats.chunks, index_stats.pending_embeddings
    );
    println!(
        "symbols: {}  reference edges: {}  trie nodes: {}",
        symbol_stats.total_symbols, symbol_stats.reference_edges, symbol_stats.trie_nodes
    );
    println!(
        "vector documents: {}  dimensions: {:?}  degraded: {}",
        vector_stats.documents, vector_stats.dimensions, vector_stats.degraded_documents
    );
}

#[derive(serde::Serialize, serde::Deserialize)]
struct Snapshot {
    symbols: String,
    vectors: String,
    index: String,
}

async fn export_snapshot(app: &App, out: &str) -> Result<()> {
    let snapshot = Snapshot {
        symbols: app.symbols.read().await.export()?,
        vectors: app.vectors.read().await.export()?,
        index: app.indexer.export().await?,
    };
    std::fs::write(out, serde_json::to_string(&snapshot)?)
        .with_context(|| format!("failed to write snapshot: {out}"))?;
    println!("snapshot written to {out}");
    Ok(())
}

async fn import_snapshot(app: &App, file: &str) -> Result<()> {
    let data =
        std::fs::read_to_string(file).with_context(|| format!("failed to read snapshot: {file}"))?;
    let snapshot: Snapshot = serde_json::from_str(&data).context("malformed snapshot")?;

    let symbols = app.symbols.write().await.import(&snapshot.symbols);
    let vectors = app.vectors.write().await.import(&snapshot.vectors);
    let files = app.indexer.import(&snapshot.index).await;
    println!("restored {symbols} symbols, {vectors} vector documents, {files} files");
    Ok(())
}

fn first_line(text: &str) -> &str {
    text.lines().next().unwrap_or("")
}
