/// Configuration module for codeintel.
///
/// Handles loading, validating, and providing default configuration values.
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

// ── Default value functions ──────────────────────────────────────────

fn default_chunk_lines() -> usize {
    50
}

fn default_chunk_overlap() -> usize {
    10
}

fn default_max_file_bytes() -> usize {
    1024 * 1024
}

fn default_include_patterns() -> Vec<String> {
    vec!["**/*".to_string()]
}

fn default_exclude_patterns() -> Vec<String> {
    vec![
        "**/node_modules/**".to_string(),
        "**/target/**".to_string(),
        "**/.git/**".to_string(),
        "**/dist/**".to_string(),
    ]
}

fn default_batch_size() -> usize {
    8
}

fn default_true() -> bool {
    true
}

fn default_endpoint() -> String {
    "http://127.0.0.1:8900/embeddings".to_string()
}

fn default_model_name() -> String {
    "code-embed-small".to_string()
}

fn default_dimensions() -> usize {
    384
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_max_input_chars() -> usize {
    8000
}

fn default_query_cache_size() -> usize {
    128
}

fn default_search_limit() -> usize {
    20
}

fn default_semantic_weight() -> f32 {
    0.6
}

fn default_keyword_weight() -> f32 {
    0.4
}

fn default_min_score() -> f32 {
    0.1
}

fn default_similar_min_score() -> f32 {
    0.7
}

fn default_db_path() -> String {
    "./codeintel.db".to_string()
}

// ── Config structs ───────────────────────────────────────────────────

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Config {
    #[serde(default)]
    pub index: IndexConfig,

    #[serde(default)]
    pub embedding: EmbeddingConfig,

    #[serde(default)]
    pub search: SearchConfig,

    #[serde(default)]
    pub storage: StorageConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct IndexConfig {
    /// Lines per sliding-window chunk.
    #[serde(default = "default_chunk_lines")]
    pub chunk_lines: usize,

    /// Overlapping lines between adjacent chunks.
    #[serde(default = "default_chunk_overlap")]
    pub chunk_overlap: usize,

    /// Files above this size are skipped and counted, never errors.
    #[serde(default = "default_max_file_bytes")]
    pub max_file_bytes: usize,

    #[serde(default = "default_include_patterns")]
    pub include_patterns: Vec<String>,

    #[serde(default = "default_exclude_patterns")]
    pub exclude_patterns: Vec<String>,

    /// Files per batch; one batch's embedding calls settle before the next
    /// batch starts, capping concurrent outstanding external calls.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    #[serde(default = "default_true")]
    pub embeddings_enabled: bool,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_endpoint")]
    pub endpoint: String,

    #[serde(default = "default_model_name")]
    pub model: String,

    #[serde(default = "default_dimensions")]
    pub dimensions: usize,

    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    #[serde(default = "default_max_input_chars")]
    pub max_input_chars: usize,

    #[serde(default = "default_query_cache_size")]
    pub query_cache_size: usize,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct SearchConfig {
    #[serde(default = "default_search_limit")]
    pub default_limit: usize,

    #[serde(default = "default_semantic_weight")]
    pub semantic_weight: f32,

    #[serde(default = "default_keyword_weight")]
    pub keyword_weight: f32,

    #[serde(default = "default_min_score")]
    pub min_score: f32,

    #[serde(default = "default_similar_min_score")]
    pub similar_min_score: f32,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct StorageConfig {
    #[serde(default = "default_db_path")]
    pub db_path: String,

    /// Disable to run fully in memory (tests, ephemeral sessions).
    #[serde(default = "default_true")]
    pub persist: bool,
}

// ── Default impls ────────────────────────────────────────────────────

impl Default for Config {
    fn default() -> Self {
        Self {
            index: IndexConfig::default(),
            embedding: EmbeddingConfig::default(),
            search: SearchConfig::default(),
            storage: StorageConfig::default(),
        }
    }
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            chunk_lines: default_chunk_lines(),
            chunk_overlap: default_chunk_overlap(),
            max_file_bytes: default_max_file_bytes(),
            include_patterns: default_include_patterns(),
            exclude_patterns: default_exclude_patterns(),
            batch_size: default_batch_size(),
            embeddings_enabled: default_true(),
        }
    }
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            model: default_model_name(),
            dimensions: default_dimensions(),
            timeout_secs: default_timeout_secs(),
            max_input_chars: default_max_input_chars(),
            query_cache_size: default_query_cache_size(),
        }
    }
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            default_limit: default_search_limit(),
            semantic_weight: default_semantic_weight(),
            keyword_weight: default_keyword_weight(),
            min_score: default_min_score(),
            similar_min_score: default_similar_min_score(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            persist: default_true(),
        }
    }
}

// ── Config implementation ────────────────────────────────────────────

impl Config {
    /// Load configuration from a JSON file.
    ///
    /// If `config_path` is empty, defaults to `"codeintel.json"`.
    /// A missing or invalid file yields the default configuration.
    pub fn load(config_path: &str) -> Result<Self> {
        let path = if config_path.is_empty() {
            "codeintel.json"
        } else {
            config_path
        };

        if !Path::new(path).exists() {
            info!("{path} not found, using defaults");
            return Ok(Self::default());
        }

        let data = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config: {path}"))?;

        match serde_json::from_str(&data) {
            Ok(cfg) => {
                info!("loaded configuration from {path}");
                Ok(cfg)
            }
            Err(e) => {
                warn!("invalid JSON in {path}: {e}");
                warn!("using default configuration");
                Ok(Self::default())
            }
        }
    }

    /// Save configuration to a JSON file.
    pub fn save(&self, path: &str) -> Result<()> {
        let data = serde_json::to_string_pretty(self).context("failed to marshal config")?;
        std::fs::write(path, data).with_context(|| format!("failed to write config: {path}"))?;
        Ok(())
    }

    /// Validate configuration values.
    pub fn validate(&self) -> Result<()> {
        anyhow::ensure!(self.index.chunk_lines > 0, "index.chunk_lines must be positive");
        anyhow::ensure!(
            self.index.chunk_overlap < self.index.chunk_lines,
            "index.chunk_overlap must be smaller than index.chunk_lines"
        );
        anyhow::ensure!(self.index.batch_size > 0, "index.batch_size must be positive");
        anyhow::ensure!(
            self.embedding.dimensions > 0,
            "embedding.dimensions must be positive"
        );
        anyhow::ensure!(
            self.search.default_limit > 0,
            "search.default_limit must be positive"
        );
        let weight_sum = self.search.semantic_weight + self.search.keyword_weight;
        anyhow::ensure!(
            (weight_sum - 1.0).abs() < 1e-3,
            "search.semantic_weight and search.keyword_weight must sum to 1.0"
        );
        Ok(())
    }
}

// ── Tests ────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.index.chunk_lines, 50);
        assert_eq!(config.index.chunk_overlap, 10);
        assert_eq!(config.embedding.dimensions, 384);
        assert_eq!(config.search.default_limit, 20);
        assert!((config.search.semantic_weight - 0.6).abs() < 1e-6);
        assert!(config.index.embeddings_enabled);
        assert!(config.storage.persist);
    }

    #[test]
    fn test_load_from_json() {
        let json = r#"{"index": {"chunk_lines": 80}, "storage": {"db_path": "./test.db"}}"#;
        let config: Config = serde_json::from_str(json).unwrap();
        assert_eq!(config.index.chunk_lines, 80);
        assert_eq!(config.storage.db_path, "./test.db");
        // Other fields should have defaults
        assert_eq!(config.index.chunk_overlap, 10);
        assert_eq!(config.embedding.dimensions, 384);
    }

    #[test]
    fn test_validate_ok() {
        let config = Config::default();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_bad_chunk_lines() {
        let mut config = Config::default();
        config.index.chunk_lines = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_overlap_must_be_smaller_than_window() {
        let mut config = Config::default();
        config.index.chunk_overlap = config.index.chunk_lines;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_weights_must_sum_to_one() {
        let mut config = Config::default();
        config.search.semantic_weight = 0.9;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_serialization_roundtrip() {
        let config = Config::default();
        let json = serde_json::to_string_pretty(&config).unwrap();
        let parsed: Config = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.index.chunk_lines, config.index.chunk_lines);
        assert_eq!(parsed.storage.db_path, config.storage.db_path);
        assert_eq!(parsed.embedding.model, config.embedding.model);
    }
}
