/// Embedding service: primary embedder + deterministic fallback + query cache.
///
/// The service is the only embedding entry point the pipeline uses. External
/// failures never propagate: when the primary embedder errors, vectors come
/// from the local feature-hash fallback and are marked degraded so consumers
/// can tell the two provenances apart.
use std::sync::{Arc, Mutex};

use tracing::warn;

use super::cache::EmbeddingCache;
use super::fallback::FallbackEmbedder;
use super::Embedder;

/// An embedding plus its provenance.
#[derive(Debug, Clone)]
pub struct EmbeddedText {
    pub vector: Vec<f32>,
    /// True when the vector came from the local fallback rather than the
    /// external service.
    pub degraded: bool,
}

pub struct EmbeddingService {
    primary: Option<Arc<dyn Embedder>>,
    fallback: FallbackEmbedder,
    cache: Mutex<EmbeddingCache>,
    dimensions: usize,
}

impl EmbeddingService {
    /// Create a service. With no primary embedder every vector is a
    /// deterministic local one (useful for tests and offline mode).
    pub fn new(
        primary: Option<Arc<dyn Embedder>>,
        dimensions: usize,
        query_cache_capacity: usize,
    ) -> Self {
        Self {
            primary,
            fallback: FallbackEmbedder::new(dimensions),
            cache: Mutex::new(EmbeddingCache::new(query_cache_capacity)),
            dimensions,
        }
    }

    /// Service with no external embedder, fallback only.
    pub fn local_only(dimensions: usize) -> Self {
        Self::new(None, dimensions, 0)
    }

    #[must_use]
    pub fn dimensions(&self) -> usize {
        self.dimensions
    }

    /// Embed a search query, consulting the bounded cache first.
    pub async fn embed_query(&self, text: &str) -> EmbeddedText {
        if let Some(vector) = self.lock_cache().get(text) {
            return EmbeddedText {
                vector,
                degraded: false,
            };
        }

        let embedded = self.embed_one(text).await;
        if !embedded.degraded {
            self.lock_cache().insert(text, embedded.vector.clone());
        }
        embedded
    }

    fn lock_cache(&self) -> std::sync::MutexGuard<'_, EmbeddingCache> {
        // A poisoned cache only holds embeddings; keep using it.
        self.cache
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// Embed a single text without caching.
    pub async fn embed_one(&self, text: &str) -> EmbeddedText {
        if let Some(primary) = &self.primary {
            match primary.embed(text).await {
                Ok(vector) => {
                    return EmbeddedText {
                        vector,
                        degraded: false,
                    };
                }
                Err(e) => {
                    warn!("embedding service failed, using local fallback: {e}");
                }
            }
        }

        EmbeddedText {
            vector: self.fallback.embed_sync(text),
            degraded: self.primary.is_some(),
        }
    }

    /// Embed a batch of texts. On primary failure the whole batch degrades
    /// to fallback vectors; returns the vectors and whether they degraded.
    pub async fn embed_texts(&self, texts: &[String]) -> (Vec<Vec<f32>>, bool) {
        if texts.is_empty() {
            return (Vec::new(), false);
        }

        if let Some(primary) = &self.primary {
            let refs: Vec<&str> = texts.iter().map(String::as_str).collect();
            match primary.embed_batch(&refs).await {
                Ok(vectors) => return (vectors, false),
                Err(e) => {
                    warn!(
                        "batch embedding of {} texts failed, using local fallback: {e}",
                        texts.len()
                    );
                }
            }
        }

        let vectors = texts.iter().map(|t| self.fallback.embed_sync(t)).collect();
        (vectors, self.primary.is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedder::EmbedderError;
    use async_trait::async_trait;

    /// An embedder that always fails, for exercising the fallback path.
    struct BrokenEmbedder;

    #[async_trait]
    impl Embedder for BrokenEmbedder {
        async fn embed(&self, _text: &str) -> Result<Vec<f32>, EmbedderError> {
            Err(EmbedderError::RequestFailed("service down".to_string()))
        }

        async fn embed_batch(&self, _texts: &[&str]) -> Result<Vec<Vec<f32>>, EmbedderError> {
            Err(EmbedderError::RequestFailed("service down".to_string()))
        }

        fn dimensions(&self) -> usize {
            64
        }
    }

    #[tokio::test]
    async fn test_local_only_service() {
        let service = EmbeddingService::local_only(64);
        let out = service.embed_query("find the parser").await;
        assert_eq!(out.vector.len(), 64);
        assert!(!out.degraded, "local-only vectors are not degraded");
    }

    #[tokio::test]
    async fn test_broken_primary_degrades_to_fallback() {
        let service = EmbeddingService::new(Some(Arc::new(BrokenEmbedder)), 64, 8);
        let out = service.embed_query("find the parser").await;
        assert_eq!(out.vector.len(), 64);
        assert!(out.degraded, "fallback vectors are flagged degraded");
    }

    #[tokio::test]
    async fn test_degraded_vectors_not_cached() {
        let service = EmbeddingService::new(Some(Arc::new(BrokenEmbedder)), 64, 8);
        service.embed_query("query").await;
        let again = service.embed_query("query").await;
        assert!(again.degraded, "degraded result must not be served as fresh");
    }

    #[tokio::test]
    async fn test_batch_degrades_as_a_whole() {
        let service = EmbeddingService::new(Some(Arc::new(BrokenEmbedder)), 64, 8);
        let texts = vec!["one".to_string(), "two".to_string()];
        let (vectors, degraded) = service.embed_texts(&texts).await;
        assert_eq!(vectors.len(), 2);
        assert!(degraded);
    }

    #[tokio::test]
    async fn test_fallback_is_deterministic_across_calls() {
        let service = EmbeddingService::local_only(64);
        let a = service.embed_one("stable input").await;
        let b = service.embed_one("stable input").await;
        assert_eq!(a.vector, b.vector);
    }
}
