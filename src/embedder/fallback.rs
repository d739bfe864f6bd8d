/// Deterministic local fallback embedder.
///
/// Produces feature-hashed embeddings from token counts. Not semantically
/// comparable to vectors from a real model, but deterministic and cheap, so
/// content stays searchable at degraded quality when the external embedding
/// service is unavailable. Also the embedder of choice in tests.
use std::hash::{DefaultHasher, Hash, Hasher};

use async_trait::async_trait;

use super::{Embedder, EmbedderError};

/// A feature-hashing embedder: each token is hashed into a bucket, bucket
/// counts are sign-hashed and L2-normalized.
pub struct FallbackEmbedder {
    dimensions: usize,
}

impl FallbackEmbedder {
    /// Create a new `FallbackEmbedder` with the given dimensionality.
    #[must_use]
    pub fn new(dimensions: usize) -> Self {
        Self { dimensions }
    }

    /// Embed synchronously. Infallible: empty or non-token input yields a
    /// zero vector of the configured dimension.
    #[must_use]
    pub fn embed_sync(&self, text: &str) -> Vec<f32> {
        let mut embedding = vec![0.0f32; self.dimensions];

        for token in tokenize(text) {
            let mut hasher = DefaultHasher::new();
            token.hash(&mut hasher);
            let hash = hasher.finish();

            let bucket = (hash % self.dimensions as u64) as usize;
            // One bit of the hash decides the sign, which keeps unrelated
            // tokens from piling up in the same direction.
            let sign = if hash & (1 << 63) == 0 { 1.0 } else { -1.0 };
            embedding[bucket] += sign;
        }

        l2_normalize(&mut embedding);
        embedding
    }

    #[must_use]
    pub fn dimensions(&self) -> usize {
        self.dimensions
    }
}

impl Default for FallbackEmbedder {
    fn default() -> Self {
        Self { dimensions: 384 }
    }
}

#[async_trait]
impl Embedder for FallbackEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbedderError> {
        Ok(self.embed_sync(text))
    }

    async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, EmbedderError> {
        Ok(texts.iter().map(|t| self.embed_sync(t)).collect())
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }
}

/// Split text into lowercased alphanumeric/underscore tokens.
fn tokenize(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|c: char| !c.is_alphanumeric() && c != '_')
        .filter(|t| !t.is_empty())
        .map(str::to_lowercase)
}

fn l2_normalize(vec: &mut [f32]) {
    let norm_sq: f32 = vec.iter().map(|v| v * v).sum();
    if norm_sq > 0.0 {
        let inv = 1.0 / norm_sq.sqrt();
        for v in vec {
            *v *= inv;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fallback_embed_dimensions() {
        let embedder = FallbackEmbedder::new(384);
        let result = embedder.embed_sync("hello world");
        assert_eq!(result.len(), 384);
    }

    #[test]
    fn test_fallback_embed_deterministic() {
        let embedder = FallbackEmbedder::new(384);
        let a = embedder.embed_sync("fn main() { println!(\"hi\") }");
        let b = embedder.embed_sync("fn main() { println!(\"hi\") }");
        assert_eq!(a, b, "same input should produce same output");
    }

    #[test]
    fn test_fallback_embed_different_inputs() {
        let embedder = FallbackEmbedder::new(384);
        let a = embedder.embed_sync("parse the config file");
        let b = embedder.embed_sync("render the user interface");
        assert_ne!(a, b, "different inputs should produce different outputs");
    }

    #[test]
    fn test_fallback_embed_normalized() {
        let embedder = FallbackEmbedder::new(384);
        let vec = embedder.embed_sync("test normalization of this vector");
        let norm: f32 = vec.iter().map(|v| v * v).sum::<f32>().sqrt();
        assert!(
            (norm - 1.0).abs() < 0.01,
            "vector should be approximately unit length, got {norm}"
        );
    }

    #[test]
    fn test_fallback_embed_empty_input() {
        let embedder = FallbackEmbedder::new(64);
        let vec = embedder.embed_sync("");
        assert_eq!(vec.len(), 64);
        assert!(vec.iter().all(|v| *v == 0.0), "empty input yields zeros");
    }

    #[test]
    fn test_fallback_shared_tokens_correlate() {
        let embedder = FallbackEmbedder::new(384);
        let a = embedder.embed_sync("getUserData fetches the user record");
        let b = embedder.embed_sync("getUserData returns the user record");
        let c = embedder.embed_sync("completely unrelated sentence about weather");

        let sim_ab: f32 = a.iter().zip(&b).map(|(x, y)| x * y).sum();
        let sim_ac: f32 = a.iter().zip(&c).map(|(x, y)| x * y).sum();
        assert!(
            sim_ab > sim_ac,
            "overlapping token sets should score higher ({sim_ab} vs {sim_ac})"
        );
    }

    #[tokio::test]
    async fn test_fallback_embed_batch() {
        let embedder = FallbackEmbedder::new(128);
        let results = embedder.embed_batch(&["a", "b", "c"]).await.unwrap();
        assert_eq!(results.len(), 3);
        for vec in &results {
            assert_eq!(vec.len(), 128);
        }
    }

    #[test]
    fn test_fallback_default_dimensions() {
        let embedder = FallbackEmbedder::default();
        assert_eq!(embedder.dimensions(), 384);
    }
}
