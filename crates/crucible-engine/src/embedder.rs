//! Embedding facade
//!
//! The embedding model is a shared resource: the facade serializes access
//! (one in-flight compute at a time) and caches recent results so
//! re-embedding an unchanged claim costs nothing.

use async_trait::async_trait;
use lru::LruCache;
use std::num::NonZeroUsize;
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::error::EngineError;

/// Cached claim embeddings kept per facade.
const CACHE_CAPACITY: usize = 128;

/// Outbound embedding capability: `embed(text) -> vector`.
#[async_trait]
pub trait EmbeddingTransport: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EngineError>;
}

/// Request-serializing, caching wrapper around an embedding transport.
pub struct EmbeddingFacade {
    inner: Arc<dyn EmbeddingTransport>,
    /// Held across the inner call: callers suspend instead of stacking
    /// concurrent computes on the shared model
    gate: Mutex<LruCache<String, Vec<f32>>>,
}

impl EmbeddingFacade {
    pub fn new(inner: Arc<dyn EmbeddingTransport>) -> Self {
        Self {
            inner,
            gate: Mutex::new(LruCache::new(
                NonZeroUsize::new(CACHE_CAPACITY).expect("capacity is non-zero"),
            )),
        }
    }

    /// Embed `text`, serving repeats from the cache.
    pub async fn embed(&self, text: &str) -> Result<Vec<f32>, EngineError> {
        let mut cache = self.gate.lock().await;
        if let Some(vector) = cache.get(text) {
            return Ok(vector.clone());
        }
        let vector = self.inner.embed(text).await?;
        cache.put(text.to_string(), vector.clone());
        Ok(vector)
    }
}

// ============================================================================
// HASH EMBEDDER
// ============================================================================

/// Dimensions of the fallback hash embedding.
pub const HASH_EMBEDDING_DIMENSIONS: usize = 64;

/// Deterministic bag-of-tokens embedder. No model download, no network:
/// each lowercased token hashes into a bucket and the vector is
/// L2-normalized. Word overlap maps onto cosine similarity, which is all
/// the trajectory detector needs for offline runs and tests.
#[derive(Debug, Default, Clone, Copy)]
pub struct HashEmbedder;

/// FNV-1a, stable across platforms and runs.
fn fnv1a(token: &str) -> u64 {
    let mut hash: u64 = 0xcbf29ce484222325;
    for byte in token.as_bytes() {
        hash ^= u64::from(*byte);
        hash = hash.wrapping_mul(0x100000001b3);
    }
    hash
}

impl HashEmbedder {
    pub fn embed_sync(text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; HASH_EMBEDDING_DIMENSIONS];
        for token in text.split_whitespace() {
            let token: String = token
                .chars()
                .filter(|c| c.is_alphanumeric())
                .collect::<String>()
                .to_lowercase();
            if token.is_empty() {
                continue;
            }
            let bucket = (fnv1a(&token) % HASH_EMBEDDING_DIMENSIONS as u64) as usize;
            vector[bucket] += 1.0;
        }
        let norm = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            for value in &mut vector {
                *value /= norm;
            }
        }
        vector
    }
}

#[async_trait]
impl EmbeddingTransport for HashEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EngineError> {
        if text.trim().is_empty() {
            return Err(EngineError::Validation("cannot embed empty text".into()));
        }
        Ok(Self::embed_sync(text))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crucible_core::cosine_similarity;

    #[test]
    fn hash_embedding_is_deterministic_and_normalized() {
        let a = HashEmbedder::embed_sync("markets aggregate distributed knowledge");
        let b = HashEmbedder::embed_sync("markets aggregate distributed knowledge");
        assert_eq!(a, b);
        let norm: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
    }

    #[test]
    fn overlapping_texts_are_more_similar_than_disjoint_ones() {
        let base = HashEmbedder::embed_sync("prediction markets beat expert panels");
        let near = HashEmbedder::embed_sync("prediction markets beat most expert panels");
        let far = HashEmbedder::embed_sync("tidal forces shape coastal erosion rates");
        assert!(
            cosine_similarity(&base, &near) > cosine_similarity(&base, &far),
            "near={} far={}",
            cosine_similarity(&base, &near),
            cosine_similarity(&base, &far)
        );
    }

    #[tokio::test]
    async fn facade_caches_repeat_queries() {
        use std::sync::atomic::{AtomicUsize, Ordering};

        struct Counting(AtomicUsize);

        #[async_trait]
        impl EmbeddingTransport for Counting {
            async fn embed(&self, text: &str) -> Result<Vec<f32>, EngineError> {
                self.0.fetch_add(1, Ordering::SeqCst);
                Ok(HashEmbedder::embed_sync(text))
            }
        }

        let counter = Arc::new(Counting(AtomicUsize::new(0)));
        let facade = EmbeddingFacade::new(counter.clone());
        facade.embed("same claim").await.unwrap();
        facade.embed("same claim").await.unwrap();
        facade.embed("different claim").await.unwrap();
        assert_eq!(counter.0.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn empty_text_is_rejected() {
        let facade = EmbeddingFacade::new(Arc::new(HashEmbedder));
        assert!(facade.embed("   ").await.is_err());
    }
}
