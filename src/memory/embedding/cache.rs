//! LRU cache in front of an embedder.

use std::num::NonZeroUsize;

use lru::LruCache;
use rig::embeddings::Embedding;
use tokio::sync::Mutex;
use tracing::debug;

use crate::memory::core::errors::{MemoryError, MemoryResult};
use crate::memory::embedding::embedder::{EmbedFuture, Embedder};

/// Embedder wrapper that memoizes vectors by exact text.
pub struct CachedEmbedder<E> {
    inner: E,
    cache: Mutex<LruCache<String, Vec<f64>>>,
}

impl<E: Embedder> CachedEmbedder<E> {
    /// Wrap `inner` with a cache holding at most `capacity` vectors.
    #[must_use]
    pub fn new(inner: E, capacity: NonZeroUsize) -> Self {
        Self {
            inner,
            cache: Mutex::new(LruCache::new(capacity)),
        }
    }

    /// Number of cached vectors.
    pub async fn len(&self) -> usize {
        self.cache.lock().await.len()
    }

    /// Whether the cache is empty.
    pub async fn is_empty(&self) -> bool {
        self.cache.lock().await.is_empty()
    }

    async fn lookup(&self, text: &str) -> Option<Vec<f64>> {
        let mut cache = self.cache.lock().await;
        cache.get(text).cloned()
    }

    async fn remember(&self, text: &str, vec: &[f64]) {
        let mut cache = self.cache.lock().await;
        cache.put(text.to_string(), vec.to_vec());
    }
}

impl<E: Embedder> Embedder for CachedEmbedder<E> {
    fn embed_text(&self, text: &str) -> EmbedFuture<'_, MemoryResult<Embedding>> {
        let text = text.to_string();
        Box::pin(async move {
            if let Some(vec) = self.lookup(&text).await {
                return Ok(Embedding {
                    document: text,
                    vec,
                });
            }
            let embedding = self.inner.embed_text(&text).await?;
            self.remember(&text, &embedding.vec).await;
            Ok(embedding)
        })
    }

    fn embed_texts(&self, texts: Vec<String>) -> EmbedFuture<'_, MemoryResult<Vec<Embedding>>> {
        Box::pin(async move {
            let mut slots: Vec<Option<Vec<f64>>> = Vec::with_capacity(texts.len());
            let mut misses = Vec::new();
            for text in &texts {
                let hit = self.lookup(text).await;
                if hit.is_none() {
                    misses.push(text.clone());
                }
                slots.push(hit);
            }

            debug!(
                total = texts.len(),
                misses = misses.len(),
                "Embedding cache lookup"
            );

            let wanted = misses.len();
            let fresh = if misses.is_empty() {
                Vec::new()
            } else {
                self.inner.embed_texts(misses).await?
            };
            if fresh.len() != wanted {
                return Err(MemoryError::EmbedderUnavailable(format!(
                    "embedder returned {} vectors for {wanted} texts",
                    fresh.len()
                )));
            }
            let mut fresh = fresh.into_iter().map(|e| e.vec);

            let mut out = Vec::with_capacity(texts.len());
            for (text, slot) in texts.into_iter().zip(slots) {
                let vec = match slot {
                    Some(vec) => vec,
                    None => {
                        let Some(vec) = fresh.next() else {
                            return Err(MemoryError::EmbedderUnavailable(
                                "embedder batch ended early".to_string(),
                            ));
                        };
                        self.remember(&text, &vec).await;
                        vec
                    }
                };
                out.push(Embedding {
                    document: text,
                    vec,
                });
            }
            Ok(out)
        })
    }

    fn ndims(&self) -> usize {
        self.inner.ndims()
    }
}
