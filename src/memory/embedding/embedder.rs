//! Embedding model wrapper for Rig + Ollama.

use std::future::Future;
use std::num::NonZeroUsize;
use std::pin::Pin;
use std::sync::Arc;

use reqwest::Client as ReqwestClient;
use rig::client::{EmbeddingsClient, Nothing};
use rig::embeddings::{Embedding, EmbeddingModel};
use rig::providers::ollama;
use tracing::info;

use crate::memory::core::config::{EmbeddingConfig, EmbeddingProvider};
use crate::memory::core::errors::{MemoryError, MemoryResult};
use crate::memory::embedding::cache::CachedEmbedder;
use crate::memory::embedding::hashing::HashingEmbedder;

/// Boxed future type for embedder operations.
pub type EmbedFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Trait abstraction over embedding models.
///
/// Implementations must return vectors of a stable dimensionality.
pub trait Embedder: Send + Sync {
    /// Embed a single text string.
    ///
    /// # Errors
    /// Returns an error if the embedding request fails.
    fn embed_text(&self, text: &str) -> EmbedFuture<'_, MemoryResult<Embedding>>;
    /// Embed multiple texts, preserving input order.
    ///
    /// # Errors
    /// Returns an error if the embedding request fails.
    fn embed_texts(&self, texts: Vec<String>) -> EmbedFuture<'_, MemoryResult<Vec<Embedding>>>;
    /// Return embedding dimensionality.
    fn ndims(&self) -> usize;
}

type OllamaEmbeddingModel = ollama::EmbeddingModel<ReqwestClient>;

/// Ollama embedder using Rig provider.
#[derive(Clone)]
pub struct OllamaEmbedder {
    model: OllamaEmbeddingModel,
    ndims: usize,
}

impl OllamaEmbedder {
    /// Create a new Ollama embedder from config.
    ///
    /// # Errors
    /// Returns an error if the base URL is invalid or the client cannot be built.
    pub fn new(config: &EmbeddingConfig) -> MemoryResult<Self> {
        let builder = ollama::Client::<ReqwestClient>::builder().api_key(Nothing);
        let builder = if let Some(base_url) = &config.base_url {
            builder.base_url(base_url)
        } else {
            builder
        };
        let client = builder.build().map_err(MemoryError::from)?;
        let model = client.embedding_model_with_ndims(config.model.clone(), config.ndims);
        Ok(Self {
            model,
            ndims: config.ndims,
        })
    }
}

impl Embedder for OllamaEmbedder {
    fn embed_text(&self, text: &str) -> EmbedFuture<'_, MemoryResult<Embedding>> {
        let text = text.to_string();
        Box::pin(async move {
            self.model
                .embed_text(&text)
                .await
                .map_err(MemoryError::Embedding)
        })
    }

    fn embed_texts(&self, texts: Vec<String>) -> EmbedFuture<'_, MemoryResult<Vec<Embedding>>> {
        Box::pin(async move {
            if texts.is_empty() {
                return Ok(Vec::new());
            }
            self.model
                .embed_texts(texts)
                .await
                .map_err(MemoryError::Embedding)
        })
    }

    fn ndims(&self) -> usize {
        self.ndims
    }
}

/// Construct the configured embedding service, wrapped in an LRU cache.
///
/// Call once at startup and share the handle.
///
/// # Errors
/// Returns [`MemoryError::EmbedderUnavailable`] if the embedder cannot be constructed.
pub fn build_embedder(config: &EmbeddingConfig) -> MemoryResult<Arc<dyn Embedder>> {
    let capacity = NonZeroUsize::new(config.cache_capacity).ok_or_else(|| {
        MemoryError::InvalidConfig("embedding.cache_capacity must be > 0".to_string())
    })?;

    let embedder: Arc<dyn Embedder> = match config.provider {
        EmbeddingProvider::Ollama => {
            let inner = OllamaEmbedder::new(config)
                .map_err(|err| MemoryError::EmbedderUnavailable(err.to_string()))?;
            Arc::new(CachedEmbedder::new(inner, capacity))
        }
        EmbeddingProvider::Hashing => {
            let inner = HashingEmbedder::new(config.ndims)
                .map_err(|err| MemoryError::EmbedderUnavailable(err.to_string()))?;
            Arc::new(CachedEmbedder::new(inner, capacity))
        }
    };

    info!(
        provider = ?config.provider,
        model = %config.model,
        ndims = config.ndims,
        "Embedder ready"
    );
    Ok(embedder)
}
