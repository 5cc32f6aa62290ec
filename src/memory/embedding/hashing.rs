//! Offline feature-hashing embedder.
//!
//! Tokens are lower-cased word runs hashed into a fixed number of buckets,
//! then L2 normalized. No model server is needed, and identical text always
//! yields an identical vector. Buckets come from xxh3, which is fixed across
//! builds and platforms, so stored vectors stay comparable with new queries.

use regex::Regex;
use rig::embeddings::Embedding;
use xxhash_rust::xxh3::xxh3_64;

use crate::memory::core::errors::{MemoryError, MemoryResult};
use crate::memory::embedding::embedder::{EmbedFuture, Embedder};

/// Deterministic bag-of-words embedder.
#[derive(Clone, Debug)]
pub struct HashingEmbedder {
    ndims: usize,
    token: Regex,
}

impl HashingEmbedder {
    /// Create an embedder producing `ndims`-dimensional vectors.
    ///
    /// # Errors
    /// Returns an error if `ndims` is zero.
    pub fn new(ndims: usize) -> MemoryResult<Self> {
        if ndims == 0 {
            return Err(MemoryError::InvalidConfig(
                "hashing embedder needs ndims > 0".to_string(),
            ));
        }
        let token = Regex::new(r"[\p{L}\p{N}]+")
            .map_err(|err| MemoryError::InvalidConfig(format!("invalid regex: {err}")))?;
        Ok(Self { ndims, token })
    }

    /// Compute the raw vector for `text`.
    #[must_use]
    pub fn vectorize(&self, text: &str) -> Vec<f64> {
        let mut vec = vec![0.0_f64; self.ndims];
        for token in self.token.find_iter(text) {
            vec[self.bucket(&token.as_str().to_lowercase())] += 1.0;
        }

        let norm = vec.iter().map(|v| v * v).sum::<f64>().sqrt();
        if norm > 0.0 {
            for v in &mut vec {
                *v /= norm;
            }
        }
        vec
    }

    fn bucket(&self, token: &str) -> usize {
        let ndims = self.ndims as u64;
        usize::try_from(xxh3_64(token.as_bytes()) % ndims).unwrap_or(0)
    }

    fn embedding(&self, text: &str) -> Embedding {
        Embedding {
            document: text.to_string(),
            vec: self.vectorize(text),
        }
    }
}

impl Embedder for HashingEmbedder {
    fn embed_text(&self, text: &str) -> EmbedFuture<'_, MemoryResult<Embedding>> {
        let embedding = self.embedding(text);
        Box::pin(async move { Ok(embedding) })
    }

    fn embed_texts(&self, texts: Vec<String>) -> EmbedFuture<'_, MemoryResult<Vec<Embedding>>> {
        let embeddings = texts.iter().map(|text| self.embedding(text)).collect();
        Box::pin(async move { Ok(embeddings) })
    }

    fn ndims(&self) -> usize {
        self.ndims
    }
}
