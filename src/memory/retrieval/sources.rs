//! Candidate sources: the stages a retrieval call can be answered from.

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::memory::core::chunk::{Candidate, Chunk};
use crate::memory::core::errors::{MemoryError, MemoryResult};
use crate::memory::core::vector_math::cosine;
use crate::memory::embedding::embedder::Embedder;
use crate::memory::storage::chunk_store::ChunkStore;
use crate::memory::storage::sqlite_store::{SqliteChunkStore, VectorCapability};

/// Boxed future type for candidate source operations.
pub type SourceFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Minimum number of rows read by the bulk-scan stage.
pub const MIN_BULK_SCAN_ROWS: usize = 500;
/// Bulk-scan reads this many rows per requested pool slot.
pub const BULK_SCAN_FACTOR: usize = 5;

/// How a retrieval call obtained its candidate pool.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RetrievalMethod {
    /// Whole local collection scored in-process.
    Local,
    /// Store-side similarity ranking.
    NativeVectorQuery,
    /// Recent rows scanned and scored client-side.
    ClientSideFallback,
    /// Every stage failed.
    Unavailable,
}

impl RetrievalMethod {
    /// Stable label used in metadata and logs.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Local => "local",
            Self::NativeVectorQuery => "native_vector_query",
            Self::ClientSideFallback => "client_side_fallback",
            Self::Unavailable => "unavailable",
        }
    }
}

impl fmt::Display for RetrievalMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One stage able to produce similarity-scored candidates for a query vector.
pub trait CandidateSource: Send + Sync {
    /// Method reported when this stage answers.
    fn method(&self) -> RetrievalMethod;
    /// Produce candidates with their similarity to `query`.
    ///
    /// # Errors
    /// Returns an error if the stage cannot answer; the caller moves on.
    fn fetch<'a>(
        &'a self,
        query: &'a [f64],
        pool: usize,
    ) -> SourceFuture<'a, MemoryResult<Vec<Candidate>>>;
}

/// Scores every chunk of a local store, embedding texts on demand.
pub struct LocalSource {
    store: Arc<dyn ChunkStore>,
    embedder: Arc<dyn Embedder>,
}

impl LocalSource {
    /// Create a local source over `store`.
    #[must_use]
    pub fn new(store: Arc<dyn ChunkStore>, embedder: Arc<dyn Embedder>) -> Self {
        Self { store, embedder }
    }
}

impl CandidateSource for LocalSource {
    fn method(&self) -> RetrievalMethod {
        RetrievalMethod::Local
    }

    fn fetch<'a>(
        &'a self,
        query: &'a [f64],
        _pool: usize,
    ) -> SourceFuture<'a, MemoryResult<Vec<Candidate>>> {
        Box::pin(async move {
            let chunks = self
                .store
                .read_all()
                .await?
                .unwrap_or_else(|| vec![Chunk::placeholder()]);

            let texts = chunks.iter().map(|c| c.text.clone()).collect();
            let embeddings = self.embedder.embed_texts(texts).await?;
            if embeddings.len() != chunks.len() {
                return Err(MemoryError::EmbedderUnavailable(format!(
                    "embedder returned {} vectors for {} chunks",
                    embeddings.len(),
                    chunks.len()
                )));
            }

            let candidates: Vec<Candidate> = chunks
                .into_iter()
                .zip(embeddings)
                .map(|(chunk, embedding)| Candidate {
                    similarity: cosine(query, &embedding.vec),
                    chunk_id: chunk.chunk_id,
                    text: chunk.text,
                    importance: chunk.importance,
                })
                .collect();
            debug!(candidates = candidates.len(), "Scored local chunks");
            Ok(candidates)
        })
    }
}

/// Asks the store to rank by similarity itself.
pub struct NativeVectorSource {
    store: Arc<SqliteChunkStore>,
}

impl NativeVectorSource {
    /// Create a native-query source over `store`.
    #[must_use]
    pub const fn new(store: Arc<SqliteChunkStore>) -> Self {
        Self { store }
    }
}

impl CandidateSource for NativeVectorSource {
    fn method(&self) -> RetrievalMethod {
        RetrievalMethod::NativeVectorQuery
    }

    fn fetch<'a>(
        &'a self,
        query: &'a [f64],
        pool: usize,
    ) -> SourceFuture<'a, MemoryResult<Vec<Candidate>>> {
        Box::pin(async move {
            if self.store.detect_vector_capability().await != VectorCapability::Native {
                return Err(MemoryError::VectorCapabilityUnsupported);
            }
            self.store.native_top_n(query, pool).await
        })
    }
}

/// Scans recent rows with raw vectors and scores them client-side.
pub struct BulkScanSource {
    store: Arc<SqliteChunkStore>,
}

impl BulkScanSource {
    /// Create a bulk-scan source over `store`.
    #[must_use]
    pub const fn new(store: Arc<SqliteChunkStore>) -> Self {
        Self { store }
    }

    /// Rows read for a requested pool size.
    #[must_use]
    pub fn scan_limit(pool: usize) -> usize {
        pool.saturating_mul(BULK_SCAN_FACTOR).max(MIN_BULK_SCAN_ROWS)
    }
}

impl CandidateSource for BulkScanSource {
    fn method(&self) -> RetrievalMethod {
        RetrievalMethod::ClientSideFallback
    }

    fn fetch<'a>(
        &'a self,
        query: &'a [f64],
        pool: usize,
    ) -> SourceFuture<'a, MemoryResult<Vec<Candidate>>> {
        Box::pin(async move {
            let rows = self.store.scan_recent(Self::scan_limit(pool)).await?;
            Ok(rows
                .into_iter()
                .map(|row| Candidate {
                    similarity: cosine(query, &row.vector),
                    chunk_id: row.chunk.chunk_id,
                    text: row.chunk.text,
                    importance: row.chunk.importance,
                })
                .collect())
        })
    }
}
