//! Error types for the memory subsystem.

use std::time::Duration;

use thiserror::Error;

/// Memory subsystem error type.
#[derive(Debug, Error)]
pub enum MemoryError {
    /// Invalid configuration or unsupported values.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    /// No embedding capability could be obtained.
    #[error("embedder unavailable: {0}")]
    EmbedderUnavailable(String),
    /// `SQLite` storage error (sync).
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    /// `SQLite` storage error (async).
    #[error("tokio-rusqlite error: {0}")]
    TokioSqlite(#[from] tokio_rusqlite::Error),
    /// Embedding error.
    #[error("embedding error: {0}")]
    Embedding(#[from] rig::embeddings::EmbeddingError),
    /// HTTP client error from Rig.
    #[error("http client error: {0}")]
    HttpClient(#[from] rig::http_client::Error),
    /// Completion error.
    #[error("completion error: {0}")]
    Completion(#[from] rig::completion::CompletionError),
    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    /// URL parse error.
    #[error("url parse error: {0}")]
    Url(#[from] url::ParseError),
    /// I/O error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    /// The store cannot answer native similarity queries.
    #[error("store has no native vector similarity support")]
    VectorCapabilityUnsupported,
    /// A store call did not complete in time.
    #[error("store call timed out after {0:?}")]
    Timeout(Duration),
}

impl MemoryError {
    /// Whether the error comes from the embedding service rather than a store.
    ///
    /// Retrieval does not fall back on these; there is no query vector to fall back with.
    #[must_use]
    pub const fn is_dependency_failure(&self) -> bool {
        matches!(self, Self::Embedding(_) | Self::EmbedderUnavailable(_))
    }
}

/// Convenience result alias for memory operations.
pub type MemoryResult<T> = Result<T, MemoryError>;
