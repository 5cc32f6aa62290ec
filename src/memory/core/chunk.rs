//! Chunk model and per-query scored candidates.

use serde::{Deserialize, Serialize};

/// A unit of retrievable text.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    /// Unique identifier assigned at ingestion.
    pub chunk_id: String,
    /// Source document identifier (informational).
    #[serde(default)]
    pub doc_id: String,
    /// Stored text content.
    #[serde(default)]
    pub text: String,
    /// Normalized rank-propagation score in [0, 1].
    #[serde(default, alias = "pagerank")]
    pub importance: f64,
}

impl Chunk {
    /// Build a chunk with an explicit identifier.
    #[must_use]
    pub fn with_id(
        chunk_id: impl Into<String>,
        doc_id: impl Into<String>,
        text: impl Into<String>,
    ) -> Self {
        Self {
            chunk_id: chunk_id.into(),
            doc_id: doc_id.into(),
            text: text.into(),
            importance: 0.0,
        }
    }

    /// Set the stored importance.
    #[must_use]
    pub const fn with_importance(mut self, importance: f64) -> Self {
        self.importance = importance;
        self
    }

    /// The placeholder served when no local chunk file exists.
    #[must_use]
    pub fn placeholder() -> Self {
        Self::with_id(
            "doc_fallback_0",
            "doc_fallback",
            "Local mode is active. Provide telemetry/local_chunks.jsonl for your own memory.",
        )
    }
}

/// A candidate obtained from a backend, before blending.
#[derive(Clone, Debug, PartialEq)]
pub struct Candidate {
    /// Chunk identifier.
    pub chunk_id: String,
    /// Chunk text.
    pub text: String,
    /// Stored importance.
    pub importance: f64,
    /// Cosine similarity to the current query.
    pub similarity: f64,
}

/// A candidate ranked for the current query.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ScoredCandidate {
    /// Chunk identifier.
    pub chunk_id: String,
    /// Chunk text.
    pub text: String,
    /// Stored importance copied from the chunk.
    pub importance: f64,
    /// Cosine similarity to the current query.
    pub similarity: f64,
    /// Blended ranking score.
    pub score: f64,
}
