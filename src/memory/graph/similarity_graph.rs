//! Semantic similarity graph over stored chunks.

use std::collections::HashSet;

use tracing::debug;

use crate::memory::core::chunk::Chunk;
use crate::memory::core::errors::{MemoryError, MemoryResult};
use crate::memory::core::vector_math::cosine;
use crate::memory::embedding::embedder::Embedder;

/// A weighted outgoing edge.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Edge {
    /// Index of the target node.
    pub target: usize,
    /// Cosine similarity between source and target.
    pub weight: f64,
}

/// Directed similarity graph; nodes are chunk identifiers.
///
/// Edges come in symmetric pairs and never form self-loops.
#[derive(Clone, Debug, Default)]
pub struct SimilarityGraph {
    ids: Vec<String>,
    outgoing: Vec<Vec<Edge>>,
}

impl SimilarityGraph {
    /// Build the graph from precomputed vectors, one per id.
    ///
    /// Every ordered pair of distinct nodes whose similarity is at least
    /// `threshold` becomes an edge.
    #[must_use]
    pub fn from_vectors(ids: Vec<String>, vectors: &[Vec<f64>], threshold: f64) -> Self {
        let n = ids.len().min(vectors.len());
        let mut outgoing = vec![Vec::new(); n];
        for (i, edges) in outgoing.iter_mut().enumerate() {
            for j in 0..n {
                if i == j {
                    continue;
                }
                let sim = cosine(&vectors[i], &vectors[j]);
                if sim >= threshold {
                    edges.push(Edge {
                        target: j,
                        weight: sim,
                    });
                }
            }
        }

        let mut ids = ids;
        ids.truncate(n);
        Self { ids, outgoing }
    }

    /// Embed every chunk once and build the graph.
    ///
    /// Chunks repeating an earlier id are skipped; the first occurrence is the node.
    ///
    /// # Errors
    /// Returns an error if embedding fails or returns the wrong number of vectors.
    pub async fn build(
        chunks: &[Chunk],
        embedder: &dyn Embedder,
        threshold: f64,
    ) -> MemoryResult<Self> {
        let mut seen = HashSet::with_capacity(chunks.len());
        let mut ids = Vec::with_capacity(chunks.len());
        let mut texts = Vec::with_capacity(chunks.len());
        for chunk in chunks {
            if seen.insert(chunk.chunk_id.as_str()) {
                ids.push(chunk.chunk_id.clone());
                texts.push(chunk.text.clone());
            }
        }

        let embeddings = embedder.embed_texts(texts).await?;
        if embeddings.len() != ids.len() {
            return Err(MemoryError::EmbedderUnavailable(format!(
                "embedder returned {} vectors for {} chunks",
                embeddings.len(),
                ids.len()
            )));
        }
        let vectors: Vec<Vec<f64>> = embeddings.into_iter().map(|e| e.vec).collect();

        let graph = Self::from_vectors(ids, &vectors, threshold);
        debug!(
            nodes = graph.node_count(),
            edges = graph.edge_count(),
            threshold,
            "Built similarity graph"
        );
        Ok(graph)
    }

    /// Node identifiers in build order.
    #[must_use]
    pub fn ids(&self) -> &[String] {
        &self.ids
    }

    /// Number of nodes.
    #[must_use]
    pub fn node_count(&self) -> usize {
        self.ids.len()
    }

    /// Number of directed edges.
    #[must_use]
    pub fn edge_count(&self) -> usize {
        self.outgoing.iter().map(Vec::len).sum()
    }

    /// Outgoing edges of node `index`.
    #[must_use]
    pub fn outgoing(&self, index: usize) -> &[Edge] {
        self.outgoing.get(index).map_or(&[][..], Vec::as_slice)
    }

    /// Sum of outgoing edge weights of node `index`.
    #[must_use]
    pub fn out_weight(&self, index: usize) -> f64 {
        self.outgoing(index).iter().map(|e| e.weight).sum()
    }

    /// Reverse adjacency: for each node, `(source, weight)` of incoming edges.
    #[must_use]
    pub fn incoming(&self) -> Vec<Vec<(usize, f64)>> {
        let mut incoming = vec![Vec::new(); self.ids.len()];
        for (source, edges) in self.outgoing.iter().enumerate() {
            for edge in edges {
                incoming[edge.target].push((source, edge.weight));
            }
        }
        incoming
    }
}
